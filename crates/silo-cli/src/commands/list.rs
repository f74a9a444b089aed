use super::{format_version, json_pretty, EXIT_SUCCESS};
use silo_core::Engine;

pub fn run(engine: &Engine, json: bool) -> Result<u8, String> {
    let packages = engine.list().map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&packages)?);
    } else if packages.is_empty() {
        println!("no datasets installed");
    } else {
        println!("{:<32} VERSION", "NAME");
        for package in &packages {
            println!("{:<32} {}", package.name, format_version(package.version));
        }
    }
    Ok(EXIT_SUCCESS)
}
