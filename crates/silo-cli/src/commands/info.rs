use super::{format_version, json_pretty, EXIT_SUCCESS};
use silo_core::Engine;

pub fn run(engine: &Engine, dataset: &str, json: bool) -> Result<u8, String> {
    let details = engine.info(dataset).map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&details)?);
    } else {
        println!("name:    {}", details.name);
        println!("version: {}", format_version(details.version));
        println!("rows:    {}", details.rows);
        println!("columns:");
        for column in &details.columns {
            println!("  {:<24} {}", column.name, column.kind);
        }
    }
    Ok(EXIT_SUCCESS)
}
