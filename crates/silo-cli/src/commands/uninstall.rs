use super::EXIT_SUCCESS;
use silo_core::Engine;

pub fn run(engine: &Engine, dataset: &str) -> Result<u8, String> {
    engine.uninstall(dataset).map_err(|e| e.to_string())?;
    println!("dataset {dataset} was uninstalled");
    Ok(EXIT_SUCCESS)
}
