use super::{BarProgress, EXIT_SUCCESS};
use silo_core::Engine;
use std::path::Path;

pub fn run(
    engine: &Engine,
    dataset: &str,
    config: Option<&Path>,
    data_dir: Option<&Path>,
) -> Result<u8, String> {
    let progress = BarProgress::units();
    match (config, data_dir) {
        (Some(config), None) => engine
            .build(dataset, config, &progress)
            .map_err(|e| e.to_string())?,
        (None, Some(data_dir)) => engine
            .build_from_data_dir(dataset, data_dir, &progress)
            .map_err(|e| e.to_string())?,
        _ => return Err("exactly one of --config or --data-dir is required".to_owned()),
    }
    progress.finish();
    println!("dataset {dataset} was built");
    Ok(EXIT_SUCCESS)
}
