use super::{json_pretty, make_catalog, BarProgress, EXIT_SUCCESS};
use silo_core::Engine;

pub fn run(
    engine: &Engine,
    dataset: &str,
    remote_url: Option<&str>,
    json: bool,
) -> Result<u8, String> {
    let catalog = make_catalog(remote_url)?;
    let progress = BarProgress::bytes();
    let version = engine
        .push(dataset, &catalog, &progress)
        .map_err(|e| e.to_string())?;
    progress.finish();

    if json {
        let payload = serde_json::json!({ "name": dataset, "version": version });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("dataset {dataset} (v{version}) was pushed");
    }
    Ok(EXIT_SUCCESS)
}
