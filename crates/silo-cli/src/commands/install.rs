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
    let report = engine
        .install(dataset, &catalog, &progress)
        .map_err(|e| e.to_string())?;
    progress.finish();

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        println!("dataset {} (v{}) was installed", report.name, report.version);
    }
    Ok(EXIT_SUCCESS)
}
