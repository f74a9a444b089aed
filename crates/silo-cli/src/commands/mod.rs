pub mod build;
pub mod completions;
pub mod info;
pub mod install;
pub mod list;
pub mod push;
pub mod uninstall;

use indicatif::{ProgressBar, ProgressStyle};
use silo_remote::{GraphqlCatalog, RemoteConfig};
use silo_store::Progress;
use std::sync::Mutex;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

/// An indicatif bar behind the core's `Progress` seam. The bar is created
/// hidden and drawn once the total is known.
pub struct BarProgress {
    bar: Mutex<ProgressBar>,
    bytes: bool,
}

impl BarProgress {
    /// Progress in bytes (transfers).
    pub fn bytes() -> Self {
        Self {
            bar: Mutex::new(ProgressBar::hidden()),
            bytes: true,
        }
    }

    /// Progress in plain units (image copies).
    pub fn units() -> Self {
        Self {
            bar: Mutex::new(ProgressBar::hidden()),
            bytes: false,
        }
    }

    pub fn finish(&self) {
        self.bar.lock().unwrap().finish_and_clear();
    }
}

impl Progress for BarProgress {
    fn begin(&self, total: u64) {
        let template = if self.bytes {
            "{bar:32.cyan/blue} {bytes}/{total_bytes}"
        } else {
            "{bar:32.cyan/blue} {pos}/{len}"
        };
        let bar = ProgressBar::new(total);
        bar.set_style(ProgressStyle::with_template(template).expect("valid template"));
        *self.bar.lock().unwrap() = bar;
    }

    fn advance(&self, delta: u64) {
        self.bar.lock().unwrap().inc(delta);
    }
}

pub fn make_catalog(remote_url: Option<&str>) -> Result<GraphqlCatalog, String> {
    let config = if let Some(url) = remote_url {
        RemoteConfig::new(url)
    } else {
        RemoteConfig::load_default().map_err(|e| format!("no --remote and no config: {e}"))?
    };
    Ok(GraphqlCatalog::new(config))
}

pub fn format_version(version: Option<u64>) -> String {
    use console::Style;
    match version {
        Some(v) => Style::new().green().apply_to(format!("v{v}")).to_string(),
        None => Style::new().yellow().apply_to("local").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_pretty_serializes_value() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
    }

    #[test]
    fn format_version_shows_number() {
        assert!(format_version(Some(4)).contains("v4"));
    }

    #[test]
    fn format_version_unversioned_reads_local() {
        assert!(format_version(None).contains("local"));
    }

    #[test]
    fn make_catalog_with_url() {
        assert!(make_catalog(Some("http://localhost:8080")).is_ok());
    }

    #[test]
    fn spinner_helpers_run() {
        let pb = spinner("working…");
        spin_ok(&pb, "done");
        let pb = spinner("working…");
        spin_fail(&pb, "failed");
    }

    #[test]
    fn bar_progress_accepts_events() {
        let progress = BarProgress::bytes();
        progress.begin(10);
        progress.advance(4);
        progress.finish();
        let progress = BarProgress::units();
        progress.begin(2);
        progress.advance(2);
        progress.finish();
    }

    #[test]
    fn exit_codes_are_distinct() {
        assert_ne!(EXIT_SUCCESS, EXIT_FAILURE);
    }
}
