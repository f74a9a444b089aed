mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::EXIT_FAILURE;
use silo_core::Engine;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "silo",
    version,
    about = "Package manager for immutable, versioned dataset packages"
)]
struct Cli {
    /// Base directory holding the local dataset namespace.
    #[arg(long, default_value = ".")]
    base: PathBuf,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download and install the latest version of a dataset.
    Install {
        /// Dataset name (scope/name).
        dataset: String,
        /// Catalog endpoint URL (overrides config file).
        #[arg(long)]
        remote: Option<String>,
    },
    /// Remove an installed dataset.
    Uninstall {
        /// Dataset name (scope/name).
        dataset: String,
    },
    /// List installed datasets.
    List,
    /// Show details of an installed dataset.
    Info {
        /// Dataset name (scope/name).
        dataset: String,
    },
    /// Build a dataset package from local input.
    Build {
        /// Dataset name (scope/name).
        dataset: String,
        /// Path to a build config JSON file.
        #[arg(long, value_name = "FILE", conflicts_with = "data_dir")]
        config: Option<PathBuf>,
        /// Build a single image-column package from a directory of images.
        #[arg(long, value_name = "DIR")]
        data_dir: Option<PathBuf>,
    },
    /// Publish a built dataset to the catalog.
    Push {
        /// Dataset name (scope/name).
        dataset: String,
        /// Catalog endpoint URL (overrides config file).
        #[arg(long)]
        remote: Option<String>,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SILO_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    tracing::debug!("base directory: {}", cli.base.display());

    let engine = Engine::new(&cli.base);
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Install { dataset, remote } => {
            commands::install::run(&engine, &dataset, remote.as_deref(), json_output)
        }
        Commands::Uninstall { dataset } => commands::uninstall::run(&engine, &dataset),
        Commands::List => commands::list::run(&engine, json_output),
        Commands::Info { dataset } => commands::info::run(&engine, &dataset, json_output),
        Commands::Build {
            dataset,
            config,
            data_dir,
        } => commands::build::run(&engine, &dataset, config.as_deref(), data_dir.as_deref()),
        Commands::Push { dataset, remote } => {
            commands::push::run(&engine, &dataset, remote.as_deref(), json_output)
        }
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
