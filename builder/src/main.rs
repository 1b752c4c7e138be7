//! Builder - Entry Point
//!
//! Reads task messages, one JSON object per line, from stdin and executes
//! them until stdin closes or the process is told to stop.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;

use paas_builder::app::run::{run, run_task_file};
use paas_builder::filesys::file::File;
use paas_builder::logs::{init_logging, LogOptions};
use paas_builder::storage::settings::{Settings, DEFAULT_SETTINGS_PATH};
use paas_builder::utils::version_info;

use tokio::io::BufReader;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(rendered) => println!("{}", rendered),
            Err(e) => eprintln!("Failed to render version: {e}"),
        }
        return ExitCode::SUCCESS;
    }

    // Retrieve the settings file
    let settings_path = cli_args
        .get("config")
        .cloned()
        .unwrap_or_else(|| DEFAULT_SETTINGS_PATH.to_string());
    let settings = match Settings::load(&File::new(settings_path)).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.json_logs,
    };
    if let Err(e) = init_logging(log_options) {
        eprintln!("Failed to initialize logging: {e}");
    }

    info!("Starting builder {} ({})", version.version, version.git_hash);

    // Run a single task and exit with its result
    if let Some(task_file) = cli_args.get("task-file") {
        return match run_task_file(&settings, &File::new(task_file)).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Task failed: {e}");
                ExitCode::FAILURE
            }
        };
    }

    let input = BufReader::new(tokio::io::stdin());
    match run(&settings, input, await_shutdown_signal()).await {
        Ok(summary) => {
            info!(
                "Builder stopped: {} succeeded, {} failed",
                summary.succeeded, summary.failed
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to run the builder: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                _ => {
                    error!("Unable to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down...");
    }
}
