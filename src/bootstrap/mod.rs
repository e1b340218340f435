//! Bootstrap layer: modules that run before either server starts.
//!
//! - **cli**: argument parsing shared by both binaries.
//! - **logger**: tracing-subscriber initialisation.
//!
//! Startup sequence for both binaries ([`start`]):
//!   1. Load `.env` (if present)
//!   2. Parse CLI arguments
//!   3. Load config
//!   4. Resolve effective log level (CLI flags > `RUST_LOG` > config)
//!   5. Init logger once
//!   6. Spawn Ctrl-C → shutdown signal watcher

pub mod cli;
pub mod logger;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{self, Config};
use crate::error::AppError;

/// Run the shared startup sequence for `bin`.
///
/// Returns `None` when `--help` was requested and usage has been printed.
pub fn start(bin: &str) -> Result<Option<(Config, CancellationToken)>, AppError> {
    // Both the working directory and its parent may carry a .env; neither is required.
    let _ = dotenvy::dotenv();
    let _ = dotenvy::from_path("../.env");

    let args = match cli::parse(std::env::args().skip(1)) {
        Ok(cli::Cli::Run(args)) => args,
        Ok(cli::Cli::Help) => {
            println!("{}", cli::usage(bin));
            return Ok(None);
        }
        Err(msg) => return Err(AppError::Config(format!("{msg}\n\n{}", cli::usage(bin)))),
    };

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.as_deref().unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some(), config.log_file.as_deref())?;

    info!(
        %bin,
        work_dir = %config.work_dir.display(),
        configured_log_level = %config.log_level,
        %effective_log_level,
        "config loaded"
    );

    // Shared shutdown token. Ctrl-C cancels it, the server watches it.
    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    Ok(Some((config, shutdown)))
}
