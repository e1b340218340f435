//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup, after the effective level is resolved.

use std::path::Path;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::error::AppError;

/// Crates whose debug output drowns ours; capped at `info` unless `RUST_LOG`
/// says otherwise.
const NOISY_TARGETS: &[&str] = &["hyper_util", "reqwest", "rustls", "h2"];

/// Initialise the global tracing subscriber.
///
/// If `prefer_level` is `true` (a CLI flag was given), `level` wins over
/// `RUST_LOG`. Otherwise `RUST_LOG` wins and `level` is the fallback.
/// With `log_file` set, output is appended there instead of stderr.
pub fn init(level: &str, prefer_level: bool, log_file: Option<&Path>) -> Result<(), AppError> {
    let filter = if prefer_level {
        with_quiet_deps(parse_level(level).map(|l| l.to_string())?)
    } else {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => with_quiet_deps(parse_level(level).map(|l| l.to_string())?),
        }
    };

    let writer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    AppError::Logger(format!("failed to open log file '{}': {e}", path.display()))
                })?;
            BoxMakeWriter::new(file)
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(log_file.is_none())
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))?;

    Ok(())
}

fn with_quiet_deps(level: String) -> EnvFilter {
    NOISY_TARGETS.iter().fold(EnvFilter::new(level), |filter, target| {
        match format!("{target}=info").parse() {
            Ok(directive) => filter.add_directive(directive),
            Err(_) => filter,
        }
    })
}

/// Parse a log level string into a [`LevelFilter`], rejecting unknown values.
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    if level.is_empty() {
        return Err(AppError::Logger("log level must not be empty".into()));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| AppError::Logger(format!("unrecognised log level: '{level}'")))
}
