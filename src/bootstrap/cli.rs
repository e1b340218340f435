//! Command-line parsing shared by `atgeo-marker` and `atgeo-appview`.

/// Parsed command-line options.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CliArgs {
    /// Log level forced from the command line; wins over `RUST_LOG`.
    pub log_level: Option<String>,
    /// Explicit config file path.
    pub config_path: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Cli {
    Run(CliArgs),
    Help,
}

pub fn usage(bin: &str) -> String {
    format!(
        "Usage: {bin} [OPTIONS]\n\n\
         Options:\n  \
         -h, --help                 Print help\n  \
         -c, --config <PATH>        Path to configuration file (default: config/default.toml)\n  \
         --log-level <LEVEL>        Force a log level (error|warn|info|debug|trace)\n  \
         -v, -vv, -vvv, -vvvv       Increase logging verbosity\n"
    )
}

/// Parse arguments (without the program name).
pub fn parse<I>(args: I) -> Result<Cli, String>
where
    I: IntoIterator<Item = String>,
{
    let mut verbosity = 0u8;
    let mut out = CliArgs::default();

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--" => break,
            "-h" | "--help" => return Ok(Cli::Help),
            "-c" | "--config" => {
                let path = iter.next().ok_or("-c/--config requires a path argument")?;
                out.config_path = Some(path);
            }
            "--log-level" => {
                let level = iter.next().ok_or("--log-level requires a level argument")?;
                out.log_level = Some(level);
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.len() > 1 && a.starts_with('-') && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            other => return Err(format!("unrecognised argument: '{other}'")),
        }
    }

    // -v warn, -vv info, -vvv debug, -vvvv trace. An explicit --log-level wins.
    if out.log_level.is_none() {
        out.log_level = match verbosity {
            0 => None,
            1 => Some("warn".into()),
            2 => Some("info".into()),
            3 => Some("debug".into()),
            _ => Some("trace".into()),
        };
    }

    Ok(Cli::Run(out))
}
