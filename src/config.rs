//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory
//! (or an explicit `-c <path>`), then applies the environment overrides
//! collected in [`Overrides`].

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::atproto::did_doc;
use crate::error::AppError;

/// Web backend (`atgeo-marker`) configuration.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Socket address the web backend binds to.
    pub bind: String,
    /// Public base URL the browser reaches us on; drives OAuth client metadata.
    pub public_url: String,
    /// Mark the session cookie `Secure`. Off for loopback development.
    pub cookie_secure: bool,
}

/// AppView (`atgeo-appview`) configuration.
#[derive(Debug, Clone)]
pub struct AppViewConfig {
    pub bind: String,
    /// `MARKER_APPVIEW_DID`: required to serve the DID document.
    pub did: Option<String>,
    /// `MARKER_APPVIEW_SERVICE_ENDPOINT`: optional for `did:web` DIDs.
    pub service_endpoint: Option<String>,
    /// `PUBLIC_KEY`: multibase key; falls back to `public_key_file`.
    pub public_key: Option<String>,
    pub public_key_file: PathBuf,
    /// Service queried for `listRecords` / `getRecord`.
    pub repo_service: String,
    /// `limit` passed to `listRecords` when the caller gives none.
    pub list_limit: u32,
    /// Upper bound on concurrent entry lookups per request.
    pub entry_concurrency: usize,
    pub timeout_seconds: u64,
}

impl AppViewConfig {
    /// Resolve the AppView's DID and public service endpoint.
    pub fn identity(&self) -> Result<(String, String), AppError> {
        let did = self
            .did
            .clone()
            .ok_or_else(|| AppError::Config("MARKER_APPVIEW_DID is not set".into()))?;
        let endpoint = did_doc::service_endpoint_for(&did, self.service_endpoint.as_deref())?;
        Ok((did, endpoint))
    }

    /// The multibase public key published in the DID document.
    pub fn load_public_key(&self) -> Result<String, AppError> {
        if let Some(key) = &self.public_key {
            return Ok(key.trim().to_string());
        }
        let raw = fs::read_to_string(&self.public_key_file).map_err(|e| {
            AppError::Config(format!(
                "PUBLIC_KEY is not set and {} is unreadable: {e}",
                self.public_key_file.display()
            ))
        })?;
        Ok(raw.trim().to_string())
    }
}

/// Shared AT Protocol endpoints.
#[derive(Debug, Clone)]
pub struct AtprotoConfig {
    /// Public AppView used for handle resolution and profiles.
    pub public_api: String,
    /// `did:plc` directory.
    pub plc_directory: String,
    pub timeout_seconds: u64,
}

/// Nominatim location search proxy.
#[derive(Debug, Clone)]
pub struct NominatimConfig {
    pub base_url: String,
    pub user_agent: String,
    pub limit: u32,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Working directory for all persistent data (already expanded, no `~`).
    pub work_dir: PathBuf,
    /// SQLite database path (absolute, or resolved against `work_dir`).
    pub db_path: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub web: WebConfig,
    pub appview: AppViewConfig,
    pub atproto: AtprotoConfig,
    pub nominatim: NominatimConfig,
}

/// Environment overrides, gathered once so tests can pass them explicitly
/// instead of mutating the process environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub work_dir: Option<String>,
    pub log_level: Option<String>,
    pub appview_did: Option<String>,
    pub appview_service_endpoint: Option<String>,
    pub appview_port: Option<String>,
    pub public_key: Option<String>,
    pub public_url: Option<String>,
}

impl Overrides {
    pub fn from_env() -> Self {
        let var = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            work_dir: var("ATGEO_WORK_DIR"),
            log_level: var("ATGEO_LOG_LEVEL"),
            appview_did: var("MARKER_APPVIEW_DID"),
            appview_service_endpoint: var("MARKER_APPVIEW_SERVICE_ENDPOINT"),
            appview_port: var("APPVIEW_PORT"),
            public_key: var("PUBLIC_KEY"),
            public_url: var("PUBLIC_URL"),
        }
    }
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawConfig {
    server: RawServer,
    #[serde(default)]
    web: RawWeb,
    #[serde(default)]
    appview: RawAppView,
    #[serde(default)]
    atproto: RawAtproto,
    #[serde(default)]
    nominatim: RawNominatim,
}

#[derive(Deserialize)]
struct RawServer {
    work_dir: String,
    #[serde(default = "default_db_path")]
    db_path: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    log_file: Option<String>,
}

#[derive(Deserialize)]
#[serde(default)]
struct RawWeb {
    bind: String,
    public_url: String,
    cookie_secure: bool,
}

impl Default for RawWeb {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:80".to_string(),
            public_url: "http://127.0.0.1/".to_string(),
            cookie_secure: false,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct RawAppView {
    bind: String,
    did: Option<String>,
    service_endpoint: Option<String>,
    public_key_file: String,
    repo_service: String,
    list_limit: u32,
    entry_concurrency: usize,
    timeout_seconds: u64,
}

impl Default for RawAppView {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            did: None,
            service_endpoint: None,
            public_key_file: "public_key.pem".to_string(),
            repo_service: "https://bsky.social".to_string(),
            list_limit: 100,
            entry_concurrency: 16,
            timeout_seconds: 10,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct RawAtproto {
    public_api: String,
    plc_directory: String,
    timeout_seconds: u64,
}

impl Default for RawAtproto {
    fn default() -> Self {
        Self {
            public_api: "https://public.api.bsky.app".to_string(),
            plc_directory: "https://plc.directory".to_string(),
            timeout_seconds: 10,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct RawNominatim {
    base_url: String,
    user_agent: String,
    limit: u32,
}

impl Default for RawNominatim {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: "atgeo-marker/1.0 (github.com/atprotocol-community/atgeo-marker)"
                .to_string(),
            limit: 10,
        }
    }
}

fn default_db_path() -> String {
    "db.sqlite".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load config from `path` (default `config/default.toml`) with env overrides.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let path = Path::new(path.unwrap_or("config/default.toml"));
    load_from(path, &Overrides::from_env())
}

/// Internal loader. Accepts an explicit path and overrides.
pub fn load_from(path: &Path, overrides: &Overrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let s = parsed.server;
    let work_dir = expand_home(overrides.work_dir.as_deref().unwrap_or(&s.work_dir));
    let log_level = overrides.log_level.clone().unwrap_or(s.log_level);
    let db_path = resolve_in(&work_dir, &s.db_path);
    let log_file = s.log_file.map(|f| resolve_in(&work_dir, &f));

    let a = parsed.appview;
    if a.list_limit == 0 || a.list_limit > 100 {
        return Err(AppError::Config(format!(
            "appview.list_limit must be within 1..=100, got {}",
            a.list_limit
        )));
    }
    let appview_bind = match &overrides.appview_port {
        Some(port) => with_port(&a.bind, port)?,
        None => a.bind,
    };

    Ok(Config {
        work_dir,
        db_path,
        log_level,
        log_file,
        web: WebConfig {
            bind: parsed.web.bind,
            public_url: overrides.public_url.clone().unwrap_or(parsed.web.public_url),
            cookie_secure: parsed.web.cookie_secure,
        },
        appview: AppViewConfig {
            bind: appview_bind,
            did: overrides.appview_did.clone().or(a.did),
            service_endpoint: overrides.appview_service_endpoint.clone().or(a.service_endpoint),
            public_key: overrides.public_key.clone(),
            public_key_file: PathBuf::from(a.public_key_file),
            repo_service: a.repo_service,
            list_limit: a.list_limit,
            entry_concurrency: a.entry_concurrency.max(1),
            timeout_seconds: a.timeout_seconds,
        },
        atproto: AtprotoConfig {
            public_api: parsed.atproto.public_api,
            plc_directory: parsed.atproto.plc_directory,
            timeout_seconds: parsed.atproto.timeout_seconds,
        },
        nominatim: NominatimConfig {
            base_url: parsed.nominatim.base_url,
            user_agent: parsed.nominatim.user_agent,
            limit: parsed.nominatim.limit,
        },
    })
}

/// Replace the port of a `host:port` bind address.
fn with_port(bind: &str, port: &str) -> Result<String, AppError> {
    let port: u16 = port
        .parse()
        .map_err(|_| AppError::Config(format!("APPVIEW_PORT is not a valid port: '{port}'")))?;
    let host = bind.rsplit_once(':').map(|(h, _)| h).unwrap_or(bind);
    Ok(format!("{host}:{port}"))
}

fn resolve_in(work_dir: &Path, path: &str) -> PathBuf {
    let p = expand_home(path);
    if p.is_absolute() { p } else { work_dir.join(p) }
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for tests: loopback URLs, nothing reachable.
impl Config {
    pub fn test_default(work_dir: &Path) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            db_path: work_dir.join("db.sqlite"),
            log_level: "info".into(),
            log_file: None,
            web: WebConfig {
                bind: "127.0.0.1:0".into(),
                public_url: "http://127.0.0.1/".into(),
                cookie_secure: false,
            },
            appview: AppViewConfig {
                bind: "127.0.0.1:0".into(),
                did: Some("did:web:appview.example.com".into()),
                service_endpoint: None,
                public_key: Some("zQ3shtestkey".into()),
                public_key_file: PathBuf::from("public_key.pem"),
                repo_service: "http://localhost:0".into(),
                list_limit: 100,
                entry_concurrency: 4,
                timeout_seconds: 1,
            },
            atproto: AtprotoConfig {
                public_api: "http://localhost:0".into(),
                plc_directory: "http://localhost:0".into(),
                timeout_seconds: 1,
            },
            nominatim: NominatimConfig {
                base_url: "http://localhost:0".into(),
                user_agent: "atgeo-marker-test".into(),
                limit: 10,
            },
        }
    }
}
