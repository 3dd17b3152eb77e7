use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const APP_NAME: &str = "noq-request";
pub const DEFAULT_API_URL: &str = "http://localhost:8092";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Persisted user configuration (managed by confy).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NoqConfig {
    /// Base URL of the Noq API, without the `/api/v4` suffix.
    #[serde(default)]
    pub api_url: Option<String>,
    /// Personal access token sent as a bearer credential.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub csrf_token: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub typeahead_debounce_ms: Option<u64>,
}

pub fn load_config() -> Result<NoqConfig> {
    let cfg: NoqConfig = confy::load(APP_NAME, None).context("failed to load config")?;
    Ok(cfg)
}

pub fn save_config(cfg: &NoqConfig) -> Result<()> {
    confy::store(APP_NAME, None, cfg).context("failed to save config")?;
    Ok(())
}

pub fn config_path() -> Result<PathBuf> {
    confy::get_configuration_file_path(APP_NAME, None).context("failed to locate config file")
}

/// Effective settings: environment overrides win over stored values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub token: Option<String>,
    pub csrf_token: Option<String>,
    pub timeout: Duration,
    pub typeahead_debounce: Duration,
}

impl Settings {
    pub fn resolve(cfg: &NoqConfig) -> Self {
        Self::resolve_with(cfg, |key| std::env::var(key).ok())
    }

    fn resolve_with(cfg: &NoqConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let pick = |key: &str, stored: &Option<String>| {
            env(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .or_else(|| {
                    stored
                        .as_deref()
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .map(str::to_string)
                })
        };

        let api_url = pick("NOQ_API_URL", &cfg.api_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Self {
            api_url,
            token: pick("NOQ_TOKEN", &cfg.token),
            csrf_token: pick("NOQ_CSRF_TOKEN", &cfg.csrf_token),
            timeout: Duration::from_secs(cfg.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS).max(1)),
            typeahead_debounce: Duration::from_millis(
                cfg.typeahead_debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS),
            ),
        }
    }
}

/// Location of the session store, overridable with `NOQ_SESSION_DB`.
pub fn session_db_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("NOQ_SESSION_DB")
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }
    let base = dirs::data_local_dir().context("no local data directory on this platform")?;
    Ok(base.join(APP_NAME).join("session.db"))
}

/// Log file written next to the session store.
pub fn log_file_path(session_db: &std::path::Path) -> PathBuf {
    session_db.with_file_name(format!("{}.log", APP_NAME))
}
