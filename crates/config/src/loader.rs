//! Configuration loader: file discovery plus environment overrides.

use std::env;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::{AppConfig, ConfigError};

/// Searched in order when neither an explicit path nor `HERDBOOK_CONFIG` is set.
const CONFIG_PATHS: &[&str] = &["herdbook.toml", "./config/herdbook.toml"];

pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load from the process environment.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        self.load_with(|key| env::var(key).ok())
    }

    /// Load with an explicit variable lookup (tests pass a map here).
    pub fn load_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<AppConfig, ConfigError> {
        let mut config = match self.find_config_file(&lookup) {
            Some(path) => {
                info!(?path, "loading configuration from file");
                AppConfig::from_file(&path)?
            }
            None => AppConfig::default(),
        };

        apply_env_overrides(&mut config, &lookup);
        config.validate()?;
        Ok(config)
    }

    fn find_config_file(&self, lookup: &impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
            warn!(?path, "configured file does not exist");
        }

        if let Some(path) = lookup("HERDBOOK_CONFIG").map(PathBuf::from) {
            if path.exists() {
                return Some(path);
            }
            warn!(?path, "HERDBOOK_CONFIG points to a missing file");
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_or_warn<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    let parsed = value.trim().parse().ok();
    if parsed.is_none() {
        warn!(key, value, "ignoring unparsable environment override");
    }
    parsed
}

fn apply_env_overrides(config: &mut AppConfig, lookup: &impl Fn(&str) -> Option<String>) {
    // HTTP
    if let Some(val) = lookup("HERDBOOK_HTTP_HOST") {
        config.http.host = val;
    }
    if let Some(port) = lookup("HERDBOOK_HTTP_PORT").and_then(|v| parse_or_warn("HERDBOOK_HTTP_PORT", &v)) {
        config.http.port = port;
    }

    // Auth
    if let Some(val) = lookup("HERDBOOK_JWT_SECRET") {
        config.auth.jwt_secret = val;
    }
    if let Some(leeway) = lookup("HERDBOOK_JWT_LEEWAY_SECS").and_then(|v| parse_or_warn("HERDBOOK_JWT_LEEWAY_SECS", &v)) {
        config.auth.leeway_secs = leeway;
    }

    // Ledger
    if let Some(attempts) = lookup("HERDBOOK_LEDGER_MAX_ATTEMPTS")
        .and_then(|v| parse_or_warn("HERDBOOK_LEDGER_MAX_ATTEMPTS", &v))
    {
        config.ledger.max_attempts = attempts;
    }

    // Session, storage, logging
    if let Some(val) = lookup("HERDBOOK_SESSION_FILE") {
        config.session.file = Some(val).filter(|v| !v.trim().is_empty());
    }
    if let Some(val) = lookup("HERDBOOK_POSTGRES_URL") {
        config.storage.postgres_url = Some(val).filter(|v| !v.trim().is_empty());
    }
    if let Some(json) = lookup("HERDBOOK_LOG_JSON").and_then(|v| parse_or_warn("HERDBOOK_LOG_JSON", &v)) {
        config.logging.json = json;
    }

    // Bootstrap
    if let Some(farm_id) = lookup("HERDBOOK_BOOTSTRAP_FARM_ID").and_then(|v| parse_or_warn("HERDBOOK_BOOTSTRAP_FARM_ID", &v)) {
        config.bootstrap.farm_id = Some(farm_id);
    }
    if let Some(admin_id) = lookup("HERDBOOK_BOOTSTRAP_ADMIN_ID").and_then(|v| parse_or_warn("HERDBOOK_BOOTSTRAP_ADMIN_ID", &v)) {
        config.bootstrap.admin_id = Some(admin_id);
    }
    if let Some(val) = lookup("HERDBOOK_BOOTSTRAP_ADMIN_NAME") {
        config.bootstrap.admin_name = val;
    }
}
