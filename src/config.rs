//! Application-level configuration loading.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "SETLIST_BACK_CONFIG_PATH";
/// Environment variable that overrides the configured admin token.
const ADMIN_TOKEN_ENV: &str = "SETLIST_ADMIN_TOKEN";
const DEFAULT_CATALOG_URL: &str = "https://api.deezer.com";
const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Storage backend selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Volatile in-process store.
    Memory,
    /// MongoDB replica set (`MONGO_URI`, `MONGO_DB`).
    Mongo,
}

/// Game settings applied when a game is created.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DefaultSettings {
    pub max_players: u32,
    pub allow_explicit: bool,
    pub selection_time_limit: Option<u32>,
    pub ranking_time_limit: Option<u32>,
}

impl Default for DefaultSettings {
    fn default() -> Self {
        Self {
            max_players: 6,
            allow_explicit: false,
            selection_time_limit: Some(90),
            ranking_time_limit: Some(60),
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    pub store: StoreKind,
    /// Maximum number of tracks returned by a search.
    pub search_limit: usize,
    pub catalog_base_url: String,
    /// Token expected in `x-admin-token`; admin routes are disabled without one.
    pub admin_token: Option<String>,
    pub default_settings: DefaultSettings,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        store = ?app_config.store,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        config.with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(token) = env::var(ADMIN_TOKEN_ENV).ok().filter(|t| !t.is_empty()) {
            self.admin_token = Some(token);
        }
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreKind::Memory,
            search_limit: DEFAULT_SEARCH_LIMIT,
            catalog_base_url: DEFAULT_CATALOG_URL.into(),
            admin_token: None,
            default_settings: DefaultSettings::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    store: Option<StoreKind>,
    search_limit: Option<usize>,
    catalog_base_url: Option<String>,
    admin_token: Option<String>,
    default_settings: Option<DefaultSettings>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            store: value.store.unwrap_or(defaults.store),
            search_limit: value
                .search_limit
                .filter(|limit| *limit > 0)
                .unwrap_or(defaults.search_limit),
            catalog_base_url: value
                .catalog_base_url
                .unwrap_or(defaults.catalog_base_url),
            admin_token: value.admin_token.filter(|token| !token.is_empty()),
            default_settings: value.default_settings.unwrap_or_default(),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let raw: RawConfig = serde_json::from_str(
            r#"{"store": "mongo", "search_limit": 0, "default_settings": {"max_players": 4}}"#,
        )
        .unwrap();
        let config = AppConfig::from(raw);

        assert_eq!(config.store, StoreKind::Mongo);
        assert_eq!(config.search_limit, DEFAULT_SEARCH_LIMIT);
        assert_eq!(config.default_settings.max_players, 4);
        assert_eq!(config.default_settings.ranking_time_limit, Some(60));
        assert!(config.admin_token.is_none());
    }
}
