//! Configuration loader and validator for the catalogue store.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::model::VariantPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub database: Database,
    pub i18n: I18n,
    #[serde(default)]
    pub cache: Cache,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Connection settings for the catalogue database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Database {
    /// Empty means `sqlite://<data_dir>/i18n.db`.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long a writer waits for the SQLite write lock.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Culture and catalogue naming rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct I18n {
    pub culture: String,
    pub source_lang: String,
    pub default_catalogue: String,
    pub cultures: Vec<String>,
    #[serde(default)]
    pub reserved: Vec<String>,
}

/// Memcached invalidation target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cache {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub servers: Vec<CacheServer>,
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            enabled: false,
            prefix: String::new(),
            timeout_ms: default_timeout_ms(),
            servers: Vec::new(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheServer {
    pub host: String,
    #[serde(default = "default_memcached_port")]
    pub port: u16,
}

fn default_memcached_port() -> u16 {
    11211
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Database URL: `DATABASE_URL` wins, then `database.url`, then a file
    /// inside `app.data_dir`.
    pub fn database_url(&self) -> String {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                return url;
            }
        }
        if !self.database.url.trim().is_empty() {
            return self.database.url.clone();
        }
        format!(
            "sqlite://{}/i18n.db",
            self.app.data_dir.trim_end_matches('/')
        )
    }

    pub fn variant_policy(&self) -> VariantPolicy {
        VariantPolicy {
            source_lang: self.i18n.source_lang.clone(),
            cultures: self.i18n.cultures.clone(),
            reserved: self.i18n.reserved.clone(),
        }
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.database.max_connections == 0 {
        return Err(ConfigError::Invalid("database.max_connections must be > 0"));
    }
    if cfg.database.busy_timeout_ms == 0 {
        return Err(ConfigError::Invalid("database.busy_timeout_ms must be > 0"));
    }

    if cfg.i18n.culture.trim().is_empty() {
        return Err(ConfigError::Invalid("i18n.culture must be non-empty"));
    }
    if cfg.i18n.source_lang.trim().is_empty() {
        return Err(ConfigError::Invalid("i18n.source_lang must be non-empty"));
    }
    if cfg.i18n.default_catalogue.trim().is_empty() {
        return Err(ConfigError::Invalid("i18n.default_catalogue must be non-empty"));
    }
    if cfg.i18n.default_catalogue.contains('.') {
        return Err(ConfigError::Invalid(
            "i18n.default_catalogue must not carry a culture suffix",
        ));
    }
    if cfg.i18n.cultures.is_empty() {
        return Err(ConfigError::Invalid("i18n.cultures must list at least one culture"));
    }
    if cfg.i18n.cultures.iter().any(|c| c.trim().is_empty()) {
        return Err(ConfigError::Invalid("i18n.cultures entries must be non-empty"));
    }

    if cfg.cache.enabled {
        if cfg.cache.servers.is_empty() {
            return Err(ConfigError::Invalid("cache.servers must be non-empty when cache is enabled"));
        }
        if cfg.cache.servers.iter().any(|s| s.host.trim().is_empty()) {
            return Err(ConfigError::Invalid("cache.servers[].host must be non-empty"));
        }
        if cfg.cache.timeout_ms == 0 {
            return Err(ConfigError::Invalid("cache.timeout_ms must be > 0"));
        }
    }

    Ok(())
}

/// Returns the example YAML document.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

database:
  url: ""
  max_connections: 5
  busy_timeout_ms: 5000

i18n:
  culture: "ru"
  source_lang: "en"
  default_catalogue: "messages"
  cultures: ["ru", "ua", "is", "cn"]
  reserved: ["messages", "messages.en", "site", "site.en"]

cache:
  enabled: true
  prefix: ""
  timeout_ms: 500
  servers:
    - host: "127.0.0.1"
      port: 11211
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.cache.servers[0].port, 11211);
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let yaml = r#"app:
  data_dir: "./data"
i18n:
  culture: "ua"
  source_lang: "en"
  default_catalogue: "messages"
  cultures: ["ua"]
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.database.max_connections, 5);
        assert_eq!(cfg.database.busy_timeout_ms, 5000);
        assert!(!cfg.cache.enabled);
        assert!(cfg.i18n.reserved.is_empty());
    }

    #[test]
    fn invalid_culture() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.i18n.culture = " ".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("i18n.culture")), _ => panic!("wrong error") }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.i18n.cultures.clear();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_default_catalogue() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.i18n.default_catalogue = "messages.ru".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("default_catalogue")), _ => panic!("wrong error") }
    }

    #[test]
    fn enabled_cache_needs_servers() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.cache.servers.clear();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("cache.servers")), _ => panic!("wrong error") }

        cfg.cache.enabled = false;
        validate(&cfg).unwrap();
    }

    #[test]
    fn database_url_falls_back_to_data_dir() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        if std::env::var("DATABASE_URL").is_ok() {
            return;
        }
        cfg.app.data_dir = "/tmp/catalogues/".into();
        assert_eq!(cfg.database_url(), "sqlite:///tmp/catalogues/i18n.db");
        cfg.database.url = "sqlite::memory:".into();
        assert_eq!(cfg.database_url(), "sqlite::memory:");
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.i18n.cultures, vec!["ru", "ua", "is", "cn"]);
        assert_eq!(cfg.variant_policy().reserved.len(), 4);
    }
}
