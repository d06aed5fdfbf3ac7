//! Configuration for relboard.
//!
//! Settings are read from `relboard.toml` and layered:
//! file → environment (`RELBOARD_*`, optionally from `.env`) → CLI flags.
//! Every section is optional; a missing file yields the defaults below.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3141
//! dev_mode = false
//!
//! [database]
//! path = ".relboard/relboard.db"
//!
//! [storage]
//! root = ".relboard/uploads"
//! public_base_url = "https://board.example.com"
//! max_upload_bytes = 10485760
//!
//! [live]
//! refresh_interval_secs = 60
//! debounce_ms = 250
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! file = ".relboard/relboard.log"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::board::live::LiveConfig;
use crate::board::storage::{DEFAULT_MAX_UPLOAD_BYTES, UploadPolicy};

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "relboard.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelboardConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub live: LiveSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Enables permissive CORS for a separately served frontend.
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3141
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".relboard/relboard.db")
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    /// Base of the URLs handed out for uploads. Derived from the listen
    /// address when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from(".relboard/uploads")
}

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            public_base_url: None,
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveSection {
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_refresh_interval_secs() -> u64 {
    60
}

fn default_debounce_ms() -> u64 {
    250
}

impl Default for LiveSection {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Also write logs to this file when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

/// Values given on the command line; `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
    pub dev_mode: bool,
    pub log_level: Option<String>,
}

impl RelboardConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse relboard.toml")
    }

    /// Load the given file, or `relboard.toml` in the working directory.
    /// An explicitly named file must exist; the implicit one may not.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Full layering: file → environment → CLI.
    pub fn resolve(path: Option<&Path>, cli: &CliOverrides) -> Result<Self> {
        let mut config = Self::load_or_default(path)?;
        config.apply_env()?;
        config.apply_cli(cli);
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply `RELBOARD_*` overrides using `lookup` to read variables.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup("RELBOARD_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("RELBOARD_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid RELBOARD_PORT: '{}'", port))?;
        }
        if let Some(path) = lookup("RELBOARD_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(root) = lookup("RELBOARD_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(url) = lookup("RELBOARD_PUBLIC_URL") {
            self.storage.public_base_url = Some(url);
        }
        if let Some(level) = lookup("RELBOARD_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("RELBOARD_LOG_FORMAT") {
            self.logging.format = format
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("Invalid RELBOARD_LOG_FORMAT")?;
        }
        Ok(())
    }

    pub fn apply_cli(&mut self, cli: &CliOverrides) {
        if let Some(ref host) = cli.host {
            self.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(ref path) = cli.db_path {
            self.database.path = path.clone();
        }
        if cli.dev_mode {
            self.server.dev_mode = true;
        }
        if let Some(ref level) = cli.log_level {
            self.logging.level = level.clone();
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Base URL for uploaded objects (configured, or derived from the listen address).
    pub fn public_base_url(&self) -> String {
        match self.storage.public_base_url {
            Some(ref url) => url.trim_end_matches('/').to_string(),
            None => {
                let host = match self.server.host.as_str() {
                    "0.0.0.0" | "::" => "localhost",
                    other => other,
                };
                format!("http://{}:{}", host, self.server.port)
            }
        }
    }

    pub fn live_config(&self) -> LiveConfig {
        LiveConfig {
            refresh_interval: Duration::from_secs(self.live.refresh_interval_secs.max(1)),
            debounce: Duration::from_millis(self.live.debounce_ms),
        }
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy::new(self.storage.max_upload_bytes)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; an ephemeral port will be chosen".to_string());
        }
        if self.storage.max_upload_bytes == 0 {
            warnings.push("storage.max_upload_bytes is 0; every upload will be rejected".to_string());
        }
        if self.live.refresh_interval_secs == 0 {
            warnings.push("live.refresh_interval_secs is 0; using 1 second".to_string());
        }
        if let Some(ref url) = self.storage.public_base_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            warnings.push(format!(
                "storage.public_base_url '{}' should start with http:// or https://",
                url
            ));
        }
        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            warnings.push(format!("Invalid logging.level '{}'", self.logging.level));
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RelboardConfig::default();
        assert_eq!(config.server.port, 3141);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.database.path, PathBuf::from(".relboard/relboard.db"));
        assert_eq!(config.storage.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.live.refresh_interval_secs, 60);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config = RelboardConfig::parse("").unwrap();
        assert_eq!(config, RelboardConfig::default());
    }

    #[test]
    fn test_parse_partial_sections() {
        let config = RelboardConfig::parse(
            r#"
[server]
port = 8080

[storage]
public_base_url = "https://board.example.com/"

[logging]
format = "json"
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.public_base_url(), "https://board.example.com");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.live.debounce_ms, 250);
    }

    #[test]
    fn test_parse_invalid_toml() {
        assert!(RelboardConfig::parse("[server\nport = ").is_err());
        assert!(RelboardConfig::parse("[server]\nport = \"many\"").is_err());
    }

    #[test]
    fn test_load_or_default_explicit_missing_file_errors() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(RelboardConfig::load_or_default(Some(&missing)).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relboard.toml");
        std::fs::write(&path, "[database]\npath = \"/var/lib/relboard.db\"\n").unwrap();
        let config = RelboardConfig::load(&path).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/var/lib/relboard.db"));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = RelboardConfig::parse("[server]\nport = 8080\nhost = \"0.0.0.0\"").unwrap();
        config
            .apply_env_with(env(&[
                ("RELBOARD_PORT", "9000"),
                ("RELBOARD_DB_PATH", "/tmp/env.db"),
                ("RELBOARD_STORAGE_ROOT", "/tmp/uploads"),
                ("RELBOARD_LOG_FORMAT", "JSON"),
            ]))
            .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.database.path, PathBuf::from("/tmp/env.db"));
        assert_eq!(config.storage.root, PathBuf::from("/tmp/uploads"));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_env_port_errors() {
        let mut config = RelboardConfig::default();
        let err = config
            .apply_env_with(env(&[("RELBOARD_PORT", "http")]))
            .unwrap_err();
        assert!(err.to_string().contains("RELBOARD_PORT"));
    }

    #[test]
    fn test_cli_overrides_env() {
        let mut config = RelboardConfig::default();
        config
            .apply_env_with(env(&[("RELBOARD_PORT", "9000"), ("RELBOARD_HOST", "10.0.0.1")]))
            .unwrap();
        config.apply_cli(&CliOverrides {
            port: Some(7000),
            dev_mode: true,
            ..Default::default()
        });
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.host, "10.0.0.1");
        assert!(config.server.dev_mode);
        assert_eq!(config.bind_addr(), "10.0.0.1:7000");
    }

    #[test]
    fn test_public_base_url_derived_from_listen_address() {
        let mut config = RelboardConfig::default();
        assert_eq!(config.public_base_url(), "http://127.0.0.1:3141");
        config.server.host = "0.0.0.0".into();
        assert_eq!(config.public_base_url(), "http://localhost:3141");
    }

    #[test]
    fn test_live_config_and_upload_policy() {
        let mut config = RelboardConfig::default();
        config.live.refresh_interval_secs = 0;
        config.live.debounce_ms = 100;
        config.storage.max_upload_bytes = 2048;

        let live = config.live_config();
        assert_eq!(live.refresh_interval, Duration::from_secs(1));
        assert_eq!(live.debounce, Duration::from_millis(100));
        assert_eq!(config.upload_policy().max_bytes, 2048);
    }

    #[test]
    fn test_validate_warnings() {
        let mut config = RelboardConfig::default();
        config.storage.max_upload_bytes = 0;
        config.storage.public_base_url = Some("ftp://files".into());
        config.logging.level = "relboard=loud".into();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 3, "{warnings:?}");
    }

    #[test]
    fn test_toml_roundtrip_of_effective_config() {
        let mut config = RelboardConfig::default();
        config.storage.public_base_url = Some("https://board.example.com".into());
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("[server]"));
        assert_eq!(RelboardConfig::parse(&text).unwrap(), config);
    }
}
