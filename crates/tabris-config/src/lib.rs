//! Configuration management for the tabris developer tools.
//!
//! Parses `tabris.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//! - `~` - expands to the home directory
//!
//! Expanded fields:
//! - `server.host`
//! - `platforms.endpoint`
//! - `platforms.data_dir`

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override live reload enabled flag.
    pub live_reload_enabled: Option<bool>,
    /// Override the data directory holding downloaded platforms.
    pub data_dir: Option<PathBuf>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "tabris.toml";

/// Default artifact download endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://tabrisjs.com";

/// Name of the per-user data directory.
const DATA_DIR_NAME: &str = ".tabris-cli";

/// Application configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Live reload configuration.
    pub live_reload: LiveReloadConfig,
    /// Debug session configuration.
    pub session: SessionConfig,
    /// Platform download configuration (raw strings from TOML).
    platforms: PlatformsConfigRaw,

    /// Resolved platform configuration (set after loading).
    #[serde(skip)]
    pub platforms_resolved: PlatformsConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address. Devices connect over the network, so the
    /// default listens on all interfaces.
    pub host: String,
    /// Server port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8080,
        }
    }
}

/// Live reload configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LiveReloadConfig {
    /// Whether live reload is enabled.
    pub enabled: bool,
    /// Quiet window in milliseconds before a burst of changes triggers a reload.
    pub debounce_ms: u64,
}

impl Default for LiveReloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 1000,
        }
    }
}

/// Debug session configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Heartbeat interval in milliseconds.
    pub heartbeat_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { heartbeat_ms: 5000 }
    }
}

/// Raw platforms configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct PlatformsConfigRaw {
    endpoint: Option<String>,
    data_dir: Option<String>,
    max_credential_attempts: Option<u32>,
}

/// Resolved platform download configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformsConfig {
    /// Base URL of the download service.
    pub endpoint: String,
    /// Per-user data directory (`~/.tabris-cli` by default).
    pub data_dir: PathBuf,
    /// Upper bound on rejected-credential retries (`None` keeps prompting).
    pub max_credential_attempts: Option<u32>,
}

impl PlatformsConfig {
    /// Root directory of the platform cache (`<data_dir>/platforms`).
    #[must_use]
    pub fn platforms_dir(&self) -> PathBuf {
        self.data_dir.join("platforms")
    }
}

impl Default for PlatformsConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            data_dir: default_data_dir(),
            max_credential_attempts: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR_NAME)
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`platforms.endpoint`").
        field: String,
        /// Error message (e.g., "${`TABRIS_ENDPOINT`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a URL field to use http:// or https:// scheme.
fn require_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `tabris.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist or parsing fails.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(live_reload_enabled) = settings.live_reload_enabled {
            self.live_reload.enabled = live_reload_enabled;
        }
        if let Some(data_dir) = &settings.data_dir {
            self.platforms_resolved.data_dir.clone_from(data_dir);
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically after loading from file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;

        if self.live_reload.debounce_ms == 0 {
            return Err(ConfigError::Validation(
                "live_reload.debounce_ms must be greater than 0".to_owned(),
            ));
        }
        if self.session.heartbeat_ms == 0 {
            return Err(ConfigError::Validation(
                "session.heartbeat_ms must be greater than 0".to_owned(),
            ));
        }

        let platforms = &self.platforms_resolved;
        require_non_empty(&platforms.endpoint, "platforms.endpoint")?;
        require_http_url(&platforms.endpoint, "platforms.endpoint")?;
        if platforms.max_credential_attempts == Some(0) {
            return Err(ConfigError::Validation(
                "platforms.max_credential_attempts must be at least 1".to_owned(),
            ));
        }

        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;

        if let Some(ref endpoint) = self.platforms.endpoint {
            self.platforms.endpoint = Some(expand::expand_env(endpoint, "platforms.endpoint")?);
        }
        if let Some(ref data_dir) = self.platforms.data_dir {
            self.platforms.data_dir = Some(expand::expand_env(data_dir, "platforms.data_dir")?);
        }

        Ok(())
    }

    /// Resolve the platforms section, making a relative `data_dir` relative
    /// to the config file's directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let defaults = PlatformsConfig::default();
        self.platforms_resolved = PlatformsConfig {
            endpoint: self
                .platforms
                .endpoint
                .as_deref()
                .map_or(defaults.endpoint, |e| e.trim_end_matches('/').to_owned()),
            data_dir: self
                .platforms
                .data_dir
                .as_deref()
                .map_or(defaults.data_dir, |d| config_dir.join(d)),
            max_credential_attempts: self.platforms.max_credential_attempts,
        };
    }
}
