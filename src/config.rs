use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::transport::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_TRANSFER_TIMEOUT};

/// Default WM server host
const DEFAULT_HOST: &str = "localhost";

/// Default WM server port
const DEFAULT_PORT: &str = "8080";

/// Environment variable names for endpoint overrides
const ENV_SCHEME: &str = "WMCLIENT_SCHEME";
const ENV_HOST: &str = "WMCLIENT_HOST";
const ENV_PORT: &str = "WMCLIENT_PORT";
const ENV_BASE_URI: &str = "WMCLIENT_BASE_URI";

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    server: Option<ServerSection>,
    timeouts: Option<TimeoutSection>,
    cache: Option<CacheSection>,
}

#[derive(Debug, Deserialize, Default)]
struct ServerSection {
    scheme: Option<String>,
    host: Option<String>,
    port: Option<String>,
    base_uri: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TimeoutSection {
    /// Connection timeout in milliseconds
    connect_ms: Option<u64>,
    /// Transfer timeout in milliseconds
    transfer_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CacheSection {
    /// Header-based cache entries (0 leaves caching disabled)
    header_entries: Option<usize>,
    /// Device-id cache entries
    device_entries: Option<usize>,
}

/// Runtime client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub scheme: String,
    pub host: String,
    pub port: String,
    pub base_uri: String,
    pub connect_timeout: Duration,
    pub transfer_timeout: Duration,
    /// `None` leaves caching disabled
    pub header_cache_size: Option<usize>,
    pub device_cache_size: Option<usize>,
    /// Where the endpoint settings came from (for logging)
    pub source: ConfigSource,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT.to_string(),
            base_uri: String::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
            header_cache_size: None,
            device_cache_size: None,
            source: ConfigSource::Default,
        }
    }
}

/// Where the configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Using default hardcoded values
    Default,
    /// Loaded from environment variables
    Environment,
    /// Loaded from config file
    ConfigFile,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::ConfigFile => write!(f, "config file"),
        }
    }
}

/// Endpoint values taken from the environment
#[derive(Debug, Clone, Default)]
struct EnvOverrides {
    scheme: Option<String>,
    host: Option<String>,
    port: Option<String>,
    base_uri: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            scheme: read(ENV_SCHEME),
            host: read(ENV_HOST),
            port: read(ENV_PORT),
            base_uri: read(ENV_BASE_URI),
        }
    }

    fn is_empty(&self) -> bool {
        self.scheme.is_none() && self.host.is_none() && self.port.is_none() && self.base_uri.is_none()
    }
}

/// Get the path to the configuration file
fn get_config_file_path() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("wmclient").join("config.toml"))
}

/// Load configuration from a config file
fn load_config_file(path: &Path) -> Option<ConfigFile> {
    if !path.exists() {
        return None;
    }

    match fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!("Loaded config from {:?}", path);
                Some(config)
            }
            Err(e) => {
                tracing::warn!("Failed to parse config file {:?}: {}", path, e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read config file {:?}: {}", path, e);
            None
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Combine environment overrides, file values and defaults.
///
/// Endpoint fields: environment > config file > default. Timeouts and cache
/// sizes only come from the config file.
fn resolve(env: EnvOverrides, file: Option<ConfigFile>) -> ClientConfig {
    let mut config = ClientConfig::default();
    let file = file.unwrap_or_default();

    if let Some(server) = file.server {
        let mut from_file = false;
        if let Some(scheme) = non_empty(server.scheme) {
            config.scheme = scheme;
            from_file = true;
        }
        if let Some(host) = non_empty(server.host) {
            config.host = host;
            from_file = true;
        }
        if let Some(port) = non_empty(server.port) {
            config.port = port;
            from_file = true;
        }
        if let Some(base_uri) = non_empty(server.base_uri) {
            config.base_uri = base_uri;
            from_file = true;
        }
        if from_file {
            tracing::info!("Using WM server endpoint from config file: {}", config.host);
            config.source = ConfigSource::ConfigFile;
        }
    }

    if let Some(timeouts) = file.timeouts {
        if let Some(ms) = timeouts.connect_ms.filter(|ms| *ms > 0) {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = timeouts.transfer_ms.filter(|ms| *ms > 0) {
            config.transfer_timeout = Duration::from_millis(ms);
        }
    }

    if let Some(cache) = file.cache {
        config.header_cache_size = cache.header_entries.filter(|n| *n > 0);
        config.device_cache_size = cache.device_entries.filter(|n| *n > 0);
    }

    if !env.is_empty() {
        if let Some(scheme) = env.scheme {
            config.scheme = scheme;
        }
        if let Some(host) = env.host {
            config.host = host;
        }
        if let Some(port) = env.port {
            config.port = port;
        }
        if let Some(base_uri) = env.base_uri {
            config.base_uri = base_uri;
        }
        tracing::info!("Using WM server endpoint from environment variables: {}", config.host);
        config.source = ConfigSource::Environment;
    }

    if config.source == ConfigSource::Default {
        tracing::debug!("Using default WM server endpoint: {}:{}", config.host, config.port);
    }
    config
}

/// Load client configuration with priority:
/// 1. Environment variables (WMCLIENT_HOST, WMCLIENT_PORT, ...)
/// 2. Config file (~/.config/wmclient/config.toml)
/// 3. Default values
pub fn load_client_config() -> ClientConfig {
    let file = get_config_file_path().and_then(|path| load_config_file(&path));
    resolve(EnvOverrides::from_env(), file)
}

/// Load client configuration from an explicit config file, still honoring
/// environment overrides
pub fn load_client_config_from(path: &Path) -> ClientConfig {
    resolve(EnvOverrides::from_env(), load_config_file(path))
}

/// Get the path to the config file for documentation purposes
pub fn get_config_file_path_string() -> String {
    get_config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.config/wmclient/config.toml".to_string())
}

/// Generate example config file content
pub fn generate_example_config() -> String {
    r#"# WM client configuration
# Place this file at: ~/.config/wmclient/config.toml

[server]
# scheme = "http"
# host = "localhost"
# port = "8080"
# base_uri = ""

[timeouts]
# connect_ms = 10000
# transfer_ms = 60000

[cache]
# Caching stays disabled unless one of these is set. With only
# header_entries the device cache gets 20000 entries.
# header_entries = 100000
# device_entries = 20000
"#
    .to_string()
}
