use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use bootwire_core::configuration::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_PROTOCOL, DEFAULT_ROOT_PATH};
use bootwire_core::{ConfigurationBuilder, ParseSslClientAuthError, SslClientAuth, Value};
use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "bootwire.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {source}")]
    Invalid {
        key: &'static str,
        #[source]
        source: ParseSslClientAuthError,
    },
}

#[derive(Debug, Default, Deserialize)]
pub struct BootwireConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Free-form properties passed through to the provider as strings.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: i32,
    #[serde(default = "default_root_path")]
    pub root_path: String,
    #[serde(default = "default_client_auth")]
    pub ssl_client_authentication: String,
}

fn default_protocol() -> String {
    DEFAULT_PROTOCOL.into()
}
fn default_host() -> String {
    DEFAULT_HOST.into()
}
fn default_port() -> i32 {
    DEFAULT_PORT
}
fn default_root_path() -> String {
    DEFAULT_ROOT_PATH.into()
}
fn default_client_auth() -> String {
    "none".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            host: default_host(),
            port: default_port(),
            root_path: default_root_path(),
            ssl_client_authentication: default_client_auth(),
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub port: Option<i32>,
    pub root_path: Option<String>,
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::Defaults => f.write_str("defaults"),
        }
    }
}

impl BootwireConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `explicit` if given, else the first `bootwire.toml` found in the
    /// working directory or the user config directory, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, ConfigSource), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Self::from_file(path)?, ConfigSource::File(path.to_path_buf())));
        }

        for candidate in search_paths() {
            if candidate.is_file() {
                tracing::debug!(path = %candidate.display(), "Using config file");
                let config = Self::from_file(&candidate)?;
                return Ok((config, ConfigSource::File(candidate)));
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok((Self::default(), ConfigSource::Defaults))
    }

    /// Builder holding the file values with `overrides` applied on top.
    pub fn to_builder(&self, overrides: &Overrides) -> Result<ConfigurationBuilder, ConfigError> {
        let client_auth: SslClientAuth = self
            .server
            .ssl_client_authentication
            .parse()
            .map_err(|source| ConfigError::Invalid {
                key: "ssl_client_authentication",
                source,
            })?;

        let mut builder = bootwire_core::Configuration::builder();
        for (name, value) in &self.properties {
            builder = builder.property(name.as_str(), Some(Value::from(value.as_str())));
        }

        let server = &self.server;
        Ok(builder
            .protocol(overrides.protocol.clone().unwrap_or_else(|| server.protocol.clone()))
            .host(overrides.host.clone().unwrap_or_else(|| server.host.clone()))
            .port(overrides.port.unwrap_or(server.port))
            .root_path(normalize_root(
                overrides.root_path.as_deref().unwrap_or(&server.root_path),
            ))
            .ssl_client_authentication(client_auth))
    }
}

fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("bootwire").join(CONFIG_FILE_NAME));
    }
    paths
}

/// Root paths always start with `/`.
pub fn normalize_root(root: &str) -> String {
    if root.starts_with('/') {
        root.to_string()
    } else {
        format!("/{root}")
    }
}
