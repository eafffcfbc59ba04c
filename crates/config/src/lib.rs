//! File service configuration.
//!
//! Settings are read once at startup: an optional TOML file first, then
//! environment variables on top. The resulting [`Config`] is passed by
//! reference to whoever needs it.
//!
//! | variable          | field            | default     |
//! |-------------------|------------------|-------------|
//! | `HOST`            | `host`           | `localhost` |
//! | `PORT`            | `port`           | `8080`      |
//! | `LOCAL_ROOT`      | `local_root`     | `.`         |
//! | `DEBUG`           | `debug`          | `false`     |
//! | `CHUNK_SIZE`      | `chunk_size`     | `5`         |
//! | `CHUNK_DELAY_MS`  | `chunk_delay_ms` | unset       |

use std::path::{Path, PathBuf};
use std::time::Duration;

use filestream_transfer::{DEBUG_CHUNK_DELAY, DEFAULT_CHUNK_SIZE, TransferConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment variable naming the TOML file to load.
pub const CONFIG_PATH_ENV: &str = "FILESTREAM_CONFIG";

/// File loaded from the working directory when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_FILE: &str = "filestream.toml";

/// Errors produced while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Host the server binds to and the client connects to.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port (0 = auto-assign, server only).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Root directory; files live under `<local_root>/storage`.
    #[serde(default = "default_local_root")]
    pub local_root: String,

    /// Debug mode: paces every chunk by one second.
    #[serde(default)]
    pub debug: bool,

    /// Bytes per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Explicit per-chunk delay, overriding the debug pacing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_delay_ms: Option<u64>,
}

fn default_host() -> String {
    "localhost".into()
}

fn default_port() -> u16 {
    filestream_protocol::constants::DEFAULT_PORT
}

fn default_local_root() -> String {
    ".".into()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            local_root: default_local_root(),
            debug: false,
            chunk_size: default_chunk_size(),
            chunk_delay_ms: None,
        }
    }
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// `explicit` overrides the file location; otherwise
    /// `$FILESTREAM_CONFIG` is used, then `filestream.toml` if it exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(explicit, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::load`] with an injected variable lookup.
    pub fn load_with<F>(explicit: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => match non_empty(&lookup, CONFIG_PATH_ENV) {
                Some(p) => Some(PathBuf::from(p)),
                None => {
                    let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                    default.exists().then_some(default)
                }
            },
        };

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Defaults plus variable overrides, no file.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Reads a TOML file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "configuration file loaded");
        Ok(config)
    }

    /// Applies environment overrides. Empty values count as unset.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = non_empty(&lookup, "HOST") {
            self.host = v;
        }
        if let Some(v) = non_empty(&lookup, "PORT") {
            self.port = parse_number("PORT", v)?;
        }
        if let Some(v) = non_empty(&lookup, "LOCAL_ROOT") {
            self.local_root = v;
        }
        if let Some(v) = non_empty(&lookup, "DEBUG") {
            self.debug = parse_bool("DEBUG", v)?;
        }
        if let Some(v) = non_empty(&lookup, "CHUNK_SIZE") {
            self.chunk_size = parse_number("CHUNK_SIZE", v)?;
        }
        if let Some(v) = non_empty(&lookup, "CHUNK_DELAY_MS") {
            self.chunk_delay_ms = Some(parse_number("CHUNK_DELAY_MS", v)?);
        }
        self.validate()
    }

    /// Applies command-line flags, which win over file and environment.
    pub fn apply_cli(
        &mut self,
        host: Option<String>,
        port: Option<u16>,
        chunk_size: Option<usize>,
    ) -> Result<(), ConfigError> {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        if let Some(chunk_size) = chunk_size {
            self.chunk_size = chunk_size;
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "chunk_size",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.chunk_size > filestream_protocol::constants::MAX_CHUNK_SIZE {
            return Err(ConfigError::InvalidValue {
                key: "chunk_size",
                value: self.chunk_size.to_string(),
                reason: format!(
                    "must not exceed {}",
                    filestream_protocol::constants::MAX_CHUNK_SIZE
                ),
            });
        }
        Ok(())
    }

    /// `host:port` for binding or connecting.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The directory served by `ListFiles` and `Download`.
    pub fn storage_dir(&self) -> PathBuf {
        filestream_file_ops::expand_home(&self.local_root).join(filestream_file_ops::STORAGE_DIR)
    }

    /// Per-chunk pacing: the explicit delay, else one second in debug mode.
    pub fn chunk_delay(&self) -> Option<Duration> {
        match self.chunk_delay_ms {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None if self.debug => Some(DEBUG_CHUNK_DELAY),
            None => None,
        }
    }

    pub fn transfer_config(&self) -> TransferConfig {
        TransferConfig {
            chunk_size: self.chunk_size,
            chunk_delay: self.chunk_delay(),
        }
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.is_empty())
}

fn parse_number<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key,
        reason: e.to_string(),
        value,
    })
}

fn parse_bool(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value,
            reason: "expected a boolean".into(),
        }),
    }
}
