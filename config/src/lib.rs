//! Configuration for the Courier daemon.
//!
//! Read once at startup from `$COURIER_CONFIG` or `~/.courier/config.toml`,
//! then resolved with environment overrides into immutable settings. Nothing
//! here is consulted again after the thread manager is built.

use std::env;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use courier_types::{StackSize, ThreadConfig};
use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_ENV: &str = "COURIER_CONFIG";
pub const STACK_SIZE_ENV: &str = "COURIER_THREAD_STACK_SIZE";
pub const LISTEN_ENV: &str = "COURIER_LISTEN";

pub const DEFAULT_LISTEN: &str = "127.0.0.1:10500";
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    /// The config file involved, if the error came from reading one.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path),
            ConfigError::Invalid { .. } => None,
        }
    }

    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// The config file as written. Every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct CourierConfig {
    pub threads: Option<ThreadsConfig>,
    pub server: Option<ServerConfig>,
    pub log: Option<LogConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ThreadsConfig {
    /// Worker stack size in bytes.
    pub stack_size: Option<usize>,
    pub name_prefix: Option<String>,
    pub max_tracked: Option<usize>,
    pub max_live: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    pub listen: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive, used when `RUST_LOG` is unset.
    pub filter: Option<String>,
}

/// Values taken from the process environment, captured once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub stack_size: Option<String>,
    pub listen: Option<String>,
}

impl EnvOverrides {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            stack_size: env::var(STACK_SIZE_ENV).ok(),
            listen: env::var(LISTEN_ENV).ok(),
        }
    }
}

/// Fully resolved daemon settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub threads: ThreadConfig,
    pub listen: SocketAddr,
    pub log_filter: String,
}

impl CourierConfig {
    /// Load the config from its default location.
    ///
    /// A missing file is not an error; `Ok(None)` means "use defaults".
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file; using defaults");
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };
        Self::parse(&content).map_err(|err| {
            tracing::warn!("Failed to parse config at {:?}: {}", path, err);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source: err,
            }
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply `overrides` and defaults, validating every value.
    pub fn resolve(&self, overrides: &EnvOverrides) -> Result<Settings, ConfigError> {
        Ok(Settings {
            threads: self.resolve_threads(overrides)?,
            listen: self.resolve_listen(overrides)?,
            log_filter: self
                .log
                .as_ref()
                .and_then(|log| log.filter.clone())
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        })
    }

    pub fn resolve_threads(&self, overrides: &EnvOverrides) -> Result<ThreadConfig, ConfigError> {
        let file = self.threads.as_ref();
        let mut config = ThreadConfig::default();

        let stack_bytes = match &overrides.stack_size {
            Some(raw) => Some(raw.trim().parse::<usize>().map_err(|err| {
                ConfigError::invalid(STACK_SIZE_ENV, format!("'{raw}' is not a byte count: {err}"))
            })?),
            None => file.and_then(|threads| threads.stack_size),
        };
        if let Some(bytes) = stack_bytes {
            let stack_size = StackSize::new(bytes)
                .map_err(|err| ConfigError::invalid("threads.stack_size", err.to_string()))?;
            config = config.with_stack_size(stack_size);
        }

        if let Some(prefix) = file.and_then(|threads| threads.name_prefix.as_deref()) {
            if prefix.is_empty() || prefix.contains('\0') {
                return Err(ConfigError::invalid(
                    "threads.name_prefix",
                    "must be non-empty and free of NUL bytes",
                ));
            }
            config = config.with_name_prefix(prefix);
        }

        if let Some(max_tracked) = file.and_then(|threads| threads.max_tracked) {
            if max_tracked == 0 {
                return Err(ConfigError::invalid("threads.max_tracked", "must be at least 1"));
            }
            config = config.with_max_tracked(max_tracked);
        }

        if let Some(max_live) = file.and_then(|threads| threads.max_live) {
            if max_live == 0 {
                return Err(ConfigError::invalid("threads.max_live", "must be at least 1"));
            }
            config = config.with_max_live(Some(max_live));
        }

        Ok(config)
    }

    fn resolve_listen(&self, overrides: &EnvOverrides) -> Result<SocketAddr, ConfigError> {
        let (key, raw) = match &overrides.listen {
            Some(raw) => (LISTEN_ENV, raw.as_str()),
            None => (
                "server.listen",
                self.server
                    .as_ref()
                    .and_then(|server| server.listen.as_deref())
                    .unwrap_or(DEFAULT_LISTEN),
            ),
        };
        raw.trim()
            .parse()
            .map_err(|err| ConfigError::invalid(key, format!("'{raw}': {err}")))
    }
}

/// `$COURIER_CONFIG`, else `~/.courier/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    match env::var_os(CONFIG_ENV) {
        Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
        _ => dirs::home_dir().map(|home| home.join(".courier").join("config.toml")),
    }
}
