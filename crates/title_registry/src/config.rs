//! Registry configuration and logging setup

use crate::registry::TitleRegistry;
use crate::storage::{MemoryBackend, RegistryBackend};
use anyhow::{bail, Context, Result};
use config::{Config, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment prefix, e.g. `TITLE_REGISTRY__STORAGE__BACKEND=sled`.
pub const ENV_PREFIX: &str = "TITLE_REGISTRY";

/// Registry configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Sled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Database directory, used by the sled backend.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            path: PathBuf::from("./data/titles"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    /// "pretty" or "compact"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl RegistryConfig {
    /// Load defaults, then `path` (if given), then `TITLE_REGISTRY__*` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                bail!("Configuration file {} not found", path.display());
            }
            builder = builder.add_source(ConfigFile::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );

        let config = builder
            .build()
            .context("failed to assemble registry configuration")?;
        let parsed: RegistryConfig = config
            .try_deserialize()
            .context("invalid registry configuration")?;
        Ok(parsed)
    }
}

impl TitleRegistry<Box<dyn RegistryBackend>> {
    /// Open a registry with the backend named in `config`.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let backend: Box<dyn RegistryBackend> = match config.backend {
            BackendKind::Memory => Box::new(MemoryBackend),
            #[cfg(feature = "persistent")]
            BackendKind::Sled => {
                info!(path = %config.path.display(), "Opening sled title store");
                Box::new(crate::storage::SledBackend::open(&config.path)?)
            }
            #[cfg(not(feature = "persistent"))]
            BackendKind::Sled => bail!("sled backend requires the `persistent` feature"),
        };
        Ok(TitleRegistry::with_backend(backend)?)
    }
}

/// Install the global tracing subscriber. Later calls are no-ops.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let result = if config.format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init()
    };

    if result.is_ok() {
        info!(level = %config.level, "Tracing initialised");
    }
}
