//! Configuration loader implementation
//!
//! Layers defaults, a JSON file and environment variables with the `config`
//! crate.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use log::debug;

use crate::common::Result;

use super::defaults;
use super::AppConfig;

/// Trait for loading configuration
pub trait ConfigLoader {
    /// Load defaults overlaid with a required JSON file
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self>
    where
        Self: Sized;

    /// Load defaults overlaid with `FLOWTAP__*` environment variables
    fn from_env() -> Result<Self>
    where
        Self: Sized;

    /// Load with full priority: defaults, optional file, environment
    fn load(path: Option<&Path>) -> Result<Self>
    where
        Self: Sized;

    /// [`load`](Self::load) from `$FLOWTAP_CONFIG_FILE`, or `flowtap.json`
    /// in the working directory when unset
    fn auto_load() -> Result<Self>
    where
        Self: Sized;
}

fn environment() -> Environment {
    Environment::with_prefix(defaults::ENV_PREFIX)
        .separator(defaults::ENV_SEPARATOR)
        .try_parsing(true)
}

fn json_file(path: &Path, required: bool) -> File<config::FileSourceFile, FileFormat> {
    File::from(path).format(FileFormat::Json).required(required)
}

impl ConfigLoader for AppConfig {
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config: Self = Config::builder()
            .add_source(json_file(path, true))
            .build()?
            .try_deserialize()?;
        debug!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    fn from_env() -> Result<Self> {
        let config: Self = Config::builder().add_source(environment()).build()?.try_deserialize()?;
        Ok(config)
    }

    fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            // An explicitly named file must exist
            builder = builder.add_source(json_file(path, true));
        }
        let config: Self = builder.add_source(environment()).build()?.try_deserialize()?;
        if let Some(path) = path {
            debug!("Configuration loaded from {} and environment", path.display());
        }
        Ok(config)
    }

    fn auto_load() -> Result<Self> {
        let path = std::env::var(defaults::CONFIG_FILE_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(defaults::DEFAULT_CONFIG_FILE));

        if path.exists() {
            Self::load(Some(&path))
        } else {
            debug!("No configuration file at {}, using defaults and environment", path.display());
            Self::load(None)
        }
    }
}
