//! YAML configuration
//!
//! Every field has a default, so an empty file (or none at all) is a valid
//! configuration. Command-line flags are layered on top by the binary.
//!
//! ```yaml
//! extract:
//!   output_dir: kg_staging
//! load:
//!   batch_size: 2000
//! store:
//!   type: http
//!   url: http://localhost:7474
//!   password: secret
//! ```

use crate::backend::{BackendResult, EmbeddedBackend, GraphBackend, HttpBackend, HttpConfig};
use crate::ingest::ExtractOptions;
use crate::load::LoadOptions;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub extract: ExtractConfig,
    pub load: LoadConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Directory receiving the per-kind JSONL files
    pub output_dir: PathBuf,
    pub progress_interval: u64,
    pub excerpt_chars: usize,
    /// Documents between sink flushes
    pub flush_interval: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        let options = ExtractOptions::default();
        Self {
            output_dir: PathBuf::from("kg_staging"),
            progress_interval: options.progress_interval,
            excerpt_chars: options.excerpt_chars,
            flush_interval: options.flush_interval,
        }
    }
}

impl ExtractConfig {
    pub fn options(&self) -> ExtractOptions {
        ExtractOptions {
            excerpt_chars: self.excerpt_chars,
            progress_interval: self.progress_interval.max(1),
            flush_interval: self.flush_interval.max(1),
            ..ExtractOptions::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub batch_size: usize,
    pub concurrency: usize,
}

impl Default for LoadConfig {
    fn default() -> Self {
        let options = LoadOptions::default();
        Self {
            batch_size: options.batch_size,
            concurrency: options.concurrency,
        }
    }
}

impl LoadConfig {
    pub fn options(&self) -> LoadOptions {
        LoadOptions {
            batch_size: self.batch_size.max(1),
            concurrency: self.concurrency.max(1),
        }
    }
}

/// Which graph store to talk to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    Embedded {
        #[serde(default = "default_snapshot")]
        snapshot: PathBuf,
    },
    Http(HttpConfig),
}

fn default_snapshot() -> PathBuf {
    PathBuf::from("trialgraph.snapshot")
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Embedded {
            snapshot: default_snapshot(),
        }
    }
}

impl StoreConfig {
    pub fn open(&self) -> BackendResult<Box<dyn GraphBackend>> {
        match self {
            StoreConfig::Embedded { snapshot } => Ok(Box::new(EmbeddedBackend::open(snapshot)?)),
            StoreConfig::Http(config) => {
                info!("Connecting to {} (database {})", config.url, config.database);
                Ok(Box::new(HttpBackend::new(config.clone())))
            }
        }
    }
}

impl Config {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Load `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_yaml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.extract.output_dir, PathBuf::from("kg_staging"));
        assert_eq!(config.extract.excerpt_chars, 400);
        assert_eq!(config.load.batch_size, 5000);
        assert_eq!(config.load.concurrency, 4);
        assert_eq!(
            config.store,
            StoreConfig::Embedded {
                snapshot: PathBuf::from("trialgraph.snapshot")
            }
        );
    }

    #[test]
    fn test_partial_config() {
        let yaml = "
load:
  batch_size: 200
store:
  type: http
  url: http://graph:7474
  password: secret
";
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.load.batch_size, 200);
        assert_eq!(config.load.concurrency, 4);
        assert_eq!(config.extract.progress_interval, 1000);
        match config.store {
            StoreConfig::Http(http) => {
                assert_eq!(http.url, "http://graph:7474");
                assert_eq!(http.database, "neo4j");
                assert_eq!(http.username, "neo4j");
                assert_eq!(http.password.as_deref(), Some("secret"));
            }
            other => panic!("expected http store, got {:?}", other),
        }
    }

    #[test]
    fn test_options_clamp_zero() {
        let config = Config::from_yaml("load:\n  batch_size: 0\n  concurrency: 0\n").unwrap();
        let options = config.load.options();
        assert_eq!(options.batch_size, 1);
        assert_eq!(options.concurrency, 1);
    }

    #[test]
    fn test_load_missing_file_and_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = Config::load(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(missing, Config::default());

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "load: [1, 2").unwrap();
        assert!(matches!(Config::load(&bad), Err(ConfigError::Parse { .. })));
    }

    #[tokio::test]
    async fn test_open_embedded_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreConfig::Embedded {
            snapshot: dir.path().join("graph.snapshot"),
        };
        let backend = store.open().unwrap();
        assert_eq!(backend.name(), "embedded");
    }
}
