//! Free Speech Configuration System
//!
//! Loads configuration from YAML files with a cascading priority system:
//! 1. `./freespeech.yaml` (current directory - highest priority)
//! 2. `~/.freespeech.yaml` (home directory)
//! 3. `~/.config/freespeech/freespeech.yaml` (user config directory)
//! 4. `/etc/freespeech/freespeech.yaml` (system - lowest priority)
//!
//! Values from higher priority files override those from lower priority files.
//!
//! # YAML Structure
//!
//! ```yaml
//! node:
//!   identity:
//!     key_file: /var/lib/freespeech/node.pem
//!   session:
//!     handshake_timeout_ms: 2000
//!   crypto:
//!     iv_mode: random
//! transports:
//!   udp:
//!     bind_addr: "0.0.0.0:0"
//! endpoints: [4000]
//! first_hops:
//!   - address: "203.0.113.7:4000"
//!     thumbprint: "9f86d0..."
//!     public_key_file: /etc/freespeech/hop.pub.pem
//! ```

mod node;
mod peer;
mod transport;

use crate::{Identity, IdentityError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use node::{CryptoConfig, IdentityConfig, NodeConfig, SessionConfig, DEFAULT_KEY_BITS};
pub use peer::FirstHopConfig;
pub use transport::{TransportsConfig, UdpConfig};

/// Default config filename.
const CONFIG_FILENAME: &str = "freespeech.yaml";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Node configuration (`node.*`).
    #[serde(default)]
    pub node: NodeConfig,

    /// Transport template (`transports.*`).
    #[serde(default, skip_serializing_if = "TransportsConfig::is_empty")]
    pub transports: TransportsConfig,

    /// Public endpoint ports to listen on (`endpoints`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<u16>,

    /// Well-known peers (`first_hops`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub first_hops: Vec<FirstHopConfig>,
}

impl Config {
    /// Create a new empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the standard search paths.
    ///
    /// Returns a tuple of (config, paths_loaded) where paths_loaded contains
    /// the paths that were successfully loaded.
    pub fn load() -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let search_paths = Self::search_paths();
        Self::load_from_paths(&search_paths)
    }

    /// Load an explicit file when given, otherwise search the standard paths.
    ///
    /// An explicit file must exist.
    pub fn load_or_search(path: Option<&Path>) -> Result<(Self, Vec<PathBuf>), ConfigError> {
        match path {
            Some(path) => Ok((Self::load_file(path)?, vec![path.to_path_buf()])),
            None => Self::load(),
        }
    }

    /// Load configuration from specific paths.
    ///
    /// Paths are processed in order, with later paths overriding earlier ones.
    pub fn load_from_paths(paths: &[PathBuf]) -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let mut config = Config::default();
        let mut loaded_paths = Vec::new();

        for path in paths {
            if path.exists() {
                let file_config = Self::load_file(path)?;
                config.merge(file_config);
                loaded_paths.push(path.clone());
            }
        }

        Ok((config, loaded_paths))
    }

    /// Load configuration from a single file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the standard search paths in priority order (lowest to highest).
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // System config (lowest priority)
        paths.push(PathBuf::from("/etc/freespeech").join(CONFIG_FILENAME));

        // User config directory
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("freespeech").join(CONFIG_FILENAME));
        }

        // Home directory
        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".freespeech.yaml"));
        }

        // Current directory (highest priority)
        paths.push(PathBuf::from(".").join(CONFIG_FILENAME));

        paths
    }

    /// Merge another configuration into this one.
    ///
    /// Values from `other` override values in `self` when present.
    pub fn merge(&mut self, other: Config) {
        self.node.merge(other.node);
        self.transports.merge(other.transports);
        // Lists replace wholesale when non-empty
        if !other.endpoints.is_empty() {
            self.endpoints = other.endpoints;
        }
        if !other.first_hops.is_empty() {
            self.first_hops = other.first_hops;
        }
    }

    /// Create the node identity from this configuration.
    ///
    /// With a key file configured, the key is loaded from it (or generated
    /// and written there). Otherwise an ephemeral key is generated.
    pub fn create_identity(&self) -> Result<Identity, ConfigError> {
        let bits = self.node.identity.key_bits();
        match &self.node.identity.key_file {
            Some(path) => Ok(Identity::load_or_generate(path, bits)?.0),
            None => Ok(Identity::generate(bits)?),
        }
    }

    /// Check if a persistent identity is configured (vs. ephemeral).
    pub fn has_identity(&self) -> bool {
        self.node.identity.key_file.is_some()
    }

    /// Serialize this configuration to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
