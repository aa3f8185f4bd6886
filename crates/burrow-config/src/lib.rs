//! Tunnel file loading
//!
//! Builds the initial set of tunnel handles from a YAML file. Each entry
//! names a `type`; the [`TunnelFactory`] looks that tag up in its
//! constructor table and hands the entry to the matching constructor.

pub mod factory;
pub mod tunnel;

pub use factory::{Constructor, TunnelFactory};
pub use tunnel::{ForwarderTunnel, TunnelFile, TunnelSection};

use std::path::PathBuf;
use thiserror::Error;

/// Default tunnel file name, resolved against the working directory
pub const DEFAULT_TUNNEL_FILE: &str = "tunnels.yml";

/// Errors building tunnels from configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read tunnel file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse tunnel file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Error processing tunnel {name}: the type field is required")]
    MissingType { name: String },

    #[error("Error processing tunnel {name}: unknown type {kind:?}")]
    UnknownType { name: String, kind: String },

    #[error("Error processing tunnel {name}: missing required field {field}")]
    MissingField { name: String, field: &'static str },

    #[error("Duplicate tunnel name: {0}")]
    Duplicate(String),
}
