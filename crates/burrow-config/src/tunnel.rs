//! File format and the tunnel handles built from it

use crate::ConfigError;
use burrow_registry::Tunnel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level tunnel file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TunnelFile {
    #[serde(default)]
    pub tunnels: Vec<TunnelSection>,
}

/// One tunnel entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelSection {
    /// Tunnel name, used as its registry identifier
    pub name: String,

    /// Type tag selecting the constructor
    #[serde(rename = "type")]
    pub kind: Option<String>,

    /// Local host the tunnel listens on or forwards to
    pub host: Option<String>,

    /// Local port the tunnel listens on or forwards to
    pub port: Option<u16>,

    /// Remote destination for client tunnels
    pub destination: Option<String>,

    /// Type-specific settings passed through untouched
    #[serde(flatten)]
    pub options: BTreeMap<String, serde_yaml::Value>,
}

impl TunnelSection {
    pub fn require_port(&self) -> Result<u16, ConfigError> {
        self.port.ok_or_else(|| self.missing("port"))
    }

    pub fn require_host(&self) -> Result<&str, ConfigError> {
        self.host.as_deref().ok_or_else(|| self.missing("host"))
    }

    pub fn require_destination(&self) -> Result<&str, ConfigError> {
        self.destination
            .as_deref()
            .ok_or_else(|| self.missing("destination"))
    }

    fn missing(&self, field: &'static str) -> ConfigError {
        ConfigError::MissingField {
            name: self.name.clone(),
            field,
        }
    }
}

/// A forwarder described by a tunnel file entry
#[derive(Debug, Clone, PartialEq)]
pub struct ForwarderTunnel {
    pub name: String,
    pub kind: String,
    pub host: String,
    pub port: u16,
    pub destination: Option<String>,
    pub options: BTreeMap<String, serde_yaml::Value>,
}

impl ForwarderTunnel {
    /// Local `host:port` of the forwarder
    pub fn local_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Tunnel for ForwarderTunnel {
    fn id(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        &self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarder_identity_and_address() {
        let tunnel = ForwarderTunnel {
            name: "irc".to_string(),
            kind: "client".to_string(),
            host: "127.0.0.1".to_string(),
            port: 6668,
            destination: Some("irc.example.i2p".to_string()),
            options: BTreeMap::new(),
        };

        assert_eq!(tunnel.local_addr(), "127.0.0.1:6668");
        assert_eq!(Tunnel::id(&tunnel), "irc");
        assert_eq!(Tunnel::kind(&tunnel), "client");
    }
}
