//! Type-tag dispatch from tunnel file entries to constructors

use crate::tunnel::{ForwarderTunnel, TunnelFile, TunnelSection};
use crate::ConfigError;
use burrow_registry::Tunnel;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// Builds a tunnel handle from one file entry
pub type Constructor = fn(&TunnelSection) -> Result<Box<dyn Tunnel>, ConfigError>;

const DEFAULT_CLIENT_HOST: &str = "127.0.0.1";

/// Table mapping type tags to constructors
///
/// `TunnelFactory::default()` knows every built-in forwarder type; use
/// [`register`](Self::register) to add or replace entries.
#[derive(Debug, Clone)]
pub struct TunnelFactory {
    constructors: HashMap<String, Constructor>,
}

impl TunnelFactory {
    /// Create a factory with no known types
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Add or replace the constructor for `kind`
    pub fn register(&mut self, kind: impl Into<String>, constructor: Constructor) {
        self.constructors.insert(kind.into(), constructor);
    }

    /// Registered type tags, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Build one tunnel from its entry
    pub fn build(&self, section: &TunnelSection) -> Result<Box<dyn Tunnel>, ConfigError> {
        let kind = section
            .kind
            .as_deref()
            .ok_or_else(|| ConfigError::MissingType {
                name: section.name.clone(),
            })?;

        let constructor = self
            .constructors
            .get(kind)
            .ok_or_else(|| ConfigError::UnknownType {
                name: section.name.clone(),
                kind: kind.to_string(),
            })?;

        debug!(tunnel = %section.name, kind = %kind, "Building tunnel");
        constructor(section)
    }

    /// Build every tunnel of a parsed file, in file order
    ///
    /// Any failing entry aborts the whole load.
    pub fn build_all(&self, file: &TunnelFile) -> Result<Vec<Box<dyn Tunnel>>, ConfigError> {
        let mut seen = HashSet::new();
        let mut tunnels = Vec::with_capacity(file.tunnels.len());

        for section in &file.tunnels {
            if !seen.insert(section.name.as_str()) {
                return Err(ConfigError::Duplicate(section.name.clone()));
            }
            tunnels.push(self.build(section)?);
        }

        Ok(tunnels)
    }

    /// Parse YAML text and build its tunnels
    pub fn load_str(&self, yaml: &str) -> Result<Vec<Box<dyn Tunnel>>, ConfigError> {
        let file: TunnelFile = serde_yaml::from_str(yaml)?;
        self.build_all(&file)
    }

    /// Read a tunnel file and build its tunnels
    pub fn load(&self, path: &Path) -> Result<Vec<Box<dyn Tunnel>>, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let tunnels = self.load_str(&yaml)?;
        info!("Loaded {} tunnel(s) from {:?}", tunnels.len(), path);
        Ok(tunnels)
    }
}

impl Default for TunnelFactory {
    fn default() -> Self {
        let mut factory = Self::empty();

        for kind in ["server", "http", "udpserver", "eephttpd", "debrepo", "tracker"] {
            factory.register(kind, server_tunnel);
        }
        for kind in ["client", "udpclient"] {
            factory.register(kind, client_tunnel);
        }
        for kind in ["httpclient", "browserclient"] {
            factory.register(kind, proxy_tunnel);
        }

        factory
    }
}

/// Services exposed from a local `host:port`
fn server_tunnel(section: &TunnelSection) -> Result<Box<dyn Tunnel>, ConfigError> {
    let host = section.require_host()?.to_string();
    let port = section.require_port()?;
    Ok(forwarder(section, host, port, section.destination.clone()))
}

/// Local listeners forwarding to one remote destination
fn client_tunnel(section: &TunnelSection) -> Result<Box<dyn Tunnel>, ConfigError> {
    let port = section.require_port()?;
    let destination = section.require_destination()?.to_string();
    Ok(forwarder(section, client_host(section), port, Some(destination)))
}

/// Local proxies that pick the destination per request
fn proxy_tunnel(section: &TunnelSection) -> Result<Box<dyn Tunnel>, ConfigError> {
    let port = section.require_port()?;
    Ok(forwarder(section, client_host(section), port, None))
}

fn client_host(section: &TunnelSection) -> String {
    section
        .host
        .clone()
        .unwrap_or_else(|| DEFAULT_CLIENT_HOST.to_string())
}

fn forwarder(
    section: &TunnelSection,
    host: String,
    port: u16,
    destination: Option<String>,
) -> Box<dyn Tunnel> {
    let tunnel = ForwarderTunnel {
        name: section.name.clone(),
        kind: section.kind.clone().unwrap_or_default(),
        host,
        port,
        destination,
        options: section.options.clone(),
    };
    debug!(
        tunnel = %tunnel.name,
        local = %tunnel.local_addr(),
        destination = tunnel.destination.as_deref().unwrap_or("-"),
        "Configured forwarder"
    );
    Box::new(tunnel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
tunnels:
  - name: web
    type: server
    host: 127.0.0.1
    port: 8080
    keys: web.dat
  - name: irc
    type: client
    port: 6668
    destination: irc.example.i2p
  - name: proxy
    type: httpclient
    host: 0.0.0.0
    port: 4444
"#;

    #[test]
    fn test_default_kinds() {
        let factory = TunnelFactory::default();
        assert_eq!(
            factory.kinds(),
            vec![
                "browserclient",
                "client",
                "debrepo",
                "eephttpd",
                "http",
                "httpclient",
                "server",
                "tracker",
                "udpclient",
                "udpserver",
            ]
        );
    }

    #[test]
    fn test_load_str_builds_in_order() {
        let tunnels = TunnelFactory::default().load_str(SAMPLE).unwrap();
        let ids: Vec<(&str, &str)> = tunnels.iter().map(|t| (t.id(), t.kind())).collect();

        assert_eq!(
            ids,
            vec![("web", "server"), ("irc", "client"), ("proxy", "httpclient")]
        );
    }

    #[test]
    fn test_section_fields() {
        let file: TunnelFile = serde_yaml::from_str(SAMPLE).unwrap();
        let web = &file.tunnels[0];

        assert_eq!(web.kind.as_deref(), Some("server"));
        assert_eq!(web.require_port().unwrap(), 8080);
        assert_eq!(
            web.options.get("keys"),
            Some(&serde_yaml::Value::String("web.dat".to_string()))
        );

        let irc = &file.tunnels[1];
        assert!(irc.host.is_none());
        assert_eq!(irc.require_destination().unwrap(), "irc.example.i2p");
    }

    #[test]
    fn test_missing_type() {
        let yaml = "tunnels:\n  - name: web\n    host: 127.0.0.1\n    port: 80\n";
        let err = TunnelFactory::default().load_str(yaml).err().unwrap();
        assert!(matches!(err, ConfigError::MissingType { ref name } if name == "web"));
    }

    #[test]
    fn test_unknown_type() {
        let yaml = "tunnels:\n  - name: web\n    type: teleporter\n    port: 80\n";
        let err = TunnelFactory::default().load_str(yaml).err().unwrap();
        assert!(matches!(err, ConfigError::UnknownType { ref kind, .. } if kind == "teleporter"));
    }

    #[test]
    fn test_missing_required_field() {
        let yaml = "tunnels:\n  - name: web\n    type: server\n    port: 80\n";
        let err = TunnelFactory::default().load_str(yaml).err().unwrap();
        assert!(matches!(err, ConfigError::MissingField { field: "host", .. }));

        let yaml = "tunnels:\n  - name: irc\n    type: client\n    port: 6668\n";
        let err = TunnelFactory::default().load_str(yaml).err().unwrap();
        assert!(matches!(err, ConfigError::MissingField { field: "destination", .. }));
    }

    #[test]
    fn test_duplicate_names() {
        let yaml = "tunnels:\n  - name: a\n    type: httpclient\n    port: 1\n  - name: a\n    type: httpclient\n    port: 2\n";
        let err = TunnelFactory::default().load_str(yaml).err().unwrap();
        assert!(matches!(err, ConfigError::Duplicate(ref name) if name == "a"));
    }

    #[test]
    fn test_custom_constructor() {
        fn fixed(section: &TunnelSection) -> Result<Box<dyn Tunnel>, ConfigError> {
            Ok(Box::new(ForwarderTunnel {
                name: section.name.clone(),
                kind: "custom".to_string(),
                host: "localhost".to_string(),
                port: 1,
                destination: None,
                options: Default::default(),
            }))
        }

        let mut factory = TunnelFactory::empty();
        factory.register("custom", fixed);

        let tunnels = factory
            .load_str("tunnels:\n  - name: x\n    type: custom\n")
            .unwrap();
        assert_eq!(tunnels[0].kind(), "custom");

        let err = factory
            .load_str("tunnels:\n  - name: y\n    type: server\n")
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::UnknownType { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let tunnels = TunnelFactory::default().load(file.path()).unwrap();
        assert_eq!(tunnels.len(), 3);
    }

    #[test]
    fn test_load_missing_file() {
        let err = TunnelFactory::default()
            .load(Path::new("/nonexistent/tunnels.yml"))
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_empty_file_has_no_tunnels() {
        let tunnels = TunnelFactory::default().load_str("tunnels: []\n").unwrap();
        assert!(tunnels.is_empty());
    }
}
