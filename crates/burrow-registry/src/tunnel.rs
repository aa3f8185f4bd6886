//! Capability interface for tunnels built outside the registry

use std::fmt;

/// A live tunnel handle
///
/// Implementations own the actual forwarder/listener. The registry only
/// ever asks who a tunnel is and what kind of tunnel it is.
pub trait Tunnel: Send + Sync + fmt::Debug {
    /// Caller-assigned identifier, unique among the tunnels given to one registry
    fn id(&self) -> &str;

    /// Classification tag (e.g. "server", "httpclient")
    fn kind(&self) -> &str;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Tunnel;

    #[derive(Debug)]
    pub struct TestTunnel {
        id: String,
        kind: String,
    }

    impl Tunnel for TestTunnel {
        fn id(&self) -> &str {
            &self.id
        }

        fn kind(&self) -> &str {
            &self.kind
        }
    }

    pub fn tunnel(id: &str, kind: &str) -> Box<dyn Tunnel> {
        Box::new(TestTunnel {
            id: id.to_string(),
            kind: kind.to_string(),
        })
    }
}
