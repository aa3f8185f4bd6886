//! Controller wrapping a single tunnel handle

use crate::tunnel::Tunnel;
use std::sync::{Arc, Mutex, PoisonError};

/// A tunnel plus its organizational bookkeeping
///
/// Cloning is cheap and every clone refers to the same tunnel, so the
/// controller can sit in the registry while a caller holds a copy returned
/// from a search.
#[derive(Debug, Clone)]
pub struct TunnelController {
    inner: Arc<ControllerInner>,
}

#[derive(Debug)]
struct ControllerInner {
    tunnel: Box<dyn Tunnel>,
    /// Side annotation assigned at construction, never bound
    port: u16,
    /// One-shot "found in group X" marker, cleared on read
    group: Mutex<String>,
}

impl TunnelController {
    /// Wrap a tunnel. The controller takes ownership of the handle.
    pub fn new(tunnel: Box<dyn Tunnel>, port: u16) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                tunnel,
                port,
                group: Mutex::new(String::new()),
            }),
        }
    }

    pub fn id(&self) -> &str {
        self.inner.tunnel.id()
    }

    pub fn kind(&self) -> &str {
        self.inner.tunnel.kind()
    }

    pub fn port(&self) -> u16 {
        self.inner.port
    }

    pub fn tunnel(&self) -> &dyn Tunnel {
        self.inner.tunnel.as_ref()
    }

    /// Store the pending group tag, replacing any unread one
    pub fn set_group(&self, group: impl Into<String>) {
        let mut tag = self.inner.group.lock().unwrap_or_else(PoisonError::into_inner);
        *tag = group.into();
    }

    /// Return the pending group tag and reset it to empty
    ///
    /// A second call without an intervening [`set_group`](Self::set_group)
    /// returns an empty string.
    pub fn take_group(&self) -> String {
        let mut tag = self.inner.group.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *tag)
    }

    /// Whether both controllers wrap the very same tunnel handle
    pub fn same_tunnel(&self, other: &TunnelController) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
