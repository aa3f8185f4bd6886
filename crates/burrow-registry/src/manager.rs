//! Shared, lock-guarded registry root

use crate::controller::TunnelController;
use crate::error::RegistryError;
use crate::group::{GroupSummary, TunnelGroup};
use crate::tunnel::Tunnel;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

/// Root of the tunnel group tree
///
/// Cloning is cheap; every clone refers to the same tree. Each public
/// operation holds the tree-wide lock for its whole read-modify sequence, so
/// concurrent callers never observe a half-applied move.
#[derive(Debug, Clone, Default)]
pub struct TunnelManager {
    root: Arc<RwLock<TunnelGroup>>,
}

impl TunnelManager {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap each tunnel in a controller keyed by its identifier
    ///
    /// Controllers get successive port annotations starting right after
    /// `base_port`.
    pub fn from_tunnels<I>(tunnels: I, base_port: u16) -> Self
    where
        I: IntoIterator<Item = Box<dyn Tunnel>>,
    {
        let manager = Self::new();
        {
            let mut root = manager.write();
            let mut port = base_port;
            for tunnel in tunnels {
                port = port.wrapping_add(1);
                let id = tunnel.id().to_string();
                if root.insert(id.clone(), TunnelController::new(tunnel, port)).is_some() {
                    warn!(tunnel_id = %id, "Duplicate tunnel ID, keeping the last one");
                }
            }
            info!("Registry created with {} tunnel(s)", root.tunnel_count());
        }
        manager
    }

    /// Like [`from_tunnels`](Self::from_tunnels), but keyed by the map's names
    ///
    /// Names are visited in sorted order. A tunnel whose identifier was
    /// already registered under another name is skipped.
    pub fn from_map(tunnels: HashMap<String, Box<dyn Tunnel>>, base_port: u16) -> Self {
        let mut entries: Vec<_> = tunnels.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let manager = Self::new();
        {
            let mut root = manager.write();
            let mut seen = HashSet::new();
            let mut port = base_port;
            for (name, tunnel) in entries {
                if !seen.insert(tunnel.id().to_string()) {
                    warn!(tunnel_id = %tunnel.id(), name = %name, "Duplicate tunnel ID, skipping");
                    continue;
                }
                port = port.wrapping_add(1);
                root.insert(name, TunnelController::new(tunnel, port));
            }
            info!("Registry created with {} tunnel(s)", root.tunnel_count());
        }
        manager
    }

    /// Run `f` against the group at `path` under the shared lock
    pub fn with_group<R>(
        &self,
        path: &[String],
        f: impl FnOnce(&TunnelGroup) -> R,
    ) -> Result<R, RegistryError> {
        let root = self.read();
        let group = root.group(path).ok_or_else(|| group_not_found(path))?;
        Ok(f(group))
    }

    /// Run `f` against the group at `path` under the exclusive lock
    pub fn with_group_mut<R>(
        &self,
        path: &[String],
        f: impl FnOnce(&mut TunnelGroup) -> R,
    ) -> Result<R, RegistryError> {
        let mut root = self.write();
        let group = root.group_mut(path).ok_or_else(|| group_not_found(path))?;
        Ok(f(group))
    }

    pub fn list(&self) -> Vec<String> {
        self.read().list()
    }

    pub fn list_all_below(&self) -> Vec<String> {
        self.read().list_all_below()
    }

    pub fn groups(&self) -> Vec<GroupSummary> {
        self.read().groups()
    }

    pub fn all_groups(&self) -> Vec<GroupSummary> {
        self.read().all_groups()
    }

    pub fn list_group(&self, group: &str) -> Vec<String> {
        self.read().list_group(group)
    }

    pub fn group_groups(&self, group: &str) -> Vec<GroupSummary> {
        self.read().group_groups(group)
    }

    pub fn find(&self, id: &str) -> Result<(TunnelController, String), RegistryError> {
        self.read().find(id)
    }

    /// Kind search; takes the exclusive lock because matches get tagged
    pub fn find_a_type(&self, kind: &str) -> Result<Vec<TunnelController>, RegistryError> {
        self.write().find_a_type(kind)
    }

    pub fn move_tunnel(&self, id: &str, group: &str) -> Result<TunnelController, RegistryError> {
        self.write().move_tunnel(id, group)
    }

    // A panic while holding the lock cannot leave the tree half-moved: every
    // mutation is a single remove followed by a single insert.
    fn read(&self) -> RwLockReadGuard<'_, TunnelGroup> {
        self.root.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TunnelGroup> {
        self.root.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn group_not_found(path: &[String]) -> RegistryError {
    RegistryError::GroupNotFound {
        path: path.join("/"),
    }
}
