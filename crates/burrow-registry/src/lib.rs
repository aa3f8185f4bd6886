//! Hierarchical registry of live tunnels
//!
//! Tunnels are handed in already constructed and are only identified and
//! classified here. The registry wraps each one in a [`TunnelController`],
//! indexes it by identifier and lets operators sort tunnels into a tree of
//! named groups.

pub mod controller;
pub mod error;
pub mod group;
pub mod manager;
pub mod tunnel;

pub use controller::TunnelController;
pub use error::RegistryError;
pub use group::{GroupSummary, TunnelGroup};
pub use manager::TunnelManager;
pub use tunnel::Tunnel;
