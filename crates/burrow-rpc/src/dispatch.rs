//! Turns wire calls into registry operations

use crate::protocol::{RpcCall, RpcReply, RpcRequest, RpcResult, TunnelInfo};
use burrow_registry::{RegistryError, TunnelManager};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Run one call against the group named by its scope
pub fn dispatch(manager: &TunnelManager, call: RpcCall) -> RpcReply {
    let RpcCall { id, scope, request } = call;
    let method = request.method();

    match execute(manager, &scope, request) {
        Ok(result) => RpcReply::ok(id, result),
        Err(e) => {
            debug!(call_id = id, method, "Call failed: {}", e);
            RpcReply::error(id, e.into())
        }
    }
}

fn execute(
    manager: &TunnelManager,
    scope: &[String],
    request: RpcRequest,
) -> Result<RpcResult, RegistryError> {
    match request {
        RpcRequest::Ping => Ok(RpcResult::Pong),

        RpcRequest::List => manager.with_group(scope, |g| RpcResult::Tunnels { ids: g.list() }),

        RpcRequest::ListAllBelow => manager.with_group(scope, |g| RpcResult::Tunnels {
            ids: g.list_all_below(),
        }),

        RpcRequest::Groups => {
            manager.with_group(scope, |g| RpcResult::Groups { groups: g.groups() })
        }

        RpcRequest::AllGroups => manager.with_group(scope, |g| RpcResult::Groups {
            groups: g.all_groups(),
        }),

        RpcRequest::ListGroup { group } => manager.with_group(scope, |g| RpcResult::Tunnels {
            ids: g.list_group(&group),
        }),

        RpcRequest::GroupGroups { group } => manager.with_group(scope, |g| RpcResult::Groups {
            groups: g.group_groups(&group),
        }),

        RpcRequest::Find { id } => manager.with_group(scope, |g| {
            g.find(&id).map(|(controller, origin)| RpcResult::Found {
                tunnel: TunnelInfo::new(&controller, origin),
            })
        })?,

        // Tags are set and consumed under one exclusive lock.
        RpcRequest::FindAType { kind } => manager.with_group_mut(scope, |g| {
            g.find_a_type(&kind).map(|found| RpcResult::Matches {
                tunnels: found.iter().map(TunnelInfo::from_match).collect(),
            })
        })?,

        RpcRequest::Move { id, group } => {
            let controller = manager.with_group_mut(scope, |g| g.move_tunnel(&id, &group))??;
            Ok(RpcResult::Moved {
                id: controller.id().to_string(),
                group,
            })
        }
    }
}

/// Per-method call counters shown on the debug page
#[derive(Debug, Default)]
pub struct CallStats {
    calls: Mutex<BTreeMap<&'static str, u64>>,
}

impl CallStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, method: &'static str) {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        *calls.entry(method).or_insert(0) += 1;
    }

    pub fn count(&self, method: &str) -> u64 {
        let calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        calls.get(method).copied().unwrap_or(0)
    }

    /// Plain-text table of every method and how often it was called
    pub fn render(&self) -> String {
        let mut page = String::from("burrow RPC services\n\n");
        let _ = writeln!(page, "{:<16} CALLS", "METHOD");
        for method in RpcRequest::METHODS {
            let _ = writeln!(page, "{:<16} {}", method, self.count(method));
        }
        page
    }
}
