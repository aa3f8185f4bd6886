//! Wire types for the control protocol
//!
//! Every message is one JSON object on its own line. A request names the
//! method to run and, optionally, the group path it runs against; the reply
//! echoes the request id and carries either a result or an error.

use burrow_registry::{GroupSummary, RegistryError, TunnelController};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Path a client names in `CONNECT` to switch the connection to the JSON codec
pub const RPC_PATH: &str = "/rpc/";

/// Path serving a plain-text page of methods and call counts
pub const DEBUG_PATH: &str = "/debug/rpc/";

/// Status line answering a successful `CONNECT`
pub const CONNECTED: &str = "200 Connected to burrow RPC";

/// A single call from a client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RpcCall {
    /// Caller-chosen id echoed in the reply
    pub id: u64,

    /// Group path the call runs against; empty means the root group
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope: Vec<String>,

    pub request: RpcRequest,
}

/// Registry operations callable over the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum RpcRequest {
    /// Liveness check
    Ping,

    /// Tunnels held directly by the group
    List,

    /// Tunnels held by every descendant group
    ListAllBelow,

    /// Immediate child groups
    Groups,

    /// Every descendant group
    AllGroups,

    /// Tunnels held by a named child group
    ListGroup { group: String },

    /// Children of a named child group
    GroupGroups { group: String },

    /// Look a tunnel up by identifier
    Find { id: String },

    /// Look tunnels up by kind
    FindAType { kind: String },

    /// Relocate a tunnel into a child group
    Move { id: String, group: String },
}

impl RpcRequest {
    /// Every method name, in protocol order
    pub const METHODS: [&'static str; 10] = [
        "ping",
        "list",
        "list_all_below",
        "groups",
        "all_groups",
        "list_group",
        "group_groups",
        "find",
        "find_a_type",
        "move",
    ];

    /// Wire name of the method
    pub fn method(&self) -> &'static str {
        match self {
            RpcRequest::Ping => "ping",
            RpcRequest::List => "list",
            RpcRequest::ListAllBelow => "list_all_below",
            RpcRequest::Groups => "groups",
            RpcRequest::AllGroups => "all_groups",
            RpcRequest::ListGroup { .. } => "list_group",
            RpcRequest::GroupGroups { .. } => "group_groups",
            RpcRequest::Find { .. } => "find",
            RpcRequest::FindAType { .. } => "find_a_type",
            RpcRequest::Move { .. } => "move",
        }
    }
}

/// Reply to one [`RpcCall`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RpcReply {
    pub id: u64,
    pub result: Option<RpcResult>,
    pub error: Option<RpcErrorBody>,
}

impl RpcReply {
    pub fn ok(id: u64, result: RpcResult) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: u64, error: RpcErrorBody) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Split into the usual `Result` shape
    pub fn into_result(self) -> Result<RpcResult, RpcErrorBody> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(error),
            (Some(result), None) => Ok(result),
            (None, None) => Err(RpcErrorBody::new(
                ErrorCode::InvalidRequest,
                "Reply carried neither result nor error",
            )),
        }
    }
}

/// Successful call results
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RpcResult {
    Pong,
    Tunnels { ids: Vec<String> },
    Groups { groups: Vec<GroupSummary> },
    Found { tunnel: TunnelInfo },
    Matches { tunnels: Vec<TunnelInfo> },
    Moved { id: String, group: String },
}

/// A tunnel as reported to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TunnelInfo {
    pub id: String,
    pub kind: String,
    pub port: u16,
    /// Child group the tunnel was found in; empty when the searched group holds it directly
    pub group: String,
}

impl TunnelInfo {
    pub fn new(controller: &TunnelController, group: impl Into<String>) -> Self {
        Self {
            id: controller.id().to_string(),
            kind: controller.kind().to_string(),
            port: controller.port(),
            group: group.into(),
        }
    }

    /// Describe a kind-search match, consuming its pending group tag
    pub fn from_match(controller: &TunnelController) -> Self {
        let group = controller.take_group();
        Self::new(controller, group)
    }
}

/// Machine-readable error category
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    GroupNotFound,
    InvalidParams,
    InvalidRequest,
    Conflict,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            ErrorCode::NotFound => "not_found",
            ErrorCode::GroupNotFound => "group_not_found",
            ErrorCode::InvalidParams => "invalid_params",
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::Conflict => "conflict",
        };
        f.write_str(code)
    }
}

/// Error object returned for a failed call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct RpcErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl RpcErrorBody {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<RegistryError> for RpcErrorBody {
    fn from(err: RegistryError) -> Self {
        let code = match err {
            RegistryError::NotFound { .. } | RegistryError::KindNotFound { .. } => {
                ErrorCode::NotFound
            }
            RegistryError::GroupNotFound { .. } => ErrorCode::GroupNotFound,
            RegistryError::InvalidGroupName(_) => ErrorCode::InvalidParams,
            RegistryError::DuplicateId { .. } => ErrorCode::Conflict,
        };
        Self::new(code, err.to_string())
    }
}
