//! Remote control surface for the tunnel registry
//!
//! A [`RpcServer`] binds a TCP listener in front of a
//! [`TunnelManager`](burrow_registry::TunnelManager) and serves every accepted
//! connection on its own task. Calls travel as newline-delimited JSON; see
//! [`protocol`] for the message shapes.

pub mod client;
pub mod connection;
pub mod dispatch;
pub mod protocol;
pub mod server;

pub use client::{fetch_debug_page, RpcClient};
pub use connection::{ConnectionError, RpcConnection};
pub use dispatch::{dispatch, CallStats};
pub use protocol::{
    ErrorCode, RpcCall, RpcErrorBody, RpcReply, RpcRequest, RpcResult, TunnelInfo,
};
pub use server::{RpcServer, ServerError};

/// Default control address
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default control port
pub const DEFAULT_PORT: u16 = 7676;
