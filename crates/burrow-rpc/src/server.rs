//! RPC front door: accept loop and per-connection sessions

use crate::connection::{ConnectionError, RpcConnection};
use crate::dispatch::{dispatch, CallStats};
use crate::protocol::{
    ErrorCode, RpcCall, RpcErrorBody, RpcReply, CONNECTED, DEBUG_PATH, RPC_PATH,
};
use burrow_registry::{Tunnel, TunnelManager};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Front door errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to {address}: {source}\n\nTroubleshooting:\n  • Check if another process is using this port\n  • Try using a different address or port")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to accept connection: {0}")]
    Accept(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A registry bound to a control listener
///
/// Construction binds the listener; [`serve`](Self::serve) consumes the
/// server, so a front door can only ever run its accept loop once.
pub struct RpcServer {
    listener: TcpListener,
    manager: TunnelManager,
    stats: Arc<CallStats>,
}

impl RpcServer {
    /// Bind `host:port` with an empty registry
    pub async fn initialize(host: &str, port: u16) -> Result<Self, ServerError> {
        Self::with_manager(host, port, TunnelManager::new()).await
    }

    /// Bind `host:port` and register `tunnels` keyed by their identifiers
    ///
    /// Tunnels are annotated with the ports following `port`.
    pub async fn new(
        host: &str,
        port: u16,
        tunnels: Vec<Box<dyn Tunnel>>,
    ) -> Result<Self, ServerError> {
        let listener = bind(host, port).await?;
        let manager = TunnelManager::from_tunnels(tunnels, port);
        Ok(Self::from_parts(listener, manager))
    }

    /// Bind `host:port` and register `tunnels` keyed by the map's names
    pub async fn from_map(
        host: &str,
        port: u16,
        tunnels: HashMap<String, Box<dyn Tunnel>>,
    ) -> Result<Self, ServerError> {
        let listener = bind(host, port).await?;
        let manager = TunnelManager::from_map(tunnels, port);
        Ok(Self::from_parts(listener, manager))
    }

    /// Bind `host:port` in front of an existing registry
    pub async fn with_manager(
        host: &str,
        port: u16,
        manager: TunnelManager,
    ) -> Result<Self, ServerError> {
        let listener = bind(host, port).await?;
        Ok(Self::from_parts(listener, manager))
    }

    fn from_parts(listener: TcpListener, manager: TunnelManager) -> Self {
        Self {
            listener,
            manager,
            stats: Arc::new(CallStats::new()),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// The registry served by this front door
    pub fn manager(&self) -> &TunnelManager {
        &self.manager
    }

    pub fn stats(&self) -> Arc<CallStats> {
        self.stats.clone()
    }

    /// Accept connections until the listener fails
    ///
    /// Every connection is served on its own task. A failing connection only
    /// ends its own task; an accept failure ends the loop and is returned.
    pub async fn serve(self) -> Result<(), ServerError> {
        info!("RPC server listening on {}", self.local_addr()?);

        loop {
            let (stream, peer_addr) = self.listener.accept().await.map_err(ServerError::Accept)?;
            debug!("New connection established from {}", peer_addr);

            let manager = self.manager.clone();
            let stats = self.stats.clone();
            tokio::spawn(async move {
                match handle_connection(stream, &manager, &stats).await {
                    Ok(()) => debug!("Connection from {} closed", peer_addr),
                    Err(e) => warn!("Connection from {} failed: {}", peer_addr, e),
                }
            });
        }
    }
}

async fn bind(host: &str, port: u16) -> Result<TcpListener, ServerError> {
    let address = format!("{}:{}", host, port);
    TcpListener::bind(&address)
        .await
        .map_err(|source| ServerError::Bind { address, source })
}

/// How a connection introduces itself on its first line
#[derive(Debug, PartialEq, Eq)]
enum Preamble<'a> {
    /// `CONNECT /rpc/ HTTP/1.x`: switch to the JSON session
    Connect,
    /// `GET /debug/rpc/ HTTP/1.x`: serve the debug page and close
    Debug,
    /// Any other HTTP request line
    Unknown(&'a str),
    /// Not HTTP; the line is already the first call
    Raw,
}

impl<'a> Preamble<'a> {
    fn detect(line: &'a str) -> Self {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(method), Some(path), Some(version)) if version.starts_with("HTTP/") => {
                match (method, path) {
                    ("CONNECT", RPC_PATH) => Preamble::Connect,
                    ("GET", DEBUG_PATH) => Preamble::Debug,
                    _ => Preamble::Unknown(path),
                }
            }
            _ => Preamble::Raw,
        }
    }
}

/// Serve one client session until it closes
pub(crate) async fn handle_connection<S>(
    stream: S,
    manager: &TunnelManager,
    stats: &CallStats,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut conn = RpcConnection::new(stream);

    let Some(first) = conn.recv_line().await? else {
        return Ok(());
    };

    match Preamble::detect(&first) {
        Preamble::Connect => {
            skip_headers(&mut conn).await?;
            conn.send_raw(&format!("HTTP/1.0 {}\n\n", CONNECTED)).await?;
        }
        Preamble::Debug => {
            skip_headers(&mut conn).await?;
            let body = stats.render();
            conn.send_raw(&format!(
                "HTTP/1.0 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            ))
            .await?;
            return Ok(());
        }
        Preamble::Unknown(path) => {
            debug!("Rejecting HTTP request for {}", path);
            skip_headers(&mut conn).await?;
            conn.send_raw("HTTP/1.0 404 Not Found\r\nContent-Length: 0\r\n\r\n")
                .await?;
            return Ok(());
        }
        Preamble::Raw => answer(&mut conn, manager, stats, &first).await?,
    }

    while let Some(line) = conn.recv_line().await? {
        answer(&mut conn, manager, stats, &line).await?;
    }

    Ok(())
}

/// Consume HTTP header lines up to the blank separator
async fn skip_headers<S>(conn: &mut RpcConnection<S>) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(line) = conn.recv_line().await? {
        if line.is_empty() {
            break;
        }
    }
    Ok(())
}

/// Decode one request line, run it and write the reply
async fn answer<S>(
    conn: &mut RpcConnection<S>,
    manager: &TunnelManager,
    stats: &CallStats,
    line: &str,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if line.trim().is_empty() {
        return Ok(());
    }

    let reply = match serde_json::from_str::<RpcCall>(line) {
        Ok(call) => {
            let method = call.request.method();
            debug!(call_id = call.id, method, "Handling call");
            stats.record(method);
            dispatch(manager, call)
        }
        Err(e) => {
            debug!("Malformed request: {}", e);
            RpcReply::error(
                0,
                RpcErrorBody::new(ErrorCode::InvalidRequest, format!("Malformed request: {}", e)),
            )
        }
    };

    conn.send(&reply).await
}
