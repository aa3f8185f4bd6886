//! Client side of the control protocol, used by the CLI and tests

use crate::connection::RpcConnection;
use crate::protocol::{
    RpcCall, RpcReply, RpcRequest, RpcResult, TunnelInfo, CONNECTED, DEBUG_PATH, RPC_PATH,
};
use anyhow::{Context, Result};
use burrow_registry::GroupSummary;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

/// Connection to a running control server
///
/// Failed calls surface as an [`anyhow::Error`] wrapping the server's
/// [`RpcErrorBody`](crate::protocol::RpcErrorBody), so callers can
/// `downcast_ref` to inspect the error code.
pub struct RpcClient {
    conn: RpcConnection<TcpStream>,
    scope: Vec<String>,
    next_id: u64,
}

impl RpcClient {
    /// Connect and speak the JSON codec directly
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("Failed to connect to control server at {}", addr))?;

        Ok(Self {
            conn: RpcConnection::new(stream),
            scope: Vec::new(),
            next_id: 1,
        })
    }

    /// Connect through the `CONNECT /rpc/` upgrade
    pub async fn connect_upgraded(addr: &str) -> Result<Self> {
        let mut client = Self::connect(addr).await?;

        client
            .conn
            .send_raw(&format!("CONNECT {} HTTP/1.0\n\n", RPC_PATH))
            .await
            .context("Failed to send upgrade request")?;

        let status = client
            .conn
            .recv_line()
            .await
            .context("Failed to read upgrade response")?
            .context("Server closed the connection during upgrade")?;

        if !status.ends_with(CONNECTED) {
            anyhow::bail!("Unexpected upgrade response: {}", status);
        }

        // Blank line closing the response head
        client.conn.recv_line().await?;
        Ok(client)
    }

    /// Run every following call against the group at `scope`
    pub fn with_scope(mut self, scope: Vec<String>) -> Self {
        self.scope = scope;
        self
    }

    /// Send a request and wait for its reply
    pub async fn call(&mut self, request: RpcRequest) -> Result<RpcResult> {
        let id = self.next_id;
        self.next_id += 1;

        let method = request.method();
        let call = RpcCall {
            id,
            scope: self.scope.clone(),
            request,
        };

        self.conn
            .send(&call)
            .await
            .with_context(|| format!("Failed to send {} request", method))?;

        let reply: RpcReply = self
            .conn
            .recv()
            .await
            .with_context(|| format!("Failed to read {} response", method))?
            .context("Server closed the connection")?;

        if reply.id != id {
            anyhow::bail!("Reply id {} does not match request id {}", reply.id, id);
        }

        Ok(reply.into_result()?)
    }

    pub async fn ping(&mut self) -> Result<()> {
        match self.call(RpcRequest::Ping).await? {
            RpcResult::Pong => Ok(()),
            other => unexpected(other),
        }
    }

    pub async fn list(&mut self) -> Result<Vec<String>> {
        self.tunnels(RpcRequest::List).await
    }

    pub async fn list_all_below(&mut self) -> Result<Vec<String>> {
        self.tunnels(RpcRequest::ListAllBelow).await
    }

    pub async fn list_group(&mut self, group: &str) -> Result<Vec<String>> {
        self.tunnels(RpcRequest::ListGroup {
            group: group.to_string(),
        })
        .await
    }

    pub async fn groups(&mut self) -> Result<Vec<GroupSummary>> {
        self.group_list(RpcRequest::Groups).await
    }

    pub async fn all_groups(&mut self) -> Result<Vec<GroupSummary>> {
        self.group_list(RpcRequest::AllGroups).await
    }

    pub async fn group_groups(&mut self, group: &str) -> Result<Vec<GroupSummary>> {
        self.group_list(RpcRequest::GroupGroups {
            group: group.to_string(),
        })
        .await
    }

    pub async fn find(&mut self, id: &str) -> Result<TunnelInfo> {
        match self.call(RpcRequest::Find { id: id.to_string() }).await? {
            RpcResult::Found { tunnel } => Ok(tunnel),
            other => unexpected(other),
        }
    }

    pub async fn find_a_type(&mut self, kind: &str) -> Result<Vec<TunnelInfo>> {
        match self
            .call(RpcRequest::FindAType {
                kind: kind.to_string(),
            })
            .await?
        {
            RpcResult::Matches { tunnels } => Ok(tunnels),
            other => unexpected(other),
        }
    }

    pub async fn move_tunnel(&mut self, id: &str, group: &str) -> Result<()> {
        match self
            .call(RpcRequest::Move {
                id: id.to_string(),
                group: group.to_string(),
            })
            .await?
        {
            RpcResult::Moved { .. } => Ok(()),
            other => unexpected(other),
        }
    }

    async fn tunnels(&mut self, request: RpcRequest) -> Result<Vec<String>> {
        match self.call(request).await? {
            RpcResult::Tunnels { ids } => Ok(ids),
            other => unexpected(other),
        }
    }

    async fn group_list(&mut self, request: RpcRequest) -> Result<Vec<GroupSummary>> {
        match self.call(request).await? {
            RpcResult::Groups { groups } => Ok(groups),
            other => unexpected(other),
        }
    }
}

fn unexpected<T>(result: RpcResult) -> Result<T> {
    anyhow::bail!("Unexpected response: {:?}", result)
}

/// Fetch the plain-text debug page from a control server
pub async fn fetch_debug_page(addr: &str) -> Result<String> {
    let mut stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("Failed to connect to control server at {}", addr))?;

    let mut conn = RpcConnection::new(&mut stream);
    conn.send_raw(&format!("GET {} HTTP/1.0\r\n\r\n", DEBUG_PATH))
        .await
        .context("Failed to send debug request")?;
    drop(conn);

    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .context("Failed to read debug page")?;

    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .context("Malformed debug response")?;
    Ok(body)
}
