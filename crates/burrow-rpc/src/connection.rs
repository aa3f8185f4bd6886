//! Line-delimited JSON codec over a byte stream

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Longest line a peer may send, terminator included
pub const MAX_LINE_LEN: usize = 1024 * 1024;

/// Transport failures on a single connection
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
}

/// One end of a line-framed session
///
/// Reads are buffered; every write is flushed immediately so a peer waiting
/// on a reply never stalls.
pub struct RpcConnection<S = TcpStream> {
    stream: BufReader<S>,
    max_line_len: usize,
}

impl<S> RpcConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
            max_line_len: MAX_LINE_LEN,
        }
    }

    /// Replace the [`MAX_LINE_LEN`] cap on incoming lines
    pub fn with_max_line_len(mut self, limit: usize) -> Self {
        self.max_line_len = limit;
        self
    }

    /// Read the next line without its terminator
    ///
    /// Returns `None` once the peer has closed the connection. A line longer
    /// than the cap fails with [`ConnectionError::LineTooLong`]; the rest of
    /// the stream is then unusable.
    pub async fn recv_line(&mut self) -> Result<Option<String>, ConnectionError> {
        let limit = self.max_line_len;
        let mut line = String::new();
        let bytes_read = (&mut self.stream)
            .take(limit as u64)
            .read_line(&mut line)
            .await?;

        if bytes_read == 0 {
            return Ok(None);
        }
        if bytes_read == limit && !line.ends_with('\n') {
            return Err(ConnectionError::LineTooLong { limit });
        }

        let trimmed = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    /// Serialize `message` as one JSON line and flush it
    pub async fn send<T: Serialize>(&mut self, message: &T) -> Result<(), ConnectionError> {
        let mut json = serde_json::to_string(message)?;
        json.push('\n');
        self.send_raw(&json).await
    }

    /// Write `text` verbatim and flush it
    pub async fn send_raw(&mut self, text: &str) -> Result<(), ConnectionError> {
        let stream = self.stream.get_mut();
        stream.write_all(text.as_bytes()).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Read and decode the next JSON line
    pub async fn recv<T: DeserializeOwned>(&mut self) -> Result<Option<T>, ConnectionError> {
        match self.recv_line().await? {
            Some(line) => Ok(Some(serde_json::from_str(&line)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RpcCall, RpcRequest};

    #[tokio::test]
    async fn test_line_roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(1024);
        let mut client = RpcConnection::new(client);
        let mut server = RpcConnection::new(server);

        let call = RpcCall {
            id: 9,
            scope: vec![],
            request: RpcRequest::Ping,
        };
        client.send(&call).await.unwrap();

        let received: RpcCall = server.recv().await.unwrap().unwrap();
        assert_eq!(received, call);
    }

    #[tokio::test]
    async fn test_recv_line_strips_crlf() {
        let (client, server) = tokio::io::duplex(1024);
        let mut client = RpcConnection::new(client);
        let mut server = RpcConnection::new(server);

        client.send_raw("CONNECT /rpc/ HTTP/1.0\r\n\r\n").await.unwrap();
        assert_eq!(
            server.recv_line().await.unwrap().as_deref(),
            Some("CONNECT /rpc/ HTTP/1.0")
        );
        assert_eq!(server.recv_line().await.unwrap().as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_line_over_cap_is_rejected() {
        let (client, server) = tokio::io::duplex(1024);
        let mut client = RpcConnection::new(client);
        let mut server = RpcConnection::new(server).with_max_line_len(16);

        client.send_raw("fifteen-bytes!!\n").await.unwrap();
        assert_eq!(
            server.recv_line().await.unwrap().as_deref(),
            Some("fifteen-bytes!!")
        );

        client.send_raw(&"a".repeat(40)).await.unwrap();
        assert!(matches!(
            server.recv_line().await,
            Err(ConnectionError::LineTooLong { limit: 16 })
        ));
    }

    #[tokio::test]
    async fn test_recv_after_close() {
        let (client, server) = tokio::io::duplex(1024);
        drop(client);

        let mut server = RpcConnection::new(server);
        assert!(server.recv_line().await.unwrap().is_none());
    }
}
