//! HTTP transport to the platform daemon over its unix socket.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fleetsnap_common::{FleetsnapError, Result};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::client::conn::http1::{self, SendRequest};
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::debug;

/// Raw request/response access to the management API.
///
/// Implementations hand the response body back as-is; interpreting the
/// envelope (or the raw archive bytes of an export) is the caller's job.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, method: Method, path: &str, body: Option<Vec<u8>>) -> Result<Vec<u8>>;
}

/// The production transport: HTTP/1.1 over the daemon's unix socket.
///
/// One connection is dialed at construction and reused for every request in
/// the process lifetime; requests are serialized through the cached sender.
pub struct UnixSocketTransport {
    socket_path: PathBuf,
    sender: Mutex<SendRequest<Full<Bytes>>>,
}

impl UnixSocketTransport {
    /// Dials the socket and performs the HTTP handshake.
    pub async fn connect(socket_path: impl AsRef<Path>) -> Result<Self> {
        let socket_path = socket_path.as_ref().to_path_buf();
        let stream = UnixStream::connect(&socket_path).await.map_err(|e| {
            FleetsnapError::Transport(format!(
                "failed to connect to daemon at {}: {e}",
                socket_path.display()
            ))
        })?;

        let io = TokioIo::new(stream);
        let (sender, conn) = http1::handshake(io)
            .await
            .map_err(|e| FleetsnapError::Transport(format!("HTTP handshake failed: {e}")))?;

        // Drive the connection until the run ends or the daemon hangs up
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("daemon connection closed: {e}");
            }
        });

        Ok(Self {
            socket_path,
            sender: Mutex::new(sender),
        })
    }

    /// Returns the socket path this transport was dialed against.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

#[async_trait]
impl Transport for UnixSocketTransport {
    async fn send(&self, method: Method, path: &str, body: Option<Vec<u8>>) -> Result<Vec<u8>> {
        let request = match body {
            Some(bytes) => Request::builder()
                .method(method)
                .uri(format!("http://localhost{path}"))
                .header("Host", "localhost")
                .header("Content-Type", "application/json")
                .header("Content-Length", bytes.len())
                .body(Full::new(Bytes::from(bytes))),
            None => Request::builder()
                .method(method)
                .uri(format!("http://localhost{path}"))
                .header("Host", "localhost")
                .body(Full::new(Bytes::new())),
        }
        .map_err(|e| FleetsnapError::Transport(format!("failed to build request: {e}")))?;

        let mut sender = self.sender.lock().await;
        sender
            .ready()
            .await
            .map_err(|e| FleetsnapError::Transport(format!("daemon connection lost: {e}")))?;
        let response = sender
            .send_request(request)
            .await
            .map_err(|e| FleetsnapError::Transport(format!("failed to send request: {e}")))?;

        // The daemon reports failures in the response envelope, not the
        // status line, so the body is returned for any status.
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| FleetsnapError::Transport(format!("failed to read response: {e}")))?
            .to_bytes();

        Ok(body.to_vec())
    }
}
