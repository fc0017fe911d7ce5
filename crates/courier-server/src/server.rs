//! TCP front end. One request frame in, one response frame out, then close.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use courier_protocol::{decode_request, encode_response, Response};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::bridge::RequestBridge;
use crate::ServerError;

/// Bytes of trailing data sampled after a full frame to report its length.
const OVERRUN_PROBE_LEN: usize = 64;

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub frame_len: usize,
    pub read_timeout: Duration,
    pub max_connections: usize,
}

pub struct ProtocolServer {
    listener: TcpListener,
    bridge: RequestBridge,
    settings: ConnectionSettings,
}

impl ProtocolServer {
    pub async fn bind(
        addr: &str,
        bridge: RequestBridge,
        settings: ConnectionSettings,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            bridge,
            settings,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the task is cancelled.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let addr = self.local_addr()?;
        tracing::info!(
            addr = %addr,
            frame_len = self.settings.frame_len,
            "Protocol server listening"
        );

        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.settings.max_connections));

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    continue;
                }
            };
            tracing::debug!(peer = %peer, "Agent connected");

            let permit = semaphore.clone().acquire_owned().await?;
            let bridge = self.bridge.clone();
            let settings = self.settings.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer, &bridge, &settings).await {
                    tracing::warn!(peer = %peer, error = %e, "Connection failed");
                }
                drop(permit);
            });
        }
    }
}

/// Serve one request on `stream`.
///
/// Malformed frames are answered with a parsing-error status without
/// touching the bridge. A bridge failure closes the connection with no
/// response at all.
pub async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    bridge: &RequestBridge,
    settings: &ConnectionSettings,
) -> Result<(), ServerError> {
    let frame = read_frame(&mut stream, settings.frame_len, settings.read_timeout).await?;
    if frame.is_empty() {
        tracing::debug!(peer = %peer, "Connection closed without a frame");
        return Ok(());
    }

    let response = match decode_request(&frame, settings.frame_len) {
        Ok(request) => {
            tracing::debug!(
                peer = %peer,
                request = %request.kind(),
                agent = %request.agent_name(),
                "Request decoded"
            );
            bridge.submit(request, peer).await?
        }
        Err(e) => {
            tracing::warn!(peer = %peer, error = %e, "Malformed request frame");
            Response::parse_error()
        }
    };

    stream.write_all(&encode_response(&response)).await?;
    stream.shutdown().await?;
    tracing::debug!(peer = %peer, status = %response.status, "Response sent");
    Ok(())
}

/// Read up to `frame_len` bytes, stopping early at EOF or when `limit`
/// elapses. Data already waiting past a full frame is appended so the
/// decoder sees the real length.
async fn read_frame(
    stream: &mut TcpStream,
    frame_len: usize,
    limit: Duration,
) -> Result<Vec<u8>, ServerError> {
    let mut frame = Vec::with_capacity(frame_len);
    let mut chunk = vec![0u8; frame_len];

    let fill = async {
        while frame.len() < frame_len {
            let n = stream.read(&mut chunk[..frame_len - frame.len()]).await?;
            if n == 0 {
                break;
            }
            frame.extend_from_slice(&chunk[..n]);
        }
        Ok::<_, std::io::Error>(())
    };
    let outcome = tokio::time::timeout(limit, fill).await;
    match outcome {
        Ok(result) => result?,
        Err(_) => tracing::debug!(got = frame.len(), "Frame read timed out"),
    }

    if frame.len() == frame_len {
        let mut overrun = [0u8; OVERRUN_PROBE_LEN];
        if let Ok(n) = stream.try_read(&mut overrun) {
            frame.extend_from_slice(&overrun[..n]);
        }
    }
    Ok(frame)
}
