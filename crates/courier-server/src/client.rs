//! Async client for driving a running server, one connection per request.

use std::time::Duration;

use bytes::BytesMut;
use courier_city::CityMap;
use courier_protocol::{
    decode_response, encode_request, AgentType, GraphIndex, Request, Response, ResponsePayload,
    Rgb, DEFAULT_FRAME_LEN,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::ClientError;

#[derive(Debug, Clone)]
pub struct AgentClient {
    addr: String,
    frame_len: usize,
    timeout: Duration,
}

/// A decoded successful registration.
#[derive(Debug, Clone)]
pub struct Registered {
    pub node: GraphIndex,
    pub map_text: String,
}

impl Registered {
    pub fn parse_map(&self) -> Result<CityMap, courier_city::GraphError> {
        CityMap::parse(&self.map_text)
    }
}

impl AgentClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            frame_len: DEFAULT_FRAME_LEN,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_frame_len(mut self, frame_len: usize) -> Self {
        self.frame_len = frame_len;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send one request and decode the response.
    pub async fn send(&self, request: &Request) -> Result<Response, ClientError> {
        let frame = encode_request(request, self.frame_len)?;
        let raw = self.exchange(&frame).await?;
        if raw.is_empty() {
            return Err(ClientError::NoResponse);
        }
        Ok(decode_response(request.kind(), &raw)?)
    }

    /// Write arbitrary bytes and return whatever comes back.
    pub async fn exchange(&self, frame: &[u8]) -> Result<Vec<u8>, ClientError> {
        let io = async {
            let mut stream = TcpStream::connect(&self.addr).await?;
            stream.write_all(frame).await?;
            // Half-close so a short frame is seen as complete.
            stream.shutdown().await?;
            let mut buf = BytesMut::with_capacity(256);
            while stream.read_buf(&mut buf).await? > 0 {}
            Ok::<_, std::io::Error>(buf.to_vec())
        };
        tokio::time::timeout(self.timeout, io)
            .await
            .map_err(|_| ClientError::Timeout(self.timeout))?
            .map_err(ClientError::from)
    }

    pub async fn register(
        &self,
        name: &str,
        color: Rgb,
        agent_type: AgentType,
    ) -> Result<Registered, ClientError> {
        let response = self
            .send(&Request::Registration {
                color,
                name: name.to_string(),
                agent_type,
            })
            .await?;
        match response.payload {
            ResponsePayload::Registration { node, map } => Ok(Registered {
                node,
                map_text: map,
            }),
            _ => Err(ClientError::Rejected(response.status)),
        }
    }

    pub async fn request_work(&self, name: &str) -> Result<Response, ClientError> {
        self.send(&Request::RequestForTask {
            name: name.to_string(),
        })
        .await
    }

    pub async fn update_position(
        &self,
        name: &str,
        start: GraphIndex,
        end: GraphIndex,
        fraction: f32,
    ) -> Result<Response, ClientError> {
        self.send(&Request::PositionUpdate {
            name: name.to_string(),
            start,
            end,
            fraction,
        })
        .await
    }

    pub async fn complete_task(&self, name: &str) -> Result<Response, ClientError> {
        self.send(&Request::TaskComplete {
            name: name.to_string(),
        })
        .await
    }

    pub async fn update_status(&self, name: &str, status: &str) -> Result<Response, ClientError> {
        self.send(&Request::StatusUpdate {
            name: name.to_string(),
            status: status.to_string(),
        })
        .await
    }

    pub async fn deregister(&self, name: &str) -> Result<Response, ClientError> {
        self.send(&Request::Deregistration {
            name: name.to_string(),
        })
        .await
    }
}
