use courier_city::GraphError;
use courier_fleet::FleetError;
use courier_protocol::ProtocolError;
use thiserror::Error;

use crate::bridge::BridgeError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("fleet error: {0}")]
    Fleet(#[from] FleetError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Errors seen by `AgentClient`.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("server answered {0}")]
    Rejected(courier_protocol::StatusCode),

    #[error("server closed the connection without a response")]
    NoResponse,

    #[error("no response within {0:?}")]
    Timeout(std::time::Duration),
}
