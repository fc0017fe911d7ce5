use serde::{Deserialize, Serialize};

use crate::types::{AgentType, GraphIndex, Rgb};
use crate::ProtocolError;

/// Request type code carried in byte 0 of every request frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    Registration,
    RequestForTask,
    PositionUpdate,
    TaskComplete,
    Deregistration,
    StatusUpdate,
}

impl RequestKind {
    pub fn code(&self) -> u8 {
        match self {
            Self::Registration => 0,
            Self::RequestForTask => 1,
            Self::PositionUpdate => 2,
            Self::TaskComplete => 3,
            Self::Deregistration => 4,
            Self::StatusUpdate => 5,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        match code {
            0 => Ok(Self::Registration),
            1 => Ok(Self::RequestForTask),
            2 => Ok(Self::PositionUpdate),
            3 => Ok(Self::TaskComplete),
            4 => Ok(Self::Deregistration),
            5 => Ok(Self::StatusUpdate),
            other => Err(ProtocolError::UnknownRequestType(other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registration => "REGISTRATION",
            Self::RequestForTask => "REQUEST_FOR_TASK",
            Self::PositionUpdate => "POSITION_UPDATE",
            Self::TaskComplete => "TASK_COMPLETE",
            Self::Deregistration => "DEREGISTRATION",
            Self::StatusUpdate => "STATUS_UPDATE",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded agent request. Names are already trimmed of space/NUL padding.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Registration {
        color: Rgb,
        name: String,
        agent_type: AgentType,
    },
    RequestForTask {
        name: String,
    },
    PositionUpdate {
        name: String,
        start: GraphIndex,
        end: GraphIndex,
        fraction: f32,
    },
    TaskComplete {
        name: String,
    },
    Deregistration {
        name: String,
    },
    StatusUpdate {
        name: String,
        status: String,
    },
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Registration { .. } => RequestKind::Registration,
            Self::RequestForTask { .. } => RequestKind::RequestForTask,
            Self::PositionUpdate { .. } => RequestKind::PositionUpdate,
            Self::TaskComplete { .. } => RequestKind::TaskComplete,
            Self::Deregistration { .. } => RequestKind::Deregistration,
            Self::StatusUpdate { .. } => RequestKind::StatusUpdate,
        }
    }

    /// The agent the request speaks for.
    pub fn agent_name(&self) -> &str {
        match self {
            Self::Registration { name, .. }
            | Self::RequestForTask { name }
            | Self::PositionUpdate { name, .. }
            | Self::TaskComplete { name }
            | Self::Deregistration { name }
            | Self::StatusUpdate { name, .. } => name,
        }
    }
}

/// Response status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    Success,
    FailureNoTasks,
    FailureRequestParsingError,
    FailureOther,
}

impl StatusCode {
    pub fn code(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::FailureNoTasks => 1,
            Self::FailureRequestParsingError => 2,
            Self::FailureOther => 3,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        match code {
            0 => Ok(Self::Success),
            1 => Ok(Self::FailureNoTasks),
            2 => Ok(Self::FailureRequestParsingError),
            3 => Ok(Self::FailureOther),
            other => Err(ProtocolError::UnknownStatus(other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::FailureNoTasks => "FAILURE_NO_TASKS",
            Self::FailureRequestParsingError => "FAILURE_REQUEST_PARSING_ERROR",
            Self::FailureOther => "FAILURE_OTHER",
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific response body. Only successful REGISTRATION and
/// REQUEST_FOR_TASK responses carry one.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    Empty,
    Registration { node: GraphIndex, map: String },
    Work { task_name: String, destination: GraphIndex },
}

/// One status code plus an optional payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: StatusCode,
    pub payload: ResponsePayload,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            status: StatusCode::Success,
            payload: ResponsePayload::Empty,
        }
    }

    pub fn failure(status: StatusCode) -> Self {
        Self {
            status,
            payload: ResponsePayload::Empty,
        }
    }

    pub fn parse_error() -> Self {
        Self::failure(StatusCode::FailureRequestParsingError)
    }

    pub fn registered(node: GraphIndex, map: String) -> Self {
        Self {
            status: StatusCode::Success,
            payload: ResponsePayload::Registration { node, map },
        }
    }

    pub fn work(task_name: String, destination: GraphIndex) -> Self {
        Self {
            status: StatusCode::Success,
            payload: ResponsePayload::Work {
                task_name,
                destination,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StatusCode::Success
    }
}
