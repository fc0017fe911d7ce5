use courier_protocol::GraphIndex;
use thiserror::Error;

use crate::TaskId;

/// Coarse classification of a rejected fleet operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The named agent, node, or task does not exist.
    NotFound,
    /// The request is well-formed but the current state forbids it.
    PolicyViolation,
    /// The open pool is empty.
    NoTasks,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FleetError {
    #[error("agent name '{0}' is already registered")]
    DuplicateName(String),

    #[error("agent '{0}' not found")]
    AgentNotFound(String),

    #[error("node {0} is not part of the city graph")]
    NodeNotFound(GraphIndex),

    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("agent '{agent}' is {distance:.2} from HQ, limit {limit:.2}")]
    TooFarFromHq {
        agent: String,
        distance: f32,
        limit: f32,
    },

    #[error("agent '{agent}' is {distance:.2} from its destination, limit {limit:.2}")]
    TooFarFromDestination {
        agent: String,
        distance: f32,
        limit: f32,
    },

    #[error("agent '{agent}' already holds task {task}")]
    AlreadyAssigned { agent: String, task: TaskId },

    #[error("agent '{0}' holds no task")]
    NoTaskHeld(String),

    #[error("no open tasks")]
    NoOpenTasks,

    #[error("node {node} cannot take a task: {reason}")]
    InvalidDestination { node: GraphIndex, reason: &'static str },
}

impl FleetError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::AgentNotFound(_) | Self::NodeNotFound(_) | Self::TaskNotFound(_) => {
                FailureKind::NotFound
            }
            Self::NoOpenTasks => FailureKind::NoTasks,
            Self::DuplicateName(_)
            | Self::TooFarFromHq { .. }
            | Self::TooFarFromDestination { .. }
            | Self::AlreadyAssigned { .. }
            | Self::NoTaskHeld(_)
            | Self::InvalidDestination { .. } => FailureKind::PolicyViolation,
        }
    }
}
