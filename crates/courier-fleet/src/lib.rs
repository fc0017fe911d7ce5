//! Courier Fleet - agents, tasks, and the dispatch state they share
//!
//! `Dispatch` owns the city graph, the `AgentRegistry`, and the
//! `TaskScheduler`. It is meant to be owned by exactly one simulation loop;
//! nothing here is synchronized.

pub mod agent;
pub mod dispatch;
pub mod error;
pub mod names;
pub mod snapshot;
pub mod task;

pub use agent::{Agent, AgentRegistry, NewAgent, IDLE_STATUS};
pub use dispatch::{Dispatch, DispatchConfig, Eviction, WorkOrder};
pub use error::{FailureKind, FleetError};
pub use snapshot::{AgentView, FleetSnapshot};
pub use task::{Task, TaskId, TaskScheduler, TaskState};
