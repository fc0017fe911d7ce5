use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use courier_protocol::{AgentType, GraphIndex, Rgb, Vec3};
use serde::Serialize;

/// Read-only projection of one agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentView {
    pub name: String,
    pub color: Rgb,
    pub agent_type: AgentType,
    pub position: Vec3,
    pub last_node: Option<GraphIndex>,
    pub status: String,
    pub task: Option<String>,
    pub tasks_completed: u64,
    pub last_message_at: DateTime<Utc>,
}

/// What observers (status line, console) see after each tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FleetSnapshot {
    pub listen_addr: Option<SocketAddr>,
    pub tick: u64,
    pub agents: Vec<AgentView>,
    pub open_tasks: usize,
    pub assigned_tasks: usize,
    pub completed_tasks: usize,
    pub generation_enabled: bool,
    pub taken_at: Option<DateTime<Utc>>,
}

impl FleetSnapshot {
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }
}
