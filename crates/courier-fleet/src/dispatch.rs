//! The single-writer state aggregate: city graph, agents, and tasks.
//!
//! Every operation that names an existing agent refreshes its liveness
//! timestamp first, whether or not the operation itself succeeds.

use std::time::Duration;

use chrono::{DateTime, Utc};
use courier_city::CityGraph;
use courier_protocol::GraphIndex;
use rand::rngs::StdRng;

use crate::agent::{Agent, AgentRegistry, NewAgent};
use crate::snapshot::{AgentView, FleetSnapshot};
use crate::task::{TaskId, TaskScheduler};
use crate::FleetError;

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Ground distance within which an agent counts as at HQ or at its
    /// destination.
    pub recognition_distance: f32,
    /// Silence after which an agent is evicted.
    pub staleness: Duration,
    /// Generation stops while this many tasks are open.
    pub max_open_tasks: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            recognition_distance: 5.0,
            staleness: Duration::from_secs(30),
            max_open_tasks: 32,
        }
    }
}

/// A task handed to an agent.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkOrder {
    pub task_id: TaskId,
    pub task_name: String,
    pub destination: GraphIndex,
}

/// An agent removed by the staleness sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct Eviction {
    pub agent: String,
    pub reclaimed: Option<TaskId>,
}

pub struct Dispatch {
    graph: CityGraph,
    agents: AgentRegistry,
    tasks: TaskScheduler,
    config: DispatchConfig,
    rng: StdRng,
}

impl Dispatch {
    pub fn new(graph: CityGraph, config: DispatchConfig, rng: StdRng) -> Self {
        Self {
            graph,
            agents: AgentRegistry::new(),
            tasks: TaskScheduler::new(),
            config,
            rng,
        }
    }

    pub fn graph(&self) -> &CityGraph {
        &self.graph
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn tasks(&self) -> &TaskScheduler {
        &self.tasks
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    fn touch(&mut self, name: &str, now: DateTime<Utc>) -> Result<(), FleetError> {
        if self.agents.touch(name, now) {
            Ok(())
        } else {
            Err(FleetError::AgentNotFound(name.to_string()))
        }
    }

    /// Register an agent. Returns the graph index it was placed on.
    pub fn register(
        &mut self,
        spec: NewAgent,
        now: DateTime<Utc>,
    ) -> Result<GraphIndex, FleetError> {
        let (node, agent) = self.agents.create(&self.graph, &mut self.rng, spec, now)?;
        tracing::info!(
            agent = %agent.name,
            agent_type = %agent.agent_type,
            node = %node,
            peer = %format_args!("{}:{}", agent.hostname, agent.port),
            "Agent registered"
        );
        Ok(node)
    }

    /// Remove an agent, returning any held task to the open pool.
    pub fn deregister(&mut self, name: &str) -> Result<Agent, FleetError> {
        let agent = self.agents.destroy(name)?;
        let reclaimed = self.release_task(&agent);
        tracing::info!(agent = %name, reclaimed = ?reclaimed, "Agent deregistered");
        Ok(agent)
    }

    fn release_task(&mut self, agent: &Agent) -> Option<TaskId> {
        let id = agent.current_task?;
        match self.tasks.reclaim(id) {
            Ok(task) => {
                tracing::info!(task_id = %task.id, task = %task.name, "Task returned to open pool");
                Some(id)
            }
            Err(e) => {
                tracing::warn!(agent = %agent.name, error = %e, "Held task could not be reclaimed");
                None
            }
        }
    }

    pub fn request_work(
        &mut self,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<WorkOrder, FleetError> {
        self.touch(name, now)?;
        let agent = self.agents.require_mut(name)?;
        let task = self
            .tasks
            .assign(&self.graph, agent, self.config.recognition_distance)?;
        let destination = self
            .graph
            .to_graph_index(task.destination)
            .ok_or(FleetError::TaskNotFound(task.id))?;

        tracing::info!(
            agent = %name,
            task_id = %task.id,
            task = %task.name,
            destination = %destination,
            "Task assigned"
        );
        Ok(WorkOrder {
            task_id: task.id,
            task_name: task.name.clone(),
            destination,
        })
    }

    pub fn complete_task(&mut self, name: &str, now: DateTime<Utc>) -> Result<TaskId, FleetError> {
        self.touch(name, now)?;
        let agent = self.agents.require_mut(name)?;
        let task = self
            .tasks
            .complete(&self.graph, agent, self.config.recognition_distance)?;
        tracing::info!(agent = %name, task_id = %task.id, task = %task.name, "Task completed");
        Ok(task.id)
    }

    pub fn update_position(
        &mut self,
        name: &str,
        start: GraphIndex,
        end: GraphIndex,
        fraction: f32,
        now: DateTime<Utc>,
    ) -> Result<(), FleetError> {
        self.touch(name, now)?;
        let agent = self
            .agents
            .update_position(&self.graph, name, start, end, fraction, now)?;
        tracing::trace!(agent = %name, position = ?agent.position, "Position updated");
        Ok(())
    }

    pub fn update_status(
        &mut self,
        name: &str,
        status: &str,
        now: DateTime<Utc>,
    ) -> Result<(), FleetError> {
        self.agents.update_status(name, status, now)?;
        tracing::debug!(agent = %name, status, "Status updated");
        Ok(())
    }

    /// Evict every agent silent past the staleness timeout.
    pub fn sweep_stale(&mut self, now: DateTime<Utc>) -> Vec<Eviction> {
        let mut evicted = Vec::new();
        for name in self.agents.stale_agents(now, self.config.staleness) {
            let Ok(agent) = self.agents.destroy(&name) else {
                continue;
            };
            let reclaimed = self.release_task(&agent);
            tracing::info!(
                agent = %name,
                last_message_at = %agent.last_message_at,
                reclaimed = ?reclaimed,
                "Evicted stale agent"
            );
            evicted.push(Eviction {
                agent: name,
                reclaimed,
            });
        }
        evicted
    }

    /// Generate one task if the pool has room and a destination is free.
    pub fn generate_task(&mut self) -> Option<TaskId> {
        let task = self
            .tasks
            .generate(&self.graph, &mut self.rng, self.config.max_open_tasks)?;
        tracing::debug!(
            task_id = %task.id,
            task = %task.name,
            destination = %task.destination,
            "Task generated"
        );
        Some(task.id)
    }

    /// Open a task at a chosen node.
    pub fn add_task(
        &mut self,
        destination: GraphIndex,
        name: String,
    ) -> Result<TaskId, FleetError> {
        let task = self.tasks.add(&self.graph, destination, name)?;
        tracing::debug!(
            task_id = %task.id,
            task = %task.name,
            destination = %destination,
            "Task added"
        );
        Ok(task.id)
    }

    pub fn snapshot(&self) -> FleetSnapshot {
        let agents = self
            .agents
            .agents()
            .into_iter()
            .map(|a| AgentView {
                name: a.name.clone(),
                color: a.color,
                agent_type: a.agent_type,
                position: a.position,
                last_node: self.graph.to_graph_index(a.last_visited),
                status: a.status.clone(),
                task: a
                    .current_task
                    .and_then(|id| self.tasks.get(&id))
                    .map(|t| t.name.clone()),
                tasks_completed: a.tasks_completed,
                last_message_at: a.last_message_at,
            })
            .collect();

        FleetSnapshot {
            agents,
            open_tasks: self.tasks.open_count(),
            assigned_tasks: self.tasks.assigned_count(),
            completed_tasks: self.tasks.completed_count(),
            ..Default::default()
        }
    }
}
