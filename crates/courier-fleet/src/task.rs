//! Delivery tasks and the open/assigned/completed pools.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use courier_city::CityGraph;
use courier_protocol::{AgentType, GlobalIndex, GraphIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::Agent;
use crate::{names, FleetError};

/// Stable task identity, issued at generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Open,
    Assigned,
    Completed,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Assigned => write!(f, "assigned"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: TaskId,
    /// Generation order, used to break distance ties.
    pub seq: u64,
    pub name: String,
    pub destination: GlobalIndex,
    pub state: TaskState,
    pub assignee: Option<String>,
    /// Fresh id stamped on each assignment.
    pub assignment_id: Option<Uuid>,
}

/// Task pools. `tasks` is the source of truth; `open` orders the open pool
/// by generation sequence.
#[derive(Debug, Default)]
pub struct TaskScheduler {
    tasks: HashMap<TaskId, Task>,
    open: BTreeMap<u64, TaskId>,
    assigned: HashSet<TaskId>,
    completed: Vec<TaskId>,
    next_seq: u64,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn assigned_count(&self) -> usize {
        self.assigned.len()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Open tasks in generation order.
    pub fn open_tasks(&self) -> impl Iterator<Item = &Task> {
        self.open.values().filter_map(|id| self.tasks.get(id))
    }

    /// Destinations held by open or assigned tasks. An assigned task can
    /// return to the open pool, so its node stays reserved.
    fn active_destinations(&self) -> HashSet<GlobalIndex> {
        self.open
            .values()
            .chain(self.assigned.iter())
            .filter_map(|id| self.tasks.get(id))
            .map(|t| t.destination)
            .collect()
    }

    fn insert_open(&mut self, name: String, destination: GlobalIndex) -> &Task {
        let id = TaskId::new();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.open.insert(seq, id);
        self.tasks.entry(id).or_insert(Task {
            id,
            seq,
            name,
            destination,
            state: TaskState::Open,
            assignee: None,
            assignment_id: None,
        })
    }

    /// Generate a task at a random node that is neither HQ nor the
    /// destination of another open or assigned task.
    ///
    /// Returns `None` when the open pool already holds `max_open` tasks or
    /// no node qualifies.
    pub fn generate<R: Rng>(
        &mut self,
        graph: &CityGraph,
        rng: &mut R,
        max_open: usize,
    ) -> Option<&Task> {
        if self.open.len() >= max_open {
            tracing::trace!(open = self.open.len(), "open pool full, skipping generation");
            return None;
        }

        let taken = self.active_destinations();
        let hq = graph.hq().global_index;
        let Some(destination) = graph
            .scan_from_random(rng, |n| n.global_index != hq && !taken.contains(&n.global_index))
            .map(|n| n.global_index)
        else {
            tracing::debug!("no free destination, skipping generation");
            return None;
        };

        let name = names::item_name(rng);
        Some(self.insert_open(name, destination))
    }

    /// Add a task at a chosen node, under the same destination rules as
    /// generation.
    pub fn add(
        &mut self,
        graph: &CityGraph,
        destination: GraphIndex,
        name: String,
    ) -> Result<&Task, FleetError> {
        let node = graph
            .to_global_index(destination)
            .ok_or(FleetError::NodeNotFound(destination))?;
        if graph.is_hq(node) {
            return Err(FleetError::InvalidDestination {
                node: destination,
                reason: "HQ is never a destination",
            });
        }
        if self.active_destinations().contains(&node) {
            return Err(FleetError::InvalidDestination {
                node: destination,
                reason: "another open or assigned task already targets it",
            });
        }
        Ok(self.insert_open(name, node))
    }

    /// Assign an open task to `agent`.
    ///
    /// Open tasks are ordered by ground distance from HQ to their
    /// destination. FAST_LOAD_SLOW_MOVE agents get the nearest and
    /// SLOW_LOAD_FAST_MOVE agents the farthest.
    pub fn assign(
        &mut self,
        graph: &CityGraph,
        agent: &mut Agent,
        recognition_distance: f32,
    ) -> Result<&Task, FleetError> {
        let hq = graph.hq().position;
        let distance = agent.position.distance_2d(&hq);
        if distance > recognition_distance {
            return Err(FleetError::TooFarFromHq {
                agent: agent.name.clone(),
                distance,
                limit: recognition_distance,
            });
        }
        if let Some(task) = agent.current_task {
            return Err(FleetError::AlreadyAssigned {
                agent: agent.name.clone(),
                task,
            });
        }

        let mut ranked: Vec<(f32, u64, TaskId)> = self
            .open_tasks()
            .map(|t| {
                let d = graph
                    .node_by_global(t.destination)
                    .map(|n| n.position.distance_2d(&hq))
                    .unwrap_or(f32::INFINITY);
                (d, t.seq, t.id)
            })
            .collect();
        ranked.sort_by(|a, b| match a.0.total_cmp(&b.0) {
            Ordering::Equal => a.1.cmp(&b.1),
            other => other,
        });

        let picked = match agent.agent_type {
            AgentType::FastLoadSlowMove => ranked.first(),
            AgentType::SlowLoadFastMove => ranked.last(),
        };
        let Some(&(_, seq, id)) = picked else {
            return Err(FleetError::NoOpenTasks);
        };

        self.open.remove(&seq);
        self.assigned.insert(id);
        let task = self.tasks.get_mut(&id).ok_or(FleetError::TaskNotFound(id))?;
        task.state = TaskState::Assigned;
        task.assignee = Some(agent.name.clone());
        task.assignment_id = Some(Uuid::new_v4());

        agent.current_task = Some(id);
        agent.status = format!("delivering {}", task.name);
        Ok(task)
    }

    /// Complete the task `agent` holds, if it is close enough to the
    /// destination.
    pub fn complete(
        &mut self,
        graph: &CityGraph,
        agent: &mut Agent,
        recognition_distance: f32,
    ) -> Result<&Task, FleetError> {
        let id = agent
            .current_task
            .ok_or_else(|| FleetError::NoTaskHeld(agent.name.clone()))?;
        let task = self.tasks.get(&id).ok_or(FleetError::TaskNotFound(id))?;
        let destination = graph
            .node_by_global(task.destination)
            .ok_or(FleetError::TaskNotFound(id))?;

        let distance = agent.position.distance_2d(&destination.position);
        if distance > recognition_distance {
            return Err(FleetError::TooFarFromDestination {
                agent: agent.name.clone(),
                distance,
                limit: recognition_distance,
            });
        }

        self.assigned.remove(&id);
        self.completed.push(id);
        let task = self.tasks.get_mut(&id).ok_or(FleetError::TaskNotFound(id))?;
        task.state = TaskState::Completed;

        agent.current_task = None;
        agent.tasks_completed += 1;
        agent.status = crate::agent::IDLE_STATUS.to_string();
        Ok(task)
    }

    /// Return an assigned task to the open pool at its original place.
    pub fn reclaim(&mut self, id: TaskId) -> Result<&Task, FleetError> {
        let task = self.tasks.get_mut(&id).ok_or(FleetError::TaskNotFound(id))?;
        if task.state != TaskState::Assigned {
            return Err(FleetError::TaskNotFound(id));
        }
        task.state = TaskState::Open;
        task.assignee = None;
        task.assignment_id = None;
        self.assigned.remove(&id);
        self.open.insert(task.seq, id);
        Ok(task)
    }
}
