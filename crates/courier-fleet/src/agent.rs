//! Live agents keyed by their preferred name.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use courier_city::CityGraph;
use courier_protocol::{AgentType, GlobalIndex, GraphIndex, Rgb, Vec3};
use rand::Rng;
use serde::Serialize;

use crate::{FleetError, TaskId};

pub const IDLE_STATUS: &str = "idle";

/// A registered courier.
#[derive(Debug, Clone, Serialize)]
pub struct Agent {
    pub name: String,
    pub hostname: String,
    pub port: u16,
    pub color: Rgb,
    pub agent_type: AgentType,
    pub status: String,
    pub position: Vec3,
    /// Node the agent last arrived at. Counts as occupied for placement.
    pub last_visited: GlobalIndex,
    pub current_task: Option<TaskId>,
    pub last_message_at: DateTime<Utc>,
    pub tasks_completed: u64,
}

/// Everything a registration supplies.
#[derive(Debug, Clone)]
pub struct NewAgent {
    pub name: String,
    pub color: Rgb,
    pub agent_type: AgentType,
    pub hostname: String,
    pub port: u16,
}

#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Agent>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Agent> {
        self.agents.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Agent> {
        self.agents.get_mut(name)
    }

    pub(crate) fn require_mut(&mut self, name: &str) -> Result<&mut Agent, FleetError> {
        self.agents
            .get_mut(name)
            .ok_or_else(|| FleetError::AgentNotFound(name.to_string()))
    }

    /// Agents sorted by name.
    pub fn agents(&self) -> Vec<&Agent> {
        let mut out: Vec<&Agent> = self.agents.values().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Nodes currently held by some agent's last arrival.
    pub fn occupied_nodes(&self) -> HashSet<GlobalIndex> {
        self.agents.values().map(|a| a.last_visited).collect()
    }

    /// Register a new agent on a random unoccupied node. Returns the node it
    /// was placed on alongside the agent.
    pub fn create<R: Rng>(
        &mut self,
        graph: &CityGraph,
        rng: &mut R,
        spec: NewAgent,
        now: DateTime<Utc>,
    ) -> Result<(GraphIndex, &Agent), FleetError> {
        if self.agents.contains_key(&spec.name) {
            return Err(FleetError::DuplicateName(spec.name));
        }

        let node = graph.random_unoccupied_node(&self.occupied_nodes(), rng);
        let agent = Agent {
            name: spec.name.clone(),
            hostname: spec.hostname,
            port: spec.port,
            color: spec.color,
            agent_type: spec.agent_type,
            status: IDLE_STATUS.to_string(),
            position: node.position,
            last_visited: node.global_index,
            current_task: None,
            last_message_at: now,
            tasks_completed: 0,
        };
        Ok((node.graph_index, self.agents.entry(spec.name).or_insert(agent)))
    }

    pub fn destroy(&mut self, name: &str) -> Result<Agent, FleetError> {
        self.agents
            .remove(name)
            .ok_or_else(|| FleetError::AgentNotFound(name.to_string()))
    }

    /// Refresh the liveness timestamp. Returns false for unknown names.
    pub fn touch(&mut self, name: &str, now: DateTime<Utc>) -> bool {
        match self.agents.get_mut(name) {
            Some(agent) => {
                agent.last_message_at = now;
                true
            }
            None => false,
        }
    }

    /// Move an agent `fraction` of the way from `start` to `end`.
    ///
    /// The fraction is clamped to [0, 1]. Reaching 1 counts as arriving at
    /// `end` and updates `last_visited`; anything less leaves it alone.
    pub fn update_position(
        &mut self,
        graph: &CityGraph,
        name: &str,
        start: GraphIndex,
        end: GraphIndex,
        fraction: f32,
        now: DateTime<Utc>,
    ) -> Result<&Agent, FleetError> {
        let from = graph.node(start).ok_or(FleetError::NodeNotFound(start))?;
        let to = graph.node(end).ok_or(FleetError::NodeNotFound(end))?;
        let agent = self.require_mut(name)?;

        let fraction = fraction.clamp(0.0, 1.0);
        agent.position = from.position.lerp(&to.position, fraction);
        if fraction >= 1.0 {
            agent.last_visited = to.global_index;
        }
        agent.last_message_at = now;
        Ok(agent)
    }

    pub fn update_status(
        &mut self,
        name: &str,
        status: &str,
        now: DateTime<Utc>,
    ) -> Result<(), FleetError> {
        let agent = self.require_mut(name)?;
        agent.status = status.to_string();
        agent.last_message_at = now;
        Ok(())
    }

    /// Names of agents silent for longer than `timeout`, sorted.
    pub fn stale_agents(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<String> {
        let mut stale: Vec<String> = self
            .agents
            .values()
            .filter_map(|agent| {
                let age = now.signed_duration_since(agent.last_message_at).to_std().ok()?;
                (age > timeout).then(|| agent.name.clone())
            })
            .collect();
        stale.sort();
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn graph() -> CityGraph {
        let positions = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(20.0, 0.0, 0.0),
        ];
        CityGraph::from_layout(&positions, &[(0, 1), (1, 2)], 0).unwrap()
    }

    fn spec(name: &str) -> NewAgent {
        NewAgent {
            name: name.into(),
            color: Rgb::BLUE,
            agent_type: AgentType::FastLoadSlowMove,
            hostname: "127.0.0.1".into(),
            port: 4000,
        }
    }

    #[test]
    fn test_create_places_agent_off_hq() {
        let graph = graph();
        let mut registry = AgentRegistry::new();
        let mut rng = StdRng::seed_from_u64(1);
        let (node, agent) = registry
            .create(&graph, &mut rng, spec("a"), Utc::now())
            .unwrap();
        assert_ne!(agent.last_visited, GlobalIndex(0));
        assert_eq!(graph.to_graph_index(agent.last_visited), Some(node));
        assert_eq!(agent.status, IDLE_STATUS);
        assert_eq!(
            Some(agent.position),
            graph.node_by_global(agent.last_visited).map(|n| n.position)
        );
    }

    #[test]
    fn test_second_agent_takes_free_node() {
        let graph = graph();
        let mut registry = AgentRegistry::new();
        let mut rng = StdRng::seed_from_u64(2);
        let first = registry
            .create(&graph, &mut rng, spec("a"), Utc::now())
            .unwrap()
            .1
            .last_visited;
        let second = registry
            .create(&graph, &mut rng, spec("b"), Utc::now())
            .unwrap()
            .1
            .last_visited;
        assert_ne!(first, second);
    }

    #[test]
    fn test_duplicate_name_leaves_registry_untouched() {
        let graph = graph();
        let mut registry = AgentRegistry::new();
        let mut rng = StdRng::seed_from_u64(3);
        let t0 = Utc::now();
        registry.create(&graph, &mut rng, spec("a"), t0).unwrap();
        let before = registry.get("a").cloned().unwrap();

        let err = registry
            .create(&graph, &mut rng, spec("a"), t0 + chrono::Duration::seconds(5))
            .unwrap_err();
        assert_eq!(err, FleetError::DuplicateName("a".into()));
        assert_eq!(registry.len(), 1);
        let after = registry.get("a").unwrap();
        assert_eq!(after.last_message_at, before.last_message_at);
        assert_eq!(after.last_visited, before.last_visited);
    }

    #[test]
    fn test_position_commits_occupancy_only_on_arrival() {
        let graph = graph();
        let mut registry = AgentRegistry::new();
        let mut rng = StdRng::seed_from_u64(4);
        registry.create(&graph, &mut rng, spec("a"), Utc::now()).unwrap();
        let origin = registry.get("a").unwrap().last_visited;

        let agent = registry
            .update_position(&graph, "a", GraphIndex(0), GraphIndex(1), 0.5, Utc::now())
            .unwrap();
        assert_eq!(agent.position, Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(agent.last_visited, origin);

        let agent = registry
            .update_position(&graph, "a", GraphIndex(1), GraphIndex(2), 3.0, Utc::now())
            .unwrap();
        assert_eq!(agent.position, Vec3::new(20.0, 0.0, 0.0));
        assert_eq!(agent.last_visited, GlobalIndex(2));
    }

    #[test]
    fn test_position_rejects_unknown_node() {
        let graph = graph();
        let mut registry = AgentRegistry::new();
        let mut rng = StdRng::seed_from_u64(5);
        registry.create(&graph, &mut rng, spec("a"), Utc::now()).unwrap();
        let err = registry
            .update_position(&graph, "a", GraphIndex(0), GraphIndex(9), 0.5, Utc::now())
            .unwrap_err();
        assert_eq!(err, FleetError::NodeNotFound(GraphIndex(9)));
    }

    #[test]
    fn test_stale_agents_respects_timeout() {
        let graph = graph();
        let mut registry = AgentRegistry::new();
        let mut rng = StdRng::seed_from_u64(6);
        let t0 = Utc::now();
        registry.create(&graph, &mut rng, spec("quiet"), t0).unwrap();
        registry.create(&graph, &mut rng, spec("chatty"), t0).unwrap();
        registry.touch("chatty", t0 + chrono::Duration::seconds(25));

        let now = t0 + chrono::Duration::seconds(31);
        assert_eq!(
            registry.stale_agents(now, Duration::from_secs(30)),
            vec!["quiet".to_string()]
        );
        assert!(registry
            .stale_agents(t0 + chrono::Duration::seconds(30), Duration::from_secs(30))
            .is_empty());
    }
}
