use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use courier_protocol::{GlobalIndex, GraphIndex, Vec3};
use rand::Rng;
use serde::Serialize;

use crate::GraphError;

/// An intersection that survived pruning.
#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub global_index: GlobalIndex,
    pub graph_index: GraphIndex,
    pub horiz_idx: usize,
    pub vert_idx: usize,
    pub position: Vec3,
    /// Connected neighbors, by global index. Symmetric across the graph.
    pub neighbors: BTreeSet<GlobalIndex>,
}

/// The connected street graph.
///
/// Nodes are stored in `GraphIndex` order. `global_to_graph` is the
/// conversion table between the two index spaces; the inverse is the
/// `global_index` field on each node.
#[derive(Debug, Clone, Serialize)]
pub struct CityGraph {
    nodes: Vec<GraphNode>,
    #[serde(skip)]
    global_to_graph: HashMap<GlobalIndex, GraphIndex>,
    hq: GraphIndex,
    edge_count: usize,
}

impl CityGraph {
    /// Assemble a graph from unpruned cells. Cells without neighbors are
    /// dropped and the survivors are numbered in global order.
    pub(crate) fn from_cells(
        cells: Vec<(GlobalIndex, usize, usize, Vec3, BTreeSet<GlobalIndex>)>,
        hq: GlobalIndex,
    ) -> Result<Self, GraphError> {
        let mut nodes = Vec::new();
        let mut global_to_graph = HashMap::new();
        let mut degree_sum = 0;

        for (global_index, horiz_idx, vert_idx, position, neighbors) in cells {
            if neighbors.is_empty() {
                continue;
            }
            let graph_index = GraphIndex(nodes.len());
            global_to_graph.insert(global_index, graph_index);
            degree_sum += neighbors.len();
            nodes.push(GraphNode {
                global_index,
                graph_index,
                horiz_idx,
                vert_idx,
                position,
                neighbors,
            });
        }

        let hq = *global_to_graph
            .get(&hq)
            .ok_or_else(|| GraphError::InvalidLayout(format!("HQ {hq} has no streets")))?;

        let graph = Self {
            nodes,
            global_to_graph,
            hq,
            edge_count: degree_sum / 2,
        };
        graph.check_symmetric()?;
        Ok(graph)
    }

    /// Build a graph from explicit positions and undirected edges.
    ///
    /// Position `i` becomes `GlobalIndex(i)` with lattice coordinates `(i, 0)`.
    /// Intended for hand-made layouts, such as fixtures with known distances.
    pub fn from_layout(
        positions: &[Vec3],
        edges: &[(usize, usize)],
        hq: usize,
    ) -> Result<Self, GraphError> {
        let mut neighbors = vec![BTreeSet::new(); positions.len()];
        for &(a, b) in edges {
            if a >= positions.len() || b >= positions.len() {
                return Err(GraphError::InvalidLayout(format!(
                    "edge ({a}, {b}) references a missing node"
                )));
            }
            if a == b {
                return Err(GraphError::InvalidLayout(format!("self loop on {a}")));
            }
            neighbors[a].insert(GlobalIndex(b));
            neighbors[b].insert(GlobalIndex(a));
        }

        let cells = positions
            .iter()
            .zip(neighbors)
            .enumerate()
            .map(|(i, (pos, n))| (GlobalIndex(i), i, 0, *pos, n))
            .collect();
        let graph = Self::from_cells(cells, GlobalIndex(hq))?;
        if !graph.is_connected() {
            return Err(GraphError::InvalidLayout(
                "layout has more than one component".into(),
            ));
        }
        Ok(graph)
    }

    fn check_symmetric(&self) -> Result<(), GraphError> {
        for node in &self.nodes {
            for neighbor in &node.neighbors {
                let back = self
                    .node_by_global(*neighbor)
                    .map(|n| n.neighbors.contains(&node.global_index))
                    .unwrap_or(false);
                if !back {
                    return Err(GraphError::InvalidLayout(format!(
                        "edge {} -> {} is not mirrored",
                        node.global_index, neighbor
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter()
    }

    pub fn hq(&self) -> &GraphNode {
        &self.nodes[self.hq.0]
    }

    pub fn hq_index(&self) -> GraphIndex {
        self.hq
    }

    pub fn node(&self, index: GraphIndex) -> Option<&GraphNode> {
        self.nodes.get(index.0)
    }

    pub fn node_by_global(&self, index: GlobalIndex) -> Option<&GraphNode> {
        self.to_graph_index(index).and_then(|g| self.node(g))
    }

    /// Global -> graph index. `None` for cells pruned from the graph.
    pub fn to_graph_index(&self, index: GlobalIndex) -> Option<GraphIndex> {
        self.global_to_graph.get(&index).copied()
    }

    /// Graph -> global index.
    pub fn to_global_index(&self, index: GraphIndex) -> Option<GlobalIndex> {
        self.node(index).map(|n| n.global_index)
    }

    pub fn is_hq(&self, index: GlobalIndex) -> bool {
        self.hq().global_index == index
    }

    /// Neighbors of a node, in graph index space and ascending order.
    pub fn neighbors_of(&self, index: GraphIndex) -> Vec<GraphIndex> {
        let mut out: Vec<GraphIndex> = self
            .node(index)
            .map(|n| {
                n.neighbors
                    .iter()
                    .filter_map(|g| self.to_graph_index(*g))
                    .collect()
            })
            .unwrap_or_default();
        out.sort();
        out
    }

    /// True when every node is reachable from HQ.
    pub fn is_connected(&self) -> bool {
        let mut seen = HashSet::from([self.hq]);
        let mut queue = VecDeque::from([self.hq]);
        while let Some(current) = queue.pop_front() {
            for next in self.neighbors_of(current) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        seen.len() == self.nodes.len()
    }

    /// Scan all nodes starting at a random offset, wrapping around, and
    /// return the first that satisfies `accept`.
    pub fn scan_from_random<R, F>(&self, rng: &mut R, accept: F) -> Option<&GraphNode>
    where
        R: Rng,
        F: FnMut(&GraphNode) -> bool,
    {
        if self.nodes.is_empty() {
            return None;
        }
        let start = rng.gen_range(0..self.nodes.len());
        self.scan_from(start, accept)
    }

    /// Wraparound scan starting at position `start`.
    fn scan_from<F>(&self, start: usize, mut accept: F) -> Option<&GraphNode>
    where
        F: FnMut(&GraphNode) -> bool,
    {
        (0..self.nodes.len())
            .map(|step| &self.nodes[(start + step) % self.nodes.len()])
            .find(|node| accept(*node))
    }

    /// Pick a node that is neither HQ nor in `occupied`.
    ///
    /// When every candidate is taken this falls back to the initial random
    /// pick, which may be occupied or even HQ.
    pub fn random_unoccupied_node<R: Rng>(
        &self,
        occupied: &HashSet<GlobalIndex>,
        rng: &mut R,
    ) -> &GraphNode {
        let start = rng.gen_range(0..self.nodes.len());
        let hq = self.hq().global_index;
        self.scan_from(start, |n| {
            n.global_index != hq && !occupied.contains(&n.global_index)
        })
        .unwrap_or_else(|| {
            tracing::debug!("every node is occupied, reusing random pick");
            &self.nodes[start]
        })
    }
}
