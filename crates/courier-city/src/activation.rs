//! Outward reveal order for renderers.
//!
//! A breadth-first walk from HQ. Each node is announced once, when first
//! reached, and each street once, from the end discovered first. The
//! sequence is lazy and borrows the graph, so a renderer can pull events at
//! its own pace and start over with a fresh sequence at any time.

use std::collections::{HashSet, VecDeque};

use courier_protocol::GraphIndex;
use serde::Serialize;

use crate::CityGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivationEvent {
    Node {
        node: GraphIndex,
        depth: usize,
    },
    Edge {
        from: GraphIndex,
        to: GraphIndex,
        depth: usize,
    },
}

pub struct ActivationSequence<'a> {
    graph: &'a CityGraph,
    queue: VecDeque<(GraphIndex, usize)>,
    seen_nodes: HashSet<GraphIndex>,
    seen_edges: HashSet<(GraphIndex, GraphIndex)>,
    pending: VecDeque<ActivationEvent>,
}

impl<'a> ActivationSequence<'a> {
    fn new(graph: &'a CityGraph) -> Self {
        let hq = graph.hq_index();
        Self {
            graph,
            queue: VecDeque::from([(hq, 0)]),
            seen_nodes: HashSet::from([hq]),
            seen_edges: HashSet::new(),
            pending: VecDeque::from([ActivationEvent::Node { node: hq, depth: 0 }]),
        }
    }

    /// Expand the next queued node into edge and node events.
    fn expand(&mut self) -> bool {
        let Some((current, depth)) = self.queue.pop_front() else {
            return false;
        };
        for next in self.graph.neighbors_of(current) {
            let key = (current.min(next), current.max(next));
            if !self.seen_edges.insert(key) {
                continue;
            }
            self.pending.push_back(ActivationEvent::Edge {
                from: current,
                to: next,
                depth: depth + 1,
            });
            if self.seen_nodes.insert(next) {
                self.pending.push_back(ActivationEvent::Node {
                    node: next,
                    depth: depth + 1,
                });
                self.queue.push_back((next, depth + 1));
            }
        }
        true
    }
}

impl Iterator for ActivationSequence<'_> {
    type Item = ActivationEvent;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if !self.expand() {
                return None;
            }
        }
    }
}

impl CityGraph {
    /// A fresh reveal sequence starting at HQ.
    pub fn activation_sequence(&self) -> ActivationSequence<'_> {
        ActivationSequence::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_protocol::Vec3;

    fn square_with_tail() -> CityGraph {
        // 0 - 1
        // |   |
        // 3 - 2 - 4
        let positions = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(10.0, 0.0, 10.0),
            Vec3::new(0.0, 0.0, 10.0),
            Vec3::new(20.0, 0.0, 10.0),
        ];
        CityGraph::from_layout(&positions, &[(0, 1), (1, 2), (2, 3), (3, 0), (2, 4)], 0).unwrap()
    }

    #[test]
    fn test_sequence_starts_at_hq() {
        let graph = square_with_tail();
        let first = graph.activation_sequence().next();
        assert_eq!(
            first,
            Some(ActivationEvent::Node {
                node: GraphIndex(0),
                depth: 0
            })
        );
    }

    #[test]
    fn test_every_node_and_edge_once() {
        let graph = square_with_tail();
        let events: Vec<_> = graph.activation_sequence().collect();
        let nodes = events
            .iter()
            .filter(|e| matches!(e, ActivationEvent::Node { .. }))
            .count();
        let edges = events
            .iter()
            .filter(|e| matches!(e, ActivationEvent::Edge { .. }))
            .count();
        assert_eq!(nodes, 5);
        assert_eq!(edges, 5);
    }

    #[test]
    fn test_depths_follow_bfs() {
        let graph = square_with_tail();
        let depth_of = |target: usize| {
            graph
                .activation_sequence()
                .find_map(|e| match e {
                    ActivationEvent::Node { node, depth } if node == GraphIndex(target) => {
                        Some(depth)
                    }
                    _ => None,
                })
                .unwrap()
        };
        assert_eq!(depth_of(1), 1);
        assert_eq!(depth_of(3), 1);
        assert_eq!(depth_of(2), 2);
        assert_eq!(depth_of(4), 3);
    }

    #[test]
    fn test_edge_precedes_the_node_it_reveals() {
        let graph = square_with_tail();
        let events: Vec<_> = graph.activation_sequence().collect();
        let edge_pos = events
            .iter()
            .position(|e| matches!(e, ActivationEvent::Edge { to, .. } if *to == GraphIndex(4)))
            .unwrap();
        let node_pos = events
            .iter()
            .position(|e| matches!(e, ActivationEvent::Node { node, .. } if *node == GraphIndex(4)))
            .unwrap();
        assert_eq!(node_pos, edge_pos + 1);
    }

    #[test]
    fn test_sequence_is_restartable() {
        let graph = square_with_tail();
        let a: Vec<_> = graph.activation_sequence().collect();
        let b: Vec<_> = graph.activation_sequence().collect();
        assert_eq!(a, b);
    }
}
