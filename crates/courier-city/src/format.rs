//! Plain-text map serialization and the client-side parser.
//!
//! Compact layout:
//! ```text
//! <node count>
//! <graphIndex> <neighbor graphIndex> <distance> ...
//! ```
//!
//! Detailed layout adds the HQ and node positions:
//! ```text
//! <hq graphIndex> <x> <y> <z>
//! <node count>
//! <graphIndex> <x> <y> <z>
//! <neighbor graphIndex> <distance> ...
//! ```

use std::fmt::Write as _;

use courier_protocol::{GraphIndex, Vec3};
use serde::{Deserialize, Serialize};

use crate::{CityGraph, GraphError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapFormat {
    #[default]
    Compact,
    Detailed,
}

impl CityGraph {
    pub fn render(&self, format: MapFormat) -> String {
        match format {
            MapFormat::Compact => self.to_compact_string(),
            MapFormat::Detailed => self.to_detailed_string(),
        }
    }

    pub fn to_compact_string(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.node_count());
        for node in self.nodes() {
            let _ = write!(out, "{}", node.graph_index);
            self.write_neighbor_pairs(&mut out, node.graph_index, true);
            out.push('\n');
        }
        out
    }

    pub fn to_detailed_string(&self) -> String {
        let mut out = String::new();
        let hq = self.hq();
        let _ = writeln!(out, "{} {}", hq.graph_index, fmt_vec3(&hq.position));
        let _ = writeln!(out, "{}", self.node_count());
        for node in self.nodes() {
            let _ = writeln!(out, "{} {}", node.graph_index, fmt_vec3(&node.position));
            self.write_neighbor_pairs(&mut out, node.graph_index, false);
            out.push('\n');
        }
        out
    }

    fn write_neighbor_pairs(&self, out: &mut String, index: GraphIndex, leading_space: bool) {
        let Some(node) = self.node(index) else {
            return;
        };
        for (i, neighbor) in self.neighbors_of(index).into_iter().enumerate() {
            let Some(other) = self.node(neighbor) else {
                continue;
            };
            if i > 0 || leading_space {
                out.push(' ');
            }
            let _ = write!(
                out,
                "{} {:.4}",
                neighbor,
                node.position.distance(&other.position)
            );
        }
    }
}

fn fmt_vec3(v: &Vec3) -> String {
    format!("{:.4} {:.4} {:.4}", v.x, v.y, v.z)
}

/// A node as seen by a client that parsed the map text.
#[derive(Debug, Clone, PartialEq)]
pub struct MapNode {
    pub index: GraphIndex,
    /// Only present in the detailed layout.
    pub position: Option<Vec3>,
    pub neighbors: Vec<(GraphIndex, f32)>,
}

/// Client-side view of a serialized map.
#[derive(Debug, Clone, PartialEq)]
pub struct CityMap {
    /// HQ index and position; only present in the detailed layout.
    pub hq: Option<(GraphIndex, Vec3)>,
    pub nodes: Vec<MapNode>,
}

impl CityMap {
    /// Parse either layout. A first line holding a single number is compact,
    /// four numbers is detailed.
    pub fn parse(text: &str) -> Result<Self, GraphError> {
        let lines: Vec<(usize, &str)> = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .collect();
        let Some(&(_, first)) = lines.first() else {
            return Err(parse_err(1, "empty map"));
        };

        match first.split_whitespace().count() {
            1 => Self::parse_compact(&lines),
            4 => Self::parse_detailed(&lines),
            n => Err(parse_err(1, format!("header has {n} fields"))),
        }
    }

    fn parse_compact(lines: &[(usize, &str)]) -> Result<Self, GraphError> {
        let (line_no, header) = lines[0];
        let count: usize = parse_num(header, line_no)?;
        let body: Vec<&(usize, &str)> = lines[1..].iter().filter(|(_, l)| !l.is_empty()).collect();
        if body.len() != count {
            return Err(parse_err(
                line_no,
                format!("declared {count} nodes, found {}", body.len()),
            ));
        }

        let mut nodes = Vec::with_capacity(count);
        for &&(line_no, line) in &body {
            let mut tokens = line.split_whitespace();
            let index = GraphIndex(parse_num(tokens.next().unwrap_or(""), line_no)?);
            let rest: Vec<&str> = tokens.collect();
            nodes.push(MapNode {
                index,
                position: None,
                neighbors: parse_pairs(&rest, line_no)?,
            });
        }
        Ok(Self { hq: None, nodes })
    }

    fn parse_detailed(lines: &[(usize, &str)]) -> Result<Self, GraphError> {
        let (hq_line, hq_text) = lines[0];
        let (hq_index, hq_pos) = parse_index_and_position(hq_text, hq_line)?;

        let Some(&(count_line, count_text)) = lines.get(1) else {
            return Err(parse_err(2, "missing node count"));
        };
        let count: usize = parse_num(count_text, count_line)?;

        let body = &lines[2..];
        if body.len() < count * 2 {
            return Err(parse_err(
                count_line,
                format!("declared {count} nodes, found {} lines", body.len()),
            ));
        }

        let mut nodes = Vec::with_capacity(count);
        for pair in body.chunks(2).take(count) {
            let (node_line, node_text) = pair[0];
            let (index, position) = parse_index_and_position(node_text, node_line)?;
            let (neighbor_line, neighbor_text) = pair[1];
            let tokens: Vec<&str> = neighbor_text.split_whitespace().collect();
            nodes.push(MapNode {
                index,
                position: Some(position),
                neighbors: parse_pairs(&tokens, neighbor_line)?,
            });
        }
        Ok(Self {
            hq: Some((hq_index, hq_pos)),
            nodes,
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Undirected edge count (each edge is listed from both ends).
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.neighbors.len()).sum::<usize>() / 2
    }

    pub fn node(&self, index: GraphIndex) -> Option<&MapNode> {
        self.nodes.iter().find(|n| n.index == index)
    }
}

fn parse_err(line: usize, reason: impl Into<String>) -> GraphError {
    GraphError::Parse {
        line,
        reason: reason.into(),
    }
}

fn parse_num<T: std::str::FromStr>(token: &str, line: usize) -> Result<T, GraphError> {
    token
        .parse()
        .map_err(|_| parse_err(line, format!("bad number '{token}'")))
}

fn parse_index_and_position(text: &str, line: usize) -> Result<(GraphIndex, Vec3), GraphError> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() != 4 {
        return Err(parse_err(line, "expected index and three coordinates"));
    }
    Ok((
        GraphIndex(parse_num(tokens[0], line)?),
        Vec3::new(
            parse_num(tokens[1], line)?,
            parse_num(tokens[2], line)?,
            parse_num(tokens[3], line)?,
        ),
    ))
}

fn parse_pairs(tokens: &[&str], line: usize) -> Result<Vec<(GraphIndex, f32)>, GraphError> {
    if tokens.len() % 2 != 0 {
        return Err(parse_err(line, "neighbor without a distance"));
    }
    tokens
        .chunks(2)
        .map(|pair| {
            Ok((
                GraphIndex(parse_num(pair[0], line)?),
                parse_num(pair[1], line)?,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> CityGraph {
        let positions = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(3.0, 0.0, 4.0),
            Vec3::new(3.0, 0.0, 0.0),
        ];
        CityGraph::from_layout(&positions, &[(0, 1), (1, 2), (2, 0)], 2).unwrap()
    }

    #[test]
    fn test_compact_text() {
        let text = triangle().to_compact_string();
        assert_eq!(
            text,
            "3\n0 1 5.0000 2 3.0000\n1 0 5.0000 2 4.0000\n2 0 3.0000 1 4.0000\n"
        );
    }

    #[test]
    fn test_detailed_text_starts_with_hq() {
        let text = triangle().to_detailed_string();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("2 3.0000 0.0000 0.0000"));
        assert_eq!(lines.next(), Some("3"));
        assert_eq!(lines.next(), Some("0 0.0000 0.0000 0.0000"));
        assert_eq!(lines.next(), Some("1 5.0000 2 3.0000"));
    }

    #[test]
    fn test_parse_detects_layout() {
        let graph = triangle();
        let compact = CityMap::parse(&graph.to_compact_string()).unwrap();
        assert!(compact.hq.is_none());
        assert_eq!(compact.node_count(), 3);
        assert_eq!(compact.edge_count(), 3);

        let detailed = CityMap::parse(&graph.to_detailed_string()).unwrap();
        assert_eq!(detailed.hq.map(|(i, _)| i), Some(GraphIndex(2)));
        assert_eq!(detailed.edge_count(), 3);
        assert_eq!(
            detailed.node(GraphIndex(1)).and_then(|n| n.position),
            Some(Vec3::new(3.0, 0.0, 4.0))
        );
    }

    #[test]
    fn test_parse_rejects_count_mismatch() {
        let err = CityMap::parse("3\n0 1 1.0\n1 0 1.0\n").unwrap_err();
        assert!(matches!(err, GraphError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_parse_rejects_dangling_neighbor() {
        let err = CityMap::parse("1\n0 1\n").unwrap_err();
        assert!(matches!(err, GraphError::Parse { line: 2, .. }));
    }
}
