//! Randomized street growth over a regular lattice.
//!
//! The growth loop:
//! 1. Start a frontier containing only HQ (the cell nearest the center)
//! 2. Pick a random frontier cell and a random lattice-adjacent cell
//! 3. Try to connect them; skip if the edge exists, or (usually) if either
//!    end already has `crowded_degree` streets
//! 4. On success, add the new cell to the frontier
//! 5. Repeat until `target_edges` streets exist, then prune bare cells

use std::collections::{BTreeSet, HashSet};

use courier_protocol::{GlobalIndex, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::format::MapFormat;
use crate::{CityGraph, GraphError};

/// Lattice and growth parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Cells along the x axis.
    pub horizontal: usize,
    /// Cells along the z axis.
    pub vertical: usize,
    pub min_x: f32,
    pub max_x: f32,
    pub min_z: f32,
    pub max_z: f32,
    /// Height of every node.
    pub y: f32,
    /// Streets to grow before stopping.
    pub target_edges: usize,
    /// Degree at which a cell counts as crowded.
    pub crowded_degree: usize,
    /// Chance that a connection touching a crowded cell is skipped.
    pub crowded_skip_probability: f64,
    /// Upper bound on connection attempts before growth is declared stalled.
    pub max_growth_attempts: u64,
    /// Text layout of the map sent in registration responses.
    pub format: MapFormat,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            horizontal: 12,
            vertical: 12,
            min_x: -55.0,
            max_x: 55.0,
            min_z: -55.0,
            max_z: 55.0,
            y: 0.0,
            target_edges: 150,
            crowded_degree: 3,
            crowded_skip_probability: 0.99,
            max_growth_attempts: 1_000_000,
            format: MapFormat::Compact,
        }
    }
}

impl GraphConfig {
    /// Number of axis-aligned edges in the full lattice.
    pub fn max_lattice_edges(&self) -> usize {
        self.horizontal * self.vertical.saturating_sub(1)
            + self.vertical * self.horizontal.saturating_sub(1)
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        if self.horizontal < 2 || self.vertical < 2 {
            return Err(GraphError::InvalidDimensions {
                horizontal: self.horizontal,
                vertical: self.vertical,
            });
        }
        if !(self.min_x < self.max_x && self.min_z < self.max_z) {
            return Err(GraphError::InvalidBounds(format!(
                "x [{}, {}], z [{}, {}]",
                self.min_x, self.max_x, self.min_z, self.max_z
            )));
        }
        let max = self.max_lattice_edges();
        if self.target_edges == 0 || self.target_edges > max {
            return Err(GraphError::EdgeTargetOutOfRange {
                target: self.target_edges,
                max,
            });
        }
        if !(0.0..=1.0).contains(&self.crowded_skip_probability) {
            return Err(GraphError::InvalidBounds(format!(
                "crowded_skip_probability {} outside [0, 1]",
                self.crowded_skip_probability
            )));
        }
        Ok(())
    }
}

/// A lattice cell during growth.
struct Cell {
    global: GlobalIndex,
    horiz: usize,
    vert: usize,
    position: Vec3,
    neighbors: BTreeSet<GlobalIndex>,
}

/// Grows a `CityGraph` from a `GraphConfig`.
pub struct GraphBuilder {
    config: GraphConfig,
    cells: Vec<Cell>,
}

impl GraphBuilder {
    pub fn new(config: GraphConfig) -> Result<Self, GraphError> {
        config.validate()?;

        let x_step = (config.max_x - config.min_x) / (config.horizontal - 1) as f32;
        let z_step = (config.max_z - config.min_z) / (config.vertical - 1) as f32;

        let mut cells = Vec::with_capacity(config.horizontal * config.vertical);
        for vert in 0..config.vertical {
            for horiz in 0..config.horizontal {
                cells.push(Cell {
                    global: GlobalIndex(cells.len()),
                    horiz,
                    vert,
                    position: Vec3::new(
                        config.min_x + horiz as f32 * x_step,
                        config.y,
                        config.min_z + vert as f32 * z_step,
                    ),
                    neighbors: BTreeSet::new(),
                });
            }
        }

        Ok(Self { config, cells })
    }

    fn global_at(&self, horiz: usize, vert: usize) -> GlobalIndex {
        GlobalIndex(vert * self.config.horizontal + horiz)
    }

    /// HQ is the lattice cell nearest the geometric center.
    pub fn hq_cell(&self) -> GlobalIndex {
        self.global_at(self.config.horizontal / 2, self.config.vertical / 2)
    }

    /// Left, right, down, up neighbors that exist on the lattice.
    fn lattice_neighbors(&self, cell: GlobalIndex) -> Vec<GlobalIndex> {
        let (horiz, vert) = (self.cells[cell.0].horiz, self.cells[cell.0].vert);
        let mut out = Vec::with_capacity(4);
        if horiz > 0 {
            out.push(self.global_at(horiz - 1, vert));
        }
        if horiz + 1 < self.config.horizontal {
            out.push(self.global_at(horiz + 1, vert));
        }
        if vert > 0 {
            out.push(self.global_at(horiz, vert - 1));
        }
        if vert + 1 < self.config.vertical {
            out.push(self.global_at(horiz, vert + 1));
        }
        out
    }

    fn connect(&mut self, a: GlobalIndex, b: GlobalIndex, skip_if_crowded: bool) -> bool {
        if self.cells[a.0].neighbors.contains(&b) {
            return false;
        }
        if skip_if_crowded {
            let crowded = self.config.crowded_degree;
            if self.cells[a.0].neighbors.len() >= crowded
                || self.cells[b.0].neighbors.len() >= crowded
            {
                return false;
            }
        }
        self.cells[a.0].neighbors.insert(b);
        self.cells[b.0].neighbors.insert(a);
        true
    }

    /// Run the growth loop and prune. Consumes the builder.
    pub fn build<R: Rng>(mut self, rng: &mut R) -> Result<CityGraph, GraphError> {
        let hq = self.hq_cell();
        let target = self.config.target_edges;
        let mut frontier = vec![hq];
        let mut in_frontier = HashSet::from([hq]);
        let mut made = 0;
        let mut attempts: u64 = 0;

        while made < target {
            attempts += 1;
            if attempts > self.config.max_growth_attempts {
                return Err(GraphError::GrowthStalled {
                    made,
                    target,
                    attempts: attempts - 1,
                });
            }

            let from = frontier[rng.gen_range(0..frontier.len())];
            let candidates = self.lattice_neighbors(from);
            let to = candidates[rng.gen_range(0..candidates.len())];
            let skip_if_crowded = rng.gen_bool(self.config.crowded_skip_probability);

            if self.connect(from, to, skip_if_crowded) {
                made += 1;
                if in_frontier.insert(to) {
                    frontier.push(to);
                }
            }
        }

        tracing::debug!(
            edges = made,
            attempts,
            reached = frontier.len(),
            "street growth finished"
        );

        let cells = self
            .cells
            .into_iter()
            .map(|c| (c.global, c.horiz, c.vert, c.position, c.neighbors))
            .collect();
        let graph = CityGraph::from_cells(cells, hq)?;

        tracing::info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            hq = %graph.hq_index(),
            "city graph built"
        );
        Ok(graph)
    }
}
