//! Courier City - the procedurally grown street graph
//!
//! Builds a lattice of candidate intersections, grows a connected random
//! street network outward from the HQ node, prunes unreached cells, and
//! exposes both index spaces (`GlobalIndex` over the lattice, `GraphIndex`
//! over the surviving graph).

pub mod activation;
pub mod builder;
pub mod error;
pub mod format;
pub mod graph;

pub use activation::{ActivationEvent, ActivationSequence};
pub use builder::{GraphBuilder, GraphConfig};
pub use error::GraphError;
pub use format::{CityMap, MapFormat, MapNode};
pub use graph::{CityGraph, GraphNode};
