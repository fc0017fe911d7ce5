use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Identity of a lattice cell, dense over the full horizontal x vertical grid.
///
/// Assigned once at lattice creation and never reused, including for cells
/// that are later pruned from the connected graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GlobalIndex(pub usize);

/// Identity of a node inside the pruned, connected graph.
///
/// Dense over surviving nodes only. This is the index space used in every
/// wire payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GraphIndex(pub usize);

impl std::fmt::Display for GlobalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

impl std::fmt::Display for GraphIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A point in world space. `y` is the vertical axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Vec3) -> f32 {
        let (dx, dy, dz) = (other.x - self.x, other.y - self.y, other.z - self.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Ground-plane distance, ignoring the vertical axis.
    pub fn distance_2d(&self, other: &Vec3) -> f32 {
        let (dx, dz) = (other.x - self.x, other.z - self.z);
        (dx * dx + dz * dz).sqrt()
    }

    pub fn lerp(&self, other: &Vec3, t: f32) -> Vec3 {
        Vec3 {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
        }
    }
}

/// Agent display color, each channel nominally in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const RED: Rgb = Rgb::new(1.0, 0.0, 0.0);
    pub const GREEN: Rgb = Rgb::new(0.0, 1.0, 0.0);
    pub const BLUE: Rgb = Rgb::new(0.0, 0.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }
}

/// Loading/travel tradeoff an agent declares at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentType {
    /// Slow to move, so it gets the task nearest HQ.
    #[default]
    FastLoadSlowMove,
    /// Fast to move, so it gets the task farthest from HQ.
    SlowLoadFastMove,
}

impl AgentType {
    pub fn code(&self) -> u8 {
        match self {
            Self::FastLoadSlowMove => 0,
            Self::SlowLoadFastMove => 1,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        match code {
            0 => Ok(Self::FastLoadSlowMove),
            1 => Ok(Self::SlowLoadFastMove),
            other => Err(ProtocolError::UnknownAgentType(other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FastLoadSlowMove => "FAST_LOAD_SLOW_MOVE",
            Self::SlowLoadFastMove => "SLOW_LOAD_FAST_MOVE",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
