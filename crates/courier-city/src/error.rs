use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("lattice must be at least 2x2, got {horizontal}x{vertical}")]
    InvalidDimensions { horizontal: usize, vertical: usize },

    #[error("invalid bounds: {0}")]
    InvalidBounds(String),

    #[error("edge target {target} outside 1..={max} for this lattice")]
    EdgeTargetOutOfRange { target: usize, max: usize },

    #[error("growth stalled after {attempts} attempts with {made}/{target} edges")]
    GrowthStalled {
        made: usize,
        target: usize,
        attempts: u64,
    },

    #[error("invalid layout: {0}")]
    InvalidLayout(String),

    #[error("map parse error on line {line}: {reason}")]
    Parse { line: usize, reason: String },
}
