//! Wire layout constants.

/// Request frame length used by the reference deployment.
pub const DEFAULT_FRAME_LEN: usize = 64;

/// Smallest frame that can carry every request layout (STATUS_UPDATE ends at byte 48).
pub const MIN_FRAME_LEN: usize = 48;

/// Width of every agent name field.
pub const NAME_FIELD_LEN: usize = 16;

/// Width of the STATUS_UPDATE status text field.
pub const STATUS_FIELD_LEN: usize = 31;

/// Width of the task name in a successful work response.
pub const TASK_NAME_FIELD_LEN: usize = 32;

/// Size of the big-endian length prefix on response frames.
pub const RESPONSE_LEN_PREFIX: usize = 4;

// Request byte offsets.
pub const REG_COLOR_OFFSET: usize = 1;
pub const REG_NAME_OFFSET: usize = 13;
pub const REG_AGENT_TYPE_OFFSET: usize = 29;
pub const NAME_ONLY_OFFSET: usize = 1;
pub const POS_START_OFFSET: usize = 1;
pub const POS_END_OFFSET: usize = 5;
pub const POS_FRACTION_OFFSET: usize = 9;
pub const POS_NAME_OFFSET: usize = 13;
pub const STATUS_TEXT_OFFSET: usize = 1;
pub const STATUS_NAME_OFFSET: usize = 32;
