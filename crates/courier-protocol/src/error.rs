use thiserror::Error;

/// Errors raised while encoding or decoding wire frames.
///
/// Every variant is terminal for the request that produced it: the server
/// answers with `FAILURE_REQUEST_PARSING_ERROR` and mutates nothing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("frame is {got} bytes, expected {expected}")]
    WrongLength { expected: usize, got: usize },

    #[error("unknown request type code {0}")]
    UnknownRequestType(u8),

    #[error("unknown status code {0}")]
    UnknownStatus(u8),

    #[error("unknown agent type code {0}")]
    UnknownAgentType(u8),

    #[error("field '{field}' is not printable ASCII")]
    NonAscii { field: &'static str },

    #[error("field '{field}' is empty")]
    EmptyField { field: &'static str },

    #[error("field '{field}' is {len} bytes, limit {limit}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        limit: usize,
    },

    #[error("field '{field}' is not a finite number")]
    NonFinite { field: &'static str },

    #[error("response truncated: {0}")]
    Truncated(String),
}
