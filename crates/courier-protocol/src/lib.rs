//! Courier Protocol - shared types and the binary wire format
//!
//! Agents talk to the dispatch backend with one fixed-length request frame
//! per TCP connection and receive one length-prefixed response frame back.

pub mod codec;
pub mod constants;
pub mod error;
pub mod messages;
pub mod types;

pub use codec::{decode_request, decode_response, encode_request, encode_response};
pub use constants::*;
pub use error::*;
pub use messages::*;
pub use types::*;
