//! Line-delimited JSON protocol spoken between booking clients and the server.
//!
//! One request per line, one response per request. Requests are parsed with a
//! tolerant reader: unknown fields are ignored and a missing or non-object
//! `data` field reads as empty.

mod framing;
mod parser;
mod types;

pub use framing::{FrameError, LineBuffer};
pub use parser::{parse_frame, parse_request, parse_value};
pub use types::*;
