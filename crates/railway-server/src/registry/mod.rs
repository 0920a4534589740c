//! Live-connection table owned by the connection manager.

mod connection;

pub use connection::{ConnectionId, ConnectionRegistry, ConnectionStats, LiveConnection};
