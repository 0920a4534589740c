//! Railway Booking Core Library
//!
//! Shared functionality for the railway booking server:
//! - Line-delimited JSON protocol (requests, responses, framing)
//! - Configuration resolution and hierarchy
//! - SQLite helpers shared by the storage layer
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod protocol;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
