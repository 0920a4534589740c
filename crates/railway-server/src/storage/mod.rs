//! SQLite storage for the railway booking server.
//!
//! Provides persistence for accounts, sessions, verification codes, the audit
//! log, reference data (stations, trains, routes, schedules) and tickets.
//! All access goes through [`Database::lock`].

mod db;
mod models;
mod queries_accounts;
mod queries_booking;
mod queries_reference;
pub mod seed;


pub use db::{Database, DatabaseError, DbLock};
pub use models::*;
pub use queries_reference::StopSpec;
