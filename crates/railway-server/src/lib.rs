//! Railway booking server library.
//!
//! Core functionality for the booking server:
//! - SQLite storage for accounts, reference data and tickets
//! - Salted password digests, session tokens and email verification
//! - Segment-aware seat booking with an unpaid-hold window
//! - Line-delimited JSON protocol over TCP with a connection ceiling

pub mod auth;
pub mod booking;
pub mod clock;
pub mod error;
pub mod notify;
pub mod registry;
pub mod server;
pub mod storage;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
