//! Credential store and session/auth manager.
//!
//! - [`password`]: salted, iterated password digests
//! - [`token`]: session tokens and verification codes
//! - [`validation`]: email and free-text normalisation
//! - [`AuthManager`]: registration, login with lockout, sessions, verification

pub mod manager;
pub mod password;
pub mod token;
pub mod validation;

pub use manager::{AuthManager, AuthPolicy, LoginOutcome, Registration};
