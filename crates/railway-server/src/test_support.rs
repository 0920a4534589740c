//! Fixtures shared by unit and end-to-end tests.
//!
//! Builds the full service stack on an in-memory database with a manual
//! clock, a seeded demo network and a mailer that records instead of
//! sending.

#![allow(clippy::expect_used)]

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use railway_core::config::Config;

use crate::auth::{AuthManager, AuthPolicy};
use crate::booking::BookingEngine;
use crate::clock::{Clock, ManualClock};
use crate::notify::{MailError, Mailer, OutgoingEmail};
use crate::server::Services;
use crate::storage::Database;
use crate::storage::seed::{DemoNetwork, seed_demo_network};

/// Departure date of the seeded schedule.
pub const DEMO_DATE: &str = "2025-06-01";

/// Mailer that keeps every message in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<OutgoingEmail>>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Most recent six-digit code mailed to `to`.
    pub fn last_code_for(&self, to: &str) -> Option<String> {
        self.sent().iter().rev().filter(|m| m.to == to).find_map(|m| {
            m.body
                .split(|c: char| !c.is_ascii_digit())
                .find(|w| w.len() == 6)
                .map(str::to_string)
        })
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(email.clone());
        Ok(())
    }
}

/// Everything a test needs to drive the services.
pub struct TestStack {
    pub db: Database,
    pub clock: ManualClock,
    pub auth: AuthManager,
    pub booking: BookingEngine,
    pub mailer: RecordingMailer,
    pub network: DemoNetwork,
}

/// Noon UTC on the day before the demo departure.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 31, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

/// In-memory stack with default policy and the demo network seeded.
pub async fn stack() -> TestStack {
    stack_with(&Config::default()).await
}

pub async fn stack_with(config: &Config) -> TestStack {
    let db = Database::open_in_memory()
        .await
        .expect("in-memory database");
    let network = seed_demo_network(&mut db.lock().await, DEMO_DATE)
        .await
        .expect("demo seed");
    let clock = ManualClock::new(start_time());
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());

    TestStack {
        auth: AuthManager::new(
            db.clone(),
            Arc::clone(&shared),
            AuthPolicy::from_config(&config.security),
        ),
        booking: BookingEngine::new(
            db.clone(),
            shared,
            Duration::minutes(config.booking.hold_minutes),
        ),
        db,
        clock,
        mailer: RecordingMailer::default(),
        network,
    }
}

impl TestStack {
    /// Services for a server built on this stack.
    pub fn services(&self) -> Services {
        Services {
            auth: self.auth.clone(),
            booking: self.booking.clone(),
            mailer: Arc::new(self.mailer.clone()),
        }
    }

    /// Register and verify an account, returning its user id.
    pub async fn verified_user(&self, email: &str, password: &str) -> i64 {
        let reg = self
            .auth
            .register("Test", "User", email, password, None)
            .await
            .expect("register");
        self.auth
            .verify_email(&reg.email, &reg.code, None)
            .await
            .expect("verify email");
        reg.user_id
    }
}
