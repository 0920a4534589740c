//! Session/auth manager: registration, login with lockout, sessions,
//! email verification and password changes.
//!
//! Every operation takes the database lock once and performs its reads and
//! writes under that single acquisition.

use std::sync::Arc;

use chrono::Duration;
use railway_core::config::SecurityConfig;
use tracing::{info, instrument, warn};

use super::password::{hash_password, verify_password};
use super::token::{generate_session_token, generate_verification_code};
use super::validation::{is_valid_email, normalize_email, sanitize_input};
use crate::clock::Clock;
use crate::error::{ServiceError, ServiceResult};
use crate::storage::{AuditEntry, Database, DbLock, User};

/// Lockout, lifetime and password rules.
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    pub session_lifetime: Duration,
    pub max_failed_attempts: i64,
    pub lockout: Duration,
    pub code_lifetime: Duration,
    pub min_password_length: usize,
}

impl AuthPolicy {
    pub fn from_config(security: &SecurityConfig) -> Self {
        Self {
            session_lifetime: Duration::hours(security.session_lifetime_hours),
            max_failed_attempts: security.max_failed_attempts,
            lockout: Duration::minutes(security.lockout_minutes),
            code_lifetime: Duration::minutes(security.verification_code_minutes),
            min_password_length: security.min_password_length,
        }
    }
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self::from_config(&SecurityConfig::default())
    }
}

/// A freshly issued verification code and where to send it.
#[derive(Debug, Clone)]
pub struct Registration {
    pub user_id: i64,
    pub email: String,
    pub code: String,
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    pub user: User,
}

#[derive(Clone)]
pub struct AuthManager {
    db: Database,
    clock: Arc<dyn Clock>,
    policy: AuthPolicy,
}

impl AuthManager {
    pub fn new(db: Database, clock: Arc<dyn Clock>, policy: AuthPolicy) -> Self {
        Self { db, clock, policy }
    }

    pub const fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    fn now(&self) -> i64 {
        self.clock.now().timestamp()
    }

    fn check_password_strength(&self, password: &str) -> ServiceResult<()> {
        if password.chars().count() < self.policy.min_password_length {
            return Err(ServiceError::WeakPassword(self.policy.min_password_length));
        }
        Ok(())
    }

    async fn issue_code(
        &self,
        db: &mut DbLock<'_>,
        user_id: i64,
        email: &str,
        now: i64,
    ) -> ServiceResult<Registration> {
        let code = generate_verification_code();
        let expires_at = now + self.policy.code_lifetime.num_seconds();
        db.create_verification_code(user_id, email, &code, now, expires_at)
            .await?;
        Ok(Registration {
            user_id,
            email: email.to_string(),
            code,
        })
    }

    /// Create an unverified account and its first verification code.
    #[instrument(skip(self, password), fields(op = "register"))]
    pub async fn register(
        &self,
        name: &str,
        surname: &str,
        email: &str,
        password: &str,
        ip: Option<&str>,
    ) -> ServiceResult<Registration> {
        let name = sanitize_input(name);
        let surname = sanitize_input(surname);
        let email = normalize_email(email);

        if name.is_empty() || surname.is_empty() {
            return Err(ServiceError::validation("All fields are required"));
        }
        if !is_valid_email(&email) {
            return Err(ServiceError::InvalidEmail);
        }
        self.check_password_strength(password)?;

        let stored = hash_password(password);
        let now = self.now();
        let mut db = self.db.lock().await;

        if db.find_user_by_email(&email).await?.is_some() {
            db.audit(
                &AuditEntry {
                    action: "register_failed",
                    ip_address: ip,
                    details: &email,
                    ..AuditEntry::default()
                },
                now,
            )
            .await;
            return Err(ServiceError::EmailTaken);
        }

        let user_id = match db
            .create_user(&name, &surname, &email, &stored.hash, &stored.salt, now)
            .await
        {
            Ok(id) => id,
            Err(e) if e.is_unique_violation() => return Err(ServiceError::EmailTaken),
            Err(e) => return Err(e.into()),
        };

        let registration = self.issue_code(&mut db, user_id, &email, now).await?;
        db.audit(
            &AuditEntry {
                user_id: Some(user_id),
                action: "register",
                ip_address: ip,
                details: &email,
                success: true,
            },
            now,
        )
        .await;

        info!(user_id, email = %email, "User registered");
        Ok(registration)
    }

    /// Authenticate and open a session.
    ///
    /// A wrong password increments the failure counter; reaching the
    /// threshold locks the account for the lockout window. A wrong password
    /// after the window, while the counter is still at or over the threshold,
    /// locks it again.
    #[instrument(skip(self, password), fields(op = "login"))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ip: Option<&str>,
    ) -> ServiceResult<LoginOutcome> {
        let email = normalize_email(email);
        let now = self.now();
        let mut db = self.db.lock().await;

        let Some(user) = db.find_user_by_email(&email).await? else {
            db.audit(
                &AuditEntry {
                    action: "login_failed",
                    ip_address: ip,
                    details: &email,
                    ..AuditEntry::default()
                },
                now,
            )
            .await;
            return Err(ServiceError::InvalidCredentials);
        };

        if !user.is_verified {
            db.audit(
                &AuditEntry {
                    user_id: Some(user.id),
                    action: "login_failed",
                    ip_address: ip,
                    details: "not verified",
                    success: false,
                },
                now,
            )
            .await;
            return Err(ServiceError::NotVerified);
        }

        if user.locked_until.is_some_and(|until| until > now) {
            db.audit(
                &AuditEntry {
                    user_id: Some(user.id),
                    action: "login_blocked",
                    ip_address: ip,
                    details: &email,
                    success: false,
                },
                now,
            )
            .await;
            warn!(user_id = user.id, "Login attempt on locked account");
            return Err(ServiceError::AccountLocked);
        }

        if !verify_password(password, &user.password_hash, &user.password_salt) {
            let attempts = db.increment_failed_attempts(user.id).await?;
            db.audit(
                &AuditEntry {
                    user_id: Some(user.id),
                    action: "login_failed",
                    ip_address: ip,
                    details: &email,
                    success: false,
                },
                now,
            )
            .await;

            if attempts >= self.policy.max_failed_attempts {
                db.lock_user_until(user.id, now + self.policy.lockout.num_seconds())
                    .await?;
                db.audit(
                    &AuditEntry {
                        user_id: Some(user.id),
                        action: "account_locked",
                        ip_address: ip,
                        details: &format!("{attempts} failed attempts"),
                        success: false,
                    },
                    now,
                )
                .await;
                warn!(user_id = user.id, attempts, "Account locked");
            }
            return Err(ServiceError::InvalidCredentials);
        }

        let token = generate_session_token();
        let expires_at = now + self.policy.session_lifetime.num_seconds();
        db.record_login(user.id, &token, ip, now, expires_at).await?;
        db.audit(
            &AuditEntry {
                user_id: Some(user.id),
                action: "login",
                ip_address: ip,
                details: "",
                success: true,
            },
            now,
        )
        .await;

        let user = db.get_user(user.id).await?;
        info!(user_id = user.id, "User logged in");
        Ok(LoginOutcome { token, user })
    }

    /// Close a session at the user's request.
    #[instrument(skip(self, token), fields(op = "logout"))]
    pub async fn logout(&self, token: &str, user_id: i64, ip: Option<&str>) -> ServiceResult<()> {
        let now = self.now();
        let mut db = self.db.lock().await;
        db.invalidate_session(token).await?;
        db.audit(
            &AuditEntry {
                user_id: Some(user_id),
                action: "logout",
                ip_address: ip,
                details: "",
                success: true,
            },
            now,
        )
        .await;
        info!(user_id, "User logged out");
        Ok(())
    }

    /// Close a session without an audit entry (replaced login, disconnect).
    pub async fn invalidate_session(&self, token: &str) -> ServiceResult<bool> {
        Ok(self.db.lock().await.invalidate_session(token).await?)
    }

    /// User id behind an active, unexpired session.
    pub async fn validate_session(&self, token: &str) -> ServiceResult<Option<i64>> {
        let now = self.now();
        let session = self.db.lock().await.get_session(token).await?;
        Ok(session
            .filter(|s| s.is_active && s.expires_at > now)
            .map(|s| s.user_id))
    }

    #[instrument(skip(self, code), fields(op = "verify_email"))]
    pub async fn verify_email(&self, email: &str, code: &str, ip: Option<&str>) -> ServiceResult<()> {
        let email = normalize_email(email);
        let code = code.trim();
        let now = self.now();
        let mut db = self.db.lock().await;

        let Some(record) = db.latest_verification_code(&email, code).await? else {
            db.audit(
                &AuditEntry {
                    action: "verification_failed",
                    ip_address: ip,
                    details: &email,
                    ..AuditEntry::default()
                },
                now,
            )
            .await;
            return Err(ServiceError::validation("Invalid verification code"));
        };

        if record.is_used {
            return Err(ServiceError::invalid_state("Verification code already used"));
        }
        if record.expires_at < now {
            return Err(ServiceError::invalid_state("Verification code expired"));
        }

        db.consume_verification_code(record.id, record.user_id)
            .await?;
        db.audit(
            &AuditEntry {
                user_id: Some(record.user_id),
                action: "email_verified",
                ip_address: ip,
                details: &email,
                success: true,
            },
            now,
        )
        .await;

        info!(user_id = record.user_id, "Email verified");
        Ok(())
    }

    /// Issue a fresh code for an unverified account.
    #[instrument(skip(self), fields(op = "resend_verification"))]
    pub async fn resend_verification(
        &self,
        email: &str,
        ip: Option<&str>,
    ) -> ServiceResult<Registration> {
        let email = normalize_email(email);
        let now = self.now();
        let mut db = self.db.lock().await;

        let user = db
            .find_user_by_email(&email)
            .await?
            .ok_or_else(|| ServiceError::validation("User not found"))?;
        if user.is_verified {
            return Err(ServiceError::invalid_state("Email already verified"));
        }

        let registration = self.issue_code(&mut db, user.id, &email, now).await?;
        db.audit(
            &AuditEntry {
                user_id: Some(user.id),
                action: "verification_resent",
                ip_address: ip,
                details: &email,
                success: true,
            },
            now,
        )
        .await;
        Ok(registration)
    }

    #[instrument(skip(self, old_password, new_password), fields(op = "change_password"))]
    pub async fn change_password(
        &self,
        user_id: i64,
        old_password: &str,
        new_password: &str,
        ip: Option<&str>,
    ) -> ServiceResult<()> {
        let now = self.now();
        let mut db = self.db.lock().await;
        let user = db.get_user(user_id).await?;

        if !verify_password(old_password, &user.password_hash, &user.password_salt) {
            db.audit(
                &AuditEntry {
                    user_id: Some(user_id),
                    action: "password_changed",
                    ip_address: ip,
                    details: "wrong current password",
                    success: false,
                },
                now,
            )
            .await;
            return Err(ServiceError::validation("Wrong current password"));
        }
        self.check_password_strength(new_password)?;

        let stored = hash_password(new_password);
        db.update_password(user_id, &stored.hash, &stored.salt)
            .await?;
        db.audit(
            &AuditEntry {
                user_id: Some(user_id),
                action: "password_changed",
                ip_address: ip,
                details: "",
                success: true,
            },
            now,
        )
        .await;

        info!(user_id, "Password changed");
        Ok(())
    }

    pub async fn get_profile(&self, user_id: i64) -> ServiceResult<User> {
        Ok(self.db.lock().await.get_user(user_id).await?)
    }

    /// Append a connection-level audit entry.
    pub async fn record_event(
        &self,
        action: &str,
        user_id: Option<i64>,
        ip: Option<&str>,
        details: &str,
    ) {
        let now = self.now();
        self.db
            .lock()
            .await
            .audit(
                &AuditEntry {
                    user_id,
                    action,
                    ip_address: ip,
                    details,
                    success: true,
                },
                now,
            )
            .await;
    }

    /// Delete sessions past expiry.
    pub async fn expire_sessions(&self) -> ServiceResult<u64> {
        let now = self.now();
        Ok(self.db.lock().await.delete_expired_sessions(now).await?)
    }

    /// Delete verification codes past expiry.
    pub async fn purge_codes(&self) -> ServiceResult<u64> {
        let now = self.now();
        Ok(self
            .db
            .lock()
            .await
            .delete_expired_verification_codes(now)
            .await?)
    }
}
