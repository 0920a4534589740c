//! Account queries: users, sessions, verification codes, audit log.

use sqlx::Connection;
use tracing::warn;

use super::db::{DatabaseError, DbLock};
use super::models::{AuditEntry, AuditLog, Session, User, VerificationCode};

impl DbLock<'_> {
    // =========================================================================
    // User queries
    // =========================================================================

    /// Insert an unverified user and return its id.
    pub async fn create_user(
        &mut self,
        name: &str,
        surname: &str,
        email: &str,
        password_hash: &str,
        password_salt: &str,
        now: i64,
    ) -> Result<i64, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO users (name, surname, email, password_hash, password_salt, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(surname)
        .bind(email)
        .bind(password_hash)
        .bind(password_salt)
        .bind(now)
        .execute(self.conn())
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_user(&mut self, id: i64) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.conn())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User {id}")))
    }

    /// Look up a user by normalized email.
    pub async fn find_user_by_email(&mut self, email: &str) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(self.conn())
            .await?;
        Ok(user)
    }

    /// Count a failed login and return the new counter value.
    pub async fn increment_failed_attempts(&mut self, user_id: i64) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            "UPDATE users SET failed_login_attempts = failed_login_attempts + 1 WHERE id = ? RETURNING failed_login_attempts",
        )
        .bind(user_id)
        .fetch_one(self.conn())
        .await?;
        Ok(row.0)
    }

    pub async fn lock_user_until(&mut self, user_id: i64, until: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE users SET locked_until = ? WHERE id = ?")
            .bind(until)
            .bind(user_id)
            .execute(self.conn())
            .await?;
        Ok(())
    }

    pub async fn update_password(
        &mut self,
        user_id: i64,
        password_hash: &str,
        password_salt: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE users SET password_hash = ?, password_salt = ? WHERE id = ?")
            .bind(password_hash)
            .bind(password_salt)
            .bind(user_id)
            .execute(self.conn())
            .await?;
        Ok(())
    }

    /// Successful login: reset lockout state, stamp last login, open a session.
    ///
    /// Runs in one transaction so a failure leaves neither write behind.
    pub async fn record_login(
        &mut self,
        user_id: i64,
        token: &str,
        ip_address: Option<&str>,
        now: i64,
        expires_at: i64,
    ) -> Result<(), DatabaseError> {
        let mut tx = self.conn().begin().await?;

        sqlx::query(
            "UPDATE users SET failed_login_attempts = 0, locked_until = NULL, last_login = ? WHERE id = ?",
        )
        .bind(now)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO sessions (user_id, session_token, ip_address, created_at, expires_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(token)
        .bind(ip_address)
        .bind(now)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    // =========================================================================
    // Session queries
    // =========================================================================

    pub async fn get_session(&mut self, token: &str) -> Result<Option<Session>, DatabaseError> {
        let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE session_token = ?")
            .bind(token)
            .fetch_optional(self.conn())
            .await?;
        Ok(session)
    }

    /// Mark a session inactive. Returns whether an active session was closed.
    pub async fn invalidate_session(&mut self, token: &str) -> Result<bool, DatabaseError> {
        let result =
            sqlx::query("UPDATE sessions SET is_active = 0 WHERE session_token = ? AND is_active = 1")
                .bind(token)
                .execute(self.conn())
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete sessions past expiry. Returns the number removed.
    pub async fn delete_expired_sessions(&mut self, now: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
            .bind(now)
            .execute(self.conn())
            .await?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    // Verification code queries
    // =========================================================================

    pub async fn create_verification_code(
        &mut self,
        user_id: i64,
        email: &str,
        code: &str,
        now: i64,
        expires_at: i64,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO verification_codes (user_id, email, code, created_at, expires_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(email)
        .bind(code)
        .bind(now)
        .bind(expires_at)
        .execute(self.conn())
        .await?;
        Ok(())
    }

    /// Most recent code issued for this email+code pair.
    pub async fn latest_verification_code(
        &mut self,
        email: &str,
        code: &str,
    ) -> Result<Option<VerificationCode>, DatabaseError> {
        let row = sqlx::query_as::<_, VerificationCode>(
            "SELECT * FROM verification_codes WHERE email = ? AND code = ? ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(email)
        .bind(code)
        .fetch_optional(self.conn())
        .await?;
        Ok(row)
    }

    /// Consume a code and verify its user in one transaction.
    pub async fn consume_verification_code(
        &mut self,
        code_id: i64,
        user_id: i64,
    ) -> Result<(), DatabaseError> {
        let mut tx = self.conn().begin().await?;

        let result =
            sqlx::query("UPDATE verification_codes SET is_used = 1 WHERE id = ? AND is_used = 0")
                .bind(code_id)
                .execute(&mut *tx)
                .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Unused verification code {code_id}"
            )));
        }

        sqlx::query("UPDATE users SET is_verified = 1 WHERE id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Delete codes past expiry. Returns the number removed.
    pub async fn delete_expired_verification_codes(
        &mut self,
        now: i64,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM verification_codes WHERE expires_at < ?")
            .bind(now)
            .execute(self.conn())
            .await?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    // Audit log
    // =========================================================================

    /// Append an audit entry.
    pub async fn log_action(&mut self, entry: &AuditEntry<'_>, now: i64) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO audit_logs (user_id, action, ip_address, timestamp, details, success) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.user_id)
        .bind(entry.action)
        .bind(entry.ip_address)
        .bind(now)
        .bind(entry.details)
        .bind(entry.success)
        .execute(self.conn())
        .await?;
        Ok(())
    }

    /// Append an audit entry, logging instead of failing when the write fails.
    pub async fn audit(&mut self, entry: &AuditEntry<'_>, now: i64) {
        if let Err(e) = self.log_action(entry, now).await {
            warn!(action = entry.action, error = %e, "Failed to write audit entry");
        }
    }

    /// Recent audit entries, newest first; all users when `user_id` is `None`.
    pub async fn audit_logs(
        &mut self,
        user_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<AuditLog>, DatabaseError> {
        let logs = sqlx::query_as::<_, AuditLog>(
            "SELECT * FROM audit_logs WHERE (?1 IS NULL OR user_id = ?1) ORDER BY id DESC LIMIT ?2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.conn())
        .await?;
        Ok(logs)
    }
}
