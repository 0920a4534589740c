//! Service-level failures surfaced to protocol clients.
//!
//! Every variant becomes a `success: false` response carrying the variant's
//! display text. Only `Storage` hides its detail; the cause is logged where
//! the response is built.

use railway_core::db::DatabaseError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Bad or missing input. Raised before any write.
    #[error("{0}")]
    Validation(String),

    #[error("Authentication required")]
    AuthRequired,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is temporarily locked due to multiple failed login attempts")]
    AccountLocked,

    #[error("Please verify your email first")]
    NotVerified,

    #[error("Invalid email format")]
    InvalidEmail,

    #[error("Password must be at least {0} characters")]
    WeakPassword(usize),

    #[error("User with this email already exists")]
    EmailTaken,

    #[error("Seat is already occupied for this segment")]
    SeatUnavailable,

    #[error("Ticket not found")]
    TicketNotFound,

    #[error("Access denied")]
    AccessDenied,

    /// A ticket or code is not in a state that permits the transition.
    #[error("{0}")]
    InvalidState(String),

    #[error("Internal server error")]
    Storage(#[from] DatabaseError),

    #[error("{0}")]
    Protocol(String),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Short machine-friendly name, used as a tracing field.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::AuthRequired => "auth_required",
            Self::InvalidCredentials => "invalid_credentials",
            Self::AccountLocked => "account_locked",
            Self::NotVerified => "not_verified",
            Self::InvalidEmail => "invalid_email",
            Self::WeakPassword(_) => "weak_password",
            Self::EmailTaken => "email_taken",
            Self::SeatUnavailable => "seat_unavailable",
            Self::TicketNotFound => "ticket_not_found",
            Self::AccessDenied => "access_denied",
            Self::InvalidState(_) => "invalid_state",
            Self::Storage(_) => "storage",
            Self::Protocol(_) => "protocol",
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
