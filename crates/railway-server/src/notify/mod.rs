//! Outbound notifications: the mailer boundary and the messages sent
//! through it.
//!
//! Delivery is best-effort. Callers dispatch sends after the protocol
//! response is written and only log failures.

pub mod document;

use async_trait::async_trait;
use railway_core::config::MailConfig;
use tracing::info;

use crate::booking::TicketTrip;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// One message to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// File name and content.
    pub attachment: Option<(String, Vec<u8>)>,
}

/// Email transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

/// Mailer that writes every message to the structured log instead of a
/// network transport.
#[derive(Debug, Clone)]
pub struct LogMailer {
    sender: String,
}

impl LogMailer {
    pub fn new(config: &MailConfig) -> Self {
        Self {
            sender: format!("{} <{}>", config.sender_name, config.sender_address),
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        if !email.to.contains('@') {
            return Err(MailError::InvalidRecipient(email.to.clone()));
        }
        info!(
            from = %self.sender,
            to = %email.to,
            subject = %email.subject,
            body_len = email.body.len(),
            attachment = email.attachment.as_ref().map(|(name, _)| name.as_str()),
            "Email dispatched"
        );
        Ok(())
    }
}

/// Message carrying a verification code.
pub fn verification_email(to: &str, code: &str, valid_minutes: i64) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: "Railway account verification".to_string(),
        body: format!(
            "Your verification code is {code}.\n\
             It is valid for {valid_minutes} minutes.\n\
             If you did not register, ignore this message.\n"
        ),
        attachment: None,
    }
}

/// Message confirming payment, with the printable ticket attached when one
/// was rendered.
pub fn paid_ticket_email(to: &str, trip: &TicketTrip, document: Vec<u8>) -> OutgoingEmail {
    let ticket = &trip.ticket;
    let attachment = (!document.is_empty())
        .then(|| (format!("ticket_{}.txt", ticket.ticket_number), document));
    OutgoingEmail {
        to: to.to_string(),
        subject: format!("Your ticket {}", ticket.ticket_number),
        body: format!(
            "Payment received for ticket {}.\n\
             Train {}: {} -> {}\n\
             Departure: {}\n\
             Carriage {}, seat {}\n\
             Price: {:.2}\n",
            ticket.ticket_number,
            trip.train_number,
            trip.departure_station_name,
            trip.arrival_station_name,
            trip.departure.format("%Y-%m-%d %H:%M"),
            trip.carriage_number,
            trip.seat_number,
            ticket.price,
        ),
        attachment,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_mailer_rejects_bad_recipient() {
        let mailer = LogMailer::new(&MailConfig::default());
        let mut email = verification_email("alice@example.com", "123456", 15);
        assert!(mailer.send(&email).await.is_ok());

        email.to = "nobody".into();
        assert!(matches!(
            mailer.send(&email).await,
            Err(MailError::InvalidRecipient(_))
        ));
    }

    #[test]
    fn verification_email_carries_code() {
        let email = verification_email("alice@example.com", "654321", 15);
        assert!(email.body.contains("654321"));
        assert!(email.body.contains("15 minutes"));
        assert!(email.attachment.is_none());
    }
}
