//! Command table and per-command handling.
//!
//! [`dispatch`] maps one parsed request to exactly one response. Work that
//! must happen after the response is written (email, ticket rendering) is
//! returned as a [`FollowUp`] for the connection handler to spawn.

use std::net::SocketAddr;

use chrono::{DateTime, NaiveDate, SecondsFormat};
use railway_core::protocol::{ERROR_COMMAND, Request, Response, parse_frame};
use serde_json::{Map, Value, json};
use tracing::{error, info, instrument, warn};

use super::Services;
use crate::booking::BookingRequest;
use crate::error::{ServiceError, ServiceResult};
use crate::notify::document::render_ticket;
use crate::notify::{paid_ticket_email, verification_email};
use crate::storage::{Station, Ticket, User};

/// Protocol commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Register,
    Login,
    VerifyEmail,
    ResendVerification,
    Logout,
    GetStations,
    SearchTrains,
    GetAvailableSeats,
    BookTicket,
    PayTicket,
    CancelTicket,
    GetMyTickets,
    GetTicketDetails,
    GetProfile,
    ChangePassword,
}

impl Command {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "REGISTER" => Self::Register,
            "LOGIN" => Self::Login,
            "VERIFY_EMAIL" => Self::VerifyEmail,
            "RESEND_VERIFICATION" => Self::ResendVerification,
            "LOGOUT" => Self::Logout,
            "GET_STATIONS" => Self::GetStations,
            "SEARCH_TRAINS" => Self::SearchTrains,
            "GET_AVAILABLE_SEATS" => Self::GetAvailableSeats,
            "BOOK_TICKET" => Self::BookTicket,
            "PAY_TICKET" => Self::PayTicket,
            "CANCEL_TICKET" => Self::CancelTicket,
            "GET_MY_TICKETS" => Self::GetMyTickets,
            "GET_TICKET_DETAILS" => Self::GetTicketDetails,
            "GET_PROFILE" => Self::GetProfile,
            "CHANGE_PASSWORD" => Self::ChangePassword,
            _ => return None,
        })
    }

    /// Whether the command needs an active session.
    pub const fn requires_session(self) -> bool {
        !matches!(
            self,
            Self::Register | Self::Login | Self::VerifyEmail | Self::ResendVerification
        )
    }
}

/// Session held by one connection.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub token: String,
    pub user_id: i64,
    pub email: String,
}

/// Per-connection protocol state. Owned by its handler.
#[derive(Debug)]
pub struct ConnectionState {
    pub peer: SocketAddr,
    pub session: Option<ActiveSession>,
}

impl ConnectionState {
    pub const fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            session: None,
        }
    }

    pub fn user_id(&self) -> Option<i64> {
        self.session.as_ref().map(|s| s.user_id)
    }

    fn ip(&self) -> String {
        self.peer.ip().to_string()
    }
}

/// Side effect to run after the response is on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    VerificationEmail { email: String, code: String },
    PaidTicket { ticket_number: String, email: String },
}

/// Response plus any deferred work.
#[derive(Debug)]
pub struct Outcome {
    pub response: Response,
    pub follow_up: Option<FollowUp>,
}

#[derive(Debug, Default)]
struct Reply {
    message: Option<String>,
    data: Option<Value>,
    follow_up: Option<FollowUp>,
}

impl Reply {
    fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    fn message(message: &str) -> Self {
        Self {
            message: Some(message.to_string()),
            ..Self::default()
        }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    fn with_follow_up(mut self, follow_up: FollowUp) -> Self {
        self.follow_up = Some(follow_up);
        self
    }
}

/// Parse and handle one protocol line.
///
/// A line that is not valid UTF-8 or not a request object is answered with
/// an `ERROR` response; the connection stays open.
pub async fn handle_line(services: &Services, conn: &mut ConnectionState, line: &[u8]) -> Outcome {
    match parse_frame(line) {
        Ok(request) => dispatch(services, conn, &request).await,
        Err(e) => {
            let err = ServiceError::Protocol(e.to_string());
            warn!(peer = %conn.peer, kind = err.kind(), error = %err, "Malformed request");
            Outcome {
                response: Response::error(ERROR_COMMAND, err.to_string()),
                follow_up: None,
            }
        }
    }
}

/// Handle one parsed request.
#[instrument(skip_all, fields(command = %request.command, peer = %conn.peer))]
pub async fn dispatch(services: &Services, conn: &mut ConnectionState, request: &Request) -> Outcome {
    let name = request.command.as_str();
    let Some(command) = Command::parse(name) else {
        warn!("Unknown command");
        return Outcome {
            response: Response::error(name, format!("Unknown command: {name}")),
            follow_up: None,
        };
    };

    let result = match authorize(services, conn, command).await {
        Ok(user_id) => run(services, conn, command, user_id, &request.data).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(reply) => Outcome {
            response: Response::ok(name, reply.message, reply.data),
            follow_up: reply.follow_up,
        },
        Err(e) => {
            if let ServiceError::Storage(cause) = &e {
                error!(error = %cause, "Storage failure");
            } else {
                info!(kind = e.kind(), reason = %e, "Request refused");
            }
            Outcome {
                response: Response::error(name, e.to_string()),
                follow_up: None,
            }
        }
    }
}

/// Check the connection's session for gated commands.
///
/// Returns the session's user id (0 for open commands). A session that has
/// expired or been invalidated is dropped from the connection.
async fn authorize(
    services: &Services,
    conn: &mut ConnectionState,
    command: Command,
) -> ServiceResult<i64> {
    if !command.requires_session() {
        return Ok(0);
    }
    let Some(session) = conn.session.as_ref() else {
        return Err(ServiceError::AuthRequired);
    };
    match services.auth.validate_session(&session.token).await? {
        Some(user_id) => Ok(user_id),
        None => {
            info!(user_id = session.user_id, "Session no longer valid");
            conn.session = None;
            Err(ServiceError::AuthRequired)
        }
    }
}

#[allow(clippy::too_many_lines)]
async fn run(
    services: &Services,
    conn: &mut ConnectionState,
    command: Command,
    user_id: i64,
    data: &Map<String, Value>,
) -> ServiceResult<Reply> {
    let ip = conn.ip();
    let ip = Some(ip.as_str());

    match command {
        Command::Register => {
            let (Some(name), Some(surname), Some(email), Some(password)) = (
                str_field(data, "name"),
                str_field(data, "surname"),
                str_field(data, "email"),
                str_field(data, "password"),
            ) else {
                return Err(ServiceError::validation("All fields are required"));
            };
            let reg = services
                .auth
                .register(name, surname, email, password, ip)
                .await?;
            Ok(Reply::data(json!({
                "userId": reg.user_id,
                "email": reg.email,
                "requiresVerification": true,
            }))
            .with_message("Registration successful. Please check your email for verification code.")
            .with_follow_up(FollowUp::VerificationEmail {
                email: reg.email,
                code: reg.code,
            }))
        }

        Command::Login => {
            let (Some(email), Some(password)) =
                (str_field(data, "email"), str_field(data, "password"))
            else {
                return Err(ServiceError::validation("Email and password are required"));
            };
            if let Some(previous) = conn.session.take() {
                services.auth.invalidate_session(&previous.token).await?;
            }
            let outcome = services.auth.login(email, password, ip).await?;
            let user = user_json(&outcome.user);
            conn.session = Some(ActiveSession {
                token: outcome.token.clone(),
                user_id: outcome.user.id,
                email: outcome.user.email,
            });
            Ok(Reply::data(json!({
                "sessionToken": outcome.token,
                "user": user,
            }))
            .with_message("Login successful"))
        }

        Command::VerifyEmail => {
            let (Some(email), Some(code)) = (str_field(data, "email"), str_field(data, "code"))
            else {
                return Err(ServiceError::validation("Email and code are required"));
            };
            services.auth.verify_email(email, code, ip).await?;
            Ok(Reply::data(json!({
                "email": email.trim().to_lowercase(),
                "verified": true,
            }))
            .with_message("Email verified successfully"))
        }

        Command::ResendVerification => {
            let Some(email) = str_field(data, "email") else {
                return Err(ServiceError::validation("Email is required"));
            };
            let reg = services.auth.resend_verification(email, ip).await?;
            Ok(
                Reply::message("Verification code has been sent to your email").with_follow_up(
                    FollowUp::VerificationEmail {
                        email: reg.email,
                        code: reg.code,
                    },
                ),
            )
        }

        Command::Logout => {
            if let Some(session) = conn.session.take() {
                services.auth.logout(&session.token, user_id, ip).await?;
            }
            Ok(Reply::message("Logout successful"))
        }

        Command::GetStations => {
            let stations = services.booking.stations(str_field(data, "search")).await?;
            let list: Vec<Value> = stations.iter().map(station_json).collect();
            Ok(Reply::data(json!({ "count": list.len(), "stations": list })))
        }

        Command::SearchTrains => {
            let (Some(from), Some(to), Some(date)) = (
                id_field(data, "departureStationId"),
                id_field(data, "arrivalStationId"),
                str_field(data, "date"),
            ) else {
                return Err(ServiceError::validation("Invalid search parameters"));
            };
            let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|_| {
                ServiceError::validation("Invalid date format (use YYYY-MM-DD)")
            })?;
            let trains = services.booking.search(from, to, date).await?;
            Ok(Reply::data(json!({ "count": trains.len(), "trains": trains })))
        }

        Command::GetAvailableSeats => {
            let (Some(schedule_id), Some(from), Some(to)) = (
                id_field(data, "scheduleId"),
                id_field(data, "departureStationId"),
                id_field(data, "arrivalStationId"),
            ) else {
                return Err(ServiceError::validation("Invalid parameters"));
            };
            let seats = services
                .booking
                .available_seats(schedule_id, from, to)
                .await?;
            Ok(Reply::data(json!({ "count": seats.len(), "seats": seats })))
        }

        Command::BookTicket => {
            let request = booking_request(data)
                .ok_or_else(|| ServiceError::validation("Invalid booking parameters"))?;
            let ticket = services.booking.book(user_id, &request, ip).await?;
            let hold = services.booking.hold().num_minutes();
            Ok(Reply::data(json!({
                "ticketNumber": ticket.ticket_number,
                "status": ticket.status,
                "ticket": ticket_json(&ticket),
            }))
            .with_message(format!(
                "Ticket booked. Please pay within {hold} minutes."
            )))
        }

        Command::PayTicket => {
            let number = ticket_number(data)?;
            let ticket = services.booking.pay(user_id, number, ip).await?;
            let email = conn
                .session
                .as_ref()
                .map(|s| s.email.clone())
                .unwrap_or_default();
            Ok(Reply::data(json!({
                "ticketNumber": ticket.ticket_number,
                "status": ticket.status,
            }))
            .with_message("Payment successful")
            .with_follow_up(FollowUp::PaidTicket {
                ticket_number: ticket.ticket_number,
                email,
            }))
        }

        Command::CancelTicket => {
            let number = ticket_number(data)?;
            let reason = str_field(data, "reason").unwrap_or("User cancellation");
            let ticket = services
                .booking
                .cancel(user_id, number, reason, ip)
                .await?;
            Ok(Reply::data(json!({
                "ticketNumber": ticket.ticket_number,
                "status": ticket.status,
            }))
            .with_message("Ticket cancelled"))
        }

        Command::GetMyTickets => {
            let tickets = services.booking.my_tickets(user_id).await?;
            let list: Vec<Value> = tickets.iter().map(ticket_json).collect();
            Ok(Reply::data(json!({ "count": list.len(), "tickets": list })))
        }

        Command::GetTicketDetails => {
            let number = ticket_number(data)?;
            let ticket = services.booking.ticket_details(user_id, number).await?;
            Ok(Reply::data(json!({ "ticket": ticket_json(&ticket) })))
        }

        Command::GetProfile => {
            let user = services.auth.get_profile(user_id).await?;
            Ok(Reply::data(json!({ "user": user_json(&user) })))
        }

        Command::ChangePassword => {
            let (Some(old), Some(new)) =
                (str_field(data, "oldPassword"), str_field(data, "newPassword"))
            else {
                return Err(ServiceError::validation(
                    "Both old and new password are required",
                ));
            };
            services
                .auth
                .change_password(user_id, old, new, ip)
                .await?;
            Ok(Reply::message("Password changed successfully"))
        }
    }
}

/// Run a deferred side effect. Failures are logged only.
pub async fn run_follow_up(services: &Services, follow_up: FollowUp) {
    let email = match follow_up {
        FollowUp::VerificationEmail { email, code } => {
            let minutes = services.auth.policy().code_lifetime.num_minutes();
            verification_email(&email, &code, minutes)
        }
        FollowUp::PaidTicket {
            ticket_number,
            email,
        } => match services.booking.trip(&ticket_number).await {
            Ok(trip) => {
                let document = render_ticket(&trip);
                if document.is_empty() {
                    warn!(ticket_number = %ticket_number, "Ticket document rendering failed");
                }
                paid_ticket_email(&email, &trip, document)
            }
            Err(e) => {
                warn!(ticket_number = %ticket_number, error = %e, "Cannot load trip for paid ticket");
                return;
            }
        },
    };

    match services.mailer.send(&email).await {
        Ok(()) => info!(to = %email.to, subject = %email.subject, "Notification sent"),
        Err(e) => warn!(to = %email.to, error = %e, "Notification failed"),
    }
}

// =========================================================================
// Field extraction
// =========================================================================

/// Non-blank string field.
fn str_field<'a>(data: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Positive integer field.
fn id_field(data: &Map<String, Value>, key: &str) -> Option<i64> {
    data.get(key).and_then(Value::as_i64).filter(|id| *id > 0)
}

fn ticket_number(data: &Map<String, Value>) -> ServiceResult<&str> {
    str_field(data, "ticketNumber")
        .map(str::trim)
        .ok_or_else(|| ServiceError::validation("Ticket number is required"))
}

fn booking_request(data: &Map<String, Value>) -> Option<BookingRequest> {
    Some(BookingRequest {
        schedule_id: id_field(data, "scheduleId")?,
        seat_id: id_field(data, "seatId")?,
        departure_station_id: id_field(data, "departureStationId")?,
        arrival_station_id: id_field(data, "arrivalStationId")?,
        passenger_name: str_field(data, "passengerName")?.to_string(),
        passenger_document: str_field(data, "passengerDocument")?.to_string(),
        price: data.get("price").and_then(Value::as_f64)?,
    })
}

// =========================================================================
// JSON views
// =========================================================================

fn iso(ts: i64) -> Value {
    DateTime::from_timestamp(ts, 0).map_or(Value::Null, |t| {
        Value::String(t.to_rfc3339_opts(SecondsFormat::Secs, true))
    })
}

fn user_json(user: &User) -> Value {
    let mut obj = json!({
        "id": user.id,
        "name": user.name,
        "surname": user.surname,
        "email": user.email,
        "createdAt": iso(user.created_at),
        "isVerified": user.is_verified,
    });
    if let Some(ts) = user.last_login {
        obj["lastLogin"] = iso(ts);
    }
    obj
}

fn station_json(station: &Station) -> Value {
    json!({
        "id": station.id,
        "name": station.name,
        "city": station.city,
        "code": station.code,
        "latitude": station.latitude,
        "longitude": station.longitude,
    })
}

fn ticket_json(ticket: &Ticket) -> Value {
    let mut obj = json!({
        "id": ticket.id,
        "ticketNumber": ticket.ticket_number,
        "scheduleId": ticket.schedule_id,
        "seatId": ticket.seat_id,
        "departureStationId": ticket.departure_station_id,
        "arrivalStationId": ticket.arrival_station_id,
        "price": ticket.price,
        "status": ticket.status,
        "passengerName": ticket.passenger_name,
        "passengerDocument": ticket.passenger_document,
        "bookedAt": iso(ticket.booked_at),
    });
    if let Some(ts) = ticket.paid_at {
        obj["paidAt"] = iso(ts);
    }
    if let Some(ts) = ticket.cancelled_at {
        obj["cancelledAt"] = iso(ts);
    }
    obj
}
