//! Row types for railway storage.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password_hash: String,
    pub password_salt: String,
    pub created_at: i64,
    pub is_verified: bool,
    pub last_login: Option<i64>,
    pub failed_login_attempts: i64,
    pub locked_until: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub session_token: String,
    pub ip_address: Option<String>,
    pub created_at: i64,
    pub expires_at: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VerificationCode {
    pub id: i64,
    pub user_id: i64,
    pub email: String,
    pub code: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub is_used: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: i64,
    pub user_id: Option<i64>,
    pub action: String,
    pub ip_address: Option<String>,
    pub timestamp: i64,
    pub details: Option<String>,
    pub success: bool,
}

/// One audit entry to append.
#[derive(Debug, Clone, Default)]
pub struct AuditEntry<'a> {
    pub user_id: Option<i64>,
    pub action: &'a str,
    pub ip_address: Option<&'a str>,
    pub details: &'a str,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Station {
    pub id: i64,
    pub name: String,
    pub city: String,
    pub code: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Train {
    pub id: i64,
    pub train_number: String,
    pub train_type: String,
    pub total_seats: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RouteStop {
    pub id: i64,
    pub route_id: i64,
    pub station_id: i64,
    pub stop_order: i64,
    pub arrival_time: Option<String>,
    pub departure_time: String,
    pub stop_duration_minutes: i64,
    pub price_from_start: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Schedule {
    pub id: i64,
    pub route_id: i64,
    pub departure_date: String,
    pub status: String,
}

/// A seat of a schedule's train with its carriage.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SeatRow {
    pub id: i64,
    pub carriage_id: i64,
    pub carriage_number: i64,
    pub carriage_type: String,
    pub seat_number: i64,
    pub seat_type: String,
}

/// Stop positions of an existing live reservation.
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub struct ReservedSegment {
    pub seat_id: i64,
    pub start_order: i64,
    pub end_order: i64,
}

/// Raw row of a train search before timing is derived.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SearchRow {
    pub schedule_id: i64,
    pub route_id: i64,
    pub train_number: String,
    pub train_type: String,
    pub departure_date: String,
    pub dep_station_id: i64,
    pub dep_station_name: String,
    pub dep_order: i64,
    pub arr_station_id: i64,
    pub arr_station_name: String,
    pub arr_order: i64,
    pub dep_time: String,
    pub arr_time: Option<String>,
    pub min_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Ticket {
    pub id: i64,
    pub user_id: i64,
    pub schedule_id: i64,
    pub seat_id: i64,
    pub departure_station_id: i64,
    pub arrival_station_id: i64,
    pub ticket_number: String,
    pub price: f64,
    pub status: String,
    pub booked_at: i64,
    pub paid_at: Option<i64>,
    pub cancelled_at: Option<i64>,
    pub passenger_name: String,
    pub passenger_document: String,
}

/// Values for a new ticket row.
#[derive(Debug, Clone)]
pub struct NewTicket<'a> {
    pub user_id: i64,
    pub schedule_id: i64,
    pub seat_id: i64,
    pub departure_station_id: i64,
    pub arrival_station_id: i64,
    pub ticket_number: &'a str,
    pub price: f64,
    pub passenger_name: &'a str,
    pub passenger_document: &'a str,
    pub booked_at: i64,
}

/// Ticket joined with the trip facts printed on it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TicketTripRow {
    #[sqlx(flatten)]
    pub ticket: Ticket,
    pub train_number: String,
    pub train_type: String,
    pub departure_station_name: String,
    pub arrival_station_name: String,
    pub departure_date: String,
    pub departure_time: String,
    pub arrival_time: Option<String>,
    pub carriage_number: i64,
    pub seat_number: i64,
}
