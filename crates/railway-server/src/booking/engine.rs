//! Booking engine: train search, seat availability and the ticket lifecycle.
//!
//! `book` runs its occupancy check and its insert under one database lock
//! acquisition. The lock serializes every query in the process, so no other
//! connection can book the same seat between the check and the write.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use rand::RngExt;
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::occupancy::{self, Segment};
use super::timeline::{self, StopTimes};
use crate::auth::validation::sanitize_input;
use crate::clock::Clock;
use crate::error::{ServiceError, ServiceResult};
use crate::storage::{AuditEntry, Database, DbLock, NewTicket, Station, Ticket};

/// One train matching a search.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainOption {
    pub schedule_id: i64,
    pub route_id: i64,
    pub train_number: String,
    pub train_type: String,
    pub departure_station_id: i64,
    pub departure_station_name: String,
    pub arrival_station_id: i64,
    pub arrival_station_name: String,
    pub departure_time: NaiveDateTime,
    pub arrival_time: NaiveDateTime,
    pub travel_time_minutes: i64,
    pub min_price: f64,
    pub available_seats: usize,
}

/// A seat of the schedule's train with its availability for one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatAvailability {
    pub id: i64,
    pub carriage_id: i64,
    pub carriage_number: i64,
    pub carriage_type: String,
    pub seat_number: i64,
    pub seat_type: String,
    pub is_available: bool,
}

/// Parameters of a booking.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub schedule_id: i64,
    pub seat_id: i64,
    pub departure_station_id: i64,
    pub arrival_station_id: i64,
    pub passenger_name: String,
    pub passenger_document: String,
    pub price: f64,
}

/// Ticket with everything printed on it.
#[derive(Debug, Clone)]
pub struct TicketTrip {
    pub ticket: Ticket,
    pub train_number: String,
    pub train_type: String,
    pub departure_station_name: String,
    pub arrival_station_name: String,
    pub departure: NaiveDateTime,
    pub arrival: NaiveDateTime,
    pub carriage_number: i64,
    pub seat_number: i64,
}

/// `TK` + Unix milliseconds + six random digits.
pub fn generate_ticket_number(now: DateTime<Utc>) -> String {
    let suffix = rand::rng().random_range(0..1_000_000u32);
    format!("TK{}{suffix:06}", now.timestamp_millis())
}

#[derive(Clone)]
pub struct BookingEngine {
    db: Database,
    clock: Arc<dyn Clock>,
    hold: Duration,
}

impl BookingEngine {
    pub fn new(db: Database, clock: Arc<dyn Clock>, hold: Duration) -> Self {
        Self { db, clock, hold }
    }

    /// How long an unpaid booking holds its seat.
    pub const fn hold(&self) -> Duration {
        self.hold
    }

    /// All stations by name, or those whose name, city or code contains
    /// `search`.
    pub async fn stations(&self, search: Option<&str>) -> ServiceResult<Vec<Station>> {
        let mut db = self.db.lock().await;
        let stations = match search.map(str::trim).filter(|s| !s.is_empty()) {
            Some(text) => db.search_stations(text).await?,
            None => db.list_stations().await?,
        };
        Ok(stations)
    }

    /// Stop-order segment between two stations of a schedule's route.
    async fn resolve_segment(
        db: &mut DbLock<'_>,
        schedule_id: i64,
        departure_station_id: i64,
        arrival_station_id: i64,
    ) -> ServiceResult<Segment> {
        let start = db
            .stop_order_on_schedule(schedule_id, departure_station_id)
            .await?;
        let end = db
            .stop_order_on_schedule(schedule_id, arrival_station_id)
            .await?;
        start
            .zip(end)
            .and_then(|(s, e)| Segment::new(s, e))
            .ok_or_else(|| ServiceError::validation("Invalid route segment"))
    }

    async fn route_timeline(
        db: &mut DbLock<'_>,
        route_id: i64,
        date: NaiveDate,
    ) -> ServiceResult<Vec<StopTimes>> {
        let stops = db.get_route_stops(route_id).await?;
        timeline::build(date, &stops).ok_or_else(|| {
            warn!(route_id, "Route has unparsable stop times");
            ServiceError::invalid_state("Route timetable is malformed")
        })
    }

    /// Schedules on `date` visiting both stations in order, with live seat
    /// counts for the segment. An unmatched query yields an empty list.
    #[instrument(skip(self), fields(op = "search"))]
    pub async fn search(
        &self,
        departure_station_id: i64,
        arrival_station_id: i64,
        date: NaiveDate,
    ) -> ServiceResult<Vec<TrainOption>> {
        let iso = date.format("%Y-%m-%d").to_string();
        let mut db = self.db.lock().await;
        let rows = db
            .search_schedules(departure_station_id, arrival_station_id, &iso)
            .await?;

        let mut timelines: HashMap<i64, Vec<StopTimes>> = HashMap::new();
        let mut options = Vec::with_capacity(rows.len());

        for row in rows {
            let Some(segment) = Segment::new(row.dep_order, row.arr_order) else {
                continue;
            };

            if !timelines.contains_key(&row.route_id) {
                let built = Self::route_timeline(&mut db, row.route_id, date).await?;
                timelines.insert(row.route_id, built);
            }
            let Some(stops) = timelines.get(&row.route_id) else {
                continue;
            };
            let (Some(dep), Some(arr)) = (
                timeline::at_order(stops, row.dep_order),
                timeline::at_order(stops, row.arr_order),
            ) else {
                continue;
            };
            let departure_time = dep.departure;
            let arrival_time = arr.arrival_or_departure();

            let seats = db.schedule_seats(row.schedule_id).await?;
            let reserved = db.reserved_segments(row.schedule_id, None).await?;
            let busy = occupancy::occupied_seats(segment, &reserved);
            let available_seats = seats.iter().filter(|s| !busy.contains(&s.id)).count();

            options.push(TrainOption {
                schedule_id: row.schedule_id,
                route_id: row.route_id,
                train_number: row.train_number,
                train_type: row.train_type,
                departure_station_id: row.dep_station_id,
                departure_station_name: row.dep_station_name,
                arrival_station_id: row.arr_station_id,
                arrival_station_name: row.arr_station_name,
                departure_time,
                arrival_time,
                travel_time_minutes: (arrival_time - departure_time).num_minutes(),
                min_price: row.min_price,
                available_seats,
            });
        }

        Ok(options)
    }

    /// Every seat of the schedule's train, flagged free or taken for the
    /// segment.
    #[instrument(skip(self), fields(op = "available_seats"))]
    pub async fn available_seats(
        &self,
        schedule_id: i64,
        departure_station_id: i64,
        arrival_station_id: i64,
    ) -> ServiceResult<Vec<SeatAvailability>> {
        let mut db = self.db.lock().await;
        let segment =
            Self::resolve_segment(&mut db, schedule_id, departure_station_id, arrival_station_id)
                .await?;
        let seats = db.schedule_seats(schedule_id).await?;
        let reserved = db.reserved_segments(schedule_id, None).await?;
        let busy = occupancy::occupied_seats(segment, &reserved);

        Ok(seats
            .into_iter()
            .map(|s| SeatAvailability {
                is_available: !busy.contains(&s.id),
                id: s.id,
                carriage_id: s.carriage_id,
                carriage_number: s.carriage_number,
                carriage_type: s.carriage_type,
                seat_number: s.seat_number,
                seat_type: s.seat_type,
            })
            .collect())
    }

    /// Reserve a seat for a segment.
    ///
    /// Input is validated before the lock is taken; nothing is written unless
    /// the occupancy test passes.
    #[instrument(skip(self, request), fields(op = "book", schedule_id = request.schedule_id, seat_id = request.seat_id))]
    pub async fn book(
        &self,
        user_id: i64,
        request: &BookingRequest,
        ip: Option<&str>,
    ) -> ServiceResult<Ticket> {
        let passenger_name = sanitize_input(&request.passenger_name);
        let passenger_document = sanitize_input(&request.passenger_document);
        if !request.price.is_finite()
            || request.price <= 0.0
            || passenger_name.is_empty()
            || passenger_document.is_empty()
        {
            return Err(ServiceError::validation("Invalid booking parameters"));
        }

        let now = self.clock.now();
        let mut db = self.db.lock().await;

        let active = db
            .get_schedule(request.schedule_id)
            .await?
            .is_some_and(|s| s.status == "active");
        if !active {
            return Err(ServiceError::validation(
                "Schedule is not available for booking",
            ));
        }

        let segment = Self::resolve_segment(
            &mut db,
            request.schedule_id,
            request.departure_station_id,
            request.arrival_station_id,
        )
        .await?;

        if !db
            .seat_on_schedule(request.schedule_id, request.seat_id)
            .await?
        {
            return Err(ServiceError::validation("Seat does not belong to this train"));
        }

        let reserved = db
            .reserved_segments(request.schedule_id, Some(request.seat_id))
            .await?;
        if !occupancy::is_free(segment, &reserved) {
            return Err(ServiceError::SeatUnavailable);
        }

        let ticket_number = generate_ticket_number(now);
        let ticket = db
            .insert_ticket(&NewTicket {
                user_id,
                schedule_id: request.schedule_id,
                seat_id: request.seat_id,
                departure_station_id: request.departure_station_id,
                arrival_station_id: request.arrival_station_id,
                ticket_number: &ticket_number,
                price: request.price,
                passenger_name: &passenger_name,
                passenger_document: &passenger_document,
                booked_at: now.timestamp(),
            })
            .await?;

        db.audit(
            &AuditEntry {
                user_id: Some(user_id),
                action: "ticket_booked",
                ip_address: ip,
                details: &ticket_number,
                success: true,
            },
            now.timestamp(),
        )
        .await;

        info!(user_id, ticket_number = %ticket_number, "Ticket booked");
        Ok(ticket)
    }

    /// Load a ticket and check it belongs to `user_id`.
    async fn owned_ticket(
        db: &mut DbLock<'_>,
        user_id: i64,
        ticket_number: &str,
    ) -> ServiceResult<Ticket> {
        let ticket = db
            .get_ticket(ticket_number)
            .await?
            .ok_or(ServiceError::TicketNotFound)?;
        if ticket.user_id != user_id {
            warn!(user_id, ticket_number, "Ticket access denied");
            return Err(ServiceError::AccessDenied);
        }
        Ok(ticket)
    }

    /// `booked -> paid`.
    #[instrument(skip(self), fields(op = "pay"))]
    pub async fn pay(
        &self,
        user_id: i64,
        ticket_number: &str,
        ip: Option<&str>,
    ) -> ServiceResult<Ticket> {
        let now = self.clock.now().timestamp();
        let mut db = self.db.lock().await;
        let ticket = Self::owned_ticket(&mut db, user_id, ticket_number).await?;

        if ticket.status != "booked" || !db.mark_ticket_paid(ticket_number, now).await? {
            return Err(ServiceError::invalid_state(format!(
                "Ticket cannot be paid (status: {})",
                ticket.status
            )));
        }

        db.audit(
            &AuditEntry {
                user_id: Some(user_id),
                action: "ticket_paid",
                ip_address: ip,
                details: ticket_number,
                success: true,
            },
            now,
        )
        .await;

        info!(user_id, ticket_number, "Ticket paid");
        Self::owned_ticket(&mut db, user_id, ticket_number).await
    }

    /// `booked | paid -> cancelled`.
    #[instrument(skip(self), fields(op = "cancel"))]
    pub async fn cancel(
        &self,
        user_id: i64,
        ticket_number: &str,
        reason: &str,
        ip: Option<&str>,
    ) -> ServiceResult<Ticket> {
        let now = self.clock.now().timestamp();
        let mut db = self.db.lock().await;
        let ticket = Self::owned_ticket(&mut db, user_id, ticket_number).await?;

        let cancellable = matches!(ticket.status.as_str(), "booked" | "paid");
        if !cancellable || !db.mark_ticket_cancelled(ticket_number, now).await? {
            return Err(ServiceError::invalid_state(format!(
                "Ticket cannot be cancelled (status: {})",
                ticket.status
            )));
        }

        db.audit(
            &AuditEntry {
                user_id: Some(user_id),
                action: "ticket_cancelled",
                ip_address: ip,
                details: &format!("{ticket_number}: {reason}"),
                success: true,
            },
            now,
        )
        .await;

        info!(user_id, ticket_number, reason, "Ticket cancelled");
        Self::owned_ticket(&mut db, user_id, ticket_number).await
    }

    /// The user's tickets, newest first.
    pub async fn my_tickets(&self, user_id: i64) -> ServiceResult<Vec<Ticket>> {
        Ok(self.db.lock().await.user_tickets(user_id).await?)
    }

    /// One ticket, visible to its owner only.
    pub async fn ticket_details(&self, user_id: i64, ticket_number: &str) -> ServiceResult<Ticket> {
        let mut db = self.db.lock().await;
        Self::owned_ticket(&mut db, user_id, ticket_number).await
    }

    /// Ticket joined with train, stations, dated timing, carriage and seat.
    pub async fn trip(&self, ticket_number: &str) -> ServiceResult<TicketTrip> {
        let mut db = self.db.lock().await;
        let row = db
            .ticket_trip(ticket_number)
            .await?
            .ok_or(ServiceError::TicketNotFound)?;

        let schedule = db
            .get_schedule(row.ticket.schedule_id)
            .await?
            .ok_or(ServiceError::TicketNotFound)?;
        let date = NaiveDate::parse_from_str(&row.departure_date, "%Y-%m-%d")
            .map_err(|_| ServiceError::invalid_state("Schedule date is malformed"))?;
        let stops = Self::route_timeline(&mut db, schedule.route_id, date).await?;

        let find = |station_id: i64| stops.iter().find(|s| s.station_id == station_id);
        let (Some(dep), Some(arr)) = (
            find(row.ticket.departure_station_id),
            find(row.ticket.arrival_station_id),
        ) else {
            return Err(ServiceError::invalid_state("Ticket stations are not on the route"));
        };
        let departure = dep.departure;
        let arrival = arr.arrival_or_departure();

        Ok(TicketTrip {
            ticket: row.ticket,
            train_number: row.train_number,
            train_type: row.train_type,
            departure_station_name: row.departure_station_name,
            arrival_station_name: row.arrival_station_name,
            departure,
            arrival,
            carriage_number: row.carriage_number,
            seat_number: row.seat_number,
        })
    }

    /// Expire every `booked` ticket older than the hold window.
    pub async fn expire_stale_bookings(&self) -> ServiceResult<u64> {
        let now = self.clock.now();
        let cutoff = (now - self.hold).timestamp();
        Ok(self
            .db
            .lock()
            .await
            .expire_bookings(cutoff, now.timestamp())
            .await?)
    }
}
