//! Booking queries: search, seat occupancy inputs, ticket lifecycle.

use super::db::{DatabaseError, DbLock};
use super::models::{NewTicket, ReservedSegment, SearchRow, SeatRow, Ticket, TicketTripRow};

impl DbLock<'_> {
    // =========================================================================
    // Search and occupancy
    // =========================================================================

    /// Schedules on `date` whose route visits `dep` before `arr`.
    ///
    /// Only active schedules of active trains on routes valid for the date.
    pub async fn search_schedules(
        &mut self,
        dep_station_id: i64,
        arr_station_id: i64,
        date: &str,
    ) -> Result<Vec<SearchRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, SearchRow>(
            r"
            SELECT
                s.id AS schedule_id,
                r.id AS route_id,
                t.train_number,
                t.train_type,
                s.departure_date,
                rs1.station_id AS dep_station_id,
                st1.name AS dep_station_name,
                rs1.stop_order AS dep_order,
                rs2.station_id AS arr_station_id,
                st2.name AS arr_station_name,
                rs2.stop_order AS arr_order,
                rs1.departure_time AS dep_time,
                rs2.arrival_time AS arr_time,
                (rs2.price_from_start - rs1.price_from_start) AS min_price
            FROM schedules s
            JOIN routes r ON s.route_id = r.id
            JOIN trains t ON r.train_id = t.id
            JOIN route_stops rs1 ON rs1.route_id = r.id AND rs1.station_id = ?1
            JOIN route_stops rs2 ON rs2.route_id = r.id AND rs2.station_id = ?2
            JOIN stations st1 ON st1.id = rs1.station_id
            JOIN stations st2 ON st2.id = rs2.station_id
            WHERE s.departure_date = ?3
              AND s.status = 'active'
              AND t.is_active = 1
              AND rs1.stop_order < rs2.stop_order
              AND ?3 BETWEEN r.valid_from AND r.valid_to
            ORDER BY rs1.departure_time, s.id
            ",
        )
        .bind(dep_station_id)
        .bind(arr_station_id)
        .bind(date)
        .fetch_all(self.conn())
        .await?;
        Ok(rows)
    }

    /// Position of a station on the schedule's route.
    pub async fn stop_order_on_schedule(
        &mut self,
        schedule_id: i64,
        station_id: i64,
    ) -> Result<Option<i64>, DatabaseError> {
        let row: Option<(i64,)> = sqlx::query_as(
            r"
            SELECT rs.stop_order
            FROM schedules s
            JOIN route_stops rs ON rs.route_id = s.route_id
            WHERE s.id = ? AND rs.station_id = ?
            ",
        )
        .bind(schedule_id)
        .bind(station_id)
        .fetch_optional(self.conn())
        .await?;
        Ok(row.map(|r| r.0))
    }

    /// Every seat of the schedule's train, by carriage then seat number.
    pub async fn schedule_seats(&mut self, schedule_id: i64) -> Result<Vec<SeatRow>, DatabaseError> {
        let seats = sqlx::query_as::<_, SeatRow>(
            r"
            SELECT se.id, se.carriage_id, c.carriage_number, c.carriage_type,
                   se.seat_number, se.seat_type
            FROM schedules s
            JOIN routes r ON s.route_id = r.id
            JOIN carriages c ON c.train_id = r.train_id
            JOIN seats se ON se.carriage_id = c.id
            WHERE s.id = ?
            ORDER BY c.carriage_number, se.seat_number
            ",
        )
        .bind(schedule_id)
        .fetch_all(self.conn())
        .await?;
        Ok(seats)
    }

    /// Whether the seat belongs to the train running the schedule.
    pub async fn seat_on_schedule(
        &mut self,
        schedule_id: i64,
        seat_id: i64,
    ) -> Result<bool, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            r"
            SELECT COUNT(*)
            FROM schedules s
            JOIN routes r ON s.route_id = r.id
            JOIN carriages c ON c.train_id = r.train_id
            JOIN seats se ON se.carriage_id = c.id
            WHERE s.id = ? AND se.id = ?
            ",
        )
        .bind(schedule_id)
        .bind(seat_id)
        .fetch_one(self.conn())
        .await?;
        Ok(row.0 > 0)
    }

    /// Stop-order segments of live (`booked`/`paid`) tickets on a schedule,
    /// optionally narrowed to one seat.
    pub async fn reserved_segments(
        &mut self,
        schedule_id: i64,
        seat_id: Option<i64>,
    ) -> Result<Vec<ReservedSegment>, DatabaseError> {
        let rows = sqlx::query_as::<_, ReservedSegment>(
            r"
            SELECT tk.seat_id, d.stop_order AS start_order, a.stop_order AS end_order
            FROM tickets tk
            JOIN schedules s ON tk.schedule_id = s.id
            JOIN route_stops d ON d.route_id = s.route_id AND d.station_id = tk.departure_station_id
            JOIN route_stops a ON a.route_id = s.route_id AND a.station_id = tk.arrival_station_id
            WHERE tk.schedule_id = ?1
              AND (?2 IS NULL OR tk.seat_id = ?2)
              AND tk.status IN ('booked', 'paid')
            ",
        )
        .bind(schedule_id)
        .bind(seat_id)
        .fetch_all(self.conn())
        .await?;
        Ok(rows)
    }

    // =========================================================================
    // Tickets
    // =========================================================================

    /// Insert a ticket in status `booked`.
    pub async fn insert_ticket(&mut self, ticket: &NewTicket<'_>) -> Result<Ticket, DatabaseError> {
        let row = sqlx::query_as::<_, Ticket>(
            r"
            INSERT INTO tickets
                (user_id, schedule_id, seat_id, departure_station_id, arrival_station_id,
                 ticket_number, price, status, booked_at, passenger_name, passenger_document)
            VALUES (?, ?, ?, ?, ?, ?, ?, 'booked', ?, ?, ?)
            RETURNING *
            ",
        )
        .bind(ticket.user_id)
        .bind(ticket.schedule_id)
        .bind(ticket.seat_id)
        .bind(ticket.departure_station_id)
        .bind(ticket.arrival_station_id)
        .bind(ticket.ticket_number)
        .bind(ticket.price)
        .bind(ticket.booked_at)
        .bind(ticket.passenger_name)
        .bind(ticket.passenger_document)
        .fetch_one(self.conn())
        .await?;
        Ok(row)
    }

    pub async fn get_ticket(&mut self, ticket_number: &str) -> Result<Option<Ticket>, DatabaseError> {
        let ticket = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE ticket_number = ?")
            .bind(ticket_number)
            .fetch_optional(self.conn())
            .await?;
        Ok(ticket)
    }

    /// A user's tickets, newest first.
    pub async fn user_tickets(&mut self, user_id: i64) -> Result<Vec<Ticket>, DatabaseError> {
        let tickets = sqlx::query_as::<_, Ticket>(
            "SELECT * FROM tickets WHERE user_id = ? ORDER BY booked_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(self.conn())
        .await?;
        Ok(tickets)
    }

    /// `booked -> paid`. Returns false if the ticket was not `booked`.
    pub async fn mark_ticket_paid(
        &mut self,
        ticket_number: &str,
        now: i64,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE tickets SET status = 'paid', paid_at = ? WHERE ticket_number = ? AND status = 'booked'",
        )
        .bind(now)
        .bind(ticket_number)
        .execute(self.conn())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `booked|paid -> cancelled`. Returns false if the ticket was in neither.
    pub async fn mark_ticket_cancelled(
        &mut self,
        ticket_number: &str,
        now: i64,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE tickets SET status = 'cancelled', cancelled_at = ? WHERE ticket_number = ? AND status IN ('booked', 'paid')",
        )
        .bind(now)
        .bind(ticket_number)
        .execute(self.conn())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `booked -> expired` for every booking made strictly before `cutoff`.
    pub async fn expire_bookings(&mut self, cutoff: i64, now: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE tickets SET status = 'expired', cancelled_at = ? WHERE status = 'booked' AND booked_at < ?",
        )
        .bind(now)
        .bind(cutoff)
        .execute(self.conn())
        .await?;
        Ok(result.rows_affected())
    }

    /// Ticket with train, stations, timing, carriage and seat.
    pub async fn ticket_trip(
        &mut self,
        ticket_number: &str,
    ) -> Result<Option<TicketTripRow>, DatabaseError> {
        let row = sqlx::query_as::<_, TicketTripRow>(
            r"
            SELECT
                tk.id, tk.user_id, tk.schedule_id, tk.seat_id,
                tk.departure_station_id, tk.arrival_station_id,
                tk.ticket_number, tk.price, tk.status,
                tk.booked_at, tk.paid_at, tk.cancelled_at,
                tk.passenger_name, tk.passenger_document,
                t.train_number, t.train_type,
                st_dep.name AS departure_station_name,
                st_arr.name AS arrival_station_name,
                s.departure_date,
                rs_dep.departure_time AS departure_time,
                rs_arr.arrival_time AS arrival_time,
                c.carriage_number,
                se.seat_number
            FROM tickets tk
            JOIN schedules s ON tk.schedule_id = s.id
            JOIN routes r ON s.route_id = r.id
            JOIN trains t ON r.train_id = t.id
            JOIN seats se ON tk.seat_id = se.id
            JOIN carriages c ON se.carriage_id = c.id
            JOIN route_stops rs_dep ON rs_dep.route_id = r.id
                AND rs_dep.station_id = tk.departure_station_id
            JOIN route_stops rs_arr ON rs_arr.route_id = r.id
                AND rs_arr.station_id = tk.arrival_station_id
            JOIN stations st_dep ON tk.departure_station_id = st_dep.id
            JOIN stations st_arr ON tk.arrival_station_id = st_arr.id
            WHERE tk.ticket_number = ?
            ",
        )
        .bind(ticket_number)
        .fetch_optional(self.conn())
        .await?;
        Ok(row)
    }
}
