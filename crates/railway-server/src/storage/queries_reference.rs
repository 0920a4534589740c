//! Reference data: stations, trains, carriages, seats, routes, schedules.
//!
//! Administrative create/read operations. None of these are reachable from
//! the protocol command table except the station listings.

use super::db::{DatabaseError, DbLock};
use super::models::{RouteStop, Schedule, Station, Train};

/// Timing and fare of one stop, for [`DbLock::add_route_stop`].
#[derive(Debug, Clone)]
pub struct StopSpec<'a> {
    pub station_id: i64,
    pub stop_order: i64,
    pub arrival_time: Option<&'a str>,
    pub departure_time: &'a str,
    pub stop_duration_minutes: i64,
    pub price_from_start: f64,
}

impl DbLock<'_> {
    // =========================================================================
    // Stations
    // =========================================================================

    /// Create a station; the code is stored upper-cased.
    pub async fn create_station(
        &mut self,
        name: &str,
        city: &str,
        code: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<i64, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO stations (name, city, code, latitude, longitude) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(name.trim())
        .bind(city.trim())
        .bind(code.trim().to_uppercase())
        .bind(latitude)
        .bind(longitude)
        .execute(self.conn())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_station(&mut self, id: i64) -> Result<Station, DatabaseError> {
        sqlx::query_as::<_, Station>("SELECT * FROM stations WHERE id = ?")
            .bind(id)
            .fetch_optional(self.conn())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Station {id}")))
    }

    pub async fn list_stations(&mut self) -> Result<Vec<Station>, DatabaseError> {
        let stations = sqlx::query_as::<_, Station>("SELECT * FROM stations ORDER BY name")
            .fetch_all(self.conn())
            .await?;
        Ok(stations)
    }

    /// Case-insensitive substring match over name, city and code.
    pub async fn search_stations(&mut self, text: &str) -> Result<Vec<Station>, DatabaseError> {
        let pattern = format!("%{}%", text.trim().to_lowercase());
        let stations = sqlx::query_as::<_, Station>(
            "SELECT * FROM stations WHERE LOWER(name) LIKE ?1 OR LOWER(city) LIKE ?1 OR LOWER(code) LIKE ?1 ORDER BY name",
        )
        .bind(pattern)
        .fetch_all(self.conn())
        .await?;
        Ok(stations)
    }

    // =========================================================================
    // Rolling stock
    // =========================================================================

    pub async fn create_train(
        &mut self,
        train_number: &str,
        train_type: &str,
        total_seats: i64,
    ) -> Result<i64, DatabaseError> {
        let result =
            sqlx::query("INSERT INTO trains (train_number, train_type, total_seats) VALUES (?, ?, ?)")
                .bind(train_number)
                .bind(train_type)
                .bind(total_seats)
                .execute(self.conn())
                .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_train(&mut self, id: i64) -> Result<Train, DatabaseError> {
        sqlx::query_as::<_, Train>("SELECT * FROM trains WHERE id = ?")
            .bind(id)
            .fetch_optional(self.conn())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Train {id}")))
    }

    pub async fn set_train_active(&mut self, id: i64, active: bool) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE trains SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(self.conn())
            .await?;
        Ok(())
    }

    pub async fn create_carriage(
        &mut self,
        train_id: i64,
        carriage_number: i64,
        carriage_type: &str,
        total_seats: i64,
        price_multiplier: f64,
    ) -> Result<i64, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO carriages (train_id, carriage_number, carriage_type, total_seats, price_multiplier) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(train_id)
        .bind(carriage_number)
        .bind(carriage_type)
        .bind(total_seats)
        .bind(price_multiplier)
        .execute(self.conn())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn create_seat(
        &mut self,
        carriage_id: i64,
        seat_number: i64,
        seat_type: &str,
    ) -> Result<i64, DatabaseError> {
        let result =
            sqlx::query("INSERT INTO seats (carriage_id, seat_number, seat_type) VALUES (?, ?, ?)")
                .bind(carriage_id)
                .bind(seat_number)
                .bind(seat_type)
                .execute(self.conn())
                .await?;
        Ok(result.last_insert_rowid())
    }

    // =========================================================================
    // Routes and schedules
    // =========================================================================

    /// Create a route valid between two ISO dates, inclusive.
    pub async fn create_route(
        &mut self,
        train_id: i64,
        route_name: &str,
        valid_from: &str,
        valid_to: &str,
    ) -> Result<i64, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO routes (train_id, route_name, valid_from, valid_to) VALUES (?, ?, ?, ?)",
        )
        .bind(train_id)
        .bind(route_name)
        .bind(valid_from)
        .bind(valid_to)
        .execute(self.conn())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn add_route_stop(
        &mut self,
        route_id: i64,
        stop: &StopSpec<'_>,
    ) -> Result<i64, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO route_stops (route_id, station_id, stop_order, arrival_time, departure_time, stop_duration_minutes, price_from_start) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(route_id)
        .bind(stop.station_id)
        .bind(stop.stop_order)
        .bind(stop.arrival_time)
        .bind(stop.departure_time)
        .bind(stop.stop_duration_minutes)
        .bind(stop.price_from_start)
        .execute(self.conn())
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Stops of a route in travel order.
    pub async fn get_route_stops(&mut self, route_id: i64) -> Result<Vec<RouteStop>, DatabaseError> {
        let stops = sqlx::query_as::<_, RouteStop>(
            "SELECT * FROM route_stops WHERE route_id = ? ORDER BY stop_order",
        )
        .bind(route_id)
        .fetch_all(self.conn())
        .await?;
        Ok(stops)
    }

    /// Create an active schedule for `departure_date` (ISO date).
    pub async fn create_schedule(
        &mut self,
        route_id: i64,
        departure_date: &str,
    ) -> Result<i64, DatabaseError> {
        let result = sqlx::query("INSERT INTO schedules (route_id, departure_date) VALUES (?, ?)")
            .bind(route_id)
            .bind(departure_date)
            .execute(self.conn())
            .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_schedule(&mut self, id: i64) -> Result<Option<Schedule>, DatabaseError> {
        let schedule = sqlx::query_as::<_, Schedule>("SELECT * FROM schedules WHERE id = ?")
            .bind(id)
            .fetch_optional(self.conn())
            .await?;
        Ok(schedule)
    }

    /// Set a schedule to `active` or `cancelled`.
    pub async fn set_schedule_status(&mut self, id: i64, status: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE schedules SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(self.conn())
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Schedule {id}")));
        }
        Ok(())
    }
}
