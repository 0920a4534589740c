//! Demo reference network.
//!
//! A five-stop overnight line with one train, two carriages and one active
//! schedule. Used by `railway-server --seed-demo` and by the test suites.

use tracing::info;

use super::db::{DatabaseError, DbLock};
use super::queries_reference::StopSpec;

pub const DEMO_TRAIN_NUMBER: &str = "072A";
pub const SEATS_PER_CARRIAGE: i64 = 4;

/// Ids of everything the demo seed created.
#[derive(Debug, Clone)]
pub struct DemoNetwork {
    /// Stations in route order.
    pub stations: Vec<i64>,
    pub train_id: i64,
    pub route_id: i64,
    pub schedule_id: i64,
    /// Seats by carriage then seat number.
    pub seats: Vec<i64>,
    pub departure_date: String,
}

impl DemoNetwork {
    /// Station at route position `idx` (0-based).
    pub fn station(&self, idx: usize) -> i64 {
        self.stations[idx]
    }
}

/// (name, city, code, lat, lon, arrival, departure, price from start)
const STOPS: [(&str, &str, &str, f64, f64, Option<&str>, &str, f64); 5] = [
    ("Moscow Leningradsky", "Moscow", "MOW", 55.776, 37.655, None, "22:00", 0.0),
    ("Tver", "Tver", "TVR", 56.834, 35.904, Some("23:40"), "23:45", 800.0),
    ("Bologoye", "Bologoye", "BLG", 57.882, 34.052, Some("01:30"), "01:35", 1500.0),
    ("Okulovka", "Okulovka", "OKL", 58.391, 33.296, Some("02:40"), "02:45", 2100.0),
    ("Saint Petersburg Moskovsky", "Saint Petersburg", "SPB", 59.929, 30.362, Some("05:30"), "05:30", 3000.0),
];

/// Seed the demo network with a schedule on `departure_date` (ISO date).
///
/// The route is valid for the whole calendar year of the date.
pub async fn seed_demo_network(
    db: &mut DbLock<'_>,
    departure_date: &str,
) -> Result<DemoNetwork, DatabaseError> {
    let year = departure_date.get(..4).unwrap_or("2000");

    let mut stations = Vec::with_capacity(STOPS.len());
    for (name, city, code, lat, lon, ..) in STOPS {
        stations.push(db.create_station(name, city, code, lat, lon).await?);
    }

    let train_id = db
        .create_train(DEMO_TRAIN_NUMBER, "Express", 2 * SEATS_PER_CARRIAGE)
        .await?;

    let mut seats = Vec::new();
    for (number, kind, multiplier) in [(1, "coupe", 1.5), (2, "platzkart", 1.0)] {
        let carriage = db
            .create_carriage(train_id, number, kind, SEATS_PER_CARRIAGE, multiplier)
            .await?;
        for seat in 1..=SEATS_PER_CARRIAGE {
            let seat_type = if seat % 2 == 1 { "lower" } else { "upper" };
            seats.push(db.create_seat(carriage, seat, seat_type).await?);
        }
    }

    let route_id = db
        .create_route(
            train_id,
            "Moscow - Saint Petersburg",
            &format!("{year}-01-01"),
            &format!("{year}-12-31"),
        )
        .await?;

    for (order, (&station_id, stop)) in stations.iter().zip(STOPS).enumerate() {
        let (.., arrival, departure, price) = stop;
        db.add_route_stop(
            route_id,
            &StopSpec {
                station_id,
                stop_order: i64::try_from(order).unwrap_or(i64::MAX) + 1,
                arrival_time: arrival,
                departure_time: departure,
                stop_duration_minutes: 5,
                price_from_start: price,
            },
        )
        .await?;
    }

    let schedule_id = db.create_schedule(route_id, departure_date).await?;

    info!(
        train = DEMO_TRAIN_NUMBER,
        schedule_id,
        departure_date,
        "Demo network seeded"
    );

    Ok(DemoNetwork {
        stations,
        train_id,
        route_id,
        schedule_id,
        seats,
        departure_date: departure_date.to_string(),
    })
}
