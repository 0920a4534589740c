//! Concrete arrival and departure instants for each stop of a dated route.
//!
//! Route stops store wall-clock times only. Walking the stops in order, any
//! time earlier than the previous one starts a new day.

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};

use crate::storage::RouteStop;

/// Dated timing of one stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopTimes {
    pub station_id: i64,
    pub stop_order: i64,
    pub arrival: Option<NaiveDateTime>,
    pub departure: NaiveDateTime,
}

impl StopTimes {
    /// Arrival, or departure at the origin which has no arrival.
    pub fn arrival_or_departure(&self) -> NaiveDateTime {
        self.arrival.unwrap_or(self.departure)
    }
}

/// Parse `HH:MM:SS` or `HH:MM`.
pub fn parse_clock_time(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .ok()
}

/// Dated stop times for `stops` (in route order) departing on `date`.
///
/// Returns `None` if any stored time fails to parse.
pub fn build(date: NaiveDate, stops: &[RouteStop]) -> Option<Vec<StopTimes>> {
    let mut day = 0u64;
    let mut previous: Option<NaiveTime> = None;
    let mut out = Vec::with_capacity(stops.len());

    let mut place = |time: NaiveTime| -> Option<NaiveDateTime> {
        if previous.is_some_and(|p| time < p) {
            day += 1;
        }
        previous = Some(time);
        Some(date.checked_add_days(Days::new(day))?.and_time(time))
    };

    for stop in stops {
        let arrival = match stop.arrival_time.as_deref() {
            Some(text) => Some(place(parse_clock_time(text)?)?),
            None => None,
        };
        let departure = place(parse_clock_time(&stop.departure_time)?)?;
        out.push(StopTimes {
            station_id: stop.station_id,
            stop_order: stop.stop_order,
            arrival,
            departure,
        });
    }
    Some(out)
}

/// Timing of the stop at `stop_order`.
pub fn at_order(timeline: &[StopTimes], stop_order: i64) -> Option<&StopTimes> {
    timeline.iter().find(|s| s.stop_order == stop_order)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn stop(order: i64, arrival: Option<&str>, departure: &str) -> RouteStop {
        RouteStop {
            id: order,
            route_id: 1,
            station_id: order * 10,
            stop_order: order,
            arrival_time: arrival.map(str::to_string),
            departure_time: departure.to_string(),
            stop_duration_minutes: 5,
            price_from_start: 0.0,
        }
    }

    fn at(date: NaiveDate, hh: u32, mm: u32) -> NaiveDateTime {
        date.and_hms_opt(hh, mm, 0).unwrap()
    }

    #[test]
    fn clock_time_formats() {
        assert_eq!(
            parse_clock_time("07:05"),
            NaiveTime::from_hms_opt(7, 5, 0)
        );
        assert_eq!(
            parse_clock_time("23:59:30"),
            NaiveTime::from_hms_opt(23, 59, 30)
        );
        assert!(parse_clock_time("7pm").is_none());
    }

    #[test]
    fn overnight_route_rolls_over_once() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let next = date.succ_opt().unwrap();
        let stops = [
            stop(1, None, "22:00"),
            stop(2, Some("23:40"), "23:45"),
            stop(3, Some("01:30"), "01:35"),
            stop(4, Some("05:30"), "05:30"),
        ];

        let t = build(date, &stops).unwrap();
        assert_eq!(t[0].arrival, None);
        assert_eq!(t[0].departure, at(date, 22, 0));
        assert_eq!(t[1].departure, at(date, 23, 45));
        assert_eq!(t[2].arrival, Some(at(next, 1, 30)));
        assert_eq!(t[3].arrival_or_departure(), at(next, 5, 30));
        assert_eq!(at_order(&t, 3).unwrap().departure, at(next, 1, 35));
    }

    #[test]
    fn rollover_between_arrival_and_departure() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        let stops = [stop(1, None, "23:00"), stop(2, Some("23:58"), "00:03")];
        let t = build(date, &stops).unwrap();
        assert_eq!(t[1].arrival, Some(at(date, 23, 58)));
        assert_eq!(
            t[1].departure,
            at(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(), 0, 3)
        );
    }

    #[test]
    fn unparsable_time_yields_none() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert!(build(date, &[stop(1, None, "noon")]).is_none());
    }
}
