//! Tests for `BookingEngine`.

use chrono::{Duration, NaiveDate};

use super::{BookingRequest, generate_ticket_number};
use crate::clock::Clock;
use crate::error::ServiceError;
use crate::notify::document::render_ticket;
use crate::storage::StopSpec;
use crate::storage::seed::DemoNetwork;
use crate::test_support::{DEMO_DATE, TestStack, stack};

fn demo_date() -> NaiveDate {
    NaiveDate::parse_from_str(DEMO_DATE, "%Y-%m-%d").unwrap()
}

fn request(net: &DemoNetwork, seat: usize, from: usize, to: usize) -> BookingRequest {
    BookingRequest {
        schedule_id: net.schedule_id,
        seat_id: net.seats[seat],
        departure_station_id: net.station(from),
        arrival_station_id: net.station(to),
        passenger_name: "Ivan Petrov".into(),
        passenger_document: "4510 123456".into(),
        price: 1500.0,
    }
}

async fn users(s: &TestStack) -> (i64, i64, i64) {
    (
        s.verified_user("alice@example.com", "password123").await,
        s.verified_user("bob@example.com", "password123").await,
        s.verified_user("carol@example.com", "password123").await,
    )
}

// === Search and availability ===

#[tokio::test]
async fn search_derives_timing_price_and_free_seats() {
    let s = stack().await;
    let (alice, ..) = users(&s).await;
    let net = &s.network;

    let found = s
        .booking
        .search(net.station(0), net.station(4), demo_date())
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    let train = &found[0];
    assert_eq!(train.train_number, "072A");
    assert_eq!(train.departure_time.to_string(), "2025-06-01 22:00:00");
    assert_eq!(train.arrival_time.to_string(), "2025-06-02 05:30:00");
    assert_eq!(train.travel_time_minutes, 450);
    assert!((train.min_price - 3000.0).abs() < f64::EPSILON);
    assert_eq!(train.available_seats, net.seats.len());

    s.booking
        .book(alice, &request(net, 0, 0, 2), None)
        .await
        .unwrap();

    let overlapping = s
        .booking
        .search(net.station(1), net.station(3), demo_date())
        .await
        .unwrap();
    assert_eq!(overlapping[0].available_seats, net.seats.len() - 1);
    assert_eq!(overlapping[0].departure_station_name, "Tver");

    let after = s
        .booking
        .search(net.station(2), net.station(4), demo_date())
        .await
        .unwrap();
    assert_eq!(after[0].available_seats, net.seats.len());
}

#[tokio::test]
async fn search_with_no_match_is_empty() {
    let s = stack().await;
    let net = &s.network;

    let backwards = s
        .booking
        .search(net.station(4), net.station(0), demo_date())
        .await
        .unwrap();
    assert!(backwards.is_empty());

    let other_day = s
        .booking
        .search(net.station(0), net.station(4), demo_date().succ_opt().unwrap())
        .await
        .unwrap();
    assert!(other_day.is_empty());

    let unknown = s.booking.search(9_998, 9_999, demo_date()).await.unwrap();
    assert!(unknown.is_empty());
}

#[tokio::test]
async fn booking_and_cancelling_round_trip_through_availability() {
    let s = stack().await;
    let (alice, ..) = users(&s).await;
    let net = &s.network;

    let ticket = s
        .booking
        .book(alice, &request(net, 3, 1, 3), None)
        .await
        .unwrap();

    let seats = s
        .booking
        .available_seats(net.schedule_id, net.station(1), net.station(3))
        .await
        .unwrap();
    let seat = seats.iter().find(|x| x.id == net.seats[3]).unwrap();
    assert!(!seat.is_available);
    assert_eq!(seats.iter().filter(|x| x.is_available).count(), seats.len() - 1);

    s.booking
        .cancel(alice, &ticket.ticket_number, "User cancellation", None)
        .await
        .unwrap();
    let seats = s
        .booking
        .available_seats(net.schedule_id, net.station(1), net.station(3))
        .await
        .unwrap();
    assert!(seats.iter().all(|x| x.is_available));
}

#[tokio::test]
async fn available_seats_rejects_backward_segment() {
    let s = stack().await;
    let net = &s.network;
    let err = s
        .booking
        .available_seats(net.schedule_id, net.station(3), net.station(1))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid route segment");
}

// === Booking ===

#[tokio::test]
async fn overlapping_segment_is_refused_adjacent_segment_is_not() {
    let s = stack().await;
    let (alice, bob, carol) = users(&s).await;
    let net = &s.network;

    // A -> C
    s.booking
        .book(alice, &request(net, 2, 0, 2), None)
        .await
        .unwrap();

    // B -> D starts inside A -> C.
    let err = s
        .booking
        .book(bob, &request(net, 2, 1, 3), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::SeatUnavailable));

    // C -> E begins where A -> C ends.
    s.booking
        .book(carol, &request(net, 2, 2, 4), None)
        .await
        .unwrap();

    // A -> E contains both.
    let err = s
        .booking
        .book(bob, &request(net, 2, 0, 4), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::SeatUnavailable));

    assert!(s.booking.my_tickets(bob).await.unwrap().is_empty());
}

/// Second route over the demo stations in reverse, departing the next day
/// with the same train.
async fn reverse_schedule(s: &TestStack) -> i64 {
    let net = &s.network;
    let mut db = s.db.lock().await;
    let route_id = db
        .create_route(net.train_id, "Saint Petersburg - Moscow", "2025-01-01", "2025-12-31")
        .await
        .unwrap();
    let times = [
        (None, "08:00", 0.0),
        (Some("10:40"), "10:45", 900.0),
        (Some("11:50"), "11:55", 1500.0),
        (Some("13:40"), "13:45", 2200.0),
        (Some("15:30"), "15:30", 3000.0),
    ];
    for (order, (station, (arrival, departure, price))) in
        net.stations.iter().rev().zip(times).enumerate()
    {
        db.add_route_stop(
            route_id,
            &StopSpec {
                station_id: *station,
                stop_order: i64::try_from(order).unwrap() + 1,
                arrival_time: arrival,
                departure_time: departure,
                stop_duration_minutes: 5,
                price_from_start: price,
            },
        )
        .await
        .unwrap();
    }
    db.create_schedule(route_id, "2025-06-02").await.unwrap()
}

#[tokio::test]
async fn reverse_route_uses_stop_order_not_station_ids() {
    let s = stack().await;
    let (alice, bob, _) = users(&s).await;
    let net = &s.network;
    let schedule_id = reverse_schedule(&s).await;
    let on_reverse = |seat, from, to| BookingRequest {
        schedule_id,
        ..request(net, seat, from, to)
    };

    // Station ids descend along this route: 4 -> 2 covers stop orders 1..3.
    s.booking.book(alice, &on_reverse(0, 4, 2), None).await.unwrap();

    let err = s
        .booking
        .book(bob, &on_reverse(0, 3, 1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::SeatUnavailable));

    s.booking.book(bob, &on_reverse(0, 2, 0), None).await.unwrap();

    let next_day = demo_date() + Duration::days(1);
    let found = s
        .booking
        .search(net.station(4), net.station(0), next_day)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].schedule_id, schedule_id);
    assert_eq!(found[0].available_seats, net.seats.len() - 1);

    // The forward schedule is untouched.
    let forward = s
        .booking
        .available_seats(net.schedule_id, net.station(0), net.station(4))
        .await
        .unwrap();
    assert!(forward.iter().all(|seat| seat.is_available));
}

#[tokio::test]
async fn zero_price_is_rejected_without_a_write() {
    let s = stack().await;
    let (alice, ..) = users(&s).await;
    let net = &s.network;

    for price in [0.0, -10.0, f64::NAN, f64::INFINITY] {
        let mut req = request(net, 0, 0, 1);
        req.price = price;
        let err = s.booking.book(alice, &req, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)), "price {price}");
    }

    let mut req = request(net, 0, 0, 1);
    req.passenger_name = "  <b></b> ".into();
    assert!(matches!(
        s.booking.book(alice, &req, None).await,
        Err(ServiceError::Validation(_))
    ));

    assert!(s.booking.my_tickets(alice).await.unwrap().is_empty());
    let logs = s.db.lock().await.audit_logs(Some(alice), 50).await.unwrap();
    assert!(logs.iter().all(|l| l.action != "ticket_booked"));
}

#[tokio::test]
async fn booking_checks_schedule_segment_and_seat() {
    let s = stack().await;
    let (alice, ..) = users(&s).await;
    let net = &s.network;

    let err = s
        .booking
        .book(alice, &request(net, 0, 3, 1), None)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid route segment");

    let mut req = request(net, 0, 0, 1);
    req.arrival_station_id = 9_999;
    let err = s.booking.book(alice, &req, None).await.unwrap_err();
    assert_eq!(err.to_string(), "Invalid route segment");

    let mut req = request(net, 0, 0, 1);
    req.seat_id = 9_999;
    let err = s.booking.book(alice, &req, None).await.unwrap_err();
    assert_eq!(err.to_string(), "Seat does not belong to this train");

    let mut req = request(net, 0, 0, 1);
    req.schedule_id = 9_999;
    let err = s.booking.book(alice, &req, None).await.unwrap_err();
    assert_eq!(err.to_string(), "Schedule is not available for booking");

    s.db.lock()
        .await
        .set_schedule_status(net.schedule_id, "cancelled")
        .await
        .unwrap();
    let err = s
        .booking
        .book(alice, &request(net, 0, 0, 1), None)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Schedule is not available for booking");
}

#[tokio::test]
async fn booked_ticket_has_sanitised_passenger_and_number() {
    let s = stack().await;
    let (alice, ..) = users(&s).await;
    let net = &s.network;

    let mut req = request(net, 1, 0, 4);
    req.passenger_name = " <script>x</script>Ivan Petrov\u{7}".into();
    let ticket = s.booking.book(alice, &req, Some("10.1.1.1")).await.unwrap();

    assert_eq!(ticket.status, "booked");
    assert_eq!(ticket.passenger_name, "xIvan Petrov");
    assert_eq!(ticket.booked_at, s.clock.now().timestamp());
    assert!(ticket.ticket_number.starts_with("TK"));
    assert_eq!(ticket.ticket_number.len(), 21);
    assert!(ticket.ticket_number[2..].chars().all(|c| c.is_ascii_digit()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bookings_of_one_seat_admit_exactly_one() {
    let s = stack().await;
    let (alice, ..) = users(&s).await;
    let net = s.network.clone();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let engine = s.booking.clone();
        let req = request(&net, 5, 0, 4);
        handles.push(tokio::spawn(
            async move { engine.book(alice, &req, None).await },
        ));
    }

    let mut booked = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => booked += 1,
            Err(ServiceError::SeatUnavailable) => refused += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(booked, 1);
    assert_eq!(refused, 15);
}

// === Pay and cancel ===

#[tokio::test]
async fn paying_twice_fails_and_keeps_paid_time() {
    let s = stack().await;
    let (alice, ..) = users(&s).await;
    let ticket = s
        .booking
        .book(alice, &request(&s.network, 0, 0, 4), None)
        .await
        .unwrap();

    s.clock.advance(Duration::minutes(3));
    let paid = s.booking.pay(alice, &ticket.ticket_number, None).await.unwrap();
    assert_eq!(paid.status, "paid");
    assert_eq!(paid.paid_at, Some(s.clock.now().timestamp()));

    s.clock.advance(Duration::minutes(1));
    let err = s
        .booking
        .pay(alice, &ticket.ticket_number, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
    assert_eq!(err.to_string(), "Ticket cannot be paid (status: paid)");

    let again = s
        .booking
        .ticket_details(alice, &ticket.ticket_number)
        .await
        .unwrap();
    assert_eq!(again.status, "paid");
    assert_eq!(again.paid_at, paid.paid_at);
}

#[tokio::test]
async fn paid_ticket_can_be_cancelled_once() {
    let s = stack().await;
    let (alice, ..) = users(&s).await;
    let ticket = s
        .booking
        .book(alice, &request(&s.network, 0, 0, 4), None)
        .await
        .unwrap();
    s.booking.pay(alice, &ticket.ticket_number, None).await.unwrap();

    let cancelled = s
        .booking
        .cancel(alice, &ticket.ticket_number, "Change of plans", None)
        .await
        .unwrap();
    assert_eq!(cancelled.status, "cancelled");
    assert!(cancelled.cancelled_at.is_some());

    let err = s
        .booking
        .cancel(alice, &ticket.ticket_number, "again", None)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Ticket cannot be cancelled (status: cancelled)");

    let err = s
        .booking
        .pay(alice, &ticket.ticket_number, None)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Ticket cannot be paid (status: cancelled)");
}

#[tokio::test]
async fn other_users_tickets_are_off_limits() {
    let s = stack().await;
    let (alice, bob, _) = users(&s).await;
    let ticket = s
        .booking
        .book(alice, &request(&s.network, 0, 0, 1), None)
        .await
        .unwrap();

    for err in [
        s.booking.pay(bob, &ticket.ticket_number, None).await.unwrap_err(),
        s.booking
            .cancel(bob, &ticket.ticket_number, "", None)
            .await
            .unwrap_err(),
        s.booking
            .ticket_details(bob, &ticket.ticket_number)
            .await
            .unwrap_err(),
    ] {
        assert!(matches!(err, ServiceError::AccessDenied));
    }

    assert!(matches!(
        s.booking.pay(alice, "TK-missing", None).await,
        Err(ServiceError::TicketNotFound)
    ));
    assert_eq!(
        s.booking.ticket_details(alice, &ticket.ticket_number).await.unwrap().status,
        "booked"
    );
}

#[tokio::test]
async fn my_tickets_lists_newest_first() {
    let s = stack().await;
    let (alice, ..) = users(&s).await;

    let first = s
        .booking
        .book(alice, &request(&s.network, 0, 0, 1), None)
        .await
        .unwrap();
    s.clock.advance(Duration::seconds(5));
    let second = s
        .booking
        .book(alice, &request(&s.network, 1, 0, 1), None)
        .await
        .unwrap();

    let mine = s.booking.my_tickets(alice).await.unwrap();
    let numbers: Vec<&str> = mine.iter().map(|t| t.ticket_number.as_str()).collect();
    assert_eq!(numbers, vec![second.ticket_number.as_str(), first.ticket_number.as_str()]);
}

// === Expiry ===

#[tokio::test]
async fn stale_booking_expires_and_cannot_be_paid() {
    let s = stack().await;
    let (alice, ..) = users(&s).await;
    let ticket = s
        .booking
        .book(alice, &request(&s.network, 0, 0, 4), None)
        .await
        .unwrap();

    s.clock.advance(Duration::minutes(14));
    assert_eq!(s.booking.expire_stale_bookings().await.unwrap(), 0);

    s.clock.advance(Duration::minutes(2));
    assert_eq!(s.booking.expire_stale_bookings().await.unwrap(), 1);
    assert_eq!(s.booking.expire_stale_bookings().await.unwrap(), 0);

    let err = s
        .booking
        .pay(alice, &ticket.ticket_number, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
    assert_eq!(err.to_string(), "Ticket cannot be paid (status: expired)");

    // The seat is free again.
    let seats = s
        .booking
        .available_seats(s.network.schedule_id, s.network.station(0), s.network.station(4))
        .await
        .unwrap();
    assert!(seats.iter().all(|x| x.is_available));
}

#[tokio::test]
async fn paid_ticket_never_expires() {
    let s = stack().await;
    let (alice, ..) = users(&s).await;
    let ticket = s
        .booking
        .book(alice, &request(&s.network, 0, 0, 4), None)
        .await
        .unwrap();
    s.booking.pay(alice, &ticket.ticket_number, None).await.unwrap();

    s.clock.advance(Duration::hours(2));
    assert_eq!(s.booking.expire_stale_bookings().await.unwrap(), 0);
}

// === Trip record ===

#[tokio::test]
async fn trip_record_feeds_the_document() {
    let s = stack().await;
    let (alice, ..) = users(&s).await;
    let ticket = s
        .booking
        .book(alice, &request(&s.network, 4, 2, 4), None)
        .await
        .unwrap();
    s.booking.pay(alice, &ticket.ticket_number, None).await.unwrap();

    let trip = s.booking.trip(&ticket.ticket_number).await.unwrap();
    assert_eq!(trip.departure_station_name, "Bologoye");
    assert_eq!(trip.departure.to_string(), "2025-06-02 01:35:00");
    assert_eq!(trip.arrival.to_string(), "2025-06-02 05:30:00");
    assert_eq!(trip.carriage_number, 2);
    assert_eq!(trip.seat_number, 1);

    let text = String::from_utf8(render_ticket(&trip)).unwrap();
    assert!(text.contains(&ticket.ticket_number));
    assert!(text.contains("Saint Petersburg Moskovsky"));
}

#[test]
fn ticket_numbers_embed_millis() {
    let now = chrono::DateTime::from_timestamp_millis(1_750_000_000_123).unwrap();
    let number = generate_ticket_number(now);
    assert!(number.starts_with("TK1750000000123"));
    assert_eq!(number.len(), 21);
}
