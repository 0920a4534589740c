//! Booking engine.
//!
//! - [`occupancy`]: the segment overlap test deciding whether a seat is free
//! - [`timeline`]: dated stop times for a route departing on a given day
//! - [`BookingEngine`]: search, availability and the ticket lifecycle

mod engine;
pub mod occupancy;
pub mod timeline;

#[cfg(test)]
mod engine_tests;

pub use engine::{
    BookingEngine, BookingRequest, SeatAvailability, TicketTrip, TrainOption,
    generate_ticket_number,
};
