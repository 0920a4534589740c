//! Printable ticket document.
//!
//! A pure function of the trip record. The output is UTF-8 plain text laid
//! out for printing on one page.

use std::fmt::Write as _;

use chrono::DateTime;

use crate::booking::TicketTrip;

const WIDTH: usize = 48;

/// Render a ticket. Returns an empty blob if formatting fails.
pub fn render_ticket(trip: &TicketTrip) -> Vec<u8> {
    let mut out = String::new();
    if write_ticket(&mut out, trip).is_err() {
        return Vec::new();
    }
    out.into_bytes()
}

fn write_ticket(out: &mut String, trip: &TicketTrip) -> std::fmt::Result {
    let ticket = &trip.ticket;
    let rule = "=".repeat(WIDTH);
    let paid = ticket
        .paid_at
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map_or_else(|| "unpaid".to_string(), |t| t.format("%Y-%m-%d %H:%M UTC").to_string());

    writeln!(out, "{rule}")?;
    writeln!(out, "{:^WIDTH$}", "RAILWAY TICKET")?;
    writeln!(out, "{:^WIDTH$}", ticket.ticket_number)?;
    writeln!(out, "{rule}")?;
    writeln!(out, "Passenger:  {}", ticket.passenger_name)?;
    writeln!(out, "Document:   {}", ticket.passenger_document)?;
    writeln!(out, "Train:      {} ({})", trip.train_number, trip.train_type)?;
    writeln!(out, "From:       {}", trip.departure_station_name)?;
    writeln!(out, "Departure:  {}", trip.departure.format("%Y-%m-%d %H:%M"))?;
    writeln!(out, "To:         {}", trip.arrival_station_name)?;
    writeln!(out, "Arrival:    {}", trip.arrival.format("%Y-%m-%d %H:%M"))?;
    writeln!(out, "Carriage:   {}", trip.carriage_number)?;
    writeln!(out, "Seat:       {}", trip.seat_number)?;
    writeln!(out, "Price:      {:.2}", ticket.price)?;
    writeln!(out, "Status:     {}", ticket.status)?;
    writeln!(out, "Paid:       {paid}")?;
    writeln!(out, "{rule}")
}
