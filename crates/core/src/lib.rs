//! `weighbridge-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, decimal rounding, the injectable clock,
//! and optimistic-concurrency helpers shared by the ticket and invoice crates.

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod id;
pub mod numeric;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use clock::{Clock, FixedClock, SystemClock, parse_date, parse_timestamp};
pub use error::{DomainError, DomainResult, ValidationErrors};
pub use id::{Actor, CustomerId, InvoiceId, LookupId, ProductId, TicketId, VehicleId};
pub use numeric::{
    check_weight_kg, parse_currency_input, parse_decimal_input, parse_weight_kg, round_currency,
    round_kg,
};
