//! Persistence boundary for tickets, invoices, reference data and number
//! sequences.
//!
//! Two backends implement every trait here:
//! - [`InMemoryStore`]: one lock around all state (dev/tests)
//! - [`PostgresStore`]: `sqlx` against the bundled schema
//!
//! Mutations of an existing row take the version the caller loaded and fail
//! with [`StoreError::Conflict`] when the row moved on in between.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use weighbridge_core::{
    CustomerId, DomainError, InvoiceId, LookupId, ProductId, TicketId, VehicleId,
};
use weighbridge_invoicing::{
    GenerationWindow, Invoice, InvoiceLine, InvoicePlan, InvoiceQuery, InvoiceSummary,
    InvoiceVoid,
};
use weighbridge_reference::{Customer, Deactivation, Lookup, LookupKind, Product, Vehicle};
use weighbridge_tickets::{Page, Ticket, TicketQuery, TicketVoid};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Storage failure.
///
/// These are infrastructure errors as opposed to domain errors (validation,
/// locking); workflows translate them for callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(String),

    /// Row changed since it was read, or a precondition no longer holds.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A unique key (ticket number, invoice number, code) is already taken.
    #[error("unique violation: {0}")]
    UniqueViolation(String),

    #[error("not found")]
    NotFound,

    /// Backend cannot be reached (pool closed, lock poisoned).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub(crate) fn corrupt(what: &str, err: impl core::fmt::Display) -> Self {
        StoreError::Database(format!("corrupt {what} row: {err}"))
    }
}

impl From<DomainError> for StoreError {
    fn from(value: DomainError) -> Self {
        StoreError::Database(value.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Which counter a number is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceKind {
    Ticket,
    Invoice,
}

impl SequenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SequenceKind::Ticket => "ticket",
            SequenceKind::Invoice => "invoice",
        }
    }
}

/// Per-year counters. Concurrent callers for the same year never receive the
/// same number, and no number is skipped.
#[async_trait::async_trait]
pub trait SequenceGenerator: Send + Sync {
    async fn next_number(&self, kind: SequenceKind, year: i32) -> StoreResult<i64>;

    /// Last number handed out (0 when the year has not started).
    async fn last_number(&self, kind: SequenceKind, year: i32) -> StoreResult<i64>;
}

/// A ticket with the names its list row displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSummary {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub vehicle_registration: Option<String>,
    pub customer_name: Option<String>,
}

#[async_trait::async_trait]
pub trait TicketStore: Send + Sync {
    /// Fails with `UniqueViolation` when the ticket number is taken.
    async fn insert_ticket(&self, ticket: &Ticket) -> StoreResult<()>;

    async fn get_ticket(&self, id: TicketId) -> StoreResult<Option<Ticket>>;

    /// Replace the row if it is still at `expected_version`; optionally
    /// append a void audit record in the same write.
    async fn update_ticket(
        &self,
        ticket: &Ticket,
        expected_version: u64,
        void: Option<&TicketVoid>,
    ) -> StoreResult<()>;

    async fn ticket_voids(&self, id: TicketId) -> StoreResult<Vec<TicketVoid>>;

    async fn list_tickets(&self, query: &TicketQuery) -> StoreResult<Page<TicketSummary>>;

    /// OPEN tickets created at or after `since` (quick-create dedup window).
    async fn recent_open_tickets(&self, since: DateTime<Utc>) -> StoreResult<Vec<Ticket>>;

    /// Every ticket of the window's customer inside its date range.
    async fn tickets_in_window(&self, window: &GenerationWindow) -> StoreResult<Vec<Ticket>>;

    /// Tickets linked to an invoice, datetime ascending.
    async fn tickets_for_invoice(&self, id: InvoiceId) -> StoreResult<Vec<Ticket>>;
}

#[async_trait::async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Draw the next invoice number for the plan's year, then persist the
    /// invoice, its lines and the ticket links as one unit with it.
    ///
    /// Numbers already held by an invoice are passed over. On any failure
    /// nothing is written and the invoice counter keeps its value. Fails with
    /// `Conflict` when any ticket is missing or already invoiced, and with
    /// `UniqueViolation` when a concurrent writer took the drawn number.
    async fn create_invoice(
        &self,
        plan: &InvoicePlan,
        id: InvoiceId,
        now: DateTime<Utc>,
    ) -> StoreResult<(Invoice, Vec<InvoiceLine>)>;

    async fn get_invoice(&self, id: InvoiceId) -> StoreResult<Option<Invoice>>;

    async fn invoice_lines(&self, id: InvoiceId) -> StoreResult<Vec<InvoiceLine>>;

    async fn update_invoice(
        &self,
        invoice: &Invoice,
        expected_version: u64,
        void: Option<&InvoiceVoid>,
    ) -> StoreResult<()>;

    async fn invoice_voids(&self, id: InvoiceId) -> StoreResult<Vec<InvoiceVoid>>;

    async fn list_invoices(&self, query: &InvoiceQuery) -> StoreResult<Page<InvoiceSummary>>;
}

#[async_trait::async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn get_customer(&self, id: CustomerId) -> StoreResult<Option<Customer>>;
    async fn get_vehicle(&self, id: VehicleId) -> StoreResult<Option<Vehicle>>;
    async fn get_product(&self, id: ProductId) -> StoreResult<Option<Product>>;
    async fn get_lookup(&self, id: LookupId) -> StoreResult<Option<Lookup>>;

    async fn find_lookup(&self, kind: LookupKind, code: &str) -> StoreResult<Option<Lookup>>;
    async fn list_lookups(&self, kind: LookupKind) -> StoreResult<Vec<Lookup>>;

    async fn customer_code_taken(&self, account_code: &str) -> StoreResult<bool>;
    async fn registration_taken(&self, registration: &str) -> StoreResult<bool>;
    async fn product_code_taken(&self, code: &str) -> StoreResult<bool>;

    async fn insert_customer(&self, customer: &Customer) -> StoreResult<()>;
    async fn insert_vehicle(&self, vehicle: &Vehicle) -> StoreResult<()>;
    async fn insert_product(&self, product: &Product) -> StoreResult<()>;
    async fn insert_lookup(&self, lookup: &Lookup) -> StoreResult<()>;

    /// Check ticket usage and deactivate in one step, so no ticket can start
    /// referencing the row between the check and the write.
    async fn deactivate_lookup(
        &self,
        kind: LookupKind,
        id: LookupId,
        now: DateTime<Utc>,
    ) -> StoreResult<Deactivation>;

    /// Returns `true` when the row changed.
    async fn activate_lookup(
        &self,
        kind: LookupKind,
        id: LookupId,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;
}
