//! Invoicing domain: invoice lifecycle (DRAFT → PAID, → VOID), the ticket
//! eligibility filter, and line/total computation for generation.
//!
//! Deterministic domain logic only (no IO, no HTTP, no storage).

pub mod eligibility;
pub mod generation;
pub mod invoice;
pub mod listing;

pub use eligibility::{
    ExcludedTicket, ExclusionReason, GenerateInvoice, GenerationWindow, exclusion_reason,
    is_invoiceable,
};
pub use generation::{
    DraftLine, InvoicePlan, InvoicePreview, InvoiceTotals, LineAmounts, NOTHING_TO_INVOICE_MESSAGE,
    line_amounts, plan_invoice, preview,
};
pub use invoice::{
    Invoice, InvoiceLine, InvoiceStatus, InvoiceVoid, InvoiceVoidOutcome, MarkPaid, VoidInvoice,
    format_invoice_no,
};
pub use listing::{InvoiceQuery, InvoiceSummary, invoice_list_order};
