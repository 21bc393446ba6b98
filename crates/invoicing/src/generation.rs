//! Line and total computation for invoice generation and its dry-run preview.
//!
//! Everything here is pure: callers load the candidate tickets and reference
//! rows, and persist the resulting [`InvoicePlan`] in one transaction.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use weighbridge_core::{
    CustomerId, DomainError, DomainResult, InvoiceId, TicketId, round_currency,
};
use weighbridge_reference::{LookupKind, ReferenceSource};
use weighbridge_tickets::Ticket;

use crate::eligibility::{ExcludedTicket, GenerationWindow, exclusion_reason};
use crate::invoice::{Invoice, InvoiceLine, InvoiceStatus};

pub const NOTHING_TO_INVOICE_MESSAGE: &str = "No invoiceable tickets found.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineAmounts {
    pub net: Decimal,
    pub vat: Decimal,
    pub gross: Decimal,
}

/// `net = round(total)`, `vat = round(net * rate / 100)`, `gross = net + vat`.
pub fn line_amounts(total: Decimal, rate_percent: Option<Decimal>) -> LineAmounts {
    let net = round_currency(total);
    let vat = match rate_percent {
        Some(rate) => round_currency(net * rate / Decimal::ONE_HUNDRED),
        None => round_currency(Decimal::ZERO),
    };
    LineAmounts { net, vat, gross: round_currency(net + vat) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub net_total: Decimal,
    pub vat_total: Decimal,
    pub gross_total: Decimal,
}

impl InvoiceTotals {
    /// Sums are rounded separately; gross is always `net + vat`.
    pub fn from_amounts<'a>(amounts: impl IntoIterator<Item = &'a LineAmounts>) -> Self {
        let (net, vat) = amounts
            .into_iter()
            .fold((Decimal::ZERO, Decimal::ZERO), |(n, v), a| (n + a.net, v + a.vat));
        let net_total = round_currency(net);
        let vat_total = round_currency(vat);
        Self { net_total, vat_total, gross_total: round_currency(net_total + vat_total) }
    }
}

/// A line before it belongs to a persisted invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftLine {
    pub ticket_id: TicketId,
    pub ticket_no: String,
    pub datetime: DateTime<Utc>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub rate_percent: Option<Decimal>,
    #[serde(flatten)]
    pub amounts: LineAmounts,
}

impl DraftLine {
    pub fn for_ticket(ticket: &Ticket, refs: &impl ReferenceSource) -> Self {
        let product = ticket.product_id.and_then(|id| refs.product(id));
        let description = match product {
            Some(p) => format!("Ticket {} - {}", ticket.ticket_no, p.description),
            None => format!("Ticket {}", ticket.ticket_no),
        };
        let rate_percent = product
            .and_then(|p| p.tax_rate_id)
            .and_then(|id| refs.lookup_of(LookupKind::TaxRate, id))
            .and_then(|l| l.rate_percent);
        let total = ticket.total.unwrap_or(Decimal::ZERO);

        Self {
            ticket_id: ticket.id,
            ticket_no: ticket.ticket_no.clone(),
            datetime: ticket.datetime,
            description,
            quantity: ticket.qty.unwrap_or(Decimal::ZERO),
            unit_price: ticket.unit_price.unwrap_or(Decimal::ZERO),
            rate_percent,
            amounts: line_amounts(total, rate_percent),
        }
    }
}

/// Dry-run result: nothing is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePreview {
    pub window: GenerationWindow,
    pub included: Vec<DraftLine>,
    pub excluded: Vec<ExcludedTicket>,
    pub totals: InvoiceTotals,
}

fn chronological(a: &&Ticket, b: &&Ticket) -> core::cmp::Ordering {
    a.datetime
        .cmp(&b.datetime)
        .then_with(|| a.ticket_no.cmp(&b.ticket_no))
}

/// Classify every candidate inside the window; tickets outside it are ignored.
pub fn preview(
    window: &GenerationWindow,
    candidates: &[Ticket],
    refs: &impl ReferenceSource,
) -> InvoicePreview {
    let mut in_window: Vec<&Ticket> = candidates.iter().filter(|t| window.covers(t)).collect();
    in_window.sort_by(chronological);

    let mut included = Vec::new();
    let mut excluded = Vec::new();
    for ticket in in_window {
        match exclusion_reason(ticket) {
            None => included.push(DraftLine::for_ticket(ticket, refs)),
            Some(reason) => excluded.push(ExcludedTicket::new(ticket, reason)),
        }
    }
    let totals = InvoiceTotals::from_amounts(included.iter().map(|l| &l.amounts));

    InvoicePreview { window: *window, included, excluded, totals }
}

/// Lines and totals for a new invoice, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePlan {
    pub customer_id: CustomerId,
    pub invoice_date: NaiveDate,
    pub lines: Vec<DraftLine>,
    pub totals: InvoiceTotals,
}

impl InvoicePlan {
    pub fn ticket_ids(&self) -> Vec<TicketId> {
        self.lines.iter().map(|l| l.ticket_id).collect()
    }

    /// Materialise the DRAFT invoice and its numbered lines.
    pub fn build(
        &self,
        id: InvoiceId,
        invoice_no: String,
        now: DateTime<Utc>,
    ) -> (Invoice, Vec<InvoiceLine>) {
        let invoice = Invoice {
            id,
            invoice_no,
            customer_id: self.customer_id,
            invoice_date: self.invoice_date,
            status: InvoiceStatus::Draft,
            net_total: self.totals.net_total,
            vat_total: self.totals.vat_total,
            gross_total: self.totals.gross_total,
            payment_method_id: None,
            paid_at: None,
            paid_by: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        let lines = self
            .lines
            .iter()
            .zip(1u32..)
            .map(|(line, line_no)| InvoiceLine {
                invoice_id: id,
                line_no,
                ticket_id: Some(line.ticket_id),
                description: line.description.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
                net: line.amounts.net,
                vat: line.amounts.vat,
                gross: line.amounts.gross,
            })
            .collect();
        (invoice, lines)
    }
}

/// Eligible tickets (datetime ascending) become lines; fails when none qualify.
pub fn plan_invoice(
    window: &GenerationWindow,
    candidates: &[Ticket],
    refs: &impl ReferenceSource,
    invoice_date: NaiveDate,
) -> DomainResult<InvoicePlan> {
    let InvoicePreview { included, totals, .. } = preview(window, candidates, refs);
    if included.is_empty() {
        return Err(DomainError::validation(NOTHING_TO_INVOICE_MESSAGE));
    }
    Ok(InvoicePlan {
        customer_id: window.customer_id,
        invoice_date,
        lines: included,
        totals,
    })
}
