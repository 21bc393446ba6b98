use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use weighbridge_core::{
    Actor, AggregateRoot, CustomerId, DomainError, DomainResult, InvoiceId, LookupId, TicketId,
    ValidationErrors, parse_timestamp,
};
use weighbridge_reference::{LookupKind, ReferenceSource};

/// `INV-YY-NNNNN`, e.g. `INV-26-00007`.
pub fn format_invoice_no(year: i32, number: i64) -> String {
    format!("INV-{:02}-{:05}", year.rem_euclid(100), number)
}

/// Invoice status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvoiceStatus {
    Draft,
    Paid,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "DRAFT",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Void => "VOID",
        }
    }
}

impl core::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for InvoiceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "DRAFT" => Ok(InvoiceStatus::Draft),
            "PAID" => Ok(InvoiceStatus::Paid),
            "VOID" => Ok(InvoiceStatus::Void),
            other => Err(DomainError::invariant(format!("unknown invoice status {other}"))),
        }
    }
}

/// Billing document for one customer.
///
/// Totals are fixed at generation time and never recomputed, not even on void.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub invoice_no: String,
    pub customer_id: CustomerId,
    pub invoice_date: NaiveDate,
    pub status: InvoiceStatus,
    pub net_total: Decimal,
    pub vat_total: Decimal,
    pub gross_total: Decimal,
    pub payment_method_id: Option<LookupId>,
    pub paid_at: Option<DateTime<Utc>>,
    pub paid_by: Option<Actor>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Immutable line, one per invoiced ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub invoice_id: InvoiceId,
    pub line_no: u32,
    pub ticket_id: Option<TicketId>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub net: Decimal,
    pub vat: Decimal,
    pub gross: Decimal,
}

/// Append-only audit row written when an invoice is voided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceVoid {
    pub invoice_id: InvoiceId,
    pub reason_id: LookupId,
    pub note: String,
    pub voided_at: DateTime<Utc>,
    pub voided_by: Actor,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkPaid {
    pub payment_method_id: Option<String>,
    pub paid_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoidInvoice {
    pub void_reason_id: Option<String>,
    pub void_note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoiceVoidOutcome {
    Voided(InvoiceVoid),
    AlreadyVoid,
}

fn trimmed(v: &Option<String>) -> &str {
    v.as_deref().map(str::trim).unwrap_or("")
}

impl Invoice {
    pub fn year(&self) -> i32 {
        self.invoice_date.year()
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }

    /// DRAFT → PAID.
    pub fn mark_paid(
        &mut self,
        request: &MarkPaid,
        refs: &impl ReferenceSource,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        match self.status {
            InvoiceStatus::Void => return Err(DomainError::validation("Invoice is void.")),
            InvoiceStatus::Paid => return Err(DomainError::validation("Invoice is already paid.")),
            InvoiceStatus::Draft => {}
        }

        let method_raw = trimmed(&request.payment_method_id);
        let paid_at_raw = trimmed(&request.paid_at);
        if method_raw.is_empty() || paid_at_raw.is_empty() {
            return Err(DomainError::validation("Payment method and paid date are required."));
        }

        let mut errors = ValidationErrors::new();
        let paid_at = parse_timestamp(paid_at_raw);
        if paid_at.is_none() {
            errors.push("Paid date must be valid.");
        }
        let method = method_raw
            .parse::<LookupId>()
            .ok()
            .and_then(|id| refs.lookup_of(LookupKind::PaymentMethod, id));
        match method {
            None => errors.push("Payment method not found."),
            Some(m) if !m.is_active => errors.push("Payment method is inactive."),
            Some(_) => {}
        }
        errors.into_result()?;

        let (Some(paid_at), Some(method)) = (paid_at, method) else {
            return Err(DomainError::invariant("payment details missing after validation"));
        };
        self.status = InvoiceStatus::Paid;
        self.payment_method_id = Some(method.id);
        self.paid_at = Some(paid_at);
        self.paid_by = Some(actor.clone());
        self.touch(now);
        Ok(())
    }

    /// DRAFT/PAID → VOID. Ticket links and totals are left as they were.
    pub fn void(
        &mut self,
        request: &VoidInvoice,
        refs: &impl ReferenceSource,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> DomainResult<InvoiceVoidOutcome> {
        let mut errors = ValidationErrors::new();
        let reason_raw = trimmed(&request.void_reason_id);
        let note = trimmed(&request.void_note);

        let mut reason = None;
        if reason_raw.is_empty() {
            errors.push("Void reason is required.");
        } else {
            reason = reason_raw
                .parse::<LookupId>()
                .ok()
                .and_then(|id| refs.lookup_of(LookupKind::VoidReason, id));
            if reason.is_none() {
                errors.push("Void reason not found.");
            }
        }
        if note.is_empty() {
            errors.push("Void note is required.");
        }
        errors.into_result()?;

        if self.status == InvoiceStatus::Void {
            return Ok(InvoiceVoidOutcome::AlreadyVoid);
        }
        let reason_id = reason
            .map(|r| r.id)
            .ok_or_else(|| DomainError::invariant("void reason missing after validation"))?;

        self.status = InvoiceStatus::Void;
        self.touch(now);
        Ok(InvoiceVoidOutcome::Voided(InvoiceVoid {
            invoice_id: self.id,
            reason_id,
            note: note.to_string(),
            voided_at: now,
            voided_by: actor.clone(),
        }))
    }
}
