//! Which tickets may go onto a new invoice, and why the others may not.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use weighbridge_core::{CustomerId, DomainError, DomainResult, TicketId, ValidationErrors, parse_date};
use weighbridge_tickets::{Ticket, TicketStatus};

/// Raw generation/preview request as submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateInvoice {
    pub customer_id: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

/// Validated customer + date range. Missing bounds are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationWindow {
    pub customer_id: CustomerId,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

fn non_blank(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl GenerateInvoice {
    pub fn validate(&self) -> DomainResult<GenerationWindow> {
        let mut errors = ValidationErrors::new();

        let customer_id = match non_blank(&self.customer_id) {
            None => {
                errors.push("Customer is required.");
                None
            }
            Some(raw) => match raw.parse::<CustomerId>() {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.push("Customer is invalid.");
                    None
                }
            },
        };

        let mut date = |raw: &Option<String>, message: &str| match non_blank(raw) {
            None => None,
            Some(raw) => {
                let parsed = parse_date(raw);
                if parsed.is_none() {
                    errors.push(message);
                }
                parsed
            }
        };
        let date_from = date(&self.date_from, "Start date must be valid.");
        let date_to = date(&self.date_to, "End date must be valid.");

        if let (Some(from), Some(to)) = (date_from, date_to) {
            if from > to {
                errors.push("Start date must be on or before end date.");
            }
        }
        errors.into_result()?;

        let customer_id = customer_id
            .ok_or_else(|| DomainError::invariant("customer missing after validation"))?;
        Ok(GenerationWindow { customer_id, date_from, date_to })
    }
}

impl GenerationWindow {
    pub fn from_instant(&self) -> Option<DateTime<Utc>> {
        self.date_from
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|n| n.and_utc())
    }

    /// Exclusive: midnight after `date_to`.
    pub fn until_instant(&self) -> Option<DateTime<Utc>> {
        self.date_to
            .and_then(|d| d.succ_opt())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|n| n.and_utc())
    }

    /// Customer and date range only; status and amounts are judged by
    /// [`exclusion_reason`].
    pub fn covers(&self, ticket: &Ticket) -> bool {
        ticket.customer_id == Some(self.customer_id)
            && self.from_instant().is_none_or(|from| ticket.datetime >= from)
            && self.until_instant().is_none_or(|until| ticket.datetime < until)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    Voided,
    NotComplete,
    DontInvoice,
    AlreadyInvoiced,
    MissingQuantityOrPrice,
    ZeroTotal,
}

impl ExclusionReason {
    pub fn label(self) -> &'static str {
        match self {
            ExclusionReason::Voided => "Voided",
            ExclusionReason::NotComplete => "Not complete",
            ExclusionReason::DontInvoice => "Don't invoice",
            ExclusionReason::AlreadyInvoiced => "Already invoiced",
            ExclusionReason::MissingQuantityOrPrice => "Missing quantity or price",
            ExclusionReason::ZeroTotal => "Zero total",
        }
    }
}

impl core::fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

/// First failing filter, or `None` when the ticket is invoiceable.
pub fn exclusion_reason(ticket: &Ticket) -> Option<ExclusionReason> {
    match ticket.status {
        TicketStatus::Void => return Some(ExclusionReason::Voided),
        TicketStatus::Open => return Some(ExclusionReason::NotComplete),
        TicketStatus::Complete => {}
    }
    if ticket.dont_invoice {
        return Some(ExclusionReason::DontInvoice);
    }
    if ticket.invoice_id.is_some() {
        return Some(ExclusionReason::AlreadyInvoiced);
    }
    let qty_ok = ticket.qty.is_some_and(|q| q > Decimal::ZERO);
    let price_ok = ticket.unit_price.is_some_and(|p| p >= Decimal::ZERO);
    if !qty_ok || !price_ok {
        return Some(ExclusionReason::MissingQuantityOrPrice);
    }
    if !ticket.total.is_some_and(|t| t > Decimal::ZERO) {
        return Some(ExclusionReason::ZeroTotal);
    }
    None
}

pub fn is_invoiceable(ticket: &Ticket) -> bool {
    exclusion_reason(ticket).is_none()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedTicket {
    pub ticket_id: TicketId,
    pub ticket_no: String,
    pub datetime: DateTime<Utc>,
    pub reason: ExclusionReason,
    pub reason_label: String,
}

impl ExcludedTicket {
    pub fn new(ticket: &Ticket, reason: ExclusionReason) -> Self {
        Self {
            ticket_id: ticket.id,
            ticket_no: ticket.ticket_no.clone(),
            datetime: ticket.datetime,
            reason,
            reason_label: reason.label().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use weighbridge_core::InvoiceId;

    fn complete_ticket(customer: CustomerId, day: u32) -> Ticket {
        let at = Utc.with_ymd_and_hms(2026, 3, day, 10, 0, 0).unwrap();
        let mut t = Ticket::quick(TicketId::new(), format!("26-{day:05}"), at);
        t.status = TicketStatus::Complete;
        t.customer_id = Some(customer);
        t.qty = Some(Decimal::from(2));
        t.unit_price = Some(Decimal::new(5000, 2));
        t.total = Some(Decimal::new(10000, 2));
        t
    }

    #[test]
    fn request_requires_customer() {
        let err = GenerateInvoice::default().validate().unwrap_err();
        assert_eq!(err.messages(), vec!["Customer is required.".to_string()]);
    }

    #[test]
    fn request_rejects_bad_and_reversed_dates() {
        let customer = CustomerId::new().to_string();
        let err = GenerateInvoice {
            customer_id: Some(customer.clone()),
            date_from: Some("2026-02-30".into()),
            date_to: Some("soon".into()),
        }
        .validate()
        .unwrap_err();
        assert_eq!(
            err.messages(),
            vec!["Start date must be valid.".to_string(), "End date must be valid.".to_string()]
        );

        let err = GenerateInvoice {
            customer_id: Some(customer),
            date_from: Some("2026-03-10".into()),
            date_to: Some("2026-03-01".into()),
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.messages(), vec!["Start date must be on or before end date.".to_string()]);
    }

    #[test]
    fn window_includes_whole_end_day() {
        let customer = CustomerId::new();
        let window = GenerationWindow {
            customer_id: customer,
            date_from: NaiveDate::from_ymd_opt(2026, 3, 2),
            date_to: NaiveDate::from_ymd_opt(2026, 3, 3),
        };
        let mut late = complete_ticket(customer, 3);
        late.datetime = Utc.with_ymd_and_hms(2026, 3, 3, 23, 59, 0).unwrap();
        assert!(window.covers(&late));
        assert!(!window.covers(&complete_ticket(customer, 1)));
        assert!(!window.covers(&complete_ticket(customer, 4)));
        assert!(!window.covers(&complete_ticket(CustomerId::new(), 2)));
    }

    #[test]
    fn exclusion_reasons_in_order() {
        let customer = CustomerId::new();
        let ok = complete_ticket(customer, 1);
        assert_eq!(exclusion_reason(&ok), None);

        let mut t = ok.clone();
        t.status = TicketStatus::Void;
        t.dont_invoice = true;
        assert_eq!(exclusion_reason(&t), Some(ExclusionReason::Voided));

        let mut t = ok.clone();
        t.status = TicketStatus::Open;
        assert_eq!(exclusion_reason(&t), Some(ExclusionReason::NotComplete));

        let mut t = ok.clone();
        t.dont_invoice = true;
        assert_eq!(exclusion_reason(&t), Some(ExclusionReason::DontInvoice));

        let mut t = ok.clone();
        t.invoice_id = Some(InvoiceId::new());
        assert_eq!(exclusion_reason(&t), Some(ExclusionReason::AlreadyInvoiced));

        let mut t = ok.clone();
        t.qty = Some(Decimal::ZERO);
        assert_eq!(exclusion_reason(&t), Some(ExclusionReason::MissingQuantityOrPrice));

        let mut t = ok.clone();
        t.unit_price = None;
        assert_eq!(exclusion_reason(&t), Some(ExclusionReason::MissingQuantityOrPrice));

        let mut t = ok;
        t.total = Some(Decimal::ZERO);
        assert_eq!(exclusion_reason(&t), Some(ExclusionReason::ZeroTotal));
        assert_eq!(ExclusionReason::ZeroTotal.to_string(), "Zero total");
    }
}
