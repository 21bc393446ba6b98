use chrono::{DateTime, Datelike, Duration, DurationRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use weighbridge_core::{
    Actor, AggregateRoot, CustomerId, DomainError, DomainResult, InvoiceId, LookupId, ProductId,
    TicketId, VehicleId,
};
use weighbridge_reference::LookupKind;

use crate::status::{Direction, TicketStatus, TransactionType, direction_mismatch};

pub const LOCKED_MESSAGE: &str = "Ticket is locked.";

/// `YY-NNNNN`, e.g. `26-00042`.
pub fn format_ticket_no(year: i32, number: i64) -> String {
    format!("{:02}-{:05}", year.rem_euclid(100), number)
}

/// One weighing transaction.
///
/// Fields are public so stores can hydrate rows; every mutation goes through
/// the methods in this crate, which enforce the lock rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub ticket_no: String,
    /// When the weighing happened (operator editable).
    pub datetime: DateTime<Utc>,
    pub status: TicketStatus,
    pub direction: Direction,
    pub transaction_type: TransactionType,

    pub customer_id: Option<CustomerId>,
    pub vehicle_id: Option<VehicleId>,
    pub product_id: Option<ProductId>,
    pub haulier_id: Option<LookupId>,
    pub driver_id: Option<LookupId>,
    pub container_id: Option<LookupId>,
    pub destination_id: Option<LookupId>,
    pub yard_id: Option<LookupId>,
    pub area_id: Option<LookupId>,
    pub waste_code_id: Option<LookupId>,
    pub waste_producer_id: Option<LookupId>,
    pub licence_id: Option<LookupId>,
    pub invoice_id: Option<InvoiceId>,

    pub gross_kg: Option<Decimal>,
    pub tare_kg: Option<Decimal>,
    pub net_kg: Option<Decimal>,

    pub qty: Option<Decimal>,
    pub unit_id: Option<LookupId>,
    pub unit_price: Option<Decimal>,
    pub total: Option<Decimal>,

    pub dont_invoice: bool,
    pub paid: bool,
    pub payment_method_id: Option<LookupId>,

    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Blank OPEN ticket as produced by the quick-create button.
    pub fn quick(id: TicketId, ticket_no: String, now: DateTime<Utc>) -> Self {
        let datetime = now.duration_trunc(Duration::minutes(1)).unwrap_or(now);
        Self {
            id,
            ticket_no,
            datetime,
            status: TicketStatus::Open,
            direction: Direction::Inward,
            transaction_type: TransactionType::WasteIn,
            customer_id: None,
            vehicle_id: None,
            product_id: None,
            haulier_id: None,
            driver_id: None,
            container_id: None,
            destination_id: None,
            yard_id: None,
            area_id: None,
            waste_code_id: None,
            waste_producer_id: None,
            licence_id: None,
            invoice_id: None,
            gross_kg: None,
            tare_kg: None,
            net_kg: None,
            qty: None,
            unit_id: None,
            unit_price: None,
            total: None,
            dont_invoice: false,
            paid: false,
            payment_method_id: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn year(&self) -> i32 {
        self.created_at.year()
    }

    pub fn is_locked(&self) -> bool {
        self.status.is_locked()
    }

    pub fn ensure_unlocked(&self) -> DomainResult<()> {
        if self.is_locked() {
            return Err(DomainError::locked(LOCKED_MESSAGE));
        }
        Ok(())
    }

    /// Current value of the column that references a lookup of `kind`.
    pub fn lookup_ref(&self, kind: LookupKind) -> Option<LookupId> {
        match kind {
            LookupKind::Haulier => self.haulier_id,
            LookupKind::Driver => self.driver_id,
            LookupKind::Container => self.container_id,
            LookupKind::Destination => self.destination_id,
            LookupKind::Yard => self.yard_id,
            LookupKind::Area => self.area_id,
            LookupKind::WasteCode => self.waste_code_id,
            LookupKind::WasteProducer => self.waste_producer_id,
            LookupKind::Licence => self.licence_id,
            LookupKind::Unit => self.unit_id,
            LookupKind::PaymentMethod => self.payment_method_id,
            LookupKind::TaxRate | LookupKind::VoidReason => None,
        }
    }

    /// All lookup ids this ticket points at.
    pub fn lookup_ids(&self) -> Vec<LookupId> {
        LookupKind::ALL
            .into_iter()
            .filter_map(|kind| self.lookup_ref(kind))
            .collect()
    }

    pub fn references_lookup(&self, id: LookupId) -> bool {
        self.lookup_ids().contains(&id)
    }

    pub fn direction_warning(&self) -> bool {
        direction_mismatch(self.direction, self.transaction_type)
    }

    pub fn negative_net_warning(&self) -> bool {
        negative_net(self.gross_kg, self.tare_kg)
    }

    /// A quick-created ticket nobody has touched yet.
    pub fn is_untouched_quick(&self) -> bool {
        self.status == TicketStatus::Open
            && self.direction == Direction::Inward
            && self.transaction_type == TransactionType::WasteIn
            && self.updated_at == self.created_at
            && self.lookup_ids().is_empty()
            && self.customer_id.is_none()
            && self.vehicle_id.is_none()
            && self.product_id.is_none()
            && self.invoice_id.is_none()
            && self.gross_kg.is_none()
            && self.tare_kg.is_none()
            && self.net_kg.is_none()
            && self.qty.is_none()
            && self.unit_price.is_none()
            && self.total.is_none()
            && !self.dont_invoice
            && !self.paid
    }

    pub(crate) fn recompute_net(&mut self) {
        self.net_kg = net_weight(self.gross_kg, self.tare_kg);
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }
}

impl AggregateRoot for Ticket {
    type Id = TicketId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

pub fn net_weight(gross_kg: Option<Decimal>, tare_kg: Option<Decimal>) -> Option<Decimal> {
    match (gross_kg, tare_kg) {
        (Some(g), Some(t)) => Some(g - t),
        _ => None,
    }
}

pub fn negative_net(gross_kg: Option<Decimal>, tare_kg: Option<Decimal>) -> bool {
    net_weight(gross_kg, tare_kg).is_some_and(|n| n < Decimal::ZERO)
}

/// Append-only audit row written when a ticket is voided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketVoid {
    pub ticket_id: TicketId,
    pub reason_id: LookupId,
    pub note: String,
    pub voided_at: DateTime<Utc>,
    pub voided_by: Actor,
}

/// Pick an existing untouched quick ticket created within `window` of `now`.
pub fn find_duplicate_quick<'a>(
    candidates: impl IntoIterator<Item = &'a Ticket>,
    now: DateTime<Utc>,
    window: Duration,
) -> Option<&'a Ticket> {
    let cutoff = now - window;
    candidates
        .into_iter()
        .filter(|t| t.created_at >= cutoff && t.created_at <= now && t.is_untouched_quick())
        .max_by_key(|t| t.created_at)
}
