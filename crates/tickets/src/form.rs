//! Edit-form pipeline: parse → default-fill → validate → apply.
//!
//! The first three stages are pure and never touch the ticket. Only a fully
//! valid [`TicketUpdate`] reaches [`Ticket::apply_update`].

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use weighbridge_core::{
    CustomerId, DomainResult, LookupId, ProductId, ValidationErrors, VehicleId,
    parse_currency_input, parse_decimal_input, parse_timestamp, parse_weight_kg, round_currency,
};
use weighbridge_reference::{LookupKind, ReferenceSource};

use crate::status::{Direction, TransactionType};
use crate::ticket::{Ticket, net_weight};
use crate::weights::check_capture_order;

pub const NEGATIVE_NET_MESSAGE: &str = "Net weight cannot be negative. Use Swap Weights.";

/// Lookup columns an operator can set from the edit form.
pub const FORM_LOOKUPS: [LookupKind; 10] = [
    LookupKind::Haulier,
    LookupKind::Driver,
    LookupKind::Container,
    LookupKind::Destination,
    LookupKind::Yard,
    LookupKind::Area,
    LookupKind::WasteCode,
    LookupKind::WasteProducer,
    LookupKind::Licence,
    LookupKind::Unit,
];

/// Lookups that must be active when newly chosen (and at completion).
const ACTIVE_REQUIRED: [LookupKind; 4] = [
    LookupKind::Haulier,
    LookupKind::Driver,
    LookupKind::Container,
    LookupKind::Destination,
];

/// Raw edit-form submission. Every value arrives as text; blank means unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketForm {
    pub datetime: Option<String>,
    pub direction: Option<String>,
    pub transaction_type: Option<String>,
    pub customer_id: Option<String>,
    pub vehicle_id: Option<String>,
    pub product_id: Option<String>,
    pub haulier_id: Option<String>,
    pub driver_id: Option<String>,
    pub container_id: Option<String>,
    pub destination_id: Option<String>,
    pub yard_id: Option<String>,
    pub area_id: Option<String>,
    pub waste_code_id: Option<String>,
    pub waste_producer_id: Option<String>,
    pub licence_id: Option<String>,
    pub unit_id: Option<String>,
    pub gross_kg: Option<String>,
    pub tare_kg: Option<String>,
    pub qty: Option<String>,
    pub unit_price: Option<String>,
    pub dont_invoice: bool,
}

impl TicketForm {
    fn lookup_raw(&self, kind: LookupKind) -> Option<&str> {
        let raw = match kind {
            LookupKind::Haulier => &self.haulier_id,
            LookupKind::Driver => &self.driver_id,
            LookupKind::Container => &self.container_id,
            LookupKind::Destination => &self.destination_id,
            LookupKind::Yard => &self.yard_id,
            LookupKind::Area => &self.area_id,
            LookupKind::WasteCode => &self.waste_code_id,
            LookupKind::WasteProducer => &self.waste_producer_id,
            LookupKind::Licence => &self.licence_id,
            LookupKind::Unit => &self.unit_id,
            _ => &None,
        };
        raw.as_deref()
    }

    /// Ids mentioned by the form, parsed leniently, so a caller knows which
    /// reference rows to load before running the pipeline.
    pub fn referenced_ids(&self) -> ReferencedIds {
        ReferencedIds {
            customer_id: lenient_id(self.customer_id.as_deref()),
            vehicle_id: lenient_id(self.vehicle_id.as_deref()),
            product_id: lenient_id(self.product_id.as_deref()),
            lookup_ids: FORM_LOOKUPS
                .iter()
                .filter_map(|k| lenient_id(self.lookup_raw(*k)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferencedIds {
    pub customer_id: Option<CustomerId>,
    pub vehicle_id: Option<VehicleId>,
    pub product_id: Option<ProductId>,
    pub lookup_ids: Vec<LookupId>,
}

fn lenient_id<T: FromStr>(raw: Option<&str>) -> Option<T> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
}

fn blank(raw: &Option<String>) -> bool {
    raw.as_deref().map(str::trim).unwrap_or("").is_empty()
}

/// Stage 1 output: typed values, each `None` when blank or unparsable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedForm {
    pub datetime: Option<DateTime<Utc>>,
    pub direction: Option<Direction>,
    pub transaction_type: Option<TransactionType>,
    pub customer_id: Option<CustomerId>,
    pub vehicle_id: Option<VehicleId>,
    pub product_id: Option<ProductId>,
    pub lookups: BTreeMap<LookupKind, LookupId>,
    pub gross_kg: Option<Decimal>,
    pub tare_kg: Option<Decimal>,
    pub qty: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub dont_invoice: bool,
}

fn parse_id<T: FromStr>(raw: Option<&str>, label: &str, errors: &mut ValidationErrors) -> Option<T> {
    let raw = raw.map(str::trim).unwrap_or("");
    if raw.is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(id) => Some(id),
        Err(_) => {
            errors.push(format!("{label} is invalid."));
            None
        }
    }
}

fn collect<T>(result: DomainResult<Option<T>>, errors: &mut ValidationErrors) -> Option<T> {
    match result {
        Ok(v) => v,
        Err(e) => {
            errors.extend(ValidationErrors::from(e.messages()));
            None
        }
    }
}

/// Stage 1: turn text into typed values, collecting every problem.
pub fn parse_form(form: &TicketForm, max_weight_kg: Decimal) -> (ParsedForm, ValidationErrors) {
    let mut errors = ValidationErrors::new();
    let mut parsed = ParsedForm {
        dont_invoice: form.dont_invoice,
        ..ParsedForm::default()
    };

    if blank(&form.datetime) {
        errors.push("Date/time is required.");
    } else {
        parsed.datetime = form.datetime.as_deref().and_then(parse_timestamp);
        if parsed.datetime.is_none() {
            errors.push("Date/time must be valid.");
        }
    }

    if blank(&form.direction) {
        errors.push("Direction is required.");
    } else {
        parsed.direction = collect(
            form.direction.as_deref().unwrap_or("").parse::<Direction>().map(Some),
            &mut errors,
        );
    }

    if blank(&form.transaction_type) {
        errors.push("Transaction type is required.");
    } else {
        parsed.transaction_type = collect(
            form.transaction_type
                .as_deref()
                .unwrap_or("")
                .parse::<TransactionType>()
                .map(Some),
            &mut errors,
        );
    }

    parsed.customer_id = parse_id(form.customer_id.as_deref(), "Customer", &mut errors);
    parsed.vehicle_id = parse_id(form.vehicle_id.as_deref(), "Vehicle", &mut errors);
    parsed.product_id = parse_id(form.product_id.as_deref(), "Product", &mut errors);
    for kind in FORM_LOOKUPS {
        if let Some(id) = parse_id(form.lookup_raw(kind), kind.label(), &mut errors) {
            parsed.lookups.insert(kind, id);
        }
    }

    parsed.gross_kg = collect(
        parse_weight_kg(form.gross_kg.as_deref().unwrap_or(""), "Gross weight", max_weight_kg),
        &mut errors,
    );
    parsed.tare_kg = collect(
        parse_weight_kg(form.tare_kg.as_deref().unwrap_or(""), "Tare weight", max_weight_kg),
        &mut errors,
    );

    match parse_decimal_input(form.qty.as_deref().unwrap_or(""), "Quantity") {
        Ok(Some(q)) if q < Decimal::ZERO => errors.push("Quantity must be zero or greater."),
        Ok(q) => {
            parsed.qty = q.map(|q| q.round_dp_with_strategy(3, RoundingStrategy::MidpointAwayFromZero))
        }
        Err(e) => errors.extend(ValidationErrors::from(e.messages())),
    }
    parsed.unit_price = collect(
        parse_currency_input(form.unit_price.as_deref().unwrap_or(""), "Unit price"),
        &mut errors,
    );

    (parsed, errors)
}

/// A value filled in from reference data rather than typed by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum AppliedDefault {
    CustomerFromVehicle { customer_id: CustomerId },
    UnitPriceFromProduct { unit_price: Decimal },
}

/// Stage 2: fill gaps from the chosen vehicle and product.
pub fn fill_defaults(parsed: &mut ParsedForm, refs: &impl ReferenceSource) -> Vec<AppliedDefault> {
    let mut applied = Vec::new();

    if parsed.customer_id.is_none() {
        let owner = parsed
            .vehicle_id
            .and_then(|id| refs.vehicle(id))
            .and_then(|v| v.owner_customer_id);
        if let Some(customer_id) = owner {
            parsed.customer_id = Some(customer_id);
            applied.push(AppliedDefault::CustomerFromVehicle { customer_id });
        }
    }

    if parsed.unit_price.is_none() {
        let price = parsed
            .product_id
            .and_then(|id| refs.product(id))
            .and_then(|p| p.unit_price);
        if let Some(unit_price) = price {
            parsed.unit_price = Some(unit_price);
            applied.push(AppliedDefault::UnitPriceFromProduct { unit_price });
        }
    }

    applied
}

/// What the submission is trying to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormIntent {
    Save,
    Complete,
}

/// Stage 3: business validation against the current ticket and reference rows.
pub fn validate(
    ticket: &Ticket,
    parsed: &ParsedForm,
    refs: &impl ReferenceSource,
    intent: FormIntent,
) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    if let Some(id) = parsed.customer_id {
        if refs.customer(id).is_none() {
            errors.push("Customer not found.");
        }
    }
    if let Some(id) = parsed.vehicle_id {
        if refs.vehicle(id).is_none() {
            errors.push("Vehicle not found.");
        }
    }
    if let Some(id) = parsed.product_id {
        if refs.product(id).is_none() {
            errors.push("Product not found.");
        }
    }

    for (&kind, &id) in &parsed.lookups {
        let Some(row) = refs.lookup_of(kind, id) else {
            errors.push(format!("{} not found.", kind.label()));
            continue;
        };
        if !ACTIVE_REQUIRED.contains(&kind) || row.is_active {
            continue;
        }
        let changed = ticket.lookup_ref(kind) != Some(id);
        if intent == FormIntent::Complete || changed {
            errors.push(format!("{} is inactive.", kind.label()));
        }
    }

    let mut ordering_ok = true;
    if let Some(direction) = parsed.direction {
        if let Err(e) = check_capture_order(direction, parsed.gross_kg, parsed.tare_kg) {
            ordering_ok = false;
            errors.extend(ValidationErrors::from(e.messages()));
        }
    }

    if intent == FormIntent::Complete {
        if parsed.vehicle_id.is_none() {
            errors.push("Vehicle is required.");
        }
        if parsed.product_id.is_none() {
            errors.push("Product is required.");
        }
        if ordering_ok {
            if parsed.gross_kg.is_none() {
                errors.push("Gross weight is required.");
            }
            if parsed.tare_kg.is_none() {
                errors.push("Tare weight is required.");
            }
        }
        if net_weight(parsed.gross_kg, parsed.tare_kg).is_some_and(|n| n < Decimal::ZERO) {
            errors.push(NEGATIVE_NET_MESSAGE);
        }
    }

    errors
}

/// Fully validated set of editable values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketUpdate {
    pub datetime: DateTime<Utc>,
    pub direction: Direction,
    pub transaction_type: TransactionType,
    pub customer_id: Option<CustomerId>,
    pub vehicle_id: Option<VehicleId>,
    pub product_id: Option<ProductId>,
    pub lookups: BTreeMap<LookupKind, LookupId>,
    pub gross_kg: Option<Decimal>,
    pub tare_kg: Option<Decimal>,
    pub qty: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub dont_invoice: bool,
}

impl TicketUpdate {
    pub fn total(&self) -> Option<Decimal> {
        match (self.qty, self.unit_price) {
            (Some(q), Some(p)) => Some(round_currency(q * p)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedUpdate {
    pub update: TicketUpdate,
    pub defaults: Vec<AppliedDefault>,
}

/// Run stages 1-3. Nothing is mutated; on success the caller applies the update.
pub fn prepare_update(
    ticket: &Ticket,
    form: &TicketForm,
    refs: &impl ReferenceSource,
    intent: FormIntent,
    max_weight_kg: Decimal,
) -> DomainResult<PreparedUpdate> {
    let (mut parsed, mut errors) = parse_form(form, max_weight_kg);
    let defaults = fill_defaults(&mut parsed, refs);
    errors.extend(validate(ticket, &parsed, refs, intent));
    errors.into_result()?;

    let (Some(datetime), Some(direction), Some(transaction_type)) =
        (parsed.datetime, parsed.direction, parsed.transaction_type)
    else {
        return Err(weighbridge_core::DomainError::invariant(
            "required form values missing after validation",
        ));
    };

    Ok(PreparedUpdate {
        update: TicketUpdate {
            datetime,
            direction,
            transaction_type,
            customer_id: parsed.customer_id,
            vehicle_id: parsed.vehicle_id,
            product_id: parsed.product_id,
            lookups: parsed.lookups,
            gross_kg: parsed.gross_kg,
            tare_kg: parsed.tare_kg,
            qty: parsed.qty,
            unit_price: parsed.unit_price,
            dont_invoice: parsed.dont_invoice,
        },
        defaults,
    })
}

impl Ticket {
    /// Stage 4: single mutation step.
    pub(crate) fn apply_update(&mut self, update: TicketUpdate, now: DateTime<Utc>) {
        let total = update.total();
        let lookup = |kind| update.lookups.get(&kind).copied();

        self.datetime = update.datetime;
        self.direction = update.direction;
        self.transaction_type = update.transaction_type;
        self.customer_id = update.customer_id;
        self.vehicle_id = update.vehicle_id;
        self.product_id = update.product_id;
        self.haulier_id = lookup(LookupKind::Haulier);
        self.driver_id = lookup(LookupKind::Driver);
        self.container_id = lookup(LookupKind::Container);
        self.destination_id = lookup(LookupKind::Destination);
        self.yard_id = lookup(LookupKind::Yard);
        self.area_id = lookup(LookupKind::Area);
        self.waste_code_id = lookup(LookupKind::WasteCode);
        self.waste_producer_id = lookup(LookupKind::WasteProducer);
        self.licence_id = lookup(LookupKind::Licence);
        self.unit_id = lookup(LookupKind::Unit);
        self.gross_kg = update.gross_kg;
        self.tare_kg = update.tare_kg;
        self.qty = update.qty;
        self.unit_price = update.unit_price;
        self.total = total;
        self.dont_invoice = update.dont_invoice;
        self.recompute_net();
        self.touch(now);
    }
}
