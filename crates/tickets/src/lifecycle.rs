//! Save / complete / void transitions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use weighbridge_core::{Actor, DomainError, DomainResult, LookupId, ValidationErrors};
use weighbridge_reference::{LookupKind, ReferenceSource};

use crate::form::{AppliedDefault, FormIntent, TicketForm, prepare_update};
use crate::status::TicketStatus;
use crate::ticket::{Ticket, TicketVoid};

/// Form action selector (`action` field of the edit form).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketAction {
    #[default]
    Save,
    Complete,
    Void,
}

/// Void request as submitted by the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoidTicket {
    pub void_reason_id: Option<String>,
    pub void_note: Option<String>,
}

impl VoidTicket {
    pub fn reason_id(&self) -> Option<LookupId> {
        self.void_reason_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse().ok())
    }

    pub fn note(&self) -> &str {
        self.void_note.as_deref().map(str::trim).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoidOutcome {
    Voided(TicketVoid),
    AlreadyVoid,
}

impl Ticket {
    /// Apply an edit-form submission to an OPEN ticket.
    pub fn save(
        &mut self,
        form: &TicketForm,
        refs: &impl ReferenceSource,
        max_weight_kg: Decimal,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<AppliedDefault>> {
        self.ensure_unlocked()?;
        let prepared = prepare_update(self, form, refs, FormIntent::Save, max_weight_kg)?;
        self.apply_update(prepared.update, now);
        Ok(prepared.defaults)
    }

    /// Apply the submission and move OPEN → COMPLETE, or change nothing.
    pub fn complete(
        &mut self,
        form: &TicketForm,
        refs: &impl ReferenceSource,
        max_weight_kg: Decimal,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<AppliedDefault>> {
        self.ensure_unlocked()?;
        let prepared = prepare_update(self, form, refs, FormIntent::Complete, max_weight_kg)?;
        self.apply_update(prepared.update, now);
        self.status = TicketStatus::Complete;
        Ok(prepared.defaults)
    }

    /// OPEN/COMPLETE → VOID. Voiding a VOID ticket succeeds without writing anything.
    pub fn void(
        &mut self,
        request: &VoidTicket,
        refs: &impl ReferenceSource,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> DomainResult<VoidOutcome> {
        let mut errors = ValidationErrors::new();
        let raw_reason = request.void_reason_id.as_deref().map(str::trim).unwrap_or("");
        let note = request.note();

        let reason = if raw_reason.is_empty() {
            errors.push("Void reason is required.");
            None
        } else {
            let found = request
                .reason_id()
                .and_then(|id| refs.lookup_of(LookupKind::VoidReason, id));
            if found.is_none() {
                errors.push("Void reason not found.");
            }
            found
        };
        if reason.is_some_and(|r| r.is_other_void_reason()) && note.is_empty() {
            errors.push("Void note is required for 'Other'.");
        }
        errors.into_result()?;

        if self.status == TicketStatus::Void {
            return Ok(VoidOutcome::AlreadyVoid);
        }
        let reason_id = reason
            .map(|r| r.id)
            .ok_or_else(|| DomainError::invariant("void reason missing after validation"))?;

        self.status = TicketStatus::Void;
        self.touch(now);
        Ok(VoidOutcome::Voided(TicketVoid {
            ticket_id: self.id,
            reason_id,
            note: note.to_string(),
            voided_at: now,
            voided_by: actor.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use weighbridge_core::{CustomerId, ProductId, TicketId, VehicleId};
    use weighbridge_reference::{Lookup, Product, ReferenceSnapshot, Vehicle};

    use crate::form::NEGATIVE_NET_MESSAGE;
    use crate::status::Direction;

    fn max() -> Decimal {
        Decimal::from(1_000_000)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    fn open_ticket() -> Ticket {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        Ticket::quick(TicketId::new(), "26-00001".into(), created)
    }

    fn lookup(kind: LookupKind, code: &str, active: bool) -> Lookup {
        Lookup {
            id: LookupId::new(),
            kind,
            code: code.into(),
            description: None,
            rate_percent: None,
            is_active: active,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn vehicle(owner: Option<CustomerId>) -> Vehicle {
        Vehicle {
            id: VehicleId::new(),
            registration: "ABC123".into(),
            owner_customer_id: owner,
            default_tare_kg: None,
            is_active: true,
            created_at: now(),
        }
    }

    fn product(price: Option<Decimal>) -> Product {
        Product {
            id: ProductId::new(),
            code: "P001".into(),
            description: "Test product".into(),
            unit_id: None,
            unit_price: price,
            tax_rate_id: None,
            is_active: true,
            created_at: now(),
        }
    }

    fn base_form() -> TicketForm {
        TicketForm {
            datetime: Some("2026-01-01T10:00".into()),
            direction: Some("INWARD".into()),
            transaction_type: Some("WASTEIN".into()),
            ..TicketForm::default()
        }
    }

    #[test]
    fn save_rejects_tare_before_gross_and_keeps_ticket() {
        let mut t = open_ticket();
        let before = t.clone();
        let form = TicketForm { tare_kg: Some("1200".into()), ..base_form() };
        let err = t.save(&form, &ReferenceSnapshot::new(), max(), now()).unwrap_err();
        assert!(err.messages().contains(&"Weigh-in (gross) is required before tare.".to_string()));
        assert_eq!(t, before);
    }

    #[test]
    fn complete_blocks_negative_net() {
        let v = vehicle(None);
        let p = product(Some(Decimal::from(10)));
        let refs = ReferenceSnapshot::new().with_vehicle(v.clone()).with_product(p.clone());
        let mut t = open_ticket();
        let form = TicketForm {
            gross_kg: Some("1000".into()),
            tare_kg: Some("1500".into()),
            vehicle_id: Some(v.id.to_string()),
            product_id: Some(p.id.to_string()),
            ..base_form()
        };
        let err = t.complete(&form, &refs, max(), now()).unwrap_err();
        assert!(err.messages().contains(&NEGATIVE_NET_MESSAGE.to_string()));
        assert_eq!(t.status, TicketStatus::Open);
        assert_eq!(t.gross_kg, None);
    }

    #[test]
    fn complete_requires_vehicle_product_and_weights() {
        let mut t = open_ticket();
        let err = t.complete(&base_form(), &ReferenceSnapshot::new(), max(), now()).unwrap_err();
        assert_eq!(
            err.messages(),
            vec![
                "Vehicle is required.".to_string(),
                "Product is required.".to_string(),
                "Gross weight is required.".to_string(),
                "Tare weight is required.".to_string(),
            ]
        );
    }

    #[test]
    fn complete_applies_fields_and_defaults() {
        let customer = CustomerId::new();
        let v = vehicle(Some(customer));
        let p = product(Some(Decimal::new(1250, 2)));
        let refs = ReferenceSnapshot::new().with_vehicle(v.clone()).with_product(p.clone());
        let mut t = open_ticket();
        let form = TicketForm {
            gross_kg: Some("15,000".into()),
            tare_kg: Some("5000".into()),
            qty: Some("10".into()),
            vehicle_id: Some(v.id.to_string()),
            product_id: Some(p.id.to_string()),
            ..base_form()
        };
        let defaults = t.complete(&form, &refs, max(), now()).unwrap();
        assert_eq!(t.status, TicketStatus::Complete);
        assert_eq!(t.customer_id, Some(customer));
        assert_eq!(t.net_kg, Some(Decimal::from(10_000)));
        assert_eq!(t.unit_price, Some(Decimal::new(1250, 2)));
        assert_eq!(t.total, Some(Decimal::new(12500, 2)));
        assert_eq!(defaults.len(), 2);
        assert_eq!(t.version, 1);
    }

    #[test]
    fn complete_rejects_inactive_haulier_even_if_unchanged() {
        let h = lookup(LookupKind::Haulier, "H1", false);
        let v = vehicle(None);
        let p = product(None);
        let refs = ReferenceSnapshot::new()
            .with_vehicle(v.clone())
            .with_product(p.clone())
            .with_lookup(h.clone());
        let mut t = open_ticket();
        t.haulier_id = Some(h.id);
        let form = TicketForm {
            gross_kg: Some("2000".into()),
            tare_kg: Some("1000".into()),
            vehicle_id: Some(v.id.to_string()),
            product_id: Some(p.id.to_string()),
            haulier_id: Some(h.id.to_string()),
            ..base_form()
        };
        // Saving with the already-assigned inactive haulier is fine.
        t.clone().save(&form, &refs, max(), now()).unwrap();
        let err = t.complete(&form, &refs, max(), now()).unwrap_err();
        assert_eq!(err.messages(), vec!["Haulier is inactive.".to_string()]);
    }

    #[test]
    fn save_rejects_newly_chosen_inactive_driver() {
        let d = lookup(LookupKind::Driver, "D1", false);
        let refs = ReferenceSnapshot::new().with_lookup(d.clone());
        let mut t = open_ticket();
        let form = TicketForm { driver_id: Some(d.id.to_string()), ..base_form() };
        let err = t.save(&form, &refs, max(), now()).unwrap_err();
        assert_eq!(err.messages(), vec!["Driver is inactive.".to_string()]);
    }

    #[test]
    fn save_reports_form_errors_together() {
        let mut t = open_ticket();
        let form = TicketForm {
            datetime: Some("not a date".into()),
            direction: Some("SIDEWAYS".into()),
            transaction_type: Some("BARTER".into()),
            gross_kg: Some("heavy".into()),
            ..TicketForm::default()
        };
        let err = t.save(&form, &ReferenceSnapshot::new(), max(), now()).unwrap_err();
        assert_eq!(
            err.messages(),
            vec![
                "Date/time must be valid.".to_string(),
                "Direction must be INWARD or OUTWARD.".to_string(),
                "Transaction type is invalid.".to_string(),
                "Gross weight must be a number.".to_string(),
            ]
        );
    }

    #[test]
    fn explicit_unit_price_beats_product_price() {
        let p = product(Some(Decimal::from(99)));
        let refs = ReferenceSnapshot::new().with_product(p.clone());
        let mut t = open_ticket();
        let form = TicketForm {
            product_id: Some(p.id.to_string()),
            qty: Some("2".into()),
            unit_price: Some("5".into()),
            ..base_form()
        };
        let defaults = t.save(&form, &refs, max(), now()).unwrap();
        assert!(defaults.is_empty());
        assert_eq!(t.total, Some(Decimal::new(1000, 2)));
    }

    #[test]
    fn locked_ticket_rejects_save() {
        let mut t = open_ticket();
        t.status = TicketStatus::Complete;
        let before = t.clone();
        let err = t.save(&base_form(), &ReferenceSnapshot::new(), max(), now()).unwrap_err();
        assert_eq!(err, DomainError::locked("Ticket is locked."));
        assert_eq!(t, before);
    }

    #[test]
    fn void_requires_reason() {
        let mut t = open_ticket();
        let actor = Actor::new("clerk").unwrap();
        let err = t
            .void(&VoidTicket::default(), &ReferenceSnapshot::new(), &actor, now())
            .unwrap_err();
        assert_eq!(err.messages(), vec!["Void reason is required.".to_string()]);
        assert_eq!(t.status, TicketStatus::Open);
    }

    #[test]
    fn other_reason_requires_note() {
        let other = lookup(LookupKind::VoidReason, "OTHER", true);
        let refs = ReferenceSnapshot::new().with_lookup(other.clone());
        let mut t = open_ticket();
        let actor = Actor::new("clerk").unwrap();
        let req = VoidTicket { void_reason_id: Some(other.id.to_string()), void_note: None };
        let err = t.void(&req, &refs, &actor, now()).unwrap_err();
        assert_eq!(err.messages(), vec!["Void note is required for 'Other'.".to_string()]);
    }

    #[test]
    fn void_from_complete_records_audit_and_is_idempotent() {
        let reason = lookup(LookupKind::VoidReason, "DUPLICATE_TICKET", true);
        let refs = ReferenceSnapshot::new().with_lookup(reason.clone());
        let mut t = open_ticket();
        t.status = TicketStatus::Complete;
        let actor = Actor::new("clerk").unwrap();
        let req = VoidTicket { void_reason_id: Some(reason.id.to_string()), void_note: None };

        let VoidOutcome::Voided(audit) = t.void(&req, &refs, &actor, now()).unwrap() else {
            panic!("expected a void");
        };
        assert_eq!(t.status, TicketStatus::Void);
        assert_eq!(audit.reason_id, reason.id);
        assert_eq!(audit.voided_by.as_str(), "clerk");

        let version = t.version;
        assert_eq!(t.void(&req, &refs, &actor, now()).unwrap(), VoidOutcome::AlreadyVoid);
        assert_eq!(t.version, version);
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 500, .. ProptestConfig::default() })]

        #[test]
        fn complete_never_succeeds_with_negative_net(gross in 0i64..500_000, extra in 1i64..500_000, outward in any::<bool>()) {
            let v = vehicle(None);
            let p = product(None);
            let refs = ReferenceSnapshot::new().with_vehicle(v.clone()).with_product(p.clone());
            let mut t = open_ticket();
            let form = TicketForm {
                direction: Some(if outward { Direction::Outward } else { Direction::Inward }.to_string()),
                gross_kg: Some(gross.to_string()),
                tare_kg: Some((gross + extra).to_string()),
                vehicle_id: Some(v.id.to_string()),
                product_id: Some(p.id.to_string()),
                ..base_form()
            };
            prop_assert!(t.complete(&form, &refs, max(), now()).is_err());
            prop_assert_eq!(t.status, TicketStatus::Open);
        }

        #[test]
        fn locked_tickets_never_change(gross in 0i64..1_000_000, complete in any::<bool>()) {
            let mut t = open_ticket();
            t.status = if complete { TicketStatus::Complete } else { TicketStatus::Void };
            let before = t.clone();
            let form = TicketForm { gross_kg: Some(gross.to_string()), ..base_form() };
            let refs = ReferenceSnapshot::new();
            prop_assert!(t.save(&form, &refs, max(), now()).is_err());
            prop_assert!(t.complete(&form, &refs, max(), now()).is_err());
            prop_assert_eq!(t, before);
        }
    }
}
