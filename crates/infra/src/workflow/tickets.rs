//! Ticket workflows: quick-create, edit-form actions, weight capture and the
//! readout previews.

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use weighbridge_core::{Actor, DomainError, LookupId, ProductId, TicketId};
use weighbridge_reference::{ProductDefaults, product_defaults};
use weighbridge_tickets::{
    AppliedDefault, DisplayedWeights, Page, Ticket, TicketAction, TicketForm, TicketQuery,
    TicketVoid, VoidOutcome, VoidTicket, WeightLeg, WeightPanel, apply_readout,
    find_duplicate_quick, format_ticket_no, parse_readout, preview_swap, read_weight,
};

use super::{MAX_NUMBER_ATTEMPTS, Services, WorkflowError, WorkflowResult, check_expected};
use crate::indicator::resolve_readout;
use crate::store::{SequenceKind, StoreError, TicketSummary};

/// Result of a quick-create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuickCreated {
    pub ticket: Ticket,
    /// `false` when an untouched ticket from the dedup window was returned.
    pub created: bool,
}

/// Non-blocking flags shown next to a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketWarnings {
    pub direction_mismatch: bool,
    pub negative_net: bool,
}

impl TicketWarnings {
    pub fn for_ticket(ticket: &Ticket) -> Self {
        Self {
            direction_mismatch: ticket.direction_warning(),
            negative_net: ticket.negative_net_warning(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketView {
    pub ticket: Ticket,
    pub warnings: TicketWarnings,
    pub voids: Vec<TicketVoid>,
}

/// Edit-form submission: the action selector plus every form field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TicketSubmission {
    pub action: TicketAction,
    #[serde(flatten)]
    pub form: TicketForm,
    #[serde(flatten)]
    pub void: VoidTicket,
    pub expected_version: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketOutcome {
    pub ticket: Ticket,
    pub warnings: TicketWarnings,
    /// Values filled from the vehicle/product rather than typed.
    pub defaults: Vec<AppliedDefault>,
    /// The ticket was already VOID; nothing was written.
    pub already_void: bool,
}

impl TicketOutcome {
    fn new(ticket: Ticket, defaults: Vec<AppliedDefault>, already_void: bool) -> Self {
        Self { warnings: TicketWarnings::for_ticket(&ticket), ticket, defaults, already_void }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CaptureWeight {
    pub weight_kg: Option<String>,
    pub expected_version: Option<u64>,
}

/// Readout preview request. `target` is only read by the apply variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReadoutRequest {
    pub readout: Option<String>,
    #[serde(flatten)]
    pub displayed: DisplayedWeights,
    pub target: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProductDefaultsQuery {
    pub product_id: Option<String>,
    pub unit_id: Option<String>,
    pub unit_price: Option<String>,
}

fn parse_optional<T: core::str::FromStr>(raw: Option<&str>) -> Option<T> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
}

impl Services {
    async fn load_ticket(&self, id: TicketId) -> WorkflowResult<Ticket> {
        self.tickets
            .get_ticket(id)
            .await?
            .ok_or_else(WorkflowError::not_found)
    }

    /// New OPEN ticket, or the untouched one created moments ago.
    ///
    /// A number collision on insert draws a fresh number.
    #[instrument(skip(self), err)]
    pub async fn quick_create_ticket(&self) -> WorkflowResult<QuickCreated> {
        let now = self.clock.now();
        let window = self.settings.dedup_window();

        let recent = self.tickets.recent_open_tickets(now - window).await?;
        if let Some(existing) = find_duplicate_quick(&recent, now, window) {
            debug!(ticket_no = %existing.ticket_no, "returning ticket from dedup window");
            return Ok(QuickCreated { ticket: existing.clone(), created: false });
        }

        let year = now.year();
        for attempt in 1..=MAX_NUMBER_ATTEMPTS {
            let number = self.sequences.next_number(SequenceKind::Ticket, year).await?;
            let ticket = Ticket::quick(TicketId::new(), format_ticket_no(year, number), now);
            match self.tickets.insert_ticket(&ticket).await {
                Ok(()) => {
                    info!(ticket_id = %ticket.id, ticket_no = %ticket.ticket_no, "ticket created");
                    return Ok(QuickCreated { ticket, created: true });
                }
                Err(StoreError::UniqueViolation(msg)) => {
                    debug!(attempt, %msg, "ticket number taken, drawing another");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(WorkflowError::Failed("Could not allocate a ticket number.".into()))
    }

    #[instrument(skip(self), fields(ticket_id = %id), err)]
    pub async fn view_ticket(&self, id: TicketId) -> WorkflowResult<TicketView> {
        let ticket = self.load_ticket(id).await?;
        let voids = self.tickets.ticket_voids(id).await?;
        Ok(TicketView { warnings: TicketWarnings::for_ticket(&ticket), ticket, voids })
    }

    pub async fn list_tickets(&self, query: &TicketQuery) -> WorkflowResult<Page<TicketSummary>> {
        Ok(self.tickets.list_tickets(query).await?)
    }

    /// Run the save / complete / void action of the edit form.
    #[instrument(skip(self, submission, actor), fields(ticket_id = %id, action = ?submission.action), err)]
    pub async fn submit_ticket(
        &self,
        id: TicketId,
        submission: &TicketSubmission,
        actor: &Actor,
    ) -> WorkflowResult<TicketOutcome> {
        let mut ticket = self.load_ticket(id).await?;
        check_expected(submission.expected_version, &ticket)?;
        let loaded = ticket.version;
        let now = self.clock.now();
        let max = self.settings.max_weight_kg;

        match submission.action {
            TicketAction::Save | TicketAction::Complete => {
                let refs = self.snapshot_for(&submission.form.referenced_ids()).await?;
                let result = if submission.action == TicketAction::Complete {
                    ticket.complete(&submission.form, &refs, max, now)
                } else {
                    ticket.save(&submission.form, &refs, max, now)
                };
                let defaults = result.inspect_err(|e| {
                    debug!(error = %e, "ticket submission rejected");
                })?;
                for applied in &defaults {
                    info!(?applied, "default applied from reference data");
                }
                self.tickets.update_ticket(&ticket, loaded, None).await?;
                if submission.action == TicketAction::Complete {
                    info!(ticket_no = %ticket.ticket_no, "ticket completed");
                }
                Ok(TicketOutcome::new(ticket, defaults, false))
            }
            TicketAction::Void => {
                let refs = self
                    .snapshot_with_lookup(submission.void.void_reason_id.as_deref())
                    .await?;
                let outcome = ticket
                    .void(&submission.void, &refs, actor, now)
                    .inspect_err(|e| debug!(error = %e, "ticket void rejected"))?;
                match outcome {
                    VoidOutcome::AlreadyVoid => Ok(TicketOutcome::new(ticket, Vec::new(), true)),
                    VoidOutcome::Voided(record) => {
                        self.tickets.update_ticket(&ticket, loaded, Some(&record)).await?;
                        info!(ticket_no = %ticket.ticket_no, actor = %actor, "ticket voided");
                        Ok(TicketOutcome::new(ticket, Vec::new(), false))
                    }
                }
            }
        }
    }

    #[instrument(skip(self, request), fields(ticket_id = %id, leg = leg.as_str()), err)]
    pub async fn capture_weight(
        &self,
        id: TicketId,
        leg: WeightLeg,
        request: &CaptureWeight,
    ) -> WorkflowResult<TicketOutcome> {
        let mut ticket = self.load_ticket(id).await?;
        check_expected(request.expected_version, &ticket)?;
        let loaded = ticket.version;
        ticket
            .capture_weight(
                leg,
                request.weight_kg.as_deref().unwrap_or(""),
                self.settings.max_weight_kg,
                self.clock.now(),
            )
            .inspect_err(|e| debug!(error = %e, "weight capture rejected"))?;
        self.tickets.update_ticket(&ticket, loaded, None).await?;
        Ok(TicketOutcome::new(ticket, Vec::new(), false))
    }

    #[instrument(skip(self), fields(ticket_id = %id), err)]
    pub async fn swap_ticket_weights(
        &self,
        id: TicketId,
        expected_version: Option<u64>,
    ) -> WorkflowResult<TicketOutcome> {
        let mut ticket = self.load_ticket(id).await?;
        check_expected(expected_version, &ticket)?;
        let loaded = ticket.version;
        ticket
            .swap_weights(self.clock.now())
            .inspect_err(|e| debug!(error = %e, "weight swap rejected"))?;
        self.tickets.update_ticket(&ticket, loaded, None).await?;
        Ok(TicketOutcome::new(ticket, Vec::new(), false))
    }

    fn readout_value(&self, request: &ReadoutRequest) -> WorkflowResult<Option<rust_decimal::Decimal>> {
        let manual = parse_readout(request.readout.as_deref(), self.settings.max_weight_kg)?;
        Ok(resolve_readout(self.indicator.as_ref(), manual, self.settings.max_weight_kg)?)
    }

    /// Place the readout into the first empty leg (no persistence).
    pub fn preview_readout(&self, request: &ReadoutRequest) -> WorkflowResult<WeightPanel> {
        let readout = self.readout_value(request)?;
        Ok(read_weight(readout, &request.displayed, self.settings.max_weight_kg)?)
    }

    /// Overwrite the chosen leg with the readout (no persistence).
    pub fn preview_readout_apply(&self, request: &ReadoutRequest) -> WorkflowResult<WeightPanel> {
        let readout = self.readout_value(request)?;
        if request.target.as_deref().map(str::trim).unwrap_or("").is_empty() {
            return Err(DomainError::validation("Select a weight to overwrite.").into());
        }
        Ok(apply_readout(
            readout,
            request.target.as_deref(),
            &request.displayed,
            self.settings.max_weight_kg,
        )?)
    }

    pub fn preview_swap(&self, displayed: &DisplayedWeights) -> WorkflowResult<WeightPanel> {
        Ok(preview_swap(displayed, self.settings.max_weight_kg)?)
    }

    /// Unit and price to show after a product pick; `None` for an unknown product.
    pub async fn product_defaults(
        &self,
        query: &ProductDefaultsQuery,
    ) -> WorkflowResult<Option<ProductDefaults>> {
        let Some(product_id) = parse_optional::<ProductId>(query.product_id.as_deref()) else {
            return Ok(None);
        };
        let Some(product) = self.reference.get_product(product_id).await? else {
            return Ok(None);
        };
        let unit_id = parse_optional::<LookupId>(query.unit_id.as_deref());
        Ok(Some(product_defaults(&product, unit_id, query.unit_price.as_deref())))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::indicator::WeightIndicator;
    use crate::store::{SequenceGenerator, TicketStore};
    use crate::workflow::testing::{actor, fixture};
    use chrono::Duration;
    use rust_decimal::Decimal;
    use weighbridge_tickets::TicketStatus;

    fn form(f: &crate::workflow::testing::Fixture) -> TicketForm {
        TicketForm {
            datetime: Some("2026-03-14T09:00".into()),
            direction: Some("INWARD".into()),
            transaction_type: Some("WASTEIN".into()),
            vehicle_id: Some(f.vehicle.id.to_string()),
            product_id: Some(f.product.id.to_string()),
            haulier_id: Some(f.haulier.id.to_string()),
            qty: Some("2".into()),
            ..TicketForm::default()
        }
    }

    fn submit(action: TicketAction, form: TicketForm) -> TicketSubmission {
        TicketSubmission { action, form, ..TicketSubmission::default() }
    }

    #[tokio::test]
    async fn quick_create_numbers_and_dedups() {
        let f = fixture().await;
        f.store.set_last_number(SequenceKind::Ticket, 2026, 41).unwrap();

        let first = f.services.quick_create_ticket().await.unwrap();
        assert!(first.created);
        assert_eq!(first.ticket.ticket_no, "26-00042");
        assert_eq!(first.ticket.status, TicketStatus::Open);

        f.clock.advance(Duration::seconds(2));
        let again = f.services.quick_create_ticket().await.unwrap();
        assert!(!again.created);
        assert_eq!(again.ticket.id, first.ticket.id);

        f.clock.advance(Duration::seconds(10));
        let later = f.services.quick_create_ticket().await.unwrap();
        assert!(later.created);
        assert_eq!(later.ticket.ticket_no, "26-00043");
    }

    #[tokio::test]
    async fn tare_before_gross_is_rejected_on_inward_ticket() {
        let f = fixture().await;
        let t = f.services.quick_create_ticket().await.unwrap().ticket;

        let request = CaptureWeight { weight_kg: Some("1200".into()), expected_version: None };
        let err = f
            .services
            .capture_weight(t.id, WeightLeg::Tare, &request)
            .await
            .unwrap_err();
        assert_eq!(err.messages(), vec!["Weigh-in (gross) is required before tare.".to_string()]);

        let stored = f.store.get_ticket(t.id).await.unwrap().unwrap();
        assert_eq!(stored.tare_kg, None);
        assert_eq!(stored.version, t.version);
    }

    #[tokio::test]
    async fn complete_fills_defaults_and_locks() {
        let f = fixture().await;
        let t = f.services.quick_create_ticket().await.unwrap().ticket;

        let mut fields = form(&f);
        fields.gross_kg = Some("3000".into());
        fields.tare_kg = Some("1000".into());
        let done = f
            .services
            .submit_ticket(t.id, &submit(TicketAction::Complete, fields.clone()), &actor())
            .await
            .unwrap();
        assert_eq!(done.ticket.status, TicketStatus::Complete);
        assert_eq!(done.ticket.customer_id, Some(f.customer.id));
        assert_eq!(done.ticket.net_kg, Some(Decimal::from(2000)));
        assert_eq!(done.ticket.total, Some(Decimal::new(10000, 2)));
        assert_eq!(done.defaults.len(), 2);

        fields.qty = Some("5".into());
        let err = f
            .services
            .submit_ticket(t.id, &submit(TicketAction::Save, fields), &actor())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Domain(DomainError::Locked(_))));
        let stored = f.store.get_ticket(t.id).await.unwrap().unwrap();
        assert_eq!(stored, done.ticket);
    }

    #[tokio::test]
    async fn negative_net_blocks_complete() {
        let f = fixture().await;
        let t = f.services.quick_create_ticket().await.unwrap().ticket;

        let mut fields = form(&f);
        fields.gross_kg = Some("1000".into());
        fields.tare_kg = Some("1500".into());
        let err = f
            .services
            .submit_ticket(t.id, &submit(TicketAction::Complete, fields), &actor())
            .await
            .unwrap_err();
        assert!(err.messages().iter().any(|m| m.starts_with("Net weight cannot be negative")));
        let stored = f.store.get_ticket(t.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TicketStatus::Open);
    }

    #[tokio::test]
    async fn stale_expected_version_is_a_conflict() {
        let f = fixture().await;
        let t = f.services.quick_create_ticket().await.unwrap().ticket;
        let mut submission = submit(TicketAction::Save, form(&f));
        submission.expected_version = Some(t.version + 3);

        let err = f.services.submit_ticket(t.id, &submission, &actor()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Domain(DomainError::Conflict(_))));
    }

    #[tokio::test]
    async fn void_is_idempotent() {
        let f = fixture().await;
        let t = f.services.quick_create_ticket().await.unwrap().ticket;
        let mut submission = submit(TicketAction::Void, TicketForm::default());
        submission.void = VoidTicket {
            void_reason_id: Some(f.void_duplicate.id.to_string()),
            void_note: None,
        };

        let first = f.services.submit_ticket(t.id, &submission, &actor()).await.unwrap();
        assert_eq!(first.ticket.status, TicketStatus::Void);
        assert!(!first.already_void);

        let second = f.services.submit_ticket(t.id, &submission, &actor()).await.unwrap();
        assert!(second.already_void);
        assert_eq!(second.ticket.version, first.ticket.version);

        let view = f.services.view_ticket(t.id).await.unwrap();
        assert_eq!(view.voids.len(), 1);
        assert_eq!(view.voids[0].voided_by.as_str(), "operator");
    }

    #[tokio::test]
    async fn void_other_requires_note() {
        let f = fixture().await;
        let t = f.services.quick_create_ticket().await.unwrap().ticket;
        let mut submission = submit(TicketAction::Void, TicketForm::default());
        submission.void.void_reason_id = Some(f.void_other.id.to_string());

        let err = f.services.submit_ticket(t.id, &submission, &actor()).await.unwrap_err();
        assert_eq!(err.messages(), vec!["Void note is required for 'Other'.".to_string()]);
    }

    #[tokio::test]
    async fn readout_uses_manual_value() {
        let f = fixture().await;
        let panel = f
            .services
            .preview_readout(&ReadoutRequest {
                readout: Some("2500".into()),
                ..ReadoutRequest::default()
            })
            .unwrap();
        assert_eq!(panel.gross_kg, Some(Decimal::from(2500)));

        let err = f.services.preview_readout(&ReadoutRequest::default()).unwrap_err();
        assert_eq!(err.messages(), vec!["Please input a weight".to_string()]);

        let err = f
            .services
            .preview_readout_apply(&ReadoutRequest {
                readout: Some("2500".into()),
                ..ReadoutRequest::default()
            })
            .unwrap_err();
        assert_eq!(err.messages(), vec!["Select a weight to overwrite.".to_string()]);
    }

    #[derive(Debug)]
    struct LiveScale(Decimal);

    impl WeightIndicator for LiveScale {
        fn is_connected(&self) -> bool {
            true
        }

        fn weight_kg(&self) -> Option<Decimal> {
            Some(self.0)
        }
    }

    #[tokio::test]
    async fn live_indicator_reading_is_bounded_and_rounded() {
        let mut f = fixture().await;
        f.services.indicator = Arc::new(LiveScale(Decimal::new(12_3465, 1)));
        let panel = f.services.preview_readout(&ReadoutRequest::default()).unwrap();
        assert_eq!(panel.gross_kg, Some(Decimal::from(12_347)));

        let over = f.services.settings.max_weight_kg + Decimal::ONE;
        f.services.indicator = Arc::new(LiveScale(over));
        let err = f
            .services
            .preview_readout_apply(&ReadoutRequest {
                target: Some("gross".into()),
                ..ReadoutRequest::default()
            })
            .unwrap_err();
        assert!(err.messages()[0].starts_with("Readout must not exceed"));
    }

    #[tokio::test]
    async fn product_defaults_prefer_entered_values() {
        let f = fixture().await;
        let query = ProductDefaultsQuery {
            product_id: Some(f.product.id.to_string()),
            ..ProductDefaultsQuery::default()
        };
        let defaults = f.services.product_defaults(&query).await.unwrap().unwrap();
        assert_eq!(defaults.unit_price, "50.00");

        let unknown = ProductDefaultsQuery {
            product_id: Some(ProductId::new().to_string()),
            ..ProductDefaultsQuery::default()
        };
        assert!(f.services.product_defaults(&unknown).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sequence_calls_continue_from_last_number() {
        let f = fixture().await;
        f.store.set_last_number(SequenceKind::Ticket, 2026, 41).unwrap();

        let a = f.services.sequences.clone();
        let b = f.services.sequences.clone();
        let (x, y) = tokio::join!(
            tokio::spawn(async move { a.next_number(SequenceKind::Ticket, 2026).await }),
            tokio::spawn(async move { b.next_number(SequenceKind::Ticket, 2026).await }),
        );
        let mut got = vec![x.unwrap().unwrap(), y.unwrap().unwrap()];
        got.sort();
        assert_eq!(got, vec![42, 43]);
        assert_eq!(f.store.last_number(SequenceKind::Ticket, 2026).await.unwrap(), 43);
    }
}
