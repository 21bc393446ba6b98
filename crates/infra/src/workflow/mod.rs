//! Application workflows.
//!
//! Each operation follows the same pipeline:
//!
//! ```text
//! request
//!   ↓
//! 1. Load the entity and the reference rows the request mentions
//!   ↓
//! 2. Run the pure domain rule (tickets / invoicing crates)
//!   ↓
//! 3. Persist with the version that was loaded (compare-and-swap)
//! ```
//!
//! Nothing is written unless step 2 succeeds, and step 3 is a single store
//! call, so a rejected request leaves every row as it was.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use weighbridge_core::{AggregateRoot, Clock, DomainError, ExpectedVersion, LookupId, SystemClock};
use weighbridge_reference::ReferenceSnapshot;
use weighbridge_tickets::ReferencedIds;

use crate::config::Settings;
use crate::indicator::{StubIndicator, WeightIndicator};
use crate::seed::seed_defaults;
use crate::store::{
    InMemoryStore, InvoiceStore, PostgresStore, ReferenceStore, SequenceGenerator, StoreError,
    TicketStore,
};

pub mod invoices;
pub mod reference;
pub mod tickets;

/// Upper bound on fresh number allocations after a unique-key collision.
pub const MAX_NUMBER_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Unexpected failure reported with a generic message; details are logged.
    #[error("{0}")]
    Failed(String),
}

impl WorkflowError {
    pub fn not_found() -> Self {
        WorkflowError::Domain(DomainError::not_found())
    }

    /// Human-readable messages for the response body.
    pub fn messages(&self) -> Vec<String> {
        match self {
            WorkflowError::Domain(e) => e.messages(),
            WorkflowError::Store(e) => vec![e.to_string()],
            WorkflowError::Failed(msg) => vec![msg.clone()],
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Store/clock/indicator handles shared by every request.
#[derive(Clone)]
pub struct Services {
    pub tickets: Arc<dyn TicketStore>,
    pub invoices: Arc<dyn InvoiceStore>,
    pub reference: Arc<dyn ReferenceStore>,
    pub sequences: Arc<dyn SequenceGenerator>,
    pub clock: Arc<dyn Clock>,
    pub indicator: Arc<dyn WeightIndicator>,
    pub settings: Settings,
}

impl core::fmt::Debug for Services {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Services")
            .field("clock", &self.clock)
            .field("indicator", &self.indicator)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Services {
    /// One backend implementing every store trait.
    pub fn from_store<S>(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        indicator: Arc<dyn WeightIndicator>,
        settings: Settings,
    ) -> Self
    where
        S: TicketStore + InvoiceStore + ReferenceStore + SequenceGenerator + 'static,
    {
        Self {
            tickets: store.clone(),
            invoices: store.clone(),
            reference: store.clone(),
            sequences: store,
            clock,
            indicator,
            settings,
        }
    }

    pub fn in_memory(settings: Settings, clock: Arc<dyn Clock>) -> Self {
        let indicator = Arc::new(StubIndicator::new(settings.indicator_connected));
        Self::from_store(Arc::new(InMemoryStore::new()), clock, indicator, settings)
    }

    /// Postgres when `DATABASE_URL` is set, in-memory otherwise; default
    /// reference rows are seeded either way.
    pub async fn from_settings(settings: Settings) -> WorkflowResult<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let services = if settings.database_url.is_some() {
            let store = PostgresStore::connect(&settings).await?;
            store.ensure_schema().await?;
            info!("using postgres stores");
            let indicator = Arc::new(StubIndicator::new(settings.indicator_connected));
            Self::from_store(Arc::new(store), clock, indicator, settings)
        } else {
            info!("DATABASE_URL not set, using in-memory stores");
            Self::in_memory(settings, clock)
        };
        seed_defaults(services.reference.as_ref(), services.clock.now()).await?;
        Ok(services)
    }

    /// Load the reference rows a form mentions, plus the rows defaults may
    /// pull in (the vehicle's owner, the product's unit and tax rate).
    pub(crate) async fn snapshot_for(&self, ids: &ReferencedIds) -> WorkflowResult<ReferenceSnapshot> {
        let mut snapshot = ReferenceSnapshot::new();

        let mut customer_ids: Vec<_> = ids.customer_id.into_iter().collect();
        if let Some(id) = ids.vehicle_id {
            if let Some(vehicle) = self.reference.get_vehicle(id).await? {
                customer_ids.extend(vehicle.owner_customer_id);
                snapshot.insert_vehicle(vehicle);
            }
        }
        for id in customer_ids {
            if let Some(customer) = self.reference.get_customer(id).await? {
                snapshot.insert_customer(customer);
            }
        }

        let mut lookup_ids = ids.lookup_ids.clone();
        if let Some(id) = ids.product_id {
            if let Some(product) = self.reference.get_product(id).await? {
                lookup_ids.extend(product.unit_id);
                lookup_ids.extend(product.tax_rate_id);
                snapshot.insert_product(product);
            }
        }
        self.add_lookups(&mut snapshot, lookup_ids).await?;
        Ok(snapshot)
    }

    pub(crate) async fn add_lookups(
        &self,
        snapshot: &mut ReferenceSnapshot,
        ids: impl IntoIterator<Item = LookupId>,
    ) -> WorkflowResult<()> {
        for id in ids {
            if let Some(lookup) = self.reference.get_lookup(id).await? {
                snapshot.insert_lookup(lookup);
            }
        }
        Ok(())
    }

    /// Snapshot holding one lookup (void reason, payment method) if the raw
    /// id parses and exists.
    pub(crate) async fn snapshot_with_lookup(&self, raw: Option<&str>) -> WorkflowResult<ReferenceSnapshot> {
        let mut snapshot = ReferenceSnapshot::new();
        let id = raw
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse::<LookupId>().ok());
        self.add_lookups(&mut snapshot, id).await?;
        Ok(snapshot)
    }
}

/// Compare the caller's expected version with the loaded one before any
/// domain rule runs.
pub(crate) fn check_expected<A: AggregateRoot>(expected: Option<u64>, aggregate: &A) -> WorkflowResult<()> {
    ExpectedVersion::from_option(expected).check(aggregate.version())?;
    Ok(())
}
