//! Reference rows every installation starts with.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use weighbridge_core::LookupId;
use weighbridge_reference::{Lookup, LookupKind};

use crate::store::{ReferenceStore, StoreError, StoreResult};

pub const VOID_REASONS: [(&str, &str); 7] = [
    ("DUPLICATE_TICKET", "Duplicate ticket"),
    ("WRONG_VEHICLE", "Wrong vehicle"),
    ("WRONG_CUSTOMER", "Wrong customer/account"),
    ("INCORRECT_WEIGHTS", "Incorrect weights"),
    ("CANCELLED", "Cancelled transaction"),
    ("TEST_TRAINING", "Test / training ticket"),
    ("OTHER", "Other (specify)"),
];

pub const UNITS: [(&str, &str); 3] = [("TONNE", "Tonne"), ("KG", "Kilogram"), ("LOAD", "Load")];

/// Insert the default void reasons and units that are not there yet.
///
/// Returns how many rows were inserted; running it again inserts nothing.
#[instrument(skip(store), err)]
pub async fn seed_defaults(store: &dyn ReferenceStore, now: DateTime<Utc>) -> StoreResult<usize> {
    let defaults = VOID_REASONS
        .iter()
        .map(|row| (LookupKind::VoidReason, row))
        .chain(UNITS.iter().map(|row| (LookupKind::Unit, row)));

    let mut inserted = 0;
    for (kind, (code, description)) in defaults {
        if store.find_lookup(kind, code).await?.is_some() {
            continue;
        }
        let lookup = Lookup {
            id: LookupId::new(),
            kind,
            code: (*code).to_string(),
            description: Some((*description).to_string()),
            rate_percent: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        match store.insert_lookup(&lookup).await {
            Ok(()) => inserted += 1,
            // Another instance seeded the same row first.
            Err(StoreError::UniqueViolation(_)) => {}
            Err(e) => return Err(e),
        }
    }

    if inserted > 0 {
        info!(inserted, "seeded default reference data");
    }
    Ok(inserted)
}
