//! Activation / deactivation rules for lookup rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lookup::Lookup;

pub const IN_USE_MESSAGE: &str = "Cannot deactivate: in use by tickets.";

/// What a deactivate request should do to a lookup row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Deactivation {
    /// Flip `is_active` to false.
    Deactivate,
    /// Row is already inactive; nothing to write.
    AlreadyInactive,
    /// At least one ticket references the row; leave it active.
    InUse,
}

impl Deactivation {
    pub fn is_success(self) -> bool {
        !matches!(self, Deactivation::InUse)
    }

    pub fn message(self) -> Option<&'static str> {
        match self {
            Deactivation::InUse => Some(IN_USE_MESSAGE),
            _ => None,
        }
    }
}

/// Decide a deactivation. `referenced_by_tickets` must come from a check made
/// inside the same transaction that writes the result.
pub fn plan_deactivation(lookup: &Lookup, referenced_by_tickets: bool) -> Deactivation {
    if !lookup.is_active {
        return Deactivation::AlreadyInactive;
    }
    if lookup.kind.is_ticket_referenced() && referenced_by_tickets {
        return Deactivation::InUse;
    }
    Deactivation::Deactivate
}

pub fn deactivate(lookup: &mut Lookup, now: DateTime<Utc>) {
    lookup.is_active = false;
    lookup.updated_at = now;
}

/// Returns `false` when the row was already active.
pub fn activate(lookup: &mut Lookup, now: DateTime<Utc>) -> bool {
    if lookup.is_active {
        return false;
    }
    lookup.is_active = true;
    lookup.updated_at = now;
    true
}
