use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use weighbridge_core::{DomainError, DomainResult, LookupId, ValidationErrors, parse_decimal_input};

/// Void reason code that requires a free-text note.
pub const OTHER_VOID_REASON_CODE: &str = "OTHER";

/// The small code tables a ticket (or invoice) can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LookupKind {
    Haulier,
    Driver,
    Container,
    Destination,
    Yard,
    Area,
    WasteCode,
    WasteProducer,
    Licence,
    Unit,
    TaxRate,
    VoidReason,
    PaymentMethod,
}

impl LookupKind {
    pub const ALL: [LookupKind; 13] = [
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
        LookupKind::TaxRate,
        LookupKind::VoidReason,
        LookupKind::PaymentMethod,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LookupKind::Haulier => "HAULIER",
            LookupKind::Driver => "DRIVER",
            LookupKind::Container => "CONTAINER",
            LookupKind::Destination => "DESTINATION",
            LookupKind::Yard => "YARD",
            LookupKind::Area => "AREA",
            LookupKind::WasteCode => "WASTE_CODE",
            LookupKind::WasteProducer => "WASTE_PRODUCER",
            LookupKind::Licence => "LICENCE",
            LookupKind::Unit => "UNIT",
            LookupKind::TaxRate => "TAX_RATE",
            LookupKind::VoidReason => "VOID_REASON",
            LookupKind::PaymentMethod => "PAYMENT_METHOD",
        }
    }

    /// Human label used in validation messages ("Haulier not found.").
    pub fn label(self) -> &'static str {
        match self {
            LookupKind::Haulier => "Haulier",
            LookupKind::Driver => "Driver",
            LookupKind::Container => "Container",
            LookupKind::Destination => "Destination",
            LookupKind::Yard => "Yard",
            LookupKind::Area => "Area",
            LookupKind::WasteCode => "Waste code",
            LookupKind::WasteProducer => "Waste producer",
            LookupKind::Licence => "Licence",
            LookupKind::Unit => "Unit",
            LookupKind::TaxRate => "Tax rate",
            LookupKind::VoidReason => "Void reason",
            LookupKind::PaymentMethod => "Payment method",
        }
    }

    /// Ticket column holding a reference to this kind, if any.
    ///
    /// Kinds with a column are subject to the deactivation guard.
    pub fn ticket_column(self) -> Option<&'static str> {
        match self {
            LookupKind::Haulier => Some("haulier_id"),
            LookupKind::Driver => Some("driver_id"),
            LookupKind::Container => Some("container_id"),
            LookupKind::Destination => Some("destination_id"),
            LookupKind::Yard => Some("yard_id"),
            LookupKind::Area => Some("area_id"),
            LookupKind::WasteCode => Some("waste_code_id"),
            LookupKind::WasteProducer => Some("waste_producer_id"),
            LookupKind::Licence => Some("licence_id"),
            LookupKind::Unit => Some("unit_id"),
            LookupKind::TaxRate | LookupKind::VoidReason | LookupKind::PaymentMethod => None,
        }
    }

    pub fn is_ticket_referenced(self) -> bool {
        self.ticket_column().is_some()
    }
}

impl core::fmt::Display for LookupKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for LookupKind {
    type Err = DomainError;

    /// Accepts `HAULIER`, `haulier`, `waste-code`, `waste_code`, ...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        LookupKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| DomainError::validation(format!("Unknown lookup kind: {s}.")))
    }
}

/// One row of a lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lookup {
    pub id: LookupId,
    pub kind: LookupKind,
    pub code: String,
    pub description: Option<String>,
    /// Only populated for `TAX_RATE`.
    pub rate_percent: Option<Decimal>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lookup {
    /// Label shown to operators: description when present, otherwise the code.
    pub fn display_name(&self) -> &str {
        self.description
            .as_deref()
            .filter(|d| !d.is_empty())
            .unwrap_or(&self.code)
    }

    pub fn is_other_void_reason(&self) -> bool {
        self.kind == LookupKind::VoidReason && self.code == OTHER_VOID_REASON_CODE
    }
}

/// Raw input for creating a lookup entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLookup {
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rate_percent: Option<String>,
}

impl CreateLookup {
    /// Codes are stored trimmed and upper-cased; uniqueness is checked on this form.
    pub fn normalized_code(&self) -> String {
        self.code.trim().to_uppercase()
    }
}

/// Validate `input` and build a new, active lookup row.
///
/// `code_taken` is the caller's uniqueness check on [`CreateLookup::normalized_code`]
/// within `kind`.
pub fn create_lookup(
    id: LookupId,
    kind: LookupKind,
    input: &CreateLookup,
    code_taken: bool,
    now: DateTime<Utc>,
) -> DomainResult<Lookup> {
    let mut errors = ValidationErrors::new();
    let code = input.normalized_code();
    if code.is_empty() {
        errors.push("Code is required.");
    } else if code_taken {
        errors.push("Code already exists.");
    }

    let mut rate_percent = None;
    if kind == LookupKind::TaxRate {
        match parse_decimal_input(input.rate_percent.as_deref().unwrap_or(""), "Rate") {
            Ok(Some(rate)) if rate < Decimal::ZERO => errors.push("Rate must be zero or greater."),
            Ok(Some(rate)) => rate_percent = Some(rate),
            Ok(None) => errors.push("Rate is required."),
            Err(e) => errors.extend(ValidationErrors::from(e.messages())),
        }
    }
    errors.into_result()?;

    let description = input
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    Ok(Lookup {
        id,
        kind,
        code,
        description,
        rate_percent,
        is_active: true,
        created_at: now,
        updated_at: now,
    })
}
