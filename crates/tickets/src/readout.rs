//! Indicator readout and swap previews. Nothing here is persisted; the
//! operator still saves the form afterwards.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use weighbridge_core::{DomainError, DomainResult, ValidationErrors, parse_weight_kg};

use crate::ticket::{negative_net, net_weight};
use crate::weights::WeightLeg;

/// The weights block as it would be redisplayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightPanel {
    pub gross_kg: Option<Decimal>,
    pub tare_kg: Option<Decimal>,
    pub net_kg: Option<Decimal>,
    pub negative_net: bool,
    /// Both legs already hold a value; ask which one to overwrite.
    pub confirm_overwrite: bool,
}

impl WeightPanel {
    fn new(gross_kg: Option<Decimal>, tare_kg: Option<Decimal>, confirm_overwrite: bool) -> Self {
        Self {
            gross_kg,
            tare_kg,
            net_kg: net_weight(gross_kg, tare_kg),
            negative_net: negative_net(gross_kg, tare_kg),
            confirm_overwrite,
        }
    }
}

/// Currently displayed (unsaved) gross/tare text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayedWeights {
    pub gross_kg: Option<String>,
    pub tare_kg: Option<String>,
}

impl DisplayedWeights {
    fn parse(&self, max_weight_kg: Decimal) -> DomainResult<(Option<Decimal>, Option<Decimal>)> {
        let mut errors = ValidationErrors::new();
        let mut leg = |raw: &Option<String>, label: &str| {
            match parse_weight_kg(raw.as_deref().unwrap_or(""), label, max_weight_kg) {
                Ok(v) => v,
                Err(e) => {
                    errors.extend(ValidationErrors::from(e.messages()));
                    None
                }
            }
        };
        let gross = leg(&self.gross_kg, "Gross weight");
        let tare = leg(&self.tare_kg, "Tare weight");
        errors.into_result()?;
        Ok((gross, tare))
    }
}

fn require_readout(readout_kg: Option<Decimal>) -> DomainResult<Decimal> {
    readout_kg.ok_or_else(|| DomainError::validation("Please input a weight"))
}

/// Parse a manually typed readout; blank yields `None`.
pub fn parse_readout(raw: Option<&str>, max_weight_kg: Decimal) -> DomainResult<Option<Decimal>> {
    parse_weight_kg(raw.unwrap_or(""), "Readout", max_weight_kg)
}

/// Place a readout into the first empty leg (gross, then tare).
pub fn read_weight(
    readout_kg: Option<Decimal>,
    displayed: &DisplayedWeights,
    max_weight_kg: Decimal,
) -> DomainResult<WeightPanel> {
    let readout = require_readout(readout_kg)?;
    let (gross, tare) = displayed.parse(max_weight_kg)?;
    Ok(match (gross, tare) {
        (None, _) => WeightPanel::new(Some(readout), tare, false),
        (Some(_), None) => WeightPanel::new(gross, Some(readout), false),
        (Some(_), Some(_)) => WeightPanel::new(gross, tare, true),
    })
}

/// Overwrite the chosen leg with the readout after the operator confirmed.
pub fn apply_readout(
    readout_kg: Option<Decimal>,
    target: Option<&str>,
    displayed: &DisplayedWeights,
    max_weight_kg: Decimal,
) -> DomainResult<WeightPanel> {
    let readout = require_readout(readout_kg)?;
    let target: WeightLeg = target.unwrap_or("").parse()?;
    let (gross, tare) = displayed.parse(max_weight_kg)?;
    Ok(match target {
        WeightLeg::Gross => WeightPanel::new(Some(readout), tare, false),
        WeightLeg::Tare => WeightPanel::new(gross, Some(readout), false),
    })
}

/// Show what swapping the displayed values would give.
pub fn preview_swap(displayed: &DisplayedWeights, max_weight_kg: Decimal) -> DomainResult<WeightPanel> {
    let (gross, tare) = displayed.parse(max_weight_kg)?;
    Ok(WeightPanel::new(tare, gross, false))
}
