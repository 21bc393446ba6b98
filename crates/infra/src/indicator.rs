//! Weight indicator (scale head) adapters.
//!
//! No hardware driver ships yet; both adapters report no live value, so the
//! operator's manual readout is always used.

use rust_decimal::Decimal;

use weighbridge_core::{DomainResult, check_weight_kg};

pub trait WeightIndicator: Send + Sync + core::fmt::Debug {
    fn is_connected(&self) -> bool;

    /// Current stable reading in kg, if any.
    fn weight_kg(&self) -> Option<Decimal>;
}

/// No indicator: the operator types every readout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualWeightSource;

impl WeightIndicator for ManualWeightSource {
    fn is_connected(&self) -> bool {
        true
    }

    fn weight_kg(&self) -> Option<Decimal> {
        None
    }
}

/// Placeholder for a serial/TCP indicator.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubIndicator {
    connected: bool,
}

impl StubIndicator {
    pub fn new(connected: bool) -> Self {
        Self { connected }
    }
}

impl WeightIndicator for StubIndicator {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn weight_kg(&self) -> Option<Decimal> {
        None
    }
}

/// Indicator value when connected and reading, otherwise the manual entry.
///
/// A live value gets the same bounds and whole-kg rounding as a typed one.
pub fn resolve_readout(
    indicator: &dyn WeightIndicator,
    manual: Option<Decimal>,
    max_weight_kg: Decimal,
) -> DomainResult<Option<Decimal>> {
    if indicator.is_connected() {
        if let Some(kg) = indicator.weight_kg() {
            return check_weight_kg(kg, "Readout", max_weight_kg).map(Some);
        }
    }
    Ok(manual)
}
