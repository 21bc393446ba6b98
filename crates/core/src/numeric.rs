//! Decimal rounding and operator input parsing.
//!
//! All money and weight arithmetic is done in `rust_decimal::Decimal` and
//! rounded half away from zero, never banker's rounding.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::DomainError;

/// Round a monetary amount to 2 decimal places, half away from zero.
pub fn round_currency(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// Round a weight to whole kilograms, half away from zero.
pub fn round_kg(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(0);
    rounded
}

/// Parse a free-form decimal field.
///
/// Blank input means "not provided" and yields `Ok(None)`. Thousands separators
/// are tolerated. `field` names the field in the error message.
pub fn parse_decimal_input(raw: &str, field: &str) -> Result<Option<Decimal>, DomainError> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return Ok(None);
    }
    cleaned
        .parse::<Decimal>()
        .map(Some)
        .map_err(|_| DomainError::validation(format!("{field} must be a number.")))
}

/// Parse a weight field: non-negative, at most `max_kg`, rounded to whole kilograms.
pub fn parse_weight_kg(raw: &str, field: &str, max_kg: Decimal) -> Result<Option<Decimal>, DomainError> {
    parse_decimal_input(raw, field)?
        .map(|value| check_weight_kg(value, field, max_kg))
        .transpose()
}

/// Bound a weight from any source to `0..=max_kg` and round it to whole kilograms.
pub fn check_weight_kg(value: Decimal, field: &str, max_kg: Decimal) -> Result<Decimal, DomainError> {
    if value < Decimal::ZERO {
        return Err(DomainError::validation(format!("{field} must be zero or greater.")));
    }
    if value > max_kg {
        return Err(DomainError::validation(format!(
            "{field} must not exceed {max_kg} kg."
        )));
    }
    Ok(round_kg(value))
}

/// Parse a monetary field and round it to 2 decimal places.
pub fn parse_currency_input(raw: &str, field: &str) -> Result<Option<Decimal>, DomainError> {
    Ok(parse_decimal_input(raw, field)?.map(round_currency))
}
