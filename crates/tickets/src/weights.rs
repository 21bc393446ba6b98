//! Weight capture ordering, the dedicated capture actions, and swap.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use weighbridge_core::{DomainError, DomainResult, parse_weight_kg};

use crate::status::Direction;
use crate::ticket::Ticket;

/// Which physical measurement a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightLeg {
    Gross,
    Tare,
}

impl WeightLeg {
    pub fn as_str(self) -> &'static str {
        match self {
            WeightLeg::Gross => "gross",
            WeightLeg::Tare => "tare",
        }
    }

    /// "Gross weight" / "Tare weight", used in validation messages.
    pub fn label(self) -> &'static str {
        match self {
            WeightLeg::Gross => "Gross weight",
            WeightLeg::Tare => "Tare weight",
        }
    }

    pub fn other(self) -> WeightLeg {
        match self {
            WeightLeg::Gross => WeightLeg::Tare,
            WeightLeg::Tare => WeightLeg::Gross,
        }
    }
}

impl core::str::FromStr for WeightLeg {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gross" => Ok(WeightLeg::Gross),
            "tare" => Ok(WeightLeg::Tare),
            _ => Err(DomainError::validation("Select a weight to overwrite.")),
        }
    }
}

/// The leg captured first: tare for OUTWARD loads (empty vehicle arrives), gross otherwise.
pub fn weigh_in_leg(direction: Direction) -> WeightLeg {
    match direction {
        Direction::Outward => WeightLeg::Tare,
        Direction::Inward => WeightLeg::Gross,
    }
}

/// Message for capturing the weigh-out leg before the weigh-in leg.
pub fn ordering_message(direction: Direction) -> String {
    let first = weigh_in_leg(direction);
    format!(
        "Weigh-in ({}) is required before {}.",
        first.as_str(),
        first.other().as_str()
    )
}

/// Reject a gross/tare pair where the weigh-out leg is present without the weigh-in leg.
pub fn check_capture_order(
    direction: Direction,
    gross_kg: Option<Decimal>,
    tare_kg: Option<Decimal>,
) -> DomainResult<()> {
    let (weigh_in, weigh_out) = match weigh_in_leg(direction) {
        WeightLeg::Gross => (gross_kg, tare_kg),
        WeightLeg::Tare => (tare_kg, gross_kg),
    };
    if weigh_out.is_some() && weigh_in.is_none() {
        return Err(DomainError::validation(ordering_message(direction)));
    }
    Ok(())
}

impl Ticket {
    fn weight(&self, leg: WeightLeg) -> Option<Decimal> {
        match leg {
            WeightLeg::Gross => self.gross_kg,
            WeightLeg::Tare => self.tare_kg,
        }
    }

    /// Record one leg through the dedicated capture action.
    ///
    /// Each leg is captured exactly once; corrections go through the edit form.
    pub fn capture_weight(
        &mut self,
        leg: WeightLeg,
        raw: &str,
        max_weight_kg: Decimal,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure_unlocked()?;

        let value = parse_weight_kg(raw, leg.label(), max_weight_kg)?
            .ok_or_else(|| DomainError::validation(format!("{} is required.", leg.label())))?;

        if self.weight(leg).is_some() {
            return Err(DomainError::validation(format!("{} already recorded.", leg.label())));
        }
        if leg != weigh_in_leg(self.direction) && self.weight(leg.other()).is_none() {
            return Err(DomainError::validation(ordering_message(self.direction)));
        }

        match leg {
            WeightLeg::Gross => self.gross_kg = Some(value),
            WeightLeg::Tare => self.tare_kg = Some(value),
        }
        self.recompute_net();
        self.touch(now);
        Ok(())
    }

    /// Exchange gross and tare (the usual fix for a negative net).
    pub fn swap_weights(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_unlocked()?;
        if self.gross_kg.is_none() || self.tare_kg.is_none() {
            return Err(DomainError::validation(
                "Gross and tare weights are required to swap.",
            ));
        }
        core::mem::swap(&mut self.gross_kg, &mut self.tare_kg);
        self.recompute_net();
        self.touch(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::TicketStatus;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use weighbridge_core::TicketId;

    const MAX: i64 = 1_000_000;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap()
    }

    fn ticket(direction: Direction) -> Ticket {
        let mut t = Ticket::quick(TicketId::new(), "26-00001".into(), now());
        t.direction = direction;
        t
    }

    #[test]
    fn inward_tare_before_gross_is_rejected() {
        let mut t = ticket(Direction::Inward);
        let err = t.capture_weight(WeightLeg::Tare, "1200", Decimal::from(MAX), now()).unwrap_err();
        assert_eq!(
            err.messages(),
            vec!["Weigh-in (gross) is required before tare.".to_string()]
        );
        assert_eq!(t.tare_kg, None);
        assert_eq!(t.version, 0);
    }

    #[test]
    fn outward_gross_before_tare_is_rejected() {
        let mut t = ticket(Direction::Outward);
        let err = t.capture_weight(WeightLeg::Gross, "9000", Decimal::from(MAX), now()).unwrap_err();
        assert_eq!(
            err.messages(),
            vec!["Weigh-in (tare) is required before gross.".to_string()]
        );
    }

    #[test]
    fn capture_sets_net_once_both_present() {
        let mut t = ticket(Direction::Outward);
        t.capture_weight(WeightLeg::Tare, "8,000", Decimal::from(MAX), now()).unwrap();
        assert_eq!(t.net_kg, None);
        t.capture_weight(WeightLeg::Gross, "20000.4", Decimal::from(MAX), now()).unwrap();
        assert_eq!(t.gross_kg, Some(Decimal::from(20000)));
        assert_eq!(t.net_kg, Some(Decimal::from(12000)));
        assert_eq!(t.version, 2);
    }

    #[test]
    fn capture_refuses_overwrite() {
        let mut t = ticket(Direction::Inward);
        t.capture_weight(WeightLeg::Gross, "1000", Decimal::from(MAX), now()).unwrap();
        let err = t.capture_weight(WeightLeg::Gross, "1100", Decimal::from(MAX), now()).unwrap_err();
        assert_eq!(err.messages(), vec!["Gross weight already recorded.".to_string()]);
        assert_eq!(t.gross_kg, Some(Decimal::from(1000)));
    }

    #[test]
    fn blank_capture_is_required_error() {
        let mut t = ticket(Direction::Inward);
        let err = t.capture_weight(WeightLeg::Gross, "  ", Decimal::from(MAX), now()).unwrap_err();
        assert_eq!(err.messages(), vec!["Gross weight is required.".to_string()]);
    }

    #[test]
    fn locked_ticket_rejects_capture_and_swap() {
        let mut t = ticket(Direction::Inward);
        t.status = TicketStatus::Complete;
        let before = t.clone();
        assert!(matches!(
            t.capture_weight(WeightLeg::Gross, "10", Decimal::from(MAX), now()),
            Err(DomainError::Locked(_))
        ));
        assert!(matches!(t.swap_weights(now()), Err(DomainError::Locked(_))));
        assert_eq!(t, before);
    }

    #[test]
    fn swap_exchanges_and_recomputes() {
        let mut t = ticket(Direction::Inward);
        t.gross_kg = Some(Decimal::from(1000));
        t.tare_kg = Some(Decimal::from(1500));
        t.swap_weights(now()).unwrap();
        assert_eq!(t.gross_kg, Some(Decimal::from(1500)));
        assert_eq!(t.tare_kg, Some(Decimal::from(1000)));
        assert_eq!(t.net_kg, Some(Decimal::from(500)));
    }

    #[test]
    fn swap_needs_both_weights() {
        let mut t = ticket(Direction::Inward);
        t.gross_kg = Some(Decimal::from(1000));
        assert!(t.swap_weights(now()).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 1000, .. ProptestConfig::default() })]

        #[test]
        fn weigh_out_without_weigh_in_always_fails(outward in any::<bool>(), w in 0i64..MAX) {
            let direction = if outward { Direction::Outward } else { Direction::Inward };
            let mut t = ticket(direction);
            let out_leg = weigh_in_leg(direction).other();
            let result = t.capture_weight(out_leg, &w.to_string(), Decimal::from(MAX), now());
            prop_assert!(result.is_err());
            prop_assert_eq!(t.gross_kg, None);
            prop_assert_eq!(t.tare_kg, None);
        }
    }
}
