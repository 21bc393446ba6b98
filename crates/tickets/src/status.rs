//! Closed enums stored as their upper-case wire strings.

use serde::{Deserialize, Serialize};

use weighbridge_core::DomainError;

macro_rules! impl_wire_enum {
    ($t:ident, $err:literal, { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $t {
            pub const ALL: &'static [$t] = &[$($t::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($t::$variant => $wire),+
                }
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl core::str::FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($wire => Ok($t::$variant),)+
                    _ => Err(DomainError::validation($err)),
                }
            }
        }
    };
}

/// Ticket lifecycle: OPEN → COMPLETE → VOID, or OPEN → VOID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TicketStatus {
    Open,
    Complete,
    Void,
}

impl_wire_enum!(TicketStatus, "Status is invalid.", {
    Open => "OPEN",
    Complete => "COMPLETE",
    Void => "VOID",
});

impl TicketStatus {
    /// Any status other than OPEN freezes the ticket's fields.
    pub fn is_locked(self) -> bool {
        !matches!(self, TicketStatus::Open)
    }

    /// Sort key used by ticket listings (OPEN first within the same datetime).
    pub fn priority(self) -> u8 {
        match self {
            TicketStatus::Open => 0,
            TicketStatus::Complete => 1,
            TicketStatus::Void => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Inward,
    Outward,
}

impl_wire_enum!(Direction, "Direction must be INWARD or OUTWARD.", {
    Inward => "INWARD",
    Outward => "OUTWARD",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    WasteIn,
    WasteOut,
    Sale,
}

impl_wire_enum!(TransactionType, "Transaction type is invalid.", {
    WasteIn => "WASTEIN",
    WasteOut => "WASTEOUT",
    Sale => "SALE",
});

/// Non-blocking warning: the transaction type reads as the opposite direction.
pub fn direction_mismatch(direction: Direction, transaction_type: TransactionType) -> bool {
    matches!(
        (direction, transaction_type),
        (Direction::Outward, TransactionType::WasteIn)
            | (Direction::Inward, TransactionType::WasteOut)
            | (Direction::Inward, TransactionType::Sale)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_uses_wire_strings() {
        assert_eq!(serde_json::to_string(&TransactionType::WasteIn).unwrap(), "\"WASTEIN\"");
        assert_eq!(serde_json::to_string(&TicketStatus::Complete).unwrap(), "\"COMPLETE\"");
        let parsed: Direction = serde_json::from_str("\"OUTWARD\"").unwrap();
        assert_eq!(parsed, Direction::Outward);
        assert_eq!("WASTEOUT".parse::<TransactionType>().unwrap(), TransactionType::WasteOut);
    }

    #[test]
    fn bad_direction_has_operator_message() {
        let err = "SIDEWAYS".parse::<Direction>().unwrap_err();
        assert_eq!(err.messages(), vec!["Direction must be INWARD or OUTWARD.".to_string()]);
    }

    #[test]
    fn only_open_is_unlocked() {
        assert!(!TicketStatus::Open.is_locked());
        assert!(TicketStatus::Complete.is_locked());
        assert!(TicketStatus::Void.is_locked());
    }

    #[test]
    fn mismatch_pairs() {
        assert!(direction_mismatch(Direction::Outward, TransactionType::WasteIn));
        assert!(direction_mismatch(Direction::Inward, TransactionType::Sale));
        assert!(direction_mismatch(Direction::Inward, TransactionType::WasteOut));
        assert!(!direction_mismatch(Direction::Inward, TransactionType::WasteIn));
        assert!(!direction_mismatch(Direction::Outward, TransactionType::Sale));
    }
}
