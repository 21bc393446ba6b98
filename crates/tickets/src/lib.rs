//! Weighbridge ticket domain: the weighing record, its OPEN → COMPLETE → VOID
//! state machine, weight capture rules and the edit-form pipeline.
//!
//! Deterministic domain logic only (no IO, no HTTP, no storage).

pub mod form;
pub mod lifecycle;
pub mod listing;
pub mod readout;
pub mod status;
pub mod ticket;
pub mod weights;

pub use form::{
    AppliedDefault, FORM_LOOKUPS, FormIntent, NEGATIVE_NET_MESSAGE, ReferencedIds, TicketForm,
    TicketUpdate,
};
pub use lifecycle::{TicketAction, VoidOutcome, VoidTicket};
pub use listing::{Page, PageWindow, SearchContext, TicketQuery, list_order};
pub use readout::{DisplayedWeights, WeightPanel, apply_readout, parse_readout, preview_swap, read_weight};
pub use status::{Direction, TicketStatus, TransactionType, direction_mismatch};
pub use ticket::{
    LOCKED_MESSAGE, Ticket, TicketVoid, find_duplicate_quick, format_ticket_no, negative_net,
    net_weight,
};
pub use weights::{WeightLeg, check_capture_order, weigh_in_leg};
