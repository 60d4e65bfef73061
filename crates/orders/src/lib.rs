//! Orders and fulfillment module.
//!
//! Holds the order model, the fulfillment state machine driven by pick
//! progress, and the lot selection policy used to decide which lots an order
//! line may draw from. Pure domain logic: no IO, no storage.

pub mod order;
pub mod selection;
pub mod state;

pub use order::{
    LotAllocated, NewOrderLine, Order, OrderAllocation, OrderConfirmed, OrderEvent, OrderItem,
    OrderPick, OrderPlaced, OrderShipped, OrderStatus, PickReverted, PickSubmitted,
    StatusTransition,
};
pub use selection::{
    Admission, FillPlan, LotCandidate, SelectionPolicy, SuggestedPick, committed_quantity,
    remaining_quantity, select_lots, suggest_fill,
};
pub use state::{
    ItemProgress, OrderProgress, next_status_after_pick, next_status_after_revert,
};
