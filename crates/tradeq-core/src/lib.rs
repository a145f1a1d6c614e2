//! Core domain types for the tradeq queue coordinator.
//!
//! This crate provides the fundamental types shared by the queue and hub:
//! - `TradeId` / `IdGenerator`: process-unique correlation identifiers
//! - `TradeEntry`: the queued unit (payload, routing metadata, ownership)
//! - `TradeState`: the lifecycle state machine
//! - Error taxonomy for admission and cancellation

pub mod entry;
pub mod error;
pub mod id;

pub use entry::{
    BatchSlot, RequesterId, RoutingClass, SessionId, TradeEntry, TradeOutcome, TradePayload,
    TradeState, MAX_TRADE_CODE,
};
pub use error::{AdmitError, CancelReason};
pub use id::{Clock, IdGenerator, SystemClock, TradeId};
