//! The queued unit: payload, routing metadata, batch slot, and state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AdmitError, CancelReason};
use crate::id::TradeId;

/// Largest accepted pairing code (eight decimal digits).
pub const MAX_TRADE_CODE: u32 = 9999_9999;

/// Stable identity of a submitting user.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct RequesterId(u64);

impl RequesterId {
    /// Wrap a raw requester id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw id value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RequesterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier shared by all entries of one batch session.
///
/// Derived from the first entry's trade id, so sessions inherit the same
/// uniqueness guarantee as trade ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(u64);

impl SessionId {
    /// Derive the session id from the first entry of the batch.
    #[must_use]
    pub const fn from_first(id: TradeId) -> Self {
        Self(id.value())
    }

    /// Raw id value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Worker-pool partition a trade must be served from.
///
/// A closed set: each class owns its own queue lane and `claim_next` is a
/// flat lookup, no run-time type inspection involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingClass {
    /// Standard two-party link trade.
    LinkTrade,
    /// Duplicate the counterpart's item and return both.
    CloneTrade,
    /// Receive items from the counterpart and echo their data back.
    DumpTrade,
    /// Repair an item's ownership metadata and return it.
    FixTrade,
    /// Inspect the counterpart's item and report derived values.
    SeedCheck,
}

impl RoutingClass {
    /// All routing classes, in claim-lane order.
    pub const ALL: [RoutingClass; 5] = [
        Self::LinkTrade,
        Self::CloneTrade,
        Self::DumpTrade,
        Self::FixTrade,
        Self::SeedCheck,
    ];
}

impl std::fmt::Display for RoutingClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::LinkTrade => "link_trade",
            Self::CloneTrade => "clone_trade",
            Self::DumpTrade => "dump_trade",
            Self::FixTrade => "fix_trade",
            Self::SeedCheck => "seed_check",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for RoutingClass {
    type Err = AdmitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "link_trade" => Ok(Self::LinkTrade),
            "clone_trade" => Ok(Self::CloneTrade),
            "dump_trade" => Ok(Self::DumpTrade),
            "fix_trade" => Ok(Self::FixTrade),
            "seed_check" => Ok(Self::SeedCheck),
            other => Err(AdmitError::InvalidRoutingClass(other.to_string())),
        }
    }
}

/// Opaque domain payload plus the small classification surface the core needs.
///
/// The core never interprets `bytes`; legality checks happen before admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradePayload {
    /// Opaque domain data, exclusively owned by the entry until a worker
    /// claims it.
    pub bytes: Vec<u8>,
    /// Short human-readable label for logs and notifications.
    pub label: String,
    /// Eight-digit pairing code the counterpart must enter.
    pub code: u32,
    /// Whether this is a surprise ("mystery") variant the front end should
    /// render without revealing the label.
    pub mystery: bool,
}

impl TradePayload {
    /// Create a payload with the given data, label, and pairing code.
    #[must_use]
    pub fn new(bytes: Vec<u8>, label: impl Into<String>, code: u32) -> Self {
        Self {
            bytes,
            label: label.into(),
            code,
            mystery: false,
        }
    }

    /// Mark the payload as a mystery variant.
    #[must_use]
    pub fn with_mystery(mut self) -> Self {
        self.mystery = true;
        self
    }

    /// Label safe to show the requester: mystery payloads stay hidden until
    /// the trade finishes.
    #[must_use]
    pub fn display_label(&self) -> &str {
        if self.mystery {
            "???"
        } else {
            &self.label
        }
    }
}

/// 1-based position within a batch session.
///
/// `size == 1` denotes a non-batch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchSlot {
    /// 1-based position within the batch.
    pub index: u32,
    /// Total entry count of the batch.
    pub size: u32,
}

impl BatchSlot {
    /// Slot for a non-batch request.
    #[must_use]
    pub const fn single() -> Self {
        Self { index: 1, size: 1 }
    }

    /// Slot `index` of `size`.
    #[must_use]
    pub const fn of(index: u32, size: u32) -> Self {
        Self { index, size }
    }

    /// Whether the slot belongs to a multi-entry batch.
    #[must_use]
    pub const fn is_batch(&self) -> bool {
        self.size > 1
    }

    /// Whether this is the final entry of its batch.
    #[must_use]
    pub const fn is_last(&self) -> bool {
        self.index == self.size
    }

    /// Check the slot is a contiguous, 1-based position.
    pub fn validate(&self) -> Result<(), AdmitError> {
        if self.size == 0 || self.index == 0 || self.index > self.size {
            return Err(AdmitError::InvalidBatchSlot {
                index: self.index,
                size: self.size,
            });
        }
        Ok(())
    }
}

impl Default for BatchSlot {
    fn default() -> Self {
        Self::single()
    }
}

/// Lifecycle state of a queued trade.
///
/// Transitions: `Queued -> Assigned -> {Searching ->}? {Canceled | Finished}`.
/// The `Searching` phase is optional; `Canceled` is reachable from any
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TradeState {
    /// Admitted, waiting for a worker.
    #[default]
    Queued,
    /// Claimed by a worker, setup in progress.
    Assigned,
    /// Worker is waiting for the counterpart to act.
    Searching,
    /// Terminal: the entry could not complete.
    Canceled,
    /// Terminal: the entry completed successfully.
    Finished,
}

impl TradeState {
    /// Returns true if no further transitions may occur.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled | Self::Finished)
    }

    /// Returns true if the trade still occupies its requester's admission slot.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether the state machine permits moving from `self` to `next`.
    #[must_use]
    pub fn may_advance_to(&self, next: TradeState) -> bool {
        match (self, next) {
            (Self::Queued, Self::Assigned | Self::Canceled) => true,
            (Self::Assigned, Self::Searching | Self::Canceled | Self::Finished) => true,
            (Self::Searching, Self::Canceled | Self::Finished) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TradeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Assigned => "assigned",
            Self::Searching => "searching",
            Self::Canceled => "canceled",
            Self::Finished => "finished",
        };
        write!(f, "{name}")
    }
}

/// Terminal outcome reported by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeOutcome {
    /// The trade completed; carries what the counterpart produced, which may
    /// differ from the submitted payload.
    Finished(TradePayload),
    /// The trade could not complete.
    Canceled(CancelReason),
}

impl TradeOutcome {
    /// Terminal state this outcome maps to.
    #[must_use]
    pub fn terminal_state(&self) -> TradeState {
        match self {
            Self::Finished(_) => TradeState::Finished,
            Self::Canceled(_) => TradeState::Canceled,
        }
    }
}

/// The queued unit: payload plus routing metadata, correlation id, and
/// ownership bookkeeping.
///
/// Owned by the admission queue from admission until a worker claims it; the
/// queue keeps the authoritative copy addressable by id until the entry
/// reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEntry {
    /// Unique correlation identifier.
    pub id: TradeId,
    /// Submitting user.
    pub requester: RequesterId,
    /// Worker-pool partition this entry must be served from.
    pub routing: RoutingClass,
    /// Opaque domain payload.
    pub payload: TradePayload,
    /// Favored requesters bypass the one-per-requester admission rule.
    pub favored: bool,
    /// Position within a batch session (`size == 1` for non-batch).
    pub batch: BatchSlot,
    /// Session shared by all entries of one batch.
    pub session: SessionId,
    /// Admission timestamp, used for FIFO ordering and ETA.
    pub created_at: DateTime<Utc>,
    /// Current lifecycle state.
    pub state: TradeState,
}

impl TradeEntry {
    /// Create a freshly queued entry.
    #[must_use]
    pub fn new(
        id: TradeId,
        requester: RequesterId,
        routing: RoutingClass,
        payload: TradePayload,
        favored: bool,
        batch: BatchSlot,
        session: SessionId,
    ) -> Self {
        Self {
            id,
            requester,
            routing,
            payload,
            favored,
            batch,
            session,
            created_at: Utc::now(),
            state: TradeState::Queued,
        }
    }
}
