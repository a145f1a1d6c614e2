//! Error taxonomy shared by the queue and hub.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Admission errors, returned synchronously to the submitter. Rejected
/// requests never enter the queue.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdmitError {
    /// The requester already holds a non-terminal entry in this routing class.
    #[error("requester already has a trade queued in this routing class")]
    AlreadyQueued,

    /// The submission names an unknown worker partition.
    #[error("unknown routing class: {0}")]
    InvalidRoutingClass(String),

    /// The pairing code falls outside the configured range.
    #[error("trade code {code} outside allowed range {min}..={max}")]
    TradeCodeOutOfRange {
        /// Submitted code.
        code: u32,
        /// Lowest accepted code.
        min: u32,
        /// Highest accepted code.
        max: u32,
    },

    /// The batch slot is not a contiguous 1-based position.
    #[error("batch slot {index} of {size} is not a valid 1-based position")]
    InvalidBatchSlot {
        /// Submitted 1-based index.
        index: u32,
        /// Submitted batch size.
        size: u32,
    },
}

/// Closed classification for why a trade ended in `Canceled`.
///
/// Execution-time failures surface only through the terminal notifier call,
/// never as errors across the worker/queue boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The requester withdrew the trade.
    Requester,
    /// The worker or counterpart failed to act within the externally
    /// enforced deadline.
    Timeout,
    /// The worker pool reported an execution failure unrelated to the
    /// requester.
    WorkerFault,
    /// An operator drained the queue lane.
    Drained,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Requester => "requester",
            Self::Timeout => "timeout",
            Self::WorkerFault => "worker_fault",
            Self::Drained => "drained",
        };
        write!(f, "{name}")
    }
}
