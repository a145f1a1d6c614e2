//! Lifecycle notification contract.
//!
//! Notifiers are caller-supplied observers bound to a trade at submission.
//! Every call is fire-and-forget from the hub's point of view: a slow or
//! panicking notifier must never stall queue operations, so delivery runs on
//! the dispatcher's per-requester tasks, not inline.

use tradeq_core::{CancelReason, TradeEntry, TradePayload};

/// A heading/detail pair rendered as one line of a status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusDetail {
    /// Short field name, e.g. a stat label.
    pub heading: String,
    /// Rendered value.
    pub detail: String,
}

impl StatusDetail {
    /// Build a heading/detail pair.
    #[must_use]
    pub fn new(heading: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            detail: detail.into(),
        }
    }
}

/// Free-form progress report emitted by a worker mid-trade.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail lines.
    pub details: Vec<StatusDetail>,
}

impl StatusUpdate {
    /// A plain-text update with no detail lines.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// Attach a detail line.
    #[must_use]
    pub fn with_detail(mut self, heading: impl Into<String>, detail: impl Into<String>) -> Self {
        self.details.push(StatusDetail::new(heading, detail));
        self
    }
}

/// Observer for the lifecycle of a single trade.
///
/// Bound at submission, dropped after the terminal call. Exactly one of
/// `on_canceled` / `on_finished` is delivered per trade; `on_update` may be
/// called any number of times while the trade is active.
pub trait LifecycleNotifier: Send + Sync {
    /// A worker claimed the trade and is setting up.
    fn on_initialize(&self, entry: &TradeEntry);

    /// The worker is waiting for the counterpart to appear.
    fn on_searching(&self, entry: &TradeEntry);

    /// The trade ended without completing.
    fn on_canceled(&self, entry: &TradeEntry, reason: CancelReason);

    /// The trade completed; `received` is what the counterpart produced.
    fn on_finished(&self, entry: &TradeEntry, received: &TradePayload);

    /// Free-form progress report.
    fn on_update(&self, entry: &TradeEntry, update: &StatusUpdate);
}

/// Notifier that writes lifecycle events to the log. Used for trades whose
/// origin has no richer delivery channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl LifecycleNotifier for LogNotifier {
    fn on_initialize(&self, entry: &TradeEntry) {
        tracing::info!(trade_id = %entry.id, routing = %entry.routing, "trade initializing");
    }

    fn on_searching(&self, entry: &TradeEntry) {
        tracing::info!(
            trade_id = %entry.id,
            code = entry.payload.code,
            label = %entry.payload.display_label(),
            "searching for counterpart"
        );
    }

    fn on_canceled(&self, entry: &TradeEntry, reason: CancelReason) {
        tracing::warn!(trade_id = %entry.id, %reason, "trade canceled");
    }

    fn on_finished(&self, entry: &TradeEntry, received: &TradePayload) {
        // The hidden label is revealed once the trade is done.
        tracing::info!(trade_id = %entry.id, received = %received.label, "trade finished");
    }

    fn on_update(&self, entry: &TradeEntry, update: &StatusUpdate) {
        tracing::info!(trade_id = %entry.id, message = %update.message, "trade update");
        for line in &update.details {
            tracing::debug!(trade_id = %entry.id, heading = %line.heading, detail = %line.detail, "update detail");
        }
    }
}
