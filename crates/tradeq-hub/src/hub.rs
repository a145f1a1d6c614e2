//! The trade hub: the one front door for submitting, claiming, and
//! resolving trades.
//!
//! The hub composes the admission queue, batch coordinator, and notification
//! dispatcher, and keeps the notifier bound to each trade from submission to
//! its terminal event. Queue state never escapes except as snapshots.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use tradeq_core::{
    AdmitError, BatchSlot, CancelReason, IdGenerator, RequesterId, RoutingClass, SessionId,
    TradeEntry, TradeId, TradeOutcome, TradePayload,
};
use tradeq_queue::{
    estimate_eta_minutes, estimate_session_eta_minutes, AdmissionConfig, AdmissionQueue,
    QueuePosition, TerminalError,
};

use crate::batch::{BatchCoordinator, ResourceHandle};
use crate::config::HubConfig;
use crate::dispatch::{LifecycleEvent, NotificationDispatcher};
use crate::notifier::{LifecycleNotifier, StatusUpdate};

/// Everything a submitter provides up front.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    /// Submitting user.
    pub requester: RequesterId,
    /// Worker-pool partition to serve this trade from.
    pub routing: RoutingClass,
    /// Opaque domain payload.
    pub payload: TradePayload,
    /// Whether the requester bypasses the one-per-requester rule.
    pub favored: bool,
    /// Batch slot; `BatchSlot::single()` for standalone trades.
    pub batch: BatchSlot,
    /// Session of an existing batch. `None` derives a fresh session from the
    /// minted trade id, so the first entry of a batch passes `None` and its
    /// siblings pass the returned session.
    pub session: Option<SessionId>,
}

impl SubmitRequest {
    /// A standalone, non-favored submission.
    #[must_use]
    pub fn standalone(requester: RequesterId, routing: RoutingClass, payload: TradePayload) -> Self {
        Self {
            requester,
            routing,
            payload,
            favored: false,
            batch: BatchSlot::single(),
            session: None,
        }
    }
}

/// Successful admission: the minted id and the session it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admitted {
    /// Minted correlation id.
    pub id: TradeId,
    /// Session (derived from `id` unless the submitter supplied one).
    pub session: SessionId,
}

/// Lifetime counters, monotone since hub construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Entries that passed admission.
    pub admitted: u64,
    /// Trades that reached `Finished`.
    pub completed: u64,
    /// Trades that reached `Canceled`.
    pub canceled: u64,
}

/// Coordinates admission, claiming, lifecycle notification, and batch
/// resource release.
pub struct TradeHub {
    cfg: HubConfig,
    ids: IdGenerator,
    queue: AdmissionQueue,
    batches: BatchCoordinator,
    dispatcher: NotificationDispatcher,
    /// Notifier bound per trade; removed by the winning terminal transition.
    notifiers: Mutex<HashMap<TradeId, Arc<dyn LifecycleNotifier>>>,
    admitted: AtomicU64,
    completed: AtomicU64,
    canceled: AtomicU64,
    /// Completed-trade tallies per requester.
    requester_totals: Mutex<HashMap<RequesterId, u64>>,
}

impl Default for TradeHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl TradeHub {
    /// Build a hub from configuration.
    #[must_use]
    pub fn new(cfg: HubConfig) -> Self {
        let queue = AdmissionQueue::new(AdmissionConfig {
            max_favored_per_requester: cfg.max_favored_per_requester,
        });
        let dispatcher = NotificationDispatcher::new(cfg.notify_queue_depth);
        Self {
            cfg,
            ids: IdGenerator::with_system_clock(),
            queue,
            batches: BatchCoordinator::default(),
            dispatcher,
            notifiers: Mutex::new(HashMap::new()),
            admitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            canceled: AtomicU64::new(0),
            requester_totals: Mutex::new(HashMap::new()),
        }
    }

    /// Validate and admit a submission, binding `notifier` to the new trade.
    ///
    /// Validation happens before an id is minted, so rejected submissions
    /// leave no trace. The first entry of a batch (session `None`) implicitly
    /// registers the session; siblings must carry the returned session.
    pub fn submit(
        &self,
        request: SubmitRequest,
        notifier: Arc<dyn LifecycleNotifier>,
    ) -> Result<Admitted, AdmitError> {
        request.batch.validate()?;
        let code = request.payload.code;
        if code < self.cfg.min_trade_code || code > self.cfg.max_trade_code {
            return Err(AdmitError::TradeCodeOutOfRange {
                code,
                min: self.cfg.min_trade_code,
                max: self.cfg.max_trade_code,
            });
        }

        let id = self.ids.next();
        let session = request.session.unwrap_or_else(|| SessionId::from_first(id));
        let entry = TradeEntry::new(
            id,
            request.requester,
            request.routing,
            request.payload,
            request.favored,
            request.batch,
            session,
        );

        self.queue.admit(entry)?;
        if request.batch.is_batch() {
            self.batches.register(session, request.batch.size, id);
        }
        self.notifiers.lock().insert(id, notifier);
        self.admitted.fetch_add(1, Ordering::Relaxed);
        Ok(Admitted { id, session })
    }

    /// Claim the next eligible entry of a routing class for a worker.
    ///
    /// Delivers the `on_initialize` notification for the claimed trade.
    pub fn claim_next(&self, class: RoutingClass) -> Option<TradeEntry> {
        let entry = self.queue.claim_next(class)?;
        self.notify(&entry, LifecycleEvent::Initialize);
        Some(entry)
    }

    /// Record that the worker is searching for the counterpart.
    pub fn report_searching(&self, id: TradeId) -> bool {
        if !self.queue.mark_searching(id) {
            return false;
        }
        if let Some(entry) = self.queue.snapshot(id) {
            self.notify(&entry, LifecycleEvent::Searching);
        }
        true
    }

    /// Forward a mid-trade progress report to the trade's notifier.
    pub fn report_update(&self, id: TradeId, update: StatusUpdate) -> bool {
        match self.queue.snapshot(id) {
            Some(entry) if entry.state.is_active() => {
                self.notify(&entry, LifecycleEvent::Update(update));
                true
            }
            _ => false,
        }
    }

    /// Apply a terminal outcome exactly once.
    ///
    /// The first caller wins and triggers the single terminal notification,
    /// batch accounting, and archival. Later callers get `false` and a log
    /// line; nothing is delivered twice.
    pub fn report_terminal(&self, id: TradeId, outcome: TradeOutcome) -> bool {
        let entry = match self.queue.resolve(id, outcome.terminal_state()) {
            Ok(entry) => entry,
            Err(TerminalError::DuplicateTerminal(id)) => {
                warn!(trade_id = %id, "ignoring duplicate terminal report");
                return false;
            }
            Err(TerminalError::UnknownTrade(id)) => {
                debug!(trade_id = %id, "terminal report for unknown trade");
                return false;
            }
        };

        let event = match outcome {
            TradeOutcome::Finished(received) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                *self
                    .requester_totals
                    .lock()
                    .entry(entry.requester)
                    .or_default() += 1;
                LifecycleEvent::Finished(received)
            }
            TradeOutcome::Canceled(reason) => {
                self.canceled.fetch_add(1, Ordering::Relaxed);
                LifecycleEvent::Canceled(reason)
            }
        };

        self.batches.note_terminal(&entry);
        let notifier = self.notifiers.lock().remove(&id);
        if let Some(notifier) = notifier {
            self.dispatcher.dispatch(notifier, entry.clone(), event);
        }
        self.queue.discard(id);
        true
    }

    /// Cancel a trade on the requester's behalf. Idempotent.
    pub fn cancel(&self, id: TradeId) -> bool {
        self.report_terminal(id, TradeOutcome::Canceled(CancelReason::Requester))
    }

    /// Drain every still-queued entry of a routing class, notifying each as
    /// canceled. Entries already claimed by workers run to completion.
    /// Returns the number of entries drained.
    pub fn clear_class(&self, class: RoutingClass) -> usize {
        let drained = self.queue.clear_class(class);
        for entry in &drained {
            self.canceled.fetch_add(1, Ordering::Relaxed);
            self.batches.note_terminal(entry);
            let notifier = self.notifiers.lock().remove(&entry.id);
            if let Some(notifier) = notifier {
                self.dispatcher.dispatch(
                    notifier,
                    entry.clone(),
                    LifecycleEvent::Canceled(CancelReason::Drained),
                );
            }
            self.queue.discard(entry.id);
        }
        drained.len()
    }

    /// Tie a resource to a batch session for exactly-once release.
    pub fn attach_resource(&self, session: SessionId, handle: Box<dyn ResourceHandle>) {
        self.batches.attach_resource(session, handle);
    }

    /// The requester-visible rank of a pending trade.
    #[must_use]
    pub fn position(
        &self,
        requester: RequesterId,
        id: TradeId,
        class: RoutingClass,
    ) -> Option<QueuePosition> {
        self.queue.position(requester, id, class)
    }

    /// Estimated minutes until a trade is served, given the current worker
    /// count for its class.
    ///
    /// Batch predecessors already admitted contribute to the entry's rank,
    /// so only not-yet-submitted predecessor slots add service time on top.
    #[must_use]
    pub fn estimate_wait_minutes(&self, id: TradeId, worker_count: usize) -> Option<f64> {
        let entry = self.queue.snapshot(id)?;
        let pos = self.queue.position(entry.requester, id, entry.routing)?;
        let base = estimate_eta_minutes(pos.rank, worker_count, self.cfg.mean_service_minutes);
        let missing = self.queue.missing_predecessors(id)?;
        Some(base + missing as f64 * self.cfg.mean_service_minutes)
    }

    /// Estimated minutes until a trade's whole batch session completes.
    #[must_use]
    pub fn estimate_session_wait_minutes(&self, id: TradeId, worker_count: usize) -> Option<f64> {
        let entry = self.queue.snapshot(id)?;
        let pos = self.queue.position(entry.requester, id, entry.routing)?;
        Some(estimate_session_eta_minutes(
            pos.rank,
            worker_count,
            self.cfg.mean_service_minutes,
            entry.batch.size,
        ))
    }

    /// Entries waiting to be claimed in a class.
    #[must_use]
    pub fn depth(&self, class: RoutingClass) -> usize {
        self.queue.depth(class)
    }

    /// Non-terminal entries in a class, queued plus in-flight.
    #[must_use]
    pub fn active(&self, class: RoutingClass) -> usize {
        self.queue.active(class)
    }

    /// Lifetime counters.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            admitted: self.admitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            canceled: self.canceled.load(Ordering::Relaxed),
        }
    }

    /// Completed-trade tally for one requester.
    #[must_use]
    pub fn requester_total(&self, requester: RequesterId) -> u64 {
        self.requester_totals
            .lock()
            .get(&requester)
            .copied()
            .unwrap_or(0)
    }

    /// Batch sessions still in flight.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.batches.active_sessions()
    }

    /// Flush pending notifications and stop delivery tasks. Call once after
    /// the worker pool has stopped.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }

    fn notify(&self, entry: &TradeEntry, event: LifecycleEvent) {
        let notifier = self.notifiers.lock().get(&entry.id).cloned();
        if let Some(notifier) = notifier {
            self.dispatcher.dispatch(notifier, entry.clone(), event);
        }
    }
}
