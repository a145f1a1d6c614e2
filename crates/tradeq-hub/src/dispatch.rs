//! Bounded, per-requester notification delivery.
//!
//! Queue and hub operations never invoke a [`LifecycleNotifier`] inline.
//! Events are pushed onto a bounded per-requester channel and delivered by a
//! dedicated task, so one requester's slow notifier cannot delay another's
//! events or any queue operation. When a requester's channel is full the
//! event is dropped with a warning rather than applying backpressure to the
//! queue.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use tradeq_core::{CancelReason, RequesterId, TradeEntry, TradePayload};

use crate::notifier::{LifecycleNotifier, StatusUpdate};

/// A lifecycle event addressed to one trade's notifier.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// Worker claimed the trade.
    Initialize,
    /// Worker is waiting for the counterpart.
    Searching,
    /// Terminal: the trade ended without completing.
    Canceled(CancelReason),
    /// Terminal: the trade completed with this received payload.
    Finished(TradePayload),
    /// Mid-trade progress report.
    Update(StatusUpdate),
}

struct Delivery {
    notifier: Arc<dyn LifecycleNotifier>,
    entry: TradeEntry,
    event: LifecycleEvent,
}

impl Delivery {
    fn deliver(self) {
        match self.event {
            LifecycleEvent::Initialize => self.notifier.on_initialize(&self.entry),
            LifecycleEvent::Searching => self.notifier.on_searching(&self.entry),
            LifecycleEvent::Canceled(reason) => self.notifier.on_canceled(&self.entry, reason),
            LifecycleEvent::Finished(received) => {
                self.notifier.on_finished(&self.entry, &received);
            }
            LifecycleEvent::Update(update) => self.notifier.on_update(&self.entry, &update),
        }
    }
}

struct Lane {
    tx: mpsc::Sender<Delivery>,
    task: JoinHandle<()>,
}

/// Fans lifecycle events out to per-requester delivery tasks.
pub struct NotificationDispatcher {
    depth: usize,
    lanes: Mutex<HashMap<RequesterId, Lane>>,
}

impl NotificationDispatcher {
    /// Create a dispatcher whose per-requester channels hold `depth` events.
    #[must_use]
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            lanes: Mutex::new(HashMap::new()),
        }
    }

    /// Enqueue an event for delivery. Returns false if the requester's
    /// channel was full and the event was dropped.
    ///
    /// Must be called from within a tokio runtime; delivery tasks are
    /// spawned lazily per requester.
    pub fn dispatch(
        &self,
        notifier: Arc<dyn LifecycleNotifier>,
        entry: TradeEntry,
        event: LifecycleEvent,
    ) -> bool {
        let requester = entry.requester;
        let delivery = Delivery {
            notifier,
            entry,
            event,
        };

        let mut lanes = self.lanes.lock();
        let lane = lanes.entry(requester).or_insert_with(|| {
            let (tx, mut rx) = mpsc::channel::<Delivery>(self.depth);
            let task = tokio::spawn(async move {
                while let Some(delivery) = rx.recv().await {
                    delivery.deliver();
                }
            });
            Lane { tx, task }
        });

        match lane.tx.try_send(delivery) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(
                    requester = %requester,
                    trade_id = %dropped.entry.id,
                    "notification channel full, dropping event"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(dropped)) => {
                warn!(
                    requester = %requester,
                    trade_id = %dropped.entry.id,
                    "notification task gone, dropping event"
                );
                false
            }
        }
    }

    /// Close all lanes and wait for in-flight deliveries to finish.
    pub async fn shutdown(&self) {
        let lanes: Vec<Lane> = {
            let mut guard = self.lanes.lock();
            guard.drain().map(|(_, lane)| lane).collect()
        };
        for lane in lanes {
            drop(lane.tx);
            if let Err(err) = lane.task.await {
                warn!(error = %err, "notification task ended abnormally");
            }
        }
    }
}
