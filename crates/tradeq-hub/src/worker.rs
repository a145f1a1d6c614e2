//! The worker boundary: a pool of claim-execute-resolve loops.
//!
//! Workers never touch queue internals. Each loop claims through the hub,
//! executes, and reports exactly one terminal outcome. Execution failures
//! surface as `Canceled` outcomes, never as errors across the boundary.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tradeq_core::{RoutingClass, TradeEntry, TradeOutcome};

use crate::hub::TradeHub;
use crate::notifier::StatusUpdate;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Executes claimed trades for one routing class.
pub trait TradeWorker: Send + Sync {
    /// Routing class this worker serves.
    fn routing(&self) -> RoutingClass;

    /// Run the trade to a terminal outcome. Must not panic; failures are
    /// expressed as `TradeOutcome::Canceled`.
    fn execute(&self, entry: TradeEntry) -> BoxFuture<'_, TradeOutcome>;
}

/// A set of workers sharing one hub, started together and stopped together.
pub struct WorkerPool {
    hub: Arc<TradeHub>,
    workers: Vec<Arc<dyn TradeWorker>>,
    idle_poll: Duration,
}

impl WorkerPool {
    /// Create an empty pool that polls an empty lane at `idle_poll`.
    #[must_use]
    pub fn new(hub: Arc<TradeHub>, idle_poll: Duration) -> Self {
        Self {
            hub,
            workers: Vec::new(),
            idle_poll,
        }
    }

    /// Add a worker loop to the pool.
    pub fn add_worker(&mut self, worker: Arc<dyn TradeWorker>) {
        self.workers.push(worker);
    }

    /// Workers registered for a routing class. Feed this to the hub's wait
    /// estimators.
    #[must_use]
    pub fn worker_count(&self, class: RoutingClass) -> usize {
        self.workers.iter().filter(|w| w.routing() == class).count()
    }

    /// Spawn every worker loop. The pool is consumed; use the handle to stop.
    pub fn start(self) -> WorkerPoolHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks = self
            .workers
            .into_iter()
            .enumerate()
            .map(|(slot, worker)| {
                let hub = Arc::clone(&self.hub);
                let shutdown = shutdown_rx.clone();
                let idle_poll = self.idle_poll;
                tokio::spawn(run_worker(slot, hub, worker, shutdown, idle_poll))
            })
            .collect();
        WorkerPoolHandle { shutdown_tx, tasks }
    }
}

/// Stops the pool's worker loops.
pub struct WorkerPoolHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl WorkerPoolHandle {
    /// Signal shutdown and wait for every loop to finish its in-flight
    /// trade. Queued entries stay queued.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "worker task ended abnormally");
            }
        }
    }
}

async fn run_worker(
    slot: usize,
    hub: Arc<TradeHub>,
    worker: Arc<dyn TradeWorker>,
    mut shutdown: watch::Receiver<bool>,
    idle_poll: Duration,
) {
    let class = worker.routing();
    info!(slot, routing = %class, "worker loop started");

    loop {
        if *shutdown.borrow() {
            break;
        }
        match hub.claim_next(class) {
            Some(entry) => {
                let id = entry.id;
                debug!(slot, trade_id = %id, "worker picked up trade");
                hub.report_searching(id);
                if entry.batch.is_batch() {
                    hub.report_update(
                        id,
                        StatusUpdate::message("processing batch trade").with_detail(
                            "Batch",
                            format!("{} of {}", entry.batch.index, entry.batch.size),
                        ),
                    );
                }
                let outcome = worker.execute(entry).await;
                hub.report_terminal(id, outcome);
            }
            None => {
                tokio::select! {
                    _ = shutdown.changed() => {}
                    () = tokio::time::sleep(idle_poll) => {}
                }
            }
        }
    }
    info!(slot, routing = %class, "worker loop stopped");
}
