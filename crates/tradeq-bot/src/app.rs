//! Application wiring: hub, worker pool, and the simulated workload.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use tradeq_core::{BatchSlot, RequesterId, RoutingClass, TradePayload};
use tradeq_hub::{LogNotifier, SubmitRequest, TradeHub, WorkerPool};

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::sim::{SimWorker, TempArtifact};

/// The running daemon: owns the hub and the worker pool.
pub struct Application {
    config: AppConfig,
    hub: Arc<TradeHub>,
}

impl Application {
    /// Wire up the hub from configuration.
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        let hub = Arc::new(TradeHub::new(config.hub.clone()));
        Self { config, hub }
    }

    /// Submit the configured workload, run the pool until the queue drains
    /// or the process is interrupted, then shut down cleanly.
    pub async fn run(&self) -> AppResult<()> {
        let sim = &self.config.sim;
        let mut pool = WorkerPool::new(Arc::clone(&self.hub), Duration::from_millis(20));
        for _ in 0..sim.workers {
            pool.add_worker(Arc::new(SimWorker::new(
                RoutingClass::LinkTrade,
                Duration::from_millis(sim.service_ms),
                sim.fault_every,
            )));
        }
        let workers = pool.worker_count(RoutingClass::LinkTrade);

        self.submit_workload()?;
        let batch_trades = if sim.batch_size > 1 { sim.batch_size } else { 0 };
        let expected = u64::from(sim.trades) + u64::from(batch_trades);
        info!(expected, workers, "workload submitted, starting pool");

        let handle = pool.start();
        let drained = async {
            loop {
                let stats = self.hub.stats();
                if stats.completed + stats.canceled >= expected {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        tokio::select! {
            () = drained => info!("queue drained"),
            _ = tokio::signal::ctrl_c() => warn!("interrupted, stopping with trades still queued"),
        }

        handle.stop().await;
        self.hub.shutdown().await;

        let stats = self.hub.stats();
        info!(
            admitted = stats.admitted,
            completed = stats.completed,
            canceled = stats.canceled,
            "run finished"
        );
        Ok(())
    }

    fn submit_workload(&self) -> AppResult<()> {
        let sim = &self.config.sim;

        // One standalone trade per synthetic requester.
        for n in 1..=sim.trades {
            let requester = RequesterId::new(u64::from(n));
            let mut payload = TradePayload::new(vec![n as u8], format!("trade-{n}"), 1000_0000 + n);
            if sim.mystery_every > 0 && n % sim.mystery_every == 0 {
                payload = payload.with_mystery();
            }
            let admitted = self.hub.submit(
                SubmitRequest::standalone(requester, RoutingClass::LinkTrade, payload),
                Arc::new(LogNotifier),
            )?;
            if let Some(eta) = self.hub.estimate_wait_minutes(admitted.id, sim.workers) {
                info!(trade_id = %admitted.id, eta_minutes = eta, "trade queued");
            }
        }

        if sim.batch_size > 1 {
            self.submit_batch(sim.batch_size)?;
        }
        Ok(())
    }

    /// One batch session from a dedicated requester, with a staged artifact
    /// that must be deleted exactly once when the session completes.
    fn submit_batch(&self, size: u32) -> AppResult<()> {
        let requester = RequesterId::new(9000);
        let first = self.hub.submit(
            SubmitRequest {
                requester,
                routing: RoutingClass::LinkTrade,
                payload: TradePayload::new(vec![0], "batch-1", 2000_0001),
                favored: false,
                batch: BatchSlot::of(1, size),
                session: None,
            },
            Arc::new(LogNotifier),
        )?;
        for index in 2..=size {
            self.hub.submit(
                SubmitRequest {
                    requester,
                    routing: RoutingClass::LinkTrade,
                    payload: TradePayload::new(vec![index as u8], format!("batch-{index}"), 2000_0000 + index),
                    favored: false,
                    batch: BatchSlot::of(index, size),
                    session: Some(first.session),
                },
                Arc::new(LogNotifier),
            )?;
        }

        let staged = std::env::temp_dir().join(format!("tradeq-batch-{}", first.session));
        match TempArtifact::create(staged, b"batch bundle") {
            Ok(artifact) => self.hub.attach_resource(first.session, Box::new(artifact)),
            Err(err) => warn!(error = %err, "could not stage batch artifact"),
        }
        info!(session = %first.session, size, "batch session submitted");
        Ok(())
    }
}
