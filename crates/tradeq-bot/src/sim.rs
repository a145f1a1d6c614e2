//! Simulated workers and resources for exercising the hub end to end.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tradeq_core::{CancelReason, RoutingClass, TradeEntry, TradeOutcome, TradePayload};
use tradeq_hub::{BoxFuture, ResourceError, ResourceHandle, TradeWorker};

/// Worker that sleeps for a fixed service time and finishes the trade,
/// optionally failing every Nth trade with a worker fault.
pub struct SimWorker {
    routing: RoutingClass,
    service: Duration,
    fault_every: u32,
    served: AtomicU32,
}

impl SimWorker {
    /// Build a simulated worker for a routing class.
    #[must_use]
    pub fn new(routing: RoutingClass, service: Duration, fault_every: u32) -> Self {
        Self {
            routing,
            service,
            fault_every,
            served: AtomicU32::new(0),
        }
    }
}

impl TradeWorker for SimWorker {
    fn routing(&self) -> RoutingClass {
        self.routing
    }

    fn execute(&self, entry: TradeEntry) -> BoxFuture<'_, TradeOutcome> {
        Box::pin(async move {
            tokio::time::sleep(self.service).await;

            let n = self.served.fetch_add(1, Ordering::Relaxed) + 1;
            if self.fault_every > 0 && n % self.fault_every == 0 {
                return TradeOutcome::Canceled(CancelReason::WorkerFault);
            }

            let label = format!("served-{}", entry.payload.label);
            TradeOutcome::Finished(TradePayload::new(
                entry.payload.bytes,
                label,
                entry.payload.code,
            ))
        })
    }
}

/// A staged file on disk, deleted when its batch session completes.
pub struct TempArtifact {
    path: PathBuf,
    label: String,
}

impl TempArtifact {
    /// Stage `contents` at `path`.
    pub fn create(path: PathBuf, contents: &[u8]) -> std::io::Result<Self> {
        std::fs::write(&path, contents)?;
        let label = path.display().to_string();
        Ok(Self { path, label })
    }
}

impl ResourceHandle for TempArtifact {
    fn label(&self) -> &str {
        &self.label
    }

    fn release(self: Box<Self>) -> Result<(), ResourceError> {
        std::fs::remove_file(&self.path).map_err(|e| ResourceError(e.to_string()))
    }
}
