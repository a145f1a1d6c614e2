//! Trade lifecycle hub.
//!
//! Composes the admission queue with notification dispatch, batch session
//! accounting, and the worker-pool boundary. The [`TradeHub`] is the single
//! front door: submitters, workers, and operators all go through it.

pub mod batch;
pub mod config;
pub mod dispatch;
pub mod hub;
pub mod notifier;
pub mod worker;

pub use batch::{BatchCoordinator, ResourceError, ResourceHandle};
pub use config::HubConfig;
pub use dispatch::{LifecycleEvent, NotificationDispatcher};
pub use hub::{Admitted, HubStats, SubmitRequest, TradeHub};
pub use notifier::{LifecycleNotifier, LogNotifier, StatusDetail, StatusUpdate};
pub use worker::{BoxFuture, TradeWorker, WorkerPool, WorkerPoolHandle};
