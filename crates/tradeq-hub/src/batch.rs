//! Batch session accounting and exactly-once resource release.
//!
//! Entries of one batch session may carry attached resources (staged files,
//! reservations) that must be released exactly once, when the whole session
//! has reached a terminal state, regardless of the order or mix of outcomes.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use tradeq_core::{SessionId, TradeEntry, TradeId};

/// Failure releasing an attached resource. Logged, never propagated: by the
/// time release runs the session is already terminal.
#[derive(Debug, Error)]
#[error("resource release failed: {0}")]
pub struct ResourceError(pub String);

/// A side resource tied to a batch session, released exactly once when the
/// session completes.
pub trait ResourceHandle: Send {
    /// Short name for logs.
    fn label(&self) -> &str;

    /// Release the resource, consuming the handle.
    fn release(self: Box<Self>) -> Result<(), ResourceError>;
}

struct BatchSession {
    size: u32,
    /// Batch indices that have reached a terminal state.
    done: HashSet<u32>,
    /// Highest trade id seen in the session, for log correlation.
    last_id: TradeId,
    resources: Vec<Box<dyn ResourceHandle>>,
}

/// Tracks batch sessions and releases their resources exactly once.
///
/// All mutation happens under one lock; the completing terminal takes the
/// resource handles out of the map inside the critical section, so two racing
/// terminals cannot both observe an incomplete session and both release.
#[derive(Default)]
pub struct BatchCoordinator {
    sessions: Mutex<HashMap<SessionId, BatchSession>>,
}

impl BatchCoordinator {
    /// Register a batch session. Re-registering an existing session is a
    /// no-op; a size mismatch is a caller defect and is logged.
    pub fn register(&self, session: SessionId, size: u32, first_id: TradeId) {
        let mut sessions = self.sessions.lock();
        match sessions.get(&session) {
            Some(existing) if existing.size != size => {
                warn!(%session, registered = existing.size, size, "batch size mismatch ignored");
            }
            Some(_) => {}
            None => {
                sessions.insert(
                    session,
                    BatchSession {
                        size,
                        done: HashSet::new(),
                        last_id: first_id,
                        resources: Vec::new(),
                    },
                );
            }
        }
    }

    /// Attach a resource to a session. If the session is unknown (already
    /// completed or never registered), the handle is released immediately.
    pub fn attach_resource(&self, session: SessionId, handle: Box<dyn ResourceHandle>) {
        let stray = {
            let mut sessions = self.sessions.lock();
            match sessions.get_mut(&session) {
                Some(state) => {
                    state.resources.push(handle);
                    None
                }
                None => Some(handle),
            }
        };
        if let Some(handle) = stray {
            warn!(%session, label = handle.label(), "resource attached to unknown session, releasing now");
            release_one(handle);
        }
    }

    /// Record a terminal entry of a session. Returns true when this call
    /// completed the session and released its resources.
    ///
    /// Duplicate terminals for the same batch index are idempotent here; the
    /// queue has already flagged them upstream.
    pub fn note_terminal(&self, entry: &TradeEntry) -> bool {
        if !entry.batch.is_batch() {
            return false;
        }

        let resources = {
            let mut sessions = self.sessions.lock();
            let Some(state) = sessions.get_mut(&entry.session) else {
                return false;
            };
            state.done.insert(entry.batch.index);
            if entry.id > state.last_id {
                state.last_id = entry.id;
            }
            if state.done.len() < state.size as usize {
                return false;
            }
            let state = sessions.remove(&entry.session).expect("session present");
            debug!(
                session = %entry.session,
                size = state.size,
                last_trade = %state.last_id,
                resources = state.resources.len(),
                "batch session complete"
            );
            state.resources
        };

        for handle in resources {
            release_one(handle);
        }
        true
    }

    /// Number of batch sessions still in flight.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.sessions.lock().len()
    }
}

fn release_one(handle: Box<dyn ResourceHandle>) {
    let label = handle.label().to_string();
    if let Err(err) = handle.release() {
        warn!(%label, error = %err, "resource release failed");
    } else {
        debug!(%label, "resource released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tradeq_core::{BatchSlot, RequesterId, RoutingClass, TradePayload};

    struct TestResource {
        name: String,
        released: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl ResourceHandle for TestResource {
        fn label(&self) -> &str {
            &self.name
        }

        fn release(self: Box<Self>) -> Result<(), ResourceError> {
            self.released.lock().push(self.name.clone());
            if self.fail {
                return Err(ResourceError("simulated".into()));
            }
            Ok(())
        }
    }

    fn resource(name: &str, released: &Arc<Mutex<Vec<String>>>) -> Box<TestResource> {
        Box::new(TestResource {
            name: name.to_string(),
            released: released.clone(),
            fail: false,
        })
    }

    fn batch_entry(id: u64, index: u32, size: u32, session: SessionId) -> TradeEntry {
        TradeEntry::new(
            TradeId::new(id),
            RequesterId::new(7),
            RoutingClass::LinkTrade,
            TradePayload::new(vec![], format!("b{index}"), 1234_5678),
            false,
            BatchSlot::of(index, size),
            session,
        )
    }

    #[test]
    fn test_release_waits_for_all_terminals() {
        let coordinator = BatchCoordinator::default();
        let released = Arc::new(Mutex::new(Vec::new()));
        let session = SessionId::from_first(TradeId::new(1));

        coordinator.register(session, 3, TradeId::new(1));
        coordinator.attach_resource(session, resource("r1", &released));
        coordinator.attach_resource(session, resource("r3", &released));

        assert!(!coordinator.note_terminal(&batch_entry(1, 1, 3, session)));
        assert!(released.lock().is_empty());
        assert!(!coordinator.note_terminal(&batch_entry(2, 2, 3, session)));
        assert!(coordinator.note_terminal(&batch_entry(3, 3, 3, session)));

        assert_eq!(*released.lock(), vec!["r1", "r3"]);
        assert_eq!(coordinator.active_sessions(), 0);
    }

    #[test]
    fn test_out_of_order_terminals_release_once() {
        let coordinator = BatchCoordinator::default();
        let released = Arc::new(Mutex::new(Vec::new()));
        let session = SessionId::from_first(TradeId::new(1));

        coordinator.register(session, 3, TradeId::new(1));
        coordinator.attach_resource(session, resource("staged", &released));

        // Mixed outcomes, arbitrary order: 3 canceled first, then 1, then 2.
        assert!(!coordinator.note_terminal(&batch_entry(3, 3, 3, session)));
        assert!(!coordinator.note_terminal(&batch_entry(1, 1, 3, session)));
        assert!(coordinator.note_terminal(&batch_entry(2, 2, 3, session)));

        // A straggling duplicate after completion is a no-op.
        assert!(!coordinator.note_terminal(&batch_entry(2, 2, 3, session)));
        assert_eq!(*released.lock(), vec!["staged"]);
    }

    #[test]
    fn test_duplicate_index_does_not_complete_early() {
        let coordinator = BatchCoordinator::default();
        let session = SessionId::from_first(TradeId::new(1));
        coordinator.register(session, 3, TradeId::new(1));

        assert!(!coordinator.note_terminal(&batch_entry(1, 1, 3, session)));
        assert!(!coordinator.note_terminal(&batch_entry(1, 1, 3, session)));
        assert!(!coordinator.note_terminal(&batch_entry(2, 2, 3, session)));
        assert_eq!(coordinator.active_sessions(), 1);
    }

    #[test]
    fn test_attach_to_unknown_session_releases_immediately() {
        let coordinator = BatchCoordinator::default();
        let released = Arc::new(Mutex::new(Vec::new()));
        let session = SessionId::from_first(TradeId::new(9));

        coordinator.attach_resource(session, resource("stray", &released));
        assert_eq!(*released.lock(), vec!["stray"]);
    }

    #[test]
    fn test_release_failure_does_not_stop_remaining_handles() {
        let coordinator = BatchCoordinator::default();
        let released = Arc::new(Mutex::new(Vec::new()));
        let session = SessionId::from_first(TradeId::new(1));

        coordinator.register(session, 2, TradeId::new(1));
        coordinator.attach_resource(
            session,
            Box::new(TestResource {
                name: "bad".into(),
                released: released.clone(),
                fail: true,
            }),
        );
        coordinator.attach_resource(session, resource("good", &released));

        coordinator.note_terminal(&batch_entry(1, 1, 2, session));
        assert!(coordinator.note_terminal(&batch_entry(2, 2, 2, session)));
        assert_eq!(*released.lock(), vec!["bad", "good"]);
    }

    #[test]
    fn test_non_batch_entries_are_ignored() {
        let coordinator = BatchCoordinator::default();
        let session = SessionId::from_first(TradeId::new(1));
        let entry = TradeEntry::new(
            TradeId::new(1),
            RequesterId::new(7),
            RoutingClass::LinkTrade,
            TradePayload::new(vec![], "solo", 1234_5678),
            false,
            BatchSlot::single(),
            session,
        );
        assert!(!coordinator.note_terminal(&entry));
    }
}
