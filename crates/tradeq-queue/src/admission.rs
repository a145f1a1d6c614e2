//! Per-routing-class ordered store of trade entries.
//!
//! Enforces the one-per-requester admission rule (with favored and
//! batch-sibling exemptions) and serves entries to workers in admission
//! order, gated by batch predecessors.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use tradeq_core::{
    AdmitError, RequesterId, RoutingClass, SessionId, TradeEntry, TradeId, TradeState,
};

use crate::estimator::QueuePosition;

/// Terminal-transition failures. `DuplicateTerminal` is a defect on the
/// caller's side and must be logged, never silently accepted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TerminalError {
    /// The id is unknown or the entry was already archived.
    #[error("trade {0} is unknown or already archived")]
    UnknownTrade(TradeId),
    /// A terminal transition was already applied to this entry.
    #[error("duplicate terminal transition for trade {0}")]
    DuplicateTerminal(TradeId),
}

/// Admission policy knobs.
#[derive(Debug, Clone, Default)]
pub struct AdmissionConfig {
    /// Cap on concurrent favored entries per requester per routing class.
    /// `None` means favored entries stack without limit.
    pub max_favored_per_requester: Option<usize>,
}

#[derive(Default)]
struct Inner {
    /// Admission-ordered non-terminal entry ids, per routing class.
    lanes: HashMap<RoutingClass, Vec<TradeId>>,
    /// All non-discarded entries, addressable by id.
    entries: HashMap<TradeId, TradeEntry>,
    /// Batch indices that have reached a terminal state, per session.
    /// Used to gate `claim_next` on batch predecessors.
    session_done: HashMap<SessionId, HashSet<u32>>,
}

impl Inner {
    fn batch_ready(&self, entry: &TradeEntry) -> bool {
        if !entry.batch.is_batch() || entry.batch.index == 1 {
            return true;
        }
        let done = self.session_done.get(&entry.session);
        (1..entry.batch.index).all(|i| done.is_some_and(|set| set.contains(&i)))
    }

    fn note_session_terminal(&mut self, entry: &TradeEntry) {
        if !entry.batch.is_batch() {
            return;
        }
        let done = self.session_done.entry(entry.session).or_default();
        done.insert(entry.batch.index);
        if done.len() == entry.batch.size as usize {
            self.session_done.remove(&entry.session);
        }
    }
}

/// Ordered, per-routing-class store of trade entries.
///
/// A single exclusive lock protects membership, ordering, and the
/// per-requester outstanding view, so `admit`, `claim_next`, `cancel`, and
/// `position` appear atomic relative to each other. Queue operations never
/// block on I/O; notification delivery happens outside this lock.
pub struct AdmissionQueue {
    inner: Mutex<Inner>,
    cfg: AdmissionConfig,
}

impl Default for AdmissionQueue {
    fn default() -> Self {
        Self::new(AdmissionConfig::default())
    }
}

impl AdmissionQueue {
    /// Create a queue with the given admission policy.
    #[must_use]
    pub fn new(cfg: AdmissionConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            cfg,
        }
    }

    /// Admit an entry into its routing-class lane.
    ///
    /// Rejects with [`AdmitError::AlreadyQueued`] when the requester already
    /// holds a non-terminal entry in the same class, unless either entry is
    /// favored or both belong to the same batch session. Favored entries
    /// never collide with themselves, but an optional configured cap bounds
    /// how many may stack.
    pub fn admit(&self, entry: TradeEntry) -> Result<TradeId, AdmitError> {
        debug_assert_eq!(entry.state, TradeState::Queued);

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let lane = inner.lanes.entry(entry.routing).or_default();

        let mut favored_held = 0usize;
        for tid in lane.iter() {
            let existing = &inner.entries[tid];
            if existing.requester != entry.requester {
                continue;
            }
            if entry.batch.is_batch() && existing.session == entry.session {
                // Siblings of one batch session never collide with each other.
                continue;
            }
            if existing.favored || entry.favored {
                if existing.favored {
                    favored_held += 1;
                }
                continue;
            }
            return Err(AdmitError::AlreadyQueued);
        }

        if entry.favored {
            if let Some(cap) = self.cfg.max_favored_per_requester {
                if favored_held >= cap {
                    return Err(AdmitError::AlreadyQueued);
                }
            }
        }

        let id = entry.id;
        debug!(
            trade_id = %id,
            requester = %entry.requester,
            routing = %entry.routing,
            batch_index = entry.batch.index,
            batch_size = entry.batch.size,
            "trade admitted"
        );
        lane.push(id);
        inner.entries.insert(id, entry);
        Ok(id)
    }

    /// Claim the earliest-admitted eligible entry of a routing class.
    ///
    /// An entry is eligible when it is still `Queued` and all its batch
    /// predecessors (same session, lower index) have reached a terminal
    /// state. The claimed entry transitions to `Assigned` and leaves the
    /// pending view, but remains addressable by id until terminal.
    pub fn claim_next(&self, class: RoutingClass) -> Option<TradeEntry> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let lane = inner.lanes.get(&class)?;

        let id = lane.iter().copied().find(|tid| {
            let entry = &inner.entries[tid];
            entry.state == TradeState::Queued && inner.batch_ready(entry)
        })?;

        let entry = inner.entries.get_mut(&id).expect("lane id has entry");
        entry.state = TradeState::Assigned;
        debug!(trade_id = %id, routing = %class, "trade claimed");
        Some(entry.clone())
    }

    /// Move an assigned entry into the `Searching` phase.
    ///
    /// Returns false if the entry is unknown or not in `Assigned`.
    pub fn mark_searching(&self, id: TradeId) -> bool {
        let mut guard = self.inner.lock();
        match guard.entries.get_mut(&id) {
            Some(entry) if entry.state.may_advance_to(TradeState::Searching) => {
                entry.state = TradeState::Searching;
                true
            }
            _ => false,
        }
    }

    /// Apply a terminal transition exactly once.
    ///
    /// The first caller wins; later callers get `DuplicateTerminal`. Returns
    /// a snapshot of the entry with its terminal state applied.
    pub fn resolve(&self, id: TradeId, terminal: TradeState) -> Result<TradeEntry, TerminalError> {
        debug_assert!(terminal.is_terminal());

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let entry = inner
            .entries
            .get_mut(&id)
            .ok_or(TerminalError::UnknownTrade(id))?;
        if entry.state.is_terminal() {
            return Err(TerminalError::DuplicateTerminal(id));
        }

        entry.state = terminal;
        let snapshot = entry.clone();
        if let Some(lane) = inner.lanes.get_mut(&snapshot.routing) {
            lane.retain(|tid| *tid != id);
        }
        inner.note_session_terminal(&snapshot);
        debug!(trade_id = %id, state = %terminal, "trade resolved");
        Ok(snapshot)
    }

    /// Cancel a non-terminal entry. Idempotent: canceling an entry that is
    /// already terminal (or unknown) is a no-op returning false.
    pub fn cancel(&self, id: TradeId) -> bool {
        self.resolve(id, TradeState::Canceled).is_ok()
    }

    /// Cancel every still-queued entry of a routing class, returning the
    /// canceled snapshots. Entries already claimed by a worker are left to
    /// their workers.
    pub fn clear_class(&self, class: RoutingClass) -> Vec<TradeEntry> {
        let queued: Vec<TradeId> = {
            let guard = self.inner.lock();
            guard
                .lanes
                .get(&class)
                .map(|lane| {
                    lane.iter()
                        .copied()
                        .filter(|tid| guard.entries[tid].state == TradeState::Queued)
                        .collect()
                })
                .unwrap_or_default()
        };

        queued
            .into_iter()
            .filter_map(|id| self.resolve(id, TradeState::Canceled).ok())
            .collect()
    }

    /// Snapshot an entry by id.
    #[must_use]
    pub fn snapshot(&self, id: TradeId) -> Option<TradeEntry> {
        self.inner.lock().entries.get(&id).cloned()
    }

    /// Drop the archived record of a terminal entry.
    pub fn discard(&self, id: TradeId) {
        let mut guard = self.inner.lock();
        match guard.entries.get(&id) {
            Some(entry) if entry.state.is_terminal() => {
                guard.entries.remove(&id);
            }
            Some(_) => warn!(trade_id = %id, "refusing to discard non-terminal trade"),
            None => {}
        }
    }

    /// 1-based rank of an entry among all non-terminal entries of its class,
    /// ordered by admission time. Returns `None` when the id is absent from
    /// the lane or belongs to a different requester.
    #[must_use]
    pub fn position(
        &self,
        requester: RequesterId,
        id: TradeId,
        class: RoutingClass,
    ) -> Option<QueuePosition> {
        let guard = self.inner.lock();
        let lane = guard.lanes.get(&class)?;
        let idx = lane.iter().position(|tid| *tid == id)?;
        if guard.entries[&id].requester != requester {
            return None;
        }
        Some(QueuePosition {
            rank: idx + 1,
            ahead: idx,
        })
    }

    /// Batch predecessors of an entry that still need service time but are
    /// invisible to `position`: slots `1..index` that are neither terminal
    /// nor currently admitted (siblings submitted one at a time).
    ///
    /// Non-terminal predecessors already admitted contribute to the entry's
    /// rank, and terminal ones cost nothing, so neither group counts here.
    #[must_use]
    pub fn missing_predecessors(&self, id: TradeId) -> Option<usize> {
        let guard = self.inner.lock();
        let entry = guard.entries.get(&id)?;
        if !entry.batch.is_batch() {
            return Some(0);
        }
        let done = guard.session_done.get(&entry.session);
        let count = (1..entry.batch.index)
            .filter(|i| {
                !done.is_some_and(|set| set.contains(i))
                    && !guard
                        .entries
                        .values()
                        .any(|e| e.session == entry.session && e.batch.index == *i)
            })
            .count();
        Some(count)
    }

    /// Number of entries still waiting to be claimed in a class.
    #[must_use]
    pub fn depth(&self, class: RoutingClass) -> usize {
        let guard = self.inner.lock();
        guard
            .lanes
            .get(&class)
            .map(|lane| {
                lane.iter()
                    .filter(|tid| guard.entries[*tid].state == TradeState::Queued)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Number of non-terminal entries in a class (queued plus in-flight).
    #[must_use]
    pub fn active(&self, class: RoutingClass) -> usize {
        self.inner
            .lock()
            .lanes
            .get(&class)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradeq_core::{BatchSlot, TradePayload};

    fn entry(id: u64, requester: u64, class: RoutingClass) -> TradeEntry {
        TradeEntry::new(
            TradeId::new(id),
            RequesterId::new(requester),
            class,
            TradePayload::new(vec![id as u8], format!("trade-{id}"), 1234_5678),
            false,
            BatchSlot::single(),
            SessionId::from_first(TradeId::new(id)),
        )
    }

    fn batch_entry(id: u64, requester: u64, index: u32, size: u32, session: u64) -> TradeEntry {
        TradeEntry::new(
            TradeId::new(id),
            RequesterId::new(requester),
            RoutingClass::LinkTrade,
            TradePayload::new(vec![], format!("batch-{index}"), 1234_5678),
            false,
            BatchSlot::of(index, size),
            SessionId::from_first(TradeId::new(session)),
        )
    }

    #[test]
    fn test_second_entry_for_requester_rejected() {
        let queue = AdmissionQueue::default();
        queue.admit(entry(1, 7, RoutingClass::LinkTrade)).unwrap();

        let err = queue
            .admit(entry(2, 7, RoutingClass::LinkTrade))
            .unwrap_err();
        assert_eq!(err, AdmitError::AlreadyQueued);
        assert_eq!(queue.depth(RoutingClass::LinkTrade), 1);
    }

    #[test]
    fn test_same_requester_different_class_admitted() {
        let queue = AdmissionQueue::default();
        queue.admit(entry(1, 7, RoutingClass::LinkTrade)).unwrap();
        queue.admit(entry(2, 7, RoutingClass::CloneTrade)).unwrap();
        assert_eq!(queue.depth(RoutingClass::CloneTrade), 1);
    }

    #[test]
    fn test_favored_entries_stack() {
        let queue = AdmissionQueue::default();
        let mut first = entry(1, 7, RoutingClass::LinkTrade);
        first.favored = true;
        let mut second = entry(2, 7, RoutingClass::LinkTrade);
        second.favored = true;

        queue.admit(first).unwrap();
        queue.admit(second).unwrap();
        assert_eq!(queue.depth(RoutingClass::LinkTrade), 2);
    }

    #[test]
    fn test_favored_cap_bounds_stacking() {
        let queue = AdmissionQueue::new(AdmissionConfig {
            max_favored_per_requester: Some(2),
        });
        for id in 1..=2 {
            let mut e = entry(id, 7, RoutingClass::LinkTrade);
            e.favored = true;
            queue.admit(e).unwrap();
        }

        let mut third = entry(3, 7, RoutingClass::LinkTrade);
        third.favored = true;
        assert_eq!(queue.admit(third).unwrap_err(), AdmitError::AlreadyQueued);
    }

    #[test]
    fn test_batch_siblings_do_not_collide() {
        let queue = AdmissionQueue::default();
        for index in 1..=3 {
            queue
                .admit(batch_entry(index as u64, 7, index, 3, 1))
                .unwrap();
        }
        assert_eq!(queue.depth(RoutingClass::LinkTrade), 3);

        // A fourth, unrelated entry from the same requester still collides.
        let err = queue
            .admit(entry(9, 7, RoutingClass::LinkTrade))
            .unwrap_err();
        assert_eq!(err, AdmitError::AlreadyQueued);
    }

    #[test]
    fn test_claim_follows_admission_order() {
        let queue = AdmissionQueue::default();
        for (id, requester) in [(1, 10), (2, 11), (3, 12)] {
            queue.admit(entry(id, requester, RoutingClass::LinkTrade)).unwrap();
        }

        let a = queue.claim_next(RoutingClass::LinkTrade).unwrap();
        let b = queue.claim_next(RoutingClass::LinkTrade).unwrap();
        let c = queue.claim_next(RoutingClass::LinkTrade).unwrap();
        assert_eq!(
            [a.id, b.id, c.id],
            [TradeId::new(1), TradeId::new(2), TradeId::new(3)]
        );
        assert_eq!(a.state, TradeState::Assigned);
        assert!(queue.claim_next(RoutingClass::LinkTrade).is_none());
    }

    #[test]
    fn test_batch_predecessors_gate_claims() {
        let queue = AdmissionQueue::default();
        for index in 1..=3 {
            queue
                .admit(batch_entry(index as u64, 7, index, 3, 1))
                .unwrap();
        }

        let first = queue.claim_next(RoutingClass::LinkTrade).unwrap();
        assert_eq!(first.batch.index, 1);
        // Index 2 is not claimable until index 1 is terminal.
        assert!(queue.claim_next(RoutingClass::LinkTrade).is_none());

        queue.resolve(first.id, TradeState::Finished).unwrap();
        let second = queue.claim_next(RoutingClass::LinkTrade).unwrap();
        assert_eq!(second.batch.index, 2);
    }

    #[test]
    fn test_late_sibling_cancel_does_not_block_earlier_entries() {
        let queue = AdmissionQueue::default();
        for index in 1..=3 {
            queue
                .admit(batch_entry(index as u64, 7, index, 3, 1))
                .unwrap();
        }

        // Cancel index 3 while 1 and 2 are still queued.
        assert!(queue.cancel(TradeId::new(3)));

        let first = queue.claim_next(RoutingClass::LinkTrade).unwrap();
        assert_eq!(first.batch.index, 1);
        queue.resolve(first.id, TradeState::Finished).unwrap();

        let second = queue.claim_next(RoutingClass::LinkTrade).unwrap();
        assert_eq!(second.batch.index, 2);
    }

    #[test]
    fn test_missing_predecessors_counts_only_unsubmitted_slots() {
        let queue = AdmissionQueue::default();

        // Index 3 submitted alone: slots 1 and 2 still need service time.
        queue.admit(batch_entry(3, 7, 3, 3, 1)).unwrap();
        assert_eq!(queue.missing_predecessors(TradeId::new(3)), Some(2));

        // Admitting index 1 makes it visible to `position`, so it no longer
        // counts; a terminal predecessor costs nothing either.
        queue.admit(batch_entry(1, 7, 1, 3, 1)).unwrap();
        assert_eq!(queue.missing_predecessors(TradeId::new(3)), Some(1));
        queue.admit(batch_entry(2, 7, 2, 3, 1)).unwrap();
        assert_eq!(queue.missing_predecessors(TradeId::new(3)), Some(0));

        queue.cancel(TradeId::new(1));
        queue.discard(TradeId::new(1));
        assert_eq!(queue.missing_predecessors(TradeId::new(3)), Some(0));

        // Non-batch entries never have predecessors.
        queue.admit(entry(9, 8, RoutingClass::LinkTrade)).unwrap();
        assert_eq!(queue.missing_predecessors(TradeId::new(9)), Some(0));
        assert_eq!(queue.missing_predecessors(TradeId::new(42)), None);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let queue = AdmissionQueue::default();
        queue.admit(entry(1, 7, RoutingClass::LinkTrade)).unwrap();

        assert!(queue.cancel(TradeId::new(1)));
        assert!(!queue.cancel(TradeId::new(1)));
        assert!(!queue.cancel(TradeId::new(1)));
        assert_eq!(
            queue.snapshot(TradeId::new(1)).unwrap().state,
            TradeState::Canceled
        );
    }

    #[test]
    fn test_duplicate_terminal_detected() {
        let queue = AdmissionQueue::default();
        queue.admit(entry(1, 7, RoutingClass::LinkTrade)).unwrap();
        queue.claim_next(RoutingClass::LinkTrade).unwrap();

        queue.resolve(TradeId::new(1), TradeState::Finished).unwrap();
        let err = queue
            .resolve(TradeId::new(1), TradeState::Canceled)
            .unwrap_err();
        assert_eq!(err, TerminalError::DuplicateTerminal(TradeId::new(1)));
    }

    #[test]
    fn test_position_counts_in_flight_entries() {
        let queue = AdmissionQueue::default();
        for (id, requester) in [(1, 10), (2, 11), (3, 12)] {
            queue.admit(entry(id, requester, RoutingClass::LinkTrade)).unwrap();
        }
        queue.claim_next(RoutingClass::LinkTrade).unwrap();

        // The claimed entry is still non-terminal and keeps rank 1.
        let pos = queue
            .position(RequesterId::new(11), TradeId::new(2), RoutingClass::LinkTrade)
            .unwrap();
        assert_eq!(pos.rank, 2);
        assert_eq!(pos.ahead, 1);
    }

    #[test]
    fn test_position_visible_immediately_after_cancel() {
        let queue = AdmissionQueue::default();
        for (id, requester) in [(1, 10), (2, 11)] {
            queue.admit(entry(id, requester, RoutingClass::LinkTrade)).unwrap();
        }
        queue.cancel(TradeId::new(1));

        let pos = queue
            .position(RequesterId::new(11), TradeId::new(2), RoutingClass::LinkTrade)
            .unwrap();
        assert_eq!(pos.rank, 1);
    }

    #[test]
    fn test_clear_class_cancels_only_queued() {
        let queue = AdmissionQueue::default();
        for (id, requester) in [(1, 10), (2, 11), (3, 12)] {
            queue.admit(entry(id, requester, RoutingClass::LinkTrade)).unwrap();
        }
        let claimed = queue.claim_next(RoutingClass::LinkTrade).unwrap();

        let drained = queue.clear_class(RoutingClass::LinkTrade);
        assert_eq!(drained.len(), 2);
        assert_eq!(queue.depth(RoutingClass::LinkTrade), 0);
        // The in-flight entry is untouched.
        assert_eq!(
            queue.snapshot(claimed.id).unwrap().state,
            TradeState::Assigned
        );
    }

    #[test]
    fn test_discard_removes_only_terminal_entries() {
        let queue = AdmissionQueue::default();
        queue.admit(entry(1, 7, RoutingClass::LinkTrade)).unwrap();

        queue.discard(TradeId::new(1));
        assert!(queue.snapshot(TradeId::new(1)).is_some());

        queue.cancel(TradeId::new(1));
        queue.discard(TradeId::new(1));
        assert!(queue.snapshot(TradeId::new(1)).is_none());
    }
}
