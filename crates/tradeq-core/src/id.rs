//! Correlation identifier generation with monotonic guarantees.
//!
//! Every submitted trade is tagged with a `TradeId` that is unique for the
//! process lifetime and trends with wall-clock time so the id remains useful
//! for human correlation in logs.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// How many ids fit inside one wall-clock millisecond before the counter
/// outruns the clock component.
const ID_STRIDE: u64 = 1000;

/// Unique correlation identifier for a queued trade.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct TradeId(u64);

impl TradeId {
    /// Wrap a raw id value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw id value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TradeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trait for obtaining current time, enabling testability.
pub trait Clock: Send + Sync {
    /// Returns current time in milliseconds since Unix epoch.
    fn now_ms(&self) -> u64;
}

/// System clock implementation using real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time before Unix epoch")
            .as_millis() as u64
    }
}

/// Generates process-unique, monotonically increasing trade ids.
///
/// # Guarantees
/// - Never returns the same id twice for the process lifetime
/// - Ids are strictly increasing, even if the clock goes backward
/// - Thread-safe for concurrent admission paths
///
/// The counter is seeded from the wall clock scaled by [`ID_STRIDE`], and each
/// call returns `max(last + 1, now_ms * ID_STRIDE)`. A backwards clock step
/// simply falls back to the `last + 1` path and can never regress into a
/// previously issued id.
pub struct IdGenerator<C: Clock = SystemClock> {
    /// Last issued id (monotonically increasing counter).
    counter: AtomicU64,
    /// Clock source for current time.
    clock: C,
}

impl IdGenerator<SystemClock> {
    /// Creates a generator backed by the system clock.
    #[must_use]
    pub fn with_system_clock() -> Self {
        Self::new(SystemClock)
    }
}

impl Default for IdGenerator<SystemClock> {
    fn default() -> Self {
        Self::with_system_clock()
    }
}

impl<C: Clock> IdGenerator<C> {
    /// Creates a new generator with the given clock.
    #[must_use]
    pub fn new(clock: C) -> Self {
        let seed = clock.now_ms().saturating_mul(ID_STRIDE);
        Self {
            counter: AtomicU64::new(seed),
            clock,
        }
    }

    /// Generates the next trade id.
    ///
    /// Thread-safe via CAS loop.
    pub fn next(&self) -> TradeId {
        let target = self.clock.now_ms().saturating_mul(ID_STRIDE);

        loop {
            let current = self.counter.load(Ordering::Acquire);
            let next_val = current.saturating_add(1).max(target);

            match self.counter.compare_exchange_weak(
                current,
                next_val,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return TradeId(next_val),
                Err(_) => continue,
            }
        }
    }

    /// Last issued id, for diagnostics.
    #[must_use]
    pub fn last_issued(&self) -> TradeId {
        TradeId(self.counter.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    /// Manually driven clock for deterministic tests.
    struct ManualClock(AtomicU64);

    impl Clock for ManualClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::Acquire)
        }
    }

    #[test]
    fn test_ids_are_strictly_increasing() {
        let gen = IdGenerator::with_system_clock();
        let mut prev = gen.next();
        for _ in 0..10_000 {
            let id = gen.next();
            assert!(id > prev);
            prev = id;
        }
    }

    #[test]
    fn test_ids_unique_across_threads() {
        let gen = Arc::new(IdGenerator::with_system_clock());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let gen = Arc::clone(&gen);
            handles.push(std::thread::spawn(move || {
                (0..2000).map(|_| gen.next()).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 8 * 2000);
    }

    #[test]
    fn test_backwards_clock_does_not_regress() {
        let gen = IdGenerator::new(ManualClock(AtomicU64::new(5_000)));
        let before = gen.next();

        // Clock jumps backward by four seconds.
        let clock = &gen.clock;
        clock.0.store(1_000, Ordering::Release);

        let after = gen.next();
        assert!(after > before);
    }

    #[test]
    fn test_ids_track_clock_when_it_advances() {
        let gen = IdGenerator::new(ManualClock(AtomicU64::new(1_000)));
        let _ = gen.next();

        gen.clock.0.store(9_000, Ordering::Release);
        let id = gen.next();
        assert_eq!(id.value(), 9_000 * 1000);
    }
}
