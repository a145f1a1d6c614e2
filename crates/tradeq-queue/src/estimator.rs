//! Wait-time estimation from queue rank and worker throughput.
//!
//! This is an estimator, not a promise: actual wait may exceed the estimate
//! if a worker stalls or a favored request lands ahead.

/// A requester's rank within its routing class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePosition {
    /// 1-based position among all non-terminal entries of the class.
    pub rank: usize,
    /// Entries ahead of this one.
    pub ahead: usize,
}

/// Estimated minutes until a trade at `rank` is served, assuming the worker
/// pool drains the lane round-robin.
///
/// Ranks within the worker count are expected to be served immediately.
/// With no workers the wait is unbounded and the estimate is infinite.
#[must_use]
pub fn estimate_eta_minutes(rank: usize, worker_count: usize, mean_service_minutes: f64) -> f64 {
    if worker_count == 0 {
        return f64::INFINITY;
    }
    if rank <= worker_count {
        return 0.0;
    }
    let rounds = (rank - worker_count).div_ceil(worker_count);
    rounds as f64 * mean_service_minutes
}

/// Estimated minutes until the final entry of a batch session completes.
///
/// Same-session entries are served sequentially, so the session's last entry
/// waits an extra `(batch_size - 1) * mean_service_minutes` beyond the first
/// entry's wait.
#[must_use]
pub fn estimate_session_eta_minutes(
    rank: usize,
    worker_count: usize,
    mean_service_minutes: f64,
    batch_size: u32,
) -> f64 {
    let base = estimate_eta_minutes(rank, worker_count, mean_service_minutes);
    base + f64::from(batch_size.saturating_sub(1)) * mean_service_minutes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_within_worker_count_is_immediate() {
        assert_eq!(estimate_eta_minutes(1, 2, 5.0), 0.0);
        assert_eq!(estimate_eta_minutes(2, 2, 5.0), 0.0);
    }

    #[test]
    fn test_round_robin_drain() {
        // One worker, two-minute trades: second in line waits one round.
        assert_eq!(estimate_eta_minutes(2, 1, 2.0), 2.0);
        assert_eq!(estimate_eta_minutes(3, 1, 2.0), 4.0);

        // Three workers drain three entries per round.
        assert_eq!(estimate_eta_minutes(4, 3, 2.0), 2.0);
        assert_eq!(estimate_eta_minutes(6, 3, 2.0), 2.0);
        assert_eq!(estimate_eta_minutes(7, 3, 2.0), 4.0);
    }

    #[test]
    fn test_eta_monotone_in_rank() {
        for workers in 1..=4 {
            let mut prev = 0.0;
            for rank in 1..=40 {
                let eta = estimate_eta_minutes(rank, workers, 1.5);
                assert!(eta >= prev, "eta decreased at rank {rank}");
                prev = eta;
            }
        }
    }

    #[test]
    fn test_no_workers_means_unbounded_wait() {
        assert!(estimate_eta_minutes(1, 0, 2.0).is_infinite());
    }

    #[test]
    fn test_session_eta_adds_sequential_service() {
        // Batch of three at the head of the queue: two extra service slots.
        assert_eq!(estimate_session_eta_minutes(1, 1, 2.0, 3), 4.0);
        // Non-batch sessions add nothing.
        assert_eq!(
            estimate_session_eta_minutes(2, 1, 2.0, 1),
            estimate_eta_minutes(2, 1, 2.0)
        );
    }
}
