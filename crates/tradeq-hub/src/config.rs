//! Hub configuration.

use serde::{Deserialize, Serialize};

use tradeq_core::MAX_TRADE_CODE;

/// Tunables for admission, estimation, and notification delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Lowest accepted pairing code.
    #[serde(default = "default_min_trade_code")]
    pub min_trade_code: u32,

    /// Highest accepted pairing code.
    #[serde(default = "default_max_trade_code")]
    pub max_trade_code: u32,

    /// Assumed mean service time per trade, in minutes. Drives wait
    /// estimates only, never scheduling.
    #[serde(default = "default_mean_service_minutes")]
    pub mean_service_minutes: f64,

    /// Cap on concurrent favored entries per requester per routing class.
    /// Absent means favored entries stack without limit.
    #[serde(default)]
    pub max_favored_per_requester: Option<usize>,

    /// Per-requester notification channel depth. Events past this are
    /// dropped rather than blocking the queue.
    #[serde(default = "default_notify_queue_depth")]
    pub notify_queue_depth: usize,
}

fn default_min_trade_code() -> u32 {
    0
}

fn default_max_trade_code() -> u32 {
    MAX_TRADE_CODE
}

fn default_mean_service_minutes() -> f64 {
    1.0
}

fn default_notify_queue_depth() -> usize {
    64
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            min_trade_code: default_min_trade_code(),
            max_trade_code: default_max_trade_code(),
            mean_service_minutes: default_mean_service_minutes(),
            max_favored_per_requester: None,
            notify_queue_depth: default_notify_queue_depth(),
        }
    }
}
