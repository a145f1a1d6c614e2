//! Daemon configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use tradeq_hub::HubConfig;

use crate::error::{AppError, AppResult};

/// Top-level configuration, loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Hub tunables (admission, estimation, notification).
    #[serde(default)]
    pub hub: HubConfig,

    /// Simulated workload settings.
    #[serde(default)]
    pub sim: SimConfig,
}

/// Simulated workload shape for the demo daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Worker loops to run.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Standalone trades to submit, one per synthetic requester.
    #[serde(default = "default_trades")]
    pub trades: u32,

    /// Size of the one batch session the demo submits. Zero skips the batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Simulated per-trade service time in milliseconds.
    #[serde(default = "default_service_ms")]
    pub service_ms: u64,

    /// Every Nth trade fails with a worker fault. Zero disables faults.
    #[serde(default)]
    pub fault_every: u32,

    /// Every Nth trade is submitted as a mystery variant. Zero disables.
    #[serde(default = "default_mystery_every")]
    pub mystery_every: u32,
}

fn default_workers() -> usize {
    2
}

fn default_trades() -> u32 {
    8
}

fn default_batch_size() -> u32 {
    3
}

fn default_service_ms() -> u64 {
    50
}

fn default_mystery_every() -> u32 {
    4
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            trades: default_trades(),
            batch_size: default_batch_size(),
            service_ms: default_service_ms(),
            fault_every: 0,
            mystery_every: default_mystery_every(),
        }
    }
}

impl AppConfig {
    /// Load from `path` if it exists, falling back to defaults otherwise.
    pub fn load_or_default(config_path: &str) -> AppResult<Self> {
        if Path::new(config_path).exists() {
            Self::from_file(config_path)
        } else {
            tracing::warn!(path = %config_path, "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("failed to read config: {e}")))?;

        toml::from_str(&content).map_err(|e| AppError::Config(format!("failed to parse config: {e}")))
    }
}
