//! Admission queue and wait estimation.
//!
//! The [`AdmissionQueue`] is the single shared mutable resource of the core:
//! one exclusive lock makes `admit`, `claim_next`, and `cancel` atomic
//! relative to each other. The estimator is pure arithmetic over the queue's
//! ordering.

pub mod admission;
pub mod estimator;

pub use admission::{AdmissionConfig, AdmissionQueue, TerminalError};
pub use estimator::{estimate_eta_minutes, estimate_session_eta_minutes, QueuePosition};
