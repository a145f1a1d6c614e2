//! Trade queue daemon: configuration, logging, and a simulated worker pool
//! driving the hub end to end.

pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod sim;

pub use app::Application;
pub use config::{AppConfig, SimConfig};
pub use error::{AppError, AppResult};
