//! Sender reputation gate

mod monitor;

pub use monitor::{HealthAction, HealthMonitor, HealthReport};
