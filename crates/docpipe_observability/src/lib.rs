//! Observability: usage rows, per-job completion logging, metrics, and the health report (§4.M).

pub mod health;
pub mod metrics;
pub mod usage_log;

pub use health::{HealthReport, HealthStatus, HealthTracker};
pub use metrics::{Metrics, METRICS};
pub use usage_log::{log_job_completion, log_usage_row};
