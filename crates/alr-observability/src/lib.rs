//! # alr-observability
//!
//! Logging initialization, a tracing-backed audit sink, and a log-only
//! notification sink for the asset ledger reconciler.

pub mod audit;
pub mod logging;
pub mod notify;

pub use audit::TracingAuditSink;
pub use logging::{init_logging, init_logging_with_config, LoggingConfig};
pub use notify::LogNotificationSink;
