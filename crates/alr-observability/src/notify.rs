//! Log-only notification sink.
//!
//! Delivery mechanics (mail, chat) live outside the core; this sink keeps
//! the notification path exercised by writing every message to the log.

use async_trait::async_trait;
use tracing::info;

use alr_core::store::{NotificationSink, StoreResult};

/// Notification sink that logs instead of delivering.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotificationSink;

impl LogNotificationSink {
    /// Creates the sink.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn send(&self, subject: &str, body: &str) -> StoreResult<()> {
        info!(subject, "Notification: {body}");
        Ok(())
    }
}
