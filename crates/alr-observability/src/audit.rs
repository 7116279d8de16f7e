//! Tracing-backed audit sink.
//!
//! Keeps a bounded in-memory ring of recent transitions for inspection and
//! export, and emits each entry through tracing so the regular log pipeline
//! carries the audit trail too.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use alr_core::models::AuditLogEntry;
use alr_core::store::{AuditSink, StoreResult};

/// Audit sink with a bounded in-memory buffer and tracing output.
pub struct TracingAuditSink {
    entries: Arc<RwLock<VecDeque<AuditLogEntry>>>,
    max_entries: usize,
    log_to_tracing: bool,
}

impl TracingAuditSink {
    /// Creates a sink keeping at most `max_entries` recent entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(max_entries))),
            max_entries,
            log_to_tracing: true,
        }
    }

    /// Creates a sink without tracing output, for tests.
    pub fn without_tracing(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(max_entries))),
            max_entries,
            log_to_tracing: false,
        }
    }

    /// All buffered entries, oldest first.
    pub async fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.read().await.iter().cloned().collect()
    }

    /// Buffered entries for one asset.
    pub async fn entries_for_asset(&self, asset_id: Uuid) -> Vec<AuditLogEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.asset_id == asset_id)
            .cloned()
            .collect()
    }

    /// Exports the buffer as JSON.
    pub async fn export_json(&self) -> String {
        let entries = self.entries().await;
        serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string())
    }

    /// Number of buffered entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the buffer is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for TracingAuditSink {
    fn default() -> Self {
        Self::new(10000)
    }
}

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: AuditLogEntry) -> StoreResult<()> {
        if self.log_to_tracing {
            info!(
                asset_id = %entry.asset_id,
                node_type = %entry.node_type,
                previous = %entry.previous_status,
                new = %entry.new_status,
                "Audit: {}",
                entry.notes
            );
        }

        let mut entries = self.entries.write().await;
        if entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(entry);
        Ok(())
    }
}
