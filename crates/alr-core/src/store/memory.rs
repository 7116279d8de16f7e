//! In-memory store implementations.
//!
//! Used by tests and by embedders that do not need a database. All of them
//! share the `Arc<RwLock<HashMap>>` shape so clones observe the same data.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    ApprovalWorkflow, AssetIdentifier, AuditLogEntry, InventoryItem, LedgerAsset, NodeType,
    UnmappedItem,
};

use super::{
    AuditSink, InventoryPage, InventorySource, LedgerStore, NotificationSink, StoreError,
    StoreResult, UnmappedMirror, WorkflowStore,
};

/// In-memory inventory source. Tests mutate its contents between passes
/// to simulate items appearing and disappearing.
#[derive(Clone)]
pub struct InMemoryInventorySource {
    node_type: NodeType,
    items: Arc<RwLock<Vec<InventoryItem>>>,
}

impl InMemoryInventorySource {
    /// Creates an empty source for one node type.
    pub fn new(node_type: NodeType) -> Self {
        Self {
            node_type,
            items: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Adds an item to the source.
    pub async fn add(&self, item: InventoryItem) {
        self.items.write().await.push(item);
    }

    /// Removes every item matching the identifier.
    pub async fn remove(&self, identifier: &AssetIdentifier) {
        self.items
            .write()
            .await
            .retain(|i| !i.identifier.matches(identifier));
    }
}

#[async_trait]
impl InventorySource for InMemoryInventorySource {
    fn node_type(&self) -> NodeType {
        self.node_type
    }

    async fn list(&self, page: usize, size: usize) -> StoreResult<InventoryPage> {
        let items = self.items.read().await;
        let total = items.len();
        let start = page.saturating_mul(size).min(total);
        let end = start.saturating_add(size).min(total);
        Ok(InventoryPage {
            items: items[start..end].to_vec(),
            total,
        })
    }

    async fn exists(&self, identifier: &AssetIdentifier) -> StoreResult<bool> {
        let items = self.items.read().await;
        Ok(items.iter().any(|i| i.identifier.matches(identifier)))
    }
}

/// In-memory ledger store with optimistic version checking.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    assets: Arc<RwLock<HashMap<Uuid, LedgerAsset>>>,
}

impl InMemoryLedgerStore {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<LedgerAsset>> {
        Ok(self.assets.read().await.get(&id).cloned())
    }

    async fn find_by_identifier(
        &self,
        identifier: &AssetIdentifier,
    ) -> StoreResult<Option<LedgerAsset>> {
        let assets = self.assets.read().await;
        Ok(assets
            .values()
            .find(|a| a.identifier.matches(identifier))
            .cloned())
    }

    async fn insert(&self, asset: &LedgerAsset) -> StoreResult<()> {
        let mut assets = self.assets.write().await;
        if assets.contains_key(&asset.id)
            || assets.values().any(|a| a.identifier.matches(&asset.identifier))
        {
            return Err(StoreError::Duplicate(asset.identifier.to_string()));
        }
        assets.insert(asset.id, asset.clone());
        Ok(())
    }

    async fn update(&self, asset: &LedgerAsset, expected_version: u64) -> StoreResult<()> {
        let mut assets = self.assets.write().await;
        let current = assets
            .get_mut(&asset.id)
            .ok_or_else(|| StoreError::not_found("ledger asset", asset.id))?;
        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                actual: current.version,
            });
        }
        let mut updated = asset.clone();
        updated.version = expected_version + 1;
        *current = updated;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.assets.write().await.remove(&id).is_some())
    }

    async fn count(&self, node_type: Option<NodeType>) -> StoreResult<usize> {
        let assets = self.assets.read().await;
        Ok(match node_type {
            Some(nt) => assets.values().filter(|a| a.node_type == nt).count(),
            None => assets.len(),
        })
    }

    async fn list_page(
        &self,
        node_type: Option<NodeType>,
        page: usize,
        size: usize,
    ) -> StoreResult<Vec<LedgerAsset>> {
        let assets = self.assets.read().await;
        let mut rows: Vec<LedgerAsset> = assets
            .values()
            .filter(|a| node_type.map(|nt| a.node_type == nt).unwrap_or(true))
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.inserted_at);
        let start = page.saturating_mul(size).min(rows.len());
        let end = start.saturating_add(size).min(rows.len());
        Ok(rows[start..end].to_vec())
    }
}

/// In-memory unmapped mirror for one node type.
#[derive(Clone)]
pub struct InMemoryUnmappedMirror {
    node_type: NodeType,
    rows: Arc<RwLock<HashMap<Uuid, UnmappedItem>>>,
}

impl InMemoryUnmappedMirror {
    /// Creates an empty mirror for one node type.
    pub fn new(node_type: NodeType) -> Self {
        Self {
            node_type,
            rows: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl UnmappedMirror for InMemoryUnmappedMirror {
    fn node_type(&self) -> NodeType {
        self.node_type
    }

    async fn find(&self, identifier: &AssetIdentifier) -> StoreResult<Vec<UnmappedItem>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|r| r.identifier.matches(identifier))
            .cloned()
            .collect())
    }

    async fn insert(&self, item: &UnmappedItem) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&item.id) {
            return Err(StoreError::Duplicate(item.id.to_string()));
        }
        rows.insert(item.id, item.clone());
        Ok(())
    }

    async fn delete_rows(&self, ids: &[Uuid]) -> StoreResult<usize> {
        let mut rows = self.rows.write().await;
        let mut removed = 0;
        for id in ids {
            if rows.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn delete_all(&self) -> StoreResult<usize> {
        let mut rows = self.rows.write().await;
        let removed = rows.len();
        rows.clear();
        Ok(removed)
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.rows.read().await.len())
    }
}

/// In-memory workflow store. Process ids come from an atomic counter, so
/// they stay distinct under concurrent allocation.
#[derive(Clone)]
pub struct InMemoryWorkflowStore {
    workflows: Arc<RwLock<HashMap<Uuid, ApprovalWorkflow>>>,
    sequence: Arc<AtomicI64>,
}

impl InMemoryWorkflowStore {
    /// Creates an empty store with the sequence starting at 1.
    pub fn new() -> Self {
        Self {
            workflows: Arc::new(RwLock::new(HashMap::new())),
            sequence: Arc::new(AtomicI64::new(1)),
        }
    }
}

impl Default for InMemoryWorkflowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn find(&self, id: Uuid) -> StoreResult<Option<ApprovalWorkflow>> {
        Ok(self.workflows.read().await.get(&id).cloned())
    }

    async fn find_open_for(
        &self,
        identifier: &AssetIdentifier,
    ) -> StoreResult<Option<ApprovalWorkflow>> {
        let workflows = self.workflows.read().await;
        Ok(workflows
            .values()
            .find(|w| w.is_open() && w.identifier.matches(identifier))
            .cloned())
    }

    async fn insert(&self, workflow: &ApprovalWorkflow) -> StoreResult<()> {
        let mut workflows = self.workflows.write().await;
        if workflows.contains_key(&workflow.id) {
            return Err(StoreError::Duplicate(workflow.id.to_string()));
        }
        workflows.insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn update(&self, workflow: &ApprovalWorkflow) -> StoreResult<()> {
        let mut workflows = self.workflows.write().await;
        if !workflows.contains_key(&workflow.id) {
            return Err(StoreError::not_found("workflow", workflow.id));
        }
        workflows.insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.workflows.write().await.remove(&id).is_some())
    }

    async fn allocate_process_id(&self) -> StoreResult<i64> {
        Ok(self.sequence.fetch_add(1, Ordering::SeqCst))
    }

    async fn count_open(&self) -> StoreResult<usize> {
        let workflows = self.workflows.read().await;
        Ok(workflows.values().filter(|w| w.is_open()).count())
    }
}

/// Audit sink that keeps entries in memory for inspection.
#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    entries: Arc<RwLock<Vec<AuditLogEntry>>>,
}

impl InMemoryAuditSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded entries, oldest first.
    pub async fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, entry: AuditLogEntry) -> StoreResult<()> {
        self.entries.write().await.push(entry);
        Ok(())
    }
}

/// Notification sink that keeps (subject, body) pairs in memory.
#[derive(Clone, Default)]
pub struct InMemoryNotificationSink {
    sent: Arc<RwLock<Vec<(String, String)>>>,
}

impl InMemoryNotificationSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All sent notifications, oldest first.
    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn send(&self, subject: &str, body: &str) -> StoreResult<()> {
        self.sent
            .write()
            .await
            .push((subject.to_string(), body.to_string()));
        Ok(())
    }
}
