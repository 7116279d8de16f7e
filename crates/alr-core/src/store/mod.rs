//! Store traits for the ledger, inventory sources, staging mirrors,
//! workflows, audit log, and notifications.
//!
//! The engines depend only on these traits. In-memory implementations
//! backed by `Arc<RwLock<HashMap>>` live in [`memory`] and are used by
//! tests and embedders without a database.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    ApprovalWorkflow, AssetIdentifier, AuditLogEntry, InventoryItem, LedgerAsset, NodeType,
    UnmappedItem,
};

/// Errors that can occur in a store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Entity not found.
    #[error("not found: {entity} {id}")]
    NotFound { entity: &'static str, id: String },
    /// A row with the same key already exists.
    #[error("duplicate: {0}")]
    Duplicate(String),
    /// Optimistic version check failed.
    #[error("version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },
    /// The backing store is temporarily unreachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Builds a not-found error for an entity and key.
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether a bounded retry is worth attempting.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::VersionConflict { .. } | StoreError::Unavailable(_)
        )
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// One page of inventory rows plus the source's total row count.
#[derive(Debug, Clone)]
pub struct InventoryPage {
    /// Rows in this page.
    pub items: Vec<InventoryItem>,
    /// Total rows in the source.
    pub total: usize,
}

/// A read-only external inventory for one node type.
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// The node type this source covers.
    fn node_type(&self) -> NodeType;

    /// Fetch one page of inventory rows. Pages are zero-based.
    async fn list(&self, page: usize, size: usize) -> StoreResult<InventoryPage>;

    /// Whether an identifier is currently present in the source.
    async fn exists(&self, identifier: &AssetIdentifier) -> StoreResult<bool>;
}

/// The financial ledger, the single multiply-mutated store.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Find an asset by its row id.
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<LedgerAsset>>;

    /// Find an asset whose identifier matches on name or serial.
    async fn find_by_identifier(
        &self,
        identifier: &AssetIdentifier,
    ) -> StoreResult<Option<LedgerAsset>>;

    /// Insert a new asset. Fails with `Duplicate` when the identifier
    /// already exists.
    async fn insert(&self, asset: &LedgerAsset) -> StoreResult<()>;

    /// Update an asset, checking its optimistic version token. On success
    /// the stored version is `expected_version + 1`; the caller's copy is
    /// stale afterwards.
    async fn update(&self, asset: &LedgerAsset, expected_version: u64) -> StoreResult<()>;

    /// Delete an asset row. Returns whether a row was removed.
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;

    /// Count assets, optionally for a single node type.
    async fn count(&self, node_type: Option<NodeType>) -> StoreResult<usize>;

    /// One zero-based page of assets, optionally filtered by node type,
    /// ordered by insertion time.
    async fn list_page(
        &self,
        node_type: Option<NodeType>,
        page: usize,
        size: usize,
    ) -> StoreResult<Vec<LedgerAsset>>;
}

/// Staging mirror of inventory rows with no ledger counterpart, one per
/// node type.
#[async_trait]
pub trait UnmappedMirror: Send + Sync {
    /// The node type this mirror covers.
    fn node_type(&self) -> NodeType;

    /// All mirror rows matching an identifier. More than one row can match
    /// when records coincidentally share a serial or name.
    async fn find(&self, identifier: &AssetIdentifier) -> StoreResult<Vec<UnmappedItem>>;

    /// Insert a staging row.
    async fn insert(&self, item: &UnmappedItem) -> StoreResult<()>;

    /// Delete exactly the given rows. Returns how many were removed.
    async fn delete_rows(&self, ids: &[Uuid]) -> StoreResult<usize>;

    /// Clear the mirror.
    async fn delete_all(&self) -> StoreResult<usize>;

    /// Count staging rows.
    async fn count(&self) -> StoreResult<usize>;
}

/// Storage for approval workflow rows and the process-id sequence.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Find a workflow by its row id.
    async fn find(&self, id: Uuid) -> StoreResult<Option<ApprovalWorkflow>>;

    /// Find the open (pending) workflow for an identifier, if any.
    async fn find_open_for(
        &self,
        identifier: &AssetIdentifier,
    ) -> StoreResult<Option<ApprovalWorkflow>>;

    /// Insert a workflow row.
    async fn insert(&self, workflow: &ApprovalWorkflow) -> StoreResult<()>;

    /// Update a workflow row.
    async fn update(&self, workflow: &ApprovalWorkflow) -> StoreResult<()>;

    /// Delete a workflow row. Returns whether a row was removed.
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;

    /// Allocate the next process id from a monotonic sequence. Values are
    /// unique across every workflow ever created, including concurrent
    /// callers.
    async fn allocate_process_id(&self) -> StoreResult<i64>;

    /// Count open workflows.
    async fn count_open(&self) -> StoreResult<usize>;
}

/// Append-only audit trail. Callers treat failures as non-fatal.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record one status transition.
    async fn record(&self, entry: AuditLogEntry) -> StoreResult<()>;
}

/// Outbound notifications. Best-effort; callers swallow failures.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Send a notification.
    async fn send(&self, subject: &str, body: &str) -> StoreResult<()>;
}
