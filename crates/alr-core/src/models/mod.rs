//! Data models for the asset ledger reconciler.

pub mod asset;
pub mod audit;
pub mod inventory;
pub mod workflow;

pub use asset::{
    ApprovalState, AssetIdentifier, LedgerAsset, ModelError, NodeType, StateSnapshot, StatusFlag,
    SNAPSHOT_SCHEMA_VERSION,
};
pub use audit::AuditLogEntry;
pub use inventory::{InventoryItem, UnmappedItem};
pub use workflow::{ApprovalWorkflow, WorkflowComment, WorkflowKind};
