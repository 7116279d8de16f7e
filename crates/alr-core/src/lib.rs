//! # alr-core
//!
//! Core data model, store traits, and depreciation calculator for the
//! asset ledger reconciler.
//!
//! This crate provides the ledger and inventory models, the store traits
//! the engines depend on (with in-memory implementations for tests and
//! embedding), the straight-line depreciation calculator, and the shared
//! configuration loader.

pub mod config;
pub mod depreciation;
pub mod models;
pub mod money;
pub mod store;

pub use config::{ConfigError, Settings, CONFIG_ENV_VAR};
pub use depreciation::{
    calculate as calculate_depreciation, DepreciationError, DepreciationInput,
    DepreciationSchedule,
};
pub use models::{
    ApprovalState, ApprovalWorkflow, AssetIdentifier, AuditLogEntry, InventoryItem, LedgerAsset,
    ModelError, NodeType, StateSnapshot, StatusFlag, UnmappedItem, WorkflowComment, WorkflowKind,
};
pub use store::{
    AuditSink, InventoryPage, InventorySource, LedgerStore, NotificationSink, StoreError,
    StoreResult, UnmappedMirror, WorkflowStore,
};
