//! # alr-workflow
//!
//! Three-level approval workflow engine for the asset ledger.
//!
//! Every ledger mutation (addition, modification, deletion, write-off
//! movement) is gated through an L1 to L3 approval chain with guaranteed
//! rollback to the captured prior state on rejection or cancellation.

pub mod engine;

pub use engine::{
    AssetChanges, BulkFailure, BulkOutcome, WorkflowEngine, WorkflowError, WorkflowResult,
};
