//! # alr-recon
//!
//! Reconciliation engine for the asset ledger.
//!
//! Compares each inventory source against the financial ledger, classifying
//! assets as new, existing, potentially missing, or decommissioned, and
//! maintains the unmapped staging mirrors for inventory items with no
//! ledger counterpart.

pub mod engine;

pub use engine::{
    ReconEngine, ReconError, ReconResult, ReconStatus, ReconSummary, SourceBinding, SYSTEM_ACTOR,
};
