//! Append-only audit log entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::asset::NodeType;

/// One status transition on a ledger asset. Entries are append-only and
/// outlive the workflow rows that produced them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditLogEntry {
    /// The asset the transition happened on.
    pub asset_id: Uuid,
    /// Serial number at the time of the transition, when known.
    pub serial_number: Option<String>,
    /// Which inventory the asset belongs to.
    pub node_type: NodeType,
    /// Status before the transition.
    pub previous_status: String,
    /// Status after the transition.
    pub new_status: String,
    /// Free-text context for the transition.
    pub notes: String,
    /// When the transition was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Creates an entry stamped now.
    pub fn new(
        asset_id: Uuid,
        serial_number: Option<String>,
        node_type: NodeType,
        previous_status: impl Into<String>,
        new_status: impl Into<String>,
        notes: impl Into<String>,
    ) -> Self {
        Self {
            asset_id,
            serial_number,
            node_type,
            previous_status: previous_status.into(),
            new_status: new_status.into(),
            notes: notes.into(),
            recorded_at: Utc::now(),
        }
    }
}
