//! Inventory and unmapped-mirror data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::asset::{AssetIdentifier, NodeType};

/// One row from an external inventory source. Read-only from the core's
/// perspective.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryItem {
    /// Business identifier of the physical item.
    pub identifier: AssetIdentifier,
    /// Which inventory this item came from.
    pub node_type: NodeType,
    /// Descriptive attributes carried along verbatim.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl InventoryItem {
    /// Creates an item with no descriptive attributes.
    pub fn new(identifier: AssetIdentifier, node_type: NodeType) -> Self {
        Self {
            identifier,
            node_type,
            attributes: HashMap::new(),
        }
    }
}

/// Staging row mirroring an inventory item that has no ledger counterpart.
///
/// Keyed by its own row id so a reconciliation match can delete exactly the
/// row(s) it matched, not every row sharing a serial.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnmappedItem {
    /// Unique row id.
    pub id: Uuid,
    /// Business identifier of the unmatched item.
    pub identifier: AssetIdentifier,
    /// Which inventory the item came from.
    pub node_type: NodeType,
    /// Descriptive attributes copied from the inventory row.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    /// Who mirrored the row.
    pub inserted_by: String,
    /// When the row was mirrored.
    pub inserted_at: DateTime<Utc>,
}

impl UnmappedItem {
    /// Mirrors an inventory item into a new staging row.
    pub fn from_inventory(item: &InventoryItem, inserted_by: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            identifier: item.identifier.clone(),
            node_type: item.node_type,
            attributes: item.attributes.clone(),
            inserted_by: inserted_by.to_string(),
            inserted_at: Utc::now(),
        }
    }
}
