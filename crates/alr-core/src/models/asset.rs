//! Ledger asset data model.
//!
//! The `LedgerAsset` is the financial record-of-truth for one physical or
//! IT asset. Reconciliation mutates its status flags; the approval workflow
//! mutates its financial fields behind a snapshot/restore gate.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Schema version carried by every captured snapshot. Restore refuses a
/// snapshot whose version it does not understand.
pub const SNAPSHOT_SCHEMA_VERSION: u16 = 1;

/// Errors raised by model-level validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Neither asset name nor serial number was provided.
    #[error("an asset identifier requires an asset name or a serial number")]
    EmptyIdentifier,
    /// A snapshot could not be applied.
    #[error("snapshot schema version {found} is not supported (expected {expected})")]
    UnsupportedSnapshotVersion { found: u16, expected: u16 },
}

/// Which inventory an asset belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Active network equipment.
    Active,
    /// Passive plant (towers, shelters, cabling).
    Passive,
    /// IT equipment.
    It,
}

impl NodeType {
    /// Returns the boundary string representation. Downstream consumers
    /// match on these literals.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            NodeType::Active => "ACTIVE",
            NodeType::Passive => "PASSIVE",
            NodeType::It => "IT",
        }
    }

    /// Parses a node type from its boundary string.
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(NodeType::Active),
            "PASSIVE" => Some(NodeType::Passive),
            "IT" => Some(NodeType::It),
            _ => None,
        }
    }

    /// All node types, in reconciliation pass order.
    pub fn all() -> [NodeType; 3] {
        [NodeType::Active, NodeType::Passive, NodeType::It]
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Reconciliation status of a ledger asset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusFlag {
    /// Inserted less than the new-asset window ago.
    New,
    /// Past the new-asset window and still present in inventory.
    Existing,
    /// Absent from inventory, inside the grace period.
    PotentiallyMissing,
    /// Absent past the grace period, or deleted by workflow.
    Decommissioned,
}

impl StatusFlag {
    /// Returns the boundary string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            StatusFlag::New => "NEW",
            StatusFlag::Existing => "EXISTING",
            StatusFlag::PotentiallyMissing => "POTENTIALLY_MISSING",
            StatusFlag::Decommissioned => "DECOMMISSIONED",
        }
    }

    /// Parses a status flag from its boundary string.
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(StatusFlag::New),
            "EXISTING" => Some(StatusFlag::Existing),
            "POTENTIALLY_MISSING" => Some(StatusFlag::PotentiallyMissing),
            "DECOMMISSIONED" => Some(StatusFlag::Decommissioned),
            _ => None,
        }
    }
}

impl std::fmt::Display for StatusFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Approval position of an asset (and of a workflow row's current stage).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    /// No workflow touches this asset.
    None,
    /// Awaiting first-level approval.
    PendingL1,
    /// Awaiting second-level approval.
    PendingL2,
    /// Awaiting final approval.
    PendingL3,
    /// Fully approved.
    Approved,
    /// Rejected by an approver.
    Rejected,
    /// Cancelled by the requester.
    Cancelled,
}

impl ApprovalState {
    /// Returns the boundary string representation. Downstream consumers
    /// match on these literals.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ApprovalState::None => "None",
            ApprovalState::PendingL1 => "Pending L1 Approval",
            ApprovalState::PendingL2 => "Pending L2 Approval",
            ApprovalState::PendingL3 => "Pending L3 Approval",
            ApprovalState::Approved => "Approved",
            ApprovalState::Rejected => "Rejected",
            ApprovalState::Cancelled => "Cancelled",
        }
    }

    /// Parses an approval state from its boundary string.
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "None" => Some(ApprovalState::None),
            "Pending L1 Approval" => Some(ApprovalState::PendingL1),
            "Pending L2 Approval" => Some(ApprovalState::PendingL2),
            "Pending L3 Approval" => Some(ApprovalState::PendingL3),
            "Approved" => Some(ApprovalState::Approved),
            "Rejected" => Some(ApprovalState::Rejected),
            "Cancelled" => Some(ApprovalState::Cancelled),
            _ => None,
        }
    }

    /// Whether this state sits inside the approval chain.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            ApprovalState::PendingL1 | ApprovalState::PendingL2 | ApprovalState::PendingL3
        )
    }

    /// The next pending stage, if any. `PendingL3` has no next pending
    /// stage; its successor is terminal approval.
    pub fn next_pending(&self) -> Option<ApprovalState> {
        match self {
            ApprovalState::PendingL1 => Some(ApprovalState::PendingL2),
            ApprovalState::PendingL2 => Some(ApprovalState::PendingL3),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Identifier of an asset: an asset name, a serial number, or both.
/// At least one must be set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AssetIdentifier {
    /// Logical asset name, unique where set.
    pub asset_name: Option<String>,
    /// Manufacturer serial number, unique where set.
    pub serial_number: Option<String>,
}

impl AssetIdentifier {
    /// Creates an identifier, requiring at least one populated field.
    pub fn new(
        asset_name: Option<String>,
        serial_number: Option<String>,
    ) -> Result<Self, ModelError> {
        let asset_name = asset_name.filter(|s| !s.trim().is_empty());
        let serial_number = serial_number.filter(|s| !s.trim().is_empty());
        if asset_name.is_none() && serial_number.is_none() {
            return Err(ModelError::EmptyIdentifier);
        }
        Ok(Self {
            asset_name,
            serial_number,
        })
    }

    /// Identifier from a serial number alone.
    pub fn from_serial(serial: impl Into<String>) -> Self {
        Self {
            asset_name: None,
            serial_number: Some(serial.into()),
        }
    }

    /// Identifier from an asset name alone.
    pub fn from_name(name: impl Into<String>) -> Self {
        Self {
            asset_name: Some(name.into()),
            serial_number: None,
        }
    }

    /// Whether two identifiers refer to the same asset: a match on either
    /// populated field counts.
    pub fn matches(&self, other: &AssetIdentifier) -> bool {
        let serial_match = matches!(
            (&self.serial_number, &other.serial_number),
            (Some(a), Some(b)) if a == b
        );
        let name_match = matches!(
            (&self.asset_name, &other.asset_name),
            (Some(a), Some(b)) if a == b
        );
        serial_match || name_match
    }

    /// The preferred display form: serial number where present, else name.
    pub fn display_key(&self) -> &str {
        self.serial_number
            .as_deref()
            .or(self.asset_name.as_deref())
            .unwrap_or("")
    }
}

impl std::fmt::Display for AssetIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_key())
    }
}

/// A financial ledger asset row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerAsset {
    /// Unique row id.
    pub id: Uuid,
    /// Business identifier (name and/or serial).
    pub identifier: AssetIdentifier,
    /// Which inventory this asset belongs to.
    pub node_type: NodeType,
    /// Reconciliation status.
    pub status_flag: StatusFlag,
    /// Approval position.
    pub approval_state: ApprovalState,
    /// Acquisition cost. `None` means never valued, distinct from zero.
    pub initial_cost: Option<Decimal>,
    /// Residual value at end of life.
    pub salvage_value: Option<Decimal>,
    /// Depreciation horizon in months.
    pub useful_life_months: Option<u32>,
    /// Manual adjustment folded into accumulated depreciation.
    pub adjustment: Option<Decimal>,
    /// Computed monthly depreciation.
    pub monthly_depreciation: Option<Decimal>,
    /// Computed accumulated depreciation.
    pub accumulated_depreciation: Option<Decimal>,
    /// Computed net cost.
    pub net_cost: Option<Decimal>,
    /// Date the asset entered service.
    pub date_of_service: Option<NaiveDate>,
    /// Date the asset was physically installed.
    pub installation_date: Option<NaiveDate>,
    /// Date the asset was written off, if any.
    pub write_off_date: Option<NaiveDate>,
    /// First time the asset went unmatched in inventory.
    pub missing_since: Option<DateTime<Utc>>,
    /// Projected or actual retirement date.
    pub retirement_date: Option<NaiveDate>,
    /// Pre-mutation snapshot, present only while a modification, movement
    /// or deletion workflow is pending.
    pub snapshot: Option<StateSnapshot>,
    /// Optimistic concurrency token, bumped on every store update.
    pub version: u64,
    /// Who created the row.
    pub inserted_by: String,
    /// When the row was created.
    pub inserted_at: DateTime<Utc>,
    /// Who last changed the row.
    pub changed_by: String,
    /// When the row last changed.
    pub changed_at: DateTime<Utc>,
}

impl LedgerAsset {
    /// Creates a fresh asset row with NEW status and no approval state.
    pub fn new(identifier: AssetIdentifier, node_type: NodeType, inserted_by: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            identifier,
            node_type,
            status_flag: StatusFlag::New,
            approval_state: ApprovalState::None,
            initial_cost: None,
            salvage_value: None,
            useful_life_months: None,
            adjustment: None,
            monthly_depreciation: None,
            accumulated_depreciation: None,
            net_cost: None,
            date_of_service: None,
            installation_date: None,
            write_off_date: None,
            missing_since: None,
            retirement_date: None,
            snapshot: None,
            version: 0,
            inserted_by: inserted_by.to_string(),
            inserted_at: now,
            changed_by: inserted_by.to_string(),
            changed_at: now,
        }
    }

    /// Whole days since the row was inserted.
    pub fn days_since_insert(&self, now: DateTime<Utc>) -> i64 {
        (now - self.inserted_at).num_days()
    }

    /// Whole days since the row was last changed.
    pub fn days_since_change(&self, now: DateTime<Utc>) -> i64 {
        (now - self.changed_at).num_days()
    }

    /// The age-based status: NEW inside the window, EXISTING after it.
    pub fn age_status(&self, now: DateTime<Utc>, new_window_days: i64) -> StatusFlag {
        if self.days_since_insert(now) < new_window_days {
            StatusFlag::New
        } else {
            StatusFlag::Existing
        }
    }

    /// Whether the computed net cost is present and non-zero.
    pub fn has_residual_value(&self) -> bool {
        self.net_cost.map(|n| !n.is_zero()).unwrap_or(false)
    }

    /// Updates the change stamps.
    pub fn touch(&mut self, actor: &str, now: DateTime<Utc>) {
        self.changed_by = actor.to_string();
        self.changed_at = now;
    }
}

/// Versioned capture of every field the approval workflow may mutate.
///
/// Captured before the tentative values of a modification, movement or
/// deletion are applied; restored verbatim on reject/cancel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateSnapshot {
    /// Snapshot schema version.
    pub schema_version: u16,
    /// When the snapshot was taken.
    pub captured_at: DateTime<Utc>,
    pub identifier: AssetIdentifier,
    pub status_flag: StatusFlag,
    pub approval_state: ApprovalState,
    pub initial_cost: Option<Decimal>,
    pub salvage_value: Option<Decimal>,
    pub useful_life_months: Option<u32>,
    pub adjustment: Option<Decimal>,
    pub monthly_depreciation: Option<Decimal>,
    pub accumulated_depreciation: Option<Decimal>,
    pub net_cost: Option<Decimal>,
    pub date_of_service: Option<NaiveDate>,
    pub installation_date: Option<NaiveDate>,
    pub write_off_date: Option<NaiveDate>,
    pub retirement_date: Option<NaiveDate>,
}

impl StateSnapshot {
    /// Captures the mutable fields of an asset.
    pub fn capture(asset: &LedgerAsset) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            captured_at: Utc::now(),
            identifier: asset.identifier.clone(),
            status_flag: asset.status_flag,
            approval_state: asset.approval_state,
            initial_cost: asset.initial_cost,
            salvage_value: asset.salvage_value,
            useful_life_months: asset.useful_life_months,
            adjustment: asset.adjustment,
            monthly_depreciation: asset.monthly_depreciation,
            accumulated_depreciation: asset.accumulated_depreciation,
            net_cost: asset.net_cost,
            date_of_service: asset.date_of_service,
            installation_date: asset.installation_date,
            write_off_date: asset.write_off_date,
            retirement_date: asset.retirement_date,
        }
    }

    /// Restores every captured field onto the asset. Fails when the
    /// snapshot schema version is unknown; the asset is left untouched.
    pub fn restore(&self, asset: &mut LedgerAsset) -> Result<(), ModelError> {
        if self.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(ModelError::UnsupportedSnapshotVersion {
                found: self.schema_version,
                expected: SNAPSHOT_SCHEMA_VERSION,
            });
        }
        asset.identifier = self.identifier.clone();
        asset.status_flag = self.status_flag;
        asset.approval_state = self.approval_state;
        asset.initial_cost = self.initial_cost;
        asset.salvage_value = self.salvage_value;
        asset.useful_life_months = self.useful_life_months;
        asset.adjustment = self.adjustment;
        asset.monthly_depreciation = self.monthly_depreciation;
        asset.accumulated_depreciation = self.accumulated_depreciation;
        asset.net_cost = self.net_cost;
        asset.date_of_service = self.date_of_service;
        asset.installation_date = self.installation_date;
        asset.write_off_date = self.write_off_date;
        asset.retirement_date = self.retirement_date;
        Ok(())
    }
}
