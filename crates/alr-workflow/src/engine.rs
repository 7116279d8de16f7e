//! Approval workflow engine.
//!
//! Drives the L1 -> L2 -> L3 approval chain for pending ledger mutations.
//! Opening a workflow captures a snapshot of the asset's prior state (for
//! modification, movement, and deletion) and applies the tentative values;
//! approval at L3 makes them permanent, rejection or cancellation restores
//! the snapshot. Workflow rows are consumed on approval, so history
//! survives only in the audit log.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use alr_core::depreciation::{self, DepreciationError, DepreciationInput};
use alr_core::models::{
    ApprovalState, ApprovalWorkflow, AuditLogEntry, LedgerAsset, NodeType, StateSnapshot,
    StatusFlag, UnmappedItem, WorkflowKind,
};
use alr_core::store::{
    AuditSink, LedgerStore, NotificationSink, StoreError, UnmappedMirror, WorkflowStore,
};
use alr_core::Settings;

/// Notification subject for a newly opened workflow.
pub const SUBJECT_REQUEST: &str = "REQUEST";
/// Notification subject for a newly opened deletion workflow.
pub const SUBJECT_DELETE_REQUEST: &str = "DELETE_REQUEST";
/// Notification subject for an approval-chain step.
pub const SUBJECT_APPROVAL_STEP: &str = "APPROVAL_STEP";

/// Errors that can occur in the workflow engine.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// Workflow row not found.
    #[error("workflow not found: {0}")]
    NotFound(Uuid),

    /// The ledger asset behind a workflow is gone.
    #[error("ledger asset not found: {0}")]
    AssetNotFound(Uuid),

    /// An open workflow already exists for the identifier.
    #[error("an open workflow already exists for {0}")]
    DuplicateOpen(String),

    /// The workflow has already reached a terminal state.
    #[error("workflow {0} is already terminal")]
    AlreadyTerminal(Uuid),

    /// The workflow is in a state the operation cannot act on.
    #[error("invalid workflow state: {0}")]
    InvalidState(String),

    /// An input failed validation. The ledger is untouched.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A snapshot could not be restored.
    #[error("snapshot restore failed: {0}")]
    Snapshot(String),

    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Depreciation recalculation failed.
    #[error(transparent)]
    Depreciation(#[from] DepreciationError),
}

/// Result type for workflow operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Field changes requested on a ledger asset. Unset fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct AssetChanges {
    pub initial_cost: Option<Decimal>,
    pub salvage_value: Option<Decimal>,
    pub useful_life_months: Option<u32>,
    pub adjustment: Option<Decimal>,
    pub date_of_service: Option<NaiveDate>,
    pub installation_date: Option<NaiveDate>,
    pub write_off_date: Option<NaiveDate>,
}

impl AssetChanges {
    fn is_empty(&self) -> bool {
        self.initial_cost.is_none()
            && self.salvage_value.is_none()
            && self.useful_life_months.is_none()
            && self.adjustment.is_none()
            && self.date_of_service.is_none()
            && self.installation_date.is_none()
            && self.write_off_date.is_none()
    }

    fn apply(&self, asset: &mut LedgerAsset) {
        if let Some(v) = self.initial_cost {
            asset.initial_cost = Some(v);
        }
        if let Some(v) = self.salvage_value {
            asset.salvage_value = Some(v);
        }
        if let Some(v) = self.useful_life_months {
            asset.useful_life_months = Some(v);
        }
        if let Some(v) = self.adjustment {
            asset.adjustment = Some(v);
        }
        if let Some(v) = self.date_of_service {
            asset.date_of_service = Some(v);
        }
        if let Some(v) = self.installation_date {
            asset.installation_date = Some(v);
        }
        if let Some(v) = self.write_off_date {
            asset.write_off_date = Some(v);
        }
    }
}

/// One failed item in a bulk operation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BulkFailure {
    /// The workflow id that failed.
    pub id: Uuid,
    /// Why it failed.
    pub reason: String,
}

/// Per-item results of a bulk operation. A failure never aborts the batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkOutcome {
    /// Workflow ids processed successfully.
    pub succeeded: Vec<Uuid>,
    /// Workflow ids that failed, with reasons.
    pub failed: Vec<BulkFailure>,
}

impl BulkOutcome {
    /// Whether every item succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The approval workflow engine.
#[derive(Clone)]
pub struct WorkflowEngine {
    ledger: Arc<dyn LedgerStore>,
    workflows: Arc<dyn WorkflowStore>,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn NotificationSink>,
    mirrors: Vec<Arc<dyn UnmappedMirror>>,
    settings: Settings,
}

impl WorkflowEngine {
    /// Creates an engine over the given stores and sinks.
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        workflows: Arc<dyn WorkflowStore>,
        audit: Arc<dyn AuditSink>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            ledger,
            workflows,
            audit,
            notifier,
            mirrors: Vec::new(),
            settings: Settings::default(),
        }
    }

    /// Attaches unmapped mirrors, used for best-effort cleanup when an
    /// addition workflow is approved.
    pub fn with_mirrors(mut self, mirrors: Vec<Arc<dyn UnmappedMirror>>) -> Self {
        self.mirrors = mirrors;
        self
    }

    /// Overrides the default settings.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    fn mirror_for(&self, node_type: NodeType) -> Option<&Arc<dyn UnmappedMirror>> {
        self.mirrors.iter().find(|m| m.node_type() == node_type)
    }

    /// Persists an asset via the optimistic version check and keeps the
    /// local copy's token in step with the store.
    async fn persist(&self, asset: &mut LedgerAsset) -> WorkflowResult<()> {
        self.ledger.update(asset, asset.version).await?;
        asset.version += 1;
        Ok(())
    }

    async fn record_audit(&self, entry: AuditLogEntry) {
        if let Err(err) = self.audit.record(entry).await {
            warn!(error = %err, "audit record failed");
        }
    }

    async fn send_notification(&self, subject: &str, body: &str) {
        if let Err(err) = self.notifier.send(subject, body).await {
            warn!(error = %err, subject, "notification send failed");
        }
    }

    /// Recomputes the status flag for an approval step. Deletion forces
    /// DECOMMISSIONED; otherwise the age rule applies, and a DECOMMISSIONED
    /// asset only revives when an addition is being approved.
    fn apply_status_rule(&self, asset: &mut LedgerAsset, kind: WorkflowKind, revive: bool) {
        if kind == WorkflowKind::Deletion {
            asset.status_flag = StatusFlag::Decommissioned;
            return;
        }
        if asset.status_flag == StatusFlag::Decommissioned && !revive {
            return;
        }
        asset.status_flag = asset.age_status(Utc::now(), self.settings.new_asset_window_days);
    }

    /// Opens a workflow over an asset whose tentative values are already
    /// applied in memory. Persists the asset at PendingL1, inserts the
    /// workflow row, audits and notifies.
    #[instrument(skip(self, asset), fields(identifier = %asset.identifier, kind = %kind))]
    pub async fn open(
        &self,
        asset: &mut LedgerAsset,
        kind: WorkflowKind,
        actor: &str,
    ) -> WorkflowResult<ApprovalWorkflow> {
        if let Some(existing) = self.workflows.find_open_for(&asset.identifier).await? {
            return Err(WorkflowError::DuplicateOpen(format!(
                "{} (process {})",
                asset.identifier, existing.process_id
            )));
        }

        let process_id = self.workflows.allocate_process_id().await?;
        let previous = asset.approval_state;
        asset.approval_state = ApprovalState::PendingL1;
        asset.touch(actor, Utc::now());
        self.persist(asset).await?;

        let workflow = ApprovalWorkflow::open(
            asset.id,
            asset.identifier.clone(),
            asset.node_type,
            kind,
            process_id,
            actor,
        );
        self.workflows.insert(&workflow).await?;

        self.record_audit(AuditLogEntry::new(
            asset.id,
            asset.identifier.serial_number.clone(),
            asset.node_type,
            previous.as_db_str(),
            ApprovalState::PendingL1.as_db_str(),
            format!("{kind} opened by {actor} (process {process_id})"),
        ))
        .await;

        let subject = if kind == WorkflowKind::Deletion {
            SUBJECT_DELETE_REQUEST
        } else {
            SUBJECT_REQUEST
        };
        self.send_notification(
            subject,
            &format!("{kind} requested for {} by {actor}", asset.identifier),
        )
        .await;

        info!(process_id, workflow_id = %workflow.id, "workflow opened");
        Ok(workflow)
    }

    /// Opens a workflow for a stored asset by id, without applying any
    /// tentative values first. Used for addition re-opens, where there is
    /// no snapshot to capture.
    #[instrument(skip(self))]
    pub async fn open_for_asset(
        &self,
        asset_id: Uuid,
        kind: WorkflowKind,
        actor: &str,
    ) -> WorkflowResult<ApprovalWorkflow> {
        let mut asset = self
            .ledger
            .find_by_id(asset_id)
            .await?
            .ok_or(WorkflowError::AssetNotFound(asset_id))?;
        self.open(&mut asset, kind, actor).await
    }

    /// Requests field changes on an asset: snapshots the prior state,
    /// applies the tentative values, and opens a modification workflow.
    #[instrument(skip(self, changes))]
    pub async fn request_modification(
        &self,
        asset_id: Uuid,
        changes: AssetChanges,
        actor: &str,
    ) -> WorkflowResult<ApprovalWorkflow> {
        if changes.is_empty() {
            return Err(WorkflowError::Validation(
                "a modification request must change at least one field".into(),
            ));
        }
        let mut asset = self
            .ledger
            .find_by_id(asset_id)
            .await?
            .ok_or(WorkflowError::AssetNotFound(asset_id))?;

        asset.snapshot = Some(StateSnapshot::capture(&asset));
        changes.apply(&mut asset);
        self.open(&mut asset, WorkflowKind::Modification, actor).await
    }

    /// Requests deletion of an asset: snapshots the prior state, zeroes the
    /// cost and provisionally decommissions the row, then opens a deletion
    /// workflow. The row itself is removed only at L3 approval.
    #[instrument(skip(self))]
    pub async fn request_deletion(
        &self,
        asset_id: Uuid,
        actor: &str,
    ) -> WorkflowResult<ApprovalWorkflow> {
        let mut asset = self
            .ledger
            .find_by_id(asset_id)
            .await?
            .ok_or(WorkflowError::AssetNotFound(asset_id))?;

        asset.snapshot = Some(StateSnapshot::capture(&asset));
        asset.initial_cost = Some(Decimal::ZERO);
        asset.status_flag = StatusFlag::Decommissioned;
        self.open(&mut asset, WorkflowKind::Deletion, actor).await
    }

    /// Requests a write-off movement: snapshots the prior state, sets the
    /// write-off date, and opens a movement workflow.
    #[instrument(skip(self))]
    pub async fn request_movement(
        &self,
        asset_id: Uuid,
        write_off_date: NaiveDate,
        actor: &str,
    ) -> WorkflowResult<ApprovalWorkflow> {
        let mut asset = self
            .ledger
            .find_by_id(asset_id)
            .await?
            .ok_or(WorkflowError::AssetNotFound(asset_id))?;

        asset.snapshot = Some(StateSnapshot::capture(&asset));
        asset.write_off_date = Some(write_off_date);
        self.open(&mut asset, WorkflowKind::Movement, actor).await
    }

    /// Promotes an unmapped staging row into a tentative ledger asset and
    /// opens an addition workflow. Rejection deletes the row again.
    #[instrument(skip(self, item), fields(identifier = %item.identifier))]
    pub async fn request_addition_from_unmapped(
        &self,
        item: &UnmappedItem,
        actor: &str,
    ) -> WorkflowResult<ApprovalWorkflow> {
        if let Some(existing) = self.workflows.find_open_for(&item.identifier).await? {
            return Err(WorkflowError::DuplicateOpen(format!(
                "{} (process {})",
                item.identifier, existing.process_id
            )));
        }
        if self
            .ledger
            .find_by_identifier(&item.identifier)
            .await?
            .is_some()
        {
            return Err(WorkflowError::Validation(format!(
                "{} already exists in the ledger",
                item.identifier
            )));
        }

        let mut asset = LedgerAsset::new(item.identifier.clone(), item.node_type, actor);
        self.ledger.insert(&asset).await?;
        self.open(&mut asset, WorkflowKind::Addition, actor).await
    }

    /// Approves the current stage. L1 and L2 move the chain forward; L3
    /// makes the pending mutation permanent and consumes the workflow row.
    /// Returns the resulting approval state.
    #[instrument(skip(self))]
    pub async fn advance(
        &self,
        workflow_id: Uuid,
        actor: &str,
        comment: &str,
    ) -> WorkflowResult<ApprovalState> {
        let mut workflow = self
            .workflows
            .find(workflow_id)
            .await?
            .ok_or(WorkflowError::NotFound(workflow_id))?;
        if !workflow.is_open() {
            return Err(WorkflowError::AlreadyTerminal(workflow_id));
        }
        let mut asset = self
            .ledger
            .find_by_id(workflow.asset_id)
            .await?
            .ok_or(WorkflowError::AssetNotFound(workflow.asset_id))?;

        match workflow.stage.next_pending() {
            Some(next) => {
                let previous = workflow.stage;
                workflow.stage = next;
                workflow.add_comment(actor, comment);
                self.workflows.update(&workflow).await?;

                asset.approval_state = next;
                self.apply_status_rule(&mut asset, workflow.kind, false);
                asset.touch(actor, Utc::now());
                self.persist(&mut asset).await?;

                self.record_audit(AuditLogEntry::new(
                    asset.id,
                    asset.identifier.serial_number.clone(),
                    asset.node_type,
                    previous.as_db_str(),
                    next.as_db_str(),
                    format!("{} approved at {} by {actor}", workflow.kind, previous),
                ))
                .await;
                self.send_notification(
                    SUBJECT_APPROVAL_STEP,
                    &format!("{} for {} advanced to {next}", workflow.kind, asset.identifier),
                )
                .await;
                Ok(next)
            }
            None => self.finalize(workflow, asset, actor, comment).await,
        }
    }

    /// L3 approval: applies the kind-specific outcome and removes the
    /// workflow row.
    async fn finalize(
        &self,
        workflow: ApprovalWorkflow,
        mut asset: LedgerAsset,
        actor: &str,
        comment: &str,
    ) -> WorkflowResult<ApprovalState> {
        let previous = workflow.stage;
        match workflow.kind {
            WorkflowKind::Deletion => {
                self.ledger.delete(asset.id).await?;
                self.record_audit(AuditLogEntry::new(
                    asset.id,
                    asset.identifier.serial_number.clone(),
                    asset.node_type,
                    previous.as_db_str(),
                    ApprovalState::Approved.as_db_str(),
                    format!("{} approved by {actor}; row deleted. {comment}", workflow.kind),
                ))
                .await;
            }
            WorkflowKind::Movement => {
                asset.approval_state = ApprovalState::Approved;
                asset.snapshot = None;
                asset.touch(actor, Utc::now());
                self.persist(&mut asset).await?;
                self.record_audit(AuditLogEntry::new(
                    asset.id,
                    asset.identifier.serial_number.clone(),
                    asset.node_type,
                    previous.as_db_str(),
                    ApprovalState::Approved.as_db_str(),
                    format!("{} approved by {actor}. {comment}", workflow.kind),
                ))
                .await;
            }
            WorkflowKind::Addition | WorkflowKind::Modification => {
                asset.snapshot = None;
                asset.approval_state = ApprovalState::Approved;
                let revive = workflow.kind == WorkflowKind::Addition;
                self.apply_status_rule(&mut asset, workflow.kind, revive);
                asset.touch(actor, Utc::now());
                self.persist(&mut asset).await?;

                if workflow.kind == WorkflowKind::Addition {
                    self.cleanup_mirror_rows(&asset).await;
                }
                self.record_audit(AuditLogEntry::new(
                    asset.id,
                    asset.identifier.serial_number.clone(),
                    asset.node_type,
                    previous.as_db_str(),
                    ApprovalState::Approved.as_db_str(),
                    format!("{} approved by {actor}. {comment}", workflow.kind),
                ))
                .await;
            }
        }

        self.workflows.delete(workflow.id).await?;
        self.send_notification(
            SUBJECT_APPROVAL_STEP,
            &format!("{} for {} fully approved", workflow.kind, workflow.identifier),
        )
        .await;
        info!(workflow_id = %workflow.id, process_id = workflow.process_id, "workflow approved");
        Ok(ApprovalState::Approved)
    }

    /// Best-effort removal of staging rows once an addition is confirmed.
    async fn cleanup_mirror_rows(&self, asset: &LedgerAsset) {
        let Some(mirror) = self.mirror_for(asset.node_type) else {
            return;
        };
        match mirror.find(&asset.identifier).await {
            Ok(rows) => {
                let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
                if ids.is_empty() {
                    return;
                }
                if let Err(err) = mirror.delete_rows(&ids).await {
                    warn!(error = %err, identifier = %asset.identifier, "mirror cleanup failed");
                }
            }
            Err(err) => {
                warn!(error = %err, identifier = %asset.identifier, "mirror lookup failed");
            }
        }
    }

    /// Rejects an open workflow, restoring the captured prior state.
    #[instrument(skip(self))]
    pub async fn reject(
        &self,
        workflow_id: Uuid,
        actor: &str,
        comment: &str,
    ) -> WorkflowResult<ApprovalWorkflow> {
        self.close(workflow_id, ApprovalState::Rejected, actor, comment)
            .await
    }

    /// Cancels an open workflow, restoring the captured prior state.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        workflow_id: Uuid,
        actor: &str,
        comment: &str,
    ) -> WorkflowResult<ApprovalWorkflow> {
        self.close(workflow_id, ApprovalState::Cancelled, actor, comment)
            .await
    }

    /// Shared rollback for reject and cancel; they differ only in the
    /// terminal label. The workflow row is retained in its terminal state.
    async fn close(
        &self,
        workflow_id: Uuid,
        terminal: ApprovalState,
        actor: &str,
        comment: &str,
    ) -> WorkflowResult<ApprovalWorkflow> {
        let mut workflow = self
            .workflows
            .find(workflow_id)
            .await?
            .ok_or(WorkflowError::NotFound(workflow_id))?;
        if !workflow.is_open() {
            return Err(WorkflowError::AlreadyTerminal(workflow_id));
        }
        let previous = workflow.stage;

        if workflow.kind == WorkflowKind::Addition {
            // A tentative addition never existed as far as the ledger is
            // concerned.
            self.ledger.delete(workflow.asset_id).await?;
        } else {
            let mut asset = self
                .ledger
                .find_by_id(workflow.asset_id)
                .await?
                .ok_or(WorkflowError::AssetNotFound(workflow.asset_id))?;

            match asset.snapshot.take() {
                Some(snapshot) => {
                    let baseline = snapshot.approval_state;
                    snapshot
                        .restore(&mut asset)
                        .map_err(|e| WorkflowError::Snapshot(e.to_string()))?;
                    asset.approval_state = if workflow.kind == WorkflowKind::Modification
                        && baseline == ApprovalState::Approved
                    {
                        ApprovalState::Approved
                    } else {
                        terminal
                    };
                }
                None => {
                    warn!(
                        workflow_id = %workflow.id,
                        identifier = %asset.identifier,
                        "no snapshot to restore; marking terminal state only"
                    );
                    asset.approval_state = terminal;
                }
            }
            asset.snapshot = None;
            asset.touch(actor, Utc::now());
            self.persist(&mut asset).await?;
        }

        workflow.stage = terminal;
        workflow.add_comment(actor, comment);
        self.workflows.update(&workflow).await?;

        self.record_audit(AuditLogEntry::new(
            workflow.asset_id,
            workflow.identifier.serial_number.clone(),
            workflow.object_type,
            previous.as_db_str(),
            terminal.as_db_str(),
            format!("{} {} by {actor}. {comment}", workflow.kind, terminal),
        ))
        .await;
        info!(workflow_id = %workflow.id, terminal = %terminal, "workflow closed");
        Ok(workflow)
    }

    /// Approves a list of workflows independently; per-item failures are
    /// collected, never aborting the batch.
    #[instrument(skip(self, ids))]
    pub async fn bulk_advance(&self, ids: &[Uuid], actor: &str, comment: &str) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for &id in ids {
            match self.advance(id, actor, comment).await {
                Ok(_) => outcome.succeeded.push(id),
                Err(err) => outcome.failed.push(BulkFailure {
                    id,
                    reason: err.to_string(),
                }),
            }
        }
        outcome
    }

    /// Rejects a list of workflows independently.
    #[instrument(skip(self, ids))]
    pub async fn bulk_reject(&self, ids: &[Uuid], actor: &str, comment: &str) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for &id in ids {
            match self.reject(id, actor, comment).await {
                Ok(_) => outcome.succeeded.push(id),
                Err(err) => outcome.failed.push(BulkFailure {
                    id,
                    reason: err.to_string(),
                }),
            }
        }
        outcome
    }

    /// Cancels a list of workflows independently.
    #[instrument(skip(self, ids))]
    pub async fn bulk_cancel(&self, ids: &[Uuid], actor: &str, comment: &str) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for &id in ids {
            match self.cancel(id, actor, comment).await {
                Ok(_) => outcome.succeeded.push(id),
                Err(err) => outcome.failed.push(BulkFailure {
                    id,
                    reason: err.to_string(),
                }),
            }
        }
        outcome
    }

    /// Recalculates depreciation with a manual adjustment and routes the
    /// result through a modification workflow. The returned asset carries
    /// the tentative values; nothing takes permanent effect until the
    /// workflow is approved.
    #[instrument(skip(self))]
    pub async fn recalculate_depreciation(
        &self,
        asset_id: Uuid,
        adjustment: Decimal,
        actor: &str,
        as_of: NaiveDate,
    ) -> WorkflowResult<LedgerAsset> {
        let mut asset = self
            .ledger
            .find_by_id(asset_id)
            .await?
            .ok_or(WorkflowError::AssetNotFound(asset_id))?;

        let input = DepreciationInput::from_asset(&asset, adjustment)?;
        let schedule = depreciation::calculate(&input, as_of)?;

        asset.snapshot = Some(StateSnapshot::capture(&asset));
        asset.adjustment = Some(adjustment);
        asset.monthly_depreciation = Some(schedule.monthly);
        asset.accumulated_depreciation = Some(schedule.accumulated);
        asset.net_cost = Some(schedule.net_cost);
        asset.retirement_date = Some(schedule.retirement_date);

        self.open(&mut asset, WorkflowKind::Modification, actor)
            .await?;
        Ok(asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alr_core::models::{AssetIdentifier, InventoryItem};
    use alr_core::store::memory::{
        InMemoryAuditSink, InMemoryLedgerStore, InMemoryNotificationSink, InMemoryUnmappedMirror,
        InMemoryWorkflowStore,
    };
    use alr_core::store::UnmappedMirror as _;
    use rust_decimal_macros::dec;

    struct Fixture {
        engine: WorkflowEngine,
        ledger: Arc<InMemoryLedgerStore>,
        workflows: Arc<InMemoryWorkflowStore>,
        audit: Arc<InMemoryAuditSink>,
        notifier: Arc<InMemoryNotificationSink>,
        mirror: Arc<InMemoryUnmappedMirror>,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let workflows = Arc::new(InMemoryWorkflowStore::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let notifier = Arc::new(InMemoryNotificationSink::new());
        let mirror = Arc::new(InMemoryUnmappedMirror::new(NodeType::Active));
        let engine = WorkflowEngine::new(
            ledger.clone(),
            workflows.clone(),
            audit.clone(),
            notifier.clone(),
        )
        .with_mirrors(vec![mirror.clone() as Arc<dyn UnmappedMirror>]);
        Fixture {
            engine,
            ledger,
            workflows,
            audit,
            notifier,
            mirror,
        }
    }

    async fn seed_asset(fx: &Fixture, serial: &str) -> LedgerAsset {
        let mut asset = LedgerAsset::new(
            AssetIdentifier::from_serial(serial),
            NodeType::Active,
            "seeder",
        );
        asset.initial_cost = Some(dec!(12000));
        asset.salvage_value = Some(Decimal::ZERO);
        asset.useful_life_months = Some(24);
        asset.date_of_service = NaiveDate::from_ymd_opt(2023, 1, 15);
        asset.approval_state = ApprovalState::Approved;
        asset.status_flag = StatusFlag::Existing;
        fx.ledger.insert(&asset).await.unwrap();
        asset
    }

    #[tokio::test]
    async fn modification_approved_through_all_levels() {
        let fx = fixture();
        let asset = seed_asset(&fx, "SN-X").await;

        let changes = AssetChanges {
            initial_cost: Some(dec!(15000)),
            ..AssetChanges::default()
        };
        let wf = fx
            .engine
            .request_modification(asset.id, changes, "requester")
            .await
            .unwrap();

        let tentative = fx.ledger.find_by_id(asset.id).await.unwrap().unwrap();
        assert_eq!(tentative.approval_state, ApprovalState::PendingL1);
        assert_eq!(tentative.initial_cost, Some(dec!(15000)));
        assert!(tentative.snapshot.is_some());

        assert_eq!(
            fx.engine.advance(wf.id, "l1", "ok").await.unwrap(),
            ApprovalState::PendingL2
        );
        assert_eq!(
            fx.engine.advance(wf.id, "l2", "ok").await.unwrap(),
            ApprovalState::PendingL3
        );
        assert_eq!(
            fx.engine.advance(wf.id, "l3", "ok").await.unwrap(),
            ApprovalState::Approved
        );

        let final_asset = fx.ledger.find_by_id(asset.id).await.unwrap().unwrap();
        assert_eq!(final_asset.initial_cost, Some(dec!(15000)));
        assert_eq!(final_asset.approval_state, ApprovalState::Approved);
        assert!(final_asset.snapshot.is_none());

        // The workflow row is consumed; history lives in the audit log.
        assert!(fx.workflows.find(wf.id).await.unwrap().is_none());
        assert!(fx.audit.entries().await.len() >= 4);
    }

    #[tokio::test]
    async fn reject_restores_every_snapshotted_field() {
        let fx = fixture();
        let asset = seed_asset(&fx, "SN-R").await;
        let before = fx.ledger.find_by_id(asset.id).await.unwrap().unwrap();

        let changes = AssetChanges {
            initial_cost: Some(dec!(1)),
            useful_life_months: Some(1),
            write_off_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            ..AssetChanges::default()
        };
        let wf = fx
            .engine
            .request_modification(asset.id, changes, "requester")
            .await
            .unwrap();

        let closed = fx.engine.reject(wf.id, "l1", "wrong figures").await.unwrap();
        assert_eq!(closed.stage, ApprovalState::Rejected);

        let restored = fx.ledger.find_by_id(asset.id).await.unwrap().unwrap();
        assert_eq!(restored.initial_cost, before.initial_cost);
        assert_eq!(restored.useful_life_months, before.useful_life_months);
        assert_eq!(restored.write_off_date, before.write_off_date);
        assert!(restored.snapshot.is_none());
        // Prior baseline was Approved, so a rejected modification returns
        // to Approved.
        assert_eq!(restored.approval_state, ApprovalState::Approved);

        // The terminal workflow row is retained.
        let retained = fx.workflows.find(wf.id).await.unwrap().unwrap();
        assert_eq!(retained.stage, ApprovalState::Rejected);
        assert_eq!(retained.comments.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_open_is_a_conflict() {
        let fx = fixture();
        let asset = seed_asset(&fx, "SN-D").await;

        let changes = AssetChanges {
            initial_cost: Some(dec!(100)),
            ..AssetChanges::default()
        };
        fx.engine
            .request_modification(asset.id, changes.clone(), "requester")
            .await
            .unwrap();

        let err = fx
            .engine
            .request_modification(asset.id, changes, "requester")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::DuplicateOpen(_)));
        assert_eq!(fx.workflows.count_open().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn deletion_zeroes_cost_then_removes_row_on_approval() {
        let fx = fixture();
        let asset = seed_asset(&fx, "SN-DEL").await;

        let wf = fx
            .engine
            .request_deletion(asset.id, "requester")
            .await
            .unwrap();
        let pending = fx.ledger.find_by_id(asset.id).await.unwrap().unwrap();
        assert_eq!(pending.initial_cost, Some(Decimal::ZERO));
        assert_eq!(pending.status_flag, StatusFlag::Decommissioned);

        fx.engine.advance(wf.id, "l1", "").await.unwrap();
        fx.engine.advance(wf.id, "l2", "").await.unwrap();
        fx.engine.advance(wf.id, "l3", "confirmed").await.unwrap();

        assert!(fx.ledger.find_by_id(asset.id).await.unwrap().is_none());
        assert!(fx.workflows.find(wf.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deletion_cancel_restores_cost_and_status() {
        let fx = fixture();
        let asset = seed_asset(&fx, "SN-DC").await;

        let wf = fx
            .engine
            .request_deletion(asset.id, "requester")
            .await
            .unwrap();
        fx.engine.cancel(wf.id, "requester", "mistake").await.unwrap();

        let restored = fx.ledger.find_by_id(asset.id).await.unwrap().unwrap();
        assert_eq!(restored.initial_cost, Some(dec!(12000)));
        assert_eq!(restored.status_flag, StatusFlag::Existing);
        // Deletion rollback carries the terminal label, not the baseline.
        assert_eq!(restored.approval_state, ApprovalState::Cancelled);
    }

    #[tokio::test]
    async fn addition_reject_deletes_the_tentative_row() {
        let fx = fixture();
        let item = UnmappedItem::from_inventory(
            &InventoryItem::new(AssetIdentifier::from_serial("SN-ADD"), NodeType::Active),
            "recon",
        );
        fx.mirror.insert(&item).await.unwrap();

        let wf = fx
            .engine
            .request_addition_from_unmapped(&item, "requester")
            .await
            .unwrap();
        assert!(fx
            .ledger
            .find_by_identifier(&item.identifier)
            .await
            .unwrap()
            .is_some());

        fx.engine.reject(wf.id, "l1", "not ours").await.unwrap();
        assert!(fx
            .ledger
            .find_by_identifier(&item.identifier)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn addition_approval_clears_the_mirror_row() {
        let fx = fixture();
        let item = UnmappedItem::from_inventory(
            &InventoryItem::new(AssetIdentifier::from_serial("SN-ADD2"), NodeType::Active),
            "recon",
        );
        fx.mirror.insert(&item).await.unwrap();

        let wf = fx
            .engine
            .request_addition_from_unmapped(&item, "requester")
            .await
            .unwrap();
        fx.engine.advance(wf.id, "l1", "").await.unwrap();
        fx.engine.advance(wf.id, "l2", "").await.unwrap();
        fx.engine.advance(wf.id, "l3", "").await.unwrap();

        assert_eq!(fx.mirror.count().await.unwrap(), 0);
        let asset = fx
            .ledger
            .find_by_identifier(&item.identifier)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(asset.approval_state, ApprovalState::Approved);
        assert_eq!(asset.status_flag, StatusFlag::New);
    }

    #[tokio::test]
    async fn movement_keeps_row_and_write_off_date_on_approval() {
        let fx = fixture();
        let asset = seed_asset(&fx, "SN-MV").await;
        let write_off = NaiveDate::from_ymd_opt(2024, 5, 20).unwrap();

        let wf = fx
            .engine
            .request_movement(asset.id, write_off, "requester")
            .await
            .unwrap();
        fx.engine.advance(wf.id, "l1", "").await.unwrap();
        fx.engine.advance(wf.id, "l2", "").await.unwrap();
        fx.engine.advance(wf.id, "l3", "").await.unwrap();

        let moved = fx.ledger.find_by_id(asset.id).await.unwrap().unwrap();
        assert_eq!(moved.write_off_date, Some(write_off));
        assert_eq!(moved.approval_state, ApprovalState::Approved);
        assert!(moved.snapshot.is_none());
    }

    #[tokio::test]
    async fn bulk_advance_collects_per_item_failures() {
        let fx = fixture();
        let asset = seed_asset(&fx, "SN-B").await;
        let wf = fx
            .engine
            .request_modification(
                asset.id,
                AssetChanges {
                    initial_cost: Some(dec!(1)),
                    ..AssetChanges::default()
                },
                "requester",
            )
            .await
            .unwrap();

        let ghost = Uuid::new_v4();
        let outcome = fx.engine.bulk_advance(&[wf.id, ghost], "l1", "").await;
        assert_eq!(outcome.succeeded, vec![wf.id]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].id, ghost);
        assert!(!outcome.is_clean());
    }

    #[tokio::test]
    async fn terminal_workflow_cannot_be_acted_on_again() {
        let fx = fixture();
        let asset = seed_asset(&fx, "SN-T").await;
        let wf = fx
            .engine
            .request_modification(
                asset.id,
                AssetChanges {
                    initial_cost: Some(dec!(1)),
                    ..AssetChanges::default()
                },
                "requester",
            )
            .await
            .unwrap();
        fx.engine.cancel(wf.id, "requester", "").await.unwrap();

        let err = fx.engine.advance(wf.id, "l1", "").await.unwrap_err();
        assert!(matches!(err, WorkflowError::AlreadyTerminal(_)));
        let err = fx.engine.reject(wf.id, "l1", "").await.unwrap_err();
        assert!(matches!(err, WorkflowError::AlreadyTerminal(_)));
    }

    #[tokio::test]
    async fn recalculation_is_tentative_until_approved() {
        let fx = fixture();
        let asset = seed_asset(&fx, "SN-CALC").await;
        let as_of = NaiveDate::from_ymd_opt(2023, 7, 1).unwrap();

        let tentative = fx
            .engine
            .recalculate_depreciation(asset.id, dec!(1000), "analyst", as_of)
            .await
            .unwrap();
        assert_eq!(tentative.monthly_depreciation, Some(dec!(500.000)));
        assert_eq!(tentative.accumulated_depreciation, Some(dec!(3500.000)));
        assert_eq!(tentative.net_cost, Some(dec!(8500.000)));

        let wf = fx
            .workflows
            .find_open_for(&asset.identifier)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(wf.kind, WorkflowKind::Modification);

        // Rejection rolls the figures back.
        fx.engine.reject(wf.id, "l1", "hold").await.unwrap();
        let restored = fx.ledger.find_by_id(asset.id).await.unwrap().unwrap();
        assert_eq!(restored.accumulated_depreciation, None);
        assert_eq!(restored.adjustment, None);
    }

    #[tokio::test]
    async fn notifications_use_the_boundary_subjects() {
        let fx = fixture();
        let asset = seed_asset(&fx, "SN-N").await;
        let wf = fx
            .engine
            .request_deletion(asset.id, "requester")
            .await
            .unwrap();
        fx.engine.advance(wf.id, "l1", "").await.unwrap();

        let sent = fx.notifier.sent().await;
        assert_eq!(sent[0].0, "DELETE_REQUEST");
        assert_eq!(sent[1].0, "APPROVAL_STEP");
    }

    #[tokio::test]
    async fn process_ids_stay_distinct_across_workflows() {
        let fx = fixture();
        let mut seen = std::collections::HashSet::new();
        for i in 0..5 {
            let asset = seed_asset(&fx, &format!("SN-P{i}")).await;
            let wf = fx
                .engine
                .request_deletion(asset.id, "requester")
                .await
                .unwrap();
            assert!(seen.insert(wf.process_id));
            fx.engine.cancel(wf.id, "requester", "").await.unwrap();
        }
    }
}
