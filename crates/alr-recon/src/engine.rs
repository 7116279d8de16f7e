//! Reconciliation engine.
//!
//! One pass compares a single inventory source against the ledger through
//! a [`SourceBinding`], which pairs the source with its staging mirror.
//! Inventory items absent from the ledger are mirrored idempotently;
//! present ones run through per-asset classification. Per-record failures
//! are logged and skipped, never aborting the surrounding pass.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use alr_core::models::{
    ApprovalState, AssetIdentifier, AuditLogEntry, LedgerAsset, NodeType, StatusFlag, UnmappedItem,
    WorkflowKind,
};
use alr_core::money;
use alr_core::store::{
    AuditSink, InventorySource, LedgerStore, NotificationSink, StoreError, UnmappedMirror,
};
use alr_core::Settings;
use alr_workflow::{WorkflowEngine, WorkflowError};

/// Actor stamped on writes made by scheduled reconciliation.
pub const SYSTEM_ACTOR: &str = "reconciliation";

/// Errors that can occur in the reconciliation engine.
#[derive(Error, Debug)]
pub enum ReconError {
    /// No source binding is registered for the node type.
    #[error("no inventory source bound for {0}")]
    UnboundType(NodeType),

    /// A binding paired a source and mirror of different node types.
    #[error("source covers {source_type} but mirror covers {mirror}")]
    MismatchedBinding {
        source_type: NodeType,
        mirror: NodeType,
    },

    /// The requested asset is not in the ledger.
    #[error("ledger asset not found: {0}")]
    AssetNotFound(String),

    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A workflow operation failed.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

/// Result type for reconciliation operations.
pub type ReconResult<T> = Result<T, ReconError>;

/// An inventory source paired with the staging mirror for the same node
/// type, selected once per reconciliation pass.
#[derive(Clone)]
pub struct SourceBinding {
    node_type: NodeType,
    source: Arc<dyn InventorySource>,
    mirror: Arc<dyn UnmappedMirror>,
}

impl std::fmt::Debug for SourceBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceBinding")
            .field("node_type", &self.node_type)
            .finish_non_exhaustive()
    }
}

impl SourceBinding {
    /// Pairs a source with its mirror. Fails when they cover different
    /// node types.
    pub fn new(
        source: Arc<dyn InventorySource>,
        mirror: Arc<dyn UnmappedMirror>,
    ) -> ReconResult<Self> {
        if source.node_type() != mirror.node_type() {
            return Err(ReconError::MismatchedBinding {
                source_type: source.node_type(),
                mirror: mirror.node_type(),
            });
        }
        Ok(Self {
            node_type: source.node_type(),
            source,
            mirror,
        })
    }

    /// The node type this binding covers.
    pub fn node_type(&self) -> NodeType {
        self.node_type
    }
}

/// Aggregate status of a reconciliation run.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReconStatus {
    /// Every record processed cleanly.
    Success,
    /// Some records were skipped; committed progress stands.
    Partial,
    /// Nothing was processed.
    Error,
}

/// Counters for one reconciliation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconSummary {
    /// Inventory or ledger rows examined.
    pub scanned: usize,
    /// Staging rows inserted for unmatched inventory items.
    pub mirrored: usize,
    /// NEW/EXISTING reclassifications applied.
    pub status_updates: usize,
    /// Assets newly marked potentially missing.
    pub marked_missing: usize,
    /// Assets auto-decommissioned past the grace period.
    pub decommissioned: usize,
    /// Staging rows removed after their asset was matched.
    pub mirror_rows_removed: usize,
    /// Addition workflows re-opened for revived assets.
    pub reopened_additions: usize,
    /// Records skipped after a per-record failure.
    pub skipped: usize,
    /// Reasons for the skips.
    pub errors: Vec<String>,
}

impl ReconSummary {
    /// Folds another run's counters into this one.
    pub fn merge(&mut self, other: ReconSummary) {
        self.scanned += other.scanned;
        self.mirrored += other.mirrored;
        self.status_updates += other.status_updates;
        self.marked_missing += other.marked_missing;
        self.decommissioned += other.decommissioned;
        self.mirror_rows_removed += other.mirror_rows_removed;
        self.reopened_additions += other.reopened_additions;
        self.skipped += other.skipped;
        self.errors.extend(other.errors);
    }

    /// Success, Partial, or Error for the run as a whole.
    pub fn status(&self) -> ReconStatus {
        if self.errors.is_empty() {
            ReconStatus::Success
        } else if self.scanned > self.skipped {
            ReconStatus::Partial
        } else {
            ReconStatus::Error
        }
    }
}

/// What one classification decided, applied after the ledger write lands.
#[derive(Debug, Default)]
struct Classification {
    status_change: Option<(StatusFlag, StatusFlag)>,
    marked_missing: bool,
    decommissioned: bool,
    missing_cleared: bool,
    reopen_addition: bool,
}

/// The reconciliation engine.
#[derive(Clone)]
pub struct ReconEngine {
    ledger: Arc<dyn LedgerStore>,
    bindings: Vec<SourceBinding>,
    workflows: WorkflowEngine,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn NotificationSink>,
    settings: Settings,
}

impl ReconEngine {
    /// Creates an engine over the ledger, the per-type bindings, and the
    /// workflow engine used to re-open addition workflows.
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        bindings: Vec<SourceBinding>,
        workflows: WorkflowEngine,
        audit: Arc<dyn AuditSink>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            ledger,
            bindings,
            workflows,
            audit,
            notifier,
            settings: Settings::default(),
        }
    }

    /// Overrides the default settings.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    fn binding(&self, node_type: NodeType) -> ReconResult<&SourceBinding> {
        self.bindings
            .iter()
            .find(|b| b.node_type == node_type)
            .ok_or(ReconError::UnboundType(node_type))
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

    /// Reconciles every bound inventory source.
    #[instrument(skip(self))]
    pub async fn run_full(&self) -> ReconSummary {
        let mut total = ReconSummary::default();
        for binding in &self.bindings {
            total.merge(self.sync_source(binding).await);
        }
        info!(
            scanned = total.scanned,
            skipped = total.skipped,
            status = ?total.status(),
            "full reconciliation finished"
        );
        total
    }

    /// Reconciles one node type.
    #[instrument(skip(self))]
    pub async fn run_type(&self, node_type: NodeType) -> ReconResult<ReconSummary> {
        let binding = self.binding(node_type)?;
        Ok(self.sync_source(binding).await)
    }

    /// One pass over a source: absent identifiers are mirrored, present
    /// ones are classified.
    pub async fn sync_source(&self, binding: &SourceBinding) -> ReconSummary {
        let mut summary = ReconSummary::default();
        let size = self.settings.batch_size;
        let mut page = 0;

        loop {
            let fetched = match binding.source.list(page, size).await {
                Ok(p) => p,
                Err(err) => {
                    warn!(error = %err, node_type = %binding.node_type, page, "inventory page fetch failed");
                    summary.errors.push(format!(
                        "{} page {page}: {err}",
                        binding.node_type
                    ));
                    break;
                }
            };
            if fetched.items.is_empty() {
                break;
            }
            let page_len = fetched.items.len();

            for item in fetched.items {
                summary.scanned += 1;
                match self.ledger.find_by_identifier(&item.identifier).await {
                    Ok(Some(asset)) => {
                        self.process_asset(asset.id, binding, true, &mut summary)
                            .await;
                    }
                    Ok(None) => {
                        self.mirror_absent(&item.identifier, binding, &mut summary)
                            .await;
                    }
                    Err(err) => {
                        warn!(error = %err, identifier = %item.identifier, "ledger lookup failed");
                        summary.skipped += 1;
                        summary.errors.push(format!("{}: {err}", item.identifier));
                    }
                }
            }

            page += 1;
            if page * size >= fetched.total || page_len < size {
                break;
            }
        }

        info!(
            node_type = %binding.node_type,
            scanned = summary.scanned,
            mirrored = summary.mirrored,
            "source pass finished"
        );
        summary
    }

    /// Idempotently mirrors an inventory identifier with no ledger row.
    async fn mirror_absent(
        &self,
        identifier: &AssetIdentifier,
        binding: &SourceBinding,
        summary: &mut ReconSummary,
    ) {
        match binding.mirror.find(identifier).await {
            Ok(rows) if !rows.is_empty() => {}
            Ok(_) => {
                let item = UnmappedItem::from_inventory(
                    &alr_core::models::InventoryItem::new(identifier.clone(), binding.node_type),
                    SYSTEM_ACTOR,
                );
                match binding.mirror.insert(&item).await {
                    Ok(()) => summary.mirrored += 1,
                    Err(err) => {
                        warn!(error = %err, identifier = %identifier, "mirror insert failed");
                        summary.skipped += 1;
                        summary.errors.push(format!("{identifier}: {err}"));
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, identifier = %identifier, "mirror lookup failed");
                summary.skipped += 1;
                summary.errors.push(format!("{identifier}: {err}"));
            }
        }
    }

    /// Classifies one ledger asset and persists the result with a bounded
    /// optimistic-write retry. A record that keeps losing the version race
    /// is logged and skipped.
    async fn process_asset(
        &self,
        asset_id: Uuid,
        binding: &SourceBinding,
        found: bool,
        summary: &mut ReconSummary,
    ) {
        let mut attempt = 0;
        loop {
            let asset = match self.ledger.find_by_id(asset_id).await {
                Ok(Some(a)) => a,
                Ok(None) => return,
                Err(err) => {
                    summary.skipped += 1;
                    summary.errors.push(format!("{asset_id}: {err}"));
                    return;
                }
            };
            let expected_version = asset.version;
            let (updated, outcome) = self.classify(asset, found);

            match self.ledger.update(&updated, expected_version).await {
                Ok(()) => {
                    self.apply_side_effects(&updated, &outcome, binding, summary)
                        .await;
                    return;
                }
                Err(err @ StoreError::VersionConflict { .. })
                    if attempt < self.settings.max_write_retries =>
                {
                    attempt += 1;
                    debug!(asset_id = %asset_id, attempt, error = %err, "write conflict, retrying");
                }
                Err(err) => {
                    warn!(asset_id = %asset_id, error = %err, "write failed, skipping record");
                    summary.skipped += 1;
                    summary.errors.push(format!("{asset_id}: {err}"));
                    return;
                }
            }
        }
    }

    /// Pure classification step: returns the mutated asset and what
    /// changed. The change stamp is always refreshed.
    fn classify(&self, mut asset: LedgerAsset, found: bool) -> (LedgerAsset, Classification) {
        let now = Utc::now();
        let last_change = asset.changed_at;
        let mut outcome = Classification::default();

        if asset.approval_state == ApprovalState::None
            && asset.status_flag != StatusFlag::Decommissioned
        {
            let recomputed = asset.age_status(now, self.settings.new_asset_window_days);
            if recomputed != asset.status_flag {
                outcome.status_change = Some((asset.status_flag, recomputed));
                asset.status_flag = recomputed;
            }
        }

        if found {
            if asset.missing_since.is_some() {
                asset.missing_since = None;
                outcome.missing_cleared = true;
                if asset.status_flag == StatusFlag::PotentiallyMissing
                    && asset.approval_state == ApprovalState::None
                {
                    let recomputed = asset.age_status(now, self.settings.new_asset_window_days);
                    outcome.status_change = Some((asset.status_flag, recomputed));
                    asset.status_flag = recomputed;
                }
            }
            if asset.status_flag == StatusFlag::Decommissioned
                && money::is_set_nonzero(asset.net_cost)
            {
                outcome.reopen_addition = true;
            }
        } else if asset.status_flag != StatusFlag::Decommissioned
            && (now - last_change).num_days() >= self.settings.missing_check_interval_days
        {
            match asset.missing_since {
                None => {
                    asset.missing_since = Some(now);
                    outcome.status_change = Some((asset.status_flag, StatusFlag::PotentiallyMissing));
                    asset.status_flag = StatusFlag::PotentiallyMissing;
                    outcome.marked_missing = true;
                }
                Some(since) if (now - since).num_days() >= self.settings.grace_period_days => {
                    outcome.status_change = Some((asset.status_flag, StatusFlag::Decommissioned));
                    asset.status_flag = StatusFlag::Decommissioned;
                    asset.retirement_date = Some(now.date_naive());
                    outcome.decommissioned = true;
                }
                Some(_) => {}
            }
        }

        asset.touch(SYSTEM_ACTOR, now);
        (asset, outcome)
    }

    /// Audit, notify, clean the mirror, and re-open addition workflows
    /// once the primary write has landed. None of these roll it back.
    async fn apply_side_effects(
        &self,
        asset: &LedgerAsset,
        outcome: &Classification,
        binding: &SourceBinding,
        summary: &mut ReconSummary,
    ) {
        if let Some((from, to)) = outcome.status_change {
            summary.status_updates += 1;
            self.record_audit(AuditLogEntry::new(
                asset.id,
                asset.identifier.serial_number.clone(),
                asset.node_type,
                from.as_db_str(),
                to.as_db_str(),
                "reconciliation reclassification",
            ))
            .await;
        }
        if outcome.marked_missing {
            summary.marked_missing += 1;
            self.send_notification(
                StatusFlag::PotentiallyMissing.as_db_str(),
                &format!("{} not seen in {} inventory", asset.identifier, asset.node_type),
            )
            .await;
        }
        if outcome.decommissioned {
            summary.decommissioned += 1;
            self.send_notification(
                StatusFlag::Decommissioned.as_db_str(),
                &format!(
                    "{} absent past the grace period, decommissioned",
                    asset.identifier
                ),
            )
            .await;
        }
        if outcome.missing_cleared {
            self.record_audit(AuditLogEntry::new(
                asset.id,
                asset.identifier.serial_number.clone(),
                asset.node_type,
                asset.status_flag.as_db_str(),
                asset.status_flag.as_db_str(),
                "asset found again, missing marker cleared",
            ))
            .await;
        }

        self.cleanup_mirror(asset, binding, summary).await;

        if outcome.reopen_addition {
            match self
                .workflows
                .open_for_asset(asset.id, WorkflowKind::Addition, SYSTEM_ACTOR)
                .await
            {
                Ok(_) => summary.reopened_additions += 1,
                Err(WorkflowError::DuplicateOpen(_)) => {
                    debug!(identifier = %asset.identifier, "addition already pending");
                }
                Err(err) => {
                    warn!(error = %err, identifier = %asset.identifier, "addition re-open failed");
                    summary.errors.push(format!("{}: {err}", asset.identifier));
                }
            }
        }
    }

    /// Removes exactly the staging rows matched by this asset. More than
    /// one match is ambiguous and logged, not fatal.
    async fn cleanup_mirror(
        &self,
        asset: &LedgerAsset,
        binding: &SourceBinding,
        summary: &mut ReconSummary,
    ) {
        let rows = match binding.mirror.find(&asset.identifier).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(error = %err, identifier = %asset.identifier, "mirror lookup failed");
                return;
            }
        };
        if rows.is_empty() {
            return;
        }
        if rows.len() > 1 {
            warn!(
                identifier = %asset.identifier,
                matches = rows.len(),
                "multiple staging rows match one asset"
            );
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        match binding.mirror.delete_rows(&ids).await {
            Ok(removed) => summary.mirror_rows_removed += removed,
            Err(err) => {
                warn!(error = %err, identifier = %asset.identifier, "mirror delete failed");
            }
        }
    }

    /// Separately schedulable pass that probes the source for every ledger
    /// asset of the binding's type and applies the missing rules.
    #[instrument(skip(self))]
    pub async fn detect_missing(&self, node_type: NodeType) -> ReconResult<ReconSummary> {
        let binding = self.binding(node_type)?;
        let mut summary = ReconSummary::default();
        let size = self.settings.batch_size;
        let mut page = 0;

        loop {
            let assets = self.ledger.list_page(Some(node_type), page, size).await?;
            if assets.is_empty() {
                break;
            }
            let page_len = assets.len();

            for asset in assets {
                summary.scanned += 1;
                match binding.source.exists(&asset.identifier).await {
                    Ok(found) => {
                        self.process_asset(asset.id, binding, found, &mut summary)
                            .await;
                    }
                    Err(err) => {
                        warn!(error = %err, identifier = %asset.identifier, "presence probe failed");
                        summary.skipped += 1;
                        summary.errors.push(format!("{}: {err}", asset.identifier));
                    }
                }
            }

            if page_len < size {
                break;
            }
            page += 1;
        }

        info!(
            node_type = %node_type,
            marked_missing = summary.marked_missing,
            decommissioned = summary.decommissioned,
            "missing-asset pass finished"
        );
        Ok(summary)
    }

    /// Clears every staging mirror and rebuilds the absent classification
    /// from the current ledger. Used for periodic full repair.
    #[instrument(skip(self))]
    pub async fn rebuild_mirrors(&self) -> ReconSummary {
        let mut summary = ReconSummary::default();
        for binding in &self.bindings {
            if let Err(err) = binding.mirror.delete_all().await {
                warn!(error = %err, node_type = %binding.node_type, "mirror clear failed");
                summary.errors.push(format!("{}: {err}", binding.node_type));
                continue;
            }

            let size = self.settings.batch_size;
            let mut page = 0;
            loop {
                let fetched = match binding.source.list(page, size).await {
                    Ok(p) => p,
                    Err(err) => {
                        summary
                            .errors
                            .push(format!("{} page {page}: {err}", binding.node_type));
                        break;
                    }
                };
                if fetched.items.is_empty() {
                    break;
                }
                let page_len = fetched.items.len();

                for item in fetched.items {
                    summary.scanned += 1;
                    match self.ledger.find_by_identifier(&item.identifier).await {
                        Ok(None) => {
                            self.mirror_absent(&item.identifier, binding, &mut summary)
                                .await;
                        }
                        Ok(Some(_)) => {}
                        Err(err) => {
                            summary.skipped += 1;
                            summary.errors.push(format!("{}: {err}", item.identifier));
                        }
                    }
                }

                page += 1;
                if page * size >= fetched.total || page_len < size {
                    break;
                }
            }
        }
        summary
    }

    /// Classifies a single asset on demand and returns its resulting
    /// status flag.
    #[instrument(skip(self))]
    pub async fn reconcile_single_asset(
        &self,
        identifier: &AssetIdentifier,
    ) -> ReconResult<StatusFlag> {
        let asset = self
            .ledger
            .find_by_identifier(identifier)
            .await?
            .ok_or_else(|| ReconError::AssetNotFound(identifier.to_string()))?;
        let binding = self.binding(asset.node_type)?;
        let found = binding.source.exists(&asset.identifier).await?;

        let mut summary = ReconSummary::default();
        self.process_asset(asset.id, binding, found, &mut summary)
            .await;

        let after = self
            .ledger
            .find_by_id(asset.id)
            .await?
            .ok_or_else(|| ReconError::AssetNotFound(identifier.to_string()))?;
        Ok(after.status_flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alr_core::models::{InventoryItem, LedgerAsset};
    use alr_core::store::memory::{
        InMemoryAuditSink, InMemoryInventorySource, InMemoryLedgerStore,
        InMemoryNotificationSink, InMemoryUnmappedMirror, InMemoryWorkflowStore,
    };
    use alr_core::store::WorkflowStore;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    struct Fixture {
        engine: ReconEngine,
        ledger: Arc<InMemoryLedgerStore>,
        source: Arc<InMemoryInventorySource>,
        mirror: Arc<InMemoryUnmappedMirror>,
        workflow_store: Arc<InMemoryWorkflowStore>,
        notifier: Arc<InMemoryNotificationSink>,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let workflow_store = Arc::new(InMemoryWorkflowStore::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let notifier = Arc::new(InMemoryNotificationSink::new());
        let source = Arc::new(InMemoryInventorySource::new(NodeType::Active));
        let mirror = Arc::new(InMemoryUnmappedMirror::new(NodeType::Active));

        let workflow_engine = WorkflowEngine::new(
            ledger.clone(),
            workflow_store.clone(),
            audit.clone(),
            notifier.clone(),
        )
        .with_mirrors(vec![mirror.clone() as Arc<dyn UnmappedMirror>]);

        let binding = SourceBinding::new(source.clone(), mirror.clone()).unwrap();
        let engine = ReconEngine::new(
            ledger.clone(),
            vec![binding],
            workflow_engine,
            audit,
            notifier.clone(),
        );
        Fixture {
            engine,
            ledger,
            source,
            mirror,
            workflow_store,
            notifier,
        }
    }

    async fn seed_asset(fx: &Fixture, serial: &str) -> LedgerAsset {
        let asset = LedgerAsset::new(
            AssetIdentifier::from_serial(serial),
            NodeType::Active,
            "loader",
        );
        fx.ledger.insert(&asset).await.unwrap();
        asset
    }

    async fn amend(fx: &Fixture, id: Uuid, f: impl FnOnce(&mut LedgerAsset)) {
        let mut asset = fx.ledger.find_by_id(id).await.unwrap().unwrap();
        f(&mut asset);
        let version = asset.version;
        fx.ledger.update(&asset, version).await.unwrap();
    }

    async fn current(fx: &Fixture, id: Uuid) -> LedgerAsset {
        fx.ledger.find_by_id(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn unmatched_item_is_mirrored_exactly_once() {
        let fx = fixture();
        fx.source
            .add(InventoryItem::new(
                AssetIdentifier::from_serial("SN-100"),
                NodeType::Active,
            ))
            .await;

        for _ in 0..3 {
            let summary = fx.engine.run_type(NodeType::Active).await.unwrap();
            assert_eq!(summary.status(), ReconStatus::Success);
        }
        assert_eq!(fx.mirror.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn matched_asset_clears_lingering_mirror_rows() {
        let fx = fixture();
        let asset = seed_asset(&fx, "SN-1").await;
        fx.source
            .add(InventoryItem::new(asset.identifier.clone(), NodeType::Active))
            .await;
        fx.mirror
            .insert(&UnmappedItem::from_inventory(
                &InventoryItem::new(asset.identifier.clone(), NodeType::Active),
                "stale",
            ))
            .await
            .unwrap();

        let summary = fx.engine.run_type(NodeType::Active).await.unwrap();
        assert_eq!(summary.mirror_rows_removed, 1);
        assert_eq!(fx.mirror.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn age_rule_moves_new_to_existing() {
        let fx = fixture();
        let asset = seed_asset(&fx, "SN-2").await;
        fx.source
            .add(InventoryItem::new(asset.identifier.clone(), NodeType::Active))
            .await;
        amend(&fx, asset.id, |a| {
            a.inserted_at = Utc::now() - Duration::days(31);
        })
        .await;

        let summary = fx.engine.run_type(NodeType::Active).await.unwrap();
        assert_eq!(summary.status_updates, 1);
        assert_eq!(current(&fx, asset.id).await.status_flag, StatusFlag::Existing);
    }

    #[tokio::test]
    async fn missing_check_is_throttled_by_recent_change() {
        let fx = fixture();
        let asset = seed_asset(&fx, "SN-3").await;

        let summary = fx.engine.detect_missing(NodeType::Active).await.unwrap();
        assert_eq!(summary.marked_missing, 0);
        assert!(current(&fx, asset.id).await.missing_since.is_none());
    }

    #[tokio::test]
    async fn absence_marks_missing_then_decommissions_once() {
        let fx = fixture();
        let asset = seed_asset(&fx, "SN-200").await;
        amend(&fx, asset.id, |a| {
            a.changed_at = Utc::now() - Duration::days(15);
        })
        .await;

        let summary = fx.engine.detect_missing(NodeType::Active).await.unwrap();
        assert_eq!(summary.marked_missing, 1);
        let after = current(&fx, asset.id).await;
        assert_eq!(after.status_flag, StatusFlag::PotentiallyMissing);
        assert!(after.missing_since.is_some());

        // Grace period elapses.
        amend(&fx, asset.id, |a| {
            a.changed_at = Utc::now() - Duration::days(15);
            a.missing_since = Some(Utc::now() - Duration::days(14));
        })
        .await;
        let summary = fx.engine.detect_missing(NodeType::Active).await.unwrap();
        assert_eq!(summary.decommissioned, 1);
        let after = current(&fx, asset.id).await;
        assert_eq!(after.status_flag, StatusFlag::Decommissioned);
        assert_eq!(after.retirement_date, Some(Utc::now().date_naive()));

        // A decommissioned asset is never decommissioned again.
        amend(&fx, asset.id, |a| {
            a.changed_at = Utc::now() - Duration::days(15);
        })
        .await;
        let summary = fx.engine.detect_missing(NodeType::Active).await.unwrap();
        assert_eq!(summary.decommissioned, 0);

        let subjects: Vec<String> =
            fx.notifier.sent().await.into_iter().map(|(s, _)| s).collect();
        assert!(subjects.contains(&"POTENTIALLY_MISSING".to_string()));
        assert!(subjects.contains(&"DECOMMISSIONED".to_string()));
    }

    #[tokio::test]
    async fn revived_asset_with_residual_value_reopens_addition() {
        let fx = fixture();
        let asset = seed_asset(&fx, "SN-4").await;
        amend(&fx, asset.id, |a| {
            a.status_flag = StatusFlag::Decommissioned;
            a.net_cost = Some(dec!(4200));
        })
        .await;
        fx.source
            .add(InventoryItem::new(asset.identifier.clone(), NodeType::Active))
            .await;

        let summary = fx.engine.run_type(NodeType::Active).await.unwrap();
        assert_eq!(summary.reopened_additions, 1);
        let open = fx
            .workflow_store
            .find_open_for(&asset.identifier)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(open.kind, WorkflowKind::Addition);

        // A second pass finds the workflow already open and stays quiet.
        let summary = fx.engine.run_type(NodeType::Active).await.unwrap();
        assert_eq!(summary.reopened_additions, 0);
        assert!(summary.errors.is_empty());
        assert_eq!(fx.workflow_store.count_open().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn zero_or_unset_net_cost_does_not_reopen() {
        let fx = fixture();
        let a = seed_asset(&fx, "SN-5").await;
        let b = seed_asset(&fx, "SN-6").await;
        amend(&fx, a.id, |x| {
            x.status_flag = StatusFlag::Decommissioned;
            x.net_cost = None;
        })
        .await;
        amend(&fx, b.id, |x| {
            x.status_flag = StatusFlag::Decommissioned;
            x.net_cost = Some(rust_decimal::Decimal::ZERO);
        })
        .await;
        for serial in ["SN-5", "SN-6"] {
            fx.source
                .add(InventoryItem::new(
                    AssetIdentifier::from_serial(serial),
                    NodeType::Active,
                ))
                .await;
        }

        let summary = fx.engine.run_type(NodeType::Active).await.unwrap();
        assert_eq!(summary.reopened_additions, 0);
        assert_eq!(fx.workflow_store.count_open().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn found_again_clears_missing_marker() {
        let fx = fixture();
        let asset = seed_asset(&fx, "SN-7").await;
        amend(&fx, asset.id, |a| {
            a.status_flag = StatusFlag::PotentiallyMissing;
            a.missing_since = Some(Utc::now() - Duration::days(5));
        })
        .await;
        fx.source
            .add(InventoryItem::new(asset.identifier.clone(), NodeType::Active))
            .await;

        fx.engine.run_type(NodeType::Active).await.unwrap();
        let after = current(&fx, asset.id).await;
        assert!(after.missing_since.is_none());
        assert_ne!(after.status_flag, StatusFlag::PotentiallyMissing);
    }

    #[tokio::test]
    async fn rebuild_mirrors_repairs_stale_staging_rows() {
        let fx = fixture();
        let asset = seed_asset(&fx, "SN-8").await;
        // Stale row for a ledger-present asset, plus a genuinely unmatched
        // item.
        fx.mirror
            .insert(&UnmappedItem::from_inventory(
                &InventoryItem::new(asset.identifier.clone(), NodeType::Active),
                "stale",
            ))
            .await
            .unwrap();
        fx.source
            .add(InventoryItem::new(asset.identifier.clone(), NodeType::Active))
            .await;
        fx.source
            .add(InventoryItem::new(
                AssetIdentifier::from_serial("SN-NEW"),
                NodeType::Active,
            ))
            .await;

        let summary = fx.engine.rebuild_mirrors().await;
        assert_eq!(summary.mirrored, 1);
        assert_eq!(fx.mirror.count().await.unwrap(), 1);
        let rows = fx
            .mirror
            .find(&AssetIdentifier::from_serial("SN-NEW"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn single_asset_reconciliation_reports_classification() {
        let fx = fixture();
        let asset = seed_asset(&fx, "SN-9").await;
        fx.source
            .add(InventoryItem::new(asset.identifier.clone(), NodeType::Active))
            .await;

        let flag = fx
            .engine
            .reconcile_single_asset(&asset.identifier)
            .await
            .unwrap();
        assert_eq!(flag, StatusFlag::New);

        let err = fx
            .engine
            .reconcile_single_asset(&AssetIdentifier::from_serial("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconError::AssetNotFound(_)));
    }

    #[tokio::test]
    async fn binding_rejects_mismatched_node_types() {
        let source = Arc::new(InMemoryInventorySource::new(NodeType::Active));
        let mirror = Arc::new(InMemoryUnmappedMirror::new(NodeType::It));
        let err = SourceBinding::new(source, mirror).unwrap_err();
        assert!(matches!(err, ReconError::MismatchedBinding { .. }));
    }

    #[tokio::test]
    async fn unbound_type_is_an_error() {
        let fx = fixture();
        let err = fx.engine.run_type(NodeType::Passive).await.unwrap_err();
        assert!(matches!(err, ReconError::UnboundType(NodeType::Passive)));
    }

    #[test]
    fn summary_status_reflects_progress() {
        let mut summary = ReconSummary::default();
        assert_eq!(summary.status(), ReconStatus::Success);

        summary.scanned = 10;
        summary.skipped = 2;
        summary.errors.push("boom".into());
        assert_eq!(summary.status(), ReconStatus::Partial);

        let mut dead = ReconSummary::default();
        dead.errors.push("unreachable".into());
        assert_eq!(dead.status(), ReconStatus::Error);
    }
}
