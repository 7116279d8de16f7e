//! Approval workflow data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::asset::{ApprovalState, AssetIdentifier, NodeType};

/// The kind of ledger mutation a workflow gates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    /// A new ledger row awaiting confirmation.
    Addition,
    /// Field changes to an existing row.
    Modification,
    /// Removal of a ledger row.
    Deletion,
    /// A write-off movement.
    Movement,
}

impl WorkflowKind {
    /// Returns the boundary string representation. Downstream consumers
    /// match on these literals.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            WorkflowKind::Addition => "pending addition",
            WorkflowKind::Modification => "pending modification",
            WorkflowKind::Deletion => "pending deletion",
            WorkflowKind::Movement => "pending movement",
        }
    }

    /// Parses a workflow kind from its boundary string.
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "pending addition" => Some(WorkflowKind::Addition),
            "pending modification" => Some(WorkflowKind::Modification),
            "pending deletion" => Some(WorkflowKind::Deletion),
            "pending movement" => Some(WorkflowKind::Movement),
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// A comment attached to a workflow by an approver or the requester.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowComment {
    /// Who wrote the comment.
    pub author: String,
    /// The comment body.
    pub body: String,
    /// When it was written.
    pub written_at: DateTime<Utc>,
}

/// A multi-level approval record gating one pending ledger mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalWorkflow {
    /// Unique row id.
    pub id: Uuid,
    /// The ledger asset this workflow concerns.
    pub asset_id: Uuid,
    /// Business identifier of that asset.
    pub identifier: AssetIdentifier,
    /// Which inventory the asset belongs to.
    pub object_type: NodeType,
    /// What kind of mutation is pending.
    pub kind: WorkflowKind,
    /// Current position in the approval chain.
    pub stage: ApprovalState,
    /// Globally unique process number, never reused.
    pub process_id: i64,
    /// Appended approver/requester comments.
    pub comments: Vec<WorkflowComment>,
    /// Who opened the workflow.
    pub inserted_by: String,
    /// When the workflow was opened.
    pub inserted_at: DateTime<Utc>,
    /// Who last acted on it.
    pub changed_by: String,
    /// When it last changed.
    pub changed_at: DateTime<Utc>,
}

impl ApprovalWorkflow {
    /// Creates a workflow at the first pending stage.
    pub fn open(
        asset_id: Uuid,
        identifier: AssetIdentifier,
        object_type: NodeType,
        kind: WorkflowKind,
        process_id: i64,
        opened_by: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            asset_id,
            identifier,
            object_type,
            kind,
            stage: ApprovalState::PendingL1,
            process_id,
            comments: Vec::new(),
            inserted_by: opened_by.to_string(),
            inserted_at: now,
            changed_by: opened_by.to_string(),
            changed_at: now,
        }
    }

    /// Whether the workflow still awaits a decision.
    pub fn is_open(&self) -> bool {
        self.stage.is_pending()
    }

    /// Appends a comment and stamps the change fields.
    pub fn add_comment(&mut self, author: &str, body: &str) {
        let now = Utc::now();
        if !body.trim().is_empty() {
            self.comments.push(WorkflowComment {
                author: author.to_string(),
                body: body.to_string(),
                written_at: now,
            });
        }
        self.changed_by = author.to_string();
        self.changed_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_round_trip() {
        for kind in [
            WorkflowKind::Addition,
            WorkflowKind::Modification,
            WorkflowKind::Deletion,
            WorkflowKind::Movement,
        ] {
            assert_eq!(WorkflowKind::from_db_str(kind.as_db_str()), Some(kind));
        }
        assert_eq!(WorkflowKind::Deletion.as_db_str(), "pending deletion");
        assert_eq!(WorkflowKind::from_db_str("pending teleport"), None);
    }

    #[test]
    fn open_workflow_starts_at_first_stage() {
        let wf = ApprovalWorkflow::open(
            Uuid::new_v4(),
            AssetIdentifier::from_serial("SN-1"),
            NodeType::Active,
            WorkflowKind::Modification,
            7,
            "requester",
        );
        assert_eq!(wf.stage, ApprovalState::PendingL1);
        assert!(wf.is_open());
        assert!(wf.comments.is_empty());
    }

    #[test]
    fn blank_comments_are_not_recorded() {
        let mut wf = ApprovalWorkflow::open(
            Uuid::new_v4(),
            AssetIdentifier::from_serial("SN-1"),
            NodeType::It,
            WorkflowKind::Deletion,
            8,
            "requester",
        );
        wf.add_comment("approver", "   ");
        assert!(wf.comments.is_empty());
        assert_eq!(wf.changed_by, "approver");

        wf.add_comment("approver", "looks right");
        assert_eq!(wf.comments.len(), 1);
    }
}
