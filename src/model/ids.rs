//! Deterministic entity ids
//!
//! Every emitted entity is addressed by an id derived from the customer, the
//! provider's ref id and the entity model, so repeated syncs and webhook
//! patches land on the same record.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Ref type stamped on every entity sourced from JIRA
pub const REF_TYPE: &str = "jira";

/// Entity models in the normalized work model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Model {
    #[serde(rename = "WorkIssue")]
    Issue,
    #[serde(rename = "WorkProject")]
    Project,
    #[serde(rename = "WorkIssueStatus")]
    IssueStatus,
    #[serde(rename = "WorkIssueComment")]
    IssueComment,
    #[serde(rename = "WorkSprint")]
    Sprint,
    #[serde(rename = "WorkKanbanBoard")]
    KanbanBoard,
    #[serde(rename = "WorkUser")]
    User,
}

impl Model {
    pub fn as_str(&self) -> &'static str {
        match self {
            Model::Issue => "WorkIssue",
            Model::Project => "WorkProject",
            Model::IssueStatus => "WorkIssueStatus",
            Model::IssueComment => "WorkIssueComment",
            Model::Sprint => "WorkSprint",
            Model::KanbanBoard => "WorkKanbanBoard",
            Model::User => "WorkUser",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-safe wrapper for internal entity ids
///
/// Format: 16 lowercase hex characters (e.g. "af83c065adcd9a05")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Derive the id for `ref_id` of `model` owned by `customer_id`
    pub fn new(model: Model, customer_id: &str, ref_id: &str) -> Self {
        let mut hasher = Sha256::new();
        for part in [model.as_str(), customer_id, ref_id, REF_TYPE] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        let digest = format!("{:x}", hasher.finalize());
        Self(digest[..16].to_string())
    }

    pub fn issue(customer_id: &str, ref_id: &str) -> Self {
        Self::new(Model::Issue, customer_id, ref_id)
    }

    pub fn project(customer_id: &str, ref_id: &str) -> Self {
        Self::new(Model::Project, customer_id, ref_id)
    }

    pub fn issue_status(customer_id: &str, ref_id: &str) -> Self {
        Self::new(Model::IssueStatus, customer_id, ref_id)
    }

    pub fn comment(customer_id: &str, ref_id: &str) -> Self {
        Self::new(Model::IssueComment, customer_id, ref_id)
    }

    pub fn sprint(customer_id: &str, ref_id: &str) -> Self {
        Self::new(Model::Sprint, customer_id, ref_id)
    }

    pub fn kanban_board(customer_id: &str, ref_id: &str) -> Self {
        Self::new(Model::KanbanBoard, customer_id, ref_id)
    }

    pub fn user(customer_id: &str, ref_id: &str) -> Self {
        Self::new(Model::User, customer_id, ref_id)
    }

    /// Get the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
