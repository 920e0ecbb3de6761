//! Normalized agile entities emitted to the pipe

use super::date::DateModel;
use super::ids::EntityId;
use crate::{AgileSyncError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sprint lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SprintStatus {
    Future,
    Active,
    Closed,
}

impl SprintStatus {
    /// Parse a provider state, ignoring case and surrounding whitespace.
    ///
    /// Unknown states are rejected; no sprint is ever emitted without a status.
    pub fn parse(state: &str) -> Result<Self> {
        match state.trim().to_ascii_lowercase().as_str() {
            "future" => Ok(SprintStatus::Future),
            "active" => Ok(SprintStatus::Active),
            "closed" => Ok(SprintStatus::Closed),
            _ => Err(AgileSyncError::Parse(format!(
                "invalid status for sprint: {:?}",
                state
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SprintStatus::Future => "FUTURE",
            SprintStatus::Active => "ACTIVE",
            SprintStatus::Closed => "CLOSED",
        }
    }

    pub fn is_closed(&self) -> bool {
        *self == SprintStatus::Closed
    }
}

impl FromStr for SprintStatus {
    type Err = AgileSyncError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SprintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scrum sprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sprint {
    pub id: EntityId,
    pub ref_id: String,
    pub ref_type: String,
    pub customer_id: String,
    pub integration_instance_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    pub status: SprintStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_date: Option<DateModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_date: Option<DateModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_date: Option<DateModel>,
    pub issue_ids: Vec<EntityId>,
    pub project_ids: Vec<EntityId>,
    /// Present (possibly empty) for open sprints, always absent once closed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backlog_issue_ids: Option<Vec<EntityId>>,
    pub url: String,
    pub active: bool,
}

/// One column of a kanban board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KanbanColumn {
    pub name: String,
    pub status_ids: Vec<EntityId>,
    pub issue_ids: Vec<EntityId>,
}

/// A kanban board with its issues placed into columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KanbanBoard {
    pub id: EntityId,
    pub ref_id: String,
    pub ref_type: String,
    pub customer_id: String,
    pub integration_instance_id: String,
    pub name: String,
    pub url: String,
    /// Every configured column after the backlog, in provider order
    pub columns: Vec<KanbanColumn>,
    pub issue_ids: Vec<EntityId>,
    pub backlog_issue_ids: Vec<EntityId>,
    pub project_ids: Vec<EntityId>,
    pub active: bool,
}

/// A provider user account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: EntityId,
    pub ref_id: String,
    pub ref_type: String,
    pub customer_id: String,
    pub integration_instance_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub active: bool,
}

/// Relation kinds between two linked issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LinkType {
    Blocks,
    Clones,
    Duplicates,
    Causes,
    Relates,
}

impl LinkType {
    /// Map a provider link-type name (or its outward phrase) to a relation kind
    pub fn from_provider(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "blocks" | "block" => Some(LinkType::Blocks),
            "cloners" | "clones" | "cloners (migrated)" => Some(LinkType::Clones),
            "duplicate" | "duplicates" => Some(LinkType::Duplicates),
            "causes" | "problem/incident" => Some(LinkType::Causes),
            "relates" | "relates to" => Some(LinkType::Relates),
            _ => None,
        }
    }
}

/// One entry of an issue's linked-issues list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedIssue {
    /// Provider id of the link itself
    pub ref_id: String,
    /// The issue on the other end of the link
    pub issue_id: EntityId,
    pub issue_ref_id: String,
    pub link_type: LinkType,
    /// Set on the record stored on the link's inward (destination) issue
    pub reverse_direction: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_ignores_case() {
        assert_eq!(SprintStatus::parse("closed").unwrap(), SprintStatus::Closed);
        assert_eq!(SprintStatus::parse("CLOSED").unwrap(), SprintStatus::Closed);
        assert_eq!(SprintStatus::parse("Active").unwrap(), SprintStatus::Active);
        assert_eq!(" future ".parse::<SprintStatus>().unwrap(), SprintStatus::Future);
    }

    #[test]
    fn test_status_rejects_unknown() {
        assert!(SprintStatus::parse("paused").is_err());
        assert!(SprintStatus::parse("").is_err());
    }

    #[test]
    fn test_status_serializes_uppercase() {
        assert_eq!(
            serde_json::to_value(SprintStatus::Active).unwrap(),
            serde_json::json!("ACTIVE")
        );
    }

    #[test]
    fn test_link_type_names() {
        assert_eq!(LinkType::from_provider("Blocks"), Some(LinkType::Blocks));
        assert_eq!(LinkType::from_provider("Cloners"), Some(LinkType::Clones));
        assert_eq!(LinkType::from_provider("Duplicate"), Some(LinkType::Duplicates));
        assert_eq!(LinkType::from_provider("relates to"), Some(LinkType::Relates));
        assert_eq!(LinkType::from_provider("Problem/Incident"), Some(LinkType::Causes));
        assert_eq!(LinkType::from_provider("Depends"), None);
    }
}
