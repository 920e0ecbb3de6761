//! JIRA Agile REST payloads
//!
//! Only the fields the sync reads are modelled; everything else in the
//! provider's responses is ignored by serde.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;

/// Page envelope for `isLast`-terminated lists (`board`, `board/{id}/sprint`)
#[derive(Debug, Clone, Deserialize)]
pub struct ValuesPage<T> {
    #[serde(rename = "isLast", default)]
    pub is_last: bool,
    #[serde(default = "Vec::new")]
    pub values: Vec<T>,
}

/// Page envelope for `total`-terminated issue lists
#[derive(Debug, Clone, Deserialize)]
pub struct IssuesPage<T> {
    #[serde(default)]
    pub total: u64,
    #[serde(default = "Vec::new")]
    pub issues: Vec<T>,
}

/// Board type as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardType {
    Scrum,
    Kanban,
    /// Anything else (e.g. "simple"); synced like a kanban board
    Other(String),
}

impl<'de> Deserialize<'de> for BoardType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.to_ascii_lowercase().as_str() {
            "scrum" => BoardType::Scrum,
            "kanban" => BoardType::Kanban,
            _ => BoardType::Other(raw),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoardLocation {
    #[serde(rename = "projectId", default)]
    pub project_id: Option<i64>,
    #[serde(rename = "projectKey", default)]
    pub project_key: String,
}

/// Entry of `GET board`
#[derive(Debug, Clone, Deserialize)]
pub struct RawBoard {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub board_type: BoardType,
    #[serde(default)]
    pub location: BoardLocation,
}

impl RawBoard {
    pub fn is_scrum(&self) -> bool {
        self.board_type == BoardType::Scrum
    }
}

/// Entry of `GET board/{id}/sprint`
#[derive(Debug, Clone, Deserialize)]
pub struct RawSprintSummary {
    pub id: i64,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdRef {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBoardIssueFields {
    #[serde(default)]
    pub project: IdRef,
    #[serde(default)]
    pub status: IdRef,
}

/// Entry of `GET board/{id}/issue` and `GET board/{id}/backlog`
#[derive(Debug, Clone, Deserialize)]
pub struct RawBoardIssue {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub fields: RawBoardIssueFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSprintGoal {
    #[serde(default)]
    pub goal: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSprintIssueFields {
    #[serde(default)]
    pub project: IdRef,
    #[serde(default)]
    pub sprint: Option<RawSprintGoal>,
    /// Everything else, where older servers keep legacy sprint strings
    #[serde(flatten)]
    pub other: HashMap<String, Value>,
}

/// Entry of `GET sprint/{id}/issue`
#[derive(Debug, Clone, Deserialize)]
pub struct RawSprintIssue {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub fields: RawSprintIssueFields,
}

/// Body of `GET sprint/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct RawSprint {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub state: String,
    #[serde(rename = "startDate", default)]
    pub start_date: Option<String>,
    #[serde(rename = "endDate", default)]
    pub end_date: Option<String>,
    #[serde(rename = "completeDate", default)]
    pub complete_date: Option<String>,
    #[serde(rename = "originBoardId", default)]
    pub origin_board_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawColumn {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub statuses: Vec<IdRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawColumnConfig {
    #[serde(default)]
    pub columns: Vec<RawColumn>,
}

/// Body of `GET board/{id}/configuration`
#[derive(Debug, Clone, Deserialize)]
pub struct RawBoardConfiguration {
    #[serde(rename = "columnConfig", default)]
    pub column_config: RawColumnConfig,
}

/// JIRA sends ids as strings in some payloads and numbers in others
pub fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    use serde::de::Error;
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(D::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// [`string_or_number`] for ids an update cannot do without: null and "" fail
pub fn required_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    use serde::de::Error;
    match Value::deserialize(deserializer)? {
        Value::String(s) if !s.is_empty() => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("expected a non-empty id, got {}", other))),
    }
}
