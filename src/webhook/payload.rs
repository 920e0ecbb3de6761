//! Webhook payload shapes
//!
//! JIRA webhooks are loosely typed: ids arrive as strings or numbers and
//! "before" state, when present, sits in `oldValue`. Only the fields the
//! processor diffs or references are modelled.

use crate::agile::types::required_id;
use crate::model::{DateModel, SprintStatus};
use crate::{AgileSyncError, Result};
use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;

/// Fields common to every delivery
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "webhookEvent", default)]
    pub webhook_event: String,
    /// Delivery time in epoch milliseconds
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl Envelope {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Ref id of the entity named `field` in a payload.
///
/// Looks at `{field}.id`, then `{field}Id`, then a top-level `id`.
pub fn extract_entity_ref(payload: &Value, field: &str) -> Result<String> {
    let candidates = [
        payload.get(field).and_then(|v| v.get("id")),
        payload.get(format!("{}Id", field)),
        payload.get("id"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(ref_string)
        .ok_or_else(|| AgileSyncError::Parse(format!("webhook payload has no {} id", field)))
}

fn ref_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `sprint` or `oldValue` fragment of a sprint event
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSprint {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(rename = "startDate", default)]
    pub start_date: Option<String>,
    #[serde(rename = "endDate", default)]
    pub end_date: Option<String>,
    #[serde(rename = "completeDate", default)]
    pub complete_date: Option<String>,
    #[serde(rename = "originBoardId", default)]
    pub origin_board_id: Option<i64>,
}

/// `sprint_*` delivery
#[derive(Debug, Clone, Deserialize)]
pub struct SprintEvent {
    pub sprint: WebhookSprint,
    #[serde(rename = "oldValue", default)]
    pub old_value: Option<WebhookSprint>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Tracked sprint fields, rebuilt from one webhook fragment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SprintProjection {
    pub id: i64,
    pub name: String,
    pub goal: Option<String>,
    /// `None` when the fragment carries no state
    pub status: Option<SprintStatus>,
    pub started_date: Option<DateModel>,
    pub ended_date: Option<DateModel>,
    pub completed_date: Option<DateModel>,
}

impl SprintProjection {
    /// Project a fragment; an unknown state is a parse error
    pub fn from_webhook(sprint: &WebhookSprint) -> Result<Self> {
        let status = match sprint.state.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(state) => Some(SprintStatus::parse(state)?),
        };
        Ok(Self {
            id: sprint.id,
            name: sprint.name.clone(),
            goal: sprint.goal.clone().filter(|g| !g.is_empty()),
            status,
            started_date: DateModel::parse_opt(sprint.start_date.as_deref())?,
            ended_date: DateModel::parse_opt(sprint.end_date.as_deref())?,
            completed_date: DateModel::parse_opt(sprint.complete_date.as_deref())?,
        })
    }
}

/// Board fragment of a `board_*` delivery
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookBoard {
    #[serde(deserialize_with = "required_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// `board_updated` delivery
#[derive(Debug, Clone, Deserialize)]
pub struct BoardEvent {
    pub board: WebhookBoard,
    #[serde(rename = "oldValue", default)]
    pub old_value: Option<WebhookBoard>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueLinkType {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "outwardName", default)]
    pub outward_name: String,
    #[serde(rename = "inwardName", default)]
    pub inward_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueLink {
    #[serde(deserialize_with = "required_id")]
    pub id: String,
    #[serde(rename = "sourceIssueId", deserialize_with = "required_id")]
    pub source_issue_id: String,
    #[serde(rename = "destinationIssueId", deserialize_with = "required_id")]
    pub destination_issue_id: String,
    #[serde(rename = "issueLinkType", default)]
    pub link_type: IssueLinkType,
}

/// `issuelink_created` delivery
#[derive(Debug, Clone, Deserialize)]
pub struct IssueLinkEvent {
    #[serde(rename = "issueLink")]
    pub issue_link: IssueLink,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AvatarUrls {
    #[serde(rename = "16x16", default)]
    pub xsmall: String,
    #[serde(rename = "24x24", default)]
    pub small: String,
    #[serde(rename = "32x32", default)]
    pub medium: String,
    #[serde(rename = "48x48", default)]
    pub large: String,
}

/// User fragment of `user_created` / `user_updated`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WebhookUser {
    /// Cloud account id; absent on server installs
    #[serde(rename = "accountId", default)]
    pub account_id: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(rename = "emailAddress", default)]
    pub email_address: String,
    #[serde(rename = "avatarUrls", default)]
    pub avatar_urls: AvatarUrls,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl WebhookUser {
    /// Account id on cloud, user key on server
    pub fn ref_id(&self) -> &str {
        if self.account_id.is_empty() {
            &self.key
        } else {
            &self.account_id
        }
    }

    pub fn display(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserEvent {
    pub user: WebhookUser,
}

/// Date for an epoch-millisecond delivery timestamp, in UTC
pub fn date_from_millis(ms: i64) -> Option<DateModel> {
    DateTime::from_timestamp_millis(ms).map(|dt| DateModel::from_datetime(&dt.fixed_offset()))
}
