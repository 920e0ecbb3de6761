//! Provider fragments to work-model entities
//!
//! Pure functions, no I/O: the aggregator fetches, these assemble.

use super::fetch::{BoardColumn, BoardIssue, SprintIssue};
use super::types::{RawBoard, RawSprint};
use crate::model::{
    DateModel, EntityId, KanbanBoard, KanbanColumn, Sprint, SprintStatus, REF_TYPE,
};
use crate::{AgileSyncError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, error};

/// Position of the backlog in a kanban board's column configuration.
///
/// JIRA always lists the backlog first; its issues become the board's
/// backlog rather than a regular column.
pub const BACKLOG_COLUMN_INDEX: usize = 0;

/// Identity and link settings shared by every mapped entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapContext {
    pub customer_id: String,
    pub integration_instance_id: String,
    pub website_url: String,
}

/// Board view URL
pub fn board_url(website_url: &str, board_id: i64, project_key: &str) -> String {
    format!(
        "{}/secure/RapidBoard.jspa?rapidView={}&projectKey={}",
        website_url.trim_end_matches('/'),
        board_id,
        project_key
    )
}

/// Retrospective report URL for a completed sprint
pub fn completed_sprint_url(
    website_url: &str,
    board_id: i64,
    project_key: &str,
    sprint_id: i64,
) -> String {
    format!(
        "{}&view=reporting&chart=sprintRetrospective&sprint={}",
        board_url(website_url, board_id, project_key),
        sprint_id
    )
}

/// Assemble a kanban board from its columns and current issues.
///
/// Issues whose status belongs to no column are logged and left out.
/// Returns the board and the number of issues left out.
pub fn build_kanban_board(
    ctx: &MapContext,
    board: &RawBoard,
    columns: &[BoardColumn],
    issues: &[BoardIssue],
) -> (KanbanBoard, usize) {
    let mut placed: Vec<KanbanColumn> = columns
        .iter()
        .map(|c| KanbanColumn {
            name: c.name.clone(),
            status_ids: c.status_ids.clone(),
            issue_ids: Vec::new(),
        })
        .collect();

    let mut column_for_status: HashMap<&EntityId, usize> = HashMap::new();
    for (index, column) in columns.iter().enumerate() {
        for status_id in &column.status_ids {
            column_for_status.insert(status_id, index);
        }
    }

    let mut issue_ids = Vec::new();
    let mut project_ids = BTreeSet::new();
    let mut unmapped = 0;

    for issue in issues {
        let Some(&index) = column_for_status.get(&issue.status_id) else {
            error!(
                board = board.id,
                issue = %issue.id,
                status = %issue.status_id,
                "Couldn't find board column for issue status"
            );
            unmapped += 1;
            continue;
        };
        placed[index].issue_ids.push(issue.id.clone());
        issue_ids.push(issue.id.clone());
        project_ids.insert(issue.project_id.clone());
    }

    let mut placed = placed.into_iter();
    let backlog_issue_ids = placed
        .nth(BACKLOG_COLUMN_INDEX)
        .map(|c| c.issue_ids)
        .unwrap_or_default();
    let columns: Vec<KanbanColumn> = placed.collect();

    let ref_id = board.id.to_string();
    let kanban = KanbanBoard {
        id: EntityId::kanban_board(&ctx.customer_id, &ref_id),
        ref_id,
        ref_type: REF_TYPE.to_string(),
        customer_id: ctx.customer_id.clone(),
        integration_instance_id: ctx.integration_instance_id.clone(),
        name: board.name.clone(),
        url: board_url(&ctx.website_url, board.id, &board.location.project_key),
        columns,
        issue_ids,
        backlog_issue_ids,
        project_ids: project_ids.into_iter().collect(),
        active: true,
    };
    (kanban, unmapped)
}

/// Assemble a sprint from its scalar fields, issues and (for open sprints)
/// the origin board's backlog.
///
/// `backlog` is ignored for closed sprints; an open sprint always carries a
/// backlog list, empty when `backlog` is `None`.
pub fn build_sprint(
    ctx: &MapContext,
    sprint_id: i64,
    raw: &RawSprint,
    issues: &[SprintIssue],
    backlog: Option<&[BoardIssue]>,
    project_key: &str,
) -> Result<Sprint> {
    let status = SprintStatus::parse(&raw.state)?;

    let goal = raw
        .goal
        .clone()
        .filter(|g| !g.is_empty())
        .or_else(|| issues.iter().find_map(|i| i.goal.clone()));

    let issue_ids = issues.iter().map(|i| i.id.clone()).collect();
    let project_ids: BTreeSet<EntityId> = issues.iter().map(|i| i.project_id.clone()).collect();

    let backlog_issue_ids = if status.is_closed() {
        None
    } else {
        Some(
            backlog
                .unwrap_or_default()
                .iter()
                .map(|i| i.id.clone())
                .collect(),
        )
    };

    let url = if status.is_closed() {
        completed_sprint_url(&ctx.website_url, raw.origin_board_id, project_key, sprint_id)
    } else {
        board_url(&ctx.website_url, raw.origin_board_id, project_key)
    };

    let ref_id = sprint_id.to_string();
    Ok(Sprint {
        id: EntityId::sprint(&ctx.customer_id, &ref_id),
        ref_id,
        ref_type: REF_TYPE.to_string(),
        customer_id: ctx.customer_id.clone(),
        integration_instance_id: ctx.integration_instance_id.clone(),
        name: raw.name.clone(),
        goal,
        status,
        started_date: DateModel::parse_opt(raw.start_date.as_deref())?,
        ended_date: DateModel::parse_opt(raw.end_date.as_deref())?,
        completed_date: DateModel::parse_opt(raw.complete_date.as_deref())?,
        issue_ids,
        project_ids: project_ids.into_iter().collect(),
        backlog_issue_ids,
        url,
        active: true,
    })
}

lazy_static! {
    static ref LEGACY_SPRINT_ID: Regex =
        Regex::new(r"com\.atlassian\.greenhopper\.service\.sprint\.Sprint@.+?\[*id=(\d+)")
            .expect("legacy sprint id pattern");
    /// A key starts the body or follows a comma; `=` inside a value is not a key
    static ref LEGACY_FIELD_KEY: Regex =
        Regex::new(r"(?:^|,)(\w+)=").expect("legacy sprint key pattern");
}

/// A sprint decoded from the legacy greenhopper custom-field string
///
/// Servers that predate the agile `sprint` issue field list an issue's
/// sprints this way under a `customfield_*` key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacySprint {
    pub id: i64,
    /// `rapidViewId`, the sprint's origin board
    pub board_id: i64,
    pub name: String,
    pub goal: Option<String>,
    pub state: String,
    pub start_date: Option<DateModel>,
    pub end_date: Option<DateModel>,
    pub complete_date: Option<DateModel>,
}

/// Goal of `sprint_id` as recorded in an issue's legacy sprint fields.
///
/// Used by the sprint issue fetch when the `sprint` field is missing.
/// Fields that fail to parse are skipped.
pub fn legacy_sprint_goal<'a>(
    fields: impl IntoIterator<Item = &'a Value>,
    sprint_id: i64,
) -> Option<String> {
    fields
        .into_iter()
        .filter_map(|value| match parse_sprint_fields(value) {
            Ok(sprints) => Some(sprints),
            Err(e) => {
                debug!(sprint = sprint_id, error = %e, "Skipping unreadable legacy sprint field");
                None
            }
        })
        .flatten()
        .find(|s| s.id == sprint_id)
        .and_then(|s| s.goal)
}

/// Pull just the sprint id out of a legacy sprint string
pub fn extract_possible_sprint_id(value: &str) -> Option<i64> {
    LEGACY_SPRINT_ID
        .captures(value)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Legacy sprints in one custom field value; anything but an array of
/// sprint strings is no sprints
pub fn parse_sprint_fields(value: &Value) -> Result<Vec<LegacySprint>> {
    let Some(values) = value.as_array() else {
        return Ok(Vec::new());
    };
    values
        .iter()
        .filter_map(Value::as_str)
        .filter(|v| extract_possible_sprint_id(v).is_some())
        .map(parse_sprint_field)
        .collect()
}

/// Parse one `com.atlassian.greenhopper.service.sprint.Sprint@…[k=v,…]` string
pub fn parse_sprint_field(data: &str) -> Result<LegacySprint> {
    let fields = legacy_fields(data)?;
    let get = |key: &str| fields.get(key).map(String::as_str).unwrap_or_default();

    let parse_int = |key: &str| -> Result<i64> {
        match get(key) {
            "" => Ok(0),
            v => v.parse().map_err(|e| {
                AgileSyncError::Parse(format!("can't parse {} field {:?}: {}", key, v, e))
            }),
        }
    };

    let parse_date = |key: &str| {
        DateModel::parse_opt(Some(get(key))).map_err(|e| e.context(format!("can't parse {}", key)))
    };

    Ok(LegacySprint {
        id: parse_int("id")?,
        board_id: parse_int("rapidViewId")?,
        name: get("name").to_string(),
        goal: Some(get("goal").to_string()).filter(|g| !g.is_empty()),
        state: get("state").to_string(),
        start_date: parse_date("startDate")?,
        end_date: parse_date("endDate")?,
        complete_date: parse_date("completeDate")?,
    })
}

/// Split the bracketed `k=v,k=v` section; `<null>` values become empty
fn legacy_fields(data: &str) -> Result<HashMap<String, String>> {
    let open = data
        .find('[')
        .ok_or_else(|| AgileSyncError::Parse(format!("can't find [ in sprint {:?}", data)))?;
    let body = &data[open + 1..];
    let body = body.strip_suffix(']').unwrap_or(body);
    if body.is_empty() {
        return Err(AgileSyncError::Parse(format!("no fields in sprint {:?}", data)));
    }

    // each match spans the separating comma, so a value runs up to the next match
    let keys: Vec<_> = LEGACY_FIELD_KEY.captures_iter(body).collect();
    let mut fields = HashMap::with_capacity(keys.len());
    for (i, key) in keys.iter().enumerate() {
        let (Some(whole), Some(name)) = (key.get(0), key.get(1)) else {
            continue;
        };
        let value_end = keys
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(body.len(), |next| next.start());
        let value = match &body[whole.end()..value_end] {
            "<null>" | "\\u003cnull\\u003e" => "",
            v => v,
        };
        fields.insert(name.as_str().to_string(), value.to_string());
    }
    Ok(fields)
}
