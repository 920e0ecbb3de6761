//! Paginated fetchers for the agile endpoints
//!
//! Each fetcher owns its endpoint, query and termination rule. Board and
//! sprint listings stop on the provider's `isLast` flag; issue listings stop
//! once `total` issues have been seen. Issue listings answer 404 for boards
//! and sprints without issues, which is an empty result here.

use super::client::AgileApi;
use super::mapper::legacy_sprint_goal;
use super::types::{
    IssuesPage, RawBoard, RawBoardConfiguration, RawBoardIssue, RawSprint, RawSprintIssue,
    RawSprintSummary, ValuesPage,
};
use crate::error::ResultExt;
use crate::model::EntityId;
use crate::Result;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Provider maximum for `maxResults`
pub const DEFAULT_PAGE_SIZE: u64 = 100;

/// Fields requested for board issue listings
const BOARD_ISSUE_FIELDS: &str = "id,project,status";

/// State filter for sprint discovery
const SPRINT_STATES: &str = "future,active,closed";

/// Which issue listing of a board to walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardIssueKind {
    /// Every issue on the board (`board/{id}/issue`)
    Issue,
    /// Issues not in any sprint (`board/{id}/backlog`)
    Backlog,
}

impl BoardIssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoardIssueKind::Issue => "issue",
            BoardIssueKind::Backlog => "backlog",
        }
    }
}

/// An issue as listed on a board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardIssue {
    pub id: EntityId,
    pub project_id: EntityId,
    pub status_id: EntityId,
}

/// A configured board column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardColumn {
    pub name: String,
    pub status_ids: Vec<EntityId>,
}

/// An issue as listed in a sprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SprintIssue {
    pub id: EntityId,
    pub project_id: EntityId,
    /// The issue's view of its sprint goal, if non-empty.
    ///
    /// Read from the `sprint` field, or from legacy greenhopper sprint
    /// strings on servers that predate it.
    pub goal: Option<String>,
}

/// Walks the agile endpoints for one customer
#[derive(Clone)]
pub struct Fetcher {
    api: Arc<dyn AgileApi>,
    customer_id: String,
    page_size: u64,
}

impl Fetcher {
    pub fn new(api: Arc<dyn AgileApi>, customer_id: impl Into<String>) -> Self {
        Self {
            api,
            customer_id: customer_id.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let value = self.api.get_json(path, query).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// One page of `GET board`
    pub async fn fetch_boards_page(&self, start_at: u64) -> Result<ValuesPage<RawBoard>> {
        let query = [
            ("maxResults", self.page_size.to_string()),
            ("startAt", start_at.to_string()),
        ];
        self.get("board", &query)
            .await
            .with_context(|| "error fetching agile boards")
    }

    /// Every sprint of a board in any state
    pub async fn fetch_sprint_summaries(&self, board_id: i64) -> Result<Vec<RawSprintSummary>> {
        let path = format!("board/{}/sprint", board_id);
        let started = Instant::now();
        let mut start_at = 0;
        let mut sprints = Vec::new();

        loop {
            let query = [
                ("maxResults", self.page_size.to_string()),
                ("state", SPRINT_STATES.to_string()),
                ("startAt", start_at.to_string()),
            ];
            let page: ValuesPage<RawSprintSummary> = match self.get(&path, &query).await {
                Ok(page) => page,
                Err(e) if e.is_not_found() => return Ok(Vec::new()),
                Err(e) => return Err(e.context("error fetching agile sprints")),
            };
            let fetched = page.values.len() as u64;
            sprints.extend(page.values);
            if page.is_last || fetched == 0 {
                break;
            }
            start_at += fetched;
        }

        debug!(
            board = board_id,
            len = sprints.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Fetched agile sprints"
        );
        Ok(sprints)
    }

    /// Every issue (or backlog issue) of a board
    pub async fn fetch_board_issues(
        &self,
        board_id: i64,
        kind: BoardIssueKind,
    ) -> Result<Vec<BoardIssue>> {
        let path = format!("board/{}/{}", board_id, kind.as_str());
        let started = Instant::now();
        let context = || format!("error fetching agile board {} issues", board_id);

        let Some(raw) = self
            .collect_issues::<RawBoardIssue>(&path, Some(BOARD_ISSUE_FIELDS))
            .await
            .with_context(context)?
        else {
            return Ok(Vec::new());
        };

        let issues: Vec<BoardIssue> = raw.into_iter().map(|i| self.board_issue(i)).collect();
        debug!(
            board = board_id,
            kind = kind.as_str(),
            len = issues.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Fetched agile board issues"
        );
        Ok(issues)
    }

    /// Ordered column configuration of a board
    pub async fn fetch_board_columns(&self, board_id: i64) -> Result<Vec<BoardColumn>> {
        let path = format!("board/{}/configuration", board_id);
        let config: RawBoardConfiguration = self
            .get(&path, &[])
            .await
            .with_context(|| format!("error fetching agile board {} config", board_id))?;

        let columns: Vec<BoardColumn> = config
            .column_config
            .columns
            .into_iter()
            .map(|c| BoardColumn {
                name: c.name,
                status_ids: c
                    .statuses
                    .iter()
                    .map(|s| EntityId::issue_status(&self.customer_id, &s.id))
                    .collect(),
            })
            .collect();
        debug!(board = board_id, len = columns.len(), "Fetched agile board config");
        Ok(columns)
    }

    /// Scalar fields of one sprint
    pub async fn fetch_sprint(&self, sprint_id: i64) -> Result<RawSprint> {
        self.get(&format!("sprint/{}", sprint_id), &[])
            .await
            .with_context(|| format!("error fetching sprint {}", sprint_id))
    }

    /// Every issue in a sprint
    pub async fn fetch_sprint_issues(&self, sprint_id: i64) -> Result<Vec<SprintIssue>> {
        let path = format!("sprint/{}/issue", sprint_id);
        let started = Instant::now();

        let Some(raw) = self
            .collect_issues::<RawSprintIssue>(&path, None)
            .await
            .with_context(|| format!("error fetching agile sprint {} issues", sprint_id))?
        else {
            return Ok(Vec::new());
        };

        let issues: Vec<SprintIssue> = raw
            .into_iter()
            .map(|i| {
                let goal = i
                    .fields
                    .sprint
                    .and_then(|s| s.goal)
                    .filter(|g| !g.is_empty())
                    .or_else(|| legacy_sprint_goal(i.fields.other.values(), sprint_id));
                SprintIssue {
                    id: EntityId::issue(&self.customer_id, &i.id),
                    project_id: EntityId::project(&self.customer_id, &i.fields.project.id),
                    goal,
                }
            })
            .collect();
        debug!(
            sprint = sprint_id,
            len = issues.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Fetched agile sprint issues"
        );
        Ok(issues)
    }

    /// Walk a `total`-terminated issue listing; `None` when the endpoint 404s
    async fn collect_issues<T: DeserializeOwned>(
        &self,
        path: &str,
        fields: Option<&str>,
    ) -> Result<Option<Vec<T>>> {
        let mut start_at = 0;
        let mut issues = Vec::new();

        loop {
            let mut query = vec![
                ("maxResults", self.page_size.to_string()),
                ("startAt", start_at.to_string()),
            ];
            if let Some(fields) = fields {
                query.push(("fields", fields.to_string()));
            }

            let page: IssuesPage<T> = match self.get(path, &query).await {
                Ok(page) => page,
                Err(e) if e.is_not_found() => return Ok(None),
                Err(e) => return Err(e),
            };

            let fetched = page.issues.len() as u64;
            issues.extend(page.issues);
            start_at += fetched;
            // no isLast on these endpoints; an empty page guards against a stale total
            if start_at >= page.total || fetched == 0 {
                break;
            }
        }

        Ok(Some(issues))
    }

    fn board_issue(&self, raw: RawBoardIssue) -> BoardIssue {
        BoardIssue {
            id: EntityId::issue(&self.customer_id, &raw.id),
            project_id: EntityId::project(&self.customer_id, &raw.fields.project.id),
            status_id: EntityId::issue_status(&self.customer_id, &raw.fields.status.id),
        }
    }
}
