//! Integration tests for agilesync
//!
//! Drive a full bulk sync against canned provider responses, then apply
//! webhook deliveries on top of what it emitted.

use agilesync::agile::{AgileAggregator, AgileApi, MapContext};
use agilesync::model::{EntityId, LinkedIssue, Model, SprintStatus};
use agilesync::pipe::{read_records, JsonlPipe, MemoryPipe, Pipe, Record};
use agilesync::state::{MemoryStateStore, SqliteStateStore, StateStore};
use agilesync::webhook::{RecordingUserManager, WebhookProcessor};
use agilesync::{AgileSyncError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const CUSTOMER: &str = "1234";
const INSTANCE: &str = "5678";
const SITE: &str = "https://acme.atlassian.net";

/// Canned agile API keyed by `path` or `path?startAt=N`
#[derive(Default)]
struct FakeAgileApi {
    responses: HashMap<String, Value>,
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeAgileApi {
    fn with(mut self, key: &str, value: Value) -> Self {
        self.responses.insert(key.to_string(), value);
        self
    }

    fn failing(mut self, path: &str) -> Self {
        self.failing.insert(path.to_string());
        self
    }

    fn calls_to(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.as_str() == path)
            .count()
    }
}

#[async_trait]
impl AgileApi for FakeAgileApi {
    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        self.calls.lock().unwrap().push(path.to_string());
        if self.failing.contains(path) {
            return Err(AgileSyncError::Api {
                status: 500,
                message: "boom".to_string(),
            });
        }

        let start_at = query
            .iter()
            .find(|(k, _)| *k == "startAt")
            .map(|(_, v)| v.as_str())
            .unwrap_or("0");
        let paged = format!("{}?startAt={}", path, start_at);
        if let Some(value) = self.responses.get(&paged) {
            return Ok(value.clone());
        }
        match self.responses.get(path) {
            Some(value) if start_at == "0" => Ok(value.clone()),
            _ => Err(AgileSyncError::NotFound(paged)),
        }
    }
}

fn board_issue(id: &str, status: &str) -> Value {
    json!({"id": id, "fields": {"project": {"id": "10100"}, "status": {"id": status}}})
}

/// Two scrum boards sharing sprint 11, one kanban board.
///
/// Sprint 10 is closed, sprint 11 active with an empty issue list (404).
fn site() -> FakeAgileApi {
    FakeAgileApi::default()
        .with(
            "board?startAt=0",
            json!({
                "startAt": 0, "maxResults": 2, "isLast": false,
                "values": [
                    {"id": 1, "name": "TES board", "type": "scrum", "location": {"projectKey": "TES"}},
                    {"id": 2, "name": "Teamoji Board", "type": "kanban", "location": {"projectKey": "TEAM"}}
                ]
            }),
        )
        .with(
            "board?startAt=2",
            json!({
                "startAt": 2, "maxResults": 2, "isLast": true,
                "values": [
                    {"id": 3, "name": "Shared board", "type": "scrum", "location": {"projectKey": "SHR"}}
                ]
            }),
        )
        .with(
            "board/1/sprint",
            json!({"isLast": true, "values": [
                {"id": 10, "state": "closed"},
                {"id": 11, "state": "active"}
            ]}),
        )
        .with(
            "board/3/sprint",
            json!({"isLast": true, "values": [{"id": 11, "state": "active"}]}),
        )
        .with(
            "sprint/10",
            json!({
                "id": 10, "state": "closed", "name": "TES Sprint 1", "originBoardId": 1,
                "startDate": "2020-06-23T00:37:00.000Z",
                "endDate": "2020-07-07T00:37:00.000Z",
                "completeDate": "2020-07-07T00:37:55.692Z"
            }),
        )
        .with(
            "sprint/10/issue",
            json!({"startAt": 0, "total": 1, "issues": [
                {"id": "100", "fields": {"project": {"id": "10100"}, "sprint": {"goal": "ship it"}}}
            ]}),
        )
        .with(
            "sprint/11",
            json!({"id": 11, "state": "active", "name": "TES Sprint 2", "originBoardId": 1, "goal": ""}),
        )
        .with(
            "board/1/backlog",
            json!({"startAt": 0, "total": 2, "issues": [
                board_issue("200", "1"),
                board_issue("201", "1")
            ]}),
        )
        .with(
            "board/2/configuration",
            json!({"columnConfig": {"columns": [
                {"name": "Backlog", "statuses": [{"id": "1"}]},
                {"name": "In Progress", "statuses": [{"id": "3"}]},
                {"name": "Done", "statuses": [{"id": "10001"}]}
            ]}}),
        )
        .with(
            "board/2/issue",
            json!({"startAt": 0, "total": 3, "issues": [
                board_issue("300", "1"),
                board_issue("301", "3"),
                board_issue("302", "999")
            ]}),
        )
}

fn context() -> MapContext {
    MapContext {
        customer_id: CUSTOMER.to_string(),
        integration_instance_id: INSTANCE.to_string(),
        website_url: SITE.to_string(),
    }
}

fn aggregator(
    api: Arc<FakeAgileApi>,
    pipe: Arc<dyn Pipe>,
    store: Arc<dyn StateStore>,
) -> AgileAggregator {
    AgileAggregator::new(api, pipe, store, context())
}

fn issue(ref_id: &str) -> EntityId {
    EntityId::issue(CUSTOMER, ref_id)
}

#[tokio::test]
async fn test_full_sync() {
    let api = Arc::new(site());
    let pipe = Arc::new(MemoryPipe::new());
    let store = Arc::new(MemoryStateStore::new());

    let stats = aggregator(api.clone(), pipe.clone(), store.clone())
        .sync()
        .await
        .unwrap();

    assert_eq!(stats.boards, 3);
    assert_eq!(stats.kanban_boards, 1);
    assert_eq!(stats.sprints, 2);
    assert_eq!(stats.sprints_skipped, 0);
    assert_eq!(stats.issues_unmapped, 1);

    // shared sprint is fetched once
    assert_eq!(api.calls_to("sprint/11"), 1);
    assert_eq!(api.calls_to("sprint/10"), 1);
    // closed sprints never fetch a backlog; the active one does
    assert_eq!(api.calls_to("board/1/backlog"), 1);

    assert_eq!(store.keys(), vec!["sprint_10".to_string(), "sprint_11".to_string()]);
}

#[tokio::test]
async fn test_kanban_board_backlog_and_columns() {
    let pipe = Arc::new(MemoryPipe::new());
    aggregator(Arc::new(site()), pipe.clone(), Arc::new(MemoryStateStore::new()))
        .sync()
        .await
        .unwrap();

    let boards = pipe.kanban_boards();
    assert_eq!(boards.len(), 1);
    let board = &boards[0];
    assert_eq!(board.id, EntityId::kanban_board(CUSTOMER, "2"));
    assert_eq!(board.name, "Teamoji Board");
    assert_eq!(
        board.url,
        "https://acme.atlassian.net/secure/RapidBoard.jspa?rapidView=2&projectKey=TEAM"
    );
    assert_eq!(board.backlog_issue_ids, vec![issue("300")]);
    assert_eq!(board.columns.len(), 2);
    assert_eq!(board.columns[0].name, "In Progress");
    assert_eq!(board.columns[0].issue_ids, vec![issue("301")]);
    assert!(board.columns[1].issue_ids.is_empty());
    // unmapped issue 302 is left out
    assert_eq!(board.issue_ids, vec![issue("300"), issue("301")]);
    assert_eq!(board.project_ids, vec![EntityId::project(CUSTOMER, "10100")]);
}

#[tokio::test]
async fn test_sprint_backlog_by_status() {
    let pipe = Arc::new(MemoryPipe::new());
    aggregator(Arc::new(site()), pipe.clone(), Arc::new(MemoryStateStore::new()))
        .sync()
        .await
        .unwrap();

    let sprints = pipe.sprints();
    assert_eq!(sprints.len(), 2);
    let closed = sprints.iter().find(|s| s.ref_id == "10").unwrap();
    let active = sprints.iter().find(|s| s.ref_id == "11").unwrap();

    assert_eq!(closed.status, SprintStatus::Closed);
    assert!(closed.backlog_issue_ids.is_none());
    assert_eq!(closed.goal.as_deref(), Some("ship it"));
    assert_eq!(closed.issue_ids, vec![issue("100")]);
    assert_eq!(closed.completed_date.as_ref().unwrap().epoch, 1594082275692);
    assert_eq!(
        closed.url,
        "https://acme.atlassian.net/secure/RapidBoard.jspa?rapidView=1&projectKey=TES\
         &view=reporting&chart=sprintRetrospective&sprint=10"
    );

    assert_eq!(active.status, SprintStatus::Active);
    assert_eq!(
        active.backlog_issue_ids,
        Some(vec![issue("200"), issue("201")])
    );
    // sprint/11/issue answers 404
    assert!(active.issue_ids.is_empty());
    assert!(active.goal.is_none());
    assert_eq!(
        active.url,
        "https://acme.atlassian.net/secure/RapidBoard.jspa?rapidView=1&projectKey=TES"
    );
}

#[tokio::test]
async fn test_rerun_skips_closed_synced_sprints() {
    let store = Arc::new(MemoryStateStore::new());
    aggregator(Arc::new(site()), Arc::new(MemoryPipe::new()), store.clone())
        .sync()
        .await
        .unwrap();

    let api = Arc::new(site());
    let pipe = Arc::new(MemoryPipe::new());
    let stats = aggregator(api.clone(), pipe.clone(), store.clone())
        .sync()
        .await
        .unwrap();

    assert_eq!(stats.sprints_skipped, 1);
    assert_eq!(stats.sprints, 1);
    assert_eq!(api.calls_to("sprint/10"), 0);
    let refs: Vec<String> = pipe.sprints().into_iter().map(|s| s.ref_id).collect();
    assert_eq!(refs, vec!["11".to_string()]);
}

#[tokio::test]
async fn test_historical_rerun_keeps_closed_marker() {
    let store = Arc::new(MemoryStateStore::new());
    store.set("sprint_10", "1").unwrap();
    store.set("sprint_11", "1").unwrap();

    let pipe = Arc::new(MemoryPipe::new());
    let stats = aggregator(Arc::new(site()), pipe.clone(), store.clone())
        .with_historical(true)
        .sync()
        .await
        .unwrap();

    assert_eq!(stats.sprints, 2);
    assert_eq!(stats.sprints_skipped, 0);
    assert_eq!(store.get("sprint_10").unwrap().as_deref(), Some("1"));
    assert_ne!(store.get("sprint_11").unwrap().as_deref(), Some("1"));
}

#[tokio::test]
async fn test_reruns_are_idempotent() {
    let first = Arc::new(MemoryPipe::new());
    let second = Arc::new(MemoryPipe::new());
    for pipe in [&first, &second] {
        aggregator(Arc::new(site()), pipe.clone(), Arc::new(MemoryStateStore::new()))
            .sync()
            .await
            .unwrap();
    }

    let mut a = first.sprints();
    let mut b = second.sprints();
    a.sort_by(|x, y| x.ref_id.cmp(&y.ref_id));
    b.sort_by(|x, y| x.ref_id.cmp(&y.ref_id));
    assert_eq!(a, b);
    assert_eq!(first.kanban_boards(), second.kanban_boards());
}

#[tokio::test]
async fn test_sprint_failure_fails_sync_without_cancelling_siblings() {
    let api = Arc::new(site().failing("sprint/10"));
    let pipe = Arc::new(MemoryPipe::new());
    let store = Arc::new(MemoryStateStore::new());

    let err = aggregator(api, pipe.clone(), store.clone())
        .sync()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("error fetching sprint 10"));

    let refs: Vec<String> = pipe.sprints().into_iter().map(|s| s.ref_id).collect();
    assert_eq!(refs, vec!["11".to_string()]);
    assert_eq!(store.keys(), vec!["sprint_11".to_string()]);
}

#[tokio::test]
async fn test_board_failure_skips_sprint_phase() {
    let api = Arc::new(site().failing("board/2/configuration"));
    let pipe = Arc::new(MemoryPipe::new());

    let err = aggregator(api.clone(), pipe.clone(), Arc::new(MemoryStateStore::new()))
        .sync()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("board 2"));
    assert!(pipe.sprints().is_empty());
    assert_eq!(api.calls_to("sprint/10"), 0);
}

#[tokio::test]
async fn test_board_listing_failure() {
    let api = Arc::new(site().failing("board"));
    let pipe = Arc::new(MemoryPipe::new());
    let result = aggregator(api, pipe.clone(), Arc::new(MemoryStateStore::new()))
        .sync()
        .await;
    assert!(result.is_err());
    assert!(pipe.is_empty());
}

#[tokio::test]
async fn test_unknown_sprint_status_fails_sync() {
    let api = Arc::new(site().with(
        "sprint/11",
        json!({"id": 11, "state": "paused", "name": "TES Sprint 2", "originBoardId": 1}),
    ));
    let pipe = Arc::new(MemoryPipe::new());
    let err = aggregator(api, pipe.clone(), Arc::new(MemoryStateStore::new()))
        .sync()
        .await
        .unwrap_err();
    assert!(err.is_payload_error());
    assert!(pipe.sprints().iter().all(|s| s.ref_id != "11"));
}

#[tokio::test]
async fn test_missing_sprint_listing_is_empty() {
    // board 3 has no sprint listing at all
    let mut api = site();
    api.responses.remove("board/3/sprint");
    let pipe = Arc::new(MemoryPipe::new());
    let stats = aggregator(Arc::new(api), pipe.clone(), Arc::new(MemoryStateStore::new()))
        .sync()
        .await
        .unwrap();
    assert_eq!(stats.sprints, 2);
}

#[tokio::test]
async fn test_jsonl_and_sqlite_across_runs() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out").join("agile.jsonl");
    let state = dir.path().join("state.db");

    {
        let pipe = Arc::new(JsonlPipe::append(&output).unwrap());
        let store = Arc::new(SqliteStateStore::open_path(&state).unwrap());
        aggregator(Arc::new(site()), pipe, store).sync().await.unwrap();
    }
    let records = read_records(&output).unwrap();
    assert_eq!(records.len(), 3);

    {
        let pipe = Arc::new(JsonlPipe::append(&output).unwrap());
        let store = Arc::new(SqliteStateStore::open_path(&state).unwrap());
        let stats = aggregator(Arc::new(site()), pipe, store).sync().await.unwrap();
        assert_eq!(stats.sprints_skipped, 1);
    }
    let records = read_records(&output).unwrap();
    // second run adds the kanban board and the active sprint only
    assert_eq!(records.len(), 5);
    let sprint_writes = records
        .iter()
        .filter(|r| matches!(r, Record::Sprint(s) if s.ref_id == "10"))
        .count();
    assert_eq!(sprint_writes, 1);
}

#[tokio::test]
async fn test_webhooks_patch_synced_entities() {
    let pipe = Arc::new(MemoryPipe::new());
    aggregator(Arc::new(site()), pipe.clone(), Arc::new(MemoryStateStore::new()))
        .sync()
        .await
        .unwrap();
    let active = pipe
        .sprints()
        .into_iter()
        .find(|s| s.ref_id == "11")
        .unwrap();

    let processor = WebhookProcessor::new(pipe.clone(), Arc::new(RecordingUserManager::new()));
    let closed = json!({
        "timestamp": 1594082275692u64,
        "webhookEvent": "sprint_closed",
        "sprint": {"id": 11, "state": "closed", "name": "TES Sprint 2", "originBoardId": 1}
    });
    processor
        .dispatch(CUSTOMER, INSTANCE, closed.to_string().as_bytes())
        .unwrap();

    let patch = pipe.updates().pop().unwrap();
    assert_eq!(patch.id, active.id);
    assert_eq!(patch.model, Model::Sprint);
    assert_eq!(patch.set["status"], json!("CLOSED"));
    assert!(patch.unset.contains(&"backlog_issue_ids".to_string()));
}

#[test]
fn test_deletion_only_touches_active() {
    let pipe = Arc::new(MemoryPipe::new());
    let processor = WebhookProcessor::new(pipe.clone(), Arc::new(RecordingUserManager::new()));
    for payload in [
        json!({"webhookEvent": "jira:issue_deleted", "issue": {"id": "100"}}),
        json!({"webhookEvent": "comment_deleted", "comment": {"id": "7"}}),
        json!({"webhookEvent": "project_deleted", "project": {"id": 10100}}),
        json!({"webhookEvent": "board_deleted", "board": {"id": 2}}),
        json!({"webhookEvent": "sprint_deleted", "sprint": {"id": 11}}),
    ] {
        processor
            .dispatch(CUSTOMER, INSTANCE, payload.to_string().as_bytes())
            .unwrap();
    }

    let updates = pipe.updates();
    assert_eq!(updates.len(), 5);
    for patch in &updates {
        assert_eq!(patch.set.len(), 1);
        assert_eq!(patch.set["active"], json!(false));
        assert!(patch.unset.is_empty() && patch.push.is_empty());
    }
    assert_eq!(updates[3].id, EntityId::kanban_board(CUSTOMER, "2"));
}

#[test]
fn test_unchanged_sprint_update_writes_nothing() {
    let pipe = Arc::new(MemoryPipe::new());
    let processor = WebhookProcessor::new(pipe.clone(), Arc::new(RecordingUserManager::new()));
    let fragment = json!({"id": 11, "state": "active", "name": "TES Sprint 2", "originBoardId": 1});
    let payload = json!({"webhookEvent": "sprint_updated", "sprint": fragment, "oldValue": fragment});

    let outcome = processor
        .dispatch(CUSTOMER, INSTANCE, payload.to_string().as_bytes())
        .unwrap();
    assert!(outcome.handled);
    assert!(pipe.is_empty());
}

#[test]
fn test_issue_link_is_symmetric() {
    let pipe = Arc::new(MemoryPipe::new());
    let processor = WebhookProcessor::new(pipe.clone(), Arc::new(RecordingUserManager::new()));
    let payload = json!({
        "webhookEvent": "issuelink_created",
        "issueLink": {
            "id": 22768,
            "sourceIssueId": 20192,
            "destinationIssueId": 20734,
            "issueLinkType": {"name": "Blocks", "outwardName": "blocks", "inwardName": "is blocked by"}
        }
    });
    processor
        .dispatch(CUSTOMER, INSTANCE, payload.to_string().as_bytes())
        .unwrap();

    let updates = pipe.updates();
    assert_eq!(updates.len(), 2);
    let on_a: Vec<LinkedIssue> =
        serde_json::from_value(updates[0].push["linked_issues"].clone()).unwrap();
    let on_b: Vec<LinkedIssue> =
        serde_json::from_value(updates[1].push["linked_issues"].clone()).unwrap();

    assert_eq!(updates[0].id, issue("20192"));
    assert_eq!(on_a[0].issue_id, issue("20734"));
    assert!(!on_a[0].reverse_direction);

    assert_eq!(updates[1].id, issue("20734"));
    assert_eq!(on_b[0].issue_id, issue("20192"));
    assert!(on_b[0].reverse_direction);
    assert_eq!(on_a[0].link_type, on_b[0].link_type);
}
