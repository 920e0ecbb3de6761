//! Webhook deliveries to minimal patches
//!
//! Each handler takes one raw payload and writes zero, one or two patches to
//! the pipe. Nothing is fetched from the provider: "before" state comes from
//! the payload's own `oldValue`.

use super::payload::{
    date_from_millis, extract_entity_ref, BoardEvent, Envelope, IssueLinkEvent, SprintEvent,
    SprintProjection, UserEvent,
};
use super::users::UserManager;
use crate::error::ResultExt;
use crate::metrics;
use crate::model::{DateModel, EntityId, LinkType, LinkedIssue, Model, Patch, SprintStatus};
use crate::pipe::{Pipe, Record};
use crate::{AgileSyncError, Result};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Change to one tracked field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldChange<T> {
    Unchanged,
    Set(T),
    Unset,
}

impl<T> Default for FieldChange<T> {
    fn default() -> Self {
        FieldChange::Unchanged
    }
}

impl<T: PartialEq + Clone> FieldChange<T> {
    fn diff(old: Option<&T>, new: Option<&T>) -> Self {
        match (old, new) {
            (old, Some(new)) if old != Some(new) => FieldChange::Set(new.clone()),
            (Some(_), None) => FieldChange::Unset,
            _ => FieldChange::Unchanged,
        }
    }

    pub fn is_changed(&self) -> bool {
        !matches!(self, FieldChange::Unchanged)
    }

    fn apply(&self, patch: &mut Patch, field: &str) -> Result<()>
    where
        T: Serialize,
    {
        match self {
            FieldChange::Unchanged => {}
            FieldChange::Set(value) => patch.set(field, value)?,
            FieldChange::Unset => patch.unset(field),
        }
        Ok(())
    }
}

/// Field-level diff of two sprint projections
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SprintUpdate {
    pub name: FieldChange<String>,
    pub goal: FieldChange<String>,
    pub status: FieldChange<SprintStatus>,
    pub started_date: FieldChange<DateModel>,
    pub ended_date: FieldChange<DateModel>,
}

impl SprintUpdate {
    pub fn is_changed(&self) -> bool {
        self.name.is_changed()
            || self.goal.is_changed()
            || self.status.is_changed()
            || self.started_date.is_changed()
            || self.ended_date.is_changed()
    }

    /// Patch setting (or unsetting) exactly the changed fields
    pub fn into_patch(self, id: EntityId) -> Result<Patch> {
        let mut patch = Patch::new(Model::Sprint, id);
        self.name.apply(&mut patch, "name")?;
        self.goal.apply(&mut patch, "goal")?;
        self.status.apply(&mut patch, "status")?;
        self.started_date.apply(&mut patch, "started_date")?;
        self.ended_date.apply(&mut patch, "ended_date")?;
        if self.status == FieldChange::Set(SprintStatus::Closed) {
            patch.unset("backlog_issue_ids");
        }
        Ok(patch)
    }
}

/// Diff `old` against `new` on name, goal, status and the start/end dates.
///
/// Name and status are never unset: a fragment without them leaves the
/// stored value alone.
pub fn build_sprint_update(old: &SprintProjection, new: &SprintProjection) -> (SprintUpdate, bool) {
    let update = SprintUpdate {
        name: match FieldChange::diff(
            Some(&old.name).filter(|s| !s.is_empty()),
            Some(&new.name).filter(|s| !s.is_empty()),
        ) {
            FieldChange::Unset => FieldChange::Unchanged,
            change => change,
        },
        goal: FieldChange::diff(old.goal.as_ref(), new.goal.as_ref()),
        status: match FieldChange::diff(old.status.as_ref(), new.status.as_ref()) {
            FieldChange::Unset => FieldChange::Unchanged,
            change => change,
        },
        started_date: FieldChange::diff(old.started_date.as_ref(), new.started_date.as_ref()),
        ended_date: FieldChange::diff(old.ended_date.as_ref(), new.ended_date.as_ref()),
    };
    let changed = update.is_changed();
    (update, changed)
}

fn write_patch(pipe: &dyn Pipe, patch: Patch) -> Result<()> {
    pipe.write(Record::Update(patch))?;
    metrics::record_written("update");
    Ok(())
}

fn deactivate(
    model: Model,
    field: &str,
    customer_id: &str,
    integration_instance_id: &str,
    payload: &[u8],
    pipe: &dyn Pipe,
) -> Result<()> {
    let value: Value = serde_json::from_slice(payload)?;
    let ref_id = extract_entity_ref(&value, field)?;
    let id = EntityId::new(model, customer_id, &ref_id);
    info!(
        model = %model,
        ref_id = %ref_id,
        instance = integration_instance_id,
        "Marking entity inactive"
    );
    write_patch(pipe, Patch::deactivate(model, id))
}

/// `jira:issue_deleted`
pub fn delete_issue(
    customer_id: &str,
    integration_instance_id: &str,
    payload: &[u8],
    pipe: &dyn Pipe,
) -> Result<()> {
    deactivate(Model::Issue, "issue", customer_id, integration_instance_id, payload, pipe)
}

/// `comment_deleted`
pub fn delete_comment(
    customer_id: &str,
    integration_instance_id: &str,
    payload: &[u8],
    pipe: &dyn Pipe,
) -> Result<()> {
    deactivate(
        Model::IssueComment,
        "comment",
        customer_id,
        integration_instance_id,
        payload,
        pipe,
    )
}

/// `project_deleted`
pub fn delete_project(
    customer_id: &str,
    integration_instance_id: &str,
    payload: &[u8],
    pipe: &dyn Pipe,
) -> Result<()> {
    deactivate(Model::Project, "project", customer_id, integration_instance_id, payload, pipe)
}

/// `board_deleted`
pub fn delete_board(
    customer_id: &str,
    integration_instance_id: &str,
    payload: &[u8],
    pipe: &dyn Pipe,
) -> Result<()> {
    deactivate(
        Model::KanbanBoard,
        "board",
        customer_id,
        integration_instance_id,
        payload,
        pipe,
    )
}

/// `sprint_deleted`
pub fn delete_sprint(
    customer_id: &str,
    integration_instance_id: &str,
    payload: &[u8],
    pipe: &dyn Pipe,
) -> Result<()> {
    deactivate(Model::Sprint, "sprint", customer_id, integration_instance_id, payload, pipe)
}

/// `sprint_updated`: one patch with the changed fields, or nothing
pub fn update_sprint(
    customer_id: &str,
    integration_instance_id: &str,
    payload: &[u8],
    pipe: &dyn Pipe,
) -> Result<()> {
    let event: SprintEvent = serde_json::from_slice(payload)?;
    let new = SprintProjection::from_webhook(&event.sprint)?;
    let old = match &event.old_value {
        Some(old) => SprintProjection::from_webhook(old)?,
        None => SprintProjection {
            id: new.id,
            ..Default::default()
        },
    };

    let (update, changed) = build_sprint_update(&old, &new);
    if !changed {
        debug!(sprint = new.id, "Sprint update carries no tracked changes");
        return Ok(());
    }

    info!(sprint = new.id, instance = integration_instance_id, "Updating sprint");
    let patch = update.into_patch(EntityId::sprint(customer_id, &new.id.to_string()))?;
    write_patch(pipe, patch)
}

/// `sprint_closed`: status and completion date, regardless of `oldValue`
pub fn close_sprint(
    customer_id: &str,
    integration_instance_id: &str,
    payload: &[u8],
    pipe: &dyn Pipe,
) -> Result<()> {
    let event: SprintEvent = serde_json::from_slice(payload)?;
    let sprint = SprintProjection::from_webhook(&event.sprint)?;
    let completed = sprint
        .completed_date
        .or_else(|| event.timestamp.and_then(date_from_millis));

    let mut patch = Patch::new(
        Model::Sprint,
        EntityId::sprint(customer_id, &sprint.id.to_string()),
    );
    patch.set("status", &SprintStatus::Closed)?;
    if let Some(completed) = completed {
        patch.set("completed_date", &completed)?;
    }
    patch.unset("backlog_issue_ids");

    info!(sprint = sprint.id, instance = integration_instance_id, "Closing sprint");
    write_patch(pipe, patch)
}

/// `board_updated`: the new name, when it differs from `oldValue`
pub fn update_board(
    customer_id: &str,
    integration_instance_id: &str,
    payload: &[u8],
    pipe: &dyn Pipe,
) -> Result<()> {
    let event: BoardEvent = serde_json::from_slice(payload)?;
    let board = event.board;
    let changed = event
        .old_value
        .as_ref()
        .map_or(true, |old| old.name != board.name);
    if !changed {
        debug!(board = %board.id, "Board update carries no tracked changes");
        return Ok(());
    }

    let mut patch = Patch::new(
        Model::KanbanBoard,
        EntityId::kanban_board(customer_id, &board.id),
    );
    patch.set("name", &board.name)?;
    info!(board = %board.id, instance = integration_instance_id, "Updating board");
    write_patch(pipe, patch)
}

/// `issuelink_created`: one linked-issue push on each end of the link
pub fn issue_link_created(
    customer_id: &str,
    integration_instance_id: &str,
    payload: &[u8],
    pipe: &dyn Pipe,
) -> Result<()> {
    let event: IssueLinkEvent = serde_json::from_slice(payload)?;
    let link = event.issue_link;
    let link_type = LinkType::from_provider(&link.link_type.name)
        .or_else(|| LinkType::from_provider(&link.link_type.outward_name))
        .ok_or_else(|| {
            AgileSyncError::Parse(format!(
                "unknown issue link type {:?} ({:?})",
                link.link_type.name, link.link_type.outward_name
            ))
        })?;

    let source_id = EntityId::issue(customer_id, &link.source_issue_id);
    let destination_id = EntityId::issue(customer_id, &link.destination_issue_id);

    let outward = LinkedIssue {
        ref_id: link.id.clone(),
        issue_id: destination_id.clone(),
        issue_ref_id: link.destination_issue_id.clone(),
        link_type,
        reverse_direction: false,
    };
    let inward = LinkedIssue {
        ref_id: link.id.clone(),
        issue_id: source_id.clone(),
        issue_ref_id: link.source_issue_id.clone(),
        link_type,
        reverse_direction: true,
    };

    let mut on_source = Patch::new(Model::Issue, source_id);
    on_source.push("linked_issues", &[outward])?;
    let mut on_destination = Patch::new(Model::Issue, destination_id);
    on_destination.push("linked_issues", &[inward])?;

    info!(
        link = %link.id,
        source = %link.source_issue_id,
        destination = %link.destination_issue_id,
        instance = integration_instance_id,
        "Linking issues"
    );
    write_patch(pipe, on_source)?;
    write_patch(pipe, on_destination)
}

/// `user_created` / `user_updated`: handed to the user manager, nothing piped here
pub fn upsert_user(
    customer_id: &str,
    integration_instance_id: &str,
    users: &dyn UserManager,
    payload: &[u8],
) -> Result<()> {
    let event: UserEvent = serde_json::from_slice(payload)?;
    if event.user.ref_id().is_empty() {
        return Err(AgileSyncError::Parse(
            "webhook user has neither accountId nor key".to_string(),
        ));
    }
    debug!(user = event.user.ref_id(), "Upserting user");
    users.upsert(customer_id, integration_instance_id, &event.user)
}

/// What [`WebhookProcessor::dispatch`] did with a delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookOutcome {
    pub event: String,
    /// False for events this processor does not handle
    pub handled: bool,
}

/// Routes deliveries by their `webhookEvent`
pub struct WebhookProcessor {
    pipe: Arc<dyn Pipe>,
    users: Arc<dyn UserManager>,
}

impl WebhookProcessor {
    pub fn new(pipe: Arc<dyn Pipe>, users: Arc<dyn UserManager>) -> Self {
        Self { pipe, users }
    }

    pub fn dispatch(
        &self,
        customer_id: &str,
        integration_instance_id: &str,
        payload: &[u8],
    ) -> Result<WebhookOutcome> {
        let envelope = Envelope::parse(payload)?;
        let event = envelope.webhook_event;
        let pipe = self.pipe.as_ref();
        let (c, i) = (customer_id, integration_instance_id);

        let result = match event.as_str() {
            "jira:issue_deleted" => delete_issue(c, i, payload, pipe),
            "comment_deleted" => delete_comment(c, i, payload, pipe),
            "project_deleted" => delete_project(c, i, payload, pipe),
            "board_deleted" => delete_board(c, i, payload, pipe),
            "sprint_deleted" => delete_sprint(c, i, payload, pipe),
            "sprint_updated" => update_sprint(c, i, payload, pipe),
            "sprint_closed" => close_sprint(c, i, payload, pipe),
            "board_updated" => update_board(c, i, payload, pipe),
            "issuelink_created" => issue_link_created(c, i, payload, pipe),
            "user_created" | "user_updated" => upsert_user(c, i, self.users.as_ref(), payload),
            _ => {
                debug!(event = %event, "Ignoring webhook event");
                metrics::record_webhook("unknown", "ignored");
                return Ok(WebhookOutcome {
                    event,
                    handled: false,
                });
            }
        };

        let status = if result.is_ok() { "accepted" } else { "failed" };
        metrics::record_webhook(&event, status);
        result.with_context(|| format!("error processing {} webhook", event))?;
        self.pipe.flush()?;

        Ok(WebhookOutcome {
            event,
            handled: true,
        })
    }
}
