//! Normalized work model
//!
//! Entities (sprints, kanban boards, users), partial-update patches, and the
//! deterministic id and date types they are built from.

mod date;
mod entities;
mod ids;
mod patch;

pub use date::{parse_provider_time, DateModel};
pub use entities::{
    KanbanBoard, KanbanColumn, LinkType, LinkedIssue, Sprint, SprintStatus, User,
};
pub use ids::{EntityId, Model, REF_TYPE};
pub use patch::Patch;
