//! Incremental updates from JIRA webhook deliveries
//!
//! Each delivery becomes zero or more minimal patches against entities a bulk
//! sync emitted earlier. Deletions only flip `active` off; sprint and board
//! updates carry just the fields that differ from the payload's `oldValue`;
//! a new issue link patches both issues. Users are handed to a
//! [`UserManager`] instead of the pipe.
//!
//! - [`payload`]: typed views over the loosely typed JSON
//! - [`processor`]: one entry point per event kind plus [`WebhookProcessor`]
//! - [`users`]: the [`UserManager`] seam
//! - [`server`]: the axum receiver

pub mod payload;
pub mod processor;
pub mod server;
pub mod users;

pub use processor::{
    build_sprint_update, close_sprint, delete_board, delete_comment, delete_issue,
    delete_project, delete_sprint, issue_link_created, update_board, update_sprint, upsert_user,
    FieldChange, SprintUpdate, WebhookOutcome, WebhookProcessor,
};
pub use server::WebhookServer;
pub use users::{PipeUserManager, RecordingUserManager, UserManager};
