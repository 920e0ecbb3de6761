//! User upserts from webhook deliveries

use super::payload::WebhookUser;
use crate::metrics;
use crate::model::{EntityId, User, REF_TYPE};
use crate::pipe::{Pipe, Record};
use crate::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Receives created or updated users
pub trait UserManager: Send + Sync {
    fn upsert(
        &self,
        customer_id: &str,
        integration_instance_id: &str,
        user: &WebhookUser,
    ) -> Result<()>;
}

/// Build the user entity for a webhook user
pub fn to_user(customer_id: &str, integration_instance_id: &str, user: &WebhookUser) -> User {
    let ref_id = user.ref_id().to_string();
    User {
        id: EntityId::user(customer_id, &ref_id),
        ref_id,
        ref_type: REF_TYPE.to_string(),
        customer_id: customer_id.to_string(),
        integration_instance_id: integration_instance_id.to_string(),
        name: user.display().to_string(),
        email: Some(user.email_address.clone()).filter(|e| !e.is_empty()),
        avatar_url: Some(user.avatar_urls.large.clone()).filter(|a| !a.is_empty()),
        active: user.active,
    }
}

/// Writes a `User` record whenever a user's content changes.
///
/// Remembers the last user written per entity id for the life of the
/// process, so repeated identical deliveries are written once.
pub struct PipeUserManager {
    pipe: Arc<dyn Pipe>,
    written: Mutex<HashMap<EntityId, User>>,
}

impl PipeUserManager {
    pub fn new(pipe: Arc<dyn Pipe>) -> Self {
        Self {
            pipe,
            written: Mutex::new(HashMap::new()),
        }
    }
}

impl UserManager for PipeUserManager {
    fn upsert(
        &self,
        customer_id: &str,
        integration_instance_id: &str,
        user: &WebhookUser,
    ) -> Result<()> {
        let user = to_user(customer_id, integration_instance_id, user);
        let mut written = self.written.lock().unwrap_or_else(PoisonError::into_inner);
        if written.get(&user.id) == Some(&user) {
            debug!(user = %user.id, "User unchanged");
            return Ok(());
        }
        self.pipe.write(Record::User(user.clone()))?;
        metrics::record_written("user");
        written.insert(user.id.clone(), user);
        Ok(())
    }
}

/// Keeps every upserted user in memory
#[derive(Debug, Default)]
pub struct RecordingUserManager {
    users: Mutex<Vec<WebhookUser>>,
}

impl RecordingUserManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn users(&self) -> Vec<WebhookUser> {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl UserManager for RecordingUserManager {
    fn upsert(
        &self,
        _customer_id: &str,
        _integration_instance_id: &str,
        user: &WebhookUser,
    ) -> Result<()> {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(user.clone());
        Ok(())
    }
}
