//! Partial updates against previously emitted entities

use super::ids::{EntityId, Model};
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A minimal set/unset/push update applied to one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub id: EntityId,
    pub model: Model,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unset: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub push: BTreeMap<String, Value>,
}

impl Patch {
    pub fn new(model: Model, id: EntityId) -> Self {
        Self {
            id,
            model,
            set: BTreeMap::new(),
            unset: Vec::new(),
            push: BTreeMap::new(),
        }
    }

    /// Patch that only marks the entity inactive
    pub fn deactivate(model: Model, id: EntityId) -> Self {
        let mut patch = Self::new(model, id);
        patch.set.insert("active".to_string(), Value::Bool(false));
        patch
    }

    pub fn set<V: Serialize>(&mut self, field: &str, value: &V) -> Result<()> {
        self.set.insert(field.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn unset(&mut self, field: &str) {
        self.unset.push(field.to_string());
    }

    /// Append `values` to the list field `field`
    pub fn push<V: Serialize>(&mut self, field: &str, values: &[V]) -> Result<()> {
        self.push.insert(field.to_string(), serde_json::to_value(values)?);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty() && self.push.is_empty()
    }
}
