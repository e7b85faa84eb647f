use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use actum_core::{ActionRule, EventSource, RuleId};

use crate::changes::ChangeSet;
use crate::error::StateError;

/// Which id sequence to allocate from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    Rule,
    Condition,
    Operation,
    OperationCondition,
}

/// Read-path filter. `None` fields do not constrain the result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleQuery {
    pub ids: Option<Vec<RuleId>>,
    pub names: Option<Vec<String>>,
    pub event_sources: Option<Vec<EventSource>>,
}

impl RuleQuery {
    /// Query rules by id.
    #[must_use]
    pub fn by_ids(ids: impl Into<Vec<RuleId>>) -> Self {
        Self {
            ids: Some(ids.into()),
            ..Self::default()
        }
    }

    /// Query rules by exact name.
    #[must_use]
    pub fn by_names(names: impl Into<Vec<String>>) -> Self {
        Self {
            names: Some(names.into()),
            ..Self::default()
        }
    }
}

/// Persistence collaborator for action rules.
///
/// Implementations must be `Send + Sync`. A [`commit`] applies the whole
/// change set atomically: either every row change lands or none does.
/// The store owns id allocation; the engine treats ids as opaque.
///
/// [`commit`]: RuleStore::commit
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Load rules matching the query, with conditions, both operation
    /// lists, and payloads populated. Rules are returned in id order;
    /// unknown ids are silently absent.
    async fn query(&self, query: &RuleQuery) -> Result<Vec<ActionRule>, StateError>;

    /// Reserve `count` fresh ids from the given sequence.
    async fn allocate_ids(&self, kind: IdKind, count: usize) -> Result<Vec<u64>, StateError>;

    /// Apply a change set as one atomic unit.
    async fn commit(&self, changes: ChangeSet) -> Result<(), StateError>;
}
