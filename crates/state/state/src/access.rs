use async_trait::async_trait;

use actum_core::{EntityId, EntityKind};

use crate::error::StateError;

/// Access-control collaborator for externally owned entities.
///
/// The engine batches every referenced id of one request into a single
/// lookup per entity kind; a returned count below the number of distinct
/// requested ids means at least one reference is forbidden or nonexistent.
#[async_trait]
pub trait AccessControl: Send + Sync {
    /// Count how many of the given ids exist and are writable by the
    /// current caller. `ids` may contain duplicates; implementations count
    /// distinct ids.
    async fn count_writable(
        &self,
        kind: EntityKind,
        ids: &[EntityId],
    ) -> Result<usize, StateError>;
}
