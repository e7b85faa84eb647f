use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use actum_core::{EntityId, EntityKind};
use actum_state::{AccessControl, StateError};

/// In-memory [`AccessControl`] with an explicit per-kind grant table.
///
/// By default no entity is writable; tests grant what they need, or start
/// from [`MemoryAccessControl::allow_all`] to disable checking entirely.
#[derive(Debug, Default)]
pub struct MemoryAccessControl {
    allow_all: bool,
    writable: RwLock<HashMap<EntityKind, HashSet<EntityId>>>,
}

impl MemoryAccessControl {
    /// An access control that denies everything until granted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An access control that treats every id of every kind as writable.
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            allow_all: true,
            writable: RwLock::default(),
        }
    }

    /// Mark ids of a kind as writable.
    ///
    /// # Panics
    /// Panics if the internal lock is poisoned.
    pub fn grant(&self, kind: EntityKind, ids: impl IntoIterator<Item = EntityId>) {
        let mut writable = self.writable.write().expect("grant table lock poisoned");
        writable.entry(kind).or_default().extend(ids);
    }
}

#[async_trait]
impl AccessControl for MemoryAccessControl {
    async fn count_writable(
        &self,
        kind: EntityKind,
        ids: &[EntityId],
    ) -> Result<usize, StateError> {
        let distinct: HashSet<EntityId> = ids.iter().copied().collect();
        if self.allow_all {
            return Ok(distinct.len());
        }
        let writable = self
            .writable
            .read()
            .map_err(|_| StateError::Backend("grant table lock poisoned".to_owned()))?;
        let granted = writable.get(&kind);
        Ok(distinct
            .iter()
            .filter(|id| granted.is_some_and(|set| set.contains(id)))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_distinct_granted_ids() {
        let access = MemoryAccessControl::new();
        access.grant(EntityKind::Host, [EntityId::new(1), EntityId::new(2)]);

        let ids = [EntityId::new(1), EntityId::new(1), EntityId::new(3)];
        let count = access.count_writable(EntityKind::Host, &ids).await.unwrap();
        // Id 1 counted once, id 3 not granted.
        assert_eq!(count, 1);

        // Grants are per kind.
        let count = access
            .count_writable(EntityKind::HostGroup, &[EntityId::new(1)])
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn allow_all_counts_everything() {
        let access = MemoryAccessControl::allow_all();
        let ids = [EntityId::new(5), EntityId::new(5), EntityId::new(6)];
        let count = access.count_writable(EntityKind::User, &ids).await.unwrap();
        assert_eq!(count, 2);
    }
}
