//! Typed change batches applied atomically by a [`RuleStore`].
//!
//! The service computes one [`ChangeSet`] per create/update/delete call;
//! the store applies all of it inside a single transaction or none of it.
//! Ids for inserted rows are allocated up front through
//! [`RuleStore::allocate_ids`], so every row in a change set is complete.
//!
//! [`RuleStore`]: crate::store::RuleStore
//! [`RuleStore::allocate_ids`]: crate::store::RuleStore::allocate_ids

use serde::{Deserialize, Serialize};

use actum_core::{
    ActionRule, CommandTarget, Condition, EntityId, EvalType, InventoryMode, MaintenanceMode,
    Operation, OperationCondition, OperationId, OperationPayload, OperationType, PayloadShape,
    RuleId,
};

/// Scalar rule-row updates. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulePatch {
    pub id: RuleId,
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub esc_period: Option<u32>,
    pub maintenance_mode: Option<MaintenanceMode>,
    pub eval_type: Option<EvalType>,
    /// New stored formula; `Some(String::new())` clears it.
    pub formula: Option<String>,
}

impl RulePatch {
    /// A patch that changes nothing.
    #[must_use]
    pub fn new(id: RuleId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Whether this patch carries any change.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.name.is_none()
            && self.enabled.is_none()
            && self.esc_period.is_none()
            && self.maintenance_mode.is_none()
            && self.eval_type.is_none()
            && self.formula.is_none()
    }
}

/// Positional replacement of a rule's full condition list: the store
/// swaps the persisted list for this one, keyed by position. Ids are
/// preassigned by the service (kept from the matching position or freshly
/// allocated).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionReplacement {
    pub rule_id: RuleId,
    pub conditions: Vec<Condition>,
}

/// A complete new operation row plus its payload and condition rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationInsert {
    pub rule_id: RuleId,
    pub operation: Operation,
}

/// Scalar operation-row updates. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationPatch {
    pub id: OperationId,
    pub operation_type: Option<OperationType>,
    pub esc_period: Option<u32>,
    pub esc_step_from: Option<u32>,
    pub esc_step_to: Option<u32>,
}

impl OperationPatch {
    /// A patch that changes nothing.
    #[must_use]
    pub fn new(id: OperationId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Whether this patch carries any change.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.operation_type.is_none()
            && self.esc_period.is_none()
            && self.esc_step_from.is_none()
            && self.esc_step_to.is_none()
    }
}

/// Insert/delete sets for one membership-keyed child table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipDelta<T> {
    pub insert: Vec<T>,
    pub delete: Vec<T>,
}

impl<T> Default for MembershipDelta<T> {
    fn default() -> Self {
        Self {
            insert: Vec::new(),
            delete: Vec::new(),
        }
    }
}

impl<T> MembershipDelta<T> {
    /// Whether this delta carries any change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.delete.is_empty()
    }
}

/// One change against an operation's typed payload tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadChange {
    /// Purge every payload row of the given shape for an operation. Issued
    /// when an operation's type changes shape, independently of whether the
    /// operation row itself changed.
    Purge {
        operation_id: OperationId,
        shape: PayloadShape,
    },
    /// Write a complete payload for an operation (insert, or shape change).
    Put {
        operation_id: OperationId,
        payload: OperationPayload,
    },
    /// Update the message body row, leaving recipient rows alone.
    MessageBody {
        operation_id: OperationId,
        media_type: Option<EntityId>,
        use_default_message: bool,
        subject: String,
        body: String,
    },
    MessageUsers {
        operation_id: OperationId,
        delta: MembershipDelta<EntityId>,
    },
    MessageGroups {
        operation_id: OperationId,
        delta: MembershipDelta<EntityId>,
    },
    /// Update the command specification row, leaving target rows alone.
    CommandSpec {
        operation_id: OperationId,
        spec: actum_core::CommandPayload,
    },
    CommandHosts {
        operation_id: OperationId,
        delta: MembershipDelta<CommandTarget>,
    },
    CommandGroups {
        operation_id: OperationId,
        delta: MembershipDelta<EntityId>,
    },
    GroupTargets {
        operation_id: OperationId,
        delta: MembershipDelta<EntityId>,
    },
    TemplateTargets {
        operation_id: OperationId,
        delta: MembershipDelta<EntityId>,
    },
    Inventory {
        operation_id: OperationId,
        mode: InventoryMode,
    },
    /// Membership change to an operation's condition rows. Inserted rows
    /// carry preallocated ids; deletions are keyed by row id.
    OperationConditions {
        operation_id: OperationId,
        insert: Vec<OperationCondition>,
        delete: Vec<u64>,
    },
}

/// All changes of one service call, applied atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub rule_inserts: Vec<ActionRule>,
    pub rule_patches: Vec<RulePatch>,
    /// Rule deletions cascade: conditions, operations, payload rows, and
    /// historical alert-log rows referencing the rule are removed with it.
    pub rule_deletes: Vec<RuleId>,
    pub condition_replacements: Vec<ConditionReplacement>,
    pub operation_inserts: Vec<OperationInsert>,
    pub operation_patches: Vec<OperationPatch>,
    pub operation_deletes: Vec<OperationId>,
    pub payload_changes: Vec<PayloadChange>,
}

impl ChangeSet {
    /// Whether the set carries no changes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rule_inserts.is_empty()
            && self.rule_patches.is_empty()
            && self.rule_deletes.is_empty()
            && self.condition_replacements.is_empty()
            && self.operation_inserts.is_empty()
            && self.operation_patches.is_empty()
            && self.operation_deletes.is_empty()
            && self.payload_changes.is_empty()
    }
}
