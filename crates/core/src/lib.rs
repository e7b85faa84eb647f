//! Core domain types for the Actum automation rule engine.
//!
//! An [`ActionRule`] reacts to monitoring events from one
//! [`EventSource`]: its [`Filter`] decides when the rule fires and its
//! phased [`Operation`]s decide what happens, before and after the
//! triggering condition resolves.

pub mod operation;
pub mod rule;
pub mod types;

pub use operation::{
    CommandKind, CommandPayload, CommandTarget, ExecuteOn, InventoryMode, InventoryPayload,
    MessagePayload, Operation, OperationCondition, OperationConditionDraft,
    OperationConditionKind, OperationDraft, OperationPayload, OperationPhase, OperationType,
    PayloadShape, SshAuth, TargetPayload,
};
pub use rule::{
    ActionRule, Condition, ConditionDraft, ConditionOperator, ConditionType, EvalType,
    EventSource, Filter, FilterDraft, MaintenanceMode, RuleDraft, RuleUpdate, DEFAULT_ESC_PERIOD,
    MAX_ESC_PERIOD, MIN_ESC_PERIOD,
};
pub use types::{ConditionId, EntityId, EntityKind, OperationId, RuleId};
