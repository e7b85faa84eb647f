use serde::{Deserialize, Serialize};

use crate::operation::{Operation, OperationDraft};
use crate::types::{ConditionId, RuleId};

/// Default escalation period for new rules, in seconds.
pub const DEFAULT_ESC_PERIOD: u32 = 3600;

/// Minimum allowed escalation period, in seconds.
pub const MIN_ESC_PERIOD: u32 = 60;

/// Maximum allowed escalation period, in seconds (one week).
pub const MAX_ESC_PERIOD: u32 = 604_800;

/// Category of monitoring event a rule reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Triggers,
    Discovery,
    AutoRegistration,
    Internal,
}

/// How a rule behaves while a referenced host is in maintenance.
/// Only meaningful for [`EventSource::Triggers`] rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceMode {
    /// Operations keep running during maintenance.
    Normal,
    /// Operations are paused until maintenance ends.
    Pause,
}

/// Combination policy for a filter's conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalType {
    /// All conditions are OR-ed together.
    Or,
    /// All conditions are AND-ed together.
    And,
    /// Conditions are OR-ed within a condition type and AND-ed across types.
    AndOr,
    /// The caller supplies the boolean expression over letter ids.
    CustomExpression,
}

/// Typed predicate categories a filter condition can test.
///
/// Declaration order defines the canonical sort order used when deriving
/// formula letters; it must stay stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    HostGroup,
    Host,
    Trigger,
    TriggerName,
    Severity,
    TimePeriod,
    Template,
    EventAcknowledged,
    DiscoveryRule,
    DiscoveryCheck,
    Proxy,
    EventTag,
    EventTagValue,
}

/// Comparison operator applied by a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equal,
    NotEqual,
    Like,
    NotLike,
    In,
    GreaterEqual,
    LessEqual,
    NotIn,
}

/// A persisted filter condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub id: ConditionId,
    pub condition_type: ConditionType,
    pub operator: ConditionOperator,
    pub value: String,
    /// Secondary value; mandatory only for [`ConditionType::EventTagValue`],
    /// where it carries the tag name.
    #[serde(default)]
    pub value2: String,
    /// Transient letter id derived from the effective formula on read,
    /// never persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula_id: Option<String>,
}

/// A submitted filter condition, prior to id assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionDraft {
    pub condition_type: ConditionType,
    pub operator: ConditionOperator,
    pub value: String,
    #[serde(default)]
    pub value2: String,
    /// Letter id referencing this condition from a custom expression.
    /// Required if and only if the filter eval type is
    /// [`EvalType::CustomExpression`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula_id: Option<String>,
}

/// A persisted rule filter: condition set plus combination policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub eval_type: EvalType,
    /// Stored formula with `{<condition id>}` tokens. Non-empty only when
    /// `eval_type` is [`EvalType::CustomExpression`].
    #[serde(default)]
    pub formula: String,
    /// Letter-based rendering of the effective formula, reconstructed on
    /// read for every eval type; never persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_formula: Option<String>,
    pub conditions: Vec<Condition>,
}

impl Filter {
    /// An empty OR filter that matches every event.
    #[must_use]
    pub fn match_all() -> Self {
        Self {
            eval_type: EvalType::Or,
            formula: String::new(),
            eval_formula: None,
            conditions: Vec::new(),
        }
    }
}

/// A submitted filter, prior to condition id assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDraft {
    pub eval_type: EvalType,
    /// Letter-based custom expression. Accepted only when `eval_type` is
    /// [`EvalType::CustomExpression`]; for every other eval type the
    /// formula is derived and must not be supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    pub conditions: Vec<ConditionDraft>,
}

/// A persisted automation rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRule {
    pub id: RuleId,
    /// Unique rule name.
    pub name: String,
    pub event_source: EventSource,
    pub enabled: bool,
    /// Default escalation period for this rule's operations, in seconds.
    pub esc_period: u32,
    /// Maintenance behavior; always `None` for non-trigger sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_mode: Option<MaintenanceMode>,
    pub filter: Filter,
    pub escalation_operations: Vec<Operation>,
    pub recovery_operations: Vec<Operation>,
}

/// A submitted rule for `create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    pub event_source: EventSource,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_esc_period")]
    pub esc_period: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_mode: Option<MaintenanceMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterDraft>,
    #[serde(default)]
    pub escalation_operations: Vec<OperationDraft>,
    #[serde(default)]
    pub recovery_operations: Vec<OperationDraft>,
}

impl RuleDraft {
    /// Create a draft with defaults: enabled, default escalation period,
    /// no filter, no operations.
    #[must_use]
    pub fn new(name: impl Into<String>, event_source: EventSource) -> Self {
        Self {
            name: name.into(),
            event_source,
            enabled: true,
            esc_period: DEFAULT_ESC_PERIOD,
            maintenance_mode: None,
            filter: None,
            escalation_operations: Vec::new(),
            recovery_operations: Vec::new(),
        }
    }

    /// Set the filter.
    #[must_use]
    pub fn with_filter(mut self, filter: FilterDraft) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Append an escalation-phase operation.
    #[must_use]
    pub fn with_escalation_operation(mut self, operation: OperationDraft) -> Self {
        self.escalation_operations.push(operation);
        self
    }

    /// Append a recovery-phase operation.
    #[must_use]
    pub fn with_recovery_operation(mut self, operation: OperationDraft) -> Self {
        self.recovery_operations.push(operation);
        self
    }
}

fn default_enabled() -> bool {
    true
}

fn default_esc_period() -> u32 {
    DEFAULT_ESC_PERIOD
}

/// A submitted rule change for `update`. `None` fields are left untouched;
/// submitted operation lists replace the persisted lists through
/// reconciliation, not wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleUpdate {
    pub id: RuleId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub esc_period: Option<u32>,
    /// `None` leaves the stored mode untouched; an update cannot clear a
    /// mode that is already set, only switch it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_mode: Option<MaintenanceMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterDraft>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_operations: Option<Vec<OperationDraft>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_operations: Option<Vec<OperationDraft>>,
}

impl RuleUpdate {
    /// An update that changes nothing.
    #[must_use]
    pub fn new(id: RuleId) -> Self {
        Self {
            id,
            name: None,
            enabled: None,
            esc_period: None,
            maintenance_mode: None,
            filter: None,
            escalation_operations: None,
            recovery_operations: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_defaults() {
        let draft = RuleDraft::new("disk full", EventSource::Triggers);
        assert!(draft.enabled);
        assert_eq!(draft.esc_period, DEFAULT_ESC_PERIOD);
        assert!(draft.filter.is_none());
        assert!(draft.escalation_operations.is_empty());
    }

    #[test]
    fn condition_type_canonical_order() {
        // The canonical sort relies on declaration order.
        assert!(ConditionType::HostGroup < ConditionType::Severity);
        assert!(ConditionType::Severity < ConditionType::EventTagValue);
    }

    #[test]
    fn rule_serde_roundtrip() {
        let draft = RuleDraft::new("net down", EventSource::Discovery).with_filter(FilterDraft {
            eval_type: EvalType::And,
            formula: None,
            conditions: vec![ConditionDraft {
                condition_type: ConditionType::DiscoveryRule,
                operator: ConditionOperator::Equal,
                value: "12".into(),
                value2: String::new(),
                formula_id: None,
            }],
        });
        let json = serde_json::to_string(&draft).unwrap();
        let back: RuleDraft = serde_json::from_str(&json).unwrap();
        assert_eq!(back, draft);
    }
}
