//! Structural validation of submitted rules and operations, plus batched
//! entity-reference permission checks.
//!
//! Type legality (the phase/event-source matrix) runs first, then the
//! per-type payload rules. Every entity id a rule references anywhere is
//! collected into one [`EntityRefs`] set and checked in a single batched
//! pass per kind, instead of one access-control round-trip per operation.

use std::collections::{HashMap, HashSet};

use actum_core::{
    CommandKind, CommandPayload, CommandTarget, ConditionDraft, ConditionType, EntityId,
    EntityKind, EventSource, FilterDraft, MaintenanceMode, MessagePayload, OperationDraft,
    OperationPayload, OperationPhase, OperationType, RuleDraft, MAX_ESC_PERIOD, MIN_ESC_PERIOD,
};
use actum_state::AccessControl;
use tracing::debug;

use crate::error::ActionError;
use crate::matrix;

/// Validate a full rule draft for create: scalar fields, filter, and both
/// operation lists.
pub fn validate_rule_draft(draft: &RuleDraft) -> Result<(), ActionError> {
    validate_name(&draft.name)?;
    validate_esc_period(draft.esc_period)?;
    validate_maintenance_mode(draft.event_source, draft.maintenance_mode)?;

    if draft.escalation_operations.is_empty() && draft.recovery_operations.is_empty() {
        return Err(ActionError::Parameter(format!(
            "rule \"{}\" has no operations",
            draft.name
        )));
    }

    if let Some(filter) = &draft.filter {
        actum_formula::validate_filter(filter)?;
    }

    for operation in &draft.escalation_operations {
        validate_operation(operation, OperationPhase::Escalation, draft.event_source)?;
    }
    for operation in &draft.recovery_operations {
        validate_operation(operation, OperationPhase::Recovery, draft.event_source)?;
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<(), ActionError> {
    if name.trim().is_empty() {
        return Err(ActionError::Parameter("rule name must not be empty".into()));
    }
    Ok(())
}

pub fn validate_esc_period(esc_period: u32) -> Result<(), ActionError> {
    if !(MIN_ESC_PERIOD..=MAX_ESC_PERIOD).contains(&esc_period) {
        return Err(ActionError::Parameter(format!(
            "escalation period {esc_period} is out of range {MIN_ESC_PERIOD}..={MAX_ESC_PERIOD}"
        )));
    }
    Ok(())
}

pub fn validate_maintenance_mode(
    event_source: EventSource,
    mode: Option<MaintenanceMode>,
) -> Result<(), ActionError> {
    if mode.is_some() && event_source != EventSource::Triggers {
        return Err(ActionError::Parameter(
            "maintenance mode is only valid for trigger rules".into(),
        ));
    }
    Ok(())
}

/// Validate one submitted operation: type legality, escalation step
/// bounds, and the per-type payload rules.
pub fn validate_operation(
    draft: &OperationDraft,
    phase: OperationPhase,
    event_source: EventSource,
) -> Result<(), ActionError> {
    if !matrix::is_legal(draft.operation_type, phase, event_source) {
        return Err(ActionError::Parameter(format!(
            "operation type {:?} is not legal for {phase:?} operations of {event_source:?} rules",
            draft.operation_type
        )));
    }

    match phase {
        OperationPhase::Recovery => {
            if draft.esc_period.is_some()
                || draft.esc_step_from.is_some()
                || draft.esc_step_to.is_some()
            {
                return Err(ActionError::Parameter(
                    "recovery operations cannot carry escalation step fields".into(),
                ));
            }
        }
        OperationPhase::Escalation => validate_steps(draft)?,
    }

    if draft.payload.shape() != draft.operation_type.payload_shape() {
        return Err(ActionError::Parameter(format!(
            "operation type {:?} requires a {:?} payload, got {:?}",
            draft.operation_type,
            draft.operation_type.payload_shape(),
            draft.payload.shape()
        )));
    }

    match &draft.payload {
        OperationPayload::Message(message) => {
            validate_message(message, draft.operation_type)?;
        }
        OperationPayload::Command(command) => validate_command(command)?,
        OperationPayload::Groups(targets) | OperationPayload::Templates(targets) => {
            if targets.targets.is_empty() {
                return Err(ActionError::Parameter(format!(
                    "operation type {:?} requires at least one target",
                    draft.operation_type
                )));
            }
        }
        // The inventory mode enum admits no invalid value; hosts
        // enable/disable/add/remove carry nothing.
        OperationPayload::Inventory(_) | OperationPayload::None => {}
    }

    Ok(())
}

/// Escalation step bounds: `from >= 1`, `from <= to` unless `to` is the
/// unbounded sentinel 0. The step duration override must be 0 (inherit
/// the rule default) or within the valid period range.
fn validate_steps(draft: &OperationDraft) -> Result<(), ActionError> {
    let from = draft.esc_step_from.unwrap_or(1);
    let to = draft.esc_step_to.unwrap_or(from);
    if from < 1 {
        return Err(ActionError::Parameter(
            "escalation step range must start at 1 or later".into(),
        ));
    }
    if to != 0 && from > to {
        return Err(ActionError::Parameter(format!(
            "escalation step range {from}..{to} is inverted"
        )));
    }
    if let Some(period) = draft.esc_period {
        if period != 0 {
            validate_esc_period(period)?;
        }
    }
    Ok(())
}

fn validate_message(
    message: &MessagePayload,
    operation_type: OperationType,
) -> Result<(), ActionError> {
    match operation_type {
        // Recovery messages notify everyone the escalation already
        // reached; explicit recipients make no sense there.
        OperationType::RecoveryMessage => {
            if !message.users.is_empty()
                || !message.user_groups.is_empty()
                || message.media_type.is_some()
            {
                return Err(ActionError::Parameter(
                    "recovery-message operations cannot carry recipients or a media type".into(),
                ));
            }
        }
        _ => {
            if message.users.is_empty() && message.user_groups.is_empty() {
                return Err(ActionError::Parameter(
                    "message operations require at least one user or user group recipient".into(),
                ));
            }
        }
    }
    Ok(())
}

fn validate_command(command: &CommandPayload) -> Result<(), ActionError> {
    if command.kind != CommandKind::GlobalScript && command.command.trim().is_empty() {
        return Err(ActionError::Parameter(
            "command operations require a non-empty command".into(),
        ));
    }

    match command.kind {
        CommandKind::CustomScript => {
            if command.execute_on.is_none() {
                return Err(ActionError::Parameter(
                    "custom script commands must declare where they execute".into(),
                ));
            }
        }
        CommandKind::Ssh => {
            if command.username.trim().is_empty() {
                return Err(ActionError::Parameter(
                    "SSH commands require a username".into(),
                ));
            }
            match &command.auth {
                None => {
                    return Err(ActionError::Parameter(
                        "SSH commands require an authentication method".into(),
                    ));
                }
                Some(actum_core::SshAuth::PublicKey {
                    public_key,
                    private_key,
                }) => {
                    if public_key.trim().is_empty() || private_key.trim().is_empty() {
                        return Err(ActionError::Parameter(
                            "public-key SSH commands require public and private key paths".into(),
                        ));
                    }
                }
                Some(actum_core::SshAuth::Password) => {}
            }
            validate_port(&command.port)?;
        }
        CommandKind::Telnet => {
            if command.username.trim().is_empty() {
                return Err(ActionError::Parameter(
                    "Telnet commands require a username".into(),
                ));
            }
            validate_port(&command.port)?;
        }
        CommandKind::GlobalScript => {
            if command.script_id.is_none() {
                return Err(ActionError::Parameter(
                    "global script commands require a script id".into(),
                ));
            }
        }
        CommandKind::Ipmi => {}
    }

    let has_explicit_target = command
        .host_targets
        .iter()
        .any(|t| matches!(t, CommandTarget::Host(_)))
        || !command.group_targets.is_empty();
    let has_any_target = has_explicit_target || !command.host_targets.is_empty();

    // Global scripts need a concrete host or group target; the implicit
    // current-host flag alone does not satisfy them.
    if command.kind == CommandKind::GlobalScript {
        if !has_explicit_target {
            return Err(ActionError::Parameter(
                "global script commands require an explicit host or host group target".into(),
            ));
        }
    } else if !has_any_target {
        return Err(ActionError::Parameter(
            "command operations require at least one execution target".into(),
        ));
    }

    Ok(())
}

/// Port is empty (protocol default), a `{$MACRO}` user macro token, or a
/// number in 1..=65535.
fn validate_port(port: &str) -> Result<(), ActionError> {
    if port.is_empty() || is_user_macro(port) {
        return Ok(());
    }
    match port.parse::<u32>() {
        Ok(n) if (1..=65_535).contains(&n) => Ok(()),
        _ => Err(ActionError::Parameter(format!(
            "invalid port \"{port}\": expected 1-65535 or a user macro"
        ))),
    }
}

fn is_user_macro(value: &str) -> bool {
    value.len() > 3
        && value.starts_with("{$")
        && value.ends_with('}')
        && value[2..value.len() - 1]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '.')
}

/// Every entity id a batch of rules references, grouped by kind for the
/// batched permission check.
#[derive(Debug, Default)]
pub struct EntityRefs {
    refs: HashMap<EntityKind, HashSet<EntityId>>,
}

impl EntityRefs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, kind: EntityKind, id: EntityId) {
        self.refs.entry(kind).or_default().insert(id);
    }

    /// Collect references from a submitted filter. Conditions addressing
    /// an entity by id must carry a numeric value.
    pub fn collect_filter(&mut self, filter: &FilterDraft) -> Result<(), ActionError> {
        for condition in &filter.conditions {
            if let Some(kind) = condition_entity_kind(condition.condition_type) {
                self.add(kind, parse_condition_id(condition)?);
            }
        }
        Ok(())
    }

    /// Collect references from a submitted operation's payload.
    pub fn collect_operation(&mut self, operation: &OperationDraft) {
        match &operation.payload {
            OperationPayload::Message(message) => {
                for &user in &message.users {
                    self.add(EntityKind::User, user);
                }
                for &group in &message.user_groups {
                    self.add(EntityKind::UserGroup, group);
                }
                if let Some(media_type) = message.media_type {
                    self.add(EntityKind::MediaType, media_type);
                }
            }
            OperationPayload::Command(command) => {
                for target in &command.host_targets {
                    if let CommandTarget::Host(id) = target {
                        self.add(EntityKind::Host, *id);
                    }
                }
                for &group in &command.group_targets {
                    self.add(EntityKind::HostGroup, group);
                }
                if let Some(script) = command.script_id {
                    self.add(EntityKind::Script, script);
                }
            }
            OperationPayload::Groups(targets) => {
                for &group in &targets.targets {
                    self.add(EntityKind::HostGroup, group);
                }
            }
            OperationPayload::Templates(targets) => {
                for &template in &targets.targets {
                    self.add(EntityKind::Template, template);
                }
            }
            OperationPayload::Inventory(_) | OperationPayload::None => {}
        }
    }

    /// Run the batched permission check: one `count_writable` call per
    /// referenced kind. A count below the number of distinct ids means at
    /// least one reference is forbidden or nonexistent.
    pub async fn check(&self, access: &dyn AccessControl) -> Result<(), ActionError> {
        for (&kind, ids) in &self.refs {
            let ids: Vec<EntityId> = ids.iter().copied().collect();
            let writable = access.count_writable(kind, &ids).await?;
            debug!(kind = %kind, requested = ids.len(), writable, "permission check");
            if writable < ids.len() {
                return Err(ActionError::forbidden(kind));
            }
        }
        Ok(())
    }
}

/// Which entity kind a condition type references by id, if any.
fn condition_entity_kind(condition_type: ConditionType) -> Option<EntityKind> {
    match condition_type {
        ConditionType::HostGroup => Some(EntityKind::HostGroup),
        ConditionType::Host => Some(EntityKind::Host),
        ConditionType::Trigger => Some(EntityKind::Trigger),
        ConditionType::Template => Some(EntityKind::Template),
        ConditionType::DiscoveryRule => Some(EntityKind::DiscoveryRule),
        ConditionType::DiscoveryCheck => Some(EntityKind::DiscoveryCheck),
        ConditionType::Proxy => Some(EntityKind::Proxy),
        ConditionType::TriggerName
        | ConditionType::Severity
        | ConditionType::TimePeriod
        | ConditionType::EventAcknowledged
        | ConditionType::EventTag
        | ConditionType::EventTagValue => None,
    }
}

fn parse_condition_id(condition: &ConditionDraft) -> Result<EntityId, ActionError> {
    condition
        .value
        .parse::<u64>()
        .map(EntityId::new)
        .map_err(|_| {
            ActionError::Parameter(format!(
                "condition value \"{}\" is not a valid {:?} id",
                condition.value, condition.condition_type
            ))
        })
}
