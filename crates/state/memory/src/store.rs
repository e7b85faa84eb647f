use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use actum_core::{ActionRule, Operation, OperationPayload, OperationPhase, RuleId};
use actum_state::changes::{ChangeSet, PayloadChange};
use actum_state::error::StateError;
use actum_state::store::{IdKind, RuleQuery, RuleStore};

/// One historical alert-log row, referencing the rule that fired it.
#[derive(Debug, Clone)]
pub struct AlertRow {
    pub id: u64,
    pub rule_id: RuleId,
    pub message: String,
}

fn payload_change_target(change: &PayloadChange) -> actum_core::OperationId {
    match change {
        PayloadChange::Purge { operation_id, .. }
        | PayloadChange::Put { operation_id, .. }
        | PayloadChange::MessageBody { operation_id, .. }
        | PayloadChange::MessageUsers { operation_id, .. }
        | PayloadChange::MessageGroups { operation_id, .. }
        | PayloadChange::CommandSpec { operation_id, .. }
        | PayloadChange::CommandHosts { operation_id, .. }
        | PayloadChange::CommandGroups { operation_id, .. }
        | PayloadChange::GroupTargets { operation_id, .. }
        | PayloadChange::TemplateTargets { operation_id, .. }
        | PayloadChange::Inventory { operation_id, .. }
        | PayloadChange::OperationConditions { operation_id, .. } => *operation_id,
    }
}

#[derive(Debug, Clone, Default)]
struct Tables {
    rules: BTreeMap<u64, ActionRule>,
    alerts: Vec<AlertRow>,
}

impl Tables {
    fn operation_mut(&mut self, id: actum_core::OperationId) -> Result<&mut Operation, StateError> {
        self.rules
            .values_mut()
            .flat_map(|rule| {
                rule.escalation_operations
                    .iter_mut()
                    .chain(rule.recovery_operations.iter_mut())
            })
            .find(|op| op.id == id)
            .ok_or_else(|| StateError::NotFound(format!("operation {id}")))
    }

    fn operation_exists(&self, id: actum_core::OperationId) -> bool {
        self.rules.values().any(|rule| {
            rule.escalation_operations
                .iter()
                .chain(rule.recovery_operations.iter())
                .any(|op| op.id == id)
        })
    }
}

/// In-memory [`RuleStore`] holding rule aggregates behind one lock.
///
/// `commit` verifies row references up front and applies the change set
/// to a staged copy of the tables, swapping it in only on success, so a
/// failed change set leaves the tables untouched no matter how late the
/// failure surfaces. Matches the all-or-nothing contract of a
/// transactional backend.
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    tables: RwLock<Tables>,
    sequences: [AtomicU64; 5],
}

impl MemoryRuleStore {
    /// Create a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a historical alert-log row for a rule. Test helper standing
    /// in for the alerting pipeline.
    pub async fn record_alert(&self, rule_id: RuleId, message: impl Into<String>) {
        let id = self.sequences[4].fetch_add(1, Ordering::Relaxed) + 1;
        let mut tables = self.tables.write().await;
        tables.alerts.push(AlertRow {
            id,
            rule_id,
            message: message.into(),
        });
    }

    /// How many alert-log rows reference a rule.
    pub async fn alert_count(&self, rule_id: RuleId) -> usize {
        let tables = self.tables.read().await;
        tables.alerts.iter().filter(|a| a.rule_id == rule_id).count()
    }

    fn sequence(&self, kind: IdKind) -> &AtomicU64 {
        match kind {
            IdKind::Rule => &self.sequences[0],
            IdKind::Condition => &self.sequences[1],
            IdKind::Operation => &self.sequences[2],
            IdKind::OperationCondition => &self.sequences[3],
        }
    }

    /// Check every reference of the change set against the current tables.
    fn verify(tables: &Tables, changes: &ChangeSet) -> Result<(), StateError> {
        for rule in &changes.rule_inserts {
            if tables.rules.contains_key(&rule.id.value()) {
                return Err(StateError::Backend(format!(
                    "duplicate rule id {}",
                    rule.id
                )));
            }
        }
        for patch in &changes.rule_patches {
            if !tables.rules.contains_key(&patch.id.value()) {
                return Err(StateError::NotFound(format!("rule {}", patch.id)));
            }
        }
        for id in &changes.rule_deletes {
            if !tables.rules.contains_key(&id.value()) {
                return Err(StateError::NotFound(format!("rule {id}")));
            }
        }
        for replacement in &changes.condition_replacements {
            if !tables.rules.contains_key(&replacement.rule_id.value()) {
                return Err(StateError::NotFound(format!(
                    "rule {}",
                    replacement.rule_id
                )));
            }
        }
        for insert in &changes.operation_inserts {
            if !tables.rules.contains_key(&insert.rule_id.value()) {
                return Err(StateError::NotFound(format!("rule {}", insert.rule_id)));
            }
        }
        for patch in &changes.operation_patches {
            if !tables.operation_exists(patch.id) {
                return Err(StateError::NotFound(format!("operation {}", patch.id)));
            }
        }
        for id in &changes.operation_deletes {
            if !tables.operation_exists(*id) {
                return Err(StateError::NotFound(format!("operation {id}")));
            }
        }
        // Payload changes may target operations inserted by this same set.
        for change in &changes.payload_changes {
            let operation_id = payload_change_target(change);
            let inserted = changes
                .operation_inserts
                .iter()
                .any(|i| i.operation.id == operation_id);
            if !inserted && !tables.operation_exists(operation_id) {
                return Err(StateError::NotFound(format!("operation {operation_id}")));
            }
        }
        Ok(())
    }

    fn apply(tables: &mut Tables, changes: ChangeSet) -> Result<(), StateError> {
        for rule in changes.rule_inserts {
            tables.rules.insert(rule.id.value(), rule);
        }

        for patch in changes.rule_patches {
            let rule = tables
                .rules
                .get_mut(&patch.id.value())
                .ok_or_else(|| StateError::NotFound(format!("rule {}", patch.id)))?;
            if let Some(name) = patch.name {
                rule.name = name;
            }
            if let Some(enabled) = patch.enabled {
                rule.enabled = enabled;
            }
            if let Some(esc_period) = patch.esc_period {
                rule.esc_period = esc_period;
            }
            if let Some(mode) = patch.maintenance_mode {
                rule.maintenance_mode = Some(mode);
            }
            if let Some(eval_type) = patch.eval_type {
                rule.filter.eval_type = eval_type;
            }
            if let Some(formula) = patch.formula {
                rule.filter.formula = formula;
            }
        }

        for replacement in changes.condition_replacements {
            let rule = tables
                .rules
                .get_mut(&replacement.rule_id.value())
                .ok_or_else(|| StateError::NotFound(format!("rule {}", replacement.rule_id)))?;
            rule.filter.conditions = replacement.conditions;
        }

        for id in changes.operation_deletes {
            for rule in tables.rules.values_mut() {
                rule.escalation_operations.retain(|op| op.id != id);
                rule.recovery_operations.retain(|op| op.id != id);
            }
        }

        for insert in changes.operation_inserts {
            let rule = tables
                .rules
                .get_mut(&insert.rule_id.value())
                .ok_or_else(|| StateError::NotFound(format!("rule {}", insert.rule_id)))?;
            match insert.operation.phase {
                OperationPhase::Escalation => rule.escalation_operations.push(insert.operation),
                OperationPhase::Recovery => rule.recovery_operations.push(insert.operation),
            }
        }

        for patch in changes.operation_patches {
            let operation = tables.operation_mut(patch.id)?;
            if let Some(operation_type) = patch.operation_type {
                operation.operation_type = operation_type;
            }
            if let Some(esc_period) = patch.esc_period {
                operation.esc_period = esc_period;
            }
            if let Some(from) = patch.esc_step_from {
                operation.esc_step_from = from;
            }
            if let Some(to) = patch.esc_step_to {
                operation.esc_step_to = to;
            }
        }

        for change in changes.payload_changes {
            Self::apply_payload_change(tables, change)?;
        }

        for id in changes.rule_deletes {
            // Cascade: the aggregate carries conditions, operations, and
            // payload rows; alert-log rows are removed explicitly.
            tables.rules.remove(&id.value());
            tables.alerts.retain(|alert| alert.rule_id != id);
        }

        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    fn apply_payload_change(tables: &mut Tables, change: PayloadChange) -> Result<(), StateError> {
        match change {
            PayloadChange::Purge {
                operation_id,
                shape,
            } => {
                let operation = tables.operation_mut(operation_id)?;
                if operation.payload.shape() == shape {
                    operation.payload = OperationPayload::None;
                }
            }
            PayloadChange::Put {
                operation_id,
                payload,
            } => {
                tables.operation_mut(operation_id)?.payload = payload;
            }
            PayloadChange::MessageBody {
                operation_id,
                media_type,
                use_default_message,
                subject,
                body,
            } => {
                let operation = tables.operation_mut(operation_id)?;
                let OperationPayload::Message(message) = &mut operation.payload else {
                    return Err(StateError::Backend(format!(
                        "operation {operation_id} has no message payload row"
                    )));
                };
                message.media_type = media_type;
                message.use_default_message = use_default_message;
                message.subject = subject;
                message.body = body;
            }
            PayloadChange::MessageUsers {
                operation_id,
                delta,
            } => {
                let operation = tables.operation_mut(operation_id)?;
                let OperationPayload::Message(message) = &mut operation.payload else {
                    return Err(StateError::Backend(format!(
                        "operation {operation_id} has no message payload row"
                    )));
                };
                message.users.retain(|id| !delta.delete.contains(id));
                for id in delta.insert {
                    if !message.users.contains(&id) {
                        message.users.push(id);
                    }
                }
            }
            PayloadChange::MessageGroups {
                operation_id,
                delta,
            } => {
                let operation = tables.operation_mut(operation_id)?;
                let OperationPayload::Message(message) = &mut operation.payload else {
                    return Err(StateError::Backend(format!(
                        "operation {operation_id} has no message payload row"
                    )));
                };
                message.user_groups.retain(|id| !delta.delete.contains(id));
                for id in delta.insert {
                    if !message.user_groups.contains(&id) {
                        message.user_groups.push(id);
                    }
                }
            }
            PayloadChange::CommandSpec { operation_id, spec } => {
                let operation = tables.operation_mut(operation_id)?;
                let OperationPayload::Command(command) = &mut operation.payload else {
                    return Err(StateError::Backend(format!(
                        "operation {operation_id} has no command payload row"
                    )));
                };
                command.kind = spec.kind;
                command.command = spec.command;
                command.execute_on = spec.execute_on;
                command.auth = spec.auth;
                command.username = spec.username;
                command.password = spec.password;
                command.port = spec.port;
                command.script_id = spec.script_id;
            }
            PayloadChange::CommandHosts {
                operation_id,
                delta,
            } => {
                let operation = tables.operation_mut(operation_id)?;
                let OperationPayload::Command(command) = &mut operation.payload else {
                    return Err(StateError::Backend(format!(
                        "operation {operation_id} has no command payload row"
                    )));
                };
                command
                    .host_targets
                    .retain(|target| !delta.delete.contains(target));
                for target in delta.insert {
                    if !command.host_targets.contains(&target) {
                        command.host_targets.push(target);
                    }
                }
            }
            PayloadChange::CommandGroups {
                operation_id,
                delta,
            } => {
                let operation = tables.operation_mut(operation_id)?;
                let OperationPayload::Command(command) = &mut operation.payload else {
                    return Err(StateError::Backend(format!(
                        "operation {operation_id} has no command payload row"
                    )));
                };
                command
                    .group_targets
                    .retain(|id| !delta.delete.contains(id));
                for id in delta.insert {
                    if !command.group_targets.contains(&id) {
                        command.group_targets.push(id);
                    }
                }
            }
            PayloadChange::GroupTargets {
                operation_id,
                delta,
            } => {
                let operation = tables.operation_mut(operation_id)?;
                let OperationPayload::Groups(targets) = &mut operation.payload else {
                    return Err(StateError::Backend(format!(
                        "operation {operation_id} has no group target rows"
                    )));
                };
                targets.targets.retain(|id| !delta.delete.contains(id));
                for id in delta.insert {
                    if !targets.targets.contains(&id) {
                        targets.targets.push(id);
                    }
                }
            }
            PayloadChange::TemplateTargets {
                operation_id,
                delta,
            } => {
                let operation = tables.operation_mut(operation_id)?;
                let OperationPayload::Templates(targets) = &mut operation.payload else {
                    return Err(StateError::Backend(format!(
                        "operation {operation_id} has no template target rows"
                    )));
                };
                targets.targets.retain(|id| !delta.delete.contains(id));
                for id in delta.insert {
                    if !targets.targets.contains(&id) {
                        targets.targets.push(id);
                    }
                }
            }
            PayloadChange::Inventory { operation_id, mode } => {
                let operation = tables.operation_mut(operation_id)?;
                let OperationPayload::Inventory(inventory) = &mut operation.payload else {
                    return Err(StateError::Backend(format!(
                        "operation {operation_id} has no inventory payload row"
                    )));
                };
                inventory.mode = mode;
            }
            PayloadChange::OperationConditions {
                operation_id,
                insert,
                delete,
            } => {
                let operation = tables.operation_mut(operation_id)?;
                operation
                    .conditions
                    .retain(|condition| !delete.contains(&condition.id));
                operation.conditions.extend(insert);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn query(&self, query: &RuleQuery) -> Result<Vec<ActionRule>, StateError> {
        let tables = self.tables.read().await;
        let rules = tables
            .rules
            .values()
            .filter(|rule| {
                query
                    .ids
                    .as_ref()
                    .map_or(true, |ids| ids.contains(&rule.id))
            })
            .filter(|rule| {
                query
                    .names
                    .as_ref()
                    .map_or(true, |names| names.contains(&rule.name))
            })
            .filter(|rule| {
                query
                    .event_sources
                    .as_ref()
                    .map_or(true, |sources| sources.contains(&rule.event_source))
            })
            .cloned()
            .collect();
        Ok(rules)
    }

    async fn allocate_ids(&self, kind: IdKind, count: usize) -> Result<Vec<u64>, StateError> {
        let sequence = self.sequence(kind);
        let count = count as u64;
        let start = sequence.fetch_add(count, Ordering::Relaxed);
        Ok((start + 1..=start + count).collect())
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StateError> {
        let mut tables = self.tables.write().await;
        Self::verify(&tables, &changes)?;
        // Stage on a copy: apply can still fail (e.g. a payload change
        // against the wrong payload shape) and must not leave a partial
        // write behind.
        let mut staged = tables.clone();
        Self::apply(&mut staged, changes)?;
        *tables = staged;
        Ok(())
    }
}
