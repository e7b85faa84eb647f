use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, instrument};

use actum_core::{
    ActionRule, Condition, ConditionId, EvalType, Filter, FilterDraft, Operation,
    OperationCondition, OperationDraft, OperationId, OperationPayload, OperationPhase, RuleDraft,
    RuleId, RuleUpdate,
};
use actum_formula::{resolve_letters, translate_letters_to_ids, validate_filter};
use actum_state::changes::{
    ChangeSet, ConditionReplacement, OperationInsert, OperationPatch, PayloadChange, RulePatch,
};
use actum_state::{AccessControl, IdKind, RuleQuery, RuleStore};

use crate::error::ActionError;
use crate::reconcile::{diff_identity, diff_membership, IdentityChange};
use crate::validator::{
    validate_esc_period, validate_maintenance_mode, validate_name, validate_operation,
    validate_rule_draft, EntityRefs,
};

/// The action rule service: validates submitted rules, reconciles them
/// against loaded state, and persists each call as one atomic change set.
///
/// The write pipeline for each call:
/// 1. Structural validation (fields, filter formula, operation legality).
/// 2. Batched permission check over every referenced entity id.
/// 3. On update, load current state and reconcile child collections.
/// 4. Commit the combined [`ChangeSet`] through the store.
pub struct ActionService {
    // Note: manual `Debug` impl below because trait objects lack `Debug`.
    store: Arc<dyn RuleStore>,
    access: Arc<dyn AccessControl>,
}

impl std::fmt::Debug for ActionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionService").finish_non_exhaustive()
    }
}

impl ActionService {
    #[must_use]
    pub fn new(store: Arc<dyn RuleStore>, access: Arc<dyn AccessControl>) -> Self {
        Self { store, access }
    }

    /// Create a batch of rules. Nothing is persisted unless every rule in
    /// the batch validates.
    #[instrument(skip_all, fields(rules = drafts.len()))]
    pub async fn create(&self, drafts: Vec<RuleDraft>) -> Result<Vec<RuleId>, ActionError> {
        if drafts.is_empty() {
            return Ok(Vec::new());
        }

        let mut refs = EntityRefs::new();
        let mut names: HashSet<&str> = HashSet::with_capacity(drafts.len());
        for draft in &drafts {
            validate_rule_draft(draft)?;
            if !names.insert(&draft.name) {
                return Err(ActionError::Parameter(format!(
                    "duplicate rule name \"{}\" in one call",
                    draft.name
                )));
            }
            if let Some(filter) = &draft.filter {
                refs.collect_filter(filter)?;
            }
            for operation in draft
                .escalation_operations
                .iter()
                .chain(&draft.recovery_operations)
            {
                refs.collect_operation(operation);
            }
        }

        self.ensure_names_free(names.iter().map(|n| (*n).to_owned()).collect(), &[])
            .await?;
        refs.check(self.access.as_ref()).await?;

        let rule_ids = self.store.allocate_ids(IdKind::Rule, drafts.len()).await?;

        let mut changes = ChangeSet::default();
        for (draft, id) in drafts.into_iter().zip(&rule_ids) {
            let rule = self.build_rule(draft, RuleId::new(*id)).await?;
            changes.rule_inserts.push(rule);
        }
        self.store.commit(changes).await?;

        let ids: Vec<RuleId> = rule_ids.into_iter().map(RuleId::new).collect();
        info!(?ids, "rules created");
        Ok(ids)
    }

    /// Update a batch of rules. Scalar fields mutate in place; conditions
    /// and operations are reconciled against the loaded state, preserving
    /// row identity where the submitted state matches.
    #[instrument(skip_all, fields(rules = updates.len()))]
    pub async fn update(&self, updates: Vec<RuleUpdate>) -> Result<Vec<RuleId>, ActionError> {
        if updates.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<RuleId> = updates.iter().map(|u| u.id).collect();
        {
            let mut seen = HashSet::with_capacity(ids.len());
            for id in &ids {
                if !seen.insert(*id) {
                    return Err(ActionError::Parameter(format!(
                        "rule {id} appears twice in one call"
                    )));
                }
            }
        }

        let current = self.store.query(&RuleQuery::by_ids(ids.clone())).await?;
        let by_id: HashMap<RuleId, ActionRule> =
            current.into_iter().map(|rule| (rule.id, rule)).collect();

        let mut refs = EntityRefs::new();
        let mut renames: Vec<String> = Vec::new();
        for update in &updates {
            let rule = by_id
                .get(&update.id)
                .ok_or_else(|| ActionError::forbidden_rule(update.id))?;
            self.validate_update(update, rule, &mut refs, &mut renames)?;
        }

        self.ensure_names_free(renames, &ids).await?;
        refs.check(self.access.as_ref()).await?;

        let mut changes = ChangeSet::default();
        for update in updates {
            // Presence in `by_id` was established above.
            let Some(rule) = by_id.get(&update.id) else {
                return Err(ActionError::forbidden_rule(update.id));
            };
            self.reconcile_rule(update, rule, &mut changes).await?;
        }
        self.store.commit(changes).await?;

        info!(?ids, "rules updated");
        Ok(ids)
    }

    /// Delete rules by id, cascading conditions, operations, typed payload
    /// rows, and historical log rows.
    #[instrument(skip_all, fields(rules = ids.len()))]
    pub async fn delete(&self, ids: Vec<RuleId>) -> Result<Vec<RuleId>, ActionError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let found = self.store.query(&RuleQuery::by_ids(ids.clone())).await?;
        let known: HashSet<RuleId> = found.into_iter().map(|rule| rule.id).collect();
        for id in &ids {
            if !known.contains(id) {
                return Err(ActionError::forbidden_rule(*id));
            }
        }

        self.store
            .commit(ChangeSet {
                rule_deletes: ids.clone(),
                ..ChangeSet::default()
            })
            .await?;

        info!(?ids, "rules deleted");
        Ok(ids)
    }

    /// Load rules, reconstructing the letter formula, `eval_formula`, and
    /// each condition's transient letter id from stored state.
    #[instrument(skip_all)]
    pub async fn get(&self, query: RuleQuery) -> Result<Vec<ActionRule>, ActionError> {
        let mut rules = self.store.query(&query).await?;
        for rule in &mut rules {
            let letters = resolve_letters(
                &mut rule.filter.conditions,
                rule.filter.eval_type,
                &rule.filter.formula,
            )?;
            if rule.filter.eval_type == EvalType::CustomExpression {
                rule.filter.formula.clone_from(&letters);
            }
            rule.filter.eval_formula = if letters.is_empty() {
                None
            } else {
                Some(letters)
            };
        }
        Ok(rules)
    }

    /// Reject names already taken by rules other than the ones being
    /// written.
    async fn ensure_names_free(
        &self,
        names: Vec<String>,
        own_ids: &[RuleId],
    ) -> Result<(), ActionError> {
        if names.is_empty() {
            return Ok(());
        }
        let clashes = self.store.query(&RuleQuery::by_names(names)).await?;
        for rule in clashes {
            if !own_ids.contains(&rule.id) {
                return Err(ActionError::Parameter(format!(
                    "rule \"{}\" already exists",
                    rule.name
                )));
            }
        }
        Ok(())
    }

    /// Validate one update against its loaded rule and collect its entity
    /// references. `event_source` is immutable; everything else validates
    /// the way create does.
    fn validate_update(
        &self,
        update: &RuleUpdate,
        rule: &ActionRule,
        refs: &mut EntityRefs,
        renames: &mut Vec<String>,
    ) -> Result<(), ActionError> {
        if let Some(name) = &update.name {
            validate_name(name)?;
            if *name != rule.name {
                if renames.contains(name) {
                    return Err(ActionError::Parameter(format!(
                        "duplicate rule name \"{name}\" in one call"
                    )));
                }
                renames.push(name.clone());
            }
        }
        if let Some(esc_period) = update.esc_period {
            validate_esc_period(esc_period)?;
        }
        validate_maintenance_mode(rule.event_source, update.maintenance_mode)?;

        if let Some(filter) = &update.filter {
            validate_filter(filter)?;
            refs.collect_filter(filter)?;
        }

        for (desired, phase) in [
            (&update.escalation_operations, OperationPhase::Escalation),
            (&update.recovery_operations, OperationPhase::Recovery),
        ] {
            if let Some(operations) = desired {
                for operation in operations {
                    validate_operation(operation, phase, rule.event_source)?;
                    refs.collect_operation(operation);
                }
            }
        }

        let escalation = update
            .escalation_operations
            .as_ref()
            .map_or(rule.escalation_operations.len(), Vec::len);
        let recovery = update
            .recovery_operations
            .as_ref()
            .map_or(rule.recovery_operations.len(), Vec::len);
        if escalation == 0 && recovery == 0 {
            return Err(ActionError::Parameter(format!(
                "rule \"{}\" would be left with no operations",
                rule.name
            )));
        }
        Ok(())
    }

    /// Build a complete rule aggregate for insertion, allocating condition
    /// and operation ids.
    async fn build_rule(&self, draft: RuleDraft, id: RuleId) -> Result<ActionRule, ActionError> {
        let filter = match draft.filter {
            Some(filter_draft) => {
                let condition_ids = self
                    .store
                    .allocate_ids(IdKind::Condition, filter_draft.conditions.len())
                    .await?;
                let conditions = build_conditions(&filter_draft, &condition_ids);
                let formula = stored_formula(&filter_draft, &conditions)?;
                Filter {
                    eval_type: filter_draft.eval_type,
                    formula,
                    eval_formula: None,
                    conditions,
                }
            }
            None => Filter::match_all(),
        };

        let escalation_operations = self
            .build_operations(draft.escalation_operations, OperationPhase::Escalation)
            .await?;
        let recovery_operations = self
            .build_operations(draft.recovery_operations, OperationPhase::Recovery)
            .await?;

        Ok(ActionRule {
            id,
            name: draft.name,
            event_source: draft.event_source,
            enabled: draft.enabled,
            esc_period: draft.esc_period,
            maintenance_mode: draft.maintenance_mode,
            filter,
            escalation_operations,
            recovery_operations,
        })
    }

    async fn build_operations(
        &self,
        drafts: Vec<OperationDraft>,
        phase: OperationPhase,
    ) -> Result<Vec<Operation>, ActionError> {
        let ids = self
            .store
            .allocate_ids(IdKind::Operation, drafts.len())
            .await?;
        let mut operations = Vec::with_capacity(drafts.len());
        for (draft, id) in drafts.into_iter().zip(ids) {
            let conditions = self.build_operation_conditions(&draft).await?;
            operations.push(build_operation(draft, phase, OperationId::new(id), conditions));
        }
        Ok(operations)
    }

    async fn build_operation_conditions(
        &self,
        draft: &OperationDraft,
    ) -> Result<Vec<OperationCondition>, ActionError> {
        let ids = self
            .store
            .allocate_ids(IdKind::OperationCondition, draft.conditions.len())
            .await?;
        Ok(draft
            .conditions
            .iter()
            .zip(ids)
            .map(|(condition, id)| OperationCondition {
                id,
                kind: condition.kind,
                value: condition.value,
            })
            .collect())
    }

    /// Compute the change set entries for one update: a scalar patch plus
    /// condition and operation reconciliation.
    async fn reconcile_rule(
        &self,
        update: RuleUpdate,
        rule: &ActionRule,
        changes: &mut ChangeSet,
    ) -> Result<(), ActionError> {
        let mut patch = RulePatch::new(update.id);
        patch.name = update.name.filter(|name| *name != rule.name);
        patch.enabled = update.enabled.filter(|&enabled| enabled != rule.enabled);
        patch.esc_period = update
            .esc_period
            .filter(|&period| period != rule.esc_period);
        patch.maintenance_mode = update
            .maintenance_mode
            .filter(|&mode| Some(mode) != rule.maintenance_mode);

        if let Some(filter) = update.filter {
            self.reconcile_conditions(rule, &filter, &mut patch, changes)
                .await?;
        }
        if let Some(desired) = update.escalation_operations {
            self.reconcile_operations(
                rule,
                &rule.escalation_operations,
                desired,
                OperationPhase::Escalation,
                changes,
            )
            .await?;
        }
        if let Some(desired) = update.recovery_operations {
            self.reconcile_operations(
                rule,
                &rule.recovery_operations,
                desired,
                OperationPhase::Recovery,
                changes,
            )
            .await?;
        }

        if !patch.is_noop() {
            changes.rule_patches.push(patch);
        }
        Ok(())
    }

    /// Conditions carry no client-visible identity: the list is replaced
    /// positionally, keeping the persisted id at each position and
    /// allocating fresh ids for the tail.
    async fn reconcile_conditions(
        &self,
        rule: &ActionRule,
        filter: &FilterDraft,
        patch: &mut RulePatch,
        changes: &mut ChangeSet,
    ) -> Result<(), ActionError> {
        let current = &rule.filter.conditions;
        let fresh = filter.conditions.len().saturating_sub(current.len());
        let fresh_ids = self.store.allocate_ids(IdKind::Condition, fresh).await?;

        let ids: Vec<u64> = current
            .iter()
            .map(|condition| condition.id.value())
            .chain(fresh_ids)
            .take(filter.conditions.len())
            .collect();
        let conditions = build_conditions(filter, &ids);
        let formula = stored_formula(filter, &conditions)?;

        if filter.eval_type != rule.filter.eval_type {
            patch.eval_type = Some(filter.eval_type);
        }
        if formula != rule.filter.formula {
            patch.formula = Some(formula);
        }
        if conditions != *current {
            debug!(rule = %rule.id, count = conditions.len(), "conditions replaced");
            changes.condition_replacements.push(ConditionReplacement {
                rule_id: rule.id,
                conditions,
            });
        }
        Ok(())
    }

    /// Operations reconcile by identity: drafts without an id insert,
    /// drafts with an unknown id are an integrity error, unmentioned
    /// current rows delete.
    async fn reconcile_operations(
        &self,
        rule: &ActionRule,
        current: &[Operation],
        desired: Vec<OperationDraft>,
        phase: OperationPhase,
        changes: &mut ChangeSet,
    ) -> Result<(), ActionError> {
        let rule_id = rule.id;
        let steps = diff_identity(
            current,
            &desired,
            |operation| operation.id,
            |draft| draft.id,
            |id| format!("operation {id} does not belong to rule {rule_id}"),
        )?;

        for step in steps {
            match step {
                IdentityChange::Insert(draft) => {
                    let ids = self.store.allocate_ids(IdKind::Operation, 1).await?;
                    let id = OperationId::new(ids.first().copied().ok_or_else(|| {
                        ActionError::Integrity("store allocated no operation id".into())
                    })?);
                    let conditions = self.build_operation_conditions(draft).await?;
                    changes.operation_inserts.push(OperationInsert {
                        rule_id,
                        operation: build_operation(draft.clone(), phase, id, conditions),
                    });
                }
                IdentityChange::Delete(operation) => {
                    changes.operation_deletes.push(operation.id);
                }
                IdentityChange::Update {
                    current: operation,
                    desired: draft,
                } => {
                    self.reconcile_matched_operation(operation, draft, phase, changes)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Field-diff an identity-matched operation. A payload-shape change
    /// schedules the purge of the old shape's rows independently of
    /// whether the operation row itself changed.
    async fn reconcile_matched_operation(
        &self,
        current: &Operation,
        draft: &OperationDraft,
        phase: OperationPhase,
        changes: &mut ChangeSet,
    ) -> Result<(), ActionError> {
        if phase == OperationPhase::Escalation {
            let from = draft.esc_step_from.unwrap_or(current.esc_step_from);
            let to = draft.esc_step_to.unwrap_or(current.esc_step_to);
            if to != 0 && from > to {
                return Err(ActionError::Parameter(format!(
                    "escalation step range {from}..{to} is inverted"
                )));
            }
        }

        let mut patch = OperationPatch::new(current.id);
        if draft.operation_type != current.operation_type {
            patch.operation_type = Some(draft.operation_type);
        }
        patch.esc_period = draft
            .esc_period
            .filter(|&period| period != current.esc_period);
        patch.esc_step_from = draft
            .esc_step_from
            .filter(|&from| from != current.esc_step_from);
        patch.esc_step_to = draft.esc_step_to.filter(|&to| to != current.esc_step_to);
        if !patch.is_noop() {
            changes.operation_patches.push(patch);
        }

        let old_shape = current.operation_type.payload_shape();
        let new_shape = draft.operation_type.payload_shape();
        if old_shape == new_shape {
            diff_payload(current, &draft.payload, changes);
        } else {
            debug!(operation = %current.id, ?old_shape, ?new_shape, "payload shape changed");
            changes.payload_changes.push(PayloadChange::Purge {
                operation_id: current.id,
                shape: old_shape,
            });
            changes.payload_changes.push(PayloadChange::Put {
                operation_id: current.id,
                payload: draft.payload.clone(),
            });
        }

        self.reconcile_operation_conditions(current, draft, changes)
            .await?;
        Ok(())
    }

    /// Operation conditions reconcile by membership on (kind, value).
    async fn reconcile_operation_conditions(
        &self,
        current: &Operation,
        draft: &OperationDraft,
        changes: &mut ChangeSet,
    ) -> Result<(), ActionError> {
        let current_keys: Vec<(actum_core::OperationConditionKind, bool)> = current
            .conditions
            .iter()
            .map(|condition| (condition.kind, condition.value))
            .collect();
        let desired_keys: Vec<(actum_core::OperationConditionKind, bool)> = draft
            .conditions
            .iter()
            .map(|condition| (condition.kind, condition.value))
            .collect();
        let delta = diff_membership(&current_keys, &desired_keys, |key| *key);
        if delta.is_empty() {
            return Ok(());
        }

        let ids = self
            .store
            .allocate_ids(IdKind::OperationCondition, delta.insert.len())
            .await?;
        let insert: Vec<OperationCondition> = delta
            .insert
            .into_iter()
            .zip(ids)
            .map(|((kind, value), id)| OperationCondition { id, kind, value })
            .collect();
        let delete: Vec<u64> = current
            .conditions
            .iter()
            .filter(|condition| delta.delete.contains(&(condition.kind, condition.value)))
            .map(|condition| condition.id)
            .collect();

        changes
            .payload_changes
            .push(PayloadChange::OperationConditions {
                operation_id: current.id,
                insert,
                delete,
            });
        Ok(())
    }
}

/// Build persisted conditions from drafts and preassigned ids, in the
/// submitted order.
fn build_conditions(filter: &FilterDraft, ids: &[u64]) -> Vec<Condition> {
    filter
        .conditions
        .iter()
        .zip(ids)
        .map(|(draft, &id)| Condition {
            id: ConditionId::new(id),
            condition_type: draft.condition_type,
            operator: draft.operator,
            value: draft.value.clone(),
            value2: draft.value2.clone(),
            formula_id: None,
        })
        .collect()
}

/// The formula persisted with a filter: empty for derived eval types, the
/// letter expression with letters substituted by condition ids for custom
/// expressions.
fn stored_formula(filter: &FilterDraft, conditions: &[Condition]) -> Result<String, ActionError> {
    if filter.eval_type != EvalType::CustomExpression {
        return Ok(String::new());
    }
    let formula = filter
        .formula
        .as_deref()
        .ok_or_else(|| ActionError::Parameter("missing custom expression formula".into()))?;

    // Letter presence and uniqueness were checked by filter validation.
    let letter_to_id: HashMap<String, u64> = filter
        .conditions
        .iter()
        .zip(conditions)
        .filter_map(|(draft, condition)| {
            draft
                .formula_id
                .clone()
                .map(|letter| (letter, condition.id.value()))
        })
        .collect();
    Ok(translate_letters_to_ids(formula, &letter_to_id)?)
}

fn build_operation(
    draft: OperationDraft,
    phase: OperationPhase,
    id: OperationId,
    conditions: Vec<OperationCondition>,
) -> Operation {
    let (esc_period, esc_step_from, esc_step_to) = match phase {
        OperationPhase::Escalation => {
            let from = draft.esc_step_from.unwrap_or(1);
            (
                draft.esc_period.unwrap_or(0),
                from,
                draft.esc_step_to.unwrap_or(from),
            )
        }
        OperationPhase::Recovery => (0, 0, 0),
    };
    Operation {
        id,
        phase,
        operation_type: draft.operation_type,
        esc_period,
        esc_step_from,
        esc_step_to,
        conditions,
        payload: draft.payload,
    }
}

/// Same-shape payload diff: scalar rows patch in place, membership rows
/// get insert/delete deltas, untouched rows keep their identity.
fn diff_payload(current: &Operation, desired: &OperationPayload, changes: &mut ChangeSet) {
    let operation_id = current.id;
    match (&current.payload, desired) {
        (OperationPayload::Message(before), OperationPayload::Message(after)) => {
            if before.media_type != after.media_type
                || before.use_default_message != after.use_default_message
                || before.subject != after.subject
                || before.body != after.body
            {
                changes.payload_changes.push(PayloadChange::MessageBody {
                    operation_id,
                    media_type: after.media_type,
                    use_default_message: after.use_default_message,
                    subject: after.subject.clone(),
                    body: after.body.clone(),
                });
            }
            let users = diff_membership(&before.users, &after.users, |&id| id);
            if !users.is_empty() {
                changes.payload_changes.push(PayloadChange::MessageUsers {
                    operation_id,
                    delta: users,
                });
            }
            let groups = diff_membership(&before.user_groups, &after.user_groups, |&id| id);
            if !groups.is_empty() {
                changes.payload_changes.push(PayloadChange::MessageGroups {
                    operation_id,
                    delta: groups,
                });
            }
        }
        (OperationPayload::Command(before), OperationPayload::Command(after)) => {
            if before.kind != after.kind
                || before.command != after.command
                || before.execute_on != after.execute_on
                || before.auth != after.auth
                || before.username != after.username
                || before.password != after.password
                || before.port != after.port
                || before.script_id != after.script_id
            {
                changes.payload_changes.push(PayloadChange::CommandSpec {
                    operation_id,
                    spec: after.clone(),
                });
            }
            let hosts = diff_membership(&before.host_targets, &after.host_targets, |&t| t);
            if !hosts.is_empty() {
                changes.payload_changes.push(PayloadChange::CommandHosts {
                    operation_id,
                    delta: hosts,
                });
            }
            let groups = diff_membership(&before.group_targets, &after.group_targets, |&id| id);
            if !groups.is_empty() {
                changes.payload_changes.push(PayloadChange::CommandGroups {
                    operation_id,
                    delta: groups,
                });
            }
        }
        (OperationPayload::Groups(before), OperationPayload::Groups(after)) => {
            let delta = diff_membership(&before.targets, &after.targets, |&id| id);
            if !delta.is_empty() {
                changes.payload_changes.push(PayloadChange::GroupTargets {
                    operation_id,
                    delta,
                });
            }
        }
        (OperationPayload::Templates(before), OperationPayload::Templates(after)) => {
            let delta = diff_membership(&before.targets, &after.targets, |&id| id);
            if !delta.is_empty() {
                changes.payload_changes.push(PayloadChange::TemplateTargets {
                    operation_id,
                    delta,
                });
            }
        }
        (OperationPayload::Inventory(before), OperationPayload::Inventory(after)) => {
            if before.mode != after.mode {
                changes.payload_changes.push(PayloadChange::Inventory {
                    operation_id,
                    mode: after.mode,
                });
            }
        }
        (OperationPayload::None, OperationPayload::None) => {}
        // Shapes were matched by the caller; a stored payload that does
        // not line up with its own operation type is rewritten wholesale.
        _ => {
            changes.payload_changes.push(PayloadChange::Put {
                operation_id,
                payload: desired.clone(),
            });
        }
    }
}
