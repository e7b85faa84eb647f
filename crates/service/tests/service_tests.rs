use std::sync::Arc;

use actum_core::{
    CommandKind, CommandPayload, CommandTarget, ConditionDraft, ConditionOperator, ConditionType,
    EntityId, EntityKind, EvalType, EventSource, FilterDraft, MessagePayload, OperationDraft,
    OperationPayload, OperationType, RuleDraft, RuleUpdate,
};
use actum_service::{ActionError, ActionService};
use actum_state::RuleQuery;
use actum_state_memory::{MemoryAccessControl, MemoryRuleStore};

// -- Helpers --------------------------------------------------------------

fn service_allowing_all() -> (ActionService, Arc<MemoryRuleStore>) {
    let store = Arc::new(MemoryRuleStore::new());
    let access = Arc::new(MemoryAccessControl::allow_all());
    (ActionService::new(store.clone(), access), store)
}

fn message_to_user(user: u64) -> OperationDraft {
    OperationDraft::new(
        OperationType::Message,
        OperationPayload::Message(MessagePayload {
            users: vec![EntityId::new(user)],
            ..MessagePayload::default()
        }),
    )
}

fn condition(
    condition_type: ConditionType,
    operator: ConditionOperator,
    value: &str,
) -> ConditionDraft {
    ConditionDraft {
        condition_type,
        operator,
        value: value.to_owned(),
        value2: String::new(),
        formula_id: None,
    }
}

fn ipmi_reboot() -> OperationDraft {
    OperationDraft::new(
        OperationType::Command,
        OperationPayload::Command(CommandPayload {
            command: "reboot".into(),
            host_targets: vec![CommandTarget::CurrentHost],
            ..CommandPayload::new(CommandKind::Ipmi)
        }),
    )
}

// -- Create ---------------------------------------------------------------

#[tokio::test]
async fn and_or_filter_groups_same_type_conditions() {
    let (service, _) = service_allowing_all();
    let draft = RuleDraft::new("disk full", EventSource::Triggers)
        .with_filter(FilterDraft {
            eval_type: EvalType::AndOr,
            formula: None,
            conditions: vec![
                condition(ConditionType::HostGroup, ConditionOperator::Equal, "5"),
                condition(ConditionType::HostGroup, ConditionOperator::Equal, "7"),
                condition(ConditionType::Severity, ConditionOperator::GreaterEqual, "3"),
            ],
        })
        .with_escalation_operation(message_to_user(1));

    let ids = service.create(vec![draft]).await.unwrap();
    let rules = service.get(RuleQuery::by_ids(ids)).await.unwrap();
    let filter = &rules[0].filter;

    // The two host-group conditions are OR-ed inside one group, AND-ed
    // with the severity condition. Letters follow appearance order, and
    // the severity group sorts first.
    assert_eq!(filter.eval_formula.as_deref(), Some("A and (B or C)"));
    let severity = filter
        .conditions
        .iter()
        .find(|c| c.condition_type == ConditionType::Severity)
        .unwrap();
    assert_eq!(severity.formula_id.as_deref(), Some("A"));
    let mut group_letters: Vec<&str> = filter
        .conditions
        .iter()
        .filter(|c| c.condition_type == ConditionType::HostGroup)
        .filter_map(|c| c.formula_id.as_deref())
        .collect();
    group_letters.sort_unstable();
    assert_eq!(group_letters, vec!["B", "C"]);
}

#[tokio::test]
async fn custom_expression_round_trips_through_storage() {
    let (service, _) = service_allowing_all();
    let draft = RuleDraft::new("tagged", EventSource::Triggers)
        .with_filter(FilterDraft {
            eval_type: EvalType::CustomExpression,
            formula: Some("A or B".into()),
            conditions: vec![
                ConditionDraft {
                    formula_id: Some("A".into()),
                    ..condition(ConditionType::TriggerName, ConditionOperator::Like, "cpu")
                },
                ConditionDraft {
                    formula_id: Some("B".into()),
                    ..condition(ConditionType::Severity, ConditionOperator::GreaterEqual, "4")
                },
            ],
        })
        .with_escalation_operation(message_to_user(1));

    let ids = service.create(vec![draft]).await.unwrap();
    let rules = service.get(RuleQuery::by_ids(ids)).await.unwrap();
    let filter = &rules[0].filter;
    assert_eq!(filter.formula, "A or B");
    assert_eq!(filter.eval_formula.as_deref(), Some("A or B"));
}

#[tokio::test]
async fn message_without_recipients_is_rejected() {
    let (service, _) = service_allowing_all();
    let draft = RuleDraft::new("silent", EventSource::Triggers).with_escalation_operation(
        OperationDraft::new(
            OperationType::Message,
            OperationPayload::Message(MessagePayload::default()),
        ),
    );
    let err = service.create(vec![draft]).await.unwrap_err();
    assert!(matches!(err, ActionError::Parameter(_)), "{err}");
}

#[tokio::test]
async fn recovery_message_is_illegal_in_escalation_phase() {
    let (service, _) = service_allowing_all();
    let draft = RuleDraft::new("discovery", EventSource::Discovery).with_escalation_operation(
        OperationDraft::new(
            OperationType::RecoveryMessage,
            OperationPayload::Message(MessagePayload::default()),
        ),
    );
    let err = service.create(vec![draft]).await.unwrap_err();
    assert!(matches!(err, ActionError::Parameter(_)), "{err}");
}

#[tokio::test]
async fn recovery_operation_with_step_fields_is_rejected() {
    let (service, _) = service_allowing_all();
    let draft = RuleDraft::new("steps", EventSource::Triggers)
        .with_recovery_operation(message_to_user(1).with_steps(1, 2));
    let err = service.create(vec![draft]).await.unwrap_err();
    assert!(matches!(err, ActionError::Parameter(_)), "{err}");
}

#[tokio::test]
async fn duplicate_names_are_rejected() {
    let (service, _) = service_allowing_all();
    let draft = RuleDraft::new("disk full", EventSource::Triggers)
        .with_escalation_operation(message_to_user(1));
    service.create(vec![draft.clone()]).await.unwrap();

    let err = service.create(vec![draft]).await.unwrap_err();
    assert!(matches!(err, ActionError::Parameter(_)), "{err}");
}

#[tokio::test]
async fn unwritable_references_fail_as_permission_errors() {
    let store = Arc::new(MemoryRuleStore::new());
    let access = Arc::new(MemoryAccessControl::new());
    access.grant(EntityKind::User, [EntityId::new(1)]);
    let service = ActionService::new(store, access);

    // User 1 is granted, user group 9 is not.
    let draft = RuleDraft::new("forbidden", EventSource::Triggers).with_escalation_operation(
        OperationDraft::new(
            OperationType::Message,
            OperationPayload::Message(MessagePayload {
                users: vec![EntityId::new(1)],
                user_groups: vec![EntityId::new(9)],
                ..MessagePayload::default()
            }),
        ),
    );
    let err = service.create(vec![draft]).await.unwrap_err();
    assert!(matches!(err, ActionError::Permission(_)), "{err}");
}

// -- Update ---------------------------------------------------------------

#[tokio::test]
async fn type_change_replaces_old_payload_rows() {
    let (service, _) = service_allowing_all();
    let ids = service
        .create(vec![RuleDraft::new("reboot", EventSource::Triggers)
            .with_escalation_operation(ipmi_reboot())])
        .await
        .unwrap();

    let rules = service.get(RuleQuery::by_ids(ids.clone())).await.unwrap();
    let operation_id = rules[0].escalation_operations[0].id;

    let mut update = RuleUpdate::new(ids[0]);
    update.escalation_operations = Some(vec![OperationDraft {
        id: Some(operation_id),
        ..message_to_user(4)
    }]);
    service.update(vec![update]).await.unwrap();

    let rules = service.get(RuleQuery::by_ids(ids)).await.unwrap();
    let operation = &rules[0].escalation_operations[0];
    assert_eq!(operation.id, operation_id);
    assert_eq!(operation.operation_type, OperationType::Message);
    match &operation.payload {
        OperationPayload::Message(message) => {
            assert_eq!(message.users, vec![EntityId::new(4)]);
        }
        other => panic!("expected message payload, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_operation_id_is_an_integrity_error() {
    let (service, _) = service_allowing_all();
    let ids = service
        .create(vec![RuleDraft::new("known", EventSource::Triggers)
            .with_escalation_operation(message_to_user(1))])
        .await
        .unwrap();

    let mut update = RuleUpdate::new(ids[0]);
    update.escalation_operations = Some(vec![OperationDraft {
        id: Some(actum_core::OperationId::new(9999)),
        ..message_to_user(1)
    }]);
    let err = service.update(vec![update]).await.unwrap_err();
    assert!(matches!(err, ActionError::Integrity(_)), "{err}");
}

#[tokio::test]
async fn updating_an_unknown_rule_is_a_permission_error() {
    let (service, _) = service_allowing_all();
    let mut update = RuleUpdate::new(actum_core::RuleId::new(42));
    update.enabled = Some(false);
    let err = service.update(vec![update]).await.unwrap_err();
    assert!(matches!(err, ActionError::Permission(_)), "{err}");
}

#[tokio::test]
async fn conditions_keep_their_ids_across_positional_updates() {
    let (service, _) = service_allowing_all();
    let ids = service
        .create(vec![RuleDraft::new("grows", EventSource::Triggers)
            .with_filter(FilterDraft {
                eval_type: EvalType::Or,
                formula: None,
                conditions: vec![
                    condition(ConditionType::HostGroup, ConditionOperator::Equal, "5"),
                    condition(ConditionType::Severity, ConditionOperator::GreaterEqual, "2"),
                ],
            })
            .with_escalation_operation(message_to_user(1))])
        .await
        .unwrap();

    let before = service.get(RuleQuery::by_ids(ids.clone())).await.unwrap();
    let before_ids: Vec<_> = before[0].filter.conditions.iter().map(|c| c.id).collect();

    let mut update = RuleUpdate::new(ids[0]);
    update.filter = Some(FilterDraft {
        eval_type: EvalType::Or,
        formula: None,
        conditions: vec![
            condition(ConditionType::HostGroup, ConditionOperator::Equal, "5"),
            condition(ConditionType::Severity, ConditionOperator::GreaterEqual, "4"),
            condition(ConditionType::TriggerName, ConditionOperator::Like, "cpu"),
        ],
    });
    service.update(vec![update]).await.unwrap();

    let after = service.get(RuleQuery::by_ids(ids)).await.unwrap();
    let after_ids: Vec<_> = after[0].filter.conditions.iter().map(|c| c.id).collect();
    assert_eq!(after_ids.len(), 3);
    assert_eq!(&after_ids[..2], &before_ids[..]);
    assert_eq!(after[0].filter.conditions[1].value, "4");
}

#[tokio::test]
async fn update_cannot_remove_every_operation() {
    let (service, _) = service_allowing_all();
    let ids = service
        .create(vec![RuleDraft::new("keeps one", EventSource::Triggers)
            .with_escalation_operation(message_to_user(1))])
        .await
        .unwrap();

    let mut update = RuleUpdate::new(ids[0]);
    update.escalation_operations = Some(Vec::new());
    let err = service.update(vec![update]).await.unwrap_err();
    assert!(matches!(err, ActionError::Parameter(_)), "{err}");
}

#[tokio::test]
async fn scalar_updates_leave_operations_untouched() {
    let (service, _) = service_allowing_all();
    let ids = service
        .create(vec![RuleDraft::new("rename me", EventSource::Triggers)
            .with_escalation_operation(message_to_user(1))])
        .await
        .unwrap();

    let mut update = RuleUpdate::new(ids[0]);
    update.name = Some("renamed".into());
    update.enabled = Some(false);
    service.update(vec![update]).await.unwrap();

    let rules = service.get(RuleQuery::by_ids(ids)).await.unwrap();
    assert_eq!(rules[0].name, "renamed");
    assert!(!rules[0].enabled);
    assert_eq!(rules[0].escalation_operations.len(), 1);
}

// -- Delete ---------------------------------------------------------------

#[tokio::test]
async fn delete_cascades_children_and_alert_log() {
    let (service, store) = service_allowing_all();
    let ids = service
        .create(vec![RuleDraft::new("short lived", EventSource::Triggers)
            .with_filter(FilterDraft {
                eval_type: EvalType::Or,
                formula: None,
                conditions: vec![condition(
                    ConditionType::HostGroup,
                    ConditionOperator::Equal,
                    "5",
                )],
            })
            .with_escalation_operation(message_to_user(1))])
        .await
        .unwrap();
    store.record_alert(ids[0], "fired").await;

    service.delete(ids.clone()).await.unwrap();

    assert!(service
        .get(RuleQuery::by_ids(ids.clone()))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(store.alert_count(ids[0]).await, 0);
}

#[tokio::test]
async fn deleting_an_unknown_rule_is_a_permission_error() {
    let (service, _) = service_allowing_all();
    let err = service
        .delete(vec![actum_core::RuleId::new(7)])
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::Permission(_)), "{err}");
}
