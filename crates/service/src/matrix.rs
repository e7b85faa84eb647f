//! Legality matrix for operation types.
//!
//! Which operation types a rule may carry depends on the operation's
//! phase and the rule's event source. The matrix is an explicit lookup
//! rather than branching logic so it can be tested on its own.

use actum_core::{EventSource, OperationPhase, OperationType};

use OperationType::{
    Command, GroupAdd, GroupRemove, HostAdd, HostDisable, HostEnable, HostRemove, Message,
    RecoveryMessage, SetInventoryMode, TemplateAdd, TemplateRemove,
};

const ESCALATION_TRIGGERS: &[OperationType] = &[Message, Command];

const ESCALATION_DISCOVERY: &[OperationType] = &[
    Message,
    Command,
    GroupAdd,
    GroupRemove,
    TemplateAdd,
    TemplateRemove,
    HostAdd,
    HostRemove,
    HostEnable,
    HostDisable,
    SetInventoryMode,
];

const ESCALATION_AUTO_REGISTRATION: &[OperationType] = &[
    Message,
    Command,
    GroupAdd,
    TemplateAdd,
    HostAdd,
    HostDisable,
    SetInventoryMode,
];

const ESCALATION_INTERNAL: &[OperationType] = &[Message];

const RECOVERY_TRIGGERS: &[OperationType] = &[Message, Command, RecoveryMessage];

const RECOVERY_INTERNAL: &[OperationType] = &[Message, RecoveryMessage];

/// The operation types legal for a phase and event source. An empty slice
/// means the phase itself is illegal for that source.
#[must_use]
pub fn legal_operation_types(
    phase: OperationPhase,
    event_source: EventSource,
) -> &'static [OperationType] {
    match (phase, event_source) {
        (OperationPhase::Escalation, EventSource::Triggers) => ESCALATION_TRIGGERS,
        (OperationPhase::Escalation, EventSource::Discovery) => ESCALATION_DISCOVERY,
        (OperationPhase::Escalation, EventSource::AutoRegistration) => {
            ESCALATION_AUTO_REGISTRATION
        }
        (OperationPhase::Escalation, EventSource::Internal) => ESCALATION_INTERNAL,
        (OperationPhase::Recovery, EventSource::Triggers) => RECOVERY_TRIGGERS,
        (OperationPhase::Recovery, EventSource::Internal) => RECOVERY_INTERNAL,
        (OperationPhase::Recovery, EventSource::Discovery | EventSource::AutoRegistration) => &[],
    }
}

/// Whether an operation type is legal for a phase and event source.
#[must_use]
pub fn is_legal(
    operation_type: OperationType,
    phase: OperationPhase,
    event_source: EventSource,
) -> bool {
    legal_operation_types(phase, event_source).contains(&operation_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovery_message_is_recovery_only() {
        for source in [
            EventSource::Triggers,
            EventSource::Discovery,
            EventSource::AutoRegistration,
            EventSource::Internal,
        ] {
            assert!(!is_legal(
                RecoveryMessage,
                OperationPhase::Escalation,
                source
            ));
        }
        assert!(is_legal(
            RecoveryMessage,
            OperationPhase::Recovery,
            EventSource::Triggers
        ));
        assert!(is_legal(
            RecoveryMessage,
            OperationPhase::Recovery,
            EventSource::Internal
        ));
    }

    #[test]
    fn recovery_phase_is_illegal_for_discovery_sources() {
        assert!(legal_operation_types(OperationPhase::Recovery, EventSource::Discovery).is_empty());
        assert!(
            legal_operation_types(OperationPhase::Recovery, EventSource::AutoRegistration)
                .is_empty()
        );
    }

    #[test]
    fn host_lifecycle_is_discovery_territory() {
        assert!(is_legal(
            HostRemove,
            OperationPhase::Escalation,
            EventSource::Discovery
        ));
        assert!(!is_legal(
            HostRemove,
            OperationPhase::Escalation,
            EventSource::AutoRegistration
        ));
        assert!(!is_legal(
            GroupRemove,
            OperationPhase::Escalation,
            EventSource::AutoRegistration
        ));
        assert!(!is_legal(
            HostAdd,
            OperationPhase::Escalation,
            EventSource::Triggers
        ));
    }

    #[test]
    fn internal_escalation_only_messages() {
        assert_eq!(
            legal_operation_types(OperationPhase::Escalation, EventSource::Internal),
            &[Message]
        );
    }
}
