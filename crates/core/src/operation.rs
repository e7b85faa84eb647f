use serde::{Deserialize, Serialize};

use crate::types::{EntityId, OperationId};

/// Phase in which an operation runs: before or after the triggering
/// condition resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationPhase {
    Escalation,
    Recovery,
}

/// Kind of step an operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Notify explicit users and/or user groups.
    Message,
    /// Run a remote command or global script.
    Command,
    /// Add the event's host to host groups.
    GroupAdd,
    /// Remove the event's host from host groups.
    GroupRemove,
    /// Link templates to the event's host.
    TemplateAdd,
    /// Unlink templates from the event's host.
    TemplateRemove,
    HostAdd,
    HostRemove,
    HostEnable,
    HostDisable,
    /// Set the host inventory population mode.
    SetInventoryMode,
    /// Notify everyone who received the original escalation messages.
    RecoveryMessage,
}

impl OperationType {
    /// Which payload shape this operation type carries.
    #[must_use]
    pub fn payload_shape(self) -> PayloadShape {
        match self {
            Self::Message | Self::RecoveryMessage => PayloadShape::Message,
            Self::Command => PayloadShape::Command,
            Self::GroupAdd | Self::GroupRemove => PayloadShape::Groups,
            Self::TemplateAdd | Self::TemplateRemove => PayloadShape::Templates,
            Self::SetInventoryMode => PayloadShape::Inventory,
            Self::HostAdd | Self::HostRemove | Self::HostEnable | Self::HostDisable => {
                PayloadShape::None
            }
        }
    }
}

/// Payload shape discriminator; two operation types that share a shape
/// (e.g. group add/remove) keep their payload rows across a type change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadShape {
    Message,
    Command,
    Groups,
    Templates,
    Inventory,
    None,
}

/// Message payload: recipients plus message body settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(default)]
    pub users: Vec<EntityId>,
    #[serde(default)]
    pub user_groups: Vec<EntityId>,
    /// Send through a specific media type; `None` means all media.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<EntityId>,
    /// Use the rule-level default subject and body instead of the ones
    /// below.
    #[serde(default)]
    pub use_default_message: bool,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

/// Script/command type for a command payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    CustomScript,
    Ipmi,
    Ssh,
    Telnet,
    GlobalScript,
}

/// Where a custom script runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteOn {
    Agent,
    Server,
}

/// SSH authentication method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "method")]
pub enum SshAuth {
    Password,
    PublicKey {
        public_key: String,
        private_key: String,
    },
}

/// One execution target of a command operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandTarget {
    /// The host the event originated on.
    CurrentHost,
    Host(EntityId),
}

/// Command payload: script specification plus execution targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPayload {
    pub kind: CommandKind,
    /// Command text; required for every kind except
    /// [`CommandKind::GlobalScript`].
    #[serde(default)]
    pub command: String,
    /// Required for [`CommandKind::CustomScript`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute_on: Option<ExecuteOn>,
    /// Required for [`CommandKind::Ssh`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<SshAuth>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Numeric port 1-65535 or a `{$MACRO}` user macro token; empty means
    /// the protocol default.
    #[serde(default)]
    pub port: String,
    /// Required for [`CommandKind::GlobalScript`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_id: Option<EntityId>,
    #[serde(default)]
    pub host_targets: Vec<CommandTarget>,
    #[serde(default)]
    pub group_targets: Vec<EntityId>,
}

impl CommandPayload {
    /// A minimal payload of the given kind with no targets.
    #[must_use]
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            command: String::new(),
            execute_on: None,
            auth: None,
            username: String::new(),
            password: String::new(),
            port: String::new(),
            script_id: None,
            host_targets: Vec::new(),
            group_targets: Vec::new(),
        }
    }
}

/// Host group or template target payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPayload {
    pub targets: Vec<EntityId>,
}

/// Host inventory population mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryMode {
    Manual,
    Automatic,
}

/// Inventory-mode payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryPayload {
    pub mode: InventoryMode,
}

/// Exactly one typed payload, selected by the operation type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "payload")]
pub enum OperationPayload {
    Message(MessagePayload),
    Command(CommandPayload),
    Groups(TargetPayload),
    Templates(TargetPayload),
    Inventory(InventoryPayload),
    None,
}

impl OperationPayload {
    /// The shape of this payload.
    #[must_use]
    pub fn shape(&self) -> PayloadShape {
        match self {
            Self::Message(_) => PayloadShape::Message,
            Self::Command(_) => PayloadShape::Command,
            Self::Groups(_) => PayloadShape::Groups,
            Self::Templates(_) => PayloadShape::Templates,
            Self::Inventory(_) => PayloadShape::Inventory,
            Self::None => PayloadShape::None,
        }
    }
}

/// Condition gating a single operation. Only the event-acknowledged check
/// is currently supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationConditionKind {
    EventAcknowledged,
}

/// A persisted operation condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCondition {
    pub id: u64,
    pub kind: OperationConditionKind,
    /// For the acknowledged check: whether the event must be acknowledged.
    pub value: bool,
}

/// A submitted operation condition, prior to id assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationConditionDraft {
    pub kind: OperationConditionKind,
    pub value: bool,
}

/// A persisted operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub phase: OperationPhase,
    pub operation_type: OperationType,
    /// Step duration override in seconds; 0 inherits the rule default.
    /// Escalation phase only.
    #[serde(default)]
    pub esc_period: u32,
    /// First escalation step this operation runs at (>= 1).
    /// Escalation phase only.
    #[serde(default)]
    pub esc_step_from: u32,
    /// Last escalation step; 0 means unbounded. Escalation phase only.
    #[serde(default)]
    pub esc_step_to: u32,
    #[serde(default)]
    pub conditions: Vec<OperationCondition>,
    pub payload: OperationPayload,
}

/// A submitted operation. An absent id means "insert"; a present id must
/// belong to the rule being updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<OperationId>,
    pub operation_type: OperationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub esc_period: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub esc_step_from: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub esc_step_to: Option<u32>,
    #[serde(default)]
    pub conditions: Vec<OperationConditionDraft>,
    pub payload: OperationPayload,
}

impl OperationDraft {
    /// Create a draft of the given type with the given payload and no
    /// step bounds.
    #[must_use]
    pub fn new(operation_type: OperationType, payload: OperationPayload) -> Self {
        Self {
            id: None,
            operation_type,
            esc_period: None,
            esc_step_from: None,
            esc_step_to: None,
            conditions: Vec::new(),
            payload,
        }
    }

    /// Set the escalation step range.
    #[must_use]
    pub fn with_steps(mut self, from: u32, to: u32) -> Self {
        self.esc_step_from = Some(from);
        self.esc_step_to = Some(to);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_shape_matches_type() {
        assert_eq!(
            OperationType::GroupRemove.payload_shape(),
            PayloadShape::Groups
        );
        assert_eq!(
            OperationType::RecoveryMessage.payload_shape(),
            PayloadShape::Message
        );
        assert_eq!(OperationType::HostEnable.payload_shape(), PayloadShape::None);
        let payload = OperationPayload::Groups(TargetPayload {
            targets: vec![EntityId::new(4)],
        });
        assert_eq!(payload.shape(), PayloadShape::Groups);
    }

    #[test]
    fn command_target_orders_current_host_first() {
        let mut targets = vec![CommandTarget::Host(EntityId::new(9)), CommandTarget::CurrentHost];
        targets.sort();
        assert_eq!(targets[0], CommandTarget::CurrentHost);
    }

    #[test]
    fn operation_serde_roundtrip() {
        let op = OperationDraft::new(
            OperationType::Message,
            OperationPayload::Message(MessagePayload {
                user_groups: vec![EntityId::new(7)],
                ..MessagePayload::default()
            }),
        )
        .with_steps(1, 0);
        let json = serde_json::to_string(&op).unwrap();
        let back: OperationDraft = serde_json::from_str(&json).unwrap();
        assert_eq!(back, op);
    }
}
