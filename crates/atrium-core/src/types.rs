// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat data model shared by the backend, worker, and orchestration crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::AtriumError;

/// Model identifiers a group agent may be configured with.
pub const MODEL_CATALOG: &[&str] = &[
    "gpt-4o-mini",
    "gpt-4o",
    "gpt-4.1-mini",
    "gpt-4.1",
    "o3-mini",
];

/// Model used when a conversation has no settings row yet.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Agent name used when a conversation has no settings row yet.
pub const DEFAULT_AGENT_NAME: &str = "Assistant";

pub const DEFAULT_COOLDOWN_MINUTES: u32 = 10;
pub const COOLDOWN_MINUTES_MIN: u32 = 1;
pub const COOLDOWN_MINUTES_MAX: u32 = 1440;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Unique identifier for a conversation.
    ConversationId
);
string_id!(
    /// Globally unique identifier for a message.
    MessageId
);
string_id!(
    /// Unique identifier for a chat processing request.
    RequestId
);
string_id!(
    /// Identifier of an authenticated user.
    UserId
);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Backend,
    Worker,
}

/// Visibility scope of a conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConversationScope {
    /// Private to its owner.
    Personal,
    /// Shared, topic-scoped, joinable by any user.
    Department,
}

/// Author of a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
    System,
}

/// Lifecycle status of a [`ChatRequest`] as reported by the backend.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Queued,
    Processing,
    Done,
    Error,
}

impl RequestStatus {
    /// Position along the request journey. `done` and `error` share the last rank.
    pub fn rank(self) -> u8 {
        match self {
            RequestStatus::Queued => 1,
            RequestStatus::Processing => 2,
            RequestStatus::Done | RequestStatus::Error => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Done | RequestStatus::Error)
    }

    /// Whether a request in this status may move to `next` without a retry.
    ///
    /// Repeating the current status is allowed; terminal statuses never move.
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        if self == next {
            return true;
        }
        !self.is_terminal() && next.rank() >= self.rank()
    }
}

/// How eagerly the autonomous agent intervenes in a department conversation.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InterventionLevel {
    Low,
    #[default]
    Medium,
    High,
}

/// A conversation visible to the current user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub scope: ConversationScope,
    /// Topic tag; only meaningful for department conversations.
    pub department: Option<String>,
    pub owner: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn is_department(&self) -> bool {
        self.scope == ConversationScope::Department
    }

    /// Timestamp used for recency ordering.
    pub fn recency(&self) -> DateTime<Utc> {
        self.last_message_at.unwrap_or(self.updated_at)
    }
}

/// A department conversation together with the current user's membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentConversation {
    pub conversation: Conversation,
    pub is_member: bool,
}

/// Input for creating a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewConversation {
    pub title: String,
    pub scope: ConversationScope,
    pub department: Option<String>,
}

impl NewConversation {
    /// Trim the title and department tag and reject inputs the backend must never see.
    pub fn normalized(self) -> Result<Self, AtriumError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(AtriumError::Validation(
                "conversation title must not be empty".into(),
            ));
        }

        let department = self
            .department
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let department = match self.scope {
            ConversationScope::Department => Some(department.ok_or_else(|| {
                AtriumError::Validation(
                    "department conversations require a department tag".into(),
                )
            })?),
            ConversationScope::Personal => None,
        };

        Ok(Self {
            title,
            scope: self.scope,
            department,
        })
    }
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: Sender,
    /// Text content; may contain `**bold**` markup.
    pub content: String,
    /// Department/topic context the message was sent under.
    pub mode: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A processing request handed to the external worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub id: RequestId,
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    pub mode: String,
    pub latest_user_message_id: MessageId,
    pub status: RequestStatus,
    /// Present only when `status` is [`RequestStatus::Error`].
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Autonomous-agent configuration for one department conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupAgentSettings {
    /// Whether a settings row has ever been created for the conversation.
    pub exists: bool,
    pub agent_name: String,
    pub model: String,
    pub auto_mode: bool,
    pub intervention_level: InterventionLevel,
    pub cooldown_minutes: u32,
    pub last_intervention_at: Option<DateTime<Utc>>,
}

impl GroupAgentSettings {
    /// Settings reported for a conversation that has no row yet.
    pub fn defaults(agent_name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            exists: false,
            agent_name: agent_name.into(),
            model: model.into(),
            auto_mode: false,
            intervention_level: InterventionLevel::Medium,
            cooldown_minutes: DEFAULT_COOLDOWN_MINUTES,
            last_intervention_at: None,
        }
    }
}

impl Default for GroupAgentSettings {
    fn default() -> Self {
        Self::defaults(DEFAULT_AGENT_NAME, DEFAULT_MODEL)
    }
}

/// Backend reply to a settings fetch.
///
/// `error` carries an application-level failure reported alongside a
/// successful transport round-trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupSettingsResponse {
    pub settings: Option<GroupAgentSettings>,
    pub error: Option<String>,
}

/// Partial settings update. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSettingsPatch {
    pub agent_name: Option<String>,
    pub model: Option<String>,
    pub auto_mode: Option<bool>,
    pub intervention_level: Option<InterventionLevel>,
    pub cooldown_minutes: Option<u32>,
}

impl GroupSettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.agent_name.is_none()
            && self.model.is_none()
            && self.auto_mode.is_none()
            && self.intervention_level.is_none()
            && self.cooldown_minutes.is_none()
    }

    /// Check every present field against the values a client may submit.
    pub fn validate(&self) -> Result<(), AtriumError> {
        if let Some(name) = &self.agent_name
            && name.trim().is_empty()
        {
            return Err(AtriumError::Validation(
                "agent_name must not be empty".into(),
            ));
        }

        if let Some(model) = &self.model
            && !MODEL_CATALOG.contains(&model.as_str())
        {
            return Err(AtriumError::Validation(format!(
                "unknown model `{model}`, expected one of: {}",
                MODEL_CATALOG.join(", ")
            )));
        }

        if let Some(minutes) = self.cooldown_minutes
            && !(COOLDOWN_MINUTES_MIN..=COOLDOWN_MINUTES_MAX).contains(&minutes)
        {
            return Err(AtriumError::Validation(format!(
                "cooldown_minutes must be between {COOLDOWN_MINUTES_MIN} and {COOLDOWN_MINUTES_MAX}, got {minutes}"
            )));
        }

        Ok(())
    }

    /// Overlay the present fields onto `settings` and mark the row as existing.
    pub fn apply_to(&self, settings: &mut GroupAgentSettings) {
        if let Some(name) = &self.agent_name {
            settings.agent_name = name.trim().to_string();
        }
        if let Some(model) = &self.model {
            settings.model = model.clone();
        }
        if let Some(auto_mode) = self.auto_mode {
            settings.auto_mode = auto_mode;
        }
        if let Some(level) = self.intervention_level {
            settings.intervention_level = level;
        }
        if let Some(minutes) = self.cooldown_minutes {
            settings.cooldown_minutes = minutes;
        }
        settings.exists = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn request_status_never_leaves_terminal() {
        assert!(!RequestStatus::Done.can_transition_to(RequestStatus::Queued));
        assert!(!RequestStatus::Done.can_transition_to(RequestStatus::Processing));
        assert!(!RequestStatus::Error.can_transition_to(RequestStatus::Done));
        assert!(RequestStatus::Done.can_transition_to(RequestStatus::Done));
    }

    #[test]
    fn request_status_moves_forward_only() {
        assert!(RequestStatus::Queued.can_transition_to(RequestStatus::Processing));
        assert!(RequestStatus::Queued.can_transition_to(RequestStatus::Error));
        assert!(RequestStatus::Processing.can_transition_to(RequestStatus::Done));
        assert!(!RequestStatus::Processing.can_transition_to(RequestStatus::Queued));
    }

    #[test]
    fn enums_use_lowercase_wire_names() {
        assert_eq!(RequestStatus::Processing.to_string(), "processing");
        assert_eq!(
            InterventionLevel::from_str("high").unwrap(),
            InterventionLevel::High
        );
        assert_eq!(
            serde_json::to_string(&ConversationScope::Department).unwrap(),
            "\"department\""
        );
        assert_eq!(Sender::from_str("assistant").unwrap(), Sender::Assistant);
    }

    #[test]
    fn new_conversation_rejects_blank_title() {
        let input = NewConversation {
            title: "   ".into(),
            scope: ConversationScope::Personal,
            department: None,
        };
        assert!(matches!(input.normalized(), Err(AtriumError::Validation(_))));
    }

    #[test]
    fn department_conversation_needs_tag() {
        let input = NewConversation {
            title: "Field crew".into(),
            scope: ConversationScope::Department,
            department: Some("  ".into()),
        };
        assert!(input.normalized().is_err());

        let input = NewConversation {
            title: "  Field crew ".into(),
            scope: ConversationScope::Department,
            department: Some(" installs ".into()),
        };
        let normalized = input.normalized().unwrap();
        assert_eq!(normalized.title, "Field crew");
        assert_eq!(normalized.department.as_deref(), Some("installs"));
    }

    #[test]
    fn personal_conversation_drops_department_tag() {
        let input = NewConversation {
            title: "Notes".into(),
            scope: ConversationScope::Personal,
            department: Some("sales".into()),
        };
        assert_eq!(input.normalized().unwrap().department, None);
    }

    #[test]
    fn settings_defaults_match_documented_values() {
        let settings = GroupAgentSettings::default();
        assert!(!settings.exists);
        assert!(!settings.auto_mode);
        assert_eq!(settings.intervention_level, InterventionLevel::Medium);
        assert_eq!(settings.cooldown_minutes, 10);
        assert_eq!(settings.model, DEFAULT_MODEL);
    }

    #[test]
    fn patch_rejects_out_of_range_cooldown() {
        for minutes in [0, 1441, 10_000] {
            let patch = GroupSettingsPatch {
                cooldown_minutes: Some(minutes),
                ..Default::default()
            };
            assert!(patch.validate().is_err(), "{minutes} should be rejected");
        }
        for minutes in [1, 10, 1440] {
            let patch = GroupSettingsPatch {
                cooldown_minutes: Some(minutes),
                ..Default::default()
            };
            assert!(patch.validate().is_ok(), "{minutes} should be accepted");
        }
    }

    #[test]
    fn patch_rejects_unknown_model_and_blank_name() {
        let patch = GroupSettingsPatch {
            model: Some("made-up-model".into()),
            ..Default::default()
        };
        assert!(patch.validate().is_err());

        let patch = GroupSettingsPatch {
            agent_name: Some(" ".into()),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn patch_applies_only_present_fields() {
        let mut settings = GroupAgentSettings::default();
        let patch = GroupSettingsPatch {
            auto_mode: Some(true),
            cooldown_minutes: Some(30),
            ..Default::default()
        };
        patch.apply_to(&mut settings);

        assert!(settings.exists);
        assert!(settings.auto_mode);
        assert_eq!(settings.cooldown_minutes, 30);
        assert_eq!(settings.agent_name, DEFAULT_AGENT_NAME);
        assert_eq!(settings.intervention_level, InterventionLevel::Medium);
    }

    #[test]
    fn ids_display_their_raw_value() {
        let id = ConversationId::from("conv-1");
        assert_eq!(id.to_string(), "conv-1");
        assert_ne!(MessageId::generate(), MessageId::generate());
    }
}
