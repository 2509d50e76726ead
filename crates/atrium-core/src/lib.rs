// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Atrium chat orchestration layer.
//!
//! This crate provides the chat data model, the error type, and the adapter
//! traits through which the orchestration layer reaches the hosted backend
//! and the external reply worker.

pub mod error;
pub mod subscription;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::AtriumError;
pub use subscription::MessageSubscription;
pub use types::{
    AdapterType, ChatRequest, Conversation, ConversationId, ConversationScope,
    DepartmentConversation, GroupAgentSettings, GroupSettingsPatch, GroupSettingsResponse,
    HealthStatus, InterventionLevel, Message, MessageId, NewConversation, RequestId,
    RequestStatus, Sender, UserId,
};

pub use traits::{ChatBackend, ChatWorker, PluginAdapter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atrium_error_has_all_variants() {
        let _config = AtriumError::Config("test".into());
        let _storage = AtriumError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _backend = AtriumError::backend("test");
        let _worker = AtriumError::worker("test");
        let _validation = AtriumError::Validation("test".into());
        let _not_found = AtriumError::NotFound {
            entity: "conversation",
            id: "c1".into(),
        };
        let _not_member = AtriumError::NotMember {
            conversation_id: "c1".into(),
        };
        let _pending = AtriumError::RequestPending {
            conversation_id: "c1".into(),
        };
        let _timeout = AtriumError::Timeout {
            duration: std::time::Duration::from_secs(60),
        };
        let _internal = AtriumError::Internal("test".into());
    }

    #[test]
    fn adapter_type_round_trips_through_strings() {
        use std::str::FromStr;

        for variant in [AdapterType::Backend, AdapterType::Worker] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn all_traits_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_backend<T: ChatBackend>() {}
        fn _assert_worker<T: ChatWorker>() {}
    }
}
