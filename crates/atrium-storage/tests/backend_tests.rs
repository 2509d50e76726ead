// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests of the SQLite backend through the `ChatBackend` trait.

use std::time::Duration;

use atrium_config::model::{AgentConfig, AtriumConfig};
use atrium_core::types::{
    ConversationScope, GroupSettingsPatch, InterventionLevel, NewConversation, RequestStatus,
    Sender,
};
use atrium_core::{AtriumError, ChatBackend, HealthStatus, PluginAdapter};
use atrium_storage::{Database, SqliteBackend};
use tempfile::tempdir;

async fn backend(user: &str) -> SqliteBackend {
    let db = Database::open_in_memory().await.unwrap();
    SqliteBackend::with_database(db, user.into(), AgentConfig::default())
}

fn department(title: &str, tag: &str) -> NewConversation {
    NewConversation {
        title: title.into(),
        scope: ConversationScope::Department,
        department: Some(tag.into()),
    }
}

#[tokio::test]
async fn open_from_config_and_health_check() {
    let dir = tempdir().unwrap();
    let mut config = AtriumConfig::default();
    config.storage.database_path = dir.path().join("atrium.db").display().to_string();
    config.identity.user_id = "alice".into();

    let backend = SqliteBackend::open(&config).await.unwrap();
    assert_eq!(backend.user_id().as_str(), "alice");
    assert_eq!(backend.health_check().await.unwrap(), HealthStatus::Healthy);
    backend.shutdown().await.unwrap();
}

#[tokio::test]
async fn personal_conversation_is_idempotent_per_user() {
    let alice = backend("alice").await;
    let bob = alice.for_user("bob");

    let a1 = alice.get_or_create_personal_conversation().await.unwrap();
    let a2 = alice.get_or_create_personal_conversation().await.unwrap();
    let b1 = bob.get_or_create_personal_conversation().await.unwrap();

    assert_eq!(a1.id, a2.id);
    assert_ne!(a1.id, b1.id);
    assert_eq!(alice.list_conversations(50).await.unwrap().len(), 1);
}

#[tokio::test]
async fn list_conversations_respects_limit_and_recency() {
    let alice = backend("alice").await;
    let personal = alice.get_or_create_personal_conversation().await.unwrap();
    let other = alice
        .create_conversation(NewConversation {
            title: "notes".into(),
            scope: ConversationScope::Personal,
            department: None,
        })
        .await
        .unwrap();

    alice.add_user_message(&personal.id, "latest", "general").await.unwrap();

    let listed = alice.list_conversations(1).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, personal.id);

    let all = alice.list_conversations(10).await.unwrap();
    assert_eq!(all.iter().map(|c| &c.id).collect::<Vec<_>>(), [&personal.id, &other]);
}

#[tokio::test]
async fn department_membership_gates_sending() {
    let alice = backend("alice").await;
    let bob = alice.for_user("bob");
    let id = alice.create_conversation(department("Sales floor", "sales")).await.unwrap();

    let listing = bob.list_department_conversations().await.unwrap();
    assert_eq!(listing.len(), 1);
    assert!(!listing[0].is_member);

    let err = bob.add_user_message(&id, "hi", "sales").await.unwrap_err();
    assert!(matches!(err, AtriumError::NotMember { .. }));

    bob.join_department_conversation(&id).await.unwrap();
    bob.join_department_conversation(&id).await.unwrap();
    assert!(bob.list_department_conversations().await.unwrap()[0].is_member);
    bob.add_user_message(&id, "hi", "sales").await.unwrap();
}

#[tokio::test]
async fn create_rejects_blank_title() {
    let alice = backend("alice").await;
    let err = alice
        .create_conversation(department("   ", "sales"))
        .await
        .unwrap_err();
    assert!(matches!(err, AtriumError::Validation(_)));
}

#[tokio::test]
async fn subscription_delivers_user_and_assistant_inserts() {
    let alice = backend("alice").await;
    let conv = alice.get_or_create_personal_conversation().await.unwrap();
    let mut sub = alice.subscribe_messages(&conv.id).await.unwrap();

    let user_id = alice.add_user_message(&conv.id, "question", "general").await.unwrap();
    alice
        .post_assistant_message(&conv.id, "**answer**", "general", Default::default())
        .await
        .unwrap();

    let first = tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .unwrap()
        .unwrap();
    let second = tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.id, user_id);
    assert_eq!(second.sender, Sender::Assistant);
}

#[tokio::test]
async fn request_lifecycle_and_retry() {
    let alice = backend("alice").await;
    let conv = alice.get_or_create_personal_conversation().await.unwrap();
    let msg = alice.add_user_message(&conv.id, "hello", "general").await.unwrap();
    let req = alice.create_chat_request(&conv.id, "general", &msg).await.unwrap();

    let latest = alice.get_latest_request_status(&conv.id).await.unwrap().unwrap();
    assert_eq!(latest.id, req);
    assert_eq!(latest.status, RequestStatus::Queued);
    assert_eq!(latest.latest_user_message_id, msg);

    let err = alice.retry_chat_request(&req).await.unwrap_err();
    assert!(matches!(err, AtriumError::Validation(_)));

    alice
        .update_request_status(&req, RequestStatus::Processing, None)
        .await
        .unwrap();
    alice
        .update_request_status(&req, RequestStatus::Error, Some("model unavailable".into()))
        .await
        .unwrap();
    let failed = alice.get_request(&req).await.unwrap().unwrap();
    assert_eq!(failed.error.as_deref(), Some("model unavailable"));

    let regress = alice
        .update_request_status(&req, RequestStatus::Processing, None)
        .await
        .unwrap_err();
    assert!(matches!(regress, AtriumError::Validation(_)));

    alice.retry_chat_request(&req).await.unwrap();
    let rearmed = alice.get_latest_request_status(&conv.id).await.unwrap().unwrap();
    assert_eq!(rearmed.id, req);
    assert_eq!(rearmed.status, RequestStatus::Queued);
    assert!(rearmed.error.is_none());
}

#[tokio::test]
async fn latest_request_ignores_other_users() {
    let alice = backend("alice").await;
    let bob = alice.for_user("bob");
    let id = alice.create_conversation(department("Ops", "ops")).await.unwrap();
    bob.join_department_conversation(&id).await.unwrap();

    let msg = bob.add_user_message(&id, "ping", "ops").await.unwrap();
    bob.create_chat_request(&id, "ops", &msg).await.unwrap();

    assert!(alice.get_latest_request_status(&id).await.unwrap().is_none());
    assert!(bob.get_latest_request_status(&id).await.unwrap().is_some());
}

#[tokio::test]
async fn delete_cascades_to_messages() {
    let alice = backend("alice").await;
    let id = alice.create_conversation(department("Temp", "misc")).await.unwrap();
    let msg = alice.add_user_message(&id, "bye", "misc").await.unwrap();
    alice.create_chat_request(&id, "misc", &msg).await.unwrap();

    assert!(!alice.for_user("bob").delete_conversation(&id).await.unwrap());
    assert!(alice.delete_conversation(&id).await.unwrap());
    assert!(!alice.delete_conversation(&id).await.unwrap());
    assert!(alice.get_message(&msg).await.unwrap().is_none());
    assert!(alice.list_messages(&id, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn group_settings_missing_row_and_domain_error() {
    let alice = backend("alice").await;
    let dept = alice.create_conversation(department("Ops", "ops")).await.unwrap();
    let personal = alice.get_or_create_personal_conversation().await.unwrap();

    let empty = alice.get_group_settings(&dept).await.unwrap();
    assert!(empty.settings.is_none());
    assert!(empty.error.is_none());

    let refused = alice.get_group_settings(&personal.id).await.unwrap();
    assert!(refused.settings.is_none());
    assert!(refused.error.is_some());
}

#[tokio::test]
async fn group_settings_patch_merges_onto_defaults() {
    let alice = backend("alice").await;
    let dept = alice.create_conversation(department("Ops", "ops")).await.unwrap();

    alice
        .set_group_settings(
            &dept,
            &GroupSettingsPatch {
                auto_mode: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    alice
        .set_group_settings(
            &dept,
            &GroupSettingsPatch {
                intervention_level: Some(InterventionLevel::Low),
                cooldown_minutes: Some(45),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let settings = alice.get_group_settings(&dept).await.unwrap().settings.unwrap();
    assert!(settings.exists);
    assert!(settings.auto_mode);
    assert_eq!(settings.intervention_level, InterventionLevel::Low);
    assert_eq!(settings.cooldown_minutes, 45);
    assert_eq!(settings.agent_name, "Assistant");
    assert_eq!(settings.model, "gpt-4o-mini");

    let err = alice
        .set_group_settings(
            &dept,
            &GroupSettingsPatch {
                cooldown_minutes: Some(0),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AtriumError::Validation(_)));
}
