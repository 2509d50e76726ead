// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat surface flows over the mock backend and worker.

use std::sync::Arc;
use std::time::Duration;

use atrium_chat::{ChatSurface, StatusBanner, TrackedStatus};
use atrium_config::AtriumConfig;
use atrium_core::{
    AtriumError, ConversationScope, GroupSettingsPatch, NewConversation, RequestStatus, Sender,
};
use atrium_test_utils::{BackendOp, MockBackend, MockWorker};

async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

async fn open_surface(backend: &MockBackend, worker: &MockWorker) -> ChatSurface {
    open_with(backend, worker, AtriumConfig::default()).await
}

async fn open_with(backend: &MockBackend, worker: &MockWorker, config: AtriumConfig) -> ChatSurface {
    let mut surface = ChatSurface::new(
        Arc::new(backend.clone()),
        Arc::new(worker.clone()),
        &config,
    );
    surface.open().await.unwrap();
    surface
}

// ---- Opening ----

#[tokio::test]
async fn open_activates_the_same_personal_conversation() {
    let backend = MockBackend::default();
    let worker = MockWorker::new();

    let mut first = open_surface(&backend, &worker).await;
    let id = first.active_conversation().unwrap().id.clone();
    first.close().await;

    let second = open_surface(&backend, &worker).await;
    assert_eq!(second.active_conversation().unwrap().id, id);
    assert_eq!(second.mode(), "general");
    assert_eq!(backend.calls(BackendOp::GetOrCreatePersonal), 2);
}

#[tokio::test]
async fn open_fails_when_personal_conversation_is_unavailable() {
    let backend = MockBackend::default();
    backend.fail(BackendOp::GetOrCreatePersonal);
    let mut surface = ChatSurface::new(
        Arc::new(backend.clone()),
        Arc::new(MockWorker::new()),
        &AtriumConfig::default(),
    );

    assert!(surface.open().await.is_err());
    assert!(surface.active_conversation().is_none());
    assert!(surface.conversations().last_error().is_some());
}

// ---- Sending ----

#[tokio::test(start_paused = true)]
async fn send_shows_message_and_tracks_request() {
    let backend = MockBackend::default();
    let worker = MockWorker::new();
    let surface = open_surface(&backend, &worker).await;

    let dispatch = surface.send("What changed?").await.unwrap();
    assert_eq!(surface.banner(), Some(StatusBanner::Queued));
    assert_eq!(worker.wait_for_invocations(1).await, vec![dispatch.request_id.clone()]);
    settle().await;

    // The user's own message arrives on the push path.
    let messages = surface.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, dispatch.message_id);
    // It does not settle the request.
    assert_eq!(surface.status().status, TrackedStatus::Queued);

    let conversation_id = surface.active_conversation().unwrap().id.clone();
    backend.post_assistant_message(&conversation_id, "**Everything.**");
    assert!(surface.wait_until_settled(Duration::from_secs(1)).await);
    assert_eq!(surface.banner(), None);
    assert_eq!(surface.messages()[1].sender, Sender::Assistant);
}

#[tokio::test(start_paused = true)]
async fn second_send_is_rejected_while_pending() {
    let backend = MockBackend::default();
    let worker = MockWorker::new();
    let surface = open_surface(&backend, &worker).await;

    surface.send("first").await.unwrap();
    let err = surface.send("second").await.unwrap_err();
    assert!(matches!(err, AtriumError::RequestPending { .. }));
    assert_eq!(backend.calls(BackendOp::AddUserMessage), 1);
}

#[tokio::test(start_paused = true)]
async fn second_send_allowed_when_configured() {
    let backend = MockBackend::default();
    let worker = MockWorker::new();
    let mut config = AtriumConfig::default();
    config.chat.allow_send_while_pending = true;
    let surface = open_with(&backend, &worker, config).await;

    let first = surface.send("first").await.unwrap();
    let second = surface.send("second").await.unwrap();
    assert_ne!(first.request_id, second.request_id);
    assert_eq!(surface.status().request_id, Some(second.request_id));
}

#[tokio::test(start_paused = true)]
async fn blank_message_is_rejected_without_side_effects() {
    let backend = MockBackend::default();
    let worker = MockWorker::new();
    let surface = open_surface(&backend, &worker).await;

    assert!(matches!(
        surface.send("   ").await,
        Err(AtriumError::Validation(_))
    ));
    assert_eq!(backend.calls(BackendOp::AddUserMessage), 0);
    assert_eq!(surface.status().status, TrackedStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn department_requires_membership_to_send() {
    let owner = MockBackend::default();
    let dept = owner.seed_conversation("Logistics", ConversationScope::Department);
    let bob = owner.for_user("bob");
    let worker = MockWorker::new();
    let mut surface = open_surface(&bob, &worker).await;

    surface.activate(&dept.id).await.unwrap();
    assert_eq!(surface.mode(), "logistics");
    let err = surface.send("hello").await.unwrap_err();
    assert!(matches!(err, AtriumError::NotMember { .. }));
    assert_eq!(bob.calls(BackendOp::AddUserMessage), 0);

    surface.join(&dept.id).await.unwrap();
    let dispatch = surface.send("hello").await.unwrap();
    let stored = owner.stored_messages(&dept.id);
    assert_eq!(stored[0].id, dispatch.message_id);
    assert_eq!(stored[0].mode, "logistics");
}

// ---- Switching ----

#[tokio::test(start_paused = true)]
async fn switching_conversation_isolates_status() {
    let backend = MockBackend::default();
    let worker = MockWorker::new();
    let mut surface = open_surface(&backend, &worker).await;
    let personal = surface.active_conversation().unwrap().id.clone();

    let dispatch = surface.send("question for A").await.unwrap();
    let old_status = surface.subscribe_status().unwrap();
    settle().await;

    let dept = backend.seed_conversation("Ops", ConversationScope::Department);
    surface.activate(&dept.id).await.unwrap();
    settle().await;
    assert_eq!(surface.status().status, TrackedStatus::Idle);
    assert_eq!(backend.subscriber_count(), 1);

    let polls = backend.calls(BackendOp::GetLatestRequestStatus);
    backend.set_request_status(&dispatch.request_id, RequestStatus::Error, Some("late"));
    backend.post_assistant_message(&personal, "late answer for A");
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(backend.calls(BackendOp::GetLatestRequestStatus), polls);
    assert_eq!(surface.status().status, TrackedStatus::Idle);
    assert!(surface.messages().is_empty());
    assert_eq!(old_status.borrow().status, TrackedStatus::Queued);
}

#[tokio::test(start_paused = true)]
async fn switching_back_resumes_failed_request() {
    let backend = MockBackend::default();
    let worker = MockWorker::new();
    let mut surface = open_surface(&backend, &worker).await;
    let personal = surface.active_conversation().unwrap().id.clone();
    let dispatch = surface.send("question").await.unwrap();

    let dept = backend.seed_conversation("Ops", ConversationScope::Department);
    surface.activate(&dept.id).await.unwrap();
    backend.set_request_status(&dispatch.request_id, RequestStatus::Error, Some("model down"));

    surface.activate(&personal).await.unwrap();
    assert_eq!(
        surface.banner(),
        Some(StatusBanner::Failed {
            message: "model down".into(),
            can_retry: true,
        })
    );
    assert_eq!(surface.messages().len(), 1);

    assert!(surface.retry().await.unwrap());
    assert_eq!(surface.banner(), Some(StatusBanner::Queued));
    worker.wait_for_invocations(2).await;
}

#[tokio::test]
async fn activating_unknown_conversation_fails() {
    let backend = MockBackend::default();
    let worker = MockWorker::new();
    let mut surface = open_surface(&backend, &worker).await;
    let before = surface.active_conversation().unwrap().id.clone();

    let err = surface.activate(&"missing".into()).await.unwrap_err();
    assert!(matches!(err, AtriumError::NotFound { .. }));
    assert_eq!(surface.active_conversation().unwrap().id, before);
}

// ---- Conversation management ----

#[tokio::test]
async fn create_switches_to_new_conversation() {
    let backend = MockBackend::default();
    let worker = MockWorker::new();
    let mut surface = open_surface(&backend, &worker).await;

    let id = surface
        .create_conversation(NewConversation {
            title: "Field crew".into(),
            scope: ConversationScope::Department,
            department: Some("installs".into()),
        })
        .await
        .unwrap();

    assert_eq!(surface.active_conversation().unwrap().id, id);
    assert_eq!(surface.mode(), "installs");
    assert_eq!(surface.conversations().is_member(&id), Some(true));
}

#[tokio::test]
async fn deleting_active_conversation_falls_back_to_personal() {
    let backend = MockBackend::default();
    let worker = MockWorker::new();
    let mut surface = open_surface(&backend, &worker).await;
    let personal = surface.active_conversation().unwrap().id.clone();

    let id = surface
        .create_conversation(NewConversation {
            title: "Scratch".into(),
            scope: ConversationScope::Department,
            department: Some("misc".into()),
        })
        .await
        .unwrap();

    assert!(surface.delete(&id).await.unwrap());
    assert_eq!(surface.active_conversation().unwrap().id, personal);
    assert!(surface.conversations().find(&id).is_none());
}

#[tokio::test]
async fn deleting_personal_conversation_recreates_it() {
    let backend = MockBackend::default();
    let worker = MockWorker::new();
    let mut surface = open_surface(&backend, &worker).await;
    let personal = surface.active_conversation().unwrap().id.clone();

    assert!(surface.delete(&personal).await.unwrap());
    let replacement = surface.active_conversation().unwrap();
    assert_ne!(replacement.id, personal);
    assert_eq!(replacement.scope, ConversationScope::Personal);
}

#[tokio::test]
async fn mode_override_is_trimmed_and_validated() {
    let backend = MockBackend::default();
    let worker = MockWorker::new();
    let mut surface = open_surface(&backend, &worker).await;

    surface.set_mode("  research ").unwrap();
    assert_eq!(surface.mode(), "research");
    assert!(surface.set_mode(" ").is_err());
    assert_eq!(surface.mode(), "research");
}

// ---- Settings ----

#[tokio::test]
async fn settings_only_apply_to_department_conversations() {
    let backend = MockBackend::default();
    let worker = MockWorker::new();
    let mut surface = open_surface(&backend, &worker).await;

    assert!(matches!(
        surface.active_settings().await,
        Err(AtriumError::Validation(_))
    ));

    let dept = backend.seed_conversation("Ops", ConversationScope::Department);
    surface.activate(&dept.id).await.unwrap();
    let settings = surface.active_settings().await.unwrap();
    assert!(!settings.exists);

    let updated = surface
        .update_active_settings(&GroupSettingsPatch {
            auto_mode: Some(true),
            cooldown_minutes: Some(30),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(updated.exists && updated.auto_mode);
    assert_eq!(updated.cooldown_minutes, 30);
    assert_eq!(surface.settings().auto_mode(&dept.id), Some(true));
}
