// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message channel behavior against the mock backend.

use std::sync::Arc;
use std::time::Duration;

use atrium_chat::{LoadState, MessageChannel};
use atrium_core::{ChatBackend, Conversation, ConversationScope, Sender};
use atrium_test_utils::{BackendOp, MockBackend};

/// Let the subscription and pump tasks drain what is ready.
async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

async fn personal(backend: &MockBackend) -> Conversation {
    backend.get_or_create_personal_conversation().await.unwrap()
}

fn ids(channel: &MessageChannel) -> Vec<String> {
    channel
        .messages()
        .iter()
        .map(|m| m.id.to_string())
        .collect()
}

// ---- Baseline and live merge ----

#[tokio::test]
async fn push_duplicates_of_baseline_are_ignored() {
    let backend = MockBackend::default();
    let conv = personal(&backend).await;
    let m1 = MockBackend::message(&conv.id, Sender::User, "one");
    let m2 = MockBackend::message(&conv.id, Sender::Assistant, "two");
    backend.insert_history(m1.clone());
    backend.insert_history(m2.clone());

    let channel = MessageChannel::open(Arc::new(backend.clone()), conv.id.clone(), 100).await;
    let mut arrivals = channel.subscribe_arrivals();
    assert_eq!(channel.snapshot().load_state, LoadState::Ready);

    let m3 = MockBackend::message(&conv.id, Sender::User, "three");
    backend.push(m2.clone());
    backend.push(m3.clone());
    settle().await;

    assert_eq!(
        ids(&channel),
        vec![m1.id.to_string(), m2.id.to_string(), m3.id.to_string()]
    );
    // Only the genuinely new message is signalled.
    assert_eq!(arrivals.try_recv().unwrap().id, m3.id);
    assert!(arrivals.try_recv().is_err());
}

#[tokio::test]
async fn baseline_is_bounded_by_history_limit() {
    let backend = MockBackend::default();
    let conv = personal(&backend).await;
    for i in 0..5 {
        backend.insert_history(MockBackend::message(&conv.id, Sender::User, &format!("m{i}")));
    }

    let channel = MessageChannel::open(Arc::new(backend.clone()), conv.id.clone(), 3).await;
    let contents: Vec<_> = channel.messages().into_iter().map(|m| m.content).collect();
    assert_eq!(contents, ["m2", "m3", "m4"]);
}

#[tokio::test(start_paused = true)]
async fn inserts_during_baseline_fetch_are_not_lost() {
    let backend = MockBackend::default();
    let conv = personal(&backend).await;
    backend.set_delay(BackendOp::ListMessages, Duration::from_secs(1));

    let pushed_only = MockBackend::message(&conv.id, Sender::Assistant, "in flight");
    let (channel, stored) = tokio::join!(
        MessageChannel::open(Arc::new(backend.clone()), conv.id.clone(), 100),
        async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            backend.push(pushed_only.clone());
            // Stored and pushed: reaches both the baseline and the buffer.
            backend.post_assistant_message(&conv.id, "stored")
        }
    );
    settle().await;

    let messages = channel.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().any(|m| m.id == pushed_only.id));
    assert_eq!(messages.iter().filter(|m| m.id == stored.id).count(), 1);
}

#[tokio::test]
async fn failed_baseline_still_merges_live_arrivals() {
    let backend = MockBackend::default();
    let conv = personal(&backend).await;
    backend.fail(BackendOp::ListMessages);

    let channel = MessageChannel::open(Arc::new(backend.clone()), conv.id.clone(), 100).await;
    let snapshot = channel.snapshot();
    assert!(snapshot.messages.is_empty());
    assert!(snapshot.load_state.error().is_some());
    assert!(snapshot.live);

    let reply = backend.post_assistant_message(&conv.id, "still here");
    settle().await;
    assert_eq!(channel.messages()[0].id, reply.id);
}

#[tokio::test]
async fn failed_subscription_leaves_a_static_list() {
    let backend = MockBackend::default();
    let conv = personal(&backend).await;
    backend.insert_history(MockBackend::message(&conv.id, Sender::User, "history"));
    backend.fail(BackendOp::SubscribeMessages);

    let channel = MessageChannel::open(Arc::new(backend.clone()), conv.id.clone(), 100).await;
    let snapshot = channel.snapshot();
    assert!(!snapshot.live);
    assert_eq!(snapshot.load_state, LoadState::Ready);
    assert_eq!(snapshot.messages.len(), 1);
}

// ---- Scoping and teardown ----

#[tokio::test]
async fn other_conversations_are_never_merged() {
    let backend = MockBackend::default();
    let conv = personal(&backend).await;
    let other = backend.seed_conversation("Ops", ConversationScope::Department);

    let channel = MessageChannel::open(Arc::new(backend.clone()), conv.id.clone(), 100).await;
    backend.post_assistant_message(&other.id, "elsewhere");
    settle().await;

    assert!(channel.messages().is_empty());
}

#[tokio::test]
async fn close_releases_the_subscription() {
    let backend = MockBackend::default();
    let conv = personal(&backend).await;

    let mut channel = MessageChannel::open(Arc::new(backend.clone()), conv.id.clone(), 100).await;
    settle().await;
    assert_eq!(backend.subscriber_count(), 1);

    channel.close().await;
    settle().await;
    assert_eq!(backend.subscriber_count(), 0);
    assert!(!channel.snapshot().live);

    backend.post_assistant_message(&conv.id, "after close");
    settle().await;
    assert!(channel.messages().is_empty());
}

#[tokio::test]
async fn watch_receivers_see_merged_messages() {
    let backend = MockBackend::default();
    let conv = personal(&backend).await;
    let channel = MessageChannel::open(Arc::new(backend.clone()), conv.id.clone(), 100).await;
    let mut rx = channel.subscribe();
    rx.borrow_and_update();

    backend.post_assistant_message(&conv.id, "**hello**");
    let snapshot = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| !s.messages.is_empty()))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(snapshot.messages[0].content, "**hello**");
}
