// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live, de-duplicated message list for the active conversation.
//!
//! A [`MessageChannel`] is opened for exactly one conversation. It subscribes
//! to inserts *before* fetching the history baseline, so nothing inserted
//! during the fetch is lost: those events wait in the subscription buffer and
//! are merged once the baseline is in place. Merging is idempotent by message
//! id, so a message reported by both paths appears once.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use atrium_core::{ChatBackend, ConversationId, Message, MessageSubscription};

/// Buffer of the arrival re-broadcast.
const ARRIVAL_BUFFER: usize = 64;

/// Outcome of the baseline history fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    Ready,
    /// The baseline could not be fetched; live arrivals are still merged.
    Failed(String),
}

impl LoadState {
    pub fn error(&self) -> Option<&str> {
        match self {
            LoadState::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

/// What a view renders for the active conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageListSnapshot {
    pub conversation_id: ConversationId,
    /// Oldest first.
    pub messages: Vec<Message>,
    pub load_state: LoadState,
    /// Whether a push subscription is feeding the list.
    pub live: bool,
}

/// Insert `message` into a list ordered by `created_at`, unless its id is
/// already present.
///
/// The message lands after the last entry whose timestamp is less than or
/// equal to its own, so equal timestamps keep arrival order. Returns whether
/// the list changed.
pub fn merge_message(messages: &mut Vec<Message>, message: Message) -> bool {
    if messages.iter().any(|m| m.id == message.id) {
        return false;
    }
    let at = messages.partition_point(|m| m.created_at <= message.created_at);
    messages.insert(at, message);
    true
}

struct Pump {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// The message list of one conversation, kept live by a pump task.
pub struct MessageChannel {
    conversation_id: ConversationId,
    state: Arc<watch::Sender<MessageListSnapshot>>,
    arrivals: broadcast::Sender<Message>,
    pump: Option<Pump>,
}

impl std::fmt::Debug for MessageChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageChannel")
            .field("conversation_id", &self.conversation_id)
            .field("live", &self.pump.is_some())
            .finish_non_exhaustive()
    }
}

impl MessageChannel {
    /// Subscribe to inserts, load the most recent `history_limit` messages,
    /// then start merging live arrivals.
    ///
    /// Neither a failed subscription nor a failed baseline fetch is fatal:
    /// both are logged and reflected in the snapshot.
    pub async fn open(
        backend: Arc<dyn ChatBackend>,
        conversation_id: ConversationId,
        history_limit: usize,
    ) -> Self {
        let (state, _) = watch::channel(MessageListSnapshot {
            conversation_id: conversation_id.clone(),
            messages: Vec::new(),
            load_state: LoadState::Loading,
            live: false,
        });
        let state = Arc::new(state);
        let (arrivals, _) = broadcast::channel(ARRIVAL_BUFFER);

        let subscription = match backend.subscribe_messages(&conversation_id).await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                warn!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "message subscription failed, list will not update live"
                );
                None
            }
        };

        let baseline = backend.list_messages(&conversation_id, history_limit).await;
        state.send_modify(|snapshot| match baseline {
            Ok(messages) => {
                for message in messages {
                    if message.conversation_id == conversation_id {
                        merge_message(&mut snapshot.messages, message);
                    }
                }
                snapshot.load_state = LoadState::Ready;
            }
            Err(e) => {
                warn!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "message history fetch failed"
                );
                snapshot.load_state = LoadState::Failed(e.to_string());
            }
        });

        let pump = subscription.map(|subscription| {
            state.send_modify(|snapshot| snapshot.live = true);
            let token = CancellationToken::new();
            let task = tokio::spawn(
                run_pump(
                    subscription,
                    Arc::clone(&state),
                    arrivals.clone(),
                    token.clone(),
                )
                .instrument(info_span!("message_pump", conversation_id = %conversation_id)),
            );
            Pump { token, task }
        });

        debug!(
            conversation_id = %conversation_id,
            messages = state.borrow().messages.len(),
            "message channel opened"
        );

        Self {
            conversation_id,
            state,
            arrivals,
            pump,
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn subscribe(&self) -> watch::Receiver<MessageListSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> MessageListSnapshot {
        self.state.borrow().clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.borrow().messages.clone()
    }

    /// Every message merged from the push path, after it is in the list.
    pub fn subscribe_arrivals(&self) -> broadcast::Receiver<Message> {
        self.arrivals.subscribe()
    }

    /// Stop the pump and wait for it to release the subscription.
    pub async fn close(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.token.cancel();
            if let Err(e) = pump.task.await {
                warn!(conversation_id = %self.conversation_id, error = %e, "message pump ended abnormally");
            }
            self.state.send_modify(|snapshot| snapshot.live = false);
            debug!(conversation_id = %self.conversation_id, "message channel closed");
        }
    }
}

impl Drop for MessageChannel {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.token.cancel();
        }
    }
}

async fn run_pump(
    mut subscription: MessageSubscription,
    state: Arc<watch::Sender<MessageListSnapshot>>,
    arrivals: broadcast::Sender<Message>,
    token: CancellationToken,
) {
    let conversation_id = subscription.conversation_id().clone();
    loop {
        let message = tokio::select! {
            _ = token.cancelled() => break,
            received = subscription.recv() => match received {
                Some(message) => message,
                None => {
                    debug!("message subscription ended");
                    break;
                }
            },
        };

        if message.conversation_id != conversation_id {
            debug!(message_id = %message.id, "dropped message for another conversation");
            continue;
        }

        let merged = state.send_if_modified(|snapshot| {
            merge_message(&mut snapshot.messages, message.clone())
        });
        if merged {
            // No observers is fine.
            let _ = arrivals.send(message);
        } else {
            debug!(message_id = %message.id, "duplicate message ignored");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrium_core::{MessageId, Sender};
    use chrono::{TimeZone, Utc};

    fn at(id: &str, second: u32) -> Message {
        Message {
            id: MessageId::from(id),
            conversation_id: "c1".into(),
            sender: Sender::User,
            content: id.to_string(),
            mode: "general".into(),
            metadata: Default::default(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, second).unwrap(),
        }
    }

    fn ids(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn merge_skips_known_ids() {
        let mut list = vec![at("m1", 1), at("m2", 2)];
        assert!(!merge_message(&mut list, at("m2", 2)));
        assert!(merge_message(&mut list, at("m3", 3)));
        assert_eq!(ids(&list), ["m1", "m2", "m3"]);
    }

    #[test]
    fn merge_orders_by_timestamp_then_arrival() {
        let mut list = vec![at("m1", 1), at("m3", 3)];
        merge_message(&mut list, at("m2", 2));
        merge_message(&mut list, at("m2b", 2));
        merge_message(&mut list, at("m0", 0));
        assert_eq!(ids(&list), ["m0", "m1", "m2", "m2b", "m3"]);
    }

    #[test]
    fn load_state_exposes_failure_reason() {
        assert_eq!(LoadState::Failed("down".into()).error(), Some("down"));
        assert_eq!(LoadState::Ready.error(), None);
    }
}
