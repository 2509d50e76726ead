// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live message-insert subscription scoped to one conversation.
//!
//! A [`MessageSubscription`] owns its delivery task: dropping the
//! subscription cancels the task, so a subscription can never outlive the
//! value that holds it.

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

use crate::types::{ConversationId, Message};

/// Buffer between the fan-out task and the subscriber.
const SUBSCRIPTION_BUFFER: usize = 256;

/// A stream of messages inserted into a single conversation.
pub struct MessageSubscription {
    conversation_id: ConversationId,
    rx: mpsc::Receiver<Message>,
    _guard: DropGuard,
}

impl std::fmt::Debug for MessageSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSubscription")
            .field("conversation_id", &self.conversation_id)
            .finish_non_exhaustive()
    }
}

impl MessageSubscription {
    /// Wrap an existing receiver. `token` is cancelled when the subscription drops.
    pub fn new(
        conversation_id: ConversationId,
        rx: mpsc::Receiver<Message>,
        token: CancellationToken,
    ) -> Self {
        Self {
            conversation_id,
            rx,
            _guard: token.drop_guard(),
        }
    }

    /// Subscribe to a backend-wide insert broadcast, keeping only messages
    /// for `conversation_id`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_broadcast(
        conversation_id: ConversationId,
        mut source: broadcast::Receiver<Message>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let filter_id = conversation_id.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    received = source.recv() => match received {
                        Ok(message) => {
                            if message.conversation_id != filter_id {
                                continue;
                            }
                            if tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(
                                conversation_id = %filter_id,
                                skipped,
                                "message subscription lagged, inserts dropped"
                            );
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!(conversation_id = %filter_id, "message subscription closed");
        });

        Self::new(conversation_id, rx, token)
    }

    /// The conversation this subscription is scoped to.
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Wait for the next inserted message. Returns `None` once the source closes.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}
