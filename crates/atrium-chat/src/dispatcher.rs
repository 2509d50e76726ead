// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns a user utterance into a persisted message, a queued request, and a
//! fire-and-forget worker invocation.

use std::sync::Arc;

use tracing::{Instrument, debug, info, warn};

use atrium_core::{AtriumError, ChatBackend, ChatWorker, ConversationId, MessageId, RequestId};

/// Identifiers produced by a successful [`RequestDispatcher::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub message_id: MessageId,
    pub request_id: RequestId,
}

/// Persists user messages and hands the resulting requests to the worker.
pub struct RequestDispatcher {
    backend: Arc<dyn ChatBackend>,
    worker: Arc<dyn ChatWorker>,
}

impl RequestDispatcher {
    pub fn new(backend: Arc<dyn ChatBackend>, worker: Arc<dyn ChatWorker>) -> Self {
        Self { backend, worker }
    }

    /// Persist `content` as a user message under `mode`, queue a request for
    /// it, and invoke the worker in the background.
    ///
    /// Empty or whitespace-only content is rejected with no side effect. A
    /// failure while persisting aborts the send. A failed worker invocation
    /// is only logged: the message and request stay in place and the status
    /// coordinator observes the outcome.
    pub async fn send(
        &self,
        conversation_id: &ConversationId,
        content: &str,
        mode: &str,
    ) -> Result<Dispatch, AtriumError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AtriumError::Validation(
                "message content must not be empty".into(),
            ));
        }

        let message_id = self
            .backend
            .add_user_message(conversation_id, content, mode)
            .await?;
        let request_id = self
            .backend
            .create_chat_request(conversation_id, mode, &message_id)
            .await?;

        info!(
            conversation_id = %conversation_id,
            request_id = %request_id,
            mode,
            "chat request queued"
        );
        self.hand_off(request_id.clone());

        Ok(Dispatch {
            message_id,
            request_id,
        })
    }

    /// Re-arm a failed request and hand it to the worker again.
    pub async fn redispatch(&self, request_id: &RequestId) -> Result<(), AtriumError> {
        self.backend.retry_chat_request(request_id).await?;
        info!(request_id = %request_id, "chat request re-armed");
        self.hand_off(request_id.clone());
        Ok(())
    }

    fn hand_off(&self, request_id: RequestId) {
        let worker = Arc::clone(&self.worker);
        tokio::spawn(
            async move {
                match worker.invoke(&request_id).await {
                    Ok(()) => debug!(request_id = %request_id, "worker accepted request"),
                    Err(e) => warn!(
                        request_id = %request_id,
                        error = %e,
                        "worker invocation failed"
                    ),
                }
            }
            .in_current_span(),
        );
    }
}
