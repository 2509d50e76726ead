// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Loopback reply worker over the SQLite backend.
//!
//! Stands in for the hosted reply generator: it walks a request through
//! `processing`, posts an assistant reply that quotes the user, and marks the
//! request `done`. A message containing [`FAIL_MARKER`] fails its first
//! attempt, which makes the error and retry path reachable by hand.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{Instrument, debug, info, warn};

use atrium_config::model::{AtriumConfig, WorkerConfig};
use atrium_core::types::{ChatRequest, RequestId, RequestStatus};
use atrium_core::{AdapterType, AtriumError, ChatBackend, ChatWorker, HealthStatus, PluginAdapter};

use crate::backend::SqliteBackend;

/// Content marker that makes the first attempt of a request fail.
pub const FAIL_MARKER: &str = "#fail";

#[derive(Clone)]
pub struct LoopbackWorker {
    backend: SqliteBackend,
    timing: WorkerConfig,
    default_agent_name: String,
    failed_once: Arc<Mutex<HashSet<RequestId>>>,
}

impl std::fmt::Debug for LoopbackWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackWorker")
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

impl LoopbackWorker {
    pub fn new(backend: SqliteBackend, config: &AtriumConfig) -> Self {
        Self {
            backend,
            timing: config.worker.clone(),
            default_agent_name: config.agent.default_name.clone(),
            failed_once: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// First attempt of a marked request? Records the attempt.
    fn should_fail(&self, request_id: &RequestId, content: &str) -> bool {
        content.contains(FAIL_MARKER)
            && self
                .failed_once
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(request_id.clone())
    }

    /// Name the reply is signed with: the group agent's for department
    /// conversations, the configured default otherwise.
    async fn agent_name(&self, request: &ChatRequest) -> String {
        match self.backend.get_group_settings(&request.conversation_id).await {
            Ok(response) => response
                .settings
                .map(|s| s.agent_name)
                .unwrap_or_else(|| self.default_agent_name.clone()),
            Err(e) => {
                debug!(error = %e, "settings unavailable, signing with default name");
                self.default_agent_name.clone()
            }
        }
    }

    async fn process(&self, request: ChatRequest) -> Result<(), AtriumError> {
        tokio::time::sleep(Duration::from_millis(self.timing.processing_delay_ms)).await;
        self.backend
            .update_request_status(&request.id, RequestStatus::Processing, None)
            .await?;

        let message = self
            .backend
            .get_message(&request.latest_user_message_id)
            .await?
            .ok_or_else(|| AtriumError::NotFound {
                entity: "message",
                id: request.latest_user_message_id.to_string(),
            })?;
        tokio::time::sleep(Duration::from_millis(self.timing.reply_delay_ms)).await;

        if self.should_fail(&request.id, &message.content) {
            info!(request_id = %request.id, "simulating reply failure");
            return self
                .backend
                .update_request_status(
                    &request.id,
                    RequestStatus::Error,
                    Some("simulated failure, retry to continue".into()),
                )
                .await;
        }

        let agent = self.agent_name(&request).await;
        let reply = compose_reply(&agent, &request.mode, &message.content);
        let mut metadata = serde_json::Map::new();
        metadata.insert("request_id".into(), request.id.to_string().into());
        self.backend
            .post_assistant_message(&request.conversation_id, &reply, &request.mode, metadata)
            .await?;
        self.backend
            .update_request_status(&request.id, RequestStatus::Done, None)
            .await
    }
}

fn compose_reply(agent: &str, mode: &str, content: &str) -> String {
    format!("**{agent}** ({mode}): you said \"{}\"", content.trim())
}

#[async_trait]
impl PluginAdapter for LoopbackWorker {
    fn name(&self) -> &str {
        "loopback"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Worker
    }

    async fn health_check(&self) -> Result<HealthStatus, AtriumError> {
        self.backend.health_check().await
    }

    async fn shutdown(&self) -> Result<(), AtriumError> {
        Ok(())
    }
}

#[async_trait]
impl ChatWorker for LoopbackWorker {
    /// Accept the request and process it in the background.
    async fn invoke(&self, request_id: &RequestId) -> Result<(), AtriumError> {
        let request = self
            .backend
            .get_request(request_id)
            .await?
            .ok_or_else(|| AtriumError::NotFound {
                entity: "request",
                id: request_id.to_string(),
            })?;

        let worker = self.clone();
        tokio::spawn(
            async move {
                let id = request.id.clone();
                if let Err(e) = worker.process(request).await {
                    warn!(request_id = %id, error = %e, "loopback reply failed");
                }
            }
            .in_current_span(),
        );
        Ok(())
    }
}
