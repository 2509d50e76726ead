// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The chat surface: owns the active conversation and wires the stores,
//! the message channel, the dispatcher and the status coordinator together.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use atrium_config::AtriumConfig;
use atrium_config::model::ChatConfig;
use atrium_core::{
    AtriumError, ChatBackend, ChatWorker, Conversation, ConversationId, GroupAgentSettings,
    GroupSettingsPatch, Message, NewConversation,
};

use crate::channel::{MessageChannel, MessageListSnapshot};
use crate::conversations::ConversationStore;
use crate::dispatcher::{Dispatch, RequestDispatcher};
use crate::settings::GroupAgentSettingsStore;
use crate::status::{RequestStatusCoordinator, StatusBanner, StatusSnapshot};

/// Everything scoped to the conversation on screen. Replaced as a unit.
struct ActiveConversation {
    conversation: Conversation,
    channel: MessageChannel,
    coordinator: RequestStatusCoordinator,
}

impl ActiveConversation {
    async fn close(mut self) {
        self.coordinator.close().await;
        self.channel.close().await;
    }
}

pub struct ChatSurface {
    backend: Arc<dyn ChatBackend>,
    dispatcher: Arc<RequestDispatcher>,
    chat: ChatConfig,
    conversations: ConversationStore,
    settings: GroupAgentSettingsStore,
    active: Option<ActiveConversation>,
    mode: String,
}

impl ChatSurface {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        worker: Arc<dyn ChatWorker>,
        config: &AtriumConfig,
    ) -> Self {
        let dispatcher = Arc::new(RequestDispatcher::new(Arc::clone(&backend), worker));
        Self {
            conversations: ConversationStore::new(
                Arc::clone(&backend),
                config.chat.conversation_list_limit,
            ),
            settings: GroupAgentSettingsStore::new(Arc::clone(&backend), &config.agent),
            mode: config.chat.default_mode.clone(),
            chat: config.chat.clone(),
            dispatcher,
            backend,
            active: None,
        }
    }

    /// Load the conversation lists and activate the personal conversation.
    pub async fn open(&mut self) -> Result<Conversation, AtriumError> {
        let personal = self.conversations.get_or_create_personal().await?;
        if let Err(e) = self.conversations.refresh().await {
            warn!(error = %e, "conversation lists unavailable");
        }
        self.activate(&personal.id).await?;
        Ok(personal)
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn settings(&self) -> &GroupAgentSettingsStore {
        &self.settings
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active.as_ref().map(|a| &a.conversation)
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    fn require_active(&self) -> Result<&ActiveConversation, AtriumError> {
        self.active
            .as_ref()
            .ok_or_else(|| AtriumError::Internal("no active conversation".into()))
    }

    /// Make `id` the active conversation.
    ///
    /// The previous conversation's subscription and poll task are torn down
    /// before anything is opened for the new one.
    pub async fn activate(&mut self, id: &ConversationId) -> Result<(), AtriumError> {
        let conversation = match self.conversations.find(id) {
            Some(conversation) => conversation,
            None => {
                self.conversations.refresh().await?;
                self.conversations
                    .find(id)
                    .ok_or_else(|| AtriumError::NotFound {
                        entity: "conversation",
                        id: id.to_string(),
                    })?
            }
        };

        if let Some(previous) = self.active.take() {
            debug!(conversation_id = %previous.conversation.id, "deactivating conversation");
            previous.close().await;
        }

        let channel = MessageChannel::open(
            Arc::clone(&self.backend),
            conversation.id.clone(),
            self.chat.history_limit,
        )
        .await;
        let coordinator = RequestStatusCoordinator::from_config(
            conversation.id.clone(),
            Arc::clone(&self.backend),
            Arc::clone(&self.dispatcher),
            &self.chat,
        );
        coordinator.observe_arrivals(channel.subscribe_arrivals());
        if let Err(e) = coordinator.resume().await {
            debug!(error = %e, "starting without request status");
        }

        if conversation.is_department() {
            self.settings.fetch_settings(&conversation.id).await;
        }
        self.mode = conversation
            .department
            .clone()
            .unwrap_or_else(|| self.chat.default_mode.clone());

        info!(
            conversation_id = %conversation.id,
            scope = %conversation.scope,
            "conversation activated"
        );
        self.active = Some(ActiveConversation {
            conversation,
            channel,
            coordinator,
        });
        Ok(())
    }

    /// Send a message in the active conversation and start tracking its request.
    pub async fn send(&self, content: &str) -> Result<Dispatch, AtriumError> {
        let active = self.require_active()?;
        let conversation_id = &active.conversation.id;

        if active.conversation.is_department()
            && self.conversations.is_member(conversation_id) == Some(false)
        {
            return Err(AtriumError::NotMember {
                conversation_id: conversation_id.to_string(),
            });
        }
        if !self.chat.allow_send_while_pending && active.coordinator.snapshot().is_pending() {
            return Err(AtriumError::RequestPending {
                conversation_id: conversation_id.to_string(),
            });
        }

        let dispatch = self
            .dispatcher
            .send(conversation_id, content, &self.mode)
            .await?;
        active
            .coordinator
            .start_polling(Some(dispatch.request_id.clone()));
        Ok(dispatch)
    }

    /// Retry the active conversation's failed request. `false` if there is none.
    pub async fn retry(&self) -> Result<bool, AtriumError> {
        self.require_active()?.coordinator.retry().await
    }

    /// Create a conversation and switch to it.
    pub async fn create_conversation(
        &mut self,
        input: NewConversation,
    ) -> Result<ConversationId, AtriumError> {
        let id = self.conversations.create_conversation(input).await?;
        self.activate(&id).await?;
        Ok(id)
    }

    pub async fn join(&self, id: &ConversationId) -> Result<(), AtriumError> {
        self.conversations.join_department_conversation(id).await
    }

    /// Delete a conversation, falling back to the personal conversation when
    /// the active one is removed.
    pub async fn delete(&mut self, id: &ConversationId) -> Result<bool, AtriumError> {
        let deleted = self.conversations.delete_conversation(id).await?;
        let was_active = self
            .active_conversation()
            .is_some_and(|active| &active.id == id);
        if deleted && was_active {
            if let Some(previous) = self.active.take() {
                previous.close().await;
            }
            let personal = self.conversations.get_or_create_personal().await?;
            if let Err(e) = self.conversations.list_conversations().await {
                debug!(error = %e, "conversation list refresh failed");
            }
            self.activate(&personal.id).await?;
        }
        Ok(deleted)
    }

    /// Override the mode attached to outgoing messages.
    pub fn set_mode(&mut self, mode: &str) -> Result<(), AtriumError> {
        let mode = mode.trim();
        if mode.is_empty() {
            return Err(AtriumError::Validation("mode must not be empty".into()));
        }
        self.mode = mode.to_string();
        Ok(())
    }

    pub fn messages(&self) -> Vec<Message> {
        self.active
            .as_ref()
            .map(|a| a.channel.messages())
            .unwrap_or_default()
    }

    pub fn message_list(&self) -> Option<MessageListSnapshot> {
        self.active.as_ref().map(|a| a.channel.snapshot())
    }

    pub fn subscribe_messages(&self) -> Option<watch::Receiver<MessageListSnapshot>> {
        self.active.as_ref().map(|a| a.channel.subscribe())
    }

    pub fn status(&self) -> StatusSnapshot {
        self.active
            .as_ref()
            .map(|a| a.coordinator.snapshot())
            .unwrap_or_default()
    }

    pub fn subscribe_status(&self) -> Option<watch::Receiver<StatusSnapshot>> {
        self.active.as_ref().map(|a| a.coordinator.subscribe())
    }

    pub fn banner(&self) -> Option<StatusBanner> {
        self.status().banner()
    }

    /// Wait until the active request is no longer pending.
    ///
    /// Returns `false` if it is still pending after `timeout`, which is also
    /// what happens once polling gives up.
    pub async fn wait_until_settled(&self, timeout: Duration) -> bool {
        let Some(mut status) = self.subscribe_status() else {
            return true;
        };
        matches!(
            tokio::time::timeout(timeout, status.wait_for(|s| !s.is_pending())).await,
            Ok(Ok(_))
        )
    }

    /// Authoritative settings for the active department conversation.
    pub async fn active_settings(&self) -> Result<GroupAgentSettings, AtriumError> {
        let active = self.require_active()?;
        if !active.conversation.is_department() {
            return Err(AtriumError::Validation(
                "agent settings apply to department conversations only".into(),
            ));
        }
        Ok(self.settings.fetch_settings(&active.conversation.id).await)
    }

    pub async fn update_active_settings(
        &self,
        patch: &GroupSettingsPatch,
    ) -> Result<GroupAgentSettings, AtriumError> {
        let active = self.require_active()?;
        if !active.conversation.is_department() {
            return Err(AtriumError::Validation(
                "agent settings apply to department conversations only".into(),
            ));
        }
        self.settings
            .update_settings(&active.conversation.id, patch)
            .await
    }

    /// Tear down the active conversation.
    pub async fn close(&mut self) {
        if let Some(active) = self.active.take() {
            active.close().await;
        }
    }
}
