// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory backend for deterministic testing.
//!
//! `MockBackend` implements `ChatBackend` over plain collections. Tests can
//! inject failures and latency per operation, script what successive status
//! polls observe, deliver messages on the push path (including duplicates),
//! and count calls.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;

use atrium_core::types::{
    AdapterType, ChatRequest, Conversation, ConversationId, ConversationScope,
    DepartmentConversation, GroupAgentSettings, GroupSettingsPatch, GroupSettingsResponse,
    HealthStatus, Message, MessageId, NewConversation, RequestId, RequestStatus, Sender, UserId,
};
use atrium_core::{AtriumError, ChatBackend, MessageSubscription, PluginAdapter};

/// Every `ChatBackend` operation, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    GetOrCreatePersonal,
    ListConversations,
    ListDepartmentConversations,
    CreateConversation,
    JoinDepartmentConversation,
    DeleteConversation,
    ListMessages,
    SubscribeMessages,
    AddUserMessage,
    CreateChatRequest,
    GetLatestRequestStatus,
    RetryChatRequest,
    GetGroupSettings,
    SetGroupSettings,
}

#[derive(Default)]
struct State {
    conversations: Vec<Conversation>,
    members: HashSet<(ConversationId, UserId)>,
    messages: Vec<Message>,
    requests: Vec<ChatRequest>,
    settings: HashMap<ConversationId, GroupAgentSettings>,
    settings_error: Option<String>,
    status_script: VecDeque<RequestStatus>,
    failing: HashSet<BackendOp>,
    delays: HashMap<BackendOp, Duration>,
    calls: HashMap<BackendOp, usize>,
}

/// An in-memory `ChatBackend` bound to one user.
///
/// Clones and [`MockBackend::for_user`] sessions share state and the push feed.
#[derive(Clone)]
pub struct MockBackend {
    user_id: UserId,
    state: Arc<Mutex<State>>,
    inserts: broadcast::Sender<Message>,
}

impl MockBackend {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        let (inserts, _) = broadcast::channel(256);
        Self {
            user_id: user_id.into(),
            state: Arc::new(Mutex::new(State::default())),
            inserts,
        }
    }

    /// Another user's session over the same data.
    pub fn for_user(&self, user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            ..self.clone()
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call, apply injected latency, then injected failure.
    async fn enter(&self, op: BackendOp) -> Result<(), AtriumError> {
        let (delay, failing) = {
            let mut state = self.lock();
            *state.calls.entry(op).or_default() += 1;
            (state.delays.get(&op).copied(), state.failing.contains(&op))
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if failing {
            return Err(AtriumError::backend(format!("injected {op:?} failure")));
        }
        Ok(())
    }

    // --- Test controls ---

    /// Make every subsequent call of `op` fail with a backend error.
    pub fn fail(&self, op: BackendOp) {
        self.lock().failing.insert(op);
    }

    pub fn recover(&self, op: BackendOp) {
        self.lock().failing.remove(&op);
    }

    /// Delay every subsequent call of `op` by `delay` before it resolves.
    pub fn set_delay(&self, op: BackendOp, delay: Duration) {
        self.lock().delays.insert(op, delay);
    }

    pub fn calls(&self, op: BackendOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Statuses applied to the latest request by successive status polls.
    ///
    /// Each poll pops one entry; once exhausted the stored status is returned unchanged.
    pub fn script_statuses(&self, statuses: impl IntoIterator<Item = RequestStatus>) {
        self.lock().status_script.extend(statuses);
    }

    /// Overwrite a request's status as the worker would.
    pub fn set_request_status(&self, id: &RequestId, status: RequestStatus, error: Option<&str>) {
        let mut state = self.lock();
        if let Some(request) = state.requests.iter_mut().find(|r| &r.id == id) {
            request.status = status;
            request.error = error.map(str::to_string);
            request.updated_at = Utc::now();
        }
    }

    /// Drop every request of a conversation so polls observe "no request".
    pub fn remove_requests(&self, conversation_id: &ConversationId) {
        self.lock()
            .requests
            .retain(|r| &r.conversation_id != conversation_id);
    }

    /// Current user's latest request, without counting a call.
    pub fn latest_request(&self, conversation_id: &ConversationId) -> Option<ChatRequest> {
        let state = self.lock();
        latest_for(&state, conversation_id, &self.user_id).cloned()
    }

    /// Insert a conversation owned by the current user directly.
    pub fn seed_conversation(&self, title: &str, scope: ConversationScope) -> Conversation {
        let now = Utc::now();
        let conversation = Conversation {
            id: ConversationId::generate(),
            title: title.to_string(),
            scope,
            department: (scope == ConversationScope::Department).then(|| title.to_lowercase()),
            owner: self.user_id.clone(),
            created_at: now,
            updated_at: now,
            last_message_at: None,
        };
        let mut state = self.lock();
        if scope == ConversationScope::Department {
            state
                .members
                .insert((conversation.id.clone(), self.user_id.clone()));
        }
        state.conversations.push(conversation.clone());
        conversation
    }

    /// Store a message without announcing it on the push path.
    pub fn insert_history(&self, message: Message) {
        self.lock().messages.push(message);
    }

    /// Announce a message on the push path only. Repeating a delivery models
    /// a message reported by more than one path.
    pub fn push(&self, message: Message) {
        let _ = self.inserts.send(message);
    }

    /// Store an assistant reply and announce it, as the worker would.
    pub fn post_assistant_message(&self, conversation_id: &ConversationId, content: &str) -> Message {
        let message = Self::message(conversation_id, Sender::Assistant, content);
        self.lock().messages.push(message.clone());
        self.push(message.clone());
        message
    }

    /// Build a message with a fresh id and the current time.
    pub fn message(conversation_id: &ConversationId, sender: Sender, content: &str) -> Message {
        Message {
            id: MessageId::generate(),
            conversation_id: conversation_id.clone(),
            sender,
            content: content.to_string(),
            mode: "general".to_string(),
            metadata: Default::default(),
            created_at: Utc::now(),
        }
    }

    /// Stored messages of a conversation in insertion order.
    pub fn stored_messages(&self, conversation_id: &ConversationId) -> Vec<Message> {
        self.lock()
            .messages
            .iter()
            .filter(|m| &m.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    /// Report a domain-level error on every settings fetch.
    pub fn set_settings_error(&self, error: Option<&str>) {
        self.lock().settings_error = error.map(str::to_string);
    }

    pub fn settings_row(&self, conversation_id: &ConversationId) -> Option<GroupAgentSettings> {
        self.lock().settings.get(conversation_id).cloned()
    }

    /// Number of live push subscriptions across all conversations.
    pub fn subscriber_count(&self) -> usize {
        self.inserts.receiver_count()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new("user-1")
    }
}

fn latest_for<'a>(
    state: &'a State,
    conversation_id: &ConversationId,
    user_id: &UserId,
) -> Option<&'a ChatRequest> {
    state
        .requests
        .iter()
        .rev()
        .find(|r| &r.conversation_id == conversation_id && &r.user_id == user_id)
}

#[async_trait]
impl PluginAdapter for MockBackend {
    fn name(&self) -> &str {
        "mock-backend"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Backend
    }

    async fn health_check(&self) -> Result<HealthStatus, AtriumError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), AtriumError> {
        Ok(())
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn get_or_create_personal_conversation(&self) -> Result<Conversation, AtriumError> {
        self.enter(BackendOp::GetOrCreatePersonal).await?;
        let mut state = self.lock();
        if let Some(existing) = state
            .conversations
            .iter()
            .find(|c| c.owner == self.user_id && c.scope == ConversationScope::Personal)
        {
            return Ok(existing.clone());
        }
        let now = Utc::now();
        let conversation = Conversation {
            id: ConversationId::generate(),
            title: "Personal".to_string(),
            scope: ConversationScope::Personal,
            department: None,
            owner: self.user_id.clone(),
            created_at: now,
            updated_at: now,
            last_message_at: None,
        };
        state.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn list_conversations(&self, limit: usize) -> Result<Vec<Conversation>, AtriumError> {
        self.enter(BackendOp::ListConversations).await?;
        let state = self.lock();
        let mut personal: Vec<_> = state
            .conversations
            .iter()
            .filter(|c| c.owner == self.user_id && c.scope == ConversationScope::Personal)
            .cloned()
            .collect();
        personal.sort_by_key(|c| std::cmp::Reverse(c.recency()));
        personal.truncate(limit);
        Ok(personal)
    }

    async fn list_department_conversations(
        &self,
    ) -> Result<Vec<DepartmentConversation>, AtriumError> {
        self.enter(BackendOp::ListDepartmentConversations).await?;
        let state = self.lock();
        Ok(state
            .conversations
            .iter()
            .filter(|c| c.is_department())
            .map(|c| DepartmentConversation {
                conversation: c.clone(),
                is_member: state
                    .members
                    .contains(&(c.id.clone(), self.user_id.clone())),
            })
            .collect())
    }

    async fn create_conversation(
        &self,
        input: NewConversation,
    ) -> Result<ConversationId, AtriumError> {
        self.enter(BackendOp::CreateConversation).await?;
        let input = input.normalized()?;
        let now = Utc::now();
        let conversation = Conversation {
            id: ConversationId::generate(),
            title: input.title,
            scope: input.scope,
            department: input.department,
            owner: self.user_id.clone(),
            created_at: now,
            updated_at: now,
            last_message_at: None,
        };
        let id = conversation.id.clone();
        let mut state = self.lock();
        if conversation.is_department() {
            state.members.insert((id.clone(), self.user_id.clone()));
        }
        state.conversations.push(conversation);
        Ok(id)
    }

    async fn join_department_conversation(&self, id: &ConversationId) -> Result<(), AtriumError> {
        self.enter(BackendOp::JoinDepartmentConversation).await?;
        let mut state = self.lock();
        let scope = state
            .conversations
            .iter()
            .find(|c| &c.id == id)
            .map(|c| c.scope);
        match scope {
            None => Err(AtriumError::NotFound {
                entity: "conversation",
                id: id.to_string(),
            }),
            Some(ConversationScope::Personal) => Err(AtriumError::Validation(format!(
                "conversation {id} is not a department conversation"
            ))),
            Some(ConversationScope::Department) => {
                state.members.insert((id.clone(), self.user_id.clone()));
                Ok(())
            }
        }
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<bool, AtriumError> {
        self.enter(BackendOp::DeleteConversation).await?;
        let mut state = self.lock();
        let before = state.conversations.len();
        state
            .conversations
            .retain(|c| !(&c.id == id && c.owner == self.user_id));
        if state.conversations.len() == before {
            return Ok(false);
        }
        state.messages.retain(|m| &m.conversation_id != id);
        state.requests.retain(|r| &r.conversation_id != id);
        state.members.retain(|(c, _)| c != id);
        state.settings.remove(id);
        Ok(true)
    }

    async fn list_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, AtriumError> {
        self.enter(BackendOp::ListMessages).await?;
        let mut messages = self.stored_messages(conversation_id);
        messages.sort_by_key(|m| m.created_at);
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.split_off(skip))
    }

    async fn subscribe_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<MessageSubscription, AtriumError> {
        self.enter(BackendOp::SubscribeMessages).await?;
        Ok(MessageSubscription::from_broadcast(
            conversation_id.clone(),
            self.inserts.subscribe(),
        ))
    }

    async fn add_user_message(
        &self,
        conversation_id: &ConversationId,
        content: &str,
        mode: &str,
    ) -> Result<MessageId, AtriumError> {
        self.enter(BackendOp::AddUserMessage).await?;
        let message = {
            let mut state = self.lock();
            let conversation = state
                .conversations
                .iter()
                .find(|c| &c.id == conversation_id)
                .ok_or_else(|| AtriumError::NotFound {
                    entity: "conversation",
                    id: conversation_id.to_string(),
                })?;
            if conversation.is_department()
                && !state
                    .members
                    .contains(&(conversation_id.clone(), self.user_id.clone()))
            {
                return Err(AtriumError::NotMember {
                    conversation_id: conversation_id.to_string(),
                });
            }
            let mut message = Self::message(conversation_id, Sender::User, content);
            message.mode = mode.to_string();
            state.messages.push(message.clone());
            message
        };
        self.push(message.clone());
        Ok(message.id)
    }

    async fn create_chat_request(
        &self,
        conversation_id: &ConversationId,
        mode: &str,
        latest_user_message_id: &MessageId,
    ) -> Result<RequestId, AtriumError> {
        self.enter(BackendOp::CreateChatRequest).await?;
        let now = Utc::now();
        let request = ChatRequest {
            id: RequestId::generate(),
            conversation_id: conversation_id.clone(),
            user_id: self.user_id.clone(),
            mode: mode.to_string(),
            latest_user_message_id: latest_user_message_id.clone(),
            status: RequestStatus::Queued,
            error: None,
            created_at: now,
            updated_at: now,
        };
        let id = request.id.clone();
        self.lock().requests.push(request);
        Ok(id)
    }

    async fn get_latest_request_status(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<ChatRequest>, AtriumError> {
        self.enter(BackendOp::GetLatestRequestStatus).await?;
        let mut state = self.lock();
        let Some(id) = latest_for(&state, conversation_id, &self.user_id).map(|r| r.id.clone())
        else {
            return Ok(None);
        };
        let next = state.status_script.pop_front();
        let request = state
            .requests
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| AtriumError::Internal("request vanished".into()))?;
        if let Some(status) = next {
            request.status = status;
            request.error = (status == RequestStatus::Error).then(|| "scripted failure".into());
            request.updated_at = Utc::now();
        }
        Ok(Some(request.clone()))
    }

    async fn retry_chat_request(&self, request_id: &RequestId) -> Result<(), AtriumError> {
        self.enter(BackendOp::RetryChatRequest).await?;
        let mut state = self.lock();
        let request = state
            .requests
            .iter_mut()
            .find(|r| &r.id == request_id)
            .ok_or_else(|| AtriumError::NotFound {
                entity: "request",
                id: request_id.to_string(),
            })?;
        if request.status != RequestStatus::Error {
            return Err(AtriumError::Validation(format!(
                "only failed requests can be retried, request {request_id} is {}",
                request.status
            )));
        }
        request.status = RequestStatus::Queued;
        request.error = None;
        request.updated_at = Utc::now();
        Ok(())
    }

    async fn get_group_settings(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<GroupSettingsResponse, AtriumError> {
        self.enter(BackendOp::GetGroupSettings).await?;
        let state = self.lock();
        if let Some(error) = &state.settings_error {
            return Ok(GroupSettingsResponse {
                settings: None,
                error: Some(error.clone()),
            });
        }
        Ok(GroupSettingsResponse {
            settings: state.settings.get(conversation_id).cloned(),
            error: None,
        })
    }

    async fn set_group_settings(
        &self,
        conversation_id: &ConversationId,
        patch: &GroupSettingsPatch,
    ) -> Result<(), AtriumError> {
        self.enter(BackendOp::SetGroupSettings).await?;
        patch.validate()?;
        let mut state = self.lock();
        let settings = state
            .settings
            .entry(conversation_id.clone())
            .or_insert_with(GroupAgentSettings::default);
        patch.apply_to(settings);
        Ok(())
    }
}
