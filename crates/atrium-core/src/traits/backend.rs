// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend adapter trait for the hosted chat data service.

use async_trait::async_trait;

use crate::error::AtriumError;
use crate::subscription::MessageSubscription;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    ChatRequest, Conversation, ConversationId, DepartmentConversation, GroupSettingsPatch,
    GroupSettingsResponse, Message, MessageId, NewConversation, RequestId,
};

/// Remote procedures the chat orchestration layer consumes.
///
/// A backend instance is bound to one authenticated user; "current user" in
/// the method docs refers to that user.
#[async_trait]
pub trait ChatBackend: PluginAdapter {
    // --- Conversations ---

    /// Return the current user's personal conversation, creating it on first call.
    async fn get_or_create_personal_conversation(&self) -> Result<Conversation, AtriumError>;

    /// Personal conversations of the current user, most recent first.
    async fn list_conversations(&self, limit: usize) -> Result<Vec<Conversation>, AtriumError>;

    /// Every department conversation with the current user's membership flag.
    async fn list_department_conversations(
        &self,
    ) -> Result<Vec<DepartmentConversation>, AtriumError>;

    /// Create a conversation owned by the current user.
    async fn create_conversation(
        &self,
        input: NewConversation,
    ) -> Result<ConversationId, AtriumError>;

    /// Add the current user to a department conversation. Joining twice is a no-op.
    async fn join_department_conversation(&self, id: &ConversationId) -> Result<(), AtriumError>;

    /// Delete a conversation and its messages. Returns `false` if nothing was deleted.
    async fn delete_conversation(&self, id: &ConversationId) -> Result<bool, AtriumError>;

    // --- Messages ---

    /// The most recent `limit` messages of a conversation, oldest first.
    async fn list_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, AtriumError>;

    /// Open a live subscription delivering messages inserted into a conversation.
    async fn subscribe_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<MessageSubscription, AtriumError>;

    /// Persist a user message and return its id.
    async fn add_user_message(
        &self,
        conversation_id: &ConversationId,
        content: &str,
        mode: &str,
    ) -> Result<MessageId, AtriumError>;

    // --- Requests ---

    /// Create a queued processing request for the given user message.
    async fn create_chat_request(
        &self,
        conversation_id: &ConversationId,
        mode: &str,
        latest_user_message_id: &MessageId,
    ) -> Result<RequestId, AtriumError>;

    /// The current user's most recent request in a conversation, if any.
    async fn get_latest_request_status(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<ChatRequest>, AtriumError>;

    /// Re-arm a failed request for another processing cycle.
    async fn retry_chat_request(&self, request_id: &RequestId) -> Result<(), AtriumError>;

    // --- Group agent settings ---

    /// Fetch the autonomous-agent settings row for a department conversation.
    async fn get_group_settings(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<GroupSettingsResponse, AtriumError>;

    /// Write the present fields of `patch`, creating the row if needed.
    async fn set_group_settings(
        &self,
        conversation_id: &ConversationId,
        patch: &GroupSettingsPatch,
    ) -> Result<(), AtriumError>;
}
