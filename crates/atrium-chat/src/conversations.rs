// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation list visible to the current user.
//!
//! The store caches the personal conversation, the recent personal list and
//! the department directory, and publishes every change through a
//! `tokio::sync::watch` channel so a view can re-render without polling.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use atrium_core::{
    AtriumError, ChatBackend, Conversation, ConversationId, DepartmentConversation,
    NewConversation,
};

/// Snapshot of everything the store knows about the user's conversations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationListing {
    pub personal: Option<Conversation>,
    /// Personal conversations, most recent first.
    pub conversations: Vec<Conversation>,
    pub departments: Vec<DepartmentConversation>,
    /// Message of the most recent failed operation, cleared by a successful load.
    pub last_error: Option<String>,
}

impl ConversationListing {
    /// Look a conversation up in any cached list.
    pub fn find(&self, id: &ConversationId) -> Option<&Conversation> {
        self.personal
            .iter()
            .chain(self.conversations.iter())
            .chain(self.departments.iter().map(|d| &d.conversation))
            .find(|c| &c.id == id)
    }

    /// Cached membership flag for a department conversation.
    pub fn is_member(&self, id: &ConversationId) -> Option<bool> {
        self.departments
            .iter()
            .find(|d| &d.conversation.id == id)
            .map(|d| d.is_member)
    }
}

/// Caches and mutates the current user's conversations through a [`ChatBackend`].
pub struct ConversationStore {
    backend: Arc<dyn ChatBackend>,
    list_limit: usize,
    state: watch::Sender<ConversationListing>,
}

impl ConversationStore {
    pub fn new(backend: Arc<dyn ChatBackend>, list_limit: usize) -> Self {
        let (state, _) = watch::channel(ConversationListing::default());
        Self {
            backend,
            list_limit,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationListing> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ConversationListing {
        self.state.borrow().clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.borrow().last_error.clone()
    }

    pub fn find(&self, id: &ConversationId) -> Option<Conversation> {
        self.state.borrow().find(id).cloned()
    }

    pub fn is_member(&self, id: &ConversationId) -> Option<bool> {
        self.state.borrow().is_member(id)
    }

    /// Record a failure in `last_error` and hand it back to the caller.
    fn capture<T>(&self, operation: &str, result: Result<T, AtriumError>) -> Result<T, AtriumError> {
        if let Err(e) = &result {
            warn!(operation, error = %e, "conversation operation failed");
            let message = e.to_string();
            self.state.send_modify(|s| s.last_error = Some(message));
        }
        result
    }

    /// The user's personal conversation, created by the backend on first use.
    pub async fn get_or_create_personal(&self) -> Result<Conversation, AtriumError> {
        let result = self.backend.get_or_create_personal_conversation().await;
        let conversation = self.capture("get_or_create_personal", result)?;
        self.state.send_modify(|s| {
            s.personal = Some(conversation.clone());
            s.last_error = None;
        });
        Ok(conversation)
    }

    /// Reload the recent personal conversations, bounded by the configured limit.
    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, AtriumError> {
        let result = self.backend.list_conversations(self.list_limit).await;
        let conversations = self.capture("list_conversations", result)?;
        self.state.send_modify(|s| {
            s.conversations = conversations.clone();
            s.last_error = None;
        });
        Ok(conversations)
    }

    pub async fn list_department_conversations(
        &self,
    ) -> Result<Vec<DepartmentConversation>, AtriumError> {
        let result = self.backend.list_department_conversations().await;
        let departments = self.capture("list_department_conversations", result)?;
        self.state.send_modify(|s| {
            s.departments = departments.clone();
            s.last_error = None;
        });
        Ok(departments)
    }

    /// Reload both lists. Both loads are attempted; the first error is returned.
    pub async fn refresh(&self) -> Result<(), AtriumError> {
        let personal = self.list_conversations().await;
        let departments = self.list_department_conversations().await;
        personal?;
        departments?;
        debug!("conversation lists refreshed");
        Ok(())
    }

    /// Create a conversation and refresh the lists.
    ///
    /// Invalid input is rejected before the backend is called. A failed
    /// refresh after a successful create is captured but does not fail the
    /// create.
    pub async fn create_conversation(
        &self,
        input: NewConversation,
    ) -> Result<ConversationId, AtriumError> {
        let input = self.capture("create_conversation", input.normalized())?;
        let scope = input.scope;
        let result = self.backend.create_conversation(input).await;
        let id = self.capture("create_conversation", result)?;
        info!(conversation_id = %id, %scope, "conversation created");

        if let Err(e) = self.refresh().await {
            debug!(error = %e, "refresh after create failed");
        }
        Ok(id)
    }

    /// Join a department conversation. Skips the backend when the cached
    /// listing already marks the user as a member.
    pub async fn join_department_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<(), AtriumError> {
        if self.is_member(id) == Some(true) {
            debug!(conversation_id = %id, "already a member, join skipped");
            return Ok(());
        }
        let result = self.backend.join_department_conversation(id).await;
        self.capture("join_department_conversation", result)?;
        self.state.send_modify(|s| {
            if let Some(entry) = s.departments.iter_mut().find(|d| &d.conversation.id == id) {
                entry.is_member = true;
            }
        });
        info!(conversation_id = %id, "joined department conversation");
        Ok(())
    }

    /// Delete a conversation. Returns whether the backend removed a row.
    pub async fn delete_conversation(&self, id: &ConversationId) -> Result<bool, AtriumError> {
        let result = self.backend.delete_conversation(id).await;
        let deleted = self.capture("delete_conversation", result)?;
        if deleted {
            self.state.send_modify(|s| {
                if s.personal.as_ref().is_some_and(|c| &c.id == id) {
                    s.personal = None;
                }
                s.conversations.retain(|c| &c.id != id);
                s.departments.retain(|d| &d.conversation.id != id);
            });
            info!(conversation_id = %id, "conversation deleted");
        }
        Ok(deleted)
    }
}
