// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`ChatBackend`] trait.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use atrium_config::model::{AgentConfig, AtriumConfig};
use atrium_core::types::{
    ChatRequest, Conversation, ConversationId, ConversationScope, DepartmentConversation,
    GroupAgentSettings, GroupSettingsPatch, GroupSettingsResponse, Message, MessageId,
    NewConversation, RequestId, RequestStatus, Sender, UserId,
};
use atrium_core::{
    AdapterType, AtriumError, ChatBackend, HealthStatus, MessageSubscription, PluginAdapter,
};

use crate::database::{Database, map_tr_err};
use crate::queries::conversations::JoinOutcome;
use crate::queries::requests::StatusUpdate;
use crate::queries::{conversations, messages, requests, settings};

/// Capacity of the message-insert fan-out.
const INSERT_BROADCAST_BUFFER: usize = 1024;

/// SQLite-backed [`ChatBackend`] bound to one user.
///
/// Sessions for other users share the database and the insert fan-out via
/// [`SqliteBackend::for_user`]. Worker-side operations (status updates and
/// assistant replies) are inherent methods, not part of the client trait.
#[derive(Clone)]
pub struct SqliteBackend {
    db: Arc<Database>,
    user_id: UserId,
    agent: AgentConfig,
    inserts: broadcast::Sender<Message>,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Open the configured database and bind a session to `identity.user_id`.
    pub async fn open(config: &AtriumConfig) -> Result<Self, AtriumError> {
        let db = Database::open_with(&config.storage.database_path, config.storage.wal_mode).await?;
        info!(
            path = %config.storage.database_path,
            user_id = %config.identity.user_id,
            "sqlite backend ready"
        );
        Ok(Self::with_database(
            db,
            UserId::from(config.identity.user_id.as_str()),
            config.agent.clone(),
        ))
    }

    /// Wrap an already opened database.
    pub fn with_database(db: Database, user_id: UserId, agent: AgentConfig) -> Self {
        let (inserts, _) = broadcast::channel(INSERT_BROADCAST_BUFFER);
        Self {
            db: Arc::new(db),
            user_id,
            agent,
            inserts,
        }
    }

    /// A session for another user over the same database and live feed.
    pub fn for_user(&self, user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            ..self.clone()
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // --- Worker-side operations ---

    pub async fn get_request(&self, id: &RequestId) -> Result<Option<ChatRequest>, AtriumError> {
        requests::get_request(&self.db, id).await
    }

    pub async fn get_message(&self, id: &MessageId) -> Result<Option<Message>, AtriumError> {
        messages::get_message(&self.db, id).await
    }

    /// Persist an assistant message and publish it to live subscribers.
    pub async fn post_assistant_message(
        &self,
        conversation_id: &ConversationId,
        content: &str,
        mode: &str,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Message, AtriumError> {
        let message = Message {
            id: MessageId::generate(),
            conversation_id: conversation_id.clone(),
            sender: Sender::Assistant,
            content: content.to_string(),
            mode: mode.to_string(),
            metadata,
            created_at: Utc::now(),
        };
        self.insert_and_publish(&message).await?;
        Ok(message)
    }

    /// Move a request forward. Regressions and writes to terminal requests are rejected.
    pub async fn update_request_status(
        &self,
        id: &RequestId,
        status: RequestStatus,
        error: Option<String>,
    ) -> Result<(), AtriumError> {
        match requests::update_status(&self.db, id, status, error).await? {
            StatusUpdate::Applied => {
                debug!(request_id = %id, %status, "request status updated");
                Ok(())
            }
            StatusUpdate::Missing => Err(AtriumError::NotFound {
                entity: "request",
                id: id.to_string(),
            }),
            StatusUpdate::Rejected { current } => Err(AtriumError::Validation(format!(
                "request {id} cannot move from {current} to {status}"
            ))),
        }
    }

    async fn insert_and_publish(&self, message: &Message) -> Result<(), AtriumError> {
        messages::insert_message(&self.db, message).await?;
        // No receivers simply means nobody is watching any conversation.
        let _ = self.inserts.send(message.clone());
        Ok(())
    }

    /// Resolve a conversation the current user may write to.
    async fn writable_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Conversation, AtriumError> {
        let not_found = || AtriumError::NotFound {
            entity: "conversation",
            id: id.to_string(),
        };
        let conversation = conversations::get_conversation(&self.db, id)
            .await?
            .ok_or_else(not_found)?;
        match conversation.scope {
            ConversationScope::Personal => {
                if conversation.owner != self.user_id {
                    return Err(not_found());
                }
            }
            ConversationScope::Department => {
                if !conversations::is_member(&self.db, id, &self.user_id).await? {
                    return Err(AtriumError::NotMember {
                        conversation_id: id.to_string(),
                    });
                }
            }
        }
        Ok(conversation)
    }

    /// Resolve a department conversation for settings access, or explain why not.
    async fn settings_target(&self, id: &ConversationId) -> Result<Result<(), String>, AtriumError> {
        Ok(match conversations::get_conversation(&self.db, id).await? {
            None => Err(format!("conversation {id} not found")),
            Some(c) if !c.is_department() => {
                Err("group agent settings only apply to department conversations".to_string())
            }
            Some(_) => Ok(()),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Backend
    }

    async fn health_check(&self) -> Result<HealthStatus, AtriumError> {
        self.db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), AtriumError> {
        self.db.checkpoint().await?;
        debug!("shutdown: WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl ChatBackend for SqliteBackend {
    async fn get_or_create_personal_conversation(&self) -> Result<Conversation, AtriumError> {
        conversations::get_or_create_personal(&self.db, &self.user_id).await
    }

    async fn list_conversations(&self, limit: usize) -> Result<Vec<Conversation>, AtriumError> {
        conversations::list_personal(&self.db, &self.user_id, limit).await
    }

    async fn list_department_conversations(
        &self,
    ) -> Result<Vec<DepartmentConversation>, AtriumError> {
        conversations::list_department(&self.db, &self.user_id).await
    }

    async fn create_conversation(
        &self,
        input: NewConversation,
    ) -> Result<ConversationId, AtriumError> {
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
        conversations::insert_conversation(&self.db, &conversation).await?;
        info!(conversation_id = %conversation.id, scope = %conversation.scope, "conversation created");
        Ok(conversation.id)
    }

    async fn join_department_conversation(&self, id: &ConversationId) -> Result<(), AtriumError> {
        match conversations::add_member(&self.db, id, &self.user_id).await? {
            JoinOutcome::Joined => {
                info!(conversation_id = %id, user_id = %self.user_id, "joined conversation");
                Ok(())
            }
            JoinOutcome::AlreadyMember => Ok(()),
            JoinOutcome::Missing => Err(AtriumError::NotFound {
                entity: "conversation",
                id: id.to_string(),
            }),
            JoinOutcome::NotDepartment => Err(AtriumError::Validation(format!(
                "conversation {id} is not a department conversation"
            ))),
        }
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<bool, AtriumError> {
        let deleted = conversations::delete_owned(&self.db, id, &self.user_id).await?;
        if deleted {
            info!(conversation_id = %id, "conversation deleted");
        }
        Ok(deleted)
    }

    async fn list_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, AtriumError> {
        messages::recent_messages(&self.db, conversation_id, limit).await
    }

    async fn subscribe_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<MessageSubscription, AtriumError> {
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
        self.writable_conversation(conversation_id).await?;
        let mut metadata = serde_json::Map::new();
        metadata.insert(
            "user_id".to_string(),
            serde_json::Value::String(self.user_id.to_string()),
        );
        let message = Message {
            id: MessageId::generate(),
            conversation_id: conversation_id.clone(),
            sender: Sender::User,
            content: content.to_string(),
            mode: mode.to_string(),
            metadata,
            created_at: Utc::now(),
        };
        self.insert_and_publish(&message).await?;
        Ok(message.id)
    }

    async fn create_chat_request(
        &self,
        conversation_id: &ConversationId,
        mode: &str,
        latest_user_message_id: &MessageId,
    ) -> Result<RequestId, AtriumError> {
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
        requests::insert_request(&self.db, &request).await?;
        debug!(request_id = %request.id, conversation_id = %conversation_id, "request queued");
        Ok(request.id)
    }

    async fn get_latest_request_status(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<ChatRequest>, AtriumError> {
        requests::latest_for_user(&self.db, conversation_id, &self.user_id).await
    }

    async fn retry_chat_request(&self, request_id: &RequestId) -> Result<(), AtriumError> {
        match requests::rearm_failed(&self.db, request_id).await? {
            StatusUpdate::Applied => {
                info!(request_id = %request_id, "request re-armed");
                Ok(())
            }
            StatusUpdate::Missing => Err(AtriumError::NotFound {
                entity: "request",
                id: request_id.to_string(),
            }),
            StatusUpdate::Rejected { current } => Err(AtriumError::Validation(format!(
                "only failed requests can be retried, request {request_id} is {current}"
            ))),
        }
    }

    async fn get_group_settings(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<GroupSettingsResponse, AtriumError> {
        if let Err(reason) = self.settings_target(conversation_id).await? {
            warn!(conversation_id = %conversation_id, %reason, "settings fetch refused");
            return Ok(GroupSettingsResponse {
                settings: None,
                error: Some(reason),
            });
        }
        Ok(GroupSettingsResponse {
            settings: settings::get_settings(&self.db, conversation_id).await?,
            error: None,
        })
    }

    async fn set_group_settings(
        &self,
        conversation_id: &ConversationId,
        patch: &GroupSettingsPatch,
    ) -> Result<(), AtriumError> {
        patch.validate()?;
        self.settings_target(conversation_id)
            .await?
            .map_err(AtriumError::Validation)?;

        let mut current = match settings::get_settings(&self.db, conversation_id).await? {
            Some(existing) => existing,
            None => GroupAgentSettings::defaults(
                self.agent.default_name.as_str(),
                self.agent.default_model.as_str(),
            ),
        };
        patch.apply_to(&mut current);
        settings::upsert_settings(&self.db, conversation_id, &current).await?;
        info!(conversation_id = %conversation_id, "group agent settings saved");
        Ok(())
    }
}
