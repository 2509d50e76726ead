// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message inserts and history reads.

use atrium_core::AtriumError;
use atrium_core::types::{ConversationId, Message, MessageId};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{MESSAGE_COLUMNS, format_ts, message_from_row};

/// Insert a message and bump the conversation's activity timestamps.
pub async fn insert_message(db: &Database, message: &Message) -> Result<(), AtriumError> {
    let msg = message.clone();
    let metadata = serde_json::Value::Object(msg.metadata.clone()).to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let created = format_ts(&msg.created_at);
            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender, content, mode, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    msg.id.as_str(),
                    msg.conversation_id.as_str(),
                    msg.sender.to_string(),
                    msg.content,
                    msg.mode,
                    metadata,
                    created,
                ],
            )?;
            tx.execute(
                "UPDATE conversations SET last_message_at = ?2, updated_at = ?2 WHERE id = ?1",
                params![msg.conversation_id.as_str(), created],
            )?;
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}

/// The most recent `limit` messages of a conversation, returned oldest first.
///
/// Messages sharing a timestamp keep their insertion order.
pub async fn recent_messages(
    db: &Database,
    conversation_id: &ConversationId,
    limit: usize,
) -> Result<Vec<Message>, AtriumError> {
    let conversation_id = conversation_id.to_string();
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM (
                     SELECT rowid AS seq, {MESSAGE_COLUMNS} FROM messages
                     WHERE conversation_id = ?1
                     ORDER BY created_at DESC, seq DESC
                     LIMIT ?2
                 )
                 ORDER BY created_at ASC, seq ASC"
            ))?;
            let messages = stmt
                .query_map(params![conversation_id, limit], message_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_message(db: &Database, id: &MessageId) -> Result<Option<Message>, AtriumError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id],
                message_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}
