// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat request lifecycle queries.

use atrium_core::AtriumError;
use atrium_core::types::{ChatRequest, ConversationId, RequestId, RequestStatus, UserId};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{REQUEST_COLUMNS, format_ts, request_from_row};

/// Result of a guarded status write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Applied,
    Missing,
    /// The write would have moved the request backwards; the row was left alone.
    Rejected { current: RequestStatus },
}

pub async fn insert_request(db: &Database, request: &ChatRequest) -> Result<(), AtriumError> {
    let r = request.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO chat_requests
                 (id, conversation_id, user_id, mode, latest_user_message_id, status, error,
                  created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    r.id.as_str(),
                    r.conversation_id.as_str(),
                    r.user_id.as_str(),
                    r.mode,
                    r.latest_user_message_id.as_str(),
                    r.status.to_string(),
                    r.error,
                    format_ts(&r.created_at),
                    format_ts(&r.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_request(db: &Database, id: &RequestId) -> Result<Option<ChatRequest>, AtriumError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {REQUEST_COLUMNS} FROM chat_requests WHERE id = ?1"),
                params![id],
                request_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// The most recently created request of `user` in a conversation.
pub async fn latest_for_user(
    db: &Database,
    conversation_id: &ConversationId,
    user: &UserId,
) -> Result<Option<ChatRequest>, AtriumError> {
    let conversation_id = conversation_id.to_string();
    let user = user.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {REQUEST_COLUMNS} FROM chat_requests
                     WHERE conversation_id = ?1 AND user_id = ?2
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT 1"
                ),
                params![conversation_id, user],
                request_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Move a request to `status`, refusing regressions and writes to terminal rows.
///
/// `error` is stored only for [`RequestStatus::Error`] and cleared otherwise.
pub async fn update_status(
    db: &Database,
    id: &RequestId,
    status: RequestStatus,
    error: Option<String>,
) -> Result<StatusUpdate, AtriumError> {
    let id = id.to_string();
    let error = if status == RequestStatus::Error {
        error
    } else {
        None
    };
    let now = format_ts(&chrono::Utc::now());
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let current: Option<String> = tx
                .query_row(
                    "SELECT status FROM chat_requests WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(current) = current else {
                return Ok(StatusUpdate::Missing);
            };
            let current: RequestStatus = current.parse().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
            if !current.can_transition_to(status) {
                return Ok(StatusUpdate::Rejected { current });
            }
            tx.execute(
                "UPDATE chat_requests SET status = ?2, error = ?3, updated_at = ?4 WHERE id = ?1",
                params![id, status.to_string(), error, now],
            )?;
            tx.commit()?;
            Ok(StatusUpdate::Applied)
        })
        .await
        .map_err(map_tr_err)
}

/// Put a failed request back into `queued` for another processing cycle.
pub async fn rearm_failed(db: &Database, id: &RequestId) -> Result<StatusUpdate, AtriumError> {
    let id = id.to_string();
    let now = format_ts(&chrono::Utc::now());
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE chat_requests SET status = 'queued', error = NULL, updated_at = ?2
                 WHERE id = ?1 AND status = 'error'",
                params![id, now],
            )?;
            if changed > 0 {
                return Ok(StatusUpdate::Applied);
            }
            let current: Option<String> = conn
                .query_row(
                    "SELECT status FROM chat_requests WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(match current.and_then(|s| s.parse().ok()) {
                Some(current) => StatusUpdate::Rejected { current },
                None => StatusUpdate::Missing,
            })
        })
        .await
        .map_err(map_tr_err)
}
