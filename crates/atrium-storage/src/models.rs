// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversions between SQLite rows and the core data model.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::Type;

use atrium_core::types::{
    ChatRequest, Conversation, GroupAgentSettings, Message,
};

/// Column list matching [`conversation_from_row`].
pub(crate) const CONVERSATION_COLUMNS: &str =
    "id, title, scope, department, owner_id, created_at, updated_at, last_message_at";

/// Column list matching [`message_from_row`].
pub(crate) const MESSAGE_COLUMNS: &str =
    "id, conversation_id, sender, content, mode, metadata, created_at";

/// Column list matching [`request_from_row`].
pub(crate) const REQUEST_COLUMNS: &str = "id, conversation_id, user_id, mode, \
     latest_user_message_id, status, error, created_at, updated_at";

/// Column list matching [`settings_from_row`].
pub(crate) const SETTINGS_COLUMNS: &str = "agent_name, model, auto_mode, intervention_level, \
     cooldown_minutes, last_intervention_at";

/// Fixed-width UTC timestamp; lexical order equals chronological order.
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(_) => get_ts(row, idx).map(Some),
    }
}

fn get_enum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

pub(crate) fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get::<_, String>(0)?.into(),
        title: row.get(1)?,
        scope: get_enum(row, 2)?,
        department: row.get(3)?,
        owner: row.get::<_, String>(4)?.into(),
        created_at: get_ts(row, 5)?,
        updated_at: get_ts(row, 6)?,
        last_message_at: get_opt_ts(row, 7)?,
    })
}

pub(crate) fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let raw_metadata: String = row.get(5)?;
    let metadata = serde_json::from_str(&raw_metadata).map_err(|e| conversion_error(5, e))?;
    Ok(Message {
        id: row.get::<_, String>(0)?.into(),
        conversation_id: row.get::<_, String>(1)?.into(),
        sender: get_enum(row, 2)?,
        content: row.get(3)?,
        mode: row.get(4)?,
        metadata,
        created_at: get_ts(row, 6)?,
    })
}

pub(crate) fn request_from_row(row: &Row<'_>) -> rusqlite::Result<ChatRequest> {
    Ok(ChatRequest {
        id: row.get::<_, String>(0)?.into(),
        conversation_id: row.get::<_, String>(1)?.into(),
        user_id: row.get::<_, String>(2)?.into(),
        mode: row.get(3)?,
        latest_user_message_id: row.get::<_, String>(4)?.into(),
        status: get_enum(row, 5)?,
        error: row.get(6)?,
        created_at: get_ts(row, 7)?,
        updated_at: get_ts(row, 8)?,
    })
}

pub(crate) fn settings_from_row(row: &Row<'_>) -> rusqlite::Result<GroupAgentSettings> {
    Ok(GroupAgentSettings {
        exists: true,
        agent_name: row.get(0)?,
        model: row.get(1)?,
        auto_mode: row.get(2)?,
        intervention_level: get_enum(row, 3)?,
        cooldown_minutes: row.get(4)?,
        last_intervention_at: get_opt_ts(row, 5)?,
    })
}
