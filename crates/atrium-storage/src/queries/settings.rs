// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Group agent settings rows.

use atrium_core::AtriumError;
use atrium_core::types::{ConversationId, GroupAgentSettings};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{SETTINGS_COLUMNS, format_ts, settings_from_row};

pub async fn get_settings(
    db: &Database,
    conversation_id: &ConversationId,
) -> Result<Option<GroupAgentSettings>, AtriumError> {
    let conversation_id = conversation_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {SETTINGS_COLUMNS} FROM group_agent_settings WHERE conversation_id = ?1"
                ),
                params![conversation_id],
                settings_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or replace the settings row for a conversation.
pub async fn upsert_settings(
    db: &Database,
    conversation_id: &ConversationId,
    settings: &GroupAgentSettings,
) -> Result<(), AtriumError> {
    let conversation_id = conversation_id.to_string();
    let s = settings.clone();
    let now = format_ts(&chrono::Utc::now());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO group_agent_settings
                 (conversation_id, agent_name, model, auto_mode, intervention_level,
                  cooldown_minutes, last_intervention_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT (conversation_id) DO UPDATE SET
                     agent_name = excluded.agent_name,
                     model = excluded.model,
                     auto_mode = excluded.auto_mode,
                     intervention_level = excluded.intervention_level,
                     cooldown_minutes = excluded.cooldown_minutes,
                     last_intervention_at = excluded.last_intervention_at,
                     updated_at = excluded.updated_at",
                params![
                    conversation_id,
                    s.agent_name,
                    s.model,
                    s.auto_mode,
                    s.intervention_level.to_string(),
                    s.cooldown_minutes,
                    s.last_intervention_at.as_ref().map(format_ts),
                    now,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
