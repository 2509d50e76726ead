// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation and membership queries.

use atrium_core::AtriumError;
use atrium_core::types::{Conversation, ConversationId, DepartmentConversation, UserId};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{CONVERSATION_COLUMNS, conversation_from_row, format_ts};

/// Title given to a lazily created personal conversation.
pub const PERSONAL_TITLE: &str = "Personal";

/// Result of adding a member to a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyMember,
    Missing,
    NotDepartment,
}

/// Return the owner's default personal conversation, inserting it if absent.
///
/// The partial unique index on `(owner_id) WHERE is_default = 1` guarantees a
/// single row even if two callers race.
pub async fn get_or_create_personal(
    db: &Database,
    owner: &UserId,
) -> Result<Conversation, AtriumError> {
    let owner = owner.to_string();
    let id = ConversationId::generate().to_string();
    let now = format_ts(&chrono::Utc::now());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO conversations
                 (id, title, scope, department, owner_id, is_default, created_at, updated_at)
                 VALUES (?1, ?2, 'personal', NULL, ?3, 1, ?4, ?4)",
                params![id, PERSONAL_TITLE, owner, now],
            )?;
            conn.query_row(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE owner_id = ?1 AND is_default = 1"
                ),
                params![owner],
                conversation_from_row,
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a conversation. Department conversations also enroll their owner.
pub async fn insert_conversation(
    db: &Database,
    conversation: &Conversation,
) -> Result<(), AtriumError> {
    let c = conversation.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let created = format_ts(&c.created_at);
            tx.execute(
                "INSERT INTO conversations
                 (id, title, scope, department, owner_id, is_default, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
                params![
                    c.id.as_str(),
                    c.title,
                    c.scope.to_string(),
                    c.department,
                    c.owner.as_str(),
                    created,
                    format_ts(&c.updated_at),
                ],
            )?;
            if c.is_department() {
                tx.execute(
                    "INSERT OR IGNORE INTO conversation_members (conversation_id, user_id, joined_at)
                     VALUES (?1, ?2, ?3)",
                    params![c.id.as_str(), c.owner.as_str(), created],
                )?;
            }
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_conversation(
    db: &Database,
    id: &ConversationId,
) -> Result<Option<Conversation>, AtriumError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                params![id],
                conversation_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Personal conversations of `owner`, most recent activity first.
pub async fn list_personal(
    db: &Database,
    owner: &UserId,
    limit: usize,
) -> Result<Vec<Conversation>, AtriumError> {
    let owner = owner.to_string();
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM conversations
                 WHERE owner_id = ?1 AND scope = 'personal'
                 ORDER BY COALESCE(last_message_at, updated_at) DESC, rowid DESC
                 LIMIT ?2"
            ))?;
            let conversations = stmt
                .query_map(params![owner, limit], conversation_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(conversations)
        })
        .await
        .map_err(map_tr_err)
}

/// Every department conversation with `user`'s membership flag.
pub async fn list_department(
    db: &Database,
    user: &UserId,
) -> Result<Vec<DepartmentConversation>, AtriumError> {
    let user = user.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS},
                        EXISTS (SELECT 1 FROM conversation_members m
                                WHERE m.conversation_id = conversations.id AND m.user_id = ?1)
                 FROM conversations
                 WHERE scope = 'department'
                 ORDER BY COALESCE(last_message_at, updated_at) DESC, rowid DESC"
            ))?;
            let listing = stmt
                .query_map(params![user], |row| {
                    Ok(DepartmentConversation {
                        conversation: conversation_from_row(row)?,
                        is_member: row.get(8)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(listing)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn is_member(
    db: &Database,
    id: &ConversationId,
    user: &UserId,
) -> Result<bool, AtriumError> {
    let id = id.to_string();
    let user = user.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT EXISTS (SELECT 1 FROM conversation_members
                                WHERE conversation_id = ?1 AND user_id = ?2)",
                params![id, user],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Add `user` to a department conversation.
pub async fn add_member(
    db: &Database,
    id: &ConversationId,
    user: &UserId,
) -> Result<JoinOutcome, AtriumError> {
    let id = id.to_string();
    let user = user.to_string();
    let now = format_ts(&chrono::Utc::now());
    db.connection()
        .call(move |conn| {
            let scope: Option<String> = conn
                .query_row(
                    "SELECT scope FROM conversations WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            match scope.as_deref() {
                None => return Ok(JoinOutcome::Missing),
                Some("department") => {}
                Some(_) => return Ok(JoinOutcome::NotDepartment),
            }
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO conversation_members (conversation_id, user_id, joined_at)
                 VALUES (?1, ?2, ?3)",
                params![id, user, now],
            )?;
            Ok(if inserted == 0 {
                JoinOutcome::AlreadyMember
            } else {
                JoinOutcome::Joined
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a conversation owned by `owner`. Messages, requests, membership and
/// settings go with it through `ON DELETE CASCADE`.
pub async fn delete_owned(
    db: &Database,
    id: &ConversationId,
    owner: &UserId,
) -> Result<bool, AtriumError> {
    let id = id.to_string();
    let owner = owner.to_string();
    db.connection()
        .call(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM conversations WHERE id = ?1 AND owner_id = ?2",
                params![id, owner],
            )?;
            Ok(deleted > 0)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrium_core::types::ConversationScope;
    use chrono::Utc;

    fn department(id: &str, owner: &str) -> Conversation {
        let now = Utc::now();
        Conversation {
            id: id.into(),
            title: format!("dept {id}"),
            scope: ConversationScope::Department,
            department: Some("sales".into()),
            owner: owner.into(),
            created_at: now,
            updated_at: now,
            last_message_at: None,
        }
    }

    #[tokio::test]
    async fn personal_conversation_is_created_once() {
        let db = Database::open_in_memory().await.unwrap();
        let owner = UserId::from("alice");

        let first = get_or_create_personal(&db, &owner).await.unwrap();
        let second = get_or_create_personal(&db, &owner).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.title, PERSONAL_TITLE);

        let listed = list_personal(&db, &owner, 10).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn department_owner_is_enrolled_and_others_are_not() {
        let db = Database::open_in_memory().await.unwrap();
        insert_conversation(&db, &department("d1", "alice")).await.unwrap();

        let alice = list_department(&db, &"alice".into()).await.unwrap();
        let bob = list_department(&db, &"bob".into()).await.unwrap();
        assert!(alice[0].is_member);
        assert!(!bob[0].is_member);
    }

    #[tokio::test]
    async fn add_member_reports_each_outcome() {
        let db = Database::open_in_memory().await.unwrap();
        insert_conversation(&db, &department("d1", "alice")).await.unwrap();
        let personal = get_or_create_personal(&db, &"alice".into()).await.unwrap();
        let bob = UserId::from("bob");

        assert_eq!(add_member(&db, &"d1".into(), &bob).await.unwrap(), JoinOutcome::Joined);
        assert_eq!(
            add_member(&db, &"d1".into(), &bob).await.unwrap(),
            JoinOutcome::AlreadyMember
        );
        assert_eq!(
            add_member(&db, &"nope".into(), &bob).await.unwrap(),
            JoinOutcome::Missing
        );
        assert_eq!(
            add_member(&db, &personal.id, &bob).await.unwrap(),
            JoinOutcome::NotDepartment
        );
        assert!(is_member(&db, &"d1".into(), &bob).await.unwrap());
    }

    #[tokio::test]
    async fn only_owner_can_delete() {
        let db = Database::open_in_memory().await.unwrap();
        insert_conversation(&db, &department("d1", "alice")).await.unwrap();

        assert!(!delete_owned(&db, &"d1".into(), &"bob".into()).await.unwrap());
        assert!(delete_owned(&db, &"d1".into(), &"alice".into()).await.unwrap());
        assert!(get_conversation(&db, &"d1".into()).await.unwrap().is_none());
    }
}
