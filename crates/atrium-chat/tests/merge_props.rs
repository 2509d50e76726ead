// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Property tests for the message list merge.

use std::collections::HashSet;

use atrium_chat::merge_message;
use atrium_core::{Message, MessageId, Sender};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;

fn message(id: u8, second: u8) -> Message {
    Message {
        id: MessageId::from(format!("m{id}")),
        conversation_id: "c1".into(),
        sender: Sender::User,
        content: String::new(),
        mode: "general".into(),
        metadata: Default::default(),
        created_at: Utc
            .with_ymd_and_hms(2026, 3, 1, 12, 0, u32::from(second))
            .unwrap(),
    }
}

/// Deliveries drawn from a small id space so duplicates are common. A
/// repeated id always carries the same timestamp, as a real redelivery would.
fn deliveries() -> impl Strategy<Value = Vec<Message>> {
    prop::collection::vec(0u8..12, 0..40).prop_map(|ids| {
        ids.into_iter()
            .map(|id| message(id, id % 4 * 10))
            .collect()
    })
}

proptest! {
    #[test]
    fn merged_list_has_each_id_once(arrivals in deliveries()) {
        let mut list = Vec::new();
        for m in arrivals.clone() {
            merge_message(&mut list, m);
        }

        let unique: HashSet<_> = arrivals.iter().map(|m| m.id.clone()).collect();
        prop_assert_eq!(list.len(), unique.len());
        let listed: HashSet<_> = list.iter().map(|m| m.id.clone()).collect();
        prop_assert_eq!(listed, unique);
    }

    #[test]
    fn merged_list_is_chronological(arrivals in deliveries()) {
        let mut list = Vec::new();
        for m in arrivals {
            merge_message(&mut list, m);
        }
        prop_assert!(list.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[test]
    fn equal_timestamps_keep_first_arrival_order(arrivals in deliveries()) {
        let mut list = Vec::new();
        let mut first_seen = Vec::new();
        for m in arrivals {
            if !first_seen.contains(&m.id) {
                first_seen.push(m.id.clone());
            }
            merge_message(&mut list, m);
        }

        for w in list.windows(2) {
            if w[0].created_at == w[1].created_at {
                let a = first_seen.iter().position(|id| *id == w[0].id);
                let b = first_seen.iter().position(|id| *id == w[1].id);
                prop_assert!(a < b);
            }
        }
    }

    #[test]
    fn replaying_deliveries_changes_nothing(arrivals in deliveries()) {
        let mut list = Vec::new();
        for m in arrivals.clone() {
            merge_message(&mut list, m);
        }
        let before = list.clone();
        for m in arrivals {
            prop_assert!(!merge_message(&mut list, m));
        }
        prop_assert_eq!(list, before);
    }
}
