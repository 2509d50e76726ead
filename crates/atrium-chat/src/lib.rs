// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat orchestration for Atrium.
//!
//! Sits between a view and a [`ChatBackend`](atrium_core::ChatBackend):
//! caches conversations, keeps the active conversation's message list live,
//! dispatches user messages to the reply worker, and tracks the resulting
//! request until the assistant answers.

pub mod channel;
pub mod conversations;
pub mod dispatcher;
pub mod markup;
pub mod settings;
pub mod status;
pub mod surface;

pub use channel::{LoadState, MessageChannel, MessageListSnapshot, merge_message};
pub use conversations::{ConversationListing, ConversationStore};
pub use dispatcher::{Dispatch, RequestDispatcher};
pub use settings::{AutoModeIndex, GroupAgentSettingsStore, SettingsView};
pub use status::{
    RequestStatusCoordinator, StatusBanner, StatusEvent, StatusSnapshot, TrackedStatus,
    Transition, reduce,
};
pub use surface::ChatSurface;
