// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Autonomous-agent settings of department conversations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use atrium_config::model::AgentConfig;
use atrium_core::{
    AtriumError, ChatBackend, ConversationId, GroupAgentSettings, GroupSettingsPatch,
};

/// Per-conversation auto/manual flags for list rendering.
///
/// Seeded from every successful fetch and patched right after a confirmed
/// write that carried `auto_mode`, ahead of the re-fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoModeIndex {
    flags: HashMap<ConversationId, bool>,
}

impl AutoModeIndex {
    pub fn get(&self, conversation_id: &ConversationId) -> Option<bool> {
        self.flags.get(conversation_id).copied()
    }

    pub fn set(&mut self, conversation_id: ConversationId, auto_mode: bool) {
        self.flags.insert(conversation_id, auto_mode);
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

/// Settings of the conversation most recently fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsView {
    pub conversation_id: Option<ConversationId>,
    pub settings: GroupAgentSettings,
    pub last_error: Option<String>,
}

pub struct GroupAgentSettingsStore {
    backend: Arc<dyn ChatBackend>,
    defaults: GroupAgentSettings,
    state: watch::Sender<SettingsView>,
    auto_modes: Mutex<AutoModeIndex>,
}

impl GroupAgentSettingsStore {
    /// `agent` supplies the name and model reported while no row exists.
    pub fn new(backend: Arc<dyn ChatBackend>, agent: &AgentConfig) -> Self {
        let defaults = GroupAgentSettings::defaults(&agent.default_name, &agent.default_model);
        let (state, _) = watch::channel(SettingsView {
            conversation_id: None,
            settings: defaults.clone(),
            last_error: None,
        });
        Self {
            backend,
            defaults,
            state,
            auto_modes: Mutex::new(AutoModeIndex::default()),
        }
    }

    fn auto_modes(&self) -> MutexGuard<'_, AutoModeIndex> {
        self.auto_modes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> watch::Receiver<SettingsView> {
        self.state.subscribe()
    }

    pub fn view(&self) -> SettingsView {
        self.state.borrow().clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.borrow().last_error.clone()
    }

    pub fn auto_mode(&self, conversation_id: &ConversationId) -> Option<bool> {
        self.auto_modes().get(conversation_id)
    }

    pub fn auto_mode_index(&self) -> AutoModeIndex {
        self.auto_modes().clone()
    }

    /// Settings for `conversation_id`, or the defaults when there is no row.
    ///
    /// Never fails: transport errors and backend-reported errors are kept in
    /// [`SettingsView::last_error`] and the defaults are returned instead.
    pub async fn fetch_settings(&self, conversation_id: &ConversationId) -> GroupAgentSettings {
        let (settings, error) = match self.backend.get_group_settings(conversation_id).await {
            Ok(response) => match response.error {
                Some(error) => (self.defaults.clone(), Some(error)),
                None => {
                    let settings = response.settings.unwrap_or_else(|| self.defaults.clone());
                    self.auto_modes()
                        .set(conversation_id.clone(), settings.auto_mode);
                    (settings, None)
                }
            },
            Err(e) => (self.defaults.clone(), Some(e.to_string())),
        };

        if let Some(error) = &error {
            warn!(conversation_id = %conversation_id, error = %error, "settings fetch failed, using defaults");
        } else {
            debug!(conversation_id = %conversation_id, exists = settings.exists, "settings fetched");
        }

        self.state.send_replace(SettingsView {
            conversation_id: Some(conversation_id.clone()),
            settings: settings.clone(),
            last_error: error,
        });
        settings
    }

    /// Write the present fields of `patch`, then re-fetch the stored settings.
    ///
    /// Out-of-range values are rejected before the backend is called.
    pub async fn update_settings(
        &self,
        conversation_id: &ConversationId,
        patch: &GroupSettingsPatch,
    ) -> Result<GroupAgentSettings, AtriumError> {
        if patch.is_empty() {
            return Ok(self.fetch_settings(conversation_id).await);
        }
        patch.validate()?;

        if let Err(e) = self.backend.set_group_settings(conversation_id, patch).await {
            warn!(conversation_id = %conversation_id, error = %e, "settings update failed");
            let message = e.to_string();
            self.state.send_modify(|view| view.last_error = Some(message));
            return Err(e);
        }

        if let Some(auto_mode) = patch.auto_mode {
            self.auto_modes().set(conversation_id.clone(), auto_mode);
        }
        info!(conversation_id = %conversation_id, "group agent settings updated");

        Ok(self.fetch_settings(conversation_id).await)
    }
}
