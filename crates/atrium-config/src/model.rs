// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Atrium.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use atrium_core::types::{DEFAULT_AGENT_NAME, DEFAULT_MODEL};
use serde::{Deserialize, Serialize};

/// Top-level Atrium configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AtriumConfig {
    /// Who the local shell acts as.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Chat orchestration settings (history window, polling).
    #[serde(default)]
    pub chat: ChatConfig,

    /// Defaults reported for group agents without a settings row.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Loopback worker timing.
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl AtriumConfig {
    /// Render the effective configuration as TOML, for `atrium config`.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityConfig {
    /// User id the backend session is bound to.
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            log_level: default_log_level(),
        }
    }
}

fn default_user_id() -> String {
    "local".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable write-ahead logging.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("atrium").join("atrium.db"))
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "atrium.db".to_string())
}

fn default_wal_mode() -> bool {
    true
}

/// Chat orchestration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChatConfig {
    /// Number of most recent messages loaded when a conversation is activated.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Maximum number of personal conversations listed.
    #[serde(default = "default_conversation_list_limit")]
    pub conversation_list_limit: usize,

    /// Delay between request status polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Hard cap on status polls per tracked request.
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Mode recorded on messages sent in personal conversations.
    #[serde(default = "default_mode")]
    pub default_mode: String,

    /// Allow a second send while a request is still queued or processing.
    #[serde(default)]
    pub allow_send_while_pending: bool,
}

impl ChatConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Upper bound on how long a tracked request can stay visible as outstanding.
    pub fn poll_window(&self) -> Duration {
        self.poll_interval() * self.max_poll_attempts
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            conversation_list_limit: default_conversation_list_limit(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
            default_mode: default_mode(),
            allow_send_while_pending: false,
        }
    }
}

fn default_history_limit() -> usize {
    100
}

fn default_conversation_list_limit() -> usize {
    50
}

fn default_poll_interval_ms() -> u64 {
    3000
}

fn default_max_poll_attempts() -> u32 {
    20
}

fn default_mode() -> String {
    "general".to_string()
}

/// Group agent defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Agent name reported when a conversation has no settings row.
    #[serde(default = "default_agent_name")]
    pub default_name: String,

    /// Model reported when a conversation has no settings row.
    #[serde(default = "default_agent_model")]
    pub default_model: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_name: default_agent_name(),
            default_model: default_agent_model(),
        }
    }
}

fn default_agent_name() -> String {
    DEFAULT_AGENT_NAME.to_string()
}

fn default_agent_model() -> String {
    DEFAULT_MODEL.to_string()
}

/// Timing of the loopback worker used by `atrium shell`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Delay before the request is marked processing, in milliseconds.
    #[serde(default = "default_processing_delay_ms")]
    pub processing_delay_ms: u64,

    /// Delay before the reply is posted, in milliseconds.
    #[serde(default = "default_reply_delay_ms")]
    pub reply_delay_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            processing_delay_ms: default_processing_delay_ms(),
            reply_delay_ms: default_reply_delay_ms(),
        }
    }
}

fn default_processing_delay_ms() -> u64 {
    300
}

fn default_reply_delay_ms() -> u64 {
    1200
}
