// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Covers constraints serde cannot express: non-empty identifiers, positive
//! limits, and a default model that exists in the model catalog.

use atrium_core::types::MODEL_CATALOG;

use crate::diagnostic::ConfigError;
use crate::model::AtriumConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Shortest poll interval accepted, in milliseconds.
const MIN_POLL_INTERVAL_MS: u64 = 100;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first.
pub fn validate_config(config: &AtriumConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.identity.user_id.trim().is_empty() {
        errors.push(ConfigError::validation("identity.user_id must not be empty"));
    }

    if !LOG_LEVELS.contains(&config.identity.log_level.as_str()) {
        errors.push(ConfigError::validation(format!(
            "identity.log_level `{}` must be one of: {}",
            config.identity.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    let chat = &config.chat;
    if chat.history_limit == 0 {
        errors.push(ConfigError::validation(
            "chat.history_limit must be at least 1",
        ));
    }
    if chat.conversation_list_limit == 0 {
        errors.push(ConfigError::validation(
            "chat.conversation_list_limit must be at least 1",
        ));
    }
    if chat.poll_interval_ms < MIN_POLL_INTERVAL_MS {
        errors.push(ConfigError::validation(format!(
            "chat.poll_interval_ms must be at least {MIN_POLL_INTERVAL_MS}, got {}",
            chat.poll_interval_ms
        )));
    }
    if chat.max_poll_attempts == 0 {
        errors.push(ConfigError::validation(
            "chat.max_poll_attempts must be at least 1",
        ));
    }
    if chat.default_mode.trim().is_empty() {
        errors.push(ConfigError::validation("chat.default_mode must not be empty"));
    }

    if config.agent.default_name.trim().is_empty() {
        errors.push(ConfigError::validation(
            "agent.default_name must not be empty",
        ));
    }
    if !MODEL_CATALOG.contains(&config.agent.default_model.as_str()) {
        errors.push(ConfigError::validation(format!(
            "agent.default_model `{}` is not a known model (expected one of: {})",
            config.agent.default_model,
            MODEL_CATALOG.join(", ")
        )));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
