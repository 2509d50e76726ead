// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./atrium.toml` > `~/.config/atrium/atrium.toml` > `/etc/atrium/atrium.toml`
//! with environment variable overrides via `ATRIUM_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::AtriumConfig;

/// Config sections that may be overridden through `ATRIUM_<SECTION>_<KEY>`.
const ENV_SECTIONS: &[&str] = &["identity", "storage", "chat", "agent", "worker"];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/atrium/atrium.toml` (system-wide)
/// 3. `~/.config/atrium/atrium.toml` (user XDG config)
/// 4. `./atrium.toml` (local directory)
/// 5. `ATRIUM_*` environment variables
pub fn load_config() -> Result<AtriumConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<AtriumConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AtriumConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<AtriumConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AtriumConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(AtriumConfig::default()));
    for path in config_file_paths() {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(env_provider())
}

/// Config file locations in merge order (lowest precedence first).
pub fn config_file_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/atrium/atrium.toml")];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("atrium/atrium.toml"));
    }
    paths.push(PathBuf::from("atrium.toml"));
    paths
}

/// Create the environment variable provider.
///
/// Maps only the first underscore after a known section name to a dot, so
/// `ATRIUM_CHAT_POLL_INTERVAL_MS` becomes `chat.poll_interval_ms` rather
/// than `chat.poll.interval.ms`.
fn env_provider() -> Env {
    Env::prefixed("ATRIUM_").map(|key| env_key_to_path(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env var name to a dotted config path.
pub(crate) fn env_key_to_path(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_on_section_only() {
        assert_eq!(
            env_key_to_path("chat_poll_interval_ms"),
            "chat.poll_interval_ms"
        );
        assert_eq!(
            env_key_to_path("storage_database_path"),
            "storage.database_path"
        );
        assert_eq!(env_key_to_path("identity_user_id"), "identity.user_id");
    }

    #[test]
    fn unknown_sections_pass_through() {
        assert_eq!(env_key_to_path("telemetry_endpoint"), "telemetry_endpoint");
    }

    #[test]
    fn config_paths_end_with_local_file() {
        let paths = config_file_paths();
        assert_eq!(paths.first(), Some(&PathBuf::from("/etc/atrium/atrium.toml")));
        assert_eq!(paths.last(), Some(&PathBuf::from("atrium.toml")));
    }
}
