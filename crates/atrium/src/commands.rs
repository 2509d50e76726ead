// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shell input parsing.
//!
//! A line starting with `/` is a command; anything else is a message for the
//! active conversation.

use std::str::FromStr;

use atrium_chat::ConversationListing;
use atrium_core::{AtriumError, ConversationId, GroupSettingsPatch, InterventionLevel};

/// One parsed line of shell input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Help,
    Quit,
    List,
    History,
    New { title: String },
    Dept { department: String, title: String },
    Join(Option<String>),
    Switch(String),
    Delete(Option<String>),
    Retry,
    Mode(String),
    Settings,
    /// `/auto`, `/level`, `/cooldown`, `/model` and `/name`.
    Configure(GroupSettingsPatch),
}

pub const HELP: &str = "\
/list                     list conversations
/new <title>              create a personal conversation
/dept <tag> <title>       create a department conversation
/join [id]                join a department conversation
/switch <id>              switch conversation (unique id prefix is enough)
/delete [id]              delete a conversation
/history                  reprint the active conversation
/retry                    retry the failed request
/mode <mode>              set the mode sent with messages
/settings                 show the department agent settings
/auto on|off              toggle autonomous interventions
/level low|medium|high    set the intervention level
/cooldown <minutes>       set the intervention cooldown
/model <model>            set the agent model
/name <name>              set the agent name
/quit                     leave the shell";

fn usage(text: &str) -> AtriumError {
    AtriumError::Validation(format!("usage: {text}"))
}

/// Parse a trimmed, non-empty input line.
pub fn parse(line: &str) -> Result<Command, AtriumError> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Send(line.to_string()));
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    let arg = (!args.is_empty()).then(|| args.to_string());

    let command = match name {
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "list" | "ls" => Command::List,
        "history" => Command::History,
        "retry" => Command::Retry,
        "settings" => Command::Settings,
        "new" => Command::New {
            title: arg.ok_or_else(|| usage("/new <title>"))?,
        },
        "dept" => {
            let (department, title) = args
                .split_once(char::is_whitespace)
                .ok_or_else(|| usage("/dept <tag> <title>"))?;
            Command::Dept {
                department: department.to_string(),
                title: title.trim().to_string(),
            }
        }
        "join" => Command::Join(arg),
        "switch" | "sw" => Command::Switch(arg.ok_or_else(|| usage("/switch <id>"))?),
        "delete" | "rm" => Command::Delete(arg),
        "mode" => Command::Mode(arg.ok_or_else(|| usage("/mode <mode>"))?),
        "auto" => Command::Configure(GroupSettingsPatch {
            auto_mode: Some(match args {
                "on" | "true" => true,
                "off" | "false" => false,
                _ => return Err(usage("/auto on|off")),
            }),
            ..Default::default()
        }),
        "level" => Command::Configure(GroupSettingsPatch {
            intervention_level: Some(
                InterventionLevel::from_str(args).map_err(|_| usage("/level low|medium|high"))?,
            ),
            ..Default::default()
        }),
        "cooldown" => Command::Configure(GroupSettingsPatch {
            cooldown_minutes: Some(args.parse().map_err(|_| usage("/cooldown <minutes>"))?),
            ..Default::default()
        }),
        "model" => Command::Configure(GroupSettingsPatch {
            model: Some(arg.ok_or_else(|| usage("/model <model>"))?),
            ..Default::default()
        }),
        "name" => Command::Configure(GroupSettingsPatch {
            agent_name: Some(arg.ok_or_else(|| usage("/name <name>"))?),
            ..Default::default()
        }),
        other => {
            return Err(AtriumError::Validation(format!(
                "unknown command `/{other}`, try /help"
            )));
        }
    };
    Ok(command)
}

/// Resolve a conversation id, or a unique prefix of one, against the cached lists.
pub fn resolve_conversation(
    listing: &ConversationListing,
    token: &str,
) -> Result<ConversationId, AtriumError> {
    let exact = ConversationId::from(token);
    if listing.find(&exact).is_some() {
        return Ok(exact);
    }

    let mut matches: Vec<&ConversationId> = listing
        .personal
        .iter()
        .chain(listing.conversations.iter())
        .chain(listing.departments.iter().map(|d| &d.conversation))
        .map(|c| &c.id)
        .filter(|id| id.as_str().starts_with(token))
        .collect();
    matches.sort();
    matches.dedup();

    match matches.as_slice() {
        [id] => Ok((*id).clone()),
        [] => Err(AtriumError::NotFound {
            entity: "conversation",
            id: token.to_string(),
        }),
        _ => Err(AtriumError::Validation(format!(
            "`{token}` matches {} conversations, use a longer prefix",
            matches.len()
        ))),
    }
}
