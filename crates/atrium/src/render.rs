// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal formatting for messages, banners, listings and settings.

use atrium_chat::markup::{Span, parse_spans};
use atrium_chat::{ConversationListing, StatusBanner};
use atrium_core::{Conversation, ConversationId, GroupAgentSettings, Message, Sender};
use colored::Colorize;

/// Message content with `**bold**` runs rendered bold.
pub fn markup(content: &str) -> String {
    parse_spans(content)
        .into_iter()
        .map(|span| match span {
            Span::Plain(text) => text.to_string(),
            Span::Bold(text) => text.bold().to_string(),
        })
        .collect()
}

pub fn message(message: &Message) -> String {
    let label = match message.sender {
        Sender::User => "you".cyan().bold(),
        Sender::Assistant => "assistant".green().bold(),
        Sender::System => "system".dimmed(),
    };
    format!(
        "{} {label}: {}",
        message.created_at.format("%H:%M").to_string().dimmed(),
        markup(&message.content)
    )
}

pub fn banner(banner: &StatusBanner) -> String {
    match banner {
        StatusBanner::Queued => "queued, waiting for the assistant".yellow().to_string(),
        StatusBanner::Processing => "the assistant is working on it".yellow().to_string(),
        StatusBanner::Failed { message, can_retry } => {
            let hint = if *can_retry { " (use /retry)" } else { "" };
            format!("{}{hint}", format!("request failed: {message}").red())
        }
    }
}

/// One-line header for the active conversation.
pub fn header(conversation: &Conversation, mode: &str) -> String {
    let tag = conversation
        .department
        .as_deref()
        .map(|d| format!(" [{d}]"))
        .unwrap_or_default();
    format!(
        "{}{tag} {} mode: {mode}",
        conversation.title.bold(),
        format!("({})", conversation.id).dimmed(),
    )
}

fn short_id(id: &ConversationId) -> &str {
    id.as_str().get(..8).unwrap_or(id.as_str())
}

pub fn listing(listing: &ConversationListing, active: Option<&ConversationId>) -> String {
    let marker = |id: &ConversationId| if Some(id) == active { "*" } else { " " };
    let mut out = String::new();

    out.push_str(&format!("{}\n", "personal".bold()));
    if listing.conversations.is_empty() {
        out.push_str("  (none)\n");
    }
    for c in &listing.conversations {
        out.push_str(&format!("{} {} {}\n", marker(&c.id), short_id(&c.id).dimmed(), c.title));
    }

    out.push_str(&format!("{}\n", "departments".bold()));
    if listing.departments.is_empty() {
        out.push_str("  (none)\n");
    }
    for d in &listing.departments {
        let c = &d.conversation;
        let membership = if d.is_member {
            "joined".green()
        } else {
            "not joined".dimmed()
        };
        out.push_str(&format!(
            "{} {} {} [{}] {membership}\n",
            marker(&c.id),
            short_id(&c.id).dimmed(),
            c.title,
            c.department.as_deref().unwrap_or("-"),
        ));
    }

    if let Some(error) = &listing.last_error {
        out.push_str(&format!("{}\n", format!("last error: {error}").red()));
    }
    out
}

pub fn settings(settings: &GroupAgentSettings) -> String {
    let mut out = format!(
        "agent:        {}\nmodel:        {}\nauto mode:    {}\nlevel:        {}\ncooldown:     {} min",
        settings.agent_name,
        settings.model,
        if settings.auto_mode { "on" } else { "off" },
        settings.intervention_level,
        settings.cooldown_minutes,
    );
    if let Some(at) = settings.last_intervention_at {
        out.push_str(&format!("\nlast stepped in: {}", at.format("%Y-%m-%d %H:%M")));
    }
    if !settings.exists {
        out.push_str(&format!("\n{}", "(defaults, not saved yet)".dimmed()));
    }
    out
}
