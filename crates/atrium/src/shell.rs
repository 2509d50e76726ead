// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `atrium shell` command implementation.
//!
//! Launches an interactive REPL over a [`ChatSurface`] backed by the local
//! SQLite database, with the loopback worker answering messages. Replies
//! arrive on the push channel; the shell waits for the active request to
//! settle before printing them.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use atrium_chat::{ChatSurface, TrackedStatus};
use atrium_config::AtriumConfig;
use atrium_core::{
    AtriumError, ConversationId, ConversationScope, Message, MessageId, NewConversation,
    PluginAdapter, Sender,
};
use atrium_storage::{LoopbackWorker, SqliteBackend};
use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{debug, info, warn};

use crate::commands::{self, Command};
use crate::render;

/// How long to wait for a reply message after its request already settled.
const REPLY_GRACE: Duration = Duration::from_secs(1);

/// Messages already printed for the active conversation.
#[derive(Debug, Default)]
struct Transcript {
    printed: HashSet<MessageId>,
}

impl Transcript {
    fn reset(&mut self) {
        self.printed.clear();
    }

    /// Messages not printed yet, in list order. Marks them printed.
    fn take_new<'a>(&mut self, messages: &'a [Message]) -> Vec<&'a Message> {
        messages
            .iter()
            .filter(|m| self.printed.insert(m.id.clone()))
            .collect()
    }
}

struct Session {
    surface: ChatSurface,
    transcript: Transcript,
    reply_window: Duration,
}

impl Session {
    fn flush(&mut self) {
        let messages = self.surface.messages();
        for message in self.transcript.take_new(&messages) {
            println!("{}", render::message(message));
        }
    }

    fn show_active(&mut self) {
        self.transcript.reset();
        if let Some(conversation) = self.surface.active_conversation() {
            println!("{}", render::header(conversation, self.surface.mode()));
        }
        if let Some(list) = self.surface.message_list()
            && let Some(error) = list.load_state.error()
        {
            println!("{}", format!("history unavailable: {error}").red());
        }
        self.flush();
        if let Some(banner) = self.surface.banner() {
            println!("{}", render::banner(&banner));
        }
    }

    fn active_id(&self) -> Result<ConversationId, AtriumError> {
        self.surface
            .active_conversation()
            .map(|c| c.id.clone())
            .ok_or_else(|| AtriumError::Internal("no active conversation".into()))
    }

    fn resolve(&self, token: Option<&str>) -> Result<ConversationId, AtriumError> {
        match token {
            Some(token) => {
                commands::resolve_conversation(&self.surface.conversations().snapshot(), token)
            }
            None => self.active_id(),
        }
    }

    /// Wait for the tracked request to settle, then print what arrived.
    async fn await_reply(&mut self, before: usize) {
        println!("{}", "...".dimmed());
        let settled = self.surface.wait_until_settled(self.reply_window).await;

        // A poll can report `done` slightly before the reply is merged.
        if settled
            && self.surface.status().status != TrackedStatus::Error
            && let Some(mut list) = self.surface.subscribe_messages()
        {
            let arrived = tokio::time::timeout(
                REPLY_GRACE,
                list.wait_for(|s| {
                    s.messages
                        .iter()
                        .skip(before)
                        .any(|m| m.sender == Sender::Assistant)
                }),
            )
            .await;
            if arrived.is_err() {
                debug!("request settled without a visible reply");
            }
        }

        self.flush();
        match self.surface.banner() {
            Some(banner) => println!("{}", render::banner(&banner)),
            None if !settled => println!("{}", "still waiting, the reply will show up later".yellow()),
            None => {}
        }
    }

    async fn execute(&mut self, command: Command) -> Result<(), AtriumError> {
        match command {
            Command::Send(text) => {
                let before = self.surface.messages().len();
                let dispatch = self.surface.send(&text).await?;
                info!(request_id = %dispatch.request_id, "message sent");
                self.await_reply(before).await;
            }
            Command::Retry => {
                let before = self.surface.messages().len();
                if self.surface.retry().await? {
                    self.await_reply(before).await;
                } else {
                    println!("nothing to retry");
                }
            }
            Command::Help => println!("{}", commands::HELP),
            Command::List => {
                if let Err(e) = self.surface.conversations().refresh().await {
                    warn!(error = %e, "showing cached conversation lists");
                }
                let active = self.surface.active_conversation().map(|c| c.id.clone());
                print!(
                    "{}",
                    render::listing(&self.surface.conversations().snapshot(), active.as_ref())
                );
            }
            Command::History => self.show_active(),
            Command::New { title } => {
                self.create(NewConversation {
                    title,
                    scope: ConversationScope::Personal,
                    department: None,
                })
                .await?;
            }
            Command::Dept { department, title } => {
                self.create(NewConversation {
                    title,
                    scope: ConversationScope::Department,
                    department: Some(department),
                })
                .await?;
            }
            Command::Join(token) => {
                let id = self.resolve(token.as_deref())?;
                self.surface.join(&id).await?;
                println!("joined {id}");
            }
            Command::Switch(token) => {
                let id = self.resolve(Some(&token))?;
                self.surface.activate(&id).await?;
                self.show_active();
            }
            Command::Delete(token) => {
                let id = self.resolve(token.as_deref())?;
                let was_active = self.active_id().is_ok_and(|active| active == id);
                if !self.surface.delete(&id).await? {
                    println!("nothing deleted");
                    return Ok(());
                }
                println!("deleted {id}");
                if was_active {
                    self.show_active();
                }
            }
            Command::Mode(mode) => {
                self.surface.set_mode(&mode)?;
                println!("mode: {}", self.surface.mode());
            }
            Command::Settings => {
                let settings = self.surface.active_settings().await?;
                println!("{}", render::settings(&settings));
            }
            Command::Configure(patch) => {
                let settings = self.surface.update_active_settings(&patch).await?;
                println!("{}", render::settings(&settings));
            }
            Command::Quit => {}
        }
        Ok(())
    }

    async fn create(&mut self, input: NewConversation) -> Result<(), AtriumError> {
        self.surface.create_conversation(input).await?;
        self.show_active();
        Ok(())
    }
}

/// Runs the `atrium shell` interactive REPL.
pub async fn run_shell(config: AtriumConfig) -> Result<(), AtriumError> {
    let backend = SqliteBackend::open(&config).await?;
    let worker = LoopbackWorker::new(backend.clone(), &config);
    let mut surface = ChatSurface::new(Arc::new(backend.clone()), Arc::new(worker), &config);
    surface.open().await?;

    let mut session = Session {
        surface,
        transcript: Transcript::default(),
        reply_window: config.chat.poll_window(),
    };

    let mut rl = DefaultEditor::new()
        .map_err(|e| AtriumError::Internal(format!("failed to initialize readline: {e}")))?;

    println!("{}", "atrium shell".bold().green());
    println!(
        "Signed in as {}. Type {} for commands, {} to exit.\n",
        config.identity.user_id.bold(),
        "/help".yellow(),
        "/quit".yellow()
    );
    session.show_active();

    let prompt = format!("{}> ", "atrium".green());
    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    session.flush();
                    continue;
                }
                let _ = rl.add_history_entry(&line);

                match commands::parse(trimmed) {
                    Ok(Command::Quit) => break,
                    Ok(command) => {
                        if let Err(e) = session.execute(command).await {
                            eprintln!("{}: {e}", "error".red());
                        }
                    }
                    Err(e) => eprintln!("{}", e.to_string().yellow()),
                }
                session.flush();
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C
                break;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D
                break;
            }
            Err(e) => {
                eprintln!("{}: {e}", "error".red());
                break;
            }
        }
    }

    session.surface.close().await;
    if let Err(e) = backend.shutdown().await {
        warn!(error = %e, "backend shutdown failed");
    }
    println!("{}", "goodbye".dimmed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(id: &str) -> Message {
        Message {
            id: id.into(),
            conversation_id: "c1".into(),
            sender: Sender::User,
            content: id.into(),
            mode: "general".into(),
            metadata: Default::default(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn transcript_prints_each_message_once() {
        let mut transcript = Transcript::default();
        let first = vec![message("a"), message("b")];
        assert_eq!(transcript.take_new(&first).len(), 2);

        let second = vec![message("a"), message("b"), message("c")];
        let fresh: Vec<_> = transcript.take_new(&second).iter().map(|m| m.id.clone()).collect();
        assert_eq!(fresh, vec![MessageId::from("c")]);

        transcript.reset();
        assert_eq!(transcript.take_new(&second).len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn session_sends_and_prints_reply() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AtriumConfig::default();
        config.storage.database_path = dir.path().join("shell.db").display().to_string();
        config.chat.poll_interval_ms = 50;
        config.worker.processing_delay_ms = 5;
        config.worker.reply_delay_ms = 5;

        let backend = SqliteBackend::open(&config).await.unwrap();
        let worker = LoopbackWorker::new(backend.clone(), &config);
        let mut surface = ChatSurface::new(Arc::new(backend), Arc::new(worker), &config);
        surface.open().await.unwrap();
        let mut session = Session {
            surface,
            transcript: Transcript::default(),
            reply_window: config.chat.poll_window(),
        };

        session.execute(Command::Send("hello".into())).await.unwrap();
        assert_eq!(session.transcript.printed.len(), 2);

        session
            .execute(Command::Dept {
                department: "billing".into(),
                title: "Invoices".into(),
            })
            .await
            .unwrap();
        assert_eq!(session.surface.mode(), "billing");
        assert!(session.transcript.printed.is_empty());

        session
            .execute(commands::parse("/cooldown 15").unwrap())
            .await
            .unwrap();
        let settings = session.surface.active_settings().await.unwrap();
        assert_eq!(settings.cooldown_minutes, 15);

        session.surface.close().await;
    }
}
