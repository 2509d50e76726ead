// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite reference backend for Atrium.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, typed queries for conversations,
//! messages, requests and group agent settings, and a broadcast fan-out of
//! message inserts that backs live subscriptions. [`LoopbackWorker`] plays
//! the reply generator against the same database.

pub mod backend;
pub mod database;
pub mod migrations;
mod models;
pub mod queries;
pub mod worker;

pub use backend::SqliteBackend;
pub use database::Database;
pub use worker::LoopbackWorker;
