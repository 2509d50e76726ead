// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Atrium integration tests.
//!
//! Provides in-memory adapters for fast, deterministic tests without a
//! database or a real reply worker.
//!
//! # Components
//!
//! - [`MockBackend`] - In-memory `ChatBackend` with failure injection,
//!   scripted poll results, push injection and call counters
//! - [`MockWorker`] - `ChatWorker` that records invocations

pub mod mock_backend;
pub mod mock_worker;

pub use mock_backend::{BackendOp, MockBackend};
pub use mock_worker::MockWorker;
