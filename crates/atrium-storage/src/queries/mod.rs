// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query functions. Each takes a `&Database` and runs through `call()`.

pub mod conversations;
pub mod messages;
pub mod requests;
pub mod settings;
