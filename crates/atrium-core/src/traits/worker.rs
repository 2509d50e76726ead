// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker adapter trait for the external reply generator.

use async_trait::async_trait;

use crate::error::AtriumError;
use crate::traits::adapter::PluginAdapter;
use crate::types::RequestId;

/// The opaque service that turns a queued request into an assistant reply.
///
/// Given a request id the worker is responsible for posting the assistant
/// message and moving the request's status forward. Its return value only
/// says whether the hand-off was accepted; the outcome is observed through
/// the backend.
#[async_trait]
pub trait ChatWorker: PluginAdapter {
    /// Hand a request to the worker.
    async fn invoke(&self, request_id: &RequestId) -> Result<(), AtriumError>;
}
