// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock reply worker that records every invocation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;

use atrium_core::types::{AdapterType, HealthStatus, RequestId};
use atrium_core::{AtriumError, ChatWorker, PluginAdapter};

/// A `ChatWorker` that only records the request ids it is handed.
///
/// With [`MockWorker::set_failing`] every invocation is recorded and then
/// rejected, which lets tests check that a worker failure never rolls back
/// the persisted message and request.
#[derive(Clone, Default)]
pub struct MockWorker {
    invocations: Arc<Mutex<Vec<RequestId>>>,
    failing: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl MockWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RequestId>> {
        self.invocations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Request ids in invocation order.
    pub fn invocations(&self) -> Vec<RequestId> {
        self.lock().clone()
    }

    pub fn invocation_count(&self) -> usize {
        self.lock().len()
    }

    /// Wait until at least `count` invocations have been recorded.
    ///
    /// Dispatch hands requests to the worker on a spawned task, so tests use
    /// this instead of asserting right after `send` returns.
    pub async fn wait_for_invocations(&self, count: usize) -> Vec<RequestId> {
        loop {
            let notified = self.notify.notified();
            if self.invocation_count() >= count {
                return self.invocations();
            }
            notified.await;
        }
    }
}

#[async_trait]
impl PluginAdapter for MockWorker {
    fn name(&self) -> &str {
        "mock-worker"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Worker
    }

    async fn health_check(&self) -> Result<HealthStatus, AtriumError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), AtriumError> {
        Ok(())
    }
}

#[async_trait]
impl ChatWorker for MockWorker {
    async fn invoke(&self, request_id: &RequestId) -> Result<(), AtriumError> {
        self.lock().push(request_id.clone());
        self.notify.notify_waiters();
        if self.failing.load(Ordering::SeqCst) {
            return Err(AtriumError::worker(format!(
                "worker rejected request {request_id}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_invocations_even_when_failing() {
        let worker = MockWorker::new();
        worker.invoke(&"r1".into()).await.unwrap();
        worker.set_failing(true);
        assert!(worker.invoke(&"r2".into()).await.is_err());

        let ids = worker.wait_for_invocations(2).await;
        assert_eq!(ids, vec![RequestId::from("r1"), RequestId::from("r2")]);
    }

    #[tokio::test]
    async fn wait_wakes_on_later_invocation() {
        let worker = MockWorker::new();
        let waiter = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.wait_for_invocations(1).await })
        };
        tokio::task::yield_now().await;
        worker.invoke(&"r1".into()).await.unwrap();
        assert_eq!(waiter.await.unwrap().len(), 1);
    }
}
