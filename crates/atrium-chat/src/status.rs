// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request status tracking for the active conversation.
//!
//! Two channels report on an outstanding request: the status poll and the
//! message push path. Both feed [`reduce`], which gives the push path
//! precedence: once an assistant message arrives the request is settled,
//! whatever the poll last said. Every poll loop is tagged with a generation
//! number checked under the control mutex, so a result issued before a
//! cancellation can never be applied after it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use strum::Display;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use atrium_config::model::ChatConfig;
use atrium_core::{
    AtriumError, ChatBackend, ChatRequest, ConversationId, Message, RequestId, RequestStatus,
    Sender,
};

use crate::dispatcher::RequestDispatcher;

/// Shown when the backend marks a request failed without a reason.
const DEFAULT_FAILURE_MESSAGE: &str = "the request failed";

/// Client-side view of the tracked request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TrackedStatus {
    /// Nothing outstanding.
    #[default]
    Idle,
    Queued,
    Processing,
    Done,
    Error,
}

impl TrackedStatus {
    fn rank(self) -> u8 {
        match self {
            TrackedStatus::Idle => 0,
            TrackedStatus::Queued => 1,
            TrackedStatus::Processing => 2,
            TrackedStatus::Done | TrackedStatus::Error => 3,
        }
    }

    /// Queued or processing.
    pub fn is_pending(self) -> bool {
        matches!(self, TrackedStatus::Queued | TrackedStatus::Processing)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TrackedStatus::Done | TrackedStatus::Error)
    }
}

impl From<RequestStatus> for TrackedStatus {
    fn from(status: RequestStatus) -> Self {
        match status {
            RequestStatus::Queued => TrackedStatus::Queued,
            RequestStatus::Processing => TrackedStatus::Processing,
            RequestStatus::Done => TrackedStatus::Done,
            RequestStatus::Error => TrackedStatus::Error,
        }
    }
}

/// What the status banner is derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub status: TrackedStatus,
    pub request_id: Option<RequestId>,
    /// Failure reason, set only while `status` is `Error`.
    pub error: Option<String>,
}

/// Banner a view shows above the message list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusBanner {
    Queued,
    Processing,
    Failed { message: String, can_retry: bool },
}

impl StatusSnapshot {
    pub fn is_pending(&self) -> bool {
        self.status.is_pending()
    }

    pub fn can_retry(&self) -> bool {
        self.status == TrackedStatus::Error && self.request_id.is_some()
    }

    /// `None` while idle or done.
    pub fn banner(&self) -> Option<StatusBanner> {
        match self.status {
            TrackedStatus::Queued => Some(StatusBanner::Queued),
            TrackedStatus::Processing => Some(StatusBanner::Processing),
            TrackedStatus::Error => Some(StatusBanner::Failed {
                message: self
                    .error
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
                can_retry: self.can_retry(),
            }),
            TrackedStatus::Idle | TrackedStatus::Done => None,
        }
    }
}

/// Input to [`reduce`].
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    /// A request was just dispatched. The id may be unknown until the first poll.
    Started { request_id: Option<RequestId> },
    /// A failed request was re-armed; its journey starts over.
    Retried { request_id: RequestId },
    /// The latest request read once on activation.
    Resumed(ChatRequest),
    /// Result of one status poll; `None` means the backend has no request.
    Polled(Option<ChatRequest>),
    /// An assistant message arrived on the push path.
    AssistantArrived,
    /// The poll loop hit its attempt cap.
    AttemptsExhausted,
}

/// Effect of one [`reduce`] step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transition {
    /// The snapshot differs from before the event.
    pub changed: bool,
    /// Polling for the current request should stop.
    pub halts: bool,
}

/// Fold one event into the snapshot.
pub fn reduce(snapshot: &mut StatusSnapshot, event: StatusEvent) -> Transition {
    let before = snapshot.clone();
    let halts = match event {
        StatusEvent::Started { request_id } => {
            *snapshot = StatusSnapshot {
                status: TrackedStatus::Queued,
                request_id,
                error: None,
            };
            false
        }
        StatusEvent::Retried { request_id } => {
            *snapshot = StatusSnapshot {
                status: TrackedStatus::Queued,
                request_id: Some(request_id),
                error: None,
            };
            false
        }
        StatusEvent::Resumed(request) => {
            let status = match TrackedStatus::from(request.status) {
                TrackedStatus::Done => TrackedStatus::Idle,
                other => other,
            };
            *snapshot = StatusSnapshot {
                status,
                error: failure_reason(&request),
                request_id: Some(request.id),
            };
            !status.is_pending()
        }
        StatusEvent::Polled(None) => {
            *snapshot = StatusSnapshot::default();
            true
        }
        StatusEvent::Polled(Some(request)) => apply_poll(snapshot, request),
        StatusEvent::AssistantArrived => {
            if snapshot.status.is_pending() {
                snapshot.status = TrackedStatus::Idle;
                snapshot.error = None;
                true
            } else {
                false
            }
        }
        StatusEvent::AttemptsExhausted => true,
    };
    Transition {
        changed: *snapshot != before,
        halts,
    }
}

fn apply_poll(snapshot: &mut StatusSnapshot, request: ChatRequest) -> bool {
    let status = TrackedStatus::from(request.status);
    let same_request = snapshot
        .request_id
        .as_ref()
        .is_none_or(|id| *id == request.id);

    if same_request {
        if !snapshot.status.is_pending() {
            return true;
        }
        // Out-of-order result from before a later observation.
        if status.rank() < snapshot.status.rank() {
            return false;
        }
    }

    snapshot.status = status;
    snapshot.error = failure_reason(&request);
    snapshot.request_id = Some(request.id);
    status.is_terminal()
}

fn failure_reason(request: &ChatRequest) -> Option<String> {
    (request.status == RequestStatus::Error).then(|| {
        request
            .error
            .clone()
            .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string())
    })
}

/// Owned handle to one background task of the coordinator.
struct PollHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PollHandle {
    fn cancel(self) -> JoinHandle<()> {
        self.token.cancel();
        self.task
    }
}

#[derive(Default)]
struct Control {
    generation: u64,
    disposed: bool,
    poll: Option<PollHandle>,
    observer: Option<PollHandle>,
}

struct Inner {
    conversation_id: ConversationId,
    backend: Arc<dyn ChatBackend>,
    dispatcher: Arc<RequestDispatcher>,
    poll_interval: Duration,
    max_attempts: u32,
    state: watch::Sender<StatusSnapshot>,
    control: Mutex<Control>,
}

impl Inner {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: StatusEvent) -> Transition {
        let mut transition = Transition::default();
        self.state.send_if_modified(|snapshot| {
            transition = reduce(snapshot, event);
            transition.changed
        });
        transition
    }

    /// Apply `event` on behalf of the poll loop of `generation`.
    /// `None` when that loop has been superseded or the coordinator disposed.
    fn apply(&self, generation: u64, event: StatusEvent) -> Option<Transition> {
        let control = self.control();
        if control.disposed || control.generation != generation {
            return None;
        }
        Some(self.publish(event))
    }

    /// Start a new journey: supersede any running poll loop, apply `event`,
    /// and poll while the result is pending. Returns `false` once disposed.
    fn begin(self: &Arc<Self>, event: StatusEvent) -> bool {
        let mut control = self.control();
        if control.disposed {
            return false;
        }
        control.generation += 1;
        let generation = control.generation;
        if let Some(previous) = control.poll.take() {
            previous.cancel();
        }

        self.publish(event);
        let pending = self.state.borrow().is_pending();
        if pending {
            let token = CancellationToken::new();
            let task = tokio::spawn(
                Arc::clone(self)
                    .poll_loop(generation, token.clone())
                    .instrument(info_span!(
                        "status_poll",
                        conversation_id = %self.conversation_id,
                        generation
                    )),
            );
            control.poll = Some(PollHandle { token, task });
        }
        true
    }

    async fn poll_loop(self: Arc<Self>, generation: u64, token: CancellationToken) {
        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }

            let polled = tokio::select! {
                _ = token.cancelled() => return,
                polled = self.backend.get_latest_request_status(&self.conversation_id) => polled,
            };
            let request = match polled {
                Ok(request) => request,
                Err(e) => {
                    warn!(attempt, error = %e, "status poll failed");
                    continue;
                }
            };
            if let Some(foreign) = request
                .as_ref()
                .filter(|r| r.conversation_id != self.conversation_id)
            {
                warn!(
                    request_id = %foreign.id,
                    other_conversation = %foreign.conversation_id,
                    "poll returned a request for another conversation, ignored"
                );
                continue;
            }

            match self.apply(generation, StatusEvent::Polled(request)) {
                None => {
                    debug!("stale poll result discarded");
                    return;
                }
                Some(transition) if transition.halts => {
                    debug!(attempt, status = %self.state.borrow().status, "polling halted");
                    return;
                }
                Some(_) => {}
            }
        }

        if self
            .apply(generation, StatusEvent::AttemptsExhausted)
            .is_some()
        {
            debug!(
                attempts = self.max_attempts,
                status = %self.state.borrow().status,
                "poll attempts exhausted, keeping last status"
            );
        }
    }

    fn on_message(&self, message: &Message) {
        if message.conversation_id != self.conversation_id || message.sender != Sender::Assistant
        {
            return;
        }
        let mut control = self.control();
        if control.disposed {
            return;
        }
        let pending = self.state.borrow().is_pending();
        if !pending {
            return;
        }

        control.generation += 1;
        if let Some(poll) = control.poll.take() {
            poll.cancel();
        }
        self.publish(StatusEvent::AssistantArrived);
        info!(
            conversation_id = %self.conversation_id,
            message_id = %message.id,
            "assistant reply arrived, polling stopped"
        );
    }
}

/// Tracks the latest request of one conversation and drives the banner.
///
/// Created per active conversation and disposed when the user switches
/// away. After disposal no state update is ever applied. Dropping the
/// coordinator disposes it.
pub struct RequestStatusCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RequestStatusCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestStatusCoordinator")
            .field("conversation_id", &self.inner.conversation_id)
            .field("snapshot", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

impl RequestStatusCoordinator {
    pub fn new(
        conversation_id: ConversationId,
        backend: Arc<dyn ChatBackend>,
        dispatcher: Arc<RequestDispatcher>,
        poll_interval: Duration,
        max_attempts: u32,
    ) -> Self {
        let (state, _) = watch::channel(StatusSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                conversation_id,
                backend,
                dispatcher,
                poll_interval,
                max_attempts,
                state,
                control: Mutex::new(Control::default()),
            }),
        }
    }

    /// Poll cadence and attempt cap taken from `[chat]`.
    pub fn from_config(
        conversation_id: ConversationId,
        backend: Arc<dyn ChatBackend>,
        dispatcher: Arc<RequestDispatcher>,
        config: &ChatConfig,
    ) -> Self {
        Self::new(
            conversation_id,
            backend,
            dispatcher,
            config.poll_interval(),
            config.max_poll_attempts,
        )
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.inner.conversation_id
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn banner(&self) -> Option<StatusBanner> {
        self.inner.state.borrow().banner()
    }

    /// Whether a poll loop is still running.
    pub fn is_polling(&self) -> bool {
        self.inner
            .control()
            .poll
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Show `queued` and poll until the request settles, replacing any
    /// poll loop already running.
    pub fn start_polling(&self, request_id: Option<RequestId>) {
        if self.inner.begin(StatusEvent::Started { request_id }) {
            debug!(conversation_id = %self.inner.conversation_id, "status polling started");
        }
    }

    /// Settle a pending request when its assistant reply arrives.
    pub fn on_message(&self, message: &Message) {
        self.inner.on_message(message);
    }

    /// Feed every arrival from `arrivals` into [`Self::on_message`] until
    /// the coordinator is disposed.
    pub fn observe_arrivals(&self, mut arrivals: broadcast::Receiver<Message>) {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        _ = cancelled.cancelled() => break,
                        received = arrivals.recv() => match received {
                            Ok(message) => inner.on_message(&message),
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!(skipped, "arrival signals lagged");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        },
                    }
                }
            }
            .in_current_span(),
        );

        let mut control = self.inner.control();
        let handle = PollHandle { token, task };
        if control.disposed {
            handle.cancel();
            return;
        }
        if let Some(previous) = control.observer.replace(handle) {
            previous.cancel();
        }
    }

    /// Re-dispatch the failed request and poll it again from `queued`.
    ///
    /// Returns `Ok(false)` without side effects unless the status is
    /// `error` with a known request id.
    pub async fn retry(&self) -> Result<bool, AtriumError> {
        let request_id = {
            let snapshot = self.inner.state.borrow();
            match (&snapshot.status, &snapshot.request_id) {
                (TrackedStatus::Error, Some(id)) => id.clone(),
                _ => return Ok(false),
            }
        };
        if self.inner.control().disposed {
            return Ok(false);
        }

        self.inner.dispatcher.redispatch(&request_id).await?;
        info!(
            conversation_id = %self.inner.conversation_id,
            request_id = %request_id,
            "retrying failed request"
        );
        Ok(self.inner.begin(StatusEvent::Retried { request_id }))
    }

    /// Read the latest request once and pick up where a previous session
    /// left off: poll a pending request, show a failed one.
    pub async fn resume(&self) -> Result<(), AtriumError> {
        let conversation_id = &self.inner.conversation_id;
        let latest = self
            .inner
            .backend
            .get_latest_request_status(conversation_id)
            .await
            .inspect_err(|e| warn!(conversation_id = %conversation_id, error = %e, "status resume failed"))?;

        match latest {
            Some(request) if &request.conversation_id == conversation_id => {
                debug!(
                    conversation_id = %conversation_id,
                    request_id = %request.id,
                    status = %request.status,
                    "resuming request status"
                );
                self.inner.begin(StatusEvent::Resumed(request));
            }
            _ => debug!(conversation_id = %conversation_id, "no request to resume"),
        }
        Ok(())
    }

    fn teardown(&self) -> Vec<JoinHandle<()>> {
        let mut control = self.inner.control();
        control.disposed = true;
        control.generation += 1;
        [control.poll.take(), control.observer.take()]
            .into_iter()
            .flatten()
            .map(PollHandle::cancel)
            .collect()
    }

    /// Cancel every task. Nothing is applied to the snapshot afterwards.
    pub fn dispose(&self) {
        let tasks = self.teardown();
        if !tasks.is_empty() {
            debug!(conversation_id = %self.inner.conversation_id, "status coordinator disposed");
        }
    }

    /// Dispose and wait for the background tasks to finish.
    pub async fn close(&self) {
        for task in self.teardown() {
            if let Err(e) = task.await
                && !e.is_cancelled()
            {
                warn!(conversation_id = %self.inner.conversation_id, error = %e, "status task ended abnormally");
            }
        }
    }
}

impl Drop for RequestStatusCoordinator {
    fn drop(&mut self) {
        self.dispose();
    }
}
