//! Runs backend requests off the interaction path.
//!
//! Every submission is spawned as its own tokio task. Finished tasks report
//! back over a channel, and their results are applied to slots only when the
//! owner drains completions, so all slot mutation happens in one place.

use crate::error::SubmitError;
use crate::slot::{JobSlot, Ticket};
use lorakit_client::{JobClient, JobFailure, JobKind, JobRequest, JobResponse, JobResult};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Per-kind time limits. `None` means wait indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTimeouts {
    /// Applies to every kind except training.
    pub short: Option<Duration>,
    pub train: Option<Duration>,
}

impl Default for JobTimeouts {
    fn default() -> Self {
        Self { short: Some(Duration::from_secs(60)), train: None }
    }
}

impl JobTimeouts {
    pub fn for_kind(&self, kind: JobKind) -> Option<Duration> {
        match kind {
            JobKind::Train => self.train,
            _ => self.short,
        }
    }
}

/// A finished request, as reported by its task.
#[derive(Debug)]
pub struct Completion {
    pub kind: JobKind,
    pub ticket: Ticket,
    pub result: JobResult<JobResponse>,
}

pub struct JobController {
    client: Arc<dyn JobClient>,
    timeouts: JobTimeouts,
    slots: BTreeMap<JobKind, JobSlot>,
    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
    deferred: VecDeque<Completion>,
}

impl JobController {
    pub fn new(client: Arc<dyn JobClient>, timeouts: JobTimeouts) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let slots = JobKind::ALL.into_iter().map(|kind| (kind, JobSlot::new(kind))).collect();
        Self { client, timeouts, slots, tx, rx, deferred: VecDeque::new() }
    }

    pub fn timeouts(&self) -> JobTimeouts {
        self.timeouts
    }

    pub fn slot(&self, kind: JobKind) -> &JobSlot {
        &self.slots[&kind]
    }

    pub fn slots(&self) -> impl Iterator<Item = &JobSlot> {
        self.slots.values()
    }

    pub fn has_pending(&self) -> bool {
        self.slots.values().any(JobSlot::is_pending)
    }

    /// Starts `request` in the background.
    ///
    /// Fails without side effects if the slot for the request's kind is
    /// already pending, or if called outside a tokio runtime.
    pub fn submit(&mut self, request: JobRequest) -> Result<Ticket, SubmitError> {
        let kind = request.kind();
        let handle = Handle::try_current().map_err(|_| SubmitError::NoRuntime)?;
        let ticket = self
            .slots
            .entry(kind)
            .or_insert_with(|| JobSlot::new(kind))
            .begin()?;

        let client = Arc::clone(&self.client);
        let tx = self.tx.clone();
        let limit = self.timeouts.for_kind(kind);
        info!(%kind, %ticket, timeout_secs = limit.map(|d| d.as_secs()), "submitting job");

        handle.spawn(async move {
            let call = client.dispatch(request);
            let result = match limit {
                Some(limit) => tokio::time::timeout(limit, call)
                    .await
                    .unwrap_or_else(|_| Err(JobFailure::timeout(limit))),
                None => call.await,
            };
            if tx.send(Completion { kind, ticket, result }).is_err() {
                debug!(%kind, %ticket, "job finished after its controller was dropped");
            }
        });

        Ok(ticket)
    }

    /// Applies a completion to its slot. Returns it back only if it settled
    /// the slot's current request; stale completions are dropped.
    fn settle(&mut self, completion: Completion) -> Option<Completion> {
        let outcome = completion.result.as_ref().map(|_| ()).map_err(JobFailure::clone);
        let slot = self.slots.get_mut(&completion.kind)?;
        if !slot.resolve(completion.ticket, outcome) {
            debug!(kind = %completion.kind, ticket = %completion.ticket, "discarding stale completion");
            return None;
        }
        match &completion.result {
            Ok(_) => info!(kind = %completion.kind, ticket = %completion.ticket, "job succeeded"),
            Err(failure) => warn!(kind = %completion.kind, ticket = %completion.ticket, %failure, "job failed"),
        }
        Some(completion)
    }

    /// Waits for the next request to finish. Returns `None` when nothing is
    /// pending and nothing is left over from [`JobController::await_slot`].
    pub async fn next_completion(&mut self) -> Option<Completion> {
        if let Some(completion) = self.deferred.pop_front() {
            return Some(completion);
        }
        self.recv_settled().await
    }

    /// Waits until the request in `kind`'s slot finishes. Completions for
    /// other slots that arrive first are settled and kept for the next
    /// `next_completion`/`poll_completions`. Returns `None` if the slot is
    /// not pending.
    ///
    /// Dropping the future stops waiting; the request keeps running and is
    /// picked up by a later call.
    pub async fn await_slot(&mut self, kind: JobKind) -> Option<Completion> {
        while self.slot(kind).is_pending() {
            let completion = self.recv_settled().await?;
            if completion.kind == kind {
                return Some(completion);
            }
            self.deferred.push_back(completion);
        }
        None
    }

    async fn recv_settled(&mut self) -> Option<Completion> {
        while self.has_pending() {
            let completion = self.rx.recv().await?;
            if let Some(completion) = self.settle(completion) {
                return Some(completion);
            }
        }
        None
    }

    /// Applies every completion that has already arrived, without waiting.
    pub fn poll_completions(&mut self) -> Vec<Completion> {
        let mut settled: Vec<Completion> = self.deferred.drain(..).collect();
        while let Ok(completion) = self.rx.try_recv() {
            settled.extend(self.settle(completion));
        }
        settled
    }
}

impl std::fmt::Debug for JobController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobController")
            .field("timeouts", &self.timeouts)
            .field("slots", &self.slots)
            .finish_non_exhaustive()
    }
}
