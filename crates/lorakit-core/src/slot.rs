//! Per-operation job slots.
//!
//! Each backend operation kind owns one slot. A slot holds at most one
//! in-flight request; its state moves Idle -> Pending -> Succeeded/Failed,
//! and any settled state may go Pending again on a new submission.

use crate::error::SubmitError;
use chrono::{DateTime, Utc};
use lorakit_client::{JobFailure, JobKind};
use std::fmt;

/// Identifies one submission. Completions carrying an older ticket than the
/// slot's current one are stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

impl Ticket {
    pub fn generation(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Pending { ticket: Ticket, submitted_at: DateTime<Utc> },
    Succeeded { ticket: Ticket, finished_at: DateTime<Utc> },
    Failed { ticket: Ticket, failure: JobFailure, finished_at: DateTime<Utc> },
}

impl SlotState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending { .. } => "pending",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobSlot {
    kind: JobKind,
    state: SlotState,
    generation: u64,
}

impl JobSlot {
    pub fn new(kind: JobKind) -> Self {
        Self { kind, state: SlotState::Idle, generation: 0 }
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn state(&self) -> &SlotState {
        &self.state
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, SlotState::Pending { .. })
    }

    /// Ticket of the in-flight request, if any.
    pub fn pending_ticket(&self) -> Option<Ticket> {
        match self.state {
            SlotState::Pending { ticket, .. } => Some(ticket),
            _ => None,
        }
    }

    /// When the in-flight request was submitted.
    pub fn pending_since(&self) -> Option<DateTime<Utc>> {
        match self.state {
            SlotState::Pending { submitted_at, .. } => Some(submitted_at),
            _ => None,
        }
    }

    /// Failure from the most recent settled request, if it failed.
    pub fn last_failure(&self) -> Option<&JobFailure> {
        match &self.state {
            SlotState::Failed { failure, .. } => Some(failure),
            _ => None,
        }
    }

    /// Moves the slot to Pending under a fresh ticket.
    ///
    /// Rejected with [`SubmitError::Busy`] while a request is in flight; the
    /// slot is left untouched in that case.
    pub fn begin(&mut self) -> Result<Ticket, SubmitError> {
        if self.is_pending() {
            return Err(SubmitError::Busy(self.kind));
        }
        self.generation += 1;
        let ticket = Ticket(self.generation);
        self.state = SlotState::Pending { ticket, submitted_at: Utc::now() };
        Ok(ticket)
    }

    /// Settles the pending request identified by `ticket`.
    ///
    /// Returns false, changing nothing, when `ticket` is not the one in flight.
    pub fn resolve(&mut self, ticket: Ticket, outcome: Result<(), JobFailure>) -> bool {
        if self.pending_ticket() != Some(ticket) {
            return false;
        }
        let finished_at = Utc::now();
        self.state = match outcome {
            Ok(()) => SlotState::Succeeded { ticket, finished_at },
            Err(failure) => SlotState::Failed { ticket, failure, finished_at },
        };
        true
    }
}
