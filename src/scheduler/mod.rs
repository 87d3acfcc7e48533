//! Trigger-driven dispatch of processes and ensemble rounds.
//!
//! The scheduler owns every registered [`Schedulable`] and runs each on its
//! own tokio task: periodic triggers fire on the `offset + n*period` grid
//! (a missed tick is delivered late, never twice), knowledge-change triggers
//! suspend on a store subscription until a commit touches one of their
//! declared watched paths. Invocations of different schedulables run
//! concurrently; the store's per-root sessions are the only synchronization
//! between them.
//!
//! Failures inside an invocation are contained here: they are logged and the
//! schedulable goes back to `Waiting`. Nothing an invocation does can take
//! the scheduler down.

mod core;

pub use core::{ProcessRunner, Scheduler};

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::knowledge::WatchPath;
use crate::path::KnowledgePath;
use crate::process::ProcessError;

/// When a schedulable runs.
#[derive(Clone, Debug)]
pub enum Trigger {
    /// Fire at `offset, offset+period, offset+2*period, …` (best effort).
    Periodic { offset: Duration, period: Duration },
    /// Fire when a commit touches one of the watched paths.
    KnowledgeChange { watched: Vec<KnowledgePath> },
}

impl Trigger {
    pub fn periodic(period: Duration) -> Self {
        Trigger::Periodic {
            offset: Duration::ZERO,
            period,
        }
    }

    pub fn periodic_with_offset(offset: Duration, period: Duration) -> Self {
        Trigger::Periodic { offset, period }
    }

    pub fn on_change(watched: Vec<KnowledgePath>) -> Self {
        Trigger::KnowledgeChange { watched }
    }
}

/// Lifecycle of one registered schedulable.
///
/// `Waiting` means a timer is armed or a change subscription is parked;
/// both suspend without consuming CPU. `Triggered` is the instant between
/// wake-up and the start of execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ProcessState {
    Idle = 0,
    Waiting = 1,
    Triggered = 2,
    Executing = 3,
}

#[derive(Debug, Default)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn set(&self, state: ProcessState) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub(crate) fn get(&self) -> ProcessState {
        match self.0.load(Ordering::Acquire) {
            1 => ProcessState::Waiting,
            2 => ProcessState::Triggered,
            3 => ProcessState::Executing,
            _ => ProcessState::Idle,
        }
    }
}

/// Handle returned by registration: observe the state machine, keep the id
/// for deregistration.
#[derive(Clone)]
pub struct RegistrationHandle {
    id: String,
    state: Arc<StateCell>,
}

impl RegistrationHandle {
    pub(crate) fn new(id: String, state: Arc<StateCell>) -> Self {
        RegistrationHandle { id, state }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ProcessState {
        self.state.get()
    }
}

/// Anything the scheduler can drive: component processes and ensemble
/// rounds both implement this.
#[async_trait]
pub trait Schedulable: Send + Sync {
    fn id(&self) -> &str;

    fn trigger(&self) -> &Trigger;

    /// The concrete watch set for a knowledge-change trigger. Resolved once
    /// when the task starts; only consulted for `Trigger::KnowledgeChange`.
    async fn watches(&self) -> Vec<WatchPath> {
        Vec::new()
    }

    /// One invocation. Implementations contain their own domain failures
    /// where the error table says so; whatever still comes out is logged by
    /// the scheduler and never escalates further.
    async fn execute(&self) -> Result<(), ProcessError>;
}

/// Errors from (de)registration, the only scheduler errors there are;
/// everything at invocation time is contained and logged.
#[derive(Debug, Error, Diagnostic)]
pub enum SchedulerError {
    #[error("a schedulable with id '{id}' is already registered")]
    #[diagnostic(code(murmuration::scheduler::duplicate_id))]
    DuplicateId { id: String },

    #[error("invalid trigger for '{id}': {reason}")]
    #[diagnostic(
        code(murmuration::scheduler::invalid_trigger),
        help("periodic triggers need a non-zero period")
    )]
    InvalidTrigger { id: String, reason: &'static str },
}
