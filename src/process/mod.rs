//! Schedulable processes: parameter-bound units of work over knowledge.
//!
//! A process declares *what* it reads and writes as a list of
//! [`Parameter`]s (direction plus knowledge path) and supplies an opaque
//! async [`ProcessBody`]. The runtime binds the parameters inside one
//! session (one consistent snapshot), runs the body with no locks held, and
//! writes all produced outputs back in a single atomic session. A process
//! whose required inputs cannot currently be resolved simply does not run
//! this round; it is reattempted on its next trigger.

mod invocation;

pub use invocation::{BindOutcome, InvocationOutcome, bind_arguments, run_invocation};

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

use crate::knowledge::{KnowledgeError, RootId};
use crate::path::{KnowledgePath, ResolvedPath};
use crate::scheduler::Trigger;

/// How a parameter moves data between knowledge and the process body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Read-only snapshot of the current value.
    In,
    /// Write-only output slot; the current value is ignored.
    Out,
    /// Read the current value and possibly write a new one. The slot only
    /// writes back if its read succeeded too.
    InOut,
}

/// One declared input/output of a process or exchange mapping.
#[derive(Clone, Debug)]
pub struct Parameter {
    pub direction: Direction,
    pub path: KnowledgePath,
}

impl Parameter {
    pub fn new(direction: Direction, path: KnowledgePath) -> Self {
        Parameter { direction, path }
    }

    /// Parse-and-build convenience: `Parameter::input("position.x")?`.
    pub fn input(path: &str) -> Result<Self, crate::path::PathParseError> {
        Ok(Parameter::new(Direction::In, crate::path::parse(path)?))
    }

    pub fn output(path: &str) -> Result<Self, crate::path::PathParseError> {
        Ok(Parameter::new(Direction::Out, crate::path::parse(path)?))
    }

    pub fn in_out(path: &str) -> Result<Self, crate::path::PathParseError> {
        Ok(Parameter::new(Direction::InOut, crate::path::parse(path)?))
    }
}

/// One bound slot: the input snapshot (for `In`/`InOut`) and the output
/// value the body may produce (for `Out`/`InOut`).
#[derive(Clone, Debug)]
pub struct ArgumentSlot {
    parameter: Parameter,
    input: Option<Value>,
    output: Option<Value>,
    /// Resolved writeback address; `None` disables writeback for the slot
    /// (`In` parameters, and `InOut` slots whose read did not succeed).
    target: Option<ResolvedPath>,
}

impl ArgumentSlot {
    pub(crate) fn new(
        parameter: Parameter,
        input: Option<Value>,
        target: Option<ResolvedPath>,
    ) -> Self {
        ArgumentSlot {
            parameter,
            input,
            output: None,
            target,
        }
    }

    pub fn direction(&self) -> Direction {
        self.parameter.direction
    }

    pub(crate) fn take_write(&mut self) -> Option<(ResolvedPath, Value)> {
        match (self.target.take(), self.output.take()) {
            (Some(target), Some(value)) => Some((target, value)),
            _ => None,
        }
    }
}

/// The bound arguments handed to a [`ProcessBody`], positionally matching
/// the declared parameter list.
#[derive(Clone, Debug, Default)]
pub struct ArgumentSet {
    slots: Vec<ArgumentSlot>,
}

impl ArgumentSet {
    pub(crate) fn from_slots(slots: Vec<ArgumentSlot>) -> Self {
        ArgumentSet { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The input snapshot of slot `index`, if it was bound.
    pub fn input(&self, index: usize) -> Option<&Value> {
        self.slots.get(index).and_then(|slot| slot.input.as_ref())
    }

    /// Like [`input`](Self::input) but an error when absent, for bodies
    /// whose logic cannot proceed without the value.
    pub fn required(&self, index: usize) -> Result<&Value, ProcessError> {
        self.input(index)
            .ok_or(ProcessError::MissingArgument { index })
    }

    /// Set the output of slot `index`. Fails on `In` slots. Output written
    /// to an `InOut` slot whose read did not succeed is accepted and then
    /// dropped at writeback, per the exchange rules.
    pub fn set_output(&mut self, index: usize, value: Value) -> Result<(), ProcessError> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(ProcessError::MissingArgument { index })?;
        if slot.parameter.direction == Direction::In {
            return Err(ProcessError::NotWritable { index });
        }
        slot.output = Some(value);
        Ok(())
    }

    pub(crate) fn drain_writes(&mut self) -> Vec<(ResolvedPath, Value)> {
        self.slots
            .iter_mut()
            .filter_map(ArgumentSlot::take_write)
            .collect()
    }
}

/// The opaque callable of a process or exchange mapping.
///
/// Bodies receive their arguments positionally and communicate results by
/// filling output slots; they never touch the store directly, which is what
/// makes the surrounding invocation atomic and retryable.
#[async_trait]
pub trait ProcessBody: Send + Sync {
    async fn run(&self, args: &mut ArgumentSet) -> Result<(), ProcessError>;
}

struct FnBody<F>(F);

#[async_trait]
impl<F> ProcessBody for FnBody<F>
where
    F: Fn(&mut ArgumentSet) -> Result<(), ProcessError> + Send + Sync,
{
    async fn run(&self, args: &mut ArgumentSet) -> Result<(), ProcessError> {
        (self.0)(args)
    }
}

/// Wrap a synchronous closure as a [`ProcessBody`].
pub fn body_fn<F>(f: F) -> Arc<dyn ProcessBody>
where
    F: Fn(&mut ArgumentSet) -> Result<(), ProcessError> + Send + Sync + 'static,
{
    Arc::new(FnBody(f))
}

/// A process bound to its owning component root and trigger.
#[derive(Clone)]
pub struct SchedulableProcess {
    pub id: String,
    pub owner: RootId,
    pub trigger: Trigger,
    pub parameters: Vec<Parameter>,
    pub body: Arc<dyn ProcessBody>,
}

impl std::fmt::Debug for SchedulableProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulableProcess")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("trigger", &self.trigger)
            .field("parameters", &self.parameters.len())
            .finish_non_exhaustive()
    }
}

/// Errors from binding, invoking, or writing back a process.
#[derive(Debug, Error, Diagnostic)]
pub enum ProcessError {
    /// The body asked for an argument that was never bound.
    #[error("argument {index} is not bound")]
    #[diagnostic(
        code(murmuration::process::missing_argument),
        help("check the parameter list against the body's positional accesses")
    )]
    MissingArgument { index: usize },

    /// The body tried to write an `In` slot.
    #[error("argument {index} is read-only")]
    #[diagnostic(code(murmuration::process::not_writable))]
    NotWritable { index: usize },

    /// Store or evaluation failure during bind/writeback.
    #[error(transparent)]
    #[diagnostic(code(murmuration::process::knowledge))]
    Knowledge(#[from] KnowledgeError),

    /// JSON (de)serialization inside a body.
    #[error(transparent)]
    #[diagnostic(code(murmuration::process::serde))]
    Serde(#[from] serde_json::Error),

    /// Domain failure reported by the body itself.
    #[error("process body failed: {message}")]
    #[diagnostic(code(murmuration::process::body))]
    Body { message: String },
}

impl ProcessError {
    pub fn body(message: impl Into<String>) -> Self {
        ProcessError::Body {
            message: message.into(),
        }
    }
}
