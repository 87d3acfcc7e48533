//! Bind → invoke → writeback, the three phases of running a process.

use tracing::debug;

use crate::knowledge::{
    KnowledgeError, KnowledgeRepository, RetryPolicy, RootId, Session, with_session,
};
use crate::path::{self, EvaluationContext};

use super::{ArgumentSet, ArgumentSlot, Direction, Parameter, ProcessBody, ProcessError};

/// Result of the bind phase.
#[derive(Debug)]
pub enum BindOutcome {
    Bound(ArgumentSet),
    /// A required parameter could not be resolved; the invocation is skipped
    /// for this round. Carries the offending path for the log line.
    Unresolved(String),
}

/// What an invocation did this round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvocationOutcome {
    Completed { writes: usize },
    Skipped { unresolved: String },
}

/// Bind every parameter against one session snapshot.
///
/// `In` parameters must resolve and read; a miss aborts the bind as
/// [`BindOutcome::Unresolved`]. `Out` parameters must resolve their target
/// address (an unresolvable output is equally fatal to the round: the body
/// would have nowhere to put its result). `InOut` parameters are lenient:
/// a failed resolution or read leaves the slot unbound and disables its
/// writeback, nothing more.
pub fn bind_arguments(
    parameters: &[Parameter],
    ctx: &EvaluationContext,
    session: &dyn Session,
) -> Result<BindOutcome, KnowledgeError> {
    let mut slots = Vec::with_capacity(parameters.len());
    for parameter in parameters {
        let resolved = match path::resolve(&parameter.path, ctx, session) {
            Ok(resolved) => Some(resolved),
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err),
        };
        let slot = match parameter.direction {
            Direction::In => {
                let Some(resolved) = resolved else {
                    return Ok(BindOutcome::Unresolved(parameter.path.to_string()));
                };
                match session.read(&resolved) {
                    Ok(value) => ArgumentSlot::new(parameter.clone(), Some(value), None),
                    Err(err) if err.is_not_found() => {
                        return Ok(BindOutcome::Unresolved(parameter.path.to_string()));
                    }
                    Err(err) => return Err(err),
                }
            }
            Direction::Out => {
                let Some(resolved) = resolved else {
                    return Ok(BindOutcome::Unresolved(parameter.path.to_string()));
                };
                ArgumentSlot::new(parameter.clone(), None, Some(resolved))
            }
            Direction::InOut => match resolved {
                Some(resolved) => match session.read(&resolved) {
                    Ok(value) => ArgumentSlot::new(parameter.clone(), Some(value), Some(resolved)),
                    Err(err) if err.is_not_found() => {
                        ArgumentSlot::new(parameter.clone(), None, None)
                    }
                    Err(err) => return Err(err),
                },
                None => ArgumentSlot::new(parameter.clone(), None, None),
            },
        };
        slots.push(slot);
    }
    Ok(BindOutcome::Bound(ArgumentSet::from_slots(slots)))
}

/// Run one full invocation: bind in a session, invoke with no locks held,
/// write all outputs back in one atomic session.
///
/// Store-level `Conflict`s inside either session are retried within the
/// policy's bounds; an unresolved required input skips the invocation (it
/// will be reattempted on the next trigger).
pub async fn run_invocation(
    repo: &dyn KnowledgeRepository,
    policy: &RetryPolicy,
    ctx: &EvaluationContext,
    parameters: &[Parameter],
    body: &dyn ProcessBody,
) -> Result<InvocationOutcome, ProcessError> {
    let bind_roots = ctx.roots();
    let bound = with_session(repo, &bind_roots, policy, |session| {
        bind_arguments(parameters, ctx, session)
    })
    .await?;

    let mut args = match bound {
        BindOutcome::Bound(args) => args,
        BindOutcome::Unresolved(unresolved) => {
            debug!(path = %unresolved, "input unresolved, skipping invocation this round");
            return Ok(InvocationOutcome::Skipped { unresolved });
        }
    };

    body.run(&mut args).await?;

    let writes = args.drain_writes();
    if writes.is_empty() {
        return Ok(InvocationOutcome::Completed { writes: 0 });
    }

    let mut roots: Vec<RootId> = writes.iter().map(|(path, _)| path.root.clone()).collect();
    roots.sort();
    roots.dedup();
    let count = writes.len();
    with_session(repo, &roots, policy, |session| {
        for (target, value) in &writes {
            session.write(target, value.clone())?;
        }
        Ok(())
    })
    .await?;

    Ok(InvocationOutcome::Completed { writes: count })
}
