use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use tracing::debug;

use crate::path::ResolvedPath;

use super::{ChangeOp, ChangeSet, ChangeSubscription, KnowledgeError, RootId, ValueSet, WatchPath};

/// A scoped, retryable unit of atomic store access.
///
/// The lifecycle mirrors the classic try-until-it-sticks loop: `begin()`
/// acquires exclusive access to the roots the session was created for
/// (blocking while contended), reads then see one consistent snapshot plus
/// the session's own staged writes, and `end()` commits the whole buffer
/// atomically, or `cancel()` throws it away with zero observable effects
/// (no partial writeback, no notification fired). `repeat()` reports that
/// the session has not yet succeeded, so a caller can drive its own retry
/// loop; [`with_session`] packages the bounded version of that loop.
#[async_trait]
pub trait Session: Send {
    /// Acquire exclusive access to the session's roots. Blocks (suspends)
    /// while any of them is held by another session.
    async fn begin(&mut self) -> Result<(), KnowledgeError>;

    /// Read the value at a resolved path, deep-copied out of the store.
    /// Sees the session's own staged writes.
    fn read(&self, path: &ResolvedPath) -> Result<Value, KnowledgeError>;

    /// Stage a write. Nothing is visible outside the session until `end()`.
    fn write(&mut self, path: &ResolvedPath, value: Value) -> Result<(), KnowledgeError>;

    /// Stage a deletion.
    fn remove(&mut self, path: &ResolvedPath) -> Result<(), KnowledgeError>;

    /// Commit all staged writes atomically, release access, fire change
    /// notifications, and mark the session succeeded. On error the buffer
    /// is discarded and access released.
    async fn end(&mut self) -> Result<(), KnowledgeError>;

    /// Discard staged writes and release access without marking success.
    fn cancel(&mut self);

    /// True while the session has not yet succeeded.
    fn repeat(&self) -> bool;

    fn has_succeeded(&self) -> bool;
}

/// Backend contract of the knowledge store.
///
/// [`super::LocalKnowledgeStore`] is the in-process implementation; a
/// distributed one replicates roots behind this same trait, marshals values
/// with [`crate::marshal::Marshaller`], and owes subscribers at-least-once
/// change notification delivery.
#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    /// Create a root with its initial knowledge. Fails with `Conflict` when
    /// the id is already taken; root ids are never reused.
    async fn register_root(&self, root: RootId, initial: Value) -> Result<(), KnowledgeError>;

    /// Every root currently known to this store, in id order.
    async fn known_roots(&self) -> Vec<RootId>;

    /// Deep copy of one root's whole knowledge tree.
    async fn snapshot(&self, root: &RootId) -> Result<Value, KnowledgeError>;

    /// Open a session over the given roots. Access is not acquired until
    /// [`Session::begin`].
    async fn create_session(&self, roots: &[RootId]) -> Result<Box<dyn Session>, KnowledgeError>;

    /// Register a watch set for commit notifications.
    fn subscribe(&self, watches: Vec<WatchPath>) -> ChangeSubscription;

    /// One-shot consistent read of several locations. Fails `NotFound` if
    /// any of them has no entry.
    async fn get(&self, paths: &[ResolvedPath]) -> Result<ValueSet, KnowledgeError> {
        let mut roots: Vec<RootId> = paths.iter().map(|p| p.root.clone()).collect();
        roots.sort();
        roots.dedup();
        let mut session = self.create_session(&roots).await?;
        session.begin().await?;
        let mut values = ValueSet::new();
        for path in paths {
            match session.read(path) {
                Ok(value) => values.set(path.clone(), value),
                Err(err) => {
                    session.cancel();
                    return Err(err);
                }
            }
        }
        session.end().await?;
        Ok(values)
    }

    /// One-shot atomic application of a change set.
    async fn update(&self, changes: ChangeSet) -> Result<(), KnowledgeError> {
        let roots = changes.roots();
        let mut session = self.create_session(&roots).await?;
        session.begin().await?;
        for op in changes.ops() {
            let outcome = match op {
                ChangeOp::Put { path, value } => session.write(path, value.clone()),
                ChangeOp::Remove { path } => session.remove(path),
            };
            if let Err(err) = outcome {
                session.cancel();
                return Err(err);
            }
        }
        session.end().await
    }
}

/// Bounds for the optimistic session retry loop.
///
/// The unbounded "retry forever" reading of `repeat()` risks livelock under
/// sustained contention, so retries are capped and spaced with jittered
/// exponential backoff. Exhaustion surfaces as `Conflict` to the caller,
/// which skips the invocation or candidate pair for the round.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 8,
            backoff_base: Duration::from_millis(2),
        }
    }
}

impl RetryPolicy {
    const BACKOFF_CAP: Duration = Duration::from_millis(250);

    /// Delay before the given attempt (1-based): doubling from the base,
    /// capped, with ±50% jitter so contending sessions fan out.
    pub fn delay(&self, attempt: usize) -> Duration {
        let exp = attempt.saturating_sub(1).min(16) as u32;
        let base = self
            .backoff_base
            .saturating_mul(2u32.saturating_pow(exp))
            .min(Self::BACKOFF_CAP);
        base.mul_f64(rand::rng().random_range(0.5..1.5))
    }
}

/// Run `body` inside a session over `roots`, retrying on `Conflict` up to
/// the policy's bound.
///
/// Each attempt gets a fresh session: begin, run the body against the
/// snapshot, commit. A `Conflict` from the body or the commit cancels the
/// attempt and retries after a backoff delay; any other error cancels and
/// propagates untouched (so `NotFound` keeps meaning "skip this round" at
/// the call site).
pub async fn with_session<T, F>(
    repo: &dyn KnowledgeRepository,
    roots: &[RootId],
    policy: &RetryPolicy,
    mut body: F,
) -> Result<T, KnowledgeError>
where
    F: FnMut(&mut dyn Session) -> Result<T, KnowledgeError>,
{
    let mut attempt = 0usize;
    loop {
        let mut session = repo.create_session(roots).await?;
        session.begin().await?;
        let failed = match body(session.as_mut()) {
            Ok(value) => match session.end().await {
                Ok(()) => return Ok(value),
                Err(err) => err,
            },
            Err(err) => {
                session.cancel();
                err
            }
        };
        attempt += 1;
        if !failed.is_conflict() || attempt > policy.max_retries {
            return Err(failed);
        }
        debug!(attempt, error = %failed, "session conflicted, retrying");
        tokio::time::sleep(policy.delay(attempt)).await;
    }
}
