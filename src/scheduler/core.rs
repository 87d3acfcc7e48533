use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::knowledge::{KnowledgeRepository, RetryPolicy, WatchPath};
use crate::path::EvaluationContext;
use crate::process::{self, InvocationOutcome, ProcessError, SchedulableProcess};

use super::{
    ProcessState, RegistrationHandle, Schedulable, SchedulerError, StateCell, Trigger,
};

struct Entry {
    task: Arc<dyn Schedulable>,
    state: Arc<StateCell>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Inner {
    entries: FxHashMap<String, Entry>,
    running: bool,
}

/// Owns all registered schedulables and their driver tasks.
///
/// Registration and deregistration may happen concurrently with ticking.
/// Deregistration signals the driver task and returns immediately: an
/// invocation already in flight completes, but nothing new is scheduled
/// after it.
pub struct Scheduler {
    store: Arc<dyn KnowledgeRepository>,
    inner: Mutex<Inner>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn KnowledgeRepository>) -> Self {
        Scheduler {
            store,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Register a schedulable. If the scheduler is running, its driver task
    /// starts immediately; otherwise it starts with [`Scheduler::start`].
    pub fn register(
        &self,
        task: Arc<dyn Schedulable>,
    ) -> Result<RegistrationHandle, SchedulerError> {
        let id = task.id().to_string();
        if let Trigger::Periodic { period, .. } = task.trigger() {
            if period.is_zero() {
                return Err(SchedulerError::InvalidTrigger {
                    id,
                    reason: "period must be non-zero",
                });
            }
        }
        let mut inner = self.inner.lock().expect("scheduler poisoned");
        if inner.entries.contains_key(&id) {
            return Err(SchedulerError::DuplicateId { id });
        }
        let state = Arc::new(StateCell::default());
        let mut entry = Entry {
            task,
            state: Arc::clone(&state),
            shutdown: None,
            handle: None,
        };
        if inner.running {
            self.spawn(&mut entry);
        }
        debug!(id = %id, "schedulable registered");
        inner.entries.insert(id.clone(), entry);
        Ok(RegistrationHandle::new(id, state))
    }

    /// Remove a schedulable. In-flight work completes; no further tick is
    /// scheduled. Returns false when the id was not registered.
    pub fn deregister(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().expect("scheduler poisoned");
        match inner.entries.remove(id) {
            Some(mut entry) => {
                if let Some(shutdown) = entry.shutdown.take() {
                    let _ = shutdown.send(());
                }
                debug!(id, "schedulable deregistered");
                true
            }
            None => false,
        }
    }

    /// Spawn driver tasks for everything registered so far and for every
    /// later registration.
    pub fn start(&self) {
        let mut inner = self.inner.lock().expect("scheduler poisoned");
        if inner.running {
            return;
        }
        inner.running = true;
        for entry in inner.entries.values_mut() {
            self.spawn(entry);
        }
        info!(count = inner.entries.len(), "scheduler started");
    }

    /// Signal every driver task and wait for them to wind down. In-flight
    /// invocations complete first.
    pub async fn stop(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut inner = self.inner.lock().expect("scheduler poisoned");
            if !inner.running {
                return;
            }
            inner.running = false;
            inner
                .entries
                .values_mut()
                .filter_map(|entry| {
                    if let Some(shutdown) = entry.shutdown.take() {
                        let _ = shutdown.send(());
                    }
                    entry.handle.take()
                })
                .collect()
        };
        futures_util::future::join_all(handles).await;
        info!("scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().expect("scheduler poisoned").running
    }

    fn spawn(&self, entry: &mut Entry) {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = Arc::clone(&entry.task);
        let state = Arc::clone(&entry.state);
        let store = Arc::clone(&self.store);
        entry.shutdown = Some(shutdown_tx);
        entry.handle = Some(tokio::spawn(drive(task, state, store, shutdown_rx)));
    }
}

/// One schedulable's driver loop, from spawn until shutdown.
async fn drive(
    task: Arc<dyn Schedulable>,
    state: Arc<StateCell>,
    store: Arc<dyn KnowledgeRepository>,
    mut shutdown: oneshot::Receiver<()>,
) {
    match task.trigger().clone() {
        Trigger::Periodic { offset, period } => {
            let mut ticks = tokio::time::interval_at(Instant::now() + offset, period);
            // Stay on the offset + n*period grid: a tick missed under load
            // is delivered late, never fired twice to catch up.
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                state.set(ProcessState::Waiting);
                tokio::select! {
                    biased;
                    _ = &mut shutdown => break,
                    _ = ticks.tick() => {}
                }
                run_once(&*task, &state).await;
            }
        }
        Trigger::KnowledgeChange { .. } => {
            let watches = task.watches().await;
            if watches.is_empty() {
                warn!(id = task.id(), "no resolvable watched paths; parking until shutdown");
                state.set(ProcessState::Waiting);
                let _ = shutdown.await;
            } else {
                let subscription = store.subscribe(watches);
                loop {
                    state.set(ProcessState::Waiting);
                    let woken = tokio::select! {
                        biased;
                        _ = &mut shutdown => break,
                        notification = subscription.recv() => notification,
                    };
                    // None means the store (and its hub) went away.
                    if woken.is_none() {
                        break;
                    }
                    run_once(&*task, &state).await;
                }
            }
        }
    }
    state.set(ProcessState::Idle);
}

async fn run_once(task: &dyn Schedulable, state: &StateCell) {
    state.set(ProcessState::Triggered);
    state.set(ProcessState::Executing);
    if let Err(err) = task.execute().await {
        // Contained by design note in the error table: an invocation that
        // fails simply does not produce outputs this round.
        warn!(id = task.id(), error = %err, "invocation failed");
    }
}

/// Adapts a [`SchedulableProcess`] to the scheduler: binds parameters in the
/// owner component's context, invokes, writes back atomically.
pub struct ProcessRunner {
    process: SchedulableProcess,
    store: Arc<dyn KnowledgeRepository>,
    policy: RetryPolicy,
}

impl ProcessRunner {
    pub fn new(
        process: SchedulableProcess,
        store: Arc<dyn KnowledgeRepository>,
        policy: RetryPolicy,
    ) -> Self {
        ProcessRunner {
            process,
            store,
            policy,
        }
    }
}

#[async_trait::async_trait]
impl Schedulable for ProcessRunner {
    fn id(&self) -> &str {
        &self.process.id
    }

    fn trigger(&self) -> &Trigger {
        &self.process.trigger
    }

    /// Resolve the declared watched paths once, against the owner's current
    /// knowledge. Paths whose index sub-expressions cannot currently be
    /// resolved are dropped with a log line; they would need re-registration
    /// after the knowledge shape changes.
    async fn watches(&self) -> Vec<WatchPath> {
        let Trigger::KnowledgeChange { watched } = &self.process.trigger else {
            return Vec::new();
        };
        let ctx = EvaluationContext::component(self.process.owner.clone());
        let mut resolved = Vec::with_capacity(watched.len());
        let session = self.store.create_session(&ctx.roots()).await;
        let Ok(mut session) = session else {
            warn!(id = %self.process.id, "owner root unknown; no watches resolved");
            return Vec::new();
        };
        if session.begin().await.is_err() {
            return Vec::new();
        }
        for path in watched {
            match crate::path::resolve(path, &ctx, session.as_ref()) {
                Ok(target) => resolved.push(WatchPath::exact(target)),
                Err(err) => {
                    warn!(id = %self.process.id, path = %path, error = %err, "watched path dropped");
                }
            }
        }
        session.cancel();
        resolved
    }

    async fn execute(&self) -> Result<(), ProcessError> {
        let ctx = EvaluationContext::component(self.process.owner.clone());
        let outcome = process::run_invocation(
            &*self.store,
            &self.policy,
            &ctx,
            &self.process.parameters,
            &*self.process.body,
        )
        .await?;
        if let InvocationOutcome::Completed { writes } = outcome {
            debug!(id = %self.process.id, writes, "invocation completed");
        }
        Ok(())
    }
}
