//! The in-process knowledge store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::OwnedMutexGuard;

use crate::path::{self, ResolvedPath};

use super::{
    ChangeHub, ChangeNotification, ChangeSubscription, KnowledgeError, KnowledgeRepository, RootId,
    Session, WatchPath,
};

struct RootTree {
    value: Value,
    version: u64,
}

/// In-memory [`KnowledgeRepository`]: one mutex-guarded tree per root.
///
/// The per-root `tokio::sync::Mutex` is the sole synchronization primitive.
/// Sessions take owned guards in canonical root order, so multi-root
/// sessions cannot deadlock, and commit order per root is lock acquisition
/// order (serializable per root).
pub struct LocalKnowledgeStore {
    roots: Mutex<FxHashMap<RootId, Arc<tokio::sync::Mutex<RootTree>>>>,
    hub: Arc<ChangeHub>,
}

impl Default for LocalKnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalKnowledgeStore {
    pub fn new() -> Self {
        LocalKnowledgeStore {
            roots: Mutex::new(FxHashMap::default()),
            hub: ChangeHub::new(),
        }
    }

    fn handle(&self, root: &RootId) -> Result<Arc<tokio::sync::Mutex<RootTree>>, KnowledgeError> {
        self.roots
            .lock()
            .expect("root table poisoned")
            .get(root)
            .cloned()
            .ok_or_else(|| KnowledgeError::not_found(format!("{root}:")))
    }

    /// Commit version of one root; bumps once per committed session.
    pub async fn root_version(&self, root: &RootId) -> Result<u64, KnowledgeError> {
        let handle = self.handle(root)?;
        let tree = handle.lock().await;
        Ok(tree.version)
    }
}

#[async_trait]
impl KnowledgeRepository for LocalKnowledgeStore {
    async fn register_root(&self, root: RootId, initial: Value) -> Result<(), KnowledgeError> {
        {
            let mut roots = self.roots.lock().expect("root table poisoned");
            if roots.contains_key(&root) {
                return Err(KnowledgeError::conflict(&root));
            }
            roots.insert(
                root.clone(),
                Arc::new(tokio::sync::Mutex::new(RootTree {
                    value: initial,
                    version: 1,
                })),
            );
        }
        self.hub.publish(&ChangeNotification {
            root: root.clone(),
            version: 1,
            changed: vec![ResolvedPath::whole_root(root)],
            when: Utc::now(),
        });
        Ok(())
    }

    async fn known_roots(&self) -> Vec<RootId> {
        let mut roots: Vec<RootId> = self
            .roots
            .lock()
            .expect("root table poisoned")
            .keys()
            .cloned()
            .collect();
        roots.sort();
        roots
    }

    async fn snapshot(&self, root: &RootId) -> Result<Value, KnowledgeError> {
        let handle = self.handle(root)?;
        let tree = handle.lock().await;
        Ok(tree.value.clone())
    }

    async fn create_session(&self, roots: &[RootId]) -> Result<Box<dyn Session>, KnowledgeError> {
        let mut ids: Vec<RootId> = roots.to_vec();
        ids.sort();
        ids.dedup();
        let mut entries = Vec::with_capacity(ids.len());
        for root in ids {
            let handle = self.handle(&root)?;
            entries.push(SessionRoot {
                root,
                handle,
                guard: None,
                working: None,
                changed: Vec::new(),
            });
        }
        Ok(Box::new(LocalSession {
            entries,
            hub: Arc::clone(&self.hub),
            begun: false,
            succeeded: false,
        }))
    }

    fn subscribe(&self, watches: Vec<WatchPath>) -> ChangeSubscription {
        self.hub.subscribe(watches)
    }
}

struct SessionRoot {
    root: RootId,
    handle: Arc<tokio::sync::Mutex<RootTree>>,
    guard: Option<OwnedMutexGuard<RootTree>>,
    /// Copy-on-begin working tree; all reads and staged writes go here.
    working: Option<Value>,
    changed: Vec<ResolvedPath>,
}

struct LocalSession {
    entries: Vec<SessionRoot>,
    hub: Arc<ChangeHub>,
    begun: bool,
    succeeded: bool,
}

impl LocalSession {
    fn entry(&self, root: &RootId) -> Result<&SessionRoot, KnowledgeError> {
        self.entries
            .iter()
            .find(|entry| entry.root == *root)
            .ok_or_else(|| {
                KnowledgeError::access(format!("root {root} is not part of this session"))
            })
    }

    fn entry_mut(&mut self, root: &RootId) -> Result<&mut SessionRoot, KnowledgeError> {
        self.entries
            .iter_mut()
            .find(|entry| entry.root == *root)
            .ok_or_else(|| {
                KnowledgeError::access(format!("root {root} is not part of this session"))
            })
    }

    fn require_begun(&self) -> Result<(), KnowledgeError> {
        if self.begun {
            Ok(())
        } else {
            Err(KnowledgeError::access("session has not begun"))
        }
    }

    fn release(&mut self) {
        for entry in &mut self.entries {
            entry.guard = None;
            entry.working = None;
            entry.changed.clear();
        }
    }
}

#[async_trait]
impl Session for LocalSession {
    async fn begin(&mut self) -> Result<(), KnowledgeError> {
        if self.begun {
            return Err(KnowledgeError::access("session already begun"));
        }
        // Entries are sorted by root id at creation; acquiring in that order
        // keeps concurrent multi-root sessions deadlock-free.
        for entry in &mut self.entries {
            let guard = Arc::clone(&entry.handle).lock_owned().await;
            entry.working = Some(guard.value.clone());
            entry.guard = Some(guard);
        }
        self.begun = true;
        Ok(())
    }

    fn read(&self, target: &ResolvedPath) -> Result<Value, KnowledgeError> {
        self.require_begun()?;
        let entry = self.entry(&target.root)?;
        let tree = entry
            .working
            .as_ref()
            .ok_or_else(|| KnowledgeError::access("session has not begun"))?;
        path::lookup(tree, &target.steps)
            .cloned()
            .ok_or_else(|| KnowledgeError::not_found(target))
    }

    fn write(&mut self, target: &ResolvedPath, value: Value) -> Result<(), KnowledgeError> {
        self.require_begun()?;
        let entry = self.entry_mut(&target.root)?;
        let tree = entry
            .working
            .as_mut()
            .ok_or_else(|| KnowledgeError::access("session has not begun"))?;
        path::write_at(tree, target, value)?;
        entry.changed.push(target.clone());
        Ok(())
    }

    fn remove(&mut self, target: &ResolvedPath) -> Result<(), KnowledgeError> {
        self.require_begun()?;
        let entry = self.entry_mut(&target.root)?;
        let tree = entry
            .working
            .as_mut()
            .ok_or_else(|| KnowledgeError::access("session has not begun"))?;
        path::remove_at(tree, target)?;
        entry.changed.push(target.clone());
        Ok(())
    }

    async fn end(&mut self) -> Result<(), KnowledgeError> {
        self.require_begun()?;
        let mut notifications = Vec::new();
        for entry in &mut self.entries {
            let mut guard = entry
                .guard
                .take()
                .ok_or_else(|| KnowledgeError::access("session already ended"))?;
            if entry.changed.is_empty() {
                entry.working = None;
                continue;
            }
            guard.value = entry
                .working
                .take()
                .ok_or_else(|| KnowledgeError::access("session already ended"))?;
            guard.version += 1;
            notifications.push(ChangeNotification {
                root: entry.root.clone(),
                version: guard.version,
                changed: std::mem::take(&mut entry.changed),
                when: Utc::now(),
            });
        }
        // Guards are all dropped before notifying so woken listeners can
        // open their own sessions immediately.
        self.succeeded = true;
        for notification in &notifications {
            self.hub.publish(notification);
        }
        Ok(())
    }

    fn cancel(&mut self) {
        self.release();
        self.begun = false;
    }

    fn repeat(&self) -> bool {
        !self.succeeded
    }

    fn has_succeeded(&self) -> bool {
        self.succeeded
    }
}
