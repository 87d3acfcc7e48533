//! Commit-time change notification.
//!
//! The store publishes one [`ChangeNotification`] per root per committed
//! session. Consumers (the scheduler, mostly) register a watch set and get a
//! [`ChangeSubscription`], a cancellable handle that unsubscribes on drop.
//! Delivery is at-least-once: a distributed backend may redeliver, so waking
//! up on a duplicate must be harmless to the consumer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::path::{PathStep, ResolvedPath};

use super::RootId;

/// A location (or subtree) a consumer wants wake-ups for.
///
/// `root: None` watches the path's steps in every known root, the shape an
/// ensemble trigger needs, since its candidates are not known up front.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchPath {
    pub root: Option<RootId>,
    pub steps: Vec<PathStep>,
}

impl WatchPath {
    /// Watch one concrete location.
    pub fn exact(path: ResolvedPath) -> Self {
        WatchPath {
            root: Some(path.root),
            steps: path.steps,
        }
    }

    /// Watch the same steps in every root.
    pub fn any_root(steps: Vec<PathStep>) -> Self {
        WatchPath { root: None, steps }
    }

    /// Whether a committed change at `changed` should wake this watch.
    ///
    /// Overlap is symmetric prefix containment: a write to a subtree touches
    /// every watched location under it, and a leaf write changes the value
    /// visible at an ancestor watch. Sibling paths never match.
    pub fn matches(&self, changed: &ResolvedPath) -> bool {
        if let Some(root) = &self.root {
            if *root != changed.root {
                return false;
            }
        }
        let n = self.steps.len().min(changed.steps.len());
        self.steps[..n] == changed.steps[..n]
    }
}

/// What a committed session changed in one root.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub root: RootId,
    /// The root's commit version after this session.
    pub version: u64,
    pub changed: Vec<ResolvedPath>,
    pub when: DateTime<Utc>,
}

struct SubEntry {
    id: u64,
    watches: Vec<WatchPath>,
    sender: flume::Sender<ChangeNotification>,
}

/// Fan-out point between committing sessions and subscribed consumers.
#[derive(Default)]
pub struct ChangeHub {
    subs: Mutex<Vec<SubEntry>>,
    next_id: AtomicU64,
}

impl ChangeHub {
    pub fn new() -> Arc<Self> {
        Arc::new(ChangeHub::default())
    }

    /// Register a watch set; the returned subscription unsubscribes on drop.
    pub fn subscribe(self: &Arc<Self>, watches: Vec<WatchPath>) -> ChangeSubscription {
        let (sender, receiver) = flume::unbounded();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subs
            .lock()
            .expect("change hub poisoned")
            .push(SubEntry {
                id,
                watches,
                sender,
            });
        ChangeSubscription {
            id,
            receiver,
            hub: Arc::downgrade(self),
        }
    }

    /// Deliver a committed change to every subscription it overlaps.
    pub fn publish(&self, notification: &ChangeNotification) {
        let mut subs = self.subs.lock().expect("change hub poisoned");
        subs.retain(|entry| !entry.sender.is_disconnected());
        for entry in subs.iter() {
            let hit = entry
                .watches
                .iter()
                .any(|watch| notification.changed.iter().any(|path| watch.matches(path)));
            if hit {
                let _ = entry.sender.send(notification.clone());
            }
        }
    }

    fn unsubscribe(&self, id: u64) {
        if let Ok(mut subs) = self.subs.lock() {
            subs.retain(|entry| entry.id != id);
        }
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subs.lock().expect("change hub poisoned").len()
    }
}

/// A live watch registration. Receiving suspends without consuming CPU;
/// dropping the subscription cancels it.
pub struct ChangeSubscription {
    id: u64,
    receiver: flume::Receiver<ChangeNotification>,
    hub: Weak<ChangeHub>,
}

impl ChangeSubscription {
    /// Wait for the next matching committed change.
    ///
    /// Returns `None` once the hub is gone (store dropped).
    pub async fn recv(&self) -> Option<ChangeNotification> {
        self.receiver.recv_async().await.ok()
    }

    /// Non-blocking poll, mostly for drain loops and tests.
    pub fn try_recv(&self) -> Option<ChangeNotification> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathStep;

    fn steps(fields: &[&str]) -> Vec<PathStep> {
        fields
            .iter()
            .map(|f| PathStep::Field(f.to_string()))
            .collect()
    }

    fn notification(root: &str, changed: &[&[&str]]) -> ChangeNotification {
        ChangeNotification {
            root: RootId::from(root),
            version: 1,
            changed: changed
                .iter()
                .map(|fields| ResolvedPath::new(RootId::from(root), steps(fields)))
                .collect(),
            when: Utc::now(),
        }
    }

    #[test]
    fn watch_matches_prefix_overlap_but_not_siblings() {
        let watch = WatchPath {
            root: Some(RootId::from("r")),
            steps: steps(&["incomingRequests", "42"]),
        };
        let same = ResolvedPath::new(RootId::from("r"), steps(&["incomingRequests", "42"]));
        let under = ResolvedPath::new(
            RootId::from("r"),
            steps(&["incomingRequests", "42", "payload"]),
        );
        let ancestor = ResolvedPath::new(RootId::from("r"), steps(&["incomingRequests"]));
        let sibling = ResolvedPath::new(RootId::from("r"), steps(&["processedResponses", "42"]));
        assert!(watch.matches(&same));
        assert!(watch.matches(&under));
        assert!(watch.matches(&ancestor));
        assert!(!watch.matches(&sibling));
        let other_root = ResolvedPath::new(RootId::from("q"), steps(&["incomingRequests", "42"]));
        assert!(!watch.matches(&other_root));
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let hub = ChangeHub::new();
        let sub = hub.subscribe(vec![WatchPath::any_root(steps(&["a"]))]);
        assert_eq!(hub.subscriber_count(), 1);
        drop(sub);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn publish_reaches_only_overlapping_watchers() {
        let hub = ChangeHub::new();
        let hit = hub.subscribe(vec![WatchPath::any_root(steps(&["a", "b"]))]);
        let miss = hub.subscribe(vec![WatchPath::any_root(steps(&["c"]))]);
        hub.publish(&notification("r", &[&["a", "b", "deep"]]));
        assert!(hit.try_recv().is_some());
        assert!(miss.try_recv().is_none());
    }
}
