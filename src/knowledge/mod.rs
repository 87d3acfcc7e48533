//! The knowledge store: per-component knowledge trees, transactional
//! sessions, and commit-time change notification.
//!
//! Every component owns one knowledge *root*, a JSON tree identified by a
//! stable [`RootId`], and all access to it goes through a [`Session`]:
//! `begin()` takes exclusive, deadlock-free locks on the roots the session
//! declared, reads see one consistent snapshot (plus the session's own
//! staged writes), and `end()` commits everything atomically or `cancel()`
//! discards it with zero observable effects.
//!
//! Values are deep-copied on the way out of the store and on the way in, so
//! callers may freely mutate what they read without corrupting stored state.
//! With [`serde_json::Value`] a clone *is* a deep copy, which makes the
//! isolation a value-semantics guarantee rather than an incidental cloning
//! step.
//!
//! The backend is pluggable behind [`KnowledgeRepository`]: the bundled
//! [`LocalKnowledgeStore`] keeps everything in process memory; a distributed
//! implementation would replicate roots across nodes behind the same trait
//! (plus a [`crate::marshal::Marshaller`] for the wire) and must deliver
//! change notifications with at-least-once semantics.

mod changeset;
mod error;
mod local;
mod notify;
mod repository;

pub use changeset::{ChangeOp, ChangeSet, ValueSet};
pub use error::KnowledgeError;
pub use local::LocalKnowledgeStore;
pub use notify::{ChangeHub, ChangeNotification, ChangeSubscription, WatchPath};
pub use repository::{KnowledgeRepository, RetryPolicy, Session, with_session};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of one component's knowledge root.
///
/// Assigned at first registration and never reused. Ordered so that
/// multi-root sessions can take locks in a canonical order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RootId(String);

impl RootId {
    pub fn new(id: impl Into<String>) -> Self {
        RootId(id.into())
    }

    /// A fresh, never-before-used root id.
    pub fn fresh() -> Self {
        RootId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RootId {
    fn from(value: &str) -> Self {
        RootId(value.to_string())
    }
}

impl From<String> for RootId {
    fn from(value: String) -> Self {
        RootId(value)
    }
}
