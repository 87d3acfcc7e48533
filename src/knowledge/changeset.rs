use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::path::ResolvedPath;

use super::RootId;

/// Values read out of the store, keyed by the resolved path they came from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValueSet {
    values: FxHashMap<ResolvedPath, Value>,
}

impl ValueSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: ResolvedPath, value: Value) {
        self.values.insert(path, value);
    }

    pub fn get(&self, path: &ResolvedPath) -> Option<&Value> {
        self.values.get(path)
    }

    pub fn take(&mut self, path: &ResolvedPath) -> Option<Value> {
        self.values.remove(path)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResolvedPath, &Value)> {
        self.values.iter()
    }
}

/// One buffered mutation of a knowledge tree.
#[derive(Clone, Debug, PartialEq)]
pub enum ChangeOp {
    Put { path: ResolvedPath, value: Value },
    Remove { path: ResolvedPath },
}

impl ChangeOp {
    pub fn path(&self) -> &ResolvedPath {
        match self {
            ChangeOp::Put { path, .. } | ChangeOp::Remove { path } => path,
        }
    }
}

/// An ordered batch of mutations, committed atomically by a session.
///
/// Updates and deletions are kept apart from each other only by the op kind;
/// application order is the order of insertion, so later ops win over
/// earlier ones at the same location.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeSet {
    ops: Vec<ChangeOp>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, path: ResolvedPath, value: Value) -> &mut Self {
        self.ops.push(ChangeOp::Put { path, value });
        self
    }

    pub fn remove(&mut self, path: ResolvedPath) -> &mut Self {
        self.ops.push(ChangeOp::Remove { path });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[ChangeOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<ChangeOp> {
        self.ops
    }

    /// The distinct roots this change set touches, in lock order.
    pub fn roots(&self) -> Vec<RootId> {
        let mut roots: Vec<RootId> = self.ops.iter().map(|op| op.path().root.clone()).collect();
        roots.sort();
        roots.dedup();
        roots
    }
}
