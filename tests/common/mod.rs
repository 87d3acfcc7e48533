#![allow(dead_code)]

use std::sync::Arc;

use murmuration::knowledge::{ChangeSet, KnowledgeRepository, LocalKnowledgeStore, RootId};
use murmuration::path::{IndexExpr, IndexKey, PathStep, ResolvedPath, parse};
use serde_json::Value;

pub fn store() -> Arc<LocalKnowledgeStore> {
    Arc::new(LocalKnowledgeStore::new())
}

pub async fn seeded_store(roots: &[(&str, Value)]) -> Arc<LocalKnowledgeStore> {
    let store = store();
    for (id, initial) in roots {
        store
            .register_root(RootId::from(*id), initial.clone())
            .await
            .expect("seed root");
    }
    store
}

/// Build a [`ResolvedPath`] from a static expression (fields and literal
/// indexes only, no runtime evaluation involved).
pub fn rpath(root: &str, expr: &str) -> ResolvedPath {
    let parsed = parse(expr).expect("static path");
    let mut steps = Vec::new();
    for segment in &parsed.segments {
        steps.push(PathStep::Field(segment.name.clone()));
        match &segment.index {
            None => {}
            Some(IndexExpr::Literal(key)) => steps.push(PathStep::Key(key.clone())),
            Some(IndexExpr::Path(_)) => panic!("rpath only takes literal indexes: {expr}"),
        }
    }
    ResolvedPath::new(RootId::from(root), steps)
}

/// One-shot read of a single static path.
pub async fn read(
    store: &Arc<LocalKnowledgeStore>,
    root: &str,
    expr: &str,
) -> Result<Value, murmuration::knowledge::KnowledgeError> {
    let path = rpath(root, expr);
    let mut values = store.get(std::slice::from_ref(&path)).await?;
    Ok(values.take(&path).expect("get returned the requested path"))
}

/// One-shot write of a single static path.
pub async fn put(store: &Arc<LocalKnowledgeStore>, root: &str, expr: &str, value: Value) {
    let mut changes = ChangeSet::new();
    changes.put(rpath(root, expr), value);
    store.update(changes).await.expect("update");
}

pub fn key(text: &str) -> PathStep {
    PathStep::Key(IndexKey::Text(text.to_string()))
}
