//! Path evaluation against live knowledge.
//!
//! [`resolve`] turns a parsed [`KnowledgePath`] into a concrete
//! [`ResolvedPath`] by substituting the evaluation context's roots and
//! evaluating index sub-paths (innermost first, against the same context, in
//! the same session, so a multi-path bind sees one snapshot). Evaluation is
//! idempotent and side-effect-free; only the explicit write helpers mutate.
//!
//! Reads never materialize anything. Writes create missing intermediate
//! levels as JSON objects (numeric keys stringify), so an `Out` parameter
//! like `coord.incomingRequests[member.id]` works against a coordinator that
//! has not seen a request yet. Descending through an existing scalar is
//! refused rather than silently overwriting it.

use serde_json::Value;

use crate::knowledge::{KnowledgeError, RootId, Session};

use super::{IndexExpr, IndexKey, KnowledgePath, PathRoot, PathStep, ResolvedPath};

/// Binds path roles (`Local` / `Coordinator` / `Member`) to concrete roots.
#[derive(Clone, Debug)]
pub struct EvaluationContext {
    local: Option<RootId>,
    coordinator: Option<RootId>,
    member: Option<RootId>,
}

impl EvaluationContext {
    /// Context of a component process: plain paths resolve to its own root,
    /// role-prefixed paths are unbound.
    pub fn component(root: RootId) -> Self {
        EvaluationContext {
            local: Some(root),
            coordinator: None,
            member: None,
        }
    }

    /// Context of an ensemble pair: `coord.` and `member.` are bound, plain
    /// paths are ambiguous and therefore unbound.
    pub fn ensemble(coordinator: RootId, member: RootId) -> Self {
        EvaluationContext {
            local: None,
            coordinator: Some(coordinator),
            member: Some(member),
        }
    }

    pub fn root_for(&self, role: PathRoot) -> Result<&RootId, KnowledgeError> {
        let (bound, name) = match role {
            PathRoot::Local => (self.local.as_ref(), "plain"),
            PathRoot::Coordinator => (self.coordinator.as_ref(), "coord"),
            PathRoot::Member => (self.member.as_ref(), "member"),
        };
        bound.ok_or_else(|| {
            KnowledgeError::access(format!(
                "{name} paths are not bound in this evaluation context"
            ))
        })
    }

    /// Every root this context can touch, in lock order: the root set for
    /// sessions that evaluate paths under this context.
    pub fn roots(&self) -> Vec<RootId> {
        let mut roots: Vec<RootId> = [&self.local, &self.coordinator, &self.member]
            .into_iter()
            .flatten()
            .cloned()
            .collect();
        roots.sort();
        roots.dedup();
        roots
    }
}

/// Resolve a path to a concrete address within the session's snapshot.
pub fn resolve(
    path: &KnowledgePath,
    ctx: &EvaluationContext,
    session: &dyn Session,
) -> Result<ResolvedPath, KnowledgeError> {
    let root = ctx.root_for(path.root)?.clone();
    let mut steps = Vec::with_capacity(path.segments.len());
    for segment in &path.segments {
        steps.push(PathStep::Field(segment.name.clone()));
        if let Some(index) = &segment.index {
            let key = match index {
                IndexExpr::Literal(key) => key.clone(),
                IndexExpr::Path(sub) => {
                    let value = read_path(sub, ctx, session)?;
                    index_key_from(&value, path)?
                }
            };
            steps.push(PathStep::Key(key));
        }
    }
    Ok(ResolvedPath { root, steps })
}

/// Resolve and read in one step.
pub fn read_path(
    path: &KnowledgePath,
    ctx: &EvaluationContext,
    session: &dyn Session,
) -> Result<Value, KnowledgeError> {
    let resolved = resolve(path, ctx, session)?;
    session.read(&resolved)
}

fn index_key_from(value: &Value, enclosing: &KnowledgePath) -> Result<IndexKey, KnowledgeError> {
    match value {
        Value::String(text) => Ok(IndexKey::Text(text.clone())),
        Value::Number(number) => number
            .as_u64()
            .map(|n| IndexKey::Pos(n as usize))
            .ok_or_else(|| KnowledgeError::not_found(enclosing)),
        _ => Err(KnowledgeError::not_found(enclosing)),
    }
}

/// Follow concrete steps through a tree. Returns `None` as soon as a step
/// cannot be taken.
pub fn lookup<'a>(tree: &'a Value, steps: &[PathStep]) -> Option<&'a Value> {
    let mut current = tree;
    for step in steps {
        current = match (current, step) {
            (Value::Object(map), PathStep::Field(name)) => map.get(name)?,
            (Value::Object(map), PathStep::Key(IndexKey::Text(key))) => map.get(key)?,
            (Value::Object(map), PathStep::Key(IndexKey::Pos(pos))) => {
                map.get(&pos.to_string())?
            }
            (Value::Array(items), PathStep::Key(IndexKey::Pos(pos))) => items.get(*pos)?,
            (Value::Array(items), PathStep::Key(IndexKey::Text(key))) => {
                items.get(key.parse::<usize>().ok()?)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Write a value at a concrete address, creating missing intermediate
/// objects along the way.
pub fn write_at(
    tree: &mut Value,
    target: &ResolvedPath,
    value: Value,
) -> Result<(), KnowledgeError> {
    let Some((last, prefix)) = target.steps.split_last() else {
        *tree = value;
        return Ok(());
    };
    let mut current = tree;
    for step in prefix {
        current = descend_or_create(current, step, target)?;
    }
    match (current, last) {
        (Value::Object(map), PathStep::Field(name)) => {
            map.insert(name.clone(), value);
        }
        (Value::Object(map), PathStep::Key(key)) => {
            map.insert(key.to_string(), value);
        }
        (Value::Array(items), PathStep::Key(IndexKey::Pos(pos))) => {
            if *pos < items.len() {
                items[*pos] = value;
            } else if *pos == items.len() {
                items.push(value);
            } else {
                return Err(write_refused(target, "array index past the end"));
            }
        }
        (Value::Array(_), _) => {
            return Err(write_refused(target, "array needs a numeric index"));
        }
        (_, _) => return Err(write_refused(target, "cannot write beneath a scalar")),
    }
    Ok(())
}

/// Remove the entry at a concrete address. Fails `NotFound` when there is
/// nothing there.
pub fn remove_at(tree: &mut Value, target: &ResolvedPath) -> Result<(), KnowledgeError> {
    let Some((last, prefix)) = target.steps.split_last() else {
        *tree = Value::Null;
        return Ok(());
    };
    let mut current = tree;
    for step in prefix {
        current = match (current, step) {
            (Value::Object(map), PathStep::Field(name)) => map.get_mut(name),
            (Value::Object(map), PathStep::Key(key)) => map.get_mut(&key.to_string()),
            (Value::Array(items), PathStep::Key(IndexKey::Pos(pos))) => items.get_mut(*pos),
            _ => None,
        }
        .ok_or_else(|| KnowledgeError::not_found(target))?;
    }
    let removed = match (current, last) {
        (Value::Object(map), PathStep::Field(name)) => map.remove(name).is_some(),
        (Value::Object(map), PathStep::Key(key)) => map.remove(&key.to_string()).is_some(),
        (Value::Array(items), PathStep::Key(IndexKey::Pos(pos))) => {
            if *pos < items.len() {
                items.remove(*pos);
                true
            } else {
                false
            }
        }
        _ => false,
    };
    if removed {
        Ok(())
    } else {
        Err(KnowledgeError::not_found(target))
    }
}

fn descend_or_create<'a>(
    current: &'a mut Value,
    step: &PathStep,
    target: &ResolvedPath,
) -> Result<&'a mut Value, KnowledgeError> {
    let key = match step {
        PathStep::Field(name) => name.clone(),
        PathStep::Key(key) => key.to_string(),
    };
    match current {
        Value::Object(map) => Ok(map
            .entry(key)
            .or_insert_with(|| Value::Object(serde_json::Map::new()))),
        Value::Array(items) => {
            let pos = key
                .parse::<usize>()
                .map_err(|_| write_refused(target, "array needs a numeric index"))?;
            items
                .get_mut(pos)
                .ok_or_else(|| write_refused(target, "array index past the end"))
        }
        _ => Err(write_refused(target, "cannot write beneath a scalar")),
    }
}

fn write_refused(target: &ResolvedPath, reason: &str) -> KnowledgeError {
    KnowledgeError::access(format!("write to {target} refused: {reason}"))
}
