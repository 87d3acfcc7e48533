//! Knowledge path expressions and their evaluation.
//!
//! A knowledge path addresses one location inside a component's knowledge
//! tree: `position.x`, `requests[7]`, or (in an ensemble context)
//! `coord.incomingRequests[member.request.requestId]`. Paths are parsed once
//! (usually when definitions are loaded) into a [`KnowledgePath`] and later
//! resolved against live knowledge into a [`ResolvedPath`], where every index
//! sub-expression has been evaluated to a concrete key.
//!
//! # Grammar
//!
//! ```text
//! path    := ('coord.' | 'member.')? segment ('.' segment)*
//! segment := ident ('[' index ']')?
//! index   := number | path
//! ```
//!
//! The leading `coord.` / `member.` token selects which knowledge root the
//! remainder resolves against; plain paths resolve against the invoking
//! component's own root. The tokens `coord` and `member` are reserved as
//! leading segment names. An index sub-path is evaluated against the *same*
//! root-resolution context as the enclosing path, so it may carry its own
//! role prefix.
//!
//! Resolution is split across two types on purpose: [`KnowledgePath`] is the
//! syntax (stable across rounds, safe to store in definitions), while
//! [`ResolvedPath`] is a concrete address valid for the snapshot it was
//! resolved in.

mod eval;
mod parser;

pub use eval::{EvaluationContext, lookup, read_path, remove_at, resolve, write_at};
pub use parser::{PathParseError, parse};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::knowledge::RootId;

/// Which knowledge root a path resolves against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PathRoot {
    /// The invoking component's own root (plain paths).
    Local,
    /// The ensemble coordinator's root (`coord.` prefix).
    Coordinator,
    /// The ensemble member's root (`member.` prefix).
    Member,
}

/// A parsed path expression, not yet bound to concrete roots or keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KnowledgePath {
    pub root: PathRoot,
    pub segments: Vec<PathSegment>,
}

/// One `ident` or `ident[index]` step of a [`KnowledgePath`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PathSegment {
    pub name: String,
    pub index: Option<IndexExpr>,
}

/// An index expression inside `[` `]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IndexExpr {
    /// A literal key, e.g. `requests[7]`.
    Literal(IndexKey),
    /// A nested path evaluated first, e.g. `requests[member.id]`.
    Path(Box<KnowledgePath>),
}

/// A concrete map key or array position, after index evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKey {
    Text(String),
    Pos(usize),
}

/// One concrete step of a [`ResolvedPath`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathStep {
    /// Named field access, from a `.ident` segment.
    Field(String),
    /// Keyed access, from an evaluated `[index]`.
    Key(IndexKey),
}

/// A fully evaluated path: a concrete root plus concrete steps.
///
/// Valid relative to the snapshot it was resolved in; a concurrent commit
/// may change what (if anything) lives at this address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedPath {
    pub root: RootId,
    pub steps: Vec<PathStep>,
}

impl KnowledgePath {
    /// Shorthand for a plain (local-root) path of named fields.
    pub fn local<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        KnowledgePath {
            root: PathRoot::Local,
            segments: fields
                .into_iter()
                .map(|name| PathSegment {
                    name: name.into(),
                    index: None,
                })
                .collect(),
        }
    }
}

impl ResolvedPath {
    pub fn new(root: RootId, steps: Vec<PathStep>) -> Self {
        ResolvedPath { root, steps }
    }

    /// The whole root tree (no steps).
    pub fn whole_root(root: RootId) -> Self {
        ResolvedPath {
            root,
            steps: Vec::new(),
        }
    }

    /// True when one of the two paths addresses a location inside (or equal
    /// to) the other, within the same root.
    ///
    /// Writing a subtree touches every location under it, and writing a leaf
    /// changes the value visible at any ancestor, so overlap is symmetric
    /// prefix containment. Sibling paths never overlap.
    pub fn overlaps(&self, other: &ResolvedPath) -> bool {
        if self.root != other.root {
            return false;
        }
        let n = self.steps.len().min(other.steps.len());
        self.steps[..n] == other.steps[..n]
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Text(s) => write!(f, "{s}"),
            IndexKey::Pos(n) => write!(f, "{n}"),
        }
    }
}

impl fmt::Display for KnowledgePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root {
            PathRoot::Local => {}
            PathRoot::Coordinator => write!(f, "coord.")?,
            PathRoot::Member => write!(f, "member.")?,
        }
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", seg.name)?;
            match &seg.index {
                Some(IndexExpr::Literal(key)) => write!(f, "[{key}]")?,
                Some(IndexExpr::Path(path)) => write!(f, "[{path}]")?,
                None => {}
            }
        }
        Ok(())
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.root)?;
        let mut first = true;
        for step in &self.steps {
            match step {
                PathStep::Field(name) => {
                    if !first {
                        write!(f, ".")?;
                    }
                    write!(f, "{name}")?;
                }
                PathStep::Key(key) => write!(f, "[{key}]")?,
            }
            first = false;
        }
        Ok(())
    }
}

impl std::str::FromStr for KnowledgePath {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}
