use miette::Diagnostic;
use thiserror::Error;

/// Errors surfaced by the knowledge store and path evaluation.
///
/// All three kinds are recoverable at the invocation/round level: a
/// `NotFound` skips the invocation or candidate pair, a `Conflict` drives
/// the session retry loop, and a `RepositoryAccess` means the backend is
/// unreachable (the entries are *unknown*, never to be treated as deleted).
/// None of them escalate past the scheduling boundary.
#[derive(Debug, Error, Diagnostic)]
pub enum KnowledgeError {
    /// A required path has no entry (absent field, absent key, or an index
    /// sub-path that could not itself be resolved).
    #[error("no knowledge at {path}")]
    #[diagnostic(
        code(murmuration::knowledge::not_found),
        help("callers decide whether this is fatal to the session or a valid \"no value yet\"")
    )]
    NotFound { path: String },

    /// A write collided with another session, or the retry budget for a
    /// contended session ran out.
    #[error("conflicting access to root {root}")]
    #[diagnostic(
        code(murmuration::knowledge::conflict),
        help("cancel the session and retry; bounded by RuntimeConfig::max_session_retries")
    )]
    Conflict { root: String },

    /// The backend itself is unavailable (or the store API was misused, e.g.
    /// touching a root the session never declared). Distinct from deletion:
    /// an unreachable entry is unknown, not removed.
    #[error("knowledge repository access failed: {reason}")]
    #[diagnostic(code(murmuration::knowledge::repository_access))]
    RepositoryAccess { reason: String },
}

impl KnowledgeError {
    pub fn not_found(path: impl ToString) -> Self {
        KnowledgeError::NotFound {
            path: path.to_string(),
        }
    }

    pub fn conflict(root: impl ToString) -> Self {
        KnowledgeError::Conflict {
            root: root.to_string(),
        }
    }

    pub fn access(reason: impl Into<String>) -> Self {
        KnowledgeError::RepositoryAccess {
            reason: reason.into(),
        }
    }

    /// True for the error kind the session retry loop reacts to.
    pub fn is_conflict(&self) -> bool {
        matches!(self, KnowledgeError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, KnowledgeError::NotFound { .. })
    }
}
