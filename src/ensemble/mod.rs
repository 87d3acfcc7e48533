//! Ensembles: declarative, dynamically formed groups of components.
//!
//! An [`EnsembleDefinition`] is static, loaded once, and names a
//! membership predicate, an exchange mapping, a trigger, and role
//! cardinality bounds. Each scheduling round the [`EnsembleEngine`] asks a
//! [`FormationStrategy`] for candidate role assignments, evaluates
//! membership per (coordinator, member) pair, and for the pairs that
//! qualify runs the exchange mapping exactly like a process invocation with
//! `coord.` / `member.` path resolution. The resulting
//! [`EnsembleInstance`]s are transient units of work: created fresh every
//! round, never persisted past it.

mod engine;
mod formation;

pub use engine::{EnsembleEngine, EnsembleRunner, RoundReport};
pub use formation::{FormationStrategy, PairwiseFormation, RoleAssignment};

use std::sync::Arc;

use crate::knowledge::RootId;
use crate::process::{ArgumentSet, Parameter, ProcessBody};
use crate::scheduler::Trigger;

/// How many components may fill a role in one ensemble instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cardinality {
    pub min: usize,
    /// `None` is unbounded ("many").
    pub max: Option<usize>,
}

impl Cardinality {
    pub fn exactly(n: usize) -> Self {
        Cardinality {
            min: n,
            max: Some(n),
        }
    }

    pub fn at_least(min: usize) -> Self {
        Cardinality { min, max: None }
    }

    pub fn between(min: usize, max: usize) -> Self {
        Cardinality {
            min,
            max: Some(max),
        }
    }

    /// Unbounded, including empty.
    pub fn many() -> Self {
        Cardinality { min: 0, max: None }
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min && self.max.is_none_or(|max| count <= max)
    }
}

impl Default for Cardinality {
    fn default() -> Self {
        Cardinality::exactly(1)
    }
}

/// Role bounds of an ensemble. The coordinator role is always exactly one
/// component; only the member role's cardinality varies.
#[derive(Clone, Copy, Debug, Default)]
pub struct RoleConstraints {
    pub member: Cardinality,
}

impl RoleConstraints {
    pub fn pairwise() -> Self {
        RoleConstraints {
            member: Cardinality::exactly(1),
        }
    }

    pub fn members(member: Cardinality) -> Self {
        RoleConstraints { member }
    }
}

/// The membership condition of an ensemble: parameters bound per
/// (coordinator, member) candidate pair, then a pure predicate over them.
///
/// A parameter that cannot be resolved for a pair makes that pair a
/// non-member; it is never an error.
#[derive(Clone)]
pub struct Membership {
    pub parameters: Vec<Parameter>,
    predicate: Arc<dyn Fn(&ArgumentSet) -> bool + Send + Sync>,
}

impl Membership {
    pub fn new<F>(parameters: Vec<Parameter>, predicate: F) -> Self
    where
        F: Fn(&ArgumentSet) -> bool + Send + Sync + 'static,
    {
        Membership {
            parameters,
            predicate: Arc::new(predicate),
        }
    }

    /// Every candidate pair qualifies.
    pub fn always() -> Self {
        Membership::new(Vec::new(), |_| true)
    }

    /// No pair ever qualifies.
    pub fn never() -> Self {
        Membership::new(Vec::new(), |_| false)
    }

    pub fn holds(&self, args: &ArgumentSet) -> bool {
        (self.predicate)(args)
    }
}

impl std::fmt::Debug for Membership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Membership")
            .field("parameters", &self.parameters.len())
            .finish_non_exhaustive()
    }
}

/// The knowledge exchange run for every qualifying pair, with `coord.` /
/// `member.` prefixed parameters.
#[derive(Clone)]
pub struct ExchangeMapping {
    pub parameters: Vec<Parameter>,
    pub body: Arc<dyn ProcessBody>,
}

impl std::fmt::Debug for ExchangeMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeMapping")
            .field("parameters", &self.parameters.len())
            .finish_non_exhaustive()
    }
}

/// A static ensemble type, loaded once at startup.
#[derive(Clone, Debug)]
pub struct EnsembleDefinition {
    pub name: String,
    pub trigger: Trigger,
    pub membership: Membership,
    pub exchange: ExchangeMapping,
    pub roles: RoleConstraints,
}

/// One concrete pairing/grouping that satisfied membership this round.
///
/// Exists only inside the round that created it; it is a unit of work, not
/// a stored entity.
#[derive(Clone, Debug)]
pub struct EnsembleInstance {
    pub coordinator: RootId,
    pub members: Vec<RootId>,
    pub definition: Arc<EnsembleDefinition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cardinality_bounds() {
        let one = Cardinality::exactly(1);
        assert!(!one.accepts(0));
        assert!(one.accepts(1));
        assert!(!one.accepts(2));

        let crowd = Cardinality::at_least(2);
        assert!(!crowd.accepts(1));
        assert!(crowd.accepts(2));
        assert!(crowd.accepts(100));

        let bounded = Cardinality::between(1, 3);
        assert!(!bounded.accepts(0));
        assert!(bounded.accepts(3));
        assert!(!bounded.accepts(4));

        assert!(Cardinality::many().accepts(0));
    }

    #[test]
    fn membership_constants() {
        let args = ArgumentSet::default();
        assert!(Membership::always().holds(&args));
        assert!(!Membership::never().holds(&args));
    }
}
