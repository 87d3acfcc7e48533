//! Role assignment over the candidate pool.

use crate::knowledge::RootId;

use super::{Cardinality, RoleConstraints};

/// One candidate filling of an ensemble's roles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleAssignment {
    pub coordinator: RootId,
    pub members: Vec<RootId>,
}

/// Pluggable role-assignment strategy.
///
/// Implementations must honor the cardinality bounds in `constraints`:
/// the engine re-validates and rejects violating assignments, but a
/// strategy that emits them is wasting the round's work. Alternative
/// implementations may solve role assignment under fitness constraints
/// (e.g. an external constraint solver) behind this same contract.
pub trait FormationStrategy: Send + Sync {
    fn assign_roles(&self, pool: &[RootId], constraints: &RoleConstraints) -> Vec<RoleAssignment>;
}

/// The default strategy: exhaustive pairing over the candidate pool.
///
/// With a member cardinality of exactly one this emits every ordered
/// (coordinator, member) pair of distinct roots. For wider bounds it groups
/// all other roots under each coordinator, clipped to the role's maximum,
/// and drops coordinators that cannot reach the minimum. Membership
/// filtering happens later, per pair, in the engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct PairwiseFormation;

impl FormationStrategy for PairwiseFormation {
    fn assign_roles(&self, pool: &[RootId], constraints: &RoleConstraints) -> Vec<RoleAssignment> {
        let mut assignments = Vec::new();
        for coordinator in pool {
            let others: Vec<RootId> = pool
                .iter()
                .filter(|root| *root != coordinator)
                .cloned()
                .collect();
            match constraints.member {
                Cardinality { max: Some(1), .. } => {
                    for member in others {
                        assignments.push(RoleAssignment {
                            coordinator: coordinator.clone(),
                            members: vec![member],
                        });
                    }
                }
                Cardinality { min, max } => {
                    if others.len() < min {
                        continue;
                    }
                    let mut members = others;
                    if let Some(max) = max {
                        members.truncate(max);
                    }
                    if members.is_empty() {
                        continue;
                    }
                    assignments.push(RoleAssignment {
                        coordinator: coordinator.clone(),
                        members,
                    });
                }
            }
        }
        assignments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(ids: &[&str]) -> Vec<RootId> {
        ids.iter().map(|id| RootId::from(*id)).collect()
    }

    #[test]
    fn pairwise_emits_every_ordered_pair() {
        let assignments =
            PairwiseFormation.assign_roles(&pool(&["a", "b", "c"]), &RoleConstraints::pairwise());
        assert_eq!(assignments.len(), 6);
        assert!(assignments.iter().all(|a| a.members.len() == 1));
        assert!(assignments.iter().all(|a| a.members[0] != a.coordinator));
        assert!(assignments.contains(&RoleAssignment {
            coordinator: RootId::from("b"),
            members: vec![RootId::from("c")],
        }));
    }

    #[test]
    fn grouped_assignment_respects_min_and_max() {
        let constraints = RoleConstraints::members(Cardinality::between(2, 2));
        let assignments = PairwiseFormation.assign_roles(&pool(&["a", "b", "c"]), &constraints);
        assert_eq!(assignments.len(), 3);
        assert!(assignments.iter().all(|a| a.members.len() == 2));

        // Too small a pool to reach the minimum: nothing is emitted.
        let starved = PairwiseFormation.assign_roles(&pool(&["a", "b"]), &constraints);
        assert!(starved.is_empty());
    }

    #[test]
    fn single_root_pool_forms_nothing() {
        let assignments =
            PairwiseFormation.assign_roles(&pool(&["a"]), &RoleConstraints::pairwise());
        assert!(assignments.is_empty());
    }
}
