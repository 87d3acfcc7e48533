//! The per-round formation and exchange engine.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::knowledge::{KnowledgeRepository, RetryPolicy, RootId, WatchPath, with_session};
use crate::path::{EvaluationContext, PathStep};
use crate::process::{self, BindOutcome, InvocationOutcome, ProcessError};
use crate::scheduler::{Schedulable, Trigger};

use super::{EnsembleDefinition, EnsembleInstance, FormationStrategy};

/// What one scheduling round of one ensemble definition did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoundReport {
    /// Role assignments proposed by the formation strategy.
    pub candidates: usize,
    /// Assignments rejected for violating cardinality bounds.
    pub rejected: usize,
    /// Instances formed (membership held, cardinality satisfied).
    pub instances: usize,
    /// Pair exchanges committed.
    pub exchanges: usize,
    /// Pair exchanges skipped after exhausting their retry budget.
    pub failures: usize,
}

/// Evaluates membership and runs knowledge exchange, one round at a time.
///
/// Everything that can go wrong for a single candidate pair (membership
/// `NotFound`, store conflicts, retry exhaustion) is contained to that
/// pair: the round always continues with the remaining candidates.
pub struct EnsembleEngine {
    store: Arc<dyn KnowledgeRepository>,
    strategy: Arc<dyn FormationStrategy>,
    policy: RetryPolicy,
}

impl EnsembleEngine {
    pub fn new(
        store: Arc<dyn KnowledgeRepository>,
        strategy: Arc<dyn FormationStrategy>,
        policy: RetryPolicy,
    ) -> Self {
        EnsembleEngine {
            store,
            strategy,
            policy,
        }
    }

    /// Run one full round for a definition over the currently known roots.
    pub async fn round(&self, definition: &Arc<EnsembleDefinition>) -> RoundReport {
        let mut report = RoundReport::default();
        let pool = self.store.known_roots().await;
        let assignments = self.strategy.assign_roles(&pool, &definition.roles);
        for assignment in assignments {
            report.candidates += 1;
            if !definition.roles.member.accepts(assignment.members.len()) {
                report.rejected += 1;
                debug!(
                    ensemble = %definition.name,
                    coordinator = %assignment.coordinator,
                    members = assignment.members.len(),
                    "role assignment violates cardinality bounds, rejected"
                );
                continue;
            }

            let mut admitted = Vec::new();
            for member in &assignment.members {
                if *member == assignment.coordinator {
                    continue;
                }
                if self
                    .membership_holds(definition, &assignment.coordinator, member)
                    .await
                {
                    admitted.push(member.clone());
                }
            }
            if admitted.is_empty() {
                continue;
            }
            if !definition.roles.member.accepts(admitted.len()) {
                report.rejected += 1;
                debug!(
                    ensemble = %definition.name,
                    coordinator = %assignment.coordinator,
                    admitted = admitted.len(),
                    "membership thinned the member role below its bounds, rejected"
                );
                continue;
            }

            let instance = EnsembleInstance {
                coordinator: assignment.coordinator,
                members: admitted,
                definition: Arc::clone(definition),
            };
            report.instances += 1;
            for member in &instance.members {
                match self
                    .exchange(definition, &instance.coordinator, member)
                    .await
                {
                    Ok(outcome) => {
                        report.exchanges += 1;
                        trace!(
                            ensemble = %definition.name,
                            coordinator = %instance.coordinator,
                            member = %member,
                            ?outcome,
                            "exchange done"
                        );
                    }
                    Err(err) => {
                        report.failures += 1;
                        warn!(
                            ensemble = %definition.name,
                            coordinator = %instance.coordinator,
                            member = %member,
                            error = %err,
                            "pair exchange failed, continuing round"
                        );
                    }
                }
            }
            // The instance dies with this iteration; it never outlives the
            // round that formed it.
        }
        report
    }

    /// Membership for one candidate pair, evaluated in one session.
    /// Unresolvable knowledge means "not a member", never an error.
    async fn membership_holds(
        &self,
        definition: &EnsembleDefinition,
        coordinator: &RootId,
        member: &RootId,
    ) -> bool {
        let ctx = EvaluationContext::ensemble(coordinator.clone(), member.clone());
        let bound = with_session(&*self.store, &ctx.roots(), &self.policy, |session| {
            process::bind_arguments(&definition.membership.parameters, &ctx, session)
        })
        .await;
        match bound {
            Ok(BindOutcome::Bound(args)) => definition.membership.holds(&args),
            Ok(BindOutcome::Unresolved(path)) => {
                trace!(
                    ensemble = %definition.name,
                    coordinator = %coordinator,
                    member = %member,
                    path = %path,
                    "membership knowledge unresolved, not a member"
                );
                false
            }
            Err(err) => {
                debug!(
                    ensemble = %definition.name,
                    coordinator = %coordinator,
                    member = %member,
                    error = %err,
                    "membership evaluation failed, treating pair as non-member"
                );
                false
            }
        }
    }

    async fn exchange(
        &self,
        definition: &EnsembleDefinition,
        coordinator: &RootId,
        member: &RootId,
    ) -> Result<InvocationOutcome, ProcessError> {
        let ctx = EvaluationContext::ensemble(coordinator.clone(), member.clone());
        process::run_invocation(
            &*self.store,
            &self.policy,
            &ctx,
            &definition.exchange.parameters,
            &*definition.exchange.body,
        )
        .await
    }
}

/// Adapts one ensemble definition to the scheduler, so rounds ride the same
/// trigger machinery as component processes.
pub struct EnsembleRunner {
    id: String,
    definition: Arc<EnsembleDefinition>,
    engine: Arc<EnsembleEngine>,
}

impl EnsembleRunner {
    pub fn new(definition: Arc<EnsembleDefinition>, engine: Arc<EnsembleEngine>) -> Self {
        EnsembleRunner {
            id: format!("ensemble/{}", definition.name),
            definition,
            engine,
        }
    }
}

#[async_trait::async_trait]
impl Schedulable for EnsembleRunner {
    fn id(&self) -> &str {
        &self.id
    }

    fn trigger(&self) -> &Trigger {
        &self.definition.trigger
    }

    /// Knowledge-change-triggered ensembles watch the static prefix of each
    /// declared path in *every* root, since candidates are not known up
    /// front.
    async fn watches(&self) -> Vec<WatchPath> {
        let Trigger::KnowledgeChange { watched } = &self.definition.trigger else {
            return Vec::new();
        };
        watched
            .iter()
            .map(|path| {
                let mut steps = Vec::new();
                for segment in &path.segments {
                    steps.push(PathStep::Field(segment.name.clone()));
                    if segment.index.is_some() {
                        // Index values are member-dependent; watching the
                        // enclosing container is the widest sound prefix.
                        break;
                    }
                }
                WatchPath::any_root(steps)
            })
            .collect()
    }

    async fn execute(&self) -> Result<(), ProcessError> {
        let report = self.engine.round(&self.definition).await;
        debug!(ensemble = %self.definition.name, ?report, "round finished");
        Ok(())
    }
}
