mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{read, seeded_store};
use murmuration::ensemble::{
    EnsembleDefinition, EnsembleEngine, ExchangeMapping, FormationStrategy, Membership,
    PairwiseFormation, RoleAssignment, RoleConstraints,
};
use murmuration::knowledge::{KnowledgeRepository, RetryPolicy, RootId};
use murmuration::process::{Parameter, body_fn};
use murmuration::registry::{ComponentType, DefinitionRegistry};
use murmuration::runtime::Runtime;
use murmuration::scheduler::Trigger;
use serde_json::json;

fn price_sync(membership: Membership) -> EnsembleDefinition {
    EnsembleDefinition {
        name: "price-sync".into(),
        trigger: Trigger::periodic(Duration::from_millis(100)),
        membership,
        exchange: ExchangeMapping {
            parameters: vec![
                Parameter::input("coord.price").unwrap(),
                Parameter::output("member.price").unwrap(),
            ],
            body: body_fn(|args| {
                let price = args.required(0)?.clone();
                args.set_output(1, price)
            }),
        },
        roles: RoleConstraints::pairwise(),
    }
}

fn vendor_to_buyer() -> Membership {
    Membership::new(
        vec![
            Parameter::input("coord.role").unwrap(),
            Parameter::input("member.role").unwrap(),
        ],
        |args| {
            args.input(0).is_some_and(|role| role == "vendor")
                && args.input(1).is_some_and(|role| role == "buyer")
        },
    )
}

fn engine(store: &Arc<murmuration::knowledge::LocalKnowledgeStore>) -> EnsembleEngine {
    EnsembleEngine::new(
        store.clone(),
        Arc::new(PairwiseFormation),
        RetryPolicy::default(),
    )
}

#[tokio::test]
async fn exchange_moves_coordinator_knowledge_to_the_member() {
    let store = seeded_store(&[
        ("vendor", json!({"role": "vendor", "price": 10})),
        ("buyer", json!({"role": "buyer", "price": 0})),
    ])
    .await;

    let definition = Arc::new(price_sync(vendor_to_buyer()));
    let report = engine(&store).round(&definition).await;

    assert_eq!(report.instances, 1);
    assert_eq!(report.exchanges, 1);
    assert_eq!(report.failures, 0);
    assert_eq!(read(&store, "buyer", "price").await.unwrap(), json!(10));
    // The coordinator's own knowledge is untouched.
    assert_eq!(read(&store, "vendor", "price").await.unwrap(), json!(10));
}

#[tokio::test]
async fn a_false_predicate_forms_no_instance_and_moves_nothing() {
    let store = seeded_store(&[
        ("vendor", json!({"role": "vendor", "price": 10})),
        ("buyer", json!({"role": "buyer", "price": 0})),
    ])
    .await;

    let definition = Arc::new(price_sync(Membership::never()));
    let report = engine(&store).round(&definition).await;

    assert_eq!(report.instances, 0);
    assert_eq!(report.exchanges, 0);
    assert_eq!(read(&store, "buyer", "price").await.unwrap(), json!(0));
}

#[tokio::test]
async fn unresolvable_membership_knowledge_means_not_a_member() {
    let store = seeded_store(&[
        ("vendor", json!({"price": 10})),
        ("buyer", json!({"price": 0})),
    ])
    .await;

    // Neither root carries a `role` field: every candidate pair fails to
    // bind and the round completes without forming anything.
    let definition = Arc::new(price_sync(vendor_to_buyer()));
    let report = engine(&store).round(&definition).await;

    assert!(report.candidates > 0);
    assert_eq!(report.instances, 0);
    assert_eq!(report.failures, 0);
    assert_eq!(read(&store, "buyer", "price").await.unwrap(), json!(0));
}

/// A deliberately misbehaving strategy, to prove the engine re-validates.
struct Overstuffed;

impl FormationStrategy for Overstuffed {
    fn assign_roles(&self, pool: &[RootId], _: &RoleConstraints) -> Vec<RoleAssignment> {
        vec![
            RoleAssignment {
                coordinator: pool[0].clone(),
                members: pool[1..].to_vec(),
            },
            RoleAssignment {
                coordinator: pool[0].clone(),
                members: Vec::new(),
            },
        ]
    }
}

#[tokio::test]
async fn cardinality_violations_reject_the_assignment_not_the_round() {
    let store = seeded_store(&[
        ("a", json!({"role": "vendor", "price": 10})),
        ("b", json!({"role": "buyer", "price": 0})),
        ("c", json!({"role": "buyer", "price": 0})),
    ])
    .await;

    let engine = EnsembleEngine::new(
        store.clone(),
        Arc::new(Overstuffed),
        RetryPolicy::default(),
    );
    // Member role is min=1, max=1: two members and zero members both lose.
    let definition = Arc::new(price_sync(Membership::always()));
    let report = engine.round(&definition).await;

    assert_eq!(report.candidates, 2);
    assert_eq!(report.rejected, 2);
    assert_eq!(report.instances, 0);
    assert_eq!(read(&store, "b", "price").await.unwrap(), json!(0));
}

#[tokio::test]
async fn inout_exchange_only_writes_where_the_read_succeeded() {
    let store = seeded_store(&[
        ("seen", json!({"tally": 1})),
        ("unseen", json!({})),
    ])
    .await;

    let definition = Arc::new(EnsembleDefinition {
        name: "tally".into(),
        trigger: Trigger::periodic(Duration::from_millis(100)),
        membership: Membership::always(),
        exchange: ExchangeMapping {
            parameters: vec![Parameter::in_out("member.tally").unwrap()],
            body: body_fn(|args| match args.input(0) {
                Some(value) => {
                    let next = value.as_i64().unwrap() + 1;
                    args.set_output(0, json!(next))
                }
                // Produce output anyway: the disabled slot must drop it.
                None => args.set_output(0, json!(999)),
            }),
        },
        roles: RoleConstraints::pairwise(),
    });

    engine(&store).round(&definition).await;

    assert_eq!(read(&store, "seen", "tally").await.unwrap(), json!(2));
    assert!(
        read(&store, "unseen", "tally").await.unwrap_err().is_not_found(),
        "an InOut slot whose read failed must not write back"
    );
}

#[tokio::test(start_paused = true)]
async fn deployed_ensembles_run_rounds_through_the_scheduler() {
    let mut registry = DefinitionRegistry::new();
    registry
        .add_component(ComponentType::new(
            "Vendor",
            json!({"role": "vendor", "price": 10}),
        ))
        .unwrap();
    registry
        .add_component(ComponentType::new(
            "Buyer",
            json!({"role": "buyer", "price": 0}),
        ))
        .unwrap();
    registry.add_ensemble(price_sync(vendor_to_buyer())).unwrap();

    let runtime = Runtime::builder().with_registry(registry).build();
    runtime
        .deploy_component_as("Vendor", RootId::from("v1"))
        .await
        .unwrap();
    runtime
        .deploy_component_as("Buyer", RootId::from("b1"))
        .await
        .unwrap();
    runtime.deploy_ensemble("price-sync").unwrap();
    runtime.start().await.unwrap();

    // First round fires at simulated t=0.
    tokio::time::sleep(Duration::from_millis(10)).await;

    let buyer = runtime.store().snapshot(&RootId::from("b1")).await.unwrap();
    assert_eq!(buyer["price"], json!(10));

    runtime.shutdown().await;
}
