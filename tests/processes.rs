mod common;

use common::{read, seeded_store};
use murmuration::knowledge::{RetryPolicy, RootId};
use murmuration::path::EvaluationContext;
use murmuration::process::{
    InvocationOutcome, Parameter, ProcessError, body_fn, run_invocation,
};
use serde_json::json;

#[tokio::test]
async fn in_and_out_parameters_flow_through_an_invocation() {
    let store = seeded_store(&[("car", json!({"position": {"x": 21.0}}))]).await;
    let ctx = EvaluationContext::component(RootId::from("car"));
    let parameters = vec![
        Parameter::input("position.x").unwrap(),
        Parameter::output("position.doubled").unwrap(),
    ];
    let body = body_fn(|args| {
        let x = args.required(0)?.as_f64().unwrap();
        args.set_output(1, json!(x * 2.0))
    });

    let outcome = run_invocation(&*store, &RetryPolicy::default(), &ctx, &parameters, &*body)
        .await
        .unwrap();

    assert_eq!(outcome, InvocationOutcome::Completed { writes: 1 });
    assert_eq!(
        read(&store, "car", "position.doubled").await.unwrap(),
        json!(42.0)
    );
}

#[tokio::test]
async fn missing_required_input_skips_the_invocation() {
    let store = seeded_store(&[("car", json!({"position": {}}))]).await;
    let ctx = EvaluationContext::component(RootId::from("car"));
    let parameters = vec![
        Parameter::input("position.x").unwrap(),
        Parameter::output("position.doubled").unwrap(),
    ];
    let body = body_fn(|_| panic!("body must not run without its inputs"));

    let outcome = run_invocation(&*store, &RetryPolicy::default(), &ctx, &parameters, &*body)
        .await
        .unwrap();

    assert!(matches!(outcome, InvocationOutcome::Skipped { .. }));
    assert!(
        read(&store, "car", "position.doubled")
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn inout_reads_and_writes_the_same_slot() {
    let store = seeded_store(&[("tick", json!({"count": 41}))]).await;
    let ctx = EvaluationContext::component(RootId::from("tick"));
    let parameters = vec![Parameter::in_out("count").unwrap()];
    let body = body_fn(|args| {
        let current = args.required(0)?.as_i64().unwrap();
        args.set_output(0, json!(current + 1))
    });

    run_invocation(&*store, &RetryPolicy::default(), &ctx, &parameters, &*body)
        .await
        .unwrap();

    assert_eq!(read(&store, "tick", "count").await.unwrap(), json!(42));
}

#[tokio::test]
async fn inout_without_a_successful_read_never_writes_back() {
    let store = seeded_store(&[("tick", json!({}))]).await;
    let ctx = EvaluationContext::component(RootId::from("tick"));
    let parameters = vec![Parameter::in_out("count").unwrap()];
    // The body happily produces an output; the slot drops it because the
    // read side never bound.
    let body = body_fn(|args| {
        assert!(args.input(0).is_none());
        args.set_output(0, json!(99))
    });

    let outcome = run_invocation(&*store, &RetryPolicy::default(), &ctx, &parameters, &*body)
        .await
        .unwrap();

    assert_eq!(outcome, InvocationOutcome::Completed { writes: 0 });
    assert!(read(&store, "tick", "count").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn all_outputs_commit_in_one_session() {
    let store = seeded_store(&[("r", json!({"in": 1}))]).await;
    let ctx = EvaluationContext::component(RootId::from("r"));
    let parameters = vec![
        Parameter::input("in").unwrap(),
        Parameter::output("left").unwrap(),
        Parameter::output("right").unwrap(),
    ];
    let body = body_fn(|args| {
        args.set_output(1, json!("L"))?;
        args.set_output(2, json!("R"))
    });

    let before = store.root_version(&RootId::from("r")).await.unwrap();
    run_invocation(&*store, &RetryPolicy::default(), &ctx, &parameters, &*body)
        .await
        .unwrap();
    let after = store.root_version(&RootId::from("r")).await.unwrap();

    // Two outputs, one commit.
    assert_eq!(after, before + 1);
    assert_eq!(read(&store, "r", "left").await.unwrap(), json!("L"));
    assert_eq!(read(&store, "r", "right").await.unwrap(), json!("R"));
}

#[tokio::test]
async fn bodies_cannot_write_read_only_slots() {
    let store = seeded_store(&[("r", json!({"x": 1}))]).await;
    let ctx = EvaluationContext::component(RootId::from("r"));
    let parameters = vec![Parameter::input("x").unwrap()];
    let body = body_fn(|args| args.set_output(0, json!(2)));

    let err = run_invocation(&*store, &RetryPolicy::default(), &ctx, &parameters, &*body)
        .await
        .unwrap_err();
    assert!(matches!(err, ProcessError::NotWritable { index: 0 }));
    assert_eq!(read(&store, "r", "x").await.unwrap(), json!(1));
}
