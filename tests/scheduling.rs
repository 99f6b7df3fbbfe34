mod common;

use std::time::Duration;

use common::nodes::{DelayNode, FailingNode, RelayNode, SourceNode, SumNode};
use common::{quiet_executor, value_connection};
use dataloom::connection::Connection;
use dataloom::executor::{ExecutorError, InitialInputs};
use serde_json::{Value, json};

#[tokio::test]
async fn diamond_partitions_into_expected_levels() {
    let mut executor = quiet_executor();
    executor.add_node(SourceNode::new("a", json!(1.0))).unwrap();
    executor.add_node(SourceNode::new("b", json!(2.0))).unwrap();
    executor.add_node(SumNode::new("c")).unwrap();
    executor.add_node(RelayNode::new("d")).unwrap();
    executor
        .add_connection(Connection::new("1", "a", "value", "c", "a"))
        .unwrap();
    executor
        .add_connection(Connection::new("2", "b", "value", "c", "b"))
        .unwrap();
    executor
        .add_connection(Connection::new("3", "c", "sum", "d", "value"))
        .unwrap();

    let levels = executor.dependency_graph().level_partition().unwrap();
    assert_eq!(
        levels,
        vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["c".to_string()],
            vec!["d".to_string()],
        ]
    );
}

#[tokio::test]
async fn cycles_abort_both_schedulers_with_no_partial_results() {
    let mut executor = quiet_executor();
    executor.add_node(RelayNode::new("a")).unwrap();
    executor.add_node(RelayNode::new("b")).unwrap();
    executor
        .add_connection(value_connection("1", "a", "b"))
        .unwrap();
    executor
        .add_connection(value_connection("2", "b", "a"))
        .unwrap();

    let sequential = executor.execute(InitialInputs::default()).await;
    assert!(matches!(
        sequential,
        Err(ExecutorError::CyclicDependency { .. })
    ));
    assert!(executor.results().is_empty());

    let parallel = executor.execute_parallel(InitialInputs::default()).await;
    assert!(matches!(
        parallel,
        Err(ExecutorError::CyclicDependency { .. })
    ));
    assert!(executor.results().is_empty());
}

#[tokio::test]
async fn parallel_run_computes_the_same_values_as_sequential() {
    let build = || {
        let mut executor = quiet_executor();
        executor.add_node(SourceNode::new("a", json!(1.0))).unwrap();
        executor.add_node(SourceNode::new("b", json!(2.0))).unwrap();
        executor.add_node(SumNode::new("c")).unwrap();
        executor.add_node(RelayNode::new("d")).unwrap();
        executor
            .add_connection(Connection::new("1", "a", "value", "c", "a"))
            .unwrap();
        executor
            .add_connection(Connection::new("2", "b", "value", "c", "b"))
            .unwrap();
        executor
            .add_connection(Connection::new("3", "c", "sum", "d", "value"))
            .unwrap();
        executor
    };

    let sequential = build().execute(InitialInputs::default()).await.unwrap();
    let parallel = build()
        .execute_parallel(InitialInputs::default())
        .await
        .unwrap();

    assert_eq!(sequential["d"].outputs["value"], json!(3.0));
    assert_eq!(parallel["d"].outputs["value"], json!(3.0));
    assert_eq!(sequential.len(), parallel.len());
}

#[tokio::test]
async fn level_zero_failure_leaves_dependents_running() {
    let mut executor = quiet_executor();
    executor.add_node(FailingNode::new("src")).unwrap();
    executor.add_node(RelayNode::new("dependent")).unwrap();
    executor
        .add_connection(value_connection("1", "src", "dependent"))
        .unwrap();

    // The whole call settles Ok even though level 0 failed.
    let results = executor
        .execute_parallel(InitialInputs::default())
        .await
        .unwrap();

    assert!(!results["src"].success);
    assert!(results["dependent"].success);
    // Missing input, not a thrown error.
    assert_eq!(results["dependent"].outputs["value"], Value::Null);
}

#[tokio::test]
async fn sibling_failure_does_not_cancel_the_level() {
    let mut executor = quiet_executor();
    executor.add_node(FailingNode::new("bad")).unwrap();
    executor.add_node(SourceNode::new("good", json!(5.0))).unwrap();

    let results = executor
        .execute_parallel(InitialInputs::default())
        .await
        .unwrap();

    assert!(!results["bad"].success);
    assert!(results["good"].success);
    assert_eq!(results.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn level_siblings_run_concurrently() {
    let mut executor = quiet_executor();
    executor
        .add_node(DelayNode::new("slow-1", Duration::from_millis(50)))
        .unwrap();
    executor
        .add_node(DelayNode::new("slow-2", Duration::from_millis(50)))
        .unwrap();

    let started = tokio::time::Instant::now();
    executor
        .execute_parallel(InitialInputs::default())
        .await
        .unwrap();
    let elapsed = started.elapsed();

    // Both 50ms sleeps overlap inside one level.
    assert!(elapsed < Duration::from_millis(100), "took {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn sequential_mode_serializes_independent_nodes() {
    let mut executor = quiet_executor();
    executor
        .add_node(DelayNode::new("slow-1", Duration::from_millis(50)))
        .unwrap();
    executor
        .add_node(DelayNode::new("slow-2", Duration::from_millis(50)))
        .unwrap();

    let started = tokio::time::Instant::now();
    executor.execute(InitialInputs::default()).await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(100), "took {elapsed:?}");
}

#[tokio::test]
async fn deeper_chains_settle_level_by_level() {
    let mut executor = quiet_executor();
    executor.add_node(SourceNode::new("root", json!(1.0))).unwrap();
    executor.add_node(RelayNode::new("mid")).unwrap();
    executor.add_node(RelayNode::new("leaf")).unwrap();
    executor
        .add_connection(value_connection("1", "root", "mid"))
        .unwrap();
    executor
        .add_connection(value_connection("2", "mid", "leaf"))
        .unwrap();

    let results = executor
        .execute_parallel(InitialInputs::default())
        .await
        .unwrap();

    assert_eq!(results["leaf"].outputs["value"], json!(1.0));
}
