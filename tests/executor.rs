mod common;

use common::nodes::{
    BrokenPortsNode, FailingNode, RelayNode, SourceNode, SumNode, TypedSinkNode, TypedSourceNode,
};
use common::{initial_for, quiet_executor, value_connection};
use dataloom::connection::Connection;
use dataloom::executor::{ExecutorError, InitialInputs};
use dataloom::types::DataType;
use serde_json::{Value, json};

#[tokio::test]
async fn duplicate_node_registration_is_rejected() {
    let mut executor = quiet_executor();
    executor.add_node(SourceNode::new("src", json!(1))).unwrap();
    let err = executor
        .add_node(SourceNode::new("src", json!(2)))
        .unwrap_err();
    assert!(matches!(err, ExecutorError::DuplicateNode { node_id } if node_id == "src"));
    assert_eq!(executor.nodes().len(), 1);
}

#[tokio::test]
async fn malformed_ports_fail_registration() {
    let mut executor = quiet_executor();
    let err = executor.add_node(BrokenPortsNode::new("broken")).unwrap_err();
    assert!(matches!(err, ExecutorError::MalformedNode { node_id } if node_id == "broken"));
    assert!(executor.nodes().is_empty());
}

#[tokio::test]
async fn removing_unknown_node_fails() {
    let mut executor = quiet_executor();
    assert!(matches!(
        executor.remove_node("ghost"),
        Err(ExecutorError::UnknownNode { .. })
    ));
}

#[tokio::test]
async fn removing_a_node_cascades_its_connections() {
    let mut executor = quiet_executor();
    executor.add_node(SourceNode::new("src", json!(1))).unwrap();
    executor.add_node(RelayNode::new("left")).unwrap();
    executor.add_node(RelayNode::new("right")).unwrap();
    executor
        .add_connection(value_connection("c1", "src", "left"))
        .unwrap();
    executor
        .add_connection(value_connection("c2", "src", "right"))
        .unwrap();
    executor
        .add_connection(value_connection("c3", "left", "right"))
        .unwrap();

    executor.remove_node("src").unwrap();

    assert_eq!(executor.connections().len(), 1);
    assert!(executor.connections().contains_key("c3"));
    assert!(!executor.nodes().contains_key("src"));
}

#[tokio::test]
async fn connection_endpoints_must_resolve() {
    let mut executor = quiet_executor();
    executor.add_node(SourceNode::new("src", json!(1))).unwrap();
    executor.add_node(RelayNode::new("dst")).unwrap();

    let unknown_node = executor
        .add_connection(value_connection("c1", "ghost", "dst"))
        .unwrap_err();
    assert!(matches!(unknown_node, ExecutorError::UnknownNode { node_id } if node_id == "ghost"));

    let unknown_port = executor
        .add_connection(Connection::new("c2", "src", "nope", "dst", "value"))
        .unwrap_err();
    assert!(matches!(
        unknown_port,
        ExecutorError::UnknownPort { node_id, port_id } if node_id == "src" && port_id == "nope"
    ));

    // Destination port must be an input, not an output.
    let wrong_side = executor
        .add_connection(Connection::new("c3", "src", "value", "src", "value"))
        .unwrap_err();
    assert!(matches!(wrong_side, ExecutorError::UnknownPort { .. }));

    assert!(executor.connections().is_empty());
}

#[tokio::test]
async fn duplicate_connection_id_is_rejected() {
    let mut executor = quiet_executor();
    executor.add_node(SourceNode::new("src", json!(1))).unwrap();
    executor.add_node(RelayNode::new("dst")).unwrap();
    executor
        .add_connection(value_connection("c1", "src", "dst"))
        .unwrap();
    let err = executor
        .add_connection(value_connection("c1", "src", "dst"))
        .unwrap_err();
    assert!(matches!(err, ExecutorError::DuplicateConnection { .. }));
    assert_eq!(executor.connections().len(), 1);
}

#[tokio::test]
async fn string_to_number_connection_never_registers() {
    let mut executor = quiet_executor();
    executor
        .add_node(TypedSourceNode::new("text", DataType::string(), json!("hi")))
        .unwrap();
    executor
        .add_node(TypedSinkNode::new("math", DataType::number()))
        .unwrap();

    let err = executor
        .add_connection(Connection::new("bad", "text", "out", "math", "in"))
        .unwrap_err();
    assert!(matches!(
        err,
        ExecutorError::TypeMismatch { ref from_type, ref to_type, .. }
            if from_type == "string" && to_type == "number"
    ));
    assert!(executor.connections().is_empty());
}

#[tokio::test]
async fn any_bridges_mismatched_types() {
    let mut executor = quiet_executor();
    executor
        .add_node(TypedSourceNode::new("text", DataType::string(), json!("hi")))
        .unwrap();
    executor
        .add_node(TypedSinkNode::new("open", DataType::any()))
        .unwrap();
    executor
        .add_connection(Connection::new("ok", "text", "out", "open", "in"))
        .unwrap();
    assert_eq!(executor.connections().len(), 1);
}

#[tokio::test]
async fn sequential_run_forwards_values_and_merges_initial_inputs() {
    let mut executor = quiet_executor();
    executor.add_node(SourceNode::new("seven", json!(7.0))).unwrap();
    executor.add_node(SumNode::new("sum")).unwrap();
    executor
        .add_connection(Connection::new("c1", "seven", "value", "sum", "a"))
        .unwrap();

    // `b` arrives from the caller, `a` along the connection.
    let initial = initial_for("sum", [("b", json!(5.0))]);
    let results = executor.execute(initial).await.unwrap();

    assert_eq!(results.len(), 2);
    assert!(results["seven"].success);
    assert_eq!(results["sum"].outputs["sum"], json!(12.0));
    assert_eq!(executor.results()["sum"].outputs["sum"], json!(12.0));
}

#[tokio::test]
async fn forwarded_value_overrides_initial_input_on_same_port() {
    let mut executor = quiet_executor();
    executor.add_node(SourceNode::new("src", json!(3.0))).unwrap();
    executor.add_node(SumNode::new("sum")).unwrap();
    executor
        .add_connection(Connection::new("c1", "src", "value", "sum", "a"))
        .unwrap();

    let mut initial = initial_for("sum", [("b", json!(1.0))]);
    initial
        .get_mut("sum")
        .unwrap()
        .insert("a".to_string(), json!(100.0));
    let results = executor.execute(initial).await.unwrap();

    // The connection wins over the caller-supplied seed for the port.
    assert_eq!(results["sum"].outputs["sum"], json!(4.0));
}

#[tokio::test]
async fn failed_source_contributes_no_value_downstream() {
    let mut executor = quiet_executor();
    executor.add_node(FailingNode::new("flaky-src")).unwrap();
    executor.add_node(RelayNode::new("relay")).unwrap();
    executor
        .add_connection(value_connection("c1", "flaky-src", "relay"))
        .unwrap();

    let results = executor.execute(InitialInputs::default()).await.unwrap();

    assert!(!results["flaky-src"].success);
    assert!(results["relay"].success);
    assert_eq!(results["relay"].outputs["value"], Value::Null);
}

#[tokio::test]
async fn missing_required_input_fails_the_node_not_the_run() {
    let mut executor = quiet_executor();
    executor.add_node(SumNode::new("sum")).unwrap();

    let results = executor.execute(InitialInputs::default()).await.unwrap();

    let result = &results["sum"];
    assert!(!result.success);
    let error = result.error.as_ref().unwrap();
    assert_eq!(error.port_id.as_deref(), Some("a"));
}

#[tokio::test]
async fn failure_reports_are_drained_by_the_caller() {
    let mut executor = quiet_executor();
    executor.add_node(FailingNode::new("bad")).unwrap();

    executor.execute(InitialInputs::default()).await.unwrap();

    let reports = executor.take_failure_reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].node_id, "bad");
    assert!(executor.take_failure_reports().is_empty());
}

#[tokio::test]
async fn input_validator_rejections_are_port_scoped() {
    let mut executor = quiet_executor();
    executor.add_node(SumNode::new("sum")).unwrap();

    let initial = initial_for("sum", [("a", json!("NaN")), ("b", json!(1.0))]);
    let results = executor.execute(initial).await.unwrap();

    let error = results["sum"].error.as_ref().unwrap();
    assert_eq!(error.port_id.as_deref(), Some("a"));
    assert!(error.message.contains("number"));
}
