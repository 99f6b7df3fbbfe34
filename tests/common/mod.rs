#![allow(dead_code)]

pub mod nodes;

use dataloom::connection::Connection;
use dataloom::event_bus::{EventBus, MemorySink};
use dataloom::executor::{Executor, InitialInputs};
use dataloom::types::PortValueMap;
use serde_json::Value;

/// Executor whose events land in memory instead of stdout.
pub fn quiet_executor() -> Executor {
    Executor::with_event_bus(EventBus::with_sink(MemorySink::new()))
}

/// Connection between the fixture nodes' conventional `value` ports.
pub fn value_connection(id: &str, from_node: &str, to_node: &str) -> Connection {
    Connection::new(id, from_node, "value", to_node, "value")
}

/// Initial-input map seeding a single node.
pub fn initial_for<I, K>(node_id: &str, pairs: I) -> InitialInputs
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    let mut initial = InitialInputs::default();
    let values: PortValueMap = pairs.into_iter().map(|(k, v)| (k.into(), v)).collect();
    initial.insert(node_id.to_string(), values);
    initial
}
