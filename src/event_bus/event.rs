//! Lifecycle events emitted by the executor.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single lifecycle event.
///
/// Delivery order matches emission order: all events flow through one
/// queue into the bus listener. The engine provides no replay or
/// persistence; attach a sink before running if you need the stream.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Event {
    /// Graph mutation (node/connection added or removed).
    Graph(GraphEvent),
    /// Node execution lifecycle within a run.
    Execution(ExecutionEvent),
    /// Engine-internal notice that is neither a mutation nor a result.
    Diagnostic(DiagnosticEvent),
}

impl Event {
    pub fn diagnostic(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Diagnostic(DiagnosticEvent {
            scope: scope.into(),
            message: message.into(),
        })
    }

    /// Coarse category label, useful for filtering sinks.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Event::Graph(_) => "graph",
            Event::Execution(_) => "execution",
            Event::Diagnostic(_) => "diagnostic",
        }
    }

    /// Structured JSON form of the event.
    #[must_use]
    pub fn to_json_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Graph mutations, one per mutating executor operation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum GraphEvent {
    NodeAdded {
        node_id: String,
        name: String,
    },
    NodeRemoved {
        node_id: String,
    },
    ConnectionAdded {
        connection_id: String,
        from_node: String,
        from_port: String,
        to_node: String,
        to_port: String,
    },
    ConnectionRemoved {
        connection_id: String,
    },
}

/// Per-node execution lifecycle within a run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExecutionEvent {
    /// The node's wrapped execution began.
    Started { node_id: String, run_id: String },
    /// The node settled successfully.
    Completed {
        node_id: String,
        run_id: String,
        elapsed_ms: u64,
    },
    /// A node failed (`node_id` set), or the whole run aborted on a
    /// structural error (`node_id` empty).
    Failed {
        node_id: Option<String>,
        run_id: String,
        message: String,
    },
}

/// Engine-internal notice.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticEvent {
    pub scope: String,
    pub message: String,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Graph(event) => write!(f, "{event}"),
            Event::Execution(event) => write!(f, "{event}"),
            Event::Diagnostic(event) => write!(f, "({}) {}", event.scope, event.message),
        }
    }
}

impl fmt::Display for GraphEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphEvent::NodeAdded { node_id, name } => {
                write!(f, "node added: {node_id} ({name})")
            }
            GraphEvent::NodeRemoved { node_id } => write!(f, "node removed: {node_id}"),
            GraphEvent::ConnectionAdded {
                connection_id,
                from_node,
                from_port,
                to_node,
                to_port,
            } => write!(
                f,
                "connection added: {connection_id} ({from_node}.{from_port} -> {to_node}.{to_port})"
            ),
            GraphEvent::ConnectionRemoved { connection_id } => {
                write!(f, "connection removed: {connection_id}")
            }
        }
    }
}

impl fmt::Display for ExecutionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionEvent::Started { node_id, run_id } => {
                write!(f, "[{run_id}] {node_id} started")
            }
            ExecutionEvent::Completed {
                node_id,
                run_id,
                elapsed_ms,
            } => write!(f, "[{run_id}] {node_id} completed in {elapsed_ms}ms"),
            ExecutionEvent::Failed {
                node_id: Some(node_id),
                run_id,
                message,
            } => write!(f, "[{run_id}] {node_id} failed: {message}"),
            ExecutionEvent::Failed {
                node_id: None,
                run_id,
                message,
            } => write!(f, "[{run_id}] run failed: {message}"),
        }
    }
}
