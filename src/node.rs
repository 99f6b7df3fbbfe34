//! Node execution contract for the dataloom engine.
//!
//! This module provides the core abstractions for executable dataflow
//! nodes: the [`Node`] trait, the per-invocation [`ExecutionContext`],
//! the [`ExecutionResult`] every invocation settles into, and the
//! [`NodeError`] failure value.
//!
//! # Contract
//!
//! Node authors implement [`Node::run`], the node-specific logic mapping
//! validated inputs to an output map. The engine calls nodes through
//! [`NodeExt::execute`], the contract layer that
//!
//! 1. verifies every required input port is present and, when its
//!    [`DataType`](crate::types::DataType) carries a validator, that the
//!    value satisfies it;
//! 2. times the call;
//! 3. validates declared outputs the same way;
//! 4. normalizes any failure into a [`NodeError`], hands it to the
//!    context's failure sink, and returns a failed [`ExecutionResult`]
//!    rather than raising.
//!
//! Ordinary runtime failures therefore never propagate as `Err` out of
//! `execute`; only structural problems detected by the
//! [`Executor`](crate::executor::Executor) abort a run.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::port::{Port, find_malformed_port_id};
use crate::types::PortValueMap;

// ============================================================================
// Core Trait
// ============================================================================

/// Core trait defining an executable dataflow node.
///
/// Nodes are stateless units of computation with typed input and output
/// ports. Implementations must not assume anything about concurrent
/// invocation order: under parallel scheduling, independent nodes run
/// simultaneously.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use dataloom::node::{ExecutionContext, Node, NodeError};
/// use dataloom::port::Port;
/// use dataloom::types::{DataType, PortValueMap};
/// use serde_json::json;
///
/// struct Doubler {
///     inputs: Vec<Port>,
///     outputs: Vec<Port>,
/// }
///
/// impl Doubler {
///     fn new() -> Self {
///         Self {
///             inputs: vec![Port::new("value", "Value", DataType::number())],
///             outputs: vec![Port::new("result", "Result", DataType::number())],
///         }
///     }
/// }
///
/// #[async_trait]
/// impl Node for Doubler {
///     fn id(&self) -> &str {
///         "doubler"
///     }
///
///     fn input_ports(&self) -> &[Port] {
///         &self.inputs
///     }
///
///     fn output_ports(&self) -> &[Port] {
///         &self.outputs
///     }
///
///     async fn run(&self, ctx: &ExecutionContext) -> Result<PortValueMap, NodeError> {
///         let value = ctx.inputs["value"].as_f64().unwrap_or_default();
///         let mut outputs = PortValueMap::default();
///         outputs.insert("result".into(), json!(value * 2.0));
///         Ok(outputs)
///     }
/// }
/// ```
#[async_trait]
pub trait Node: Send + Sync {
    /// Identifier, unique within the owning executor.
    fn id(&self) -> &str;

    /// Human-readable name; defaults to the id.
    fn name(&self) -> &str {
        self.id()
    }

    /// Ordered input port declarations.
    fn input_ports(&self) -> &[Port];

    /// Ordered output port declarations.
    fn output_ports(&self) -> &[Port];

    /// Pure structural self-check of port well-formedness.
    ///
    /// The default implementation requires every port id to be non-empty
    /// and unique across the combined input+output set.
    fn validate(&self) -> bool {
        find_malformed_port_id(self.input_ports(), self.output_ports()).is_none()
    }

    /// Node-specific logic mapping validated inputs to an output map.
    ///
    /// Called by [`NodeExt::execute`] after input validation. Errors
    /// returned here are normalized by the contract layer; they do not
    /// abort the run.
    async fn run(&self, ctx: &ExecutionContext) -> Result<PortValueMap, NodeError>;
}

// ============================================================================
// Contract-level execution
// ============================================================================

/// Provided contract-level execution for every [`Node`].
#[async_trait]
pub trait NodeExt: Node {
    /// Execute the node against a context, never raising for ordinary
    /// failures.
    ///
    /// See the [module documentation](self) for the contract steps.
    async fn execute(&self, ctx: ExecutionContext) -> ExecutionResult {
        let started = Instant::now();

        if let Some(error) = check_inputs(self.id(), self.input_ports(), &ctx.inputs) {
            ctx.report_failure(&error);
            return ExecutionResult::failed(error, started.elapsed());
        }

        match self.run(&ctx).await {
            Ok(outputs) => {
                if let Some(error) = check_outputs(self.id(), self.output_ports(), &outputs) {
                    ctx.report_failure(&error);
                    return ExecutionResult::failed(error, started.elapsed());
                }
                ExecutionResult::ok(outputs, started.elapsed())
            }
            Err(error) => {
                ctx.report_failure(&error);
                ExecutionResult::failed(error, started.elapsed())
            }
        }
    }
}

#[async_trait]
impl<N: Node + ?Sized> NodeExt for N {}

/// Required-presence and validator check for the effective input map.
fn check_inputs(node_id: &str, ports: &[Port], inputs: &PortValueMap) -> Option<NodeError> {
    for port in ports {
        match inputs.get(port.id()) {
            None if port.required() => {
                return Some(
                    NodeError::validation(
                        node_id,
                        format!("missing required input `{}`", port.id()),
                    )
                    .with_port(port.id()),
                );
            }
            Some(value) if !port.data_type().accepts(value) => {
                return Some(
                    NodeError::validation(
                        node_id,
                        format!(
                            "input `{}` rejected by `{}` validator",
                            port.id(),
                            port.data_type()
                        ),
                    )
                    .with_port(port.id()),
                );
            }
            _ => {}
        }
    }
    None
}

/// Validator check for declared outputs. Presence is not enforced:
/// suppressed failures legitimately yield an empty output map.
fn check_outputs(node_id: &str, ports: &[Port], outputs: &PortValueMap) -> Option<NodeError> {
    for port in ports {
        if let Some(value) = outputs.get(port.id()) {
            if !port.data_type().accepts(value) {
                return Some(
                    NodeError::validation(
                        node_id,
                        format!(
                            "output `{}` rejected by `{}` validator",
                            port.id(),
                            port.data_type()
                        ),
                    )
                    .with_port(port.id()),
                );
            }
        }
    }
    None
}

// ============================================================================
// Execution Context
// ============================================================================

/// Per-invocation environment handed to a node.
///
/// A fresh context is created for every node invocation and discarded
/// after the executor aggregates its result. The failure sink is a
/// write-only channel; the caller drains it after the run via
/// [`Executor::take_failure_reports`](crate::executor::Executor::take_failure_reports).
#[derive(Clone)]
pub struct ExecutionContext {
    /// Identifier of the run this invocation belongs to.
    pub run_id: String,
    /// Effective input values, keyed by port id.
    pub inputs: PortValueMap,
    /// Free-form metadata accompanying the invocation.
    pub metadata: FxHashMap<String, Value>,
    failure_sink: Option<flume::Sender<FailureReport>>,
}

impl ExecutionContext {
    /// Create an empty context for the given run.
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            inputs: PortValueMap::default(),
            metadata: FxHashMap::default(),
            failure_sink: None,
        }
    }

    /// Replace the effective input map.
    #[must_use]
    pub fn with_inputs(mut self, inputs: PortValueMap) -> Self {
        self.inputs = inputs;
        self
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Attach the write-only failure sink.
    #[must_use]
    pub fn with_failure_sink(mut self, sink: flume::Sender<FailureReport>) -> Self {
        self.failure_sink = Some(sink);
        self
    }

    /// Look up an input value by port id.
    #[must_use]
    pub fn input(&self, port_id: &str) -> Option<&Value> {
        self.inputs.get(port_id)
    }

    /// Fetch a required input or fail with a port-scoped error.
    pub fn require_input(&self, node_id: &str, port_id: &str) -> Result<&Value, NodeError> {
        self.inputs.get(port_id).ok_or_else(|| {
            NodeError::validation(node_id, format!("missing required input `{port_id}`"))
                .with_port(port_id)
        })
    }

    /// Send a failure report to the sink, if one is attached.
    ///
    /// A disconnected sink is ignored: reporting is best-effort and must
    /// never fail the node.
    pub fn report_failure(&self, error: &NodeError) {
        if let Some(sink) = &self.failure_sink {
            let _ = sink.send(FailureReport {
                run_id: self.run_id.clone(),
                node_id: error.node_id.clone(),
                error: error.clone(),
                when: Utc::now(),
            });
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("run_id", &self.run_id)
            .field("inputs", &self.inputs)
            .field("metadata", &self.metadata)
            .field("failure_sink", &self.failure_sink.is_some())
            .finish()
    }
}

/// One failure captured through the context's write-only sink.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FailureReport {
    pub run_id: String,
    pub node_id: String,
    pub error: NodeError,
    pub when: DateTime<Utc>,
}

// ============================================================================
// Execution Result
// ============================================================================

/// Outcome of one contract-level node invocation.
#[derive(Clone, Debug)]
pub struct ExecutionResult {
    /// Whether the invocation produced usable outputs.
    pub success: bool,
    /// Output values keyed by port id; empty on failure.
    pub outputs: PortValueMap,
    /// The normalized failure, when `success` is false.
    pub error: Option<NodeError>,
    /// Wall-clock duration of the wrapped invocation.
    pub elapsed: Duration,
}

impl ExecutionResult {
    /// A successful result carrying outputs.
    #[must_use]
    pub fn ok(outputs: PortValueMap, elapsed: Duration) -> Self {
        Self {
            success: true,
            outputs,
            error: None,
            elapsed,
        }
    }

    /// A failed result carrying the normalized error.
    #[must_use]
    pub fn failed(error: NodeError, elapsed: Duration) -> Self {
        Self {
            success: false,
            outputs: PortValueMap::default(),
            error: Some(error),
            elapsed,
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Classification of a node failure.
///
/// The retry layer treats [`Validation`](FailureKind::Validation),
/// [`Authentication`](FailureKind::Authentication) and
/// [`Authorization`](FailureKind::Authorization) as non-retryable by
/// default; everything else is assumed transient.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Authentication,
    Authorization,
    /// Rejected by an open circuit breaker without running node logic.
    CircuitOpen,
    /// Wrapped terminal error produced when a retry policy gives up.
    RetryExhausted,
    /// The configured fallback itself failed.
    Fallback,
    #[default]
    Runtime,
}

impl FailureKind {
    /// Default retry decision for this kind.
    #[must_use]
    pub fn retryable(self) -> bool {
        !matches!(
            self,
            FailureKind::Validation | FailureKind::Authentication | FailureKind::Authorization
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Validation => "validation",
            FailureKind::Authentication => "authentication",
            FailureKind::Authorization => "authorization",
            FailureKind::CircuitOpen => "circuit_open",
            FailureKind::RetryExhausted => "retry_exhausted",
            FailureKind::Fallback => "fallback",
            FailureKind::Runtime => "runtime",
        };
        write!(f, "{label}")
    }
}

/// Normalized node failure with an optional cause chain.
///
/// `NodeError` is a value, not a control-flow exception: the contract
/// layer converts it into a failed [`ExecutionResult`] and the run
/// continues. The boxed `cause` preserves the original error through
/// retry and fallback wrapping.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NodeError {
    #[serde(default)]
    pub kind: FailureKind,
    pub message: String,
    pub node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<NodeError>>,
}

impl NodeError {
    /// A failure of the given kind.
    pub fn new(kind: FailureKind, node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            node_id: node_id.into(),
            port_id: None,
            cause: None,
        }
    }

    /// An ordinary runtime failure.
    pub fn runtime(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FailureKind::Runtime, node_id, message)
    }

    /// A validation failure (non-retryable).
    pub fn validation(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FailureKind::Validation, node_id, message)
    }

    /// An authentication failure (non-retryable).
    pub fn authentication(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FailureKind::Authentication, node_id, message)
    }

    /// An authorization failure (non-retryable).
    pub fn authorization(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FailureKind::Authorization, node_id, message)
    }

    /// Scope the failure to a specific port.
    #[must_use]
    pub fn with_port(mut self, port_id: impl Into<String>) -> Self {
        self.port_id = Some(port_id.into());
        self
    }

    /// Chain the originating failure as this error's cause.
    #[must_use]
    pub fn with_cause(mut self, cause: NodeError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Retry decision for this error under the default predicate.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind.retryable()
    }
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.port_id {
            Some(port) => write!(
                f,
                "[{}] node `{}` port `{}`: {}",
                self.kind, self.node_id, port, self.message
            ),
            None => write!(f, "[{}] node `{}`: {}", self.kind, self.node_id, self.message),
        }
    }
}

impl std::error::Error for NodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|c| c.as_ref() as &dyn std::error::Error)
    }
}
