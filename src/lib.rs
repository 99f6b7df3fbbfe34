//! # Dataloom: Typed Dataflow Execution Engine
//!
//! Dataloom runs computations expressed as typed units ("nodes") with
//! named input/output ports, wired together by directed connections.
//! Graphs execute either strictly one node at a time in dependency
//! order, or level-concurrently with a barrier between dependency
//! levels.
//!
//! ## Core Concepts
//!
//! - **Nodes**: Async units of work exposing typed ports and a `run`
//!   method mapping validated inputs to outputs
//! - **Connections**: Directed edges from an output port to an input
//!   port, type-checked at registration
//! - **Executor**: Owns the graph, derives the dependency structure per
//!   run, schedules sequentially or in parallel levels
//! - **Resilience**: Retry, circuit breaking, fallback, and dead-letter
//!   capture composed around a node as a wrapping value
//! - **Events**: Every mutation and execution step streams through an
//!   event bus to pluggable sinks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use dataloom::connection::Connection;
//! use dataloom::executor::{Executor, InitialInputs};
//! use dataloom::node::{ExecutionContext, Node, NodeError};
//! use dataloom::port::Port;
//! use dataloom::types::{DataType, PortValueMap};
//! use dataloom::utils::collections::value_map;
//! use serde_json::json;
//!
//! struct Doubler {
//!     inputs: Vec<Port>,
//!     outputs: Vec<Port>,
//! }
//!
//! impl Doubler {
//!     fn new() -> Self {
//!         Self {
//!             inputs: vec![Port::new("value", "Value", DataType::number())],
//!             outputs: vec![Port::new("result", "Result", DataType::number())],
//!         }
//!     }
//! }
//!
//! #[async_trait]
//! impl Node for Doubler {
//!     fn id(&self) -> &str {
//!         "doubler"
//!     }
//!
//!     fn input_ports(&self) -> &[Port] {
//!         &self.inputs
//!     }
//!
//!     fn output_ports(&self) -> &[Port] {
//!         &self.outputs
//!     }
//!
//!     async fn run(&self, ctx: &ExecutionContext) -> Result<PortValueMap, NodeError> {
//!         let value = ctx.require_input(self.id(), "value")?.as_f64().unwrap_or(0.0);
//!         Ok(value_map([("result", json!(value * 2.0))]))
//!     }
//! }
//!
//! # async fn example() -> Result<(), dataloom::executor::ExecutorError> {
//! let mut executor = Executor::new();
//! executor.add_node(Doubler::new())?;
//!
//! let mut initial = InitialInputs::default();
//! initial.insert("doubler".into(), value_map([("value", json!(21.0))]));
//!
//! let results = executor.execute(initial).await?;
//! assert_eq!(results["doubler"].outputs["result"], json!(42.0));
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure Model
//!
//! Structural problems (unknown references, duplicate registrations,
//! cycles) are [`ExecutorError`](executor::ExecutorError)s: they
//! propagate synchronously and abort a run with no partial results.
//! Ordinary node failures are values: normalized into
//! [`NodeError`](node::NodeError)s, recovered where the resilience
//! configuration allows, and otherwise settled into failed
//! [`ExecutionResult`](node::ExecutionResult)s that forward nothing
//! downstream.
//!
//! ## Module Guide
//!
//! - [`types`] - `DataType` descriptors and port-value maps
//! - [`port`] - Typed attachment points on nodes
//! - [`connection`] - Directed edges between ports
//! - [`node`] - Node trait, execution context/result, failure values
//! - [`executor`] - Graph ownership, validation, both schedulers
//! - [`resilience`] - Retry, circuit breaker, fallback, wrapping node
//! - [`dlq`] - Dead letter queue with retention and persistence hooks
//! - [`event_bus`] - Lifecycle event stream and sinks
//! - [`telemetry`] - Formatters and tracing setup
//! - [`utils`] - Id generation and map constructors

pub mod connection;
pub mod dlq;
pub mod event_bus;
pub mod executor;
pub mod node;
pub mod port;
pub mod resilience;
pub mod telemetry;
pub mod types;
pub mod utils;
