//! Graph ownership, validation, and the two scheduling strategies.
//!
//! The [`Executor`] owns a set of nodes and the connections wiring them,
//! derives the dependency graph per run, and executes every node either
//! strictly one at a time in topological order ([`Executor::execute`]) or
//! level-concurrently with a barrier between levels
//! ([`Executor::execute_parallel`]).
//!
//! Structural problems (unknown references, duplicate registrations,
//! cycles) surface synchronously as [`ExecutorError`]s and abort a run
//! with no partial result map. Node-level failures never abort a run:
//! they settle into failed [`ExecutionResult`]s and simply forward no
//! value downstream.
//!
//! One executor exclusively owns its node/connection/result maps for the
//! duration of a run; both run methods take `&mut self`, so concurrent
//! top-level calls on the same instance are rejected at compile time.
//! Callers that need overlapping runs use separate instances.

pub mod dependency;

pub use dependency::DependencyGraph;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::instrument;

use crate::connection::Connection;
use crate::event_bus::{Event, EventBus, ExecutionEvent, GraphEvent};
use crate::node::{ExecutionContext, ExecutionResult, FailureReport, Node, NodeError, NodeExt};
use crate::types::PortValueMap;
use crate::utils::IdGenerator;

/// Caller-supplied seed values for a run, keyed by node id then port id.
pub type InitialInputs = FxHashMap<String, PortValueMap>;

/// Per-node results of a completed run, keyed by node id.
pub type ResultMap = FxHashMap<String, ExecutionResult>;

/// Structural and validation errors raised by the executor surface.
///
/// These are never retried or suppressed; they propagate synchronously
/// from graph mutation and abort runs before any node executes.
#[derive(Debug, Error, Diagnostic)]
pub enum ExecutorError {
    #[error("malformed node `{node_id}`: duplicate or empty port ids")]
    #[diagnostic(
        code(dataloom::executor::malformed_node),
        help("Port ids must be non-empty and unique across a node's inputs and outputs.")
    )]
    MalformedNode { node_id: String },

    #[error("node already registered: `{node_id}`")]
    #[diagnostic(code(dataloom::executor::duplicate_node))]
    DuplicateNode { node_id: String },

    #[error("unknown node: `{node_id}`")]
    #[diagnostic(code(dataloom::executor::unknown_node))]
    UnknownNode { node_id: String },

    #[error("unknown port `{port_id}` on node `{node_id}`")]
    #[diagnostic(
        code(dataloom::executor::unknown_port),
        help("Connections go from a declared output port to a declared input port.")
    )]
    UnknownPort { node_id: String, port_id: String },

    #[error("connection already registered: `{connection_id}`")]
    #[diagnostic(code(dataloom::executor::duplicate_connection))]
    DuplicateConnection { connection_id: String },

    #[error("unknown connection: `{connection_id}`")]
    #[diagnostic(code(dataloom::executor::unknown_connection))]
    UnknownConnection { connection_id: String },

    #[error("incompatible types on connection `{connection_id}`: `{from_type}` -> `{to_type}`")]
    #[diagnostic(
        code(dataloom::executor::type_mismatch),
        help("Source and destination port types must match unless either side is `any`.")
    )]
    TypeMismatch {
        connection_id: String,
        from_type: String,
        to_type: String,
    },

    #[error("cyclic dependency involving node `{node_id}`")]
    #[diagnostic(
        code(dataloom::executor::cyclic_dependency),
        help("Dataflow graphs must be acyclic; remove one of the connections closing the cycle.")
    )]
    CyclicDependency { node_id: String },
}

/// Owns a dataflow graph and runs it.
///
/// # Examples
///
/// ```rust,no_run
/// use dataloom::connection::Connection;
/// use dataloom::executor::{Executor, InitialInputs};
/// use dataloom::port::Port;
/// use dataloom::types::DataType;
///
/// # use async_trait::async_trait;
/// # use dataloom::node::{ExecutionContext, Node, NodeError};
/// # use dataloom::types::PortValueMap;
/// # struct Source { outputs: Vec<Port> }
/// # struct Sink { inputs: Vec<Port> }
/// # #[async_trait]
/// # impl Node for Source {
/// #     fn id(&self) -> &str { "source" }
/// #     fn input_ports(&self) -> &[Port] { &[] }
/// #     fn output_ports(&self) -> &[Port] { &self.outputs }
/// #     async fn run(&self, _: &ExecutionContext) -> Result<PortValueMap, NodeError> {
/// #         Ok(PortValueMap::default())
/// #     }
/// # }
/// # #[async_trait]
/// # impl Node for Sink {
/// #     fn id(&self) -> &str { "sink" }
/// #     fn input_ports(&self) -> &[Port] { &self.inputs }
/// #     fn output_ports(&self) -> &[Port] { &[] }
/// #     async fn run(&self, _: &ExecutionContext) -> Result<PortValueMap, NodeError> {
/// #         Ok(PortValueMap::default())
/// #     }
/// # }
/// # async fn example() -> Result<(), dataloom::executor::ExecutorError> {
/// let mut executor = Executor::new();
/// executor.add_node(Source { outputs: vec![Port::new("value", "Value", DataType::number())] })?;
/// executor.add_node(Sink { inputs: vec![Port::new("value", "Value", DataType::number())] })?;
/// executor.add_connection(Connection::new("c1", "source", "value", "sink", "value"))?;
///
/// let results = executor.execute(InitialInputs::default()).await?;
/// assert_eq!(results.len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct Executor {
    nodes: FxHashMap<String, Arc<dyn Node>>,
    connections: FxHashMap<String, Connection>,
    results: ResultMap,
    event_bus: EventBus,
    failure_tx: flume::Sender<FailureReport>,
    failure_rx: flume::Receiver<FailureReport>,
    ids: IdGenerator,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    /// Create an executor with the default event bus (stdout sink).
    #[must_use]
    pub fn new() -> Self {
        Self::with_event_bus(EventBus::default())
    }

    /// Create an executor publishing lifecycle events to the given bus.
    #[must_use]
    pub fn with_event_bus(event_bus: EventBus) -> Self {
        event_bus.listen_for_events();
        let (failure_tx, failure_rx) = flume::unbounded();
        Self {
            nodes: FxHashMap::default(),
            connections: FxHashMap::default(),
            results: ResultMap::default(),
            event_bus,
            failure_tx,
            failure_rx,
            ids: IdGenerator::new(),
        }
    }

    /// The bus this executor publishes to; add sinks here before running.
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    // ------------------------------------------------------------------
    // Graph mutation
    // ------------------------------------------------------------------

    /// Register a node.
    ///
    /// Fails with [`ExecutorError::MalformedNode`] when the node's own
    /// structural check rejects its ports, or
    /// [`ExecutorError::DuplicateNode`] when the id is taken.
    pub fn add_node(&mut self, node: impl Node + 'static) -> Result<(), ExecutorError> {
        self.add_node_arc(Arc::new(node))
    }

    /// Register an already shared node.
    pub fn add_node_arc(&mut self, node: Arc<dyn Node>) -> Result<(), ExecutorError> {
        let node_id = node.id().to_string();
        if !node.validate() {
            return Err(ExecutorError::MalformedNode { node_id });
        }
        if self.nodes.contains_key(&node_id) {
            return Err(ExecutorError::DuplicateNode { node_id });
        }
        let name = node.name().to_string();
        self.nodes.insert(node_id.clone(), node);
        self.emit(Event::Graph(GraphEvent::NodeAdded { node_id, name }));
        Ok(())
    }

    /// Remove a node, cascading removal of every touching connection.
    pub fn remove_node(&mut self, node_id: &str) -> Result<(), ExecutorError> {
        if !self.nodes.contains_key(node_id) {
            return Err(ExecutorError::UnknownNode {
                node_id: node_id.to_string(),
            });
        }
        let mut touching: Vec<String> = self
            .connections
            .values()
            .filter(|c| c.from_node == node_id || c.to_node == node_id)
            .map(|c| c.id.clone())
            .collect();
        touching.sort_unstable();
        for connection_id in touching {
            self.connections.remove(&connection_id);
            self.emit(Event::Graph(GraphEvent::ConnectionRemoved { connection_id }));
        }
        self.nodes.remove(node_id);
        self.emit(Event::Graph(GraphEvent::NodeRemoved {
            node_id: node_id.to_string(),
        }));
        Ok(())
    }

    /// Register a connection after resolving both endpoints and checking
    /// type compatibility.
    pub fn add_connection(&mut self, connection: Connection) -> Result<(), ExecutorError> {
        if self.connections.contains_key(&connection.id) {
            return Err(ExecutorError::DuplicateConnection {
                connection_id: connection.id,
            });
        }

        let from_node =
            self.nodes
                .get(&connection.from_node)
                .ok_or_else(|| ExecutorError::UnknownNode {
                    node_id: connection.from_node.clone(),
                })?;
        let from_port = from_node
            .output_ports()
            .iter()
            .find(|p| p.id() == connection.from_port)
            .ok_or_else(|| ExecutorError::UnknownPort {
                node_id: connection.from_node.clone(),
                port_id: connection.from_port.clone(),
            })?;

        let to_node =
            self.nodes
                .get(&connection.to_node)
                .ok_or_else(|| ExecutorError::UnknownNode {
                    node_id: connection.to_node.clone(),
                })?;
        let to_port = to_node
            .input_ports()
            .iter()
            .find(|p| p.id() == connection.to_port)
            .ok_or_else(|| ExecutorError::UnknownPort {
                node_id: connection.to_node.clone(),
                port_id: connection.to_port.clone(),
            })?;

        if !from_port.data_type().compatible_with(to_port.data_type()) {
            return Err(ExecutorError::TypeMismatch {
                connection_id: connection.id,
                from_type: from_port.data_type().name().to_string(),
                to_type: to_port.data_type().name().to_string(),
            });
        }

        let event = GraphEvent::ConnectionAdded {
            connection_id: connection.id.clone(),
            from_node: connection.from_node.clone(),
            from_port: connection.from_port.clone(),
            to_node: connection.to_node.clone(),
            to_port: connection.to_port.clone(),
        };
        self.connections.insert(connection.id.clone(), connection);
        self.emit(Event::Graph(event));
        Ok(())
    }

    /// Remove a connection.
    pub fn remove_connection(&mut self, connection_id: &str) -> Result<(), ExecutorError> {
        if self.connections.remove(connection_id).is_none() {
            return Err(ExecutorError::UnknownConnection {
                connection_id: connection_id.to_string(),
            });
        }
        self.emit(Event::Graph(GraphEvent::ConnectionRemoved {
            connection_id: connection_id.to_string(),
        }));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Registered nodes, keyed by id.
    #[must_use]
    pub fn nodes(&self) -> &FxHashMap<String, Arc<dyn Node>> {
        &self.nodes
    }

    /// Registered connections, keyed by id.
    #[must_use]
    pub fn connections(&self) -> &FxHashMap<String, Connection> {
        &self.connections
    }

    /// Per-node results of the most recent completed run.
    #[must_use]
    pub fn results(&self) -> &ResultMap {
        &self.results
    }

    /// Drain every failure report captured since the last drain.
    pub fn take_failure_reports(&self) -> Vec<FailureReport> {
        self.failure_rx.try_iter().collect()
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Dependency view of the current node/connection sets.
    #[must_use]
    pub fn dependency_graph(&self) -> DependencyGraph {
        DependencyGraph::new(
            self.nodes.keys().map(String::as_str),
            self.connections.values(),
        )
    }

    /// Run every node strictly one at a time in topological order.
    ///
    /// Node N+1 never starts until node N's entire wrapped execution
    /// (retries and breaker delays included) has settled. A structural
    /// error aborts with no partial result map.
    #[instrument(skip(self, initial_inputs), err)]
    pub async fn execute(
        &mut self,
        initial_inputs: InitialInputs,
    ) -> Result<ResultMap, ExecutorError> {
        let run_id = self.ids.run_id();
        let order = self.structural_pass(&run_id, DependencyGraph::topological_order)?;

        let mut results = ResultMap::default();
        for node_id in order {
            let node = Arc::clone(&self.nodes[&node_id]);
            let inputs = self.effective_inputs(&node_id, &initial_inputs, &results);
            let result = self.invoke(node, inputs, &run_id).await;
            results.insert(node_id, result);
        }

        tracing::info!(run_id = %run_id, nodes = results.len(), "sequential run settled");
        self.results = results.clone();
        Ok(results)
    }

    /// Run nodes level-concurrently with a barrier between levels.
    ///
    /// All nodes of a level are spawned together; the whole level settles
    /// before the next level's inputs are computed. Completion order
    /// within a level is unspecified. Node failures settle into failed
    /// results; only structural errors abort.
    #[instrument(skip(self, initial_inputs), err)]
    pub async fn execute_parallel(
        &mut self,
        initial_inputs: InitialInputs,
    ) -> Result<ResultMap, ExecutorError> {
        let run_id = self.ids.run_id();
        let levels = self.structural_pass(&run_id, DependencyGraph::level_partition)?;

        let mut results = ResultMap::default();
        for level in levels {
            tracing::debug!(run_id = %run_id, width = level.len(), "launching level");
            let mut tasks: JoinSet<(String, ExecutionResult)> = JoinSet::new();

            for node_id in &level {
                let node = Arc::clone(&self.nodes[node_id]);
                let ctx = ExecutionContext::new(run_id.clone())
                    .with_inputs(self.effective_inputs(node_id, &initial_inputs, &results))
                    .with_failure_sink(self.failure_tx.clone());
                self.emit(Event::Execution(ExecutionEvent::Started {
                    node_id: node_id.clone(),
                    run_id: run_id.clone(),
                }));
                let id = node_id.clone();
                tasks.spawn(async move {
                    // A panicking node must not poison its level; the
                    // panic is normalized into a failed result.
                    let outcome =
                        AssertUnwindSafe(node.execute(ctx)).catch_unwind().await;
                    let result = outcome.unwrap_or_else(|_| {
                        ExecutionResult::failed(
                            NodeError::runtime(id.clone(), "node task panicked"),
                            Duration::ZERO,
                        )
                    });
                    (id, result)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                if let Ok((node_id, result)) = joined {
                    self.emit_settled(&node_id, &run_id, &result);
                    results.insert(node_id, result);
                }
            }

            // Whatever did not settle (task cancellation) still gets a
            // failed entry so the result map stays complete.
            for node_id in level {
                if !results.contains_key(&node_id) {
                    let error =
                        NodeError::runtime(node_id.clone(), "node task did not settle");
                    let result = ExecutionResult::failed(error, Duration::ZERO);
                    self.emit_settled(&node_id, &run_id, &result);
                    results.insert(node_id, result);
                }
            }
        }

        tracing::info!(run_id = %run_id, nodes = results.len(), "parallel run settled");
        self.results = results.clone();
        Ok(results)
    }

    /// Derive the run's schedule, emitting a run-scoped failure event
    /// when the graph is structurally unsound.
    fn structural_pass<T>(
        &self,
        run_id: &str,
        derive: impl FnOnce(&DependencyGraph) -> Result<T, ExecutorError>,
    ) -> Result<T, ExecutorError> {
        let graph = self.dependency_graph();
        derive(&graph).inspect_err(|error| {
            self.emit(Event::Execution(ExecutionEvent::Failed {
                node_id: None,
                run_id: run_id.to_string(),
                message: error.to_string(),
            }));
        })
    }

    /// Merge caller-supplied initial inputs with values forwarded along
    /// incoming connections whose source settled successfully.
    ///
    /// A failed source contributes no value; the destination sees a
    /// missing input, not an error. Connections are applied in id order
    /// so fan-in onto one port resolves deterministically.
    fn effective_inputs(
        &self,
        node_id: &str,
        initial_inputs: &InitialInputs,
        results: &ResultMap,
    ) -> PortValueMap {
        let mut inputs = initial_inputs.get(node_id).cloned().unwrap_or_default();

        let mut incoming: Vec<&Connection> = self
            .connections
            .values()
            .filter(|c| c.to_node == node_id)
            .collect();
        incoming.sort_by(|a, b| a.id.cmp(&b.id));

        for connection in incoming {
            let Some(source) = results.get(&connection.from_node) else {
                continue;
            };
            if !source.success {
                continue;
            }
            if let Some(value) = source.outputs.get(&connection.from_port) {
                inputs.insert(connection.to_port.clone(), value.clone());
            }
        }
        inputs
    }

    /// Contract-level invocation of one node, bracketed by lifecycle
    /// events.
    async fn invoke(
        &self,
        node: Arc<dyn Node>,
        inputs: PortValueMap,
        run_id: &str,
    ) -> ExecutionResult {
        let node_id = node.id().to_string();
        let ctx = ExecutionContext::new(run_id)
            .with_inputs(inputs)
            .with_failure_sink(self.failure_tx.clone());
        self.emit(Event::Execution(ExecutionEvent::Started {
            node_id: node_id.clone(),
            run_id: run_id.to_string(),
        }));
        let result = node.execute(ctx).await;
        self.emit_settled(&node_id, run_id, &result);
        result
    }

    fn emit_settled(&self, node_id: &str, run_id: &str, result: &ExecutionResult) {
        if result.success {
            self.emit(Event::Execution(ExecutionEvent::Completed {
                node_id: node_id.to_string(),
                run_id: run_id.to_string(),
                elapsed_ms: result.elapsed.as_millis() as u64,
            }));
        } else {
            let message = result
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown failure".to_string());
            self.emit(Event::Execution(ExecutionEvent::Failed {
                node_id: Some(node_id.to_string()),
                run_id: run_id.to_string(),
                message,
            }));
        }
    }

    fn emit(&self, event: Event) {
        if self.event_bus.sender().send(event).is_err() {
            tracing::warn!("event bus unavailable; dropping lifecycle event");
        }
    }
}
