//! Fixture nodes shared across the integration suites.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dataloom::node::{ExecutionContext, Node, NodeError};
use dataloom::port::Port;
use dataloom::types::{DataType, PortValueMap};
use dataloom::utils::collections::value_map;
use serde_json::Value;

/// Emits a fixed value on its `value` output.
pub struct SourceNode {
    id: String,
    value: Value,
    outputs: Vec<Port>,
}

impl SourceNode {
    pub fn new(id: &str, value: Value) -> Self {
        Self {
            id: id.to_string(),
            value,
            outputs: vec![Port::new("value", "Value", DataType::any())],
        }
    }
}

#[async_trait]
impl Node for SourceNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_ports(&self) -> &[Port] {
        &[]
    }

    fn output_ports(&self) -> &[Port] {
        &self.outputs
    }

    async fn run(&self, _ctx: &ExecutionContext) -> Result<PortValueMap, NodeError> {
        Ok(value_map([("value", self.value.clone())]))
    }
}

/// Adds numeric inputs `a` and `b` into `sum`.
pub struct SumNode {
    id: String,
    inputs: Vec<Port>,
    outputs: Vec<Port>,
}

impl SumNode {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            inputs: vec![
                Port::new("a", "Left operand", DataType::number()),
                Port::new("b", "Right operand", DataType::number()),
            ],
            outputs: vec![Port::new("sum", "Sum", DataType::number())],
        }
    }
}

#[async_trait]
impl Node for SumNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_ports(&self) -> &[Port] {
        &self.inputs
    }

    fn output_ports(&self) -> &[Port] {
        &self.outputs
    }

    async fn run(&self, ctx: &ExecutionContext) -> Result<PortValueMap, NodeError> {
        let a = ctx.require_input(self.id(), "a")?.as_f64().unwrap_or(0.0);
        let b = ctx.require_input(self.id(), "b")?.as_f64().unwrap_or(0.0);
        Ok(value_map([("sum", Value::from(a + b))]))
    }
}

/// Relays its optional `value` input to its `value` output, substituting
/// JSON null when the input is absent.
pub struct RelayNode {
    id: String,
    inputs: Vec<Port>,
    outputs: Vec<Port>,
}

impl RelayNode {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            inputs: vec![Port::new("value", "Value", DataType::any()).optional()],
            outputs: vec![Port::new("value", "Value", DataType::any())],
        }
    }
}

#[async_trait]
impl Node for RelayNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_ports(&self) -> &[Port] {
        &self.inputs
    }

    fn output_ports(&self) -> &[Port] {
        &self.outputs
    }

    async fn run(&self, ctx: &ExecutionContext) -> Result<PortValueMap, NodeError> {
        let value = ctx.input("value").cloned().unwrap_or(Value::Null);
        Ok(value_map([("value", value)]))
    }
}

/// Always fails; counts how many times its logic actually ran.
pub struct FailingNode {
    id: String,
    kind_validation: bool,
    calls: AtomicU32,
    inputs: Vec<Port>,
    outputs: Vec<Port>,
}

impl FailingNode {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            kind_validation: false,
            calls: AtomicU32::new(0),
            inputs: vec![Port::new("value", "Value", DataType::any()).optional()],
            outputs: vec![Port::new("value", "Value", DataType::any())],
        }
    }

    /// Fail with a non-retryable validation error instead of a runtime
    /// one.
    pub fn validation(mut self) -> Self {
        self.kind_validation = true;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Node for FailingNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_ports(&self) -> &[Port] {
        &self.inputs
    }

    fn output_ports(&self) -> &[Port] {
        &self.outputs
    }

    async fn run(&self, _ctx: &ExecutionContext) -> Result<PortValueMap, NodeError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.kind_validation {
            Err(NodeError::validation(self.id.clone(), "rejected input"))
        } else {
            Err(NodeError::runtime(self.id.clone(), "boom"))
        }
    }
}

/// Fails a configured number of times, then succeeds with a fixed value.
pub struct FlakyNode {
    id: String,
    remaining_failures: AtomicU32,
    calls: AtomicU32,
    value: Value,
    outputs: Vec<Port>,
}

impl FlakyNode {
    pub fn new(id: &str, failures: u32, value: Value) -> Self {
        Self {
            id: id.to_string(),
            remaining_failures: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
            value,
            outputs: vec![Port::new("value", "Value", DataType::any())],
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Node for FlakyNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_ports(&self) -> &[Port] {
        &[]
    }

    fn output_ports(&self) -> &[Port] {
        &self.outputs
    }

    async fn run(&self, _ctx: &ExecutionContext) -> Result<PortValueMap, NodeError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let remaining = self.remaining_failures.load(Ordering::Relaxed);
        if remaining > 0 {
            self.remaining_failures.store(remaining - 1, Ordering::Relaxed);
            return Err(NodeError::runtime(self.id.clone(), "transient failure"));
        }
        Ok(value_map([("value", self.value.clone())]))
    }
}

/// Sleeps before relaying, to make level concurrency observable.
pub struct DelayNode {
    id: String,
    delay: Duration,
    inputs: Vec<Port>,
    outputs: Vec<Port>,
}

impl DelayNode {
    pub fn new(id: &str, delay: Duration) -> Self {
        Self {
            id: id.to_string(),
            delay,
            inputs: vec![Port::new("value", "Value", DataType::any()).optional()],
            outputs: vec![Port::new("value", "Value", DataType::any())],
        }
    }
}

#[async_trait]
impl Node for DelayNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_ports(&self) -> &[Port] {
        &self.inputs
    }

    fn output_ports(&self) -> &[Port] {
        &self.outputs
    }

    async fn run(&self, ctx: &ExecutionContext) -> Result<PortValueMap, NodeError> {
        tokio::time::sleep(self.delay).await;
        let value = ctx.input("value").cloned().unwrap_or(Value::Null);
        Ok(value_map([("value", value)]))
    }
}

/// Declares a duplicated port id; must be rejected at registration.
pub struct BrokenPortsNode {
    id: String,
    inputs: Vec<Port>,
}

impl BrokenPortsNode {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            inputs: vec![
                Port::new("x", "First", DataType::any()),
                Port::new("x", "Duplicate", DataType::any()),
            ],
        }
    }
}

#[async_trait]
impl Node for BrokenPortsNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_ports(&self) -> &[Port] {
        &self.inputs
    }

    fn output_ports(&self) -> &[Port] {
        &[]
    }

    async fn run(&self, _ctx: &ExecutionContext) -> Result<PortValueMap, NodeError> {
        Ok(PortValueMap::default())
    }
}

/// Typed source whose single output advertises the given data type.
pub struct TypedSourceNode {
    id: String,
    outputs: Vec<Port>,
    value: Value,
}

impl TypedSourceNode {
    pub fn new(id: &str, data_type: DataType, value: Value) -> Self {
        Self {
            id: id.to_string(),
            outputs: vec![Port::new("out", "Out", data_type)],
            value,
        }
    }
}

#[async_trait]
impl Node for TypedSourceNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_ports(&self) -> &[Port] {
        &[]
    }

    fn output_ports(&self) -> &[Port] {
        &self.outputs
    }

    async fn run(&self, _ctx: &ExecutionContext) -> Result<PortValueMap, NodeError> {
        Ok(value_map([("out", self.value.clone())]))
    }
}

/// Typed sink whose single input advertises the given data type.
pub struct TypedSinkNode {
    id: String,
    inputs: Vec<Port>,
}

impl TypedSinkNode {
    pub fn new(id: &str, data_type: DataType) -> Self {
        Self {
            id: id.to_string(),
            inputs: vec![Port::new("in", "In", data_type)],
        }
    }
}

#[async_trait]
impl Node for TypedSinkNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_ports(&self) -> &[Port] {
        &self.inputs
    }

    fn output_ports(&self) -> &[Port] {
        &[]
    }

    async fn run(&self, _ctx: &ExecutionContext) -> Result<PortValueMap, NodeError> {
        Ok(PortValueMap::default())
    }
}
