//! Lifecycle event stream: event types, the broadcasting bus, and sinks.
//!
//! Every mutating executor operation and every node execution emits an
//! [`Event`] into the bus; a background listener broadcasts them to
//! registered [`EventSink`]s in emission order.

mod bus;
mod event;
mod sink;

pub use bus::EventBus;
pub use event::{DiagnosticEvent, Event, ExecutionEvent, GraphEvent};
pub use sink::{ChannelSink, EventSink, MemorySink, StdOutSink};
