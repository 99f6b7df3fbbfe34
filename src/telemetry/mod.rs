//! Rendering of events and error chains, plus tracing setup.

use std::io::IsTerminal;

use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::event_bus::Event;
use crate::node::NodeError;

pub const CONTEXT_COLOR: &str = "\x1b[36m"; // cyan
pub const LINE_COLOR: &str = "\x1b[33m"; // yellow
pub const RESET_COLOR: &str = "\x1b[0m";

/// Install the crate's tracing stack: env-filtered fmt output plus span
/// capture for error reports.
///
/// Loads `.env` first so `RUST_LOG` can come from a dotenv file;
/// `default_filter` applies when the environment sets nothing. Safe to
/// call more than once; later calls are no-ops.
pub fn init_tracing(default_filter: &str) {
    dotenvy::dotenv().ok();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(ErrorLayer::default())
        .try_init();
}

/// Formatter color mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatterMode {
    /// Detect TTY capability via `stderr.is_terminal()`.
    #[default]
    Auto,
    /// Always include ANSI color codes.
    Colored,
    /// Never include ANSI color codes.
    Plain,
}

impl FormatterMode {
    #[must_use]
    pub fn is_colored(&self) -> bool {
        match self {
            FormatterMode::Auto => std::io::stderr().is_terminal(),
            FormatterMode::Colored => true,
            FormatterMode::Plain => false,
        }
    }
}

/// Rendered output for one telemetry item, consumable by sinks.
#[derive(Clone, Debug, Default)]
pub struct EventRender {
    pub context: Option<String>,
    pub lines: Vec<String>,
}

impl EventRender {
    #[must_use]
    pub fn join_lines(&self) -> String {
        self.lines.join("")
    }
}

pub trait TelemetryFormatter: Send + Sync {
    fn render_event(&self, event: &Event) -> EventRender;
    fn render_error(&self, error: &NodeError) -> EventRender;
}

/// Plain text formatter with optional ANSI colors.
pub struct PlainFormatter {
    mode: FormatterMode,
}

impl PlainFormatter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: FormatterMode::Auto,
        }
    }

    #[must_use]
    pub fn with_mode(mode: FormatterMode) -> Self {
        Self { mode }
    }
}

impl Default for PlainFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn cause_lines(error: &NodeError, indent: usize, use_color: bool) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(cause) = &error.cause {
        let pad = "  ".repeat(indent);
        if use_color {
            lines.push(format!("{LINE_COLOR}{pad}cause: {}{RESET_COLOR}\n", cause.message));
        } else {
            lines.push(format!("{pad}cause: {}\n", cause.message));
        }
        lines.extend(cause_lines(cause, indent + 1, use_color));
    }
    lines
}

impl TelemetryFormatter for PlainFormatter {
    fn render_event(&self, event: &Event) -> EventRender {
        let line = if self.mode.is_colored() {
            format!("{LINE_COLOR}{event}{RESET_COLOR}\n")
        } else {
            format!("{event}\n")
        };
        EventRender {
            context: Some(event.label().to_string()),
            lines: vec![line],
        }
    }

    fn render_error(&self, error: &NodeError) -> EventRender {
        let use_color = self.mode.is_colored();
        let mut lines = Vec::new();
        if use_color {
            lines.push(format!("{CONTEXT_COLOR}{error}{RESET_COLOR}\n"));
        } else {
            lines.push(format!("{error}\n"));
        }
        lines.extend(cause_lines(error, 1, use_color));
        EventRender {
            context: Some(error.node_id.clone()),
            lines,
        }
    }
}
