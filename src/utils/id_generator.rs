//! Identifier generation for runs and dead-letter entries.

use uuid::Uuid;

/// Generates prefixed, collision-free identifiers.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdGenerator;

impl IdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Identifier for one executor run, e.g. `run-4fd1…`.
    #[must_use]
    pub fn run_id(&self) -> String {
        format!("run-{}", Uuid::new_v4().simple())
    }

    /// Identifier for one dead-letter entry, e.g. `dl-9c2e…`.
    #[must_use]
    pub fn entry_id(&self) -> String {
        format!("dl-{}", Uuid::new_v4().simple())
    }
}
