//! Process-scoped dead letter queue for unrecoverable node failures.
//!
//! The queue is independent of any single run: entries accumulate across
//! executors until marked processed, removed, evicted by capacity, or
//! purged by the retention sweeper. It is an explicitly constructed
//! service shared via `Arc` and guarded internally, never a global.

use std::io;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::node::{ExecutionContext, NodeError};
use crate::utils::IdGenerator;

/// One captured unrecoverable failure.
///
/// Entries are created only by the queue ([`DeadLetterQueue::add`]
/// assigns the id and timestamp) and mutate only through mark-processed,
/// removal, and eviction.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DeadLetterEntry {
    pub id: String,
    pub run_id: String,
    pub node_id: String,
    pub node_name: String,
    pub error: NodeError,
    /// Snapshot of the invocation context (run id, inputs, metadata).
    pub context: Value,
    /// Snapshot of the failed result.
    pub result: Value,
    pub timestamp: DateTime<Utc>,
    pub retry_attempts: u32,
    pub processed: bool,
}

/// Caller-supplied persistence hook; the queue assumes no specific
/// storage backend.
pub trait DeadLetterStore: Send + Sync {
    /// Persist one newly added entry.
    fn save(&self, entry: &DeadLetterEntry) -> io::Result<()>;

    /// Load previously persisted entries.
    fn load(&self) -> io::Result<Vec<DeadLetterEntry>>;
}

/// Observer invoked after an entry is added.
pub type DeadLetterObserver = Arc<dyn Fn(&DeadLetterEntry) + Send + Sync>;

/// Tunables for a [`DeadLetterQueue`].
#[derive(Clone, Debug)]
pub struct DeadLetterConfig {
    /// Capacity; the oldest entries beyond it are evicted first.
    pub max_entries: usize,
    /// Entries older than this are purged by the sweeper.
    pub retention: Duration,
    /// Cadence of the background retention sweep.
    pub sweep_interval: Duration,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            retention: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Aggregate counters over the current entry set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeadLetterStats {
    pub total: usize,
    pub unprocessed: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

struct SweeperState {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Bounded, time-retained store of execution failures for offline
/// inspection.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use dataloom::dlq::{DeadLetterConfig, DeadLetterQueue};
///
/// let queue = Arc::new(DeadLetterQueue::new(DeadLetterConfig::default()));
/// queue.start_sweeper();
///
/// for entry in queue.unprocessed() {
///     println!("{}: {}", entry.node_id, entry.error);
///     queue.mark_processed(&entry.id);
/// }
/// ```
pub struct DeadLetterQueue {
    config: DeadLetterConfig,
    entries: Mutex<Vec<DeadLetterEntry>>,
    store: Option<Box<dyn DeadLetterStore>>,
    on_added: Option<DeadLetterObserver>,
    ids: IdGenerator,
    sweeper: Mutex<Option<SweeperState>>,
}

impl DeadLetterQueue {
    #[must_use]
    pub fn new(config: DeadLetterConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(Vec::new()),
            store: None,
            on_added: None,
            ids: IdGenerator::new(),
            sweeper: Mutex::new(None),
        }
    }

    /// Attach a persistence hook; every added entry is saved through it.
    #[must_use]
    pub fn with_store(mut self, store: impl DeadLetterStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Attach an observer invoked after each added entry.
    #[must_use]
    pub fn on_added<F>(mut self, observer: F) -> Self
    where
        F: Fn(&DeadLetterEntry) + Send + Sync + 'static,
    {
        self.on_added = Some(Arc::new(observer));
        self
    }

    // ------------------------------------------------------------------
    // Ingest
    // ------------------------------------------------------------------

    /// Add an entry: assigns id and timestamp, persists through the
    /// store hook, notifies the observer, then evicts the oldest entries
    /// beyond capacity. Returns the stored entry.
    pub fn add(&self, mut entry: DeadLetterEntry) -> DeadLetterEntry {
        entry.id = self.ids.entry_id();
        entry.timestamp = Utc::now();
        entry.processed = false;

        if let Some(store) = &self.store {
            if let Err(error) = store.save(&entry) {
                tracing::warn!(%error, entry = %entry.id, "dead letter store save failed");
            }
        }
        if let Some(observer) = &self.on_added {
            observer(&entry);
        }

        let mut entries = self.entries.lock();
        entries.push(entry.clone());
        let excess = entries.len().saturating_sub(self.config.max_entries);
        if excess > 0 {
            tracing::debug!(evicted = excess, "dead letter capacity eviction");
            entries.drain(..excess);
        }
        entry
    }

    /// Build and add an entry from a failed invocation.
    pub fn capture(
        &self,
        ctx: &ExecutionContext,
        node_id: &str,
        node_name: &str,
        error: &NodeError,
        retry_attempts: u32,
    ) -> DeadLetterEntry {
        self.add(DeadLetterEntry {
            id: String::new(),
            run_id: ctx.run_id.clone(),
            node_id: node_id.to_string(),
            node_name: node_name.to_string(),
            error: error.clone(),
            context: json!({
                "run_id": ctx.run_id,
                "inputs": ctx.inputs,
                "metadata": ctx.metadata,
            }),
            result: json!({ "success": false, "error": error }),
            timestamp: Utc::now(),
            retry_attempts,
            processed: false,
        })
    }

    /// Restore entries persisted through the store hook. Loaded entries
    /// keep their original ids and timestamps; capacity still applies.
    pub fn load_from_store(&self) -> io::Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let loaded = store.load()?;
        let count = loaded.len();
        let mut entries = self.entries.lock();
        entries.extend(loaded);
        entries.sort_by_key(|e| e.timestamp);
        let excess = entries.len().saturating_sub(self.config.max_entries);
        if excess > 0 {
            entries.drain(..excess);
        }
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Look up one entry by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<DeadLetterEntry> {
        self.entries.lock().iter().find(|e| e.id == id).cloned()
    }

    /// Entries captured for a node, oldest first.
    #[must_use]
    pub fn by_node(&self, node_id: &str) -> Vec<DeadLetterEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.node_id == node_id)
            .cloned()
            .collect()
    }

    /// Entries captured during a run, oldest first.
    #[must_use]
    pub fn by_run(&self, run_id: &str) -> Vec<DeadLetterEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect()
    }

    /// Entries not yet marked processed, oldest first.
    #[must_use]
    pub fn unprocessed(&self) -> Vec<DeadLetterEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| !e.processed)
            .cloned()
            .collect()
    }

    /// Snapshot of every entry, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<DeadLetterEntry> {
        self.entries.lock().clone()
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Mark an entry processed. Returns whether the entry existed.
    pub fn mark_processed(&self, id: &str) -> bool {
        let mut entries = self.entries.lock();
        match entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.processed = true;
                true
            }
            None => false,
        }
    }

    /// Remove and return an entry.
    pub fn remove(&self, id: &str) -> Option<DeadLetterEntry> {
        let mut entries = self.entries.lock();
        let index = entries.iter().position(|e| e.id == id)?;
        Some(entries.remove(index))
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Purge entries older than the retention period. Returns the purge
    /// count.
    pub fn purge_expired(&self) -> usize {
        let retention =
            TimeDelta::from_std(self.config.retention).unwrap_or_else(|_| TimeDelta::MAX);
        let cutoff = Utc::now() - retention;
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.timestamp >= cutoff);
        before - entries.len()
    }

    // ------------------------------------------------------------------
    // Aggregates
    // ------------------------------------------------------------------

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    #[must_use]
    pub fn unprocessed_count(&self) -> usize {
        self.entries.lock().iter().filter(|e| !e.processed).count()
    }

    /// Entry counts per node id.
    #[must_use]
    pub fn counts_by_node(&self) -> FxHashMap<String, usize> {
        let entries = self.entries.lock();
        let mut counts: FxHashMap<String, usize> = FxHashMap::default();
        for entry in entries.iter() {
            *counts.entry(entry.node_id.clone()).or_default() += 1;
        }
        counts
    }

    #[must_use]
    pub fn oldest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.entries.lock().iter().map(|e| e.timestamp).min()
    }

    #[must_use]
    pub fn newest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.entries.lock().iter().map(|e| e.timestamp).max()
    }

    /// Aggregate counters in one locked pass.
    #[must_use]
    pub fn stats(&self) -> DeadLetterStats {
        let entries = self.entries.lock();
        DeadLetterStats {
            total: entries.len(),
            unprocessed: entries.iter().filter(|e| !e.processed).count(),
            oldest: entries.iter().map(|e| e.timestamp).min(),
            newest: entries.iter().map(|e| e.timestamp).max(),
        }
    }

    /// Full serialized export of the current entry set.
    pub fn export(&self) -> serde_json::Result<String> {
        let entries = self.entries.lock();
        serde_json::to_string_pretty(&*entries)
    }

    // ------------------------------------------------------------------
    // Retention sweeper
    // ------------------------------------------------------------------

    /// Spawn the background retention sweep. Idempotent: calling again
    /// while a sweeper runs has no effect. The task holds only a weak
    /// reference and exits when the queue is dropped.
    pub fn start_sweeper(self: &Arc<Self>) {
        let mut guard = self.sweeper.lock();
        if guard.is_some() {
            return;
        }
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let queue: Weak<Self> = Arc::downgrade(self);
        let interval = self.config.sweep_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick fires immediately; skip it so a fresh queue is
            // not swept before anything is added.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let Some(queue) = queue.upgrade() else { break };
                        let purged = queue.purge_expired();
                        if purged > 0 {
                            tracing::debug!(purged, "dead letter retention sweep");
                        }
                    }
                }
            }
        });

        *guard = Some(SweeperState {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the background sweeper and wait for it to exit.
    pub async fn stop_sweeper(&self) {
        let state = self.sweeper.lock().take();
        if let Some(state) = state {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
        }
    }
}

impl Drop for DeadLetterQueue {
    fn drop(&mut self) {
        if let Some(state) = self.sweeper.lock().take() {
            let _ = state.shutdown_tx.send(());
            state.handle.abort();
        }
    }
}
