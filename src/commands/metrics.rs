//! Command and error counters.
//!
//! Process-lifetime observability state owned by the command layer.
//! The storage engine never sees it.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

/// Per-command success counts plus a global error count.
#[derive(Debug)]
pub struct CommandMetrics {
    commands: Mutex<BTreeMap<String, u64>>,
    errors: AtomicU64,
    started: Instant,
    started_at: SystemTime,
}

impl Default for CommandMetrics {
    fn default() -> Self {
        Self {
            commands: Mutex::new(BTreeMap::new()),
            errors: AtomicU64::new(0),
            started: Instant::now(),
            started_at: SystemTime::now(),
        }
    }
}

/// A consistent copy of [`CommandMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub total_commands: u64,
    pub commands: BTreeMap<String, u64>,
    pub errors: u64,
}

impl CommandMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one successful invocation of `command` (case-insensitive).
    pub fn track(&self, command: &str) {
        *self
            .commands
            .lock()
            .entry(command.to_ascii_uppercase())
            .or_insert(0) += 1;
    }

    /// Counts one failed command.
    pub fn track_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since these metrics were created (process start).
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Wall-clock start time.
    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let commands = self.commands.lock().clone();
        MetricsSnapshot {
            total_commands: commands.values().sum(),
            commands,
            errors: self.errors(),
        }
    }
}
