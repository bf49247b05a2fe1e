//! Debounced persistence.
//!
//! The compiler itself is synchronous. Saving is modelled as one pending task
//! with a deadline: every edit reschedules it, and the owner polls it with
//! its own clock. A write happens once the deadline passes without a newer
//! edit.

use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::document::Step4Document;
use crate::error::StoreError;
use crate::parse::{parse_document_value, STEP4_STORAGE_KEY};

pub const DEFAULT_AUTOSAVE_DELAY_MS: u64 = 400;
/// Longer configured delays are clamped to this.
pub const MAX_AUTOSAVE_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Persistence collaborator for the Step-4 document.
pub trait ModelStore {
    /// The stored document, or `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<Step4Document>, StoreError>;

    fn store(&mut self, document: &Step4Document) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct AutoSave {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Default for AutoSave {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_AUTOSAVE_DELAY_MS))
    }
}

impl AutoSave {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay: delay.min(MAX_AUTOSAVE_DELAY),
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Cancels any pending save and schedules a new one `delay` after `now`.
    pub fn schedule(&mut self, now: Instant) {
        self.deadline = Some(now.checked_add(self.delay).unwrap_or(now));
    }

    /// Drops the pending save. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.map_or(false, |deadline| now >= deadline)
    }

    /// Clears the pending save and returns true if it is due at `now`.
    pub fn take_due(&mut self, now: Instant) -> bool {
        if self.is_due(now) {
            self.deadline = None;
            true
        } else {
            false
        }
    }
}

/// Key-value store kept in memory, holding the document under
/// [`STEP4_STORAGE_KEY`] as JSON.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Value>,
    writes: usize,
    reject_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store seeded with a raw JSON value, as an older version may have
    /// written it.
    pub fn with_raw(value: Value) -> Self {
        let mut store = Self::new();
        store.entries.insert(STEP4_STORAGE_KEY.to_string(), value);
        store
    }

    pub fn raw(&self) -> Option<&Value> {
        self.entries.get(STEP4_STORAGE_KEY)
    }

    /// Number of successful writes.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Makes every following write fail, to simulate a broken backend.
    pub fn reject_writes(&mut self, reject: bool) {
        self.reject_writes = reject;
    }
}

impl ModelStore for MemoryStore {
    fn load(&self) -> Result<Option<Step4Document>, StoreError> {
        self.raw()
            .map(|value| parse_document_value(value.clone()))
            .transpose()
    }

    fn store(&mut self, document: &Step4Document) -> Result<(), StoreError> {
        if self.reject_writes {
            return Err(StoreError::Backend {
                key: STEP4_STORAGE_KEY.to_string(),
                reason: "writes are rejected".to_string(),
            });
        }
        let value = serde_json::to_value(document)?;
        self.entries.insert(STEP4_STORAGE_KEY.to_string(), value);
        self.writes += 1;
        Ok(())
    }
}
