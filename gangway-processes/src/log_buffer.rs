//! Bounded in-memory buffer of captured process output.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// Default number of output lines retained.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Which stream a captured line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// A single captured output line. Immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct OutputEntry {
    pub timestamp: DateTime<Utc>,
    pub stream: StreamKind,
    pub text: String,
}

/// Fixed-capacity, insertion-ordered log of process output.
///
/// Appending at capacity evicts the oldest entry. Reads via [`tail`] never
/// mutate the buffer. The buffer itself is not synchronized; the supervisor
/// shares it behind a mutex since stream-reader tasks append while the
/// control path reads.
///
/// [`tail`]: OutputRingBuffer::tail
#[derive(Debug)]
pub struct OutputRingBuffer {
    entries: VecDeque<OutputEntry>,
    capacity: usize,
}

impl OutputRingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn append(&mut self, stream: StreamKind, text: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(OutputEntry {
            timestamp: Utc::now(),
            stream,
            text: text.into(),
        });
    }

    /// The most recent `count` entries, oldest first.
    pub fn tail(&self, count: usize) -> Vec<OutputEntry> {
        let skip = self.entries.len().saturating_sub(count);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for OutputRingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
