//! In-memory ring of recent requests, for status display.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

pub const MAX_HISTORY: usize = 50;

#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub duration_ms: u64,
    pub ip: String,
}

/// Bounded FIFO of the most recent requests.
#[derive(Default)]
pub struct RequestHistory {
    records: Mutex<VecDeque<RequestRecord>>,
}

impl RequestHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, record: RequestRecord) {
        let mut records = self.records.lock().unwrap();
        if records.len() == MAX_HISTORY {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// All retained records, oldest first.
    pub fn recent(&self) -> Vec<RequestRecord> {
        self.records.lock().unwrap().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str) -> RequestRecord {
        RequestRecord {
            timestamp: Utc::now(),
            method: "GET".to_string(),
            path: path.to_string(),
            status: 200,
            duration_ms: 1,
            ip: "127.0.0.1".to_string(),
        }
    }

    #[test]
    fn keeps_only_the_most_recent_records() {
        let history = RequestHistory::new();
        for i in 0..(MAX_HISTORY + 10) {
            history.record(record(&format!("/{i}")));
        }
        assert_eq!(history.len(), MAX_HISTORY);
        let recent = history.recent();
        assert_eq!(recent.first().unwrap().path, "/10");
        assert_eq!(recent.last().unwrap().path, format!("/{}", MAX_HISTORY + 9));
    }

    #[test]
    fn empty_until_first_record() {
        let history = RequestHistory::new();
        assert!(history.is_empty());
        history.record(record("/a"));
        assert!(!history.is_empty());
        assert_eq!(history.len(), 1);
    }
}
