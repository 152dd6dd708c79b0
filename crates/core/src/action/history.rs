use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use super::{ActionType, AgentAction};

/// One dispatched action and how it went.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub action_type: ActionType,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub success: bool,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Diagnostic ring buffer of recent dispatches. Oldest entries are evicted
/// once `capacity` is reached; a capacity of 0 retains nothing.
#[derive(Debug)]
pub struct ActionHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
    total: u64,
}

impl ActionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(256)),
            capacity,
            total: 0,
        }
    }

    pub fn record(&mut self, action: &AgentAction, success: bool, message: &str) {
        self.total += 1;
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry {
            action_type: action.action_type.clone(),
            parameters: action.parameters.clone(),
            success,
            message: message.to_owned(),
            at: Utc::now(),
        });
    }

    /// Most recent entries, oldest first, up to `limit`.
    pub fn recent(&self, limit: usize) -> Vec<&HistoryEntry> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dispatches seen since creation, including evicted ones.
    pub fn total_recorded(&self) -> u64 {
        self.total
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
