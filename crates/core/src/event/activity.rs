use std::collections::VecDeque;

use super::types::LogKind;

pub const DEFAULT_LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp: u64,
    pub message: String,
    pub kind: LogKind,
}

/// Bounded, human-readable record of what the engine did. Every entry is also
/// forwarded to the `log` facade.
#[derive(Debug)]
pub struct ActivityLog {
    entries: VecDeque<LogEntry>,
    next_id: u64,
    capacity: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            next_id: 0,
            capacity,
        }
    }

    pub fn push(&mut self, timestamp: u64, kind: LogKind, message: impl Into<String>) -> u64 {
        let message = message.into();
        match kind {
            LogKind::Error => log::warn!("{}", message),
            LogKind::Combat | LogKind::System => log::info!("{}", message),
            LogKind::Info => log::debug!("{}", message),
        }

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            id,
            timestamp,
            message,
            kind,
        });

        id
    }

    pub fn info(&mut self, timestamp: u64, message: impl Into<String>) -> u64 {
        self.push(timestamp, LogKind::Info, message)
    }

    pub fn combat(&mut self, timestamp: u64, message: impl Into<String>) -> u64 {
        self.push(timestamp, LogKind::Combat, message)
    }

    pub fn system(&mut self, timestamp: u64, message: impl Into<String>) -> u64 {
        self.push(timestamp, LogKind::System, message)
    }

    pub fn error(&mut self, timestamp: u64, message: impl Into<String>) -> u64 {
        self.push(timestamp, LogKind::Error, message)
    }

    pub fn entries(&self) -> impl DoubleEndedIterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.back()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries.iter().any(|e| e.message.contains(needle))
    }

    pub fn count_kind(&self, kind: LogKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
