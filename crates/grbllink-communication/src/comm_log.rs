//! Communication log
//!
//! Bounded, timestamped record of lines written and read, for display to
//! the operator. With noise filtering on, status queries, status reports
//! and bare `ok` acknowledgements are not recorded.

use chrono::Local;
use grbllink_core::{CommDirection, CommLogEntry};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct CommLog {
    entries: VecDeque<CommLogEntry>,
    capacity: usize,
    filter_noise: bool,
}

impl CommLog {
    pub fn new(capacity: usize, filter_noise: bool) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            filter_noise,
        }
    }

    /// Record a line written to the controller
    pub fn record_sent(&mut self, text: &str) {
        self.record(CommDirection::Sent, text, false);
    }

    /// Record a line read from the controller
    pub fn record_received(&mut self, text: &str, is_error: bool) {
        self.record(CommDirection::Received, text, is_error);
    }

    fn record(&mut self, direction: CommDirection, text: &str, is_error: bool) {
        let text = text.trim();
        if self.filter_noise && is_noise(direction, text) {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(CommLogEntry {
            timestamp: Local::now(),
            direction,
            text: text.to_string(),
            is_error,
        });
    }

    pub fn set_filter_noise(&mut self, enabled: bool) {
        self.filter_noise = enabled;
    }

    pub fn filter_noise(&self) -> bool {
        self.filter_noise
    }

    pub fn entries(&self) -> impl Iterator<Item = &CommLogEntry> {
        self.entries.iter()
    }

    /// The newest `count` entries, oldest first
    pub fn recent(&self, count: usize) -> Vec<CommLogEntry> {
        let skip = self.entries.len().saturating_sub(count);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Status traffic and bare acknowledgements
pub fn is_noise(direction: CommDirection, text: &str) -> bool {
    match direction {
        CommDirection::Sent => text == "?",
        CommDirection::Received => text.starts_with('<') || text.eq_ignore_ascii_case("ok"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_filter() {
        let mut log = CommLog::new(10, true);
        log.record_sent("?");
        log.record_received("<Idle|MPos:0,0,0>", false);
        log.record_received("ok", false);
        assert!(log.is_empty());

        log.record_sent("G0 X1");
        log.record_received("error:20", true);
        assert_eq!(log.len(), 2);
        let entries: Vec<&CommLogEntry> = log.entries().collect();
        assert_eq!(entries[0].direction, CommDirection::Sent);
        assert!(entries[1].is_error);
    }

    #[test]
    fn test_unfiltered_keeps_everything() {
        let mut log = CommLog::new(10, false);
        log.record_sent("?");
        log.record_received("ok", false);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_capacity_trims_oldest() {
        let mut log = CommLog::new(3, true);
        for i in 0..5 {
            log.record_sent(&format!("G0 X{}", i));
        }
        let texts: Vec<String> = log.entries().map(|e| e.text.clone()).collect();
        assert_eq!(texts, vec!["G0 X2", "G0 X3", "G0 X4"]);
        assert_eq!(log.recent(2).len(), 2);
        assert_eq!(log.recent(2)[1].text, "G0 X4");
    }
}
