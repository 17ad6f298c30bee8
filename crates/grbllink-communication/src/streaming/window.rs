//! In-flight window accounting
//!
//! Every line written to the controller occupies window space until its
//! `ok` or `error` comes back. Acknowledgements arrive in send order, so the
//! window is a FIFO and each acknowledgement releases the oldest entry.

use grbllink_core::BufferPolicy;
use std::collections::VecDeque;

/// Where a queued command came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOrigin {
    /// Program line, with its 1-based source line number
    Program { line: usize },
    /// Operator or link-issued command
    Manual,
}

impl CommandOrigin {
    pub fn is_program(&self) -> bool {
        matches!(self, CommandOrigin::Program { .. })
    }
}

/// A command written and awaiting acknowledgement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCommand {
    /// Text as written, without terminator
    pub text: String,
    /// Window units held
    pub cost: usize,
    /// Where the command came from
    pub origin: CommandOrigin,
}

/// FIFO of unacknowledged commands bounded by a capacity
#[derive(Debug, Clone)]
pub struct InFlightWindow {
    policy: BufferPolicy,
    capacity: usize,
    entries: VecDeque<SentCommand>,
    used: usize,
}

impl InFlightWindow {
    pub fn new(policy: BufferPolicy, capacity: usize) -> Self {
        Self {
            policy,
            capacity,
            entries: VecDeque::new(),
            used: 0,
        }
    }

    /// Window units a line would hold
    pub fn cost(&self, text: &str) -> usize {
        match self.policy {
            BufferPolicy::CommandCount => 1,
            BufferPolicy::ByteCount => text.len() + 1,
        }
    }

    /// Whether the line fits right now
    pub fn fits(&self, text: &str) -> bool {
        self.used + self.cost(text) <= self.capacity
    }

    /// Whether the line fits an empty window
    pub fn can_ever_fit(&self, text: &str) -> bool {
        self.cost(text) <= self.capacity
    }

    /// Record a written line; the caller has checked [`fits`](Self::fits)
    pub fn push(&mut self, text: String, origin: CommandOrigin) -> usize {
        let cost = self.cost(&text);
        debug_assert!(self.used + cost <= self.capacity, "window overrun");
        self.used += cost;
        self.entries.push_back(SentCommand { text, cost, origin });
        cost
    }

    /// Release the oldest entry; `None` on an empty window
    pub fn acknowledge(&mut self) -> Option<SentCommand> {
        let entry = self.entries.pop_front()?;
        self.used = self.used.saturating_sub(entry.cost);
        Some(entry)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.used = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Units in use
    pub fn used(&self) -> usize {
        self.used
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> BufferPolicy {
        self.policy
    }
}
