//! Adaptive status polling
//!
//! The `?` query rate follows what the machine is doing: fast while it
//! moves, slower when it has just stopped, slow when idle and slowest when
//! alarmed.

use grbllink_core::RunState;
use grbllink_settings::PollingSettings;
use std::time::{Duration, Instant};

/// Minimum spacing of burst polls
const BURST_INTERVAL: Duration = Duration::from_millis(150);

/// Inputs the interval depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollContext {
    pub state: RunState,
    pub streaming: bool,
    pub step_mode: bool,
}

#[derive(Debug, Clone)]
pub struct PollScheduler {
    settings: PollingSettings,
    last_poll: Option<Instant>,
    last_command: Option<Instant>,
    burst_remaining: u32,
}

impl PollScheduler {
    pub fn new(settings: PollingSettings) -> Self {
        Self {
            settings,
            last_poll: None,
            last_command: None,
            burst_remaining: 0,
        }
    }

    /// Interval for the given context at `now`
    pub fn interval(&self, ctx: PollContext, now: Instant) -> Duration {
        let ms = |v: u64| Duration::from_millis(v);
        let s = &self.settings;

        if ctx.step_mode {
            return ms(s.step_mode_ms);
        }
        if ctx.streaming || ctx.state.is_moving() {
            return ms(s.active_ms);
        }
        match ctx.state {
            RunState::Alarm => ms(s.alarm_ms),
            RunState::Idle if self.recently_commanded(now) => ms(s.settle_ms),
            RunState::Idle => ms(s.idle_ms),
            _ => ms(s.settle_ms),
        }
    }

    /// Whether a query should be written now; records it if so
    pub fn poll_due(&mut self, ctx: PollContext, now: Instant) -> bool {
        if !ctx.state.is_connected() {
            return false;
        }

        let mut interval = self.interval(ctx, now);
        if self.burst_remaining > 0 {
            interval = interval.min(BURST_INTERVAL);
        }

        let due = match self.last_poll {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= interval,
        };
        if due {
            self.last_poll = Some(now);
            self.burst_remaining = self.burst_remaining.saturating_sub(1);
        }
        due
    }

    /// Note a line written to the controller
    pub fn note_command(&mut self, now: Instant) {
        self.last_command = Some(now);
    }

    /// Poll quickly for the next configured number of queries
    pub fn request_burst(&mut self) {
        self.burst_remaining = self.settings.burst_count;
    }

    /// Force the next check to poll
    pub fn poll_soon(&mut self) {
        self.last_poll = None;
    }

    pub fn reset(&mut self) {
        self.last_poll = None;
        self.last_command = None;
        self.burst_remaining = 0;
    }

    fn recently_commanded(&self, now: Instant) -> bool {
        self.last_command.is_some_and(|at| {
            now.saturating_duration_since(at) < Duration::from_millis(self.settings.settle_window_ms)
        })
    }
}
