//! Program stream state machine
//!
//! Owns the pending queue and the in-flight window. It decides what may be
//! written next; the session does the writing and reports back through
//! [`CommandStreamer::commit_front`] and [`CommandStreamer::acknowledge`].

use super::window::{CommandOrigin, InFlightWindow, SentCommand};
use crate::gcode::ProgramLine;
use grbllink_core::{BufferPolicy, ControllerError, StreamPhase};
use std::collections::VecDeque;

/// A command waiting to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedCommand {
    /// Command text as queued
    pub text: String,
    /// Where it came from
    pub origin: CommandOrigin,
}

/// Counts reported when a stream ends early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamProgress {
    pub sent: usize,
    pub total: usize,
}

#[derive(Debug)]
pub struct CommandStreamer {
    pending: VecDeque<QueuedCommand>,
    window: InFlightWindow,
    phase: StreamPhase,
    streaming: bool,
    step_mode: bool,
    step_credit: bool,
    total: usize,
    sent: usize,
}

impl CommandStreamer {
    pub fn new(policy: BufferPolicy, capacity: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            window: InFlightWindow::new(policy, capacity),
            phase: StreamPhase::Idle,
            streaming: false,
            step_mode: false,
            step_credit: false,
            total: 0,
            sent: 0,
        }
    }

    /// Start streaming a program
    pub fn begin(&mut self, lines: Vec<ProgramLine>, step_mode: bool) -> Result<(), ControllerError> {
        if self.streaming {
            return Err(ControllerError::StreamActive);
        }
        if lines.is_empty() {
            return Err(ControllerError::EmptyProgram);
        }

        self.total = lines.len();
        self.sent = 0;
        self.step_mode = step_mode;
        self.step_credit = true;
        self.streaming = true;
        self.pending.extend(lines.into_iter().map(|line| QueuedCommand {
            text: line.text,
            origin: CommandOrigin::Program { line: line.number },
        }));
        self.refresh_phase();
        Ok(())
    }

    /// Queue an operator command; refused while a program streams
    pub fn enqueue_manual(&mut self, text: impl Into<String>) -> Result<(), ControllerError> {
        if self.streaming {
            return Err(ControllerError::StreamActive);
        }
        self.pending.push_back(QueuedCommand {
            text: text.into(),
            origin: CommandOrigin::Manual,
        });
        Ok(())
    }

    /// Next command allowed to be written, ignoring window space
    ///
    /// `None` when nothing is pending or single-step mode is waiting for an
    /// advance.
    pub fn next_pending(&self) -> Option<&QueuedCommand> {
        let front = self.pending.front()?;
        if self.step_gated(front) {
            return None;
        }
        Some(front)
    }

    /// Move the front command into the window as `sent_text`
    ///
    /// `sent_text` may differ from the queued text after arc conversion.
    pub fn commit_front(&mut self, sent_text: String) -> Option<CommandOrigin> {
        let command = self.pending.pop_front()?;
        if command.origin.is_program() {
            self.sent += 1;
            if self.step_mode {
                self.step_credit = false;
            }
        }
        self.window.push(sent_text, command.origin);
        Some(command.origin)
    }

    /// Drop the front command without sending it
    pub fn discard_front(&mut self) -> Option<QueuedCommand> {
        let command = self.pending.pop_front()?;
        if command.origin.is_program() {
            // A skipped line counts as handled so progress still reaches the total.
            self.sent += 1;
        }
        Some(command)
    }

    /// Release the oldest in-flight command; no-op on an empty window
    pub fn acknowledge(&mut self) -> Option<SentCommand> {
        self.window.acknowledge()
    }

    /// Allow one more command in single-step mode
    pub fn advance_step(&mut self) -> Result<(), ControllerError> {
        if !self.streaming || !self.step_mode {
            return Err(ControllerError::NotStepping);
        }
        self.step_credit = true;
        Ok(())
    }

    /// Recompute the phase from queue and window contents
    pub fn refresh_phase(&mut self) -> StreamPhase {
        if !self.streaming {
            if self.phase != StreamPhase::Complete {
                self.phase = StreamPhase::Idle;
            }
            return self.phase;
        }

        self.phase = match self.pending.front() {
            None if self.window.is_empty() => StreamPhase::Confirming,
            None => StreamPhase::Draining,
            Some(front) if self.step_gated(front) || !self.window.fits(&front.text) => {
                StreamPhase::Waiting
            }
            Some(_) => StreamPhase::Filling,
        };
        self.phase
    }

    /// Confirm the stream finished; yields the line count exactly once
    pub fn finish(&mut self) -> Option<usize> {
        if !self.streaming || self.phase != StreamPhase::Confirming {
            return None;
        }
        self.streaming = false;
        self.step_mode = false;
        self.phase = StreamPhase::Complete;
        Some(self.total)
    }

    /// Drop everything pending and in flight
    ///
    /// Returns the progress of the stream that was cancelled, if any.
    pub fn cancel(&mut self) -> Option<StreamProgress> {
        self.pending.clear();
        self.window.clear();
        let progress = self.streaming.then_some(StreamProgress {
            sent: self.sent,
            total: self.total,
        });
        self.streaming = false;
        self.step_mode = false;
        self.step_credit = false;
        self.phase = StreamPhase::Idle;
        progress
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn is_step_mode(&self) -> bool {
        self.streaming && self.step_mode
    }

    /// Single-step mode has a line ready and is waiting for an advance
    pub fn awaiting_step(&self) -> bool {
        self.pending.front().is_some_and(|front| self.step_gated(front))
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn window(&self) -> &InFlightWindow {
        &self.window
    }

    fn step_gated(&self, front: &QueuedCommand) -> bool {
        self.streaming && self.step_mode && !self.step_credit && front.origin.is_program()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(lines: &[&str]) -> Vec<ProgramLine> {
        lines
            .iter()
            .enumerate()
            .map(|(i, text)| ProgramLine {
                number: i + 1,
                text: text.to_string(),
            })
            .collect()
    }

    /// Write everything the streamer allows, as the session would
    fn fill(streamer: &mut CommandStreamer) -> Vec<String> {
        let mut written = Vec::new();
        while let Some(next) = streamer.next_pending() {
            if !streamer.window().fits(&next.text) {
                break;
            }
            let text = next.text.clone();
            streamer.commit_front(text.clone());
            written.push(text);
        }
        streamer.refresh_phase();
        written
    }

    #[test]
    fn test_two_lines_sent_immediately() {
        let mut streamer = CommandStreamer::new(BufferPolicy::CommandCount, 4);
        streamer.begin(program(&["G0 X10", "G1 Y5"]), false).unwrap();
        assert_eq!(streamer.phase(), StreamPhase::Filling);

        assert_eq!(fill(&mut streamer), vec!["G0 X10", "G1 Y5"]);
        assert_eq!(streamer.phase(), StreamPhase::Draining);
        assert_eq!(streamer.window().len(), 2);

        streamer.acknowledge();
        streamer.acknowledge();
        assert_eq!(streamer.refresh_phase(), StreamPhase::Confirming);
        assert_eq!(streamer.finish(), Some(2));
        assert_eq!(streamer.finish(), None);
        assert_eq!(streamer.phase(), StreamPhase::Complete);
    }

    #[test]
    fn test_window_full_waits() {
        let mut streamer = CommandStreamer::new(BufferPolicy::CommandCount, 4);
        let lines: Vec<String> = (0..6).map(|i| format!("G1 X{}", i)).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        streamer.begin(program(&refs), false).unwrap();

        assert_eq!(fill(&mut streamer).len(), 4);
        assert_eq!(streamer.phase(), StreamPhase::Waiting);

        let acked = streamer.acknowledge().unwrap();
        assert_eq!(acked.text, "G1 X0");
        assert_eq!(fill(&mut streamer), vec!["G1 X4"]);
        assert_eq!(streamer.window().len(), 4);
    }

    #[test]
    fn test_step_mode_one_line_per_advance() {
        let mut streamer = CommandStreamer::new(BufferPolicy::CommandCount, 4);
        streamer.begin(program(&["G0 X1", "G0 X2", "G0 X3"]), true).unwrap();

        assert_eq!(fill(&mut streamer), vec!["G0 X1"]);
        assert!(streamer.awaiting_step());
        assert_eq!(streamer.phase(), StreamPhase::Waiting);
        assert!(fill(&mut streamer).is_empty());

        streamer.advance_step().unwrap();
        streamer.advance_step().unwrap();
        assert_eq!(fill(&mut streamer), vec!["G0 X2"]);
        assert!(streamer.awaiting_step());
    }

    #[test]
    fn test_manual_refused_while_streaming() {
        let mut streamer = CommandStreamer::new(BufferPolicy::CommandCount, 4);
        streamer.enqueue_manual("$X").unwrap();
        streamer.begin(program(&["G0 X1"]), false).unwrap();
        assert_eq!(
            streamer.enqueue_manual("$H"),
            Err(ControllerError::StreamActive)
        );
        assert_eq!(
            streamer.begin(program(&["G0"]), false),
            Err(ControllerError::StreamActive)
        );
        // Queued before the stream, so it goes first.
        assert_eq!(fill(&mut streamer), vec!["$X", "G0 X1"]);
        assert_eq!(streamer.sent(), 1);
    }

    #[test]
    fn test_cancel_clears_everything() {
        let mut streamer = CommandStreamer::new(BufferPolicy::CommandCount, 2);
        streamer.begin(program(&["G0 X1", "G0 X2", "G0 X3"]), false).unwrap();
        fill(&mut streamer);

        let progress = streamer.cancel().unwrap();
        assert_eq!(progress, StreamProgress { sent: 2, total: 3 });
        assert_eq!(streamer.pending_len(), 0);
        assert!(streamer.window().is_empty());
        assert_eq!(streamer.phase(), StreamPhase::Idle);
        assert_eq!(streamer.cancel(), None);
        assert_eq!(streamer.advance_step(), Err(ControllerError::NotStepping));
    }

    #[test]
    fn test_empty_program_rejected() {
        let mut streamer = CommandStreamer::new(BufferPolicy::CommandCount, 4);
        assert_eq!(
            streamer.begin(Vec::new(), false),
            Err(ControllerError::EmptyProgram)
        );
        assert!(!streamer.is_streaming());
    }

    #[test]
    fn test_discard_counts_as_handled() {
        let mut streamer = CommandStreamer::new(BufferPolicy::CommandCount, 4);
        streamer.begin(program(&["G2 X10 R1"]), false).unwrap();
        assert!(streamer.discard_front().is_some());
        assert_eq!(streamer.sent(), 1);
        assert_eq!(streamer.refresh_phase(), StreamPhase::Confirming);
    }
}
