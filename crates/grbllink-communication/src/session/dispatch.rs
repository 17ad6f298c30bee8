//! Response dispatcher
//!
//! Drains the reader queue in bounded batches and folds each response into
//! the session. Every [`GrblResponse`] variant is handled here.

use super::{Link, LinkSession};
use crate::communication::ReaderMessage;
use crate::firmware::grbl::{error_decoder, settings, GrblResponse, StatusReport};
use crate::gcode::{modal, Block};
use grbllink_core::{DisconnectReason, ErrorPolicy, LinkEvent, RunState, StreamPhase};

impl LinkSession {
    /// Handle up to `response_batch` queued lines
    pub(super) fn dispatch_responses(&mut self) {
        for _ in 0..self.config.streaming.response_batch.max(1) {
            let message = match &mut self.link {
                Some(Link::Ready { rx, .. }) => rx.try_recv().ok(),
                _ => None,
            };
            let Some(message) = message else {
                break;
            };

            match message {
                ReaderMessage::Line(line) => {
                    let Some(response) = GrblResponse::parse(&line) else {
                        continue;
                    };
                    self.comm_log.record_received(&line, response.is_fault());
                    self.handle_response(response);
                }
                ReaderMessage::Disconnected(reason) => {
                    self.handle_response(GrblResponse::Disconnected(reason));
                }
            }

            if !self.is_connected() {
                break;
            }
        }
    }

    pub(super) fn handle_response(&mut self, response: GrblResponse) {
        match response {
            GrblResponse::Status(report) => self.on_status(&report),
            GrblResponse::Ok => self.on_ok(),
            GrblResponse::Error(code) => self.on_error(code),
            GrblResponse::Alarm(code) => self.on_alarm(code),
            GrblResponse::Setting { number, value } => self.on_setting(number, value),
            GrblResponse::Welcome(banner) => self.on_reset(banner),
            GrblResponse::Disconnected(reason) => {
                self.teardown(DisconnectReason::Lost(reason));
            }
            GrblResponse::Other(text) => {
                if text.starts_with("[MSG:") {
                    tracing::info!("controller message: {}", text);
                } else {
                    tracing::debug!("unhandled response: {}", text);
                }
            }
        }
    }

    fn on_status(&mut self, report: &StatusReport) {
        for event in self.tracker.apply_status(report) {
            self.events.publish(event);
        }

        // Only a report following a query written after the final
        // acknowledgement confirms the stream.
        if !self.streamer.is_streaming()
            || self.streamer.refresh_phase() != StreamPhase::Confirming
            || !self.confirm_polled
        {
            return;
        }
        let state = self.tracker.state();
        if state.is_motion_stopped() {
            if let Some(lines) = self.streamer.finish() {
                self.confirm_requested = false;
                self.confirm_polled = false;
                tracing::info!(lines, "stream complete");
                self.events.publish(LinkEvent::StreamCompleted { lines });
            }
        } else if state == RunState::Alarm {
            self.fail_stream("controller alarmed before motion finished".to_string());
        }
    }

    /// `ok`: the oldest in-flight command was accepted
    fn on_ok(&mut self) {
        if let Some(sent) = self.streamer.acknowledge() {
            self.apply_acknowledged(&sent.text);
        }
        self.streamer.refresh_phase();
    }

    /// `error`: the oldest in-flight command was rejected, its slot is freed
    /// all the same
    fn on_error(&mut self, code: Option<u8>) {
        let sent = self.streamer.acknowledge();
        let message = error_decoder::describe_error(code);
        let command = sent.as_ref().map(|s| s.text.clone());
        tracing::warn!(
            ?code,
            command = command.as_deref().unwrap_or("-"),
            "controller error: {}",
            message
        );
        self.events.publish(LinkEvent::ProtocolError {
            code,
            message: message.clone(),
            command,
        });

        let from_program = sent.as_ref().is_some_and(|s| s.origin.is_program());
        if from_program && self.config.streaming.error_policy == ErrorPolicy::Abort {
            let reason = match code {
                Some(code) => error_decoder::format_error(code),
                None => message,
            };
            self.fail_stream(reason);
        }
        self.streamer.refresh_phase();
    }

    /// Side effects of a command the controller accepted
    fn apply_acknowledged(&mut self, text: &str) {
        let Ok(block) = Block::parse(text) else {
            return;
        };
        if let Some(change) = modal::origin_change(&block) {
            let event = self.tracker.apply_origin(&change);
            self.events.publish(event);
            self.modal.sync_position(self.tracker.work_pos());
            self.poller.request_burst();
        }
    }

    fn on_alarm(&mut self, code: u8) {
        let message = error_decoder::describe_alarm(code);
        tracing::warn!(code, "controller alarm: {}", message);
        self.events.publish(LinkEvent::Alarm { code, message });
        self.transition(RunState::Alarm);
        self.laser_on = false;

        // The controller drops its buffer on alarm; nothing in flight will be acknowledged.
        if self.streamer.is_streaming() {
            self.fail_stream(error_decoder::format_alarm(code));
        } else {
            self.streamer.cancel();
        }
        self.poller.poll_soon();
    }

    fn on_setting(&mut self, number: u16, value: String) {
        self.settings.set(number, value.clone());
        if number == settings::HOMING_ENABLE {
            tracing::debug!(enabled = self.settings.homing_enabled(), "homing flag read back");
        }
        self.events.publish(LinkEvent::SettingReceived { number, value });
    }

    /// Startup banner: the controller reset and forgot everything buffered
    ///
    /// Banners answering our own soft resets only release held commands.
    fn on_reset(&mut self, banner: String) {
        if self.resets_expected > 0 {
            self.resets_expected -= 1;
            if self.resets_expected == 0 {
                self.reset_deadline = None;
            }
            tracing::debug!(
                remaining = self.resets_expected,
                "soft reset acknowledged: {}",
                banner
            );
        } else {
            tracing::info!("controller reset: {}", banner);
            if self.streamer.is_streaming() {
                self.fail_stream("controller reset".to_string());
            } else {
                self.streamer.cancel();
            }
        }
        self.modal.reset_modes();
        self.laser_on = false;
        self.poller.request_burst();
        self.poller.poll_soon();
        self.events.publish(LinkEvent::ControllerReset(banner));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::VirtualPort;
    use grbllink_settings::LinkConfig;
    use std::time::{Duration, Instant};

    fn ready_session() -> LinkSession {
        ready_on(&VirtualPort::new())
    }

    fn ready_on(port: &VirtualPort) -> LinkSession {
        let mut config = LinkConfig::default();
        config.connection.port = "virtual".to_string();
        config.connection.settle_delay_ms = 0;
        config.connection.startup_commands.clear();
        let mut session = LinkSession::new(Box::new(port.clone()), config);
        let now = Instant::now();
        session.connect(now).unwrap();
        session.tick(now);
        session
    }

    fn idle_report() -> GrblResponse {
        GrblResponse::parse("<Idle|MPos:1.000,0.000,0.000|FS:0,0>").unwrap()
    }

    fn drain(events: &mut tokio::sync::broadcast::Receiver<LinkEvent>) -> Vec<LinkEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        seen
    }

    #[test]
    fn test_settings_mirror_homing_flag() {
        let mut session = ready_session();
        assert!(!session.settings().homing_enabled());
        session.handle_response(GrblResponse::parse("$22=1").unwrap());
        assert!(session.settings().homing_enabled());
        assert!(session.snapshot().homing_enabled);
    }

    #[test]
    fn test_ack_on_empty_window_is_noop() {
        let mut session = ready_session();
        session.handle_response(GrblResponse::Ok);
        session.handle_response(GrblResponse::Error(Some(20)));
        assert_eq!(session.snapshot().in_flight, 0);
    }

    #[test]
    fn test_error_event_carries_decoded_cause() {
        let mut session = ready_session();
        let mut events = session.subscribe();
        session.handle_response(GrblResponse::Error(Some(20)));

        match events.try_recv().unwrap() {
            LinkEvent::ProtocolError { code, message, command } => {
                assert_eq!(code, Some(20));
                assert_eq!(message, error_decoder::describe_error(Some(20)));
                assert_eq!(command, None);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_alarm_sets_state() {
        let mut session = ready_session();
        session.handle_response(GrblResponse::Alarm(1));
        assert_eq!(session.state(), RunState::Alarm);
    }

    #[test]
    fn test_reader_disconnect_tears_down() {
        let mut session = ready_session();
        let mut events = session.subscribe();
        session.handle_response(GrblResponse::Disconnected("gone".to_string()));

        assert!(!session.is_connected());
        assert_eq!(session.state(), RunState::Disconnected);
        let mut saw_disconnect = false;
        while let Ok(event) = events.try_recv() {
            if let LinkEvent::Disconnected(DisconnectReason::Lost(reason)) = event {
                assert_eq!(reason, "gone");
                saw_disconnect = true;
            }
        }
        assert!(saw_disconnect);
    }

    #[test]
    fn test_stale_report_does_not_confirm() {
        let mut session = ready_session();
        let mut events = session.subscribe();
        let now = Instant::now();
        session.run_commands(vec!["G0 X1".to_string()], false).unwrap();
        session.tick(now);

        session.handle_response(GrblResponse::Ok);
        // Answers a query written before the last acknowledgement.
        session.handle_response(idle_report());
        assert!(session.snapshot().phase == StreamPhase::Confirming);
        assert!(!drain(&mut events)
            .iter()
            .any(|e| matches!(e, LinkEvent::StreamCompleted { .. })));

        session.tick(now);
        session.handle_response(idle_report());
        assert!(drain(&mut events)
            .iter()
            .any(|e| matches!(e, LinkEvent::StreamCompleted { lines: 1 })));
    }

    #[test]
    fn test_own_reset_banners_hold_new_commands() {
        let port = VirtualPort::new();
        let mut session = ready_on(&port);
        let mut events = session.subscribe();
        let now = Instant::now();

        session.abort();
        session.run_commands(vec!["G0 X1".to_string()], false).unwrap();
        session.tick(now);
        assert!(port.sent_lines().is_empty());

        let repeats = session.config().streaming.abort_repeat;
        for _ in 0..repeats {
            session.handle_response(GrblResponse::parse("Grbl 1.1h ['$' for help]").unwrap());
        }
        session.tick(now);
        assert_eq!(port.sent_lines(), vec!["G0 X1"]);
        assert!(!drain(&mut events)
            .iter()
            .any(|e| matches!(e, LinkEvent::StreamFailed { .. })));
    }

    #[test]
    fn test_missing_reset_banners_expire() {
        let port = VirtualPort::new();
        let mut session = ready_on(&port);
        let now = Instant::now();

        session.abort();
        session.run_commands(vec!["G0 X1".to_string()], false).unwrap();
        session.tick(now);
        assert!(port.sent_lines().is_empty());

        let timeout = session.config().connection.timeout();
        session.tick(now + timeout + Duration::from_millis(1));
        assert_eq!(port.sent_lines(), vec!["G0 X1"]);
    }

    #[test]
    fn test_unexpected_banner_fails_stream() {
        let mut session = ready_session();
        let mut events = session.subscribe();
        session.run_commands(vec!["G0 X1".to_string()], false).unwrap();
        session.tick(Instant::now());

        session.handle_response(GrblResponse::parse("Grbl 1.1h ['$' for help]").unwrap());
        assert!(drain(&mut events)
            .iter()
            .any(|e| matches!(e, LinkEvent::StreamFailed { message } if message == "controller reset")));
    }
}
