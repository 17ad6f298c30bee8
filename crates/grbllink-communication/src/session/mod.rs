//! GRBL link session
//!
//! A [`LinkSession`] owns one connection: the write half of the port, the
//! reader thread and its queue, the mirrored controller state, the command
//! streamer and the poll schedule. Nothing runs on its own; the owner calls
//! [`LinkSession::tick`] periodically and every tick drains responses,
//! refills the controller buffer and issues status queries as needed.
//!
//! All writes are fire-and-forget. Their outcome is observed through the
//! response queue on later ticks.

mod dispatch;

use crate::comm_log::CommLog;
use crate::communication::{
    classify_io_error, ConnectionParams, DisconnectDebounce, PortPair, PortWriter, Reader,
    ReaderMessage, Transport,
};
use crate::firmware::grbl::{commands, realtime, GrblSettings};
use crate::gcode::{convert_radius_arc, modal, Block, ModalTracker, ProgramLine};
use crate::state::StateTracker;
use crate::streaming::{CommandOrigin, CommandStreamer, PollContext, PollScheduler};
use grbllink_core::{
    ConnectionError, ControllerError, DisconnectReason, ErrorPolicy, EventDispatcher, GcodeError,
    LinkEvent, LinkSnapshot, Result, RunState, StreamPhase,
};
use grbllink_settings::LinkConfig;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

/// Communication log entries carried by a snapshot
const SNAPSHOT_LOG_ENTRIES: usize = 20;

/// Port state of a session
enum Link {
    /// Open, waiting for the controller to finish its startup output
    Settling { pair: PortPair, until: Instant },
    /// Reader running, ready for traffic
    Ready {
        writer: Box<dyn PortWriter>,
        reader: Reader,
        rx: mpsc::UnboundedReceiver<ReaderMessage>,
    },
}

pub struct LinkSession {
    id: Uuid,
    config: LinkConfig,
    transport: Box<dyn Transport>,
    params: ConnectionParams,
    link: Option<Link>,
    tracker: StateTracker,
    settings: GrblSettings,
    streamer: CommandStreamer,
    modal: ModalTracker,
    poller: PollScheduler,
    comm_log: CommLog,
    write_faults: DisconnectDebounce,
    events: EventDispatcher,
    laser_on: bool,
    confirm_requested: bool,
    /// A `?` went out after the last acknowledgement of the stream
    confirm_polled: bool,
    step_announced: bool,
    /// Startup banners still owed by soft resets this session wrote
    resets_expected: usize,
    reset_deadline: Option<Instant>,
}

impl LinkSession {
    pub fn new(transport: Box<dyn Transport>, config: LinkConfig) -> Self {
        Self::with_events(transport, config, EventDispatcher::default())
    }

    /// Session publishing into an existing dispatcher
    pub fn with_events(
        transport: Box<dyn Transport>,
        config: LinkConfig,
        events: EventDispatcher,
    ) -> Self {
        let streaming = &config.streaming;
        Self {
            id: Uuid::new_v4(),
            transport,
            params: ConnectionParams::from(&config.connection),
            link: None,
            tracker: StateTracker::new(),
            settings: GrblSettings::new(),
            streamer: CommandStreamer::new(streaming.buffer_policy, streaming.capacity),
            modal: ModalTracker::new(),
            poller: PollScheduler::new(config.polling.clone()),
            comm_log: CommLog::new(config.log.capacity, config.log.filter_noise),
            write_faults: DisconnectDebounce::new(config.connection.disconnect_threshold),
            events,
            laser_on: false,
            confirm_requested: false,
            confirm_polled: false,
            step_announced: false,
            resets_expected: 0,
            reset_deadline: None,
            config,
        }
    }

    // ---- lifecycle ----

    /// Open the port; the session becomes ready once the settle delay passes
    pub fn connect(&mut self, now: Instant) -> Result<()> {
        if self.link.is_some() {
            return Err(ConnectionError::AlreadyConnected {
                port: self.params.port.clone(),
            }
            .into());
        }

        let pair = self.transport.open(&self.params)?;
        self.id = Uuid::new_v4();
        self.link = Some(Link::Settling {
            pair,
            until: now + self.config.connection.settle_delay(),
        });
        tracing::info!(port = %self.params.port, session = %self.id, "port opened, settling");
        self.events.publish(LinkEvent::Connecting {
            port: self.params.port.clone(),
        });
        self.transition(RunState::Connecting);
        Ok(())
    }

    /// Close the port after a best-effort laser off
    ///
    /// Safe to call on a session that never connected.
    pub fn disconnect(&mut self) {
        if let Some(Link::Ready { writer, .. }) = &mut self.link {
            let line = format!("{}\n", commands::LASER_OFF);
            if let Err(err) = writer.write_all(line.as_bytes()) {
                tracing::debug!("laser off before disconnect failed: {}", err);
            }
        }
        self.teardown(DisconnectReason::Requested);
    }

    /// One scheduling turn
    pub fn tick(&mut self, now: Instant) {
        if matches!(&self.link, Some(Link::Settling { until, .. }) if *until <= now) {
            self.finish_settle(now);
        }
        if !self.is_connected() {
            return;
        }

        self.dispatch_responses();
        if !self.is_connected() {
            return;
        }

        self.expire_resets(now);
        self.fill(now);
        if !self.is_connected() {
            return;
        }

        if self.streamer.refresh_phase() == StreamPhase::Confirming && !self.confirm_requested {
            // The last `ok` only means accepted; ask right away whether motion stopped.
            self.confirm_requested = true;
            self.poller.poll_soon();
        }
        self.poll(now);
    }

    fn finish_settle(&mut self, now: Instant) {
        let mut pair = match self.link.take() {
            Some(Link::Settling { pair, .. }) => pair,
            other => {
                self.link = other;
                return;
            }
        };

        if let Err(err) = pair.writer.discard_input() {
            tracing::warn!("failed to discard startup output: {}", err);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let reader = match Reader::spawn(
            pair.reader,
            tx,
            self.config.connection.read_idle(),
            self.config.connection.disconnect_threshold,
        ) {
            Ok(reader) => reader,
            Err(err) => {
                tracing::error!("failed to start reader: {}", err);
                pair.writer.close();
                self.finish_teardown(DisconnectReason::Lost(err.to_string()));
                return;
            }
        };

        self.link = Some(Link::Ready {
            writer: pair.writer,
            reader,
            rx,
        });
        self.write_faults.record_success();
        self.poller.reset();
        self.poller.note_command(now);
        self.transition(RunState::Idle);
        tracing::info!(port = %self.params.port, session = %self.id, "link ready");
        self.events.publish(LinkEvent::Connected {
            session_id: self.id,
            port: self.params.port.clone(),
        });

        for command in self.config.connection.startup_commands.clone() {
            if let Err(err) = self.streamer.enqueue_manual(command) {
                tracing::warn!("startup command not queued: {}", err);
            }
        }
    }

    /// Stop everything and drop the port
    fn teardown(&mut self, reason: DisconnectReason) {
        match self.link.take() {
            Some(Link::Ready {
                mut writer,
                mut reader,
                ..
            }) => {
                reader.stop();
                writer.close();
            }
            Some(Link::Settling { mut pair, .. }) => pair.writer.close(),
            None => return,
        }
        self.finish_teardown(reason);
    }

    fn finish_teardown(&mut self, reason: DisconnectReason) {
        if let Some(progress) = self.streamer.cancel() {
            let event = match &reason {
                DisconnectReason::Requested => LinkEvent::StreamAborted {
                    sent: progress.sent,
                    total: progress.total,
                },
                DisconnectReason::Lost(message) => LinkEvent::StreamFailed {
                    message: format!("connection lost: {}", message),
                },
            };
            self.events.publish(event);
        }
        self.poller.reset();
        self.write_faults.record_success();
        self.laser_on = false;
        self.confirm_requested = false;
        self.confirm_polled = false;
        self.step_announced = false;
        self.resets_expected = 0;
        self.reset_deadline = None;
        if let Some(event) = self.tracker.set_disconnected() {
            self.events.publish(event);
        }

        match &reason {
            DisconnectReason::Requested => tracing::info!(port = %self.params.port, "disconnected"),
            DisconnectReason::Lost(message) => {
                tracing::error!(port = %self.params.port, "connection lost: {}", message)
            }
        }
        self.events.publish(LinkEvent::Disconnected(reason));
    }

    // ---- streaming ----

    /// Stream prepared program lines
    pub fn run_program(&mut self, lines: Vec<ProgramLine>, step_mode: bool) -> Result<()> {
        self.ensure_ready()?;
        let state = self.tracker.state();
        if state == RunState::Alarm {
            return Err(ControllerError::Alarmed {
                state: state.to_string(),
            }
            .into());
        }

        self.streamer.begin(lines, step_mode)?;
        self.modal.sync_position(self.tracker.work_pos());
        self.confirm_requested = false;
        self.confirm_polled = false;
        self.step_announced = false;
        tracing::info!(
            lines = self.streamer.total(),
            step_mode,
            "stream started"
        );
        Ok(())
    }

    /// Stream already resolved command lines
    pub fn run_commands(&mut self, texts: Vec<String>, step_mode: bool) -> Result<()> {
        let lines = texts
            .into_iter()
            .enumerate()
            .map(|(index, text)| ProgramLine {
                number: index + 1,
                text: text.trim().to_string(),
            })
            .filter(|line| !line.text.is_empty())
            .collect();
        self.run_program(lines, step_mode)
    }

    /// Release the next line in single-step mode
    pub fn advance_step(&mut self) -> Result<()> {
        self.streamer.advance_step()?;
        self.step_announced = false;
        Ok(())
    }

    /// Cancel everything and reset the controller
    ///
    /// Local state is cleared whether or not the controller answers. Queued
    /// responses belong to the cancelled commands and are dropped; new
    /// commands are held until the reset banners arrive or the connection
    /// timeout passes.
    pub fn abort(&mut self) {
        let progress = self.streamer.cancel();
        self.confirm_requested = false;
        self.confirm_polled = false;
        self.step_announced = false;
        self.laser_on = false;
        self.modal.reset_modes();

        let mut lost = None;
        if self.is_connected() {
            lost = self.discard_responses();
        }
        if self.is_connected() && lost.is_none() {
            let mut written = 0;
            for _ in 0..self.config.streaming.abort_repeat.max(1) {
                if !self.write_realtime(realtime::SOFT_RESET) {
                    break;
                }
                written += 1;
            }
            self.resets_expected += written;
            self.reset_deadline = None;
            self.transition(RunState::Idle);
            self.poller.request_burst();
        }

        if let Some(progress) = progress {
            tracing::info!(sent = progress.sent, total = progress.total, "stream aborted");
            self.events.publish(LinkEvent::StreamAborted {
                sent: progress.sent,
                total: progress.total,
            });
        }
        if let Some(reason) = lost {
            self.teardown(DisconnectReason::Lost(reason));
        }
    }

    /// Soft reset outside of a stream; same path as an abort
    pub fn soft_reset(&mut self) {
        self.abort();
    }

    // ---- manual operations ----

    /// Queue one command line; refused while a stream is active
    ///
    /// A lone realtime character (`?`, `!`, `~`) is written immediately.
    pub fn send_command(&mut self, command: &str) -> Result<()> {
        self.ensure_ready()?;
        let command = command.trim();
        if let [byte @ (realtime::STATUS_QUERY | realtime::FEED_HOLD | realtime::CYCLE_RESUME)] =
            command.as_bytes()
        {
            self.write_realtime(*byte);
            return Ok(());
        }
        if command.is_empty() {
            return Err(ControllerError::CommandRejected {
                reason: "empty command".to_string(),
            }
            .into());
        }
        self.streamer.enqueue_manual(command)?;
        Ok(())
    }

    /// Run the homing cycle; requires `$22=1` to have been read back
    pub fn home(&mut self) -> Result<()> {
        if !self.settings.homing_enabled() {
            return Err(ControllerError::HomingDisabled.into());
        }
        self.send_command(commands::HOME)
    }

    pub fn unlock(&mut self) -> Result<()> {
        self.send_command(commands::UNLOCK)
    }

    /// Incremental jog; axes without a distance stay put
    pub fn jog(&mut self, x: Option<f64>, y: Option<f64>, z: Option<f64>, feed: f64) -> Result<()> {
        if x.is_none() && y.is_none() && z.is_none() {
            return Err(ControllerError::CommandRejected {
                reason: "jog needs at least one axis".to_string(),
            }
            .into());
        }
        self.send_command(&commands::jog(x, y, z, feed))
    }

    pub fn set_work_origin(&mut self) -> Result<()> {
        self.send_command(commands::SET_WORK_ORIGIN)
    }

    pub fn go_to_origin(&mut self) -> Result<()> {
        self.ensure_ready()?;
        if self.streamer.is_streaming() {
            return Err(ControllerError::StreamActive.into());
        }
        for command in commands::go_to_origin() {
            self.send_command(command)?;
        }
        Ok(())
    }

    pub fn query_settings(&mut self) -> Result<()> {
        self.send_command(commands::SETTINGS)
    }

    pub fn feed_hold(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.write_realtime(realtime::FEED_HOLD);
        Ok(())
    }

    pub fn cycle_resume(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.write_realtime(realtime::CYCLE_RESUME);
        Ok(())
    }

    pub fn set_log_filter(&mut self, enabled: bool) {
        self.comm_log.set_filter_noise(enabled);
    }

    // ---- accessors ----

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Ready for traffic (settle delay passed, reader running)
    pub fn is_connected(&self) -> bool {
        matches!(self.link, Some(Link::Ready { .. }))
    }

    pub fn state(&self) -> RunState {
        self.tracker.state()
    }

    pub fn settings(&self) -> &GrblSettings {
        &self.settings
    }

    pub fn comm_log(&self) -> &CommLog {
        &self.comm_log
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        let window = self.streamer.window();
        LinkSnapshot {
            state: self.tracker.state(),
            machine_pos: self.tracker.machine_pos(),
            work_pos: self.tracker.work_pos(),
            work_offset: self.tracker.work_offset(),
            laser_on: self.laser_on,
            homing_enabled: self.settings.homing_enabled(),
            in_flight: window.len(),
            window_used: window.used(),
            window_capacity: window.capacity(),
            pending: self.streamer.pending_len(),
            sent_lines: self.streamer.sent(),
            total_lines: self.streamer.total(),
            phase: self.streamer.phase(),
            awaiting_step: self.streamer.awaiting_step(),
            recent_log: self.comm_log.recent(SNAPSHOT_LOG_ENTRIES),
        }
    }

    // ---- internals ----

    fn ensure_ready(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ConnectionError::NotConnected.into())
        }
    }

    /// Drop every queued response; returns the reader's disconnect reason
    /// if one was queued
    fn discard_responses(&mut self) -> Option<String> {
        let Some(Link::Ready { rx, .. }) = &mut self.link else {
            return None;
        };
        let mut discarded = 0;
        while let Ok(message) = rx.try_recv() {
            match message {
                ReaderMessage::Line(_) => discarded += 1,
                ReaderMessage::Disconnected(reason) => return Some(reason),
            }
        }
        if discarded > 0 {
            tracing::debug!(discarded, "dropped responses to cancelled commands");
        }
        None
    }

    /// Stop waiting for reset banners the controller never sent
    fn expire_resets(&mut self, now: Instant) {
        if self.resets_expected == 0 {
            return;
        }
        match self.reset_deadline {
            None => self.reset_deadline = Some(now + self.config.connection.timeout()),
            Some(deadline) if deadline <= now => {
                tracing::debug!(
                    missing = self.resets_expected,
                    "reset banners not received, releasing held commands"
                );
                self.resets_expected = 0;
                self.reset_deadline = None;
            }
            Some(_) => {}
        }
    }

    fn transition(&mut self, state: RunState) {
        if let Some(event) = self.tracker.set_state(state) {
            self.events.publish(event);
        }
    }

    /// Move pending commands into the controller buffer while they fit
    fn fill(&mut self, now: Instant) {
        // Anything sent before the reset completes would be wiped by it.
        if self.resets_expected > 0 {
            return;
        }
        while let Some(front) = self.streamer.next_pending() {
            let text = front.text.clone();
            let origin = front.origin;

            let outbound = match self.outbound_text(&text) {
                Ok(outbound) => outbound,
                Err(err) => {
                    self.reject_front(&text, origin, err.to_string());
                    continue;
                }
            };

            let window = self.streamer.window();
            if !window.can_ever_fit(&outbound) {
                let err = GcodeError::ExceedsCapacity {
                    line: outbound.clone(),
                    cost: window.cost(&outbound),
                    capacity: window.capacity(),
                };
                self.reject_front(&text, origin, err.to_string());
                continue;
            }
            if !window.fits(&outbound) {
                break;
            }

            if !self.write_line(&outbound) {
                // Still pending; retried next tick unless the link was torn down.
                return;
            }

            self.streamer.commit_front(outbound.clone());
            self.modal.apply_line(&outbound);
            self.track_laser(&outbound);
            self.poller.note_command(now);
            self.step_announced = false;

            if origin.is_program() {
                self.events.publish(LinkEvent::LineSent {
                    sent: self.streamer.sent(),
                    total: self.streamer.total(),
                });
            }
        }

        if self.streamer.awaiting_step() && !self.step_announced {
            self.step_announced = true;
            self.events.publish(LinkEvent::StepAwaiting {
                sent: self.streamer.sent(),
            });
        }
    }

    fn outbound_text(&self, text: &str) -> std::result::Result<String, GcodeError> {
        if !self.config.streaming.convert_radius_arcs {
            return Ok(text.to_string());
        }
        Ok(convert_radius_arc(text, &self.modal)?.unwrap_or_else(|| text.to_string()))
    }

    /// Drop the front command without sending it
    fn reject_front(&mut self, command: &str, origin: CommandOrigin, reason: String) {
        tracing::warn!(command, "command rejected: {}", reason);
        self.streamer.discard_front();
        self.events.publish(LinkEvent::CommandRejected {
            command: command.to_string(),
            reason: reason.clone(),
        });
        if origin.is_program() && self.config.streaming.error_policy == ErrorPolicy::Abort {
            self.fail_stream(reason);
        }
    }

    /// End the active stream without resetting the controller
    fn fail_stream(&mut self, message: String) {
        if self.streamer.cancel().is_some() {
            tracing::warn!("stream failed: {}", message);
            self.confirm_requested = false;
            self.confirm_polled = false;
            self.step_announced = false;
            self.events.publish(LinkEvent::StreamFailed { message });
        }
    }

    fn track_laser(&mut self, line: &str) {
        let Ok(block) = Block::parse(line) else {
            return;
        };
        if let Some(on) = modal::spindle_change(&block) {
            self.laser_on = on;
        }
    }

    fn poll(&mut self, now: Instant) {
        let ctx = PollContext {
            state: self.tracker.state(),
            streaming: self.streamer.is_streaming(),
            step_mode: self.streamer.is_step_mode(),
        };
        if self.poller.poll_due(ctx, now) {
            self.write_realtime(realtime::STATUS_QUERY);
        }
    }

    fn write_line(&mut self, line: &str) -> bool {
        let data = format!("{}\n", line);
        let written = self.write_bytes(data.as_bytes());
        if written {
            tracing::debug!(line, "sent");
            self.comm_log.record_sent(line);
        }
        written
    }

    fn write_realtime(&mut self, byte: u8) -> bool {
        let written = self.write_bytes(&[byte]);
        if written {
            self.comm_log.record_sent(&realtime::label(byte));
            if byte == realtime::STATUS_QUERY && self.confirm_requested {
                self.confirm_polled = true;
            }
        }
        written
    }

    /// `false` if nothing was written; repeated disconnect faults tear the
    /// session down
    fn write_bytes(&mut self, data: &[u8]) -> bool {
        let Some(Link::Ready { writer, .. }) = &mut self.link else {
            return false;
        };
        match writer.write_all(data) {
            Ok(()) => {
                self.write_faults.record_success();
                true
            }
            Err(err) => {
                let fault = classify_io_error(&err);
                if self.write_faults.record(fault) {
                    self.teardown(DisconnectReason::Lost(err.to_string()));
                } else {
                    tracing::warn!(?fault, "write failed: {}", err);
                }
                false
            }
        }
    }
}

impl Drop for LinkSession {
    fn drop(&mut self) {
        self.teardown(DisconnectReason::Requested);
    }
}
