//! Async driver for a link session
//!
//! [`LinkHandle::spawn`] moves a [`LinkSession`] into a tokio task that
//! ticks it at `polling.tick_ms` and executes [`LinkCommand`]s sent through
//! the handle. Events go out on the session's broadcast channel, the latest
//! snapshot on a watch channel.

use crate::communication::Transport;
use crate::gcode::ProgramLine;
use crate::session::LinkSession;
use grbllink_core::{
    ConnectionError, Error, EventDispatcher, LinkEvent, LinkSnapshot, Result,
};
use grbllink_settings::LinkConfig;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Capacity of the command channel
const COMMAND_QUEUE: usize = 100;

/// Operations accepted by the link task
#[derive(Debug, Clone, PartialEq)]
pub enum LinkCommand {
    Connect,
    Disconnect,
    RunProgram {
        lines: Vec<ProgramLine>,
        step_mode: bool,
    },
    AdvanceStep,
    Abort,
    SoftReset,
    Send(String),
    Home,
    Unlock,
    Jog {
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
        feed: f64,
    },
    SetWorkOrigin,
    GoToOrigin,
    QuerySettings,
    FeedHold,
    CycleResume,
    SetLogFilter(bool),
    /// Disconnect and end the task
    Shutdown,
}

impl LinkCommand {
    /// Name used in `OperationFailed` events
    pub fn name(&self) -> &'static str {
        match self {
            LinkCommand::Connect => "connect",
            LinkCommand::Disconnect => "disconnect",
            LinkCommand::RunProgram { .. } => "run program",
            LinkCommand::AdvanceStep => "advance step",
            LinkCommand::Abort => "abort",
            LinkCommand::SoftReset => "soft reset",
            LinkCommand::Send(_) => "send command",
            LinkCommand::Home => "home",
            LinkCommand::Unlock => "unlock",
            LinkCommand::Jog { .. } => "jog",
            LinkCommand::SetWorkOrigin => "set work origin",
            LinkCommand::GoToOrigin => "go to origin",
            LinkCommand::QuerySettings => "query settings",
            LinkCommand::FeedHold => "feed hold",
            LinkCommand::CycleResume => "cycle resume",
            LinkCommand::SetLogFilter(_) => "set log filter",
            LinkCommand::Shutdown => "shutdown",
        }
    }
}

pub struct LinkHandle {
    commands: mpsc::Sender<LinkCommand>,
    events: EventDispatcher,
    snapshot: watch::Receiver<LinkSnapshot>,
    task: JoinHandle<()>,
}

impl LinkHandle {
    /// Build a session and drive it; must be called inside a tokio runtime
    pub fn open(transport: Box<dyn Transport>, config: LinkConfig) -> Self {
        Self::spawn(LinkSession::new(transport, config))
    }

    /// Drive an existing session; must be called inside a tokio runtime
    pub fn spawn(session: LinkSession) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_QUEUE);
        let (snapshot_tx, snapshot) = watch::channel(session.snapshot());
        let events = session.events().clone();
        let task = tokio::spawn(run(session, rx, snapshot_tx));

        Self {
            commands,
            events,
            snapshot,
            task,
        }
    }

    /// Queue a command for the link task
    ///
    /// Failures of the command itself are published as
    /// [`LinkEvent::OperationFailed`].
    pub async fn send(&self, command: LinkCommand) -> Result<()> {
        self.commands.send(command).await.map_err(|_| {
            Error::from(ConnectionError::ConnectionLost {
                reason: "link task stopped".to_string(),
            })
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> LinkSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified whenever the snapshot changes
    pub fn watch(&self) -> watch::Receiver<LinkSnapshot> {
        self.snapshot.clone()
    }

    /// Disconnect and wait for the task to finish
    pub async fn shutdown(self) -> Result<()> {
        // The task may already be gone; joining below reports that.
        let _ = self.commands.send(LinkCommand::Shutdown).await;
        self.task
            .await
            .map_err(|e| Error::other(format!("link task failed: {}", e)))
    }
}

async fn run(
    mut session: LinkSession,
    mut commands: mpsc::Receiver<LinkCommand>,
    snapshot: watch::Sender<LinkSnapshot>,
) {
    let tick = Duration::from_millis(session.config().polling.tick_ms.max(1));
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::debug!(session = %session.id(), tick_ms = tick.as_millis() as u64, "link task started");

    loop {
        tokio::select! {
            _ = ticker.tick() => session.tick(Instant::now()),
            command = commands.recv() => match command {
                Some(LinkCommand::Shutdown) | None => break,
                Some(command) => execute(&mut session, command),
            },
        }
        publish_snapshot(&snapshot, session.snapshot());
    }

    session.disconnect();
    publish_snapshot(&snapshot, session.snapshot());
    tracing::debug!("link task stopped");
}

fn publish_snapshot(tx: &watch::Sender<LinkSnapshot>, latest: LinkSnapshot) {
    tx.send_if_modified(|current| {
        if *current == latest {
            return false;
        }
        *current = latest;
        true
    });
}

fn execute(session: &mut LinkSession, command: LinkCommand) {
    let operation = command.name();
    let result = match command {
        LinkCommand::Connect => session.connect(Instant::now()),
        LinkCommand::Disconnect => {
            session.disconnect();
            Ok(())
        }
        LinkCommand::RunProgram { lines, step_mode } => session.run_program(lines, step_mode),
        LinkCommand::AdvanceStep => session.advance_step(),
        LinkCommand::Abort => {
            session.abort();
            Ok(())
        }
        LinkCommand::SoftReset => {
            session.soft_reset();
            Ok(())
        }
        LinkCommand::Send(line) => session.send_command(&line),
        LinkCommand::Home => session.home(),
        LinkCommand::Unlock => session.unlock(),
        LinkCommand::Jog { x, y, z, feed } => session.jog(x, y, z, feed),
        LinkCommand::SetWorkOrigin => session.set_work_origin(),
        LinkCommand::GoToOrigin => session.go_to_origin(),
        LinkCommand::QuerySettings => session.query_settings(),
        LinkCommand::FeedHold => session.feed_hold(),
        LinkCommand::CycleResume => session.cycle_resume(),
        LinkCommand::SetLogFilter(enabled) => {
            session.set_log_filter(enabled);
            Ok(())
        }
        LinkCommand::Shutdown => Ok(()),
    };

    if let Err(err) = result {
        tracing::warn!(operation, "operation failed: {}", err);
        session.events().publish(LinkEvent::OperationFailed {
            operation: operation.to_string(),
            message: err.to_string(),
        });
    }
}
