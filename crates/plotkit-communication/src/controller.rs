//! Machine controller task
//!
//! One tokio task owns the [`DeviceLink`], the [`StreamingSession`] and the
//! machine status model. Callers talk to it through a cloneable
//! [`ControllerHandle`]: commands go in over an mpsc channel, snapshots come
//! back over `watch` channels and every change is also published on the
//! event bus.

use crate::communication::{CommandSink, Connector, DeviceLink, LinkConfig, LinkEvent};
use crate::firmware::grbl::{describe_alarm, prepare_line, split_lines, GrblResponse};
use crate::firmware::RealtimeCommand;
use crate::streaming::{StreamConfig, StreamingSession};
use plotkit_core::event_bus::{AppEvent, EventBus, MachineEvent};
use plotkit_core::{ConnectionState, MachineStatus, StreamProgress, StreamingState};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const SOURCE: &str = "controller";

/// Requests accepted by the controller task
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// Connect, optionally switching to a new address first
    Connect { address: Option<String> },
    Disconnect,
    SendLine(String),
    Realtime(RealtimeCommand),
    StartStream(Vec<String>),
    PauseStream,
    ResumeStream,
    CancelStream,
    Shutdown,
}

/// Cloneable front end of a running [`MachineController`].
///
/// Every method is fire-and-forget: the `bool` reports whether the request
/// was accepted given the last published state, not whether the machine
/// acted on it.
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::UnboundedSender<ControlCommand>,
    connection: watch::Receiver<ConnectionState>,
    progress: watch::Receiver<StreamProgress>,
    status: watch::Receiver<MachineStatus>,
}

impl ControllerHandle {
    fn request(&self, command: ControlCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    fn is_open(&self) -> bool {
        self.connection.borrow().is_open()
    }

    fn stream_state(&self) -> StreamingState {
        self.progress.borrow().state
    }

    pub fn connect(&self, address: Option<String>) -> bool {
        self.request(ControlCommand::Connect { address })
    }

    pub fn disconnect(&self) -> bool {
        self.request(ControlCommand::Disconnect)
    }

    /// Send one line outside a stream; refused while a stream is active
    pub fn send_line(&self, line: impl Into<String>) -> bool {
        if !self.is_open() || self.stream_state().is_active() {
            return false;
        }
        self.request(ControlCommand::SendLine(line.into()))
    }

    pub fn send_realtime(&self, command: RealtimeCommand) -> bool {
        self.is_open() && self.request(ControlCommand::Realtime(command))
    }

    pub fn start_stream(&self, lines: Vec<String>) -> bool {
        if !self.is_open() || self.stream_state().is_active() {
            return false;
        }
        self.request(ControlCommand::StartStream(lines))
    }

    /// Start a stream and wait until the controller has taken it up.
    ///
    /// The returned receiver holds the first snapshot past `Idle` (streaming,
    /// or already terminal for an empty program) and is marked seen, so
    /// `changed()` fires on the next transition. `None` when the request was
    /// refused or the controller stopped.
    pub async fn start_stream_watched(
        &self,
        lines: Vec<String>,
    ) -> Option<watch::Receiver<StreamProgress>> {
        let mut progress = self.progress.clone();
        progress.borrow_and_update();
        if !self.start_stream(lines) {
            return None;
        }
        loop {
            progress.changed().await.ok()?;
            if progress.borrow_and_update().state != StreamingState::Idle {
                return Some(progress);
            }
        }
    }

    pub fn pause_stream(&self) -> bool {
        self.stream_state() == StreamingState::Streaming
            && self.request(ControlCommand::PauseStream)
    }

    pub fn resume_stream(&self) -> bool {
        self.stream_state() == StreamingState::Paused && self.request(ControlCommand::ResumeStream)
    }

    pub fn cancel_stream(&self) -> bool {
        self.stream_state().is_active() && self.request(ControlCommand::CancelStream)
    }

    pub fn shutdown(&self) -> bool {
        self.request(ControlCommand::Shutdown)
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    pub fn progress(&self) -> StreamProgress {
        self.progress.borrow().clone()
    }

    pub fn status(&self) -> MachineStatus {
        self.status.borrow().clone()
    }

    pub fn connection_watch(&self) -> watch::Receiver<ConnectionState> {
        self.connection.clone()
    }

    pub fn progress_watch(&self) -> watch::Receiver<StreamProgress> {
        self.progress.clone()
    }

    pub fn status_watch(&self) -> watch::Receiver<MachineStatus> {
        self.status.clone()
    }
}

pub struct MachineController {
    link: DeviceLink,
    session: StreamingSession,
    status: MachineStatus,
    /// Manual lines sent but not yet acknowledged; drained before the session
    manual_pending: usize,
    bus: Arc<EventBus>,
    commands: mpsc::UnboundedReceiver<ControlCommand>,
    connection_tx: watch::Sender<ConnectionState>,
    progress_tx: watch::Sender<StreamProgress>,
    status_tx: watch::Sender<MachineStatus>,
}

impl MachineController {
    pub fn new(
        link_config: LinkConfig,
        stream_config: StreamConfig,
        connector: Arc<dyn Connector>,
        bus: Arc<EventBus>,
    ) -> (Self, ControllerHandle) {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (connection_tx, connection) = watch::channel(ConnectionState::Disconnected);
        let (progress_tx, progress) = watch::channel(StreamProgress::default());
        let (status_tx, status) = watch::channel(MachineStatus::default());

        let controller = Self {
            link: DeviceLink::new(link_config, connector, Arc::clone(&bus)),
            session: StreamingSession::new(stream_config, Arc::clone(&bus)),
            status: MachineStatus::default(),
            manual_pending: 0,
            bus,
            commands,
            connection_tx,
            progress_tx,
            status_tx,
        };
        let handle = ControllerHandle {
            commands: command_tx,
            connection,
            progress,
            status,
        };
        (controller, handle)
    }

    /// Run the controller on its own task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process commands, link events and timers until shutdown or until
    /// every handle is dropped.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.session.config().tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let reconnect_at = self.link.reconnect_deadline();
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(ControlCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                event = self.link.next_event() => self.handle_link_event(event),
                _ = reconnect_timer(reconnect_at) => {
                    self.link.fire_reconnect();
                }
                now = ticker.tick() => {
                    self.session.tick(now);
                }
            }
            self.publish_snapshots();
        }

        tracing::info!("Controller shutting down");
        if self.session.is_active() {
            self.session.cancel(&mut self.link).ok();
        }
        self.link.disconnect();
        self.publish_snapshots();
    }

    fn handle_command(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Connect { address } => {
                if let Some(address) = address {
                    self.link.set_address(address);
                }
                if !self.link.connect() {
                    tracing::debug!("Connect ignored, link is {}", self.link.state());
                }
            }
            ControlCommand::Disconnect => {
                if self.session.is_active() {
                    self.session.fail("link disconnected");
                }
                self.manual_pending = 0;
                self.link.disconnect();
            }
            ControlCommand::SendLine(line) => {
                if self.session.is_active() {
                    self.refuse("Manual commands are disabled while streaming");
                } else if let Some(command) = prepare_line(&line) {
                    if self.link.send_line(&command) {
                        self.manual_pending += 1;
                    } else {
                        self.refuse("Link not connected");
                    }
                }
            }
            ControlCommand::Realtime(command) => self.handle_realtime(command),
            ControlCommand::StartStream(lines) => {
                if let Err(e) = self.session.start(lines, &mut self.link) {
                    self.refuse(&e.to_string());
                }
            }
            ControlCommand::PauseStream => {
                if let Err(e) = self.session.pause(&mut self.link) {
                    self.refuse(&e.to_string());
                }
            }
            ControlCommand::ResumeStream => {
                if let Err(e) = self.session.resume(&mut self.link) {
                    self.refuse(&e.to_string());
                }
            }
            ControlCommand::CancelStream => match self.session.cancel(&mut self.link) {
                Ok(()) => self.manual_pending = 0,
                Err(e) => self.refuse(&e.to_string()),
            },
            ControlCommand::Shutdown => {}
        }
    }

    /// Hold, resume and reset go through the session while it is active
    /// so its state follows the machine.
    fn handle_realtime(&mut self, command: RealtimeCommand) {
        if command == RealtimeCommand::SoftReset {
            self.manual_pending = 0;
        }
        let result = match (self.session.state(), command) {
            (StreamingState::Streaming, RealtimeCommand::FeedHold) => {
                self.session.pause(&mut self.link)
            }
            (StreamingState::Paused, RealtimeCommand::CycleStart) => {
                self.session.resume(&mut self.link)
            }
            (state, RealtimeCommand::SoftReset) if state.is_active() => {
                self.session.cancel(&mut self.link)
            }
            _ => {
                if !self.link.send_realtime(command.byte()) {
                    self.refuse("Link not connected");
                }
                Ok(())
            }
        };
        if let Err(e) = result {
            self.refuse(&e.to_string());
        }
    }

    fn handle_link_event(&mut self, event: LinkEvent) {
        self.link.handle_event(&event);
        match event {
            LinkEvent::Frame(message) => {
                for line in split_lines(&message) {
                    self.handle_line(line);
                }
            }
            LinkEvent::Failed(reason) => {
                self.bus.publish(AppEvent::error("link", reason.clone()));
                self.manual_pending = 0;
                self.session.fail(&reason);
            }
            LinkEvent::Closed => {
                self.manual_pending = 0;
                self.session.fail("link closed");
            }
            LinkEvent::Opened => {}
        }
    }

    fn handle_line(&mut self, line: &str) {
        let Some(response) = GrblResponse::parse(line) else {
            return;
        };
        if response.is_acknowledgment() && self.manual_pending > 0 {
            self.manual_pending -= 1;
            if !matches!(response, GrblResponse::Ok) {
                tracing::warn!("Command rejected: {}", line);
                self.bus.publish(AppEvent::warn(SOURCE, line));
            }
            return;
        }
        match response {
            GrblResponse::Ok => self.session.on_ack(None, &mut self.link),
            GrblResponse::Error(_) => {
                if !self.session.is_active() {
                    tracing::warn!("Command rejected: {}", line);
                    self.bus.publish(AppEvent::warn(SOURCE, line));
                }
                self.session.on_ack(Some(line), &mut self.link);
            }
            GrblResponse::Status(report) => {
                report.apply(&mut self.status);
                self.bus
                    .publish(AppEvent::Machine(MachineEvent::StatusUpdated(
                        self.status.clone(),
                    )));
            }
            GrblResponse::Alarm(code) => {
                let description = describe_alarm(code).to_string();
                tracing::error!("{}: {}", line, description);
                self.bus.publish(AppEvent::Machine(MachineEvent::Alarm {
                    line: line.to_string(),
                    description,
                }));
            }
            _ => {
                tracing::debug!("< {}", line);
                self.bus
                    .publish(AppEvent::Machine(MachineEvent::Message(line.to_string())));
            }
        }
    }

    fn refuse(&self, reason: &str) {
        tracing::warn!("{}", reason);
        self.bus.publish(AppEvent::warn(SOURCE, reason));
    }

    fn publish_snapshots(&self) {
        let state = self.link.state();
        self.connection_tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
        let progress = self.session.progress();
        self.progress_tx.send_if_modified(|current| {
            let changed = *current != progress;
            *current = progress;
            changed
        });
        let status = &self.status;
        self.status_tx.send_if_modified(|current| {
            let changed = current != status;
            if changed {
                *current = status.clone();
            }
            changed
        });
    }
}

async fn reconnect_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
