//! Device link
//!
//! Owns the connection state machine for one controller address. The
//! transport runs as a pump task that reports typed [`LinkEvent`]s over a
//! channel; the single task that owns the [`DeviceLink`] consumes them and
//! applies the transitions, so no state is mutated from callback context.

use async_trait::async_trait;
use plotkit_core::event_bus::{AppEvent, ConnectionEvent, EventBus};
use plotkit_core::ConnectionState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// What the transport reports back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Opened,
    /// One inbound message; may hold several newline separated lines
    Frame(String),
    Closed,
    Failed(String),
}

/// What the link asks the transport to write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A command line, without terminator
    Line(String),
    /// A real-time byte, sent unterminated
    Realtime(u8),
}

/// A transport that can open a duplex connection to a controller.
///
/// `run` drives one connection from open to close: it must send
/// [`LinkEvent::Opened`] once connected, forward inbound messages as
/// [`LinkEvent::Frame`], and finish with [`LinkEvent::Closed`]. Failures are
/// reported as [`LinkEvent::Failed`] before the close.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn run(
        &self,
        address: String,
        outbound: mpsc::UnboundedReceiver<Outbound>,
        events: mpsc::UnboundedSender<LinkEvent>,
    );
}

/// Fire-and-forget writes; `false` when the link is not open
pub trait CommandSink {
    fn is_ready(&self) -> bool;
    fn send_line(&mut self, line: &str) -> bool;
    fn send_realtime(&mut self, byte: u8) -> bool;
}

/// Device link settings
#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    pub address: String,
    pub auto_reconnect: bool,
    pub reconnect_interval: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            address: "ws://192.168.0.1:81".to_string(),
            auto_reconnect: true,
            reconnect_interval: Duration::from_secs(5),
        }
    }
}

pub struct DeviceLink {
    config: LinkConfig,
    connector: Arc<dyn Connector>,
    bus: Arc<EventBus>,
    state: ConnectionState,
    manual_disconnect: bool,
    last_error: Option<String>,
    reconnect_at: Option<Instant>,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    events: Option<mpsc::UnboundedReceiver<LinkEvent>>,
    pump: Option<JoinHandle<()>>,
}

impl DeviceLink {
    pub fn new(config: LinkConfig, connector: Arc<dyn Connector>, bus: Arc<EventBus>) -> Self {
        Self {
            config,
            connector,
            bus,
            state: ConnectionState::Disconnected,
            manual_disconnect: false,
            last_error: None,
            reconnect_at: None,
            outbound: None,
            events: None,
            pump: None,
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// When the pending reconnect attempt fires, if one is scheduled
    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Point the link at another controller; takes effect on the next connect
    pub fn set_address(&mut self, address: impl Into<String>) {
        self.config.address = address.into();
    }

    /// Start connecting. Returns `false` when already connecting or connected.
    pub fn connect(&mut self) -> bool {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            return false;
        }
        self.manual_disconnect = false;
        self.reconnect_at = None;
        self.open();
        true
    }

    /// Close the link and suppress any pending or future automatic reconnect
    pub fn disconnect(&mut self) {
        self.manual_disconnect = true;
        self.reconnect_at = None;
        self.teardown();
        if self.state != ConnectionState::Disconnected {
            self.set_state(ConnectionState::Disconnected, None);
        }
    }

    /// Run the scheduled reconnect. Returns `false` if none was due.
    pub fn fire_reconnect(&mut self) -> bool {
        if self.manual_disconnect || self.reconnect_at.take().is_none() {
            return false;
        }
        if self.state != ConnectionState::Disconnected {
            return false;
        }
        tracing::info!(address = %self.config.address, "Reconnecting");
        self.open();
        true
    }

    /// Wait for the next transport event.
    ///
    /// Pending forever while no connection is open, so it can sit in a
    /// `select!` next to other sources. A pump that exits without reporting
    /// a close is treated as closed.
    pub async fn next_event(&mut self) -> LinkEvent {
        match self.events.as_mut() {
            Some(events) => match events.recv().await {
                Some(event) => event,
                None => {
                    self.events = None;
                    LinkEvent::Closed
                }
            },
            None => std::future::pending().await,
        }
    }

    /// Apply a transport event to the state machine
    pub fn handle_event(&mut self, event: &LinkEvent) {
        match event {
            LinkEvent::Opened => {
                self.last_error = None;
                self.set_state(ConnectionState::Connected, None);
            }
            LinkEvent::Frame(_) => {}
            LinkEvent::Failed(reason) => {
                tracing::warn!(address = %self.config.address, "Link error: {}", reason);
                self.last_error = Some(reason.clone());
                if matches!(
                    self.state,
                    ConnectionState::Connecting | ConnectionState::Connected
                ) {
                    self.set_state(ConnectionState::Error, Some(reason.clone()));
                }
            }
            LinkEvent::Closed => {
                self.teardown();
                if self.manual_disconnect {
                    return;
                }
                let message = self.last_error.clone();
                if self.state != ConnectionState::Disconnected {
                    self.set_state(ConnectionState::Disconnected, message);
                }
                if self.config.auto_reconnect && self.reconnect_at.is_none() {
                    self.schedule_reconnect();
                }
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        let delay = self.config.reconnect_interval;
        self.reconnect_at = Some(Instant::now() + delay);
        tracing::info!(
            address = %self.config.address,
            "Reconnect scheduled in {}ms",
            delay.as_millis()
        );
        self.bus
            .publish(AppEvent::Connection(ConnectionEvent::ReconnectScheduled {
                address: self.config.address.clone(),
                delay_ms: delay.as_millis() as u64,
            }));
    }

    fn open(&mut self) {
        self.teardown();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();
        self.outbound = Some(out_tx);
        self.events = Some(ev_rx);
        self.set_state(ConnectionState::Connecting, None);

        let connector = Arc::clone(&self.connector);
        let address = self.config.address.clone();
        self.pump = Some(tokio::spawn(async move {
            connector.run(address, out_rx, ev_tx).await;
        }));
    }

    fn teardown(&mut self) {
        self.outbound = None;
        self.events = None;
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }

    fn set_state(&mut self, state: ConnectionState, message: Option<String>) {
        if self.state == state {
            return;
        }
        if !self.state.can_transition_to(state) {
            tracing::debug!("Ignoring link transition {} -> {}", self.state, state);
            return;
        }
        tracing::info!(address = %self.config.address, "Link {} -> {}", self.state, state);
        self.state = state;
        self.bus
            .publish(AppEvent::Connection(ConnectionEvent::StateChanged {
                address: self.config.address.clone(),
                state,
                message,
            }));
    }

    fn send(&mut self, outbound: Outbound) -> bool {
        if !self.state.is_open() {
            return false;
        }
        match &self.outbound {
            Some(tx) => tx.send(outbound).is_ok(),
            None => false,
        }
    }
}

impl CommandSink for DeviceLink {
    fn is_ready(&self) -> bool {
        self.state.is_open() && self.outbound.is_some()
    }

    fn send_line(&mut self, line: &str) -> bool {
        self.send(Outbound::Line(line.to_string()))
    }

    fn send_realtime(&mut self, byte: u8) -> bool {
        self.send(Outbound::Realtime(byte))
    }
}

impl Drop for DeviceLink {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reports open immediately and then idles until dropped
    struct IdleConnector;

    #[async_trait]
    impl Connector for IdleConnector {
        async fn run(
            &self,
            _address: String,
            mut outbound: mpsc::UnboundedReceiver<Outbound>,
            events: mpsc::UnboundedSender<LinkEvent>,
        ) {
            let _ = events.send(LinkEvent::Opened);
            while outbound.recv().await.is_some() {}
            let _ = events.send(LinkEvent::Closed);
        }
    }

    fn link(auto_reconnect: bool) -> DeviceLink {
        DeviceLink::new(
            LinkConfig {
                address: "ws://plotter.local:81".to_string(),
                auto_reconnect,
                reconnect_interval: Duration::from_secs(5),
            },
            Arc::new(IdleConnector),
            Arc::new(EventBus::new()),
        )
    }

    #[tokio::test]
    async fn test_connect_transitions() {
        let mut link = link(true);
        assert!(!link.is_ready());
        assert!(link.connect());
        assert_eq!(link.state(), ConnectionState::Connecting);
        assert!(!link.connect());
        assert!(!link.send_line("G0 X1"));

        let event = link.next_event().await;
        assert_eq!(event, LinkEvent::Opened);
        link.handle_event(&event);
        assert_eq!(link.state(), ConnectionState::Connected);
        assert!(link.send_line("G0 X1"));
        assert!(link.send_realtime(b'?'));
    }

    #[tokio::test]
    async fn test_failure_then_close() {
        let mut link = link(true);
        link.connect();
        link.handle_event(&LinkEvent::Opened);
        link.handle_event(&LinkEvent::Failed("reset by peer".to_string()));
        assert_eq!(link.state(), ConnectionState::Error);
        assert_eq!(link.last_error(), Some("reset by peer"));
        assert!(!link.send_line("G0 X1"));

        link.handle_event(&LinkEvent::Closed);
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert!(link.reconnect_deadline().is_some());
    }

    #[tokio::test]
    async fn test_close_without_auto_reconnect() {
        let mut link = link(false);
        link.connect();
        link.handle_event(&LinkEvent::Opened);
        link.handle_event(&LinkEvent::Closed);
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert_eq!(link.reconnect_deadline(), None);
        assert!(!link.fire_reconnect());
    }

    #[tokio::test]
    async fn test_manual_disconnect_cancels_reconnect() {
        let mut link = link(true);
        link.connect();
        link.handle_event(&LinkEvent::Opened);
        link.handle_event(&LinkEvent::Closed);
        assert!(link.reconnect_deadline().is_some());

        link.disconnect();
        assert_eq!(link.reconnect_deadline(), None);
        assert!(!link.fire_reconnect());
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_close_after_manual_disconnect_is_ignored() {
        let mut link = link(true);
        link.connect();
        link.handle_event(&LinkEvent::Opened);
        link.disconnect();
        link.handle_event(&LinkEvent::Closed);
        assert_eq!(link.reconnect_deadline(), None);
    }
}
