use async_trait::async_trait;
use plotkit_communication::{
    Connector, ControllerHandle, LinkConfig, LinkEvent, MachineController, Outbound,
    RealtimeCommand, StreamConfig,
};
use plotkit_core::{ConnectionState, EventBus, MachineState, StreamingState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Opens instantly, forwards everything written to `wire`, and lets the test
/// inject inbound events into the current connection.
struct MockConnector {
    attempts: AtomicUsize,
    wire: mpsc::UnboundedSender<Outbound>,
    inbound: Mutex<Option<mpsc::UnboundedSender<LinkEvent>>>,
}

impl MockConnector {
    fn inject(&self, event: LinkEvent) {
        let sender = self.inbound.lock().unwrap().clone();
        if let Some(sender) = sender {
            let _ = sender.send(event);
        }
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn run(
        &self,
        _address: String,
        mut outbound: mpsc::UnboundedReceiver<Outbound>,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        *self.inbound.lock().unwrap() = Some(events.clone());
        let _ = events.send(LinkEvent::Opened);
        while let Some(message) = outbound.recv().await {
            let _ = self.wire.send(message);
        }
    }
}

struct Harness {
    handle: ControllerHandle,
    connector: Arc<MockConnector>,
    wire: mpsc::UnboundedReceiver<Outbound>,
}

impl Harness {
    async fn connected() -> Self {
        let (wire_tx, wire) = mpsc::unbounded_channel();
        let connector = Arc::new(MockConnector {
            attempts: AtomicUsize::new(0),
            wire: wire_tx,
            inbound: Mutex::new(None),
        });
        let (controller, handle) = MachineController::new(
            LinkConfig {
                address: "ws://plotter.test:81".to_string(),
                auto_reconnect: true,
                reconnect_interval: Duration::from_secs(5),
            },
            StreamConfig {
                max_pending: 4,
                tick_interval: Duration::from_secs(1),
            },
            connector.clone(),
            Arc::new(EventBus::new()),
        );
        controller.spawn();

        assert!(handle.connect(None));
        let mut harness = Self {
            handle,
            connector,
            wire,
        };
        harness.wait_connection(ConnectionState::Connected).await;
        harness
    }

    async fn wait_connection(&mut self, state: ConnectionState) {
        let mut watch = self.handle.connection_watch();
        watch.wait_for(|s| *s == state).await.unwrap();
    }

    async fn wait_stream(&mut self, state: StreamingState) {
        let mut watch = self.handle.progress_watch();
        watch.wait_for(|p| p.state == state).await.unwrap();
    }

    async fn next_line(&mut self) -> String {
        match self.wire.recv().await {
            Some(Outbound::Line(line)) => line,
            other => panic!("expected a line, got {:?}", other),
        }
    }

    async fn settle(&mut self) {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }
}

fn program(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("G1 X{} F1000", i)).collect()
}

#[tokio::test(start_paused = true)]
async fn test_window_of_four_then_one_per_ok() {
    let mut h = Harness::connected().await;
    assert!(h.handle.start_stream(program(10)));

    for i in 0..4 {
        assert_eq!(h.next_line().await, format!("G1 X{} F1000", i));
    }
    h.settle().await;
    assert!(h.wire.try_recv().is_err());

    for i in 4..10 {
        h.connector.inject(LinkEvent::Frame("ok\n".to_string()));
        assert_eq!(h.next_line().await, format!("G1 X{} F1000", i));
        h.settle().await;
        assert!(h.wire.try_recv().is_err());
    }

    h.connector
        .inject(LinkEvent::Frame("ok\nok\nok\nok\n".to_string()));
    h.wait_stream(StreamingState::Completed).await;

    let progress = h.handle.progress();
    assert_eq!(progress.current_line, 10);
    assert_eq!(progress.total_lines, 10);
    assert!(progress.errors.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_watched_start_skips_idle_snapshot_from_connect() {
    let mut h = Harness::connected().await;
    let mut progress = h
        .handle
        .start_stream_watched(program(5))
        .await
        .expect("stream started");
    assert_eq!(progress.borrow().state, StreamingState::Streaming);

    for _ in 0..4 {
        h.next_line().await;
    }
    h.connector.inject(LinkEvent::Frame("ok".to_string()));
    assert_eq!(h.next_line().await, "G1 X4 F1000");
    h.connector
        .inject(LinkEvent::Frame("ok\nok\nok\nok".to_string()));

    let mut last = progress.borrow().clone();
    while last.state.is_active() {
        progress.changed().await.unwrap();
        last = progress.borrow_and_update().clone();
    }
    assert_eq!(last.state, StreamingState::Completed);
    assert_eq!(last.current_line, 5);
}

#[tokio::test(start_paused = true)]
async fn test_watched_start_of_empty_program_is_terminal() {
    let h = Harness::connected().await;
    let progress = h
        .handle
        .start_stream_watched(Vec::new())
        .await
        .expect("stream started");
    assert_eq!(progress.borrow().state, StreamingState::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_manual_ack_does_not_widen_stream_window() {
    let mut h = Harness::connected().await;
    assert!(h.handle.send_line("G0 X1"));
    assert_eq!(h.next_line().await, "G0 X1");

    assert!(h.handle.start_stream(program(10)));
    for i in 0..4 {
        assert_eq!(h.next_line().await, format!("G1 X{} F1000", i));
    }

    // the first ok answers the manual line
    h.connector.inject(LinkEvent::Frame("ok".to_string()));
    h.settle().await;
    assert!(h.wire.try_recv().is_err());
    assert_eq!(h.handle.progress().current_line, 4);

    h.connector.inject(LinkEvent::Frame("ok".to_string()));
    assert_eq!(h.next_line().await, "G1 X4 F1000");
}

#[tokio::test(start_paused = true)]
async fn test_manual_rejection_not_recorded_against_stream() {
    let mut h = Harness::connected().await;
    assert!(h.handle.send_line("G0 X1"));
    h.next_line().await;

    assert!(h.handle.start_stream(program(5)));
    for _ in 0..4 {
        h.next_line().await;
    }
    h.connector.inject(LinkEvent::Frame("error:20".to_string()));
    h.settle().await;
    assert!(h.wire.try_recv().is_err());

    h.connector
        .inject(LinkEvent::Frame("ok\nok\nok\nok\nok".to_string()));
    h.wait_stream(StreamingState::Completed).await;
    assert!(h.handle.progress().errors.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_error_response_recorded_and_stream_continues() {
    let mut h = Harness::connected().await;
    assert!(h.handle.start_stream(program(5)));
    for _ in 0..4 {
        h.next_line().await;
    }

    h.connector.inject(LinkEvent::Frame("error:22".to_string()));
    assert_eq!(h.next_line().await, "G1 X4 F1000");

    h.connector
        .inject(LinkEvent::Frame("ok\nok\nok\nok".to_string()));
    h.wait_stream(StreamingState::Completed).await;

    let errors = h.handle.progress().errors;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].line_index, 0);
    assert_eq!(errors[0].response, "error:22");
}

#[tokio::test(start_paused = true)]
async fn test_pause_resume_and_cancel() {
    let mut h = Harness::connected().await;
    assert!(h.handle.start_stream(program(10)));
    for _ in 0..4 {
        h.next_line().await;
    }

    assert!(h.handle.pause_stream());
    assert_eq!(h.wire.recv().await, Some(Outbound::Realtime(b'!')));
    h.wait_stream(StreamingState::Paused).await;

    h.connector.inject(LinkEvent::Frame("ok".to_string()));
    h.settle().await;
    assert!(h.wire.try_recv().is_err());

    assert!(h.handle.resume_stream());
    assert_eq!(h.wire.recv().await, Some(Outbound::Realtime(b'~')));
    assert_eq!(h.next_line().await, "G1 X4 F1000");
    h.wait_stream(StreamingState::Streaming).await;

    assert!(h.handle.pause_stream());
    h.wait_stream(StreamingState::Paused).await;
    assert!(h.handle.cancel_stream());
    h.wait_stream(StreamingState::Idle).await;
    h.settle().await;

    let mut realtime = Vec::new();
    while let Ok(message) = h.wire.try_recv() {
        realtime.push(message);
    }
    assert_eq!(
        realtime,
        vec![Outbound::Realtime(b'!'), Outbound::Realtime(0x18)]
    );
    assert!(h.handle.progress().errors.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_manual_lines_refused_while_streaming() {
    let mut h = Harness::connected().await;
    assert!(h.handle.send_line("G0 X1 ; jog"));
    assert_eq!(h.next_line().await, "G0 X1");

    assert!(h.handle.start_stream(program(10)));
    h.wait_stream(StreamingState::Streaming).await;
    assert!(!h.handle.send_line("G0 X2"));
    assert!(!h.handle.start_stream(program(2)));

    // real-time hold maps onto the session
    assert!(h.handle.send_realtime(RealtimeCommand::FeedHold));
    h.wait_stream(StreamingState::Paused).await;
}

#[tokio::test(start_paused = true)]
async fn test_telemetry_updates_status() {
    let mut h = Harness::connected().await;
    let mut status = h.handle.status_watch();

    h.connector.inject(LinkEvent::Frame(
        "<Run|MPos:10.000,5.000,0.000|FS:1500,0|Ov:120,100,100>\n<Bogus".to_string(),
    ));
    status
        .wait_for(|s| s.state == MachineState::Run)
        .await
        .unwrap();

    let snapshot = h.handle.status();
    assert_eq!(snapshot.machine_position.x, 10.0);
    assert_eq!(snapshot.feed_rate, 1500.0);
    assert_eq!(snapshot.overrides.feed, 120);
}

#[tokio::test(start_paused = true)]
async fn test_link_loss_fails_stream() {
    let mut h = Harness::connected().await;
    assert!(h.handle.start_stream(program(10)));
    h.wait_stream(StreamingState::Streaming).await;

    h.connector
        .inject(LinkEvent::Failed("connection reset".to_string()));
    h.wait_stream(StreamingState::Error).await;
    h.wait_connection(ConnectionState::Error).await;
}

#[tokio::test(start_paused = true)]
async fn test_close_schedules_exactly_one_reconnect() {
    let mut h = Harness::connected().await;
    assert_eq!(h.connector.attempts(), 1);

    h.connector.inject(LinkEvent::Closed);
    h.wait_connection(ConnectionState::Disconnected).await;

    tokio::time::advance(Duration::from_millis(4900)).await;
    h.settle().await;
    assert_eq!(h.connector.attempts(), 1);

    tokio::time::advance(Duration::from_millis(200)).await;
    h.wait_connection(ConnectionState::Connected).await;
    assert_eq!(h.connector.attempts(), 2);

    tokio::time::advance(Duration::from_secs(30)).await;
    h.settle().await;
    assert_eq!(h.connector.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_manual_disconnect_preempts_reconnect() {
    let mut h = Harness::connected().await;
    h.connector.inject(LinkEvent::Closed);
    h.wait_connection(ConnectionState::Disconnected).await;

    assert!(h.handle.disconnect());
    h.settle().await;

    tokio::time::advance(Duration::from_secs(30)).await;
    h.settle().await;
    assert_eq!(h.connector.attempts(), 1);
    assert_eq!(h.handle.connection_state(), ConnectionState::Disconnected);
}
