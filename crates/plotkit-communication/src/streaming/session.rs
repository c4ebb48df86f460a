//! Streaming session
//!
//! Sends a program line by line with windowed flow control: at most
//! `max_pending` lines are unacknowledged at any time, and every `ok` or
//! `error:` frees one slot and triggers the next dispatch. Rejections are
//! recorded and the stream carries on.

use crate::communication::CommandSink;
use crate::firmware::grbl::prepare_line;
use crate::firmware::RealtimeCommand;
use plotkit_core::event_bus::{AppEvent, EventBus, StreamingEvent};
use plotkit_core::{CommandRejection, StreamProgress, StreamingError, StreamingState};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Streaming settings
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Unacknowledged lines allowed in flight
    pub max_pending: usize,
    /// Period of the elapsed-time progress tick
    pub tick_interval: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_pending: 4,
            tick_interval: Duration::from_secs(1),
        }
    }
}

pub struct StreamingSession {
    config: StreamConfig,
    bus: Arc<EventBus>,
    state: StreamingState,
    lines: Vec<String>,
    /// Next line to consider for dispatch
    cursor: usize,
    /// Program indices of sent lines awaiting acknowledgment, in send order
    in_flight: VecDeque<usize>,
    errors: Vec<CommandRejection>,
    current_command: Option<String>,
    started_at: Option<Instant>,
    elapsed: Duration,
}

impl StreamingSession {
    pub fn new(config: StreamConfig, bus: Arc<EventBus>) -> Self {
        Self {
            config,
            bus,
            state: StreamingState::Idle,
            lines: Vec::new(),
            cursor: 0,
            in_flight: VecDeque::new(),
            errors: Vec::new(),
            current_command: None,
            started_at: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn state(&self) -> StreamingState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Lines sent and not yet acknowledged
    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    pub fn errors(&self) -> &[CommandRejection] {
        &self.errors
    }

    pub fn progress(&self) -> StreamProgress {
        StreamProgress {
            state: self.state,
            current_line: self.cursor,
            total_lines: self.lines.len(),
            percentage: StreamProgress::percentage_of(self.cursor, self.lines.len()),
            current_command: self.current_command.clone(),
            elapsed: self.elapsed,
            errors: self.errors.clone(),
        }
    }

    /// Begin streaming `lines` and fill the window
    pub fn start(
        &mut self,
        lines: Vec<String>,
        sink: &mut dyn CommandSink,
    ) -> Result<(), StreamingError> {
        if self.state.is_active() {
            return Err(StreamingError::AlreadyActive {
                state: self.state,
            });
        }
        if !sink.is_ready() {
            return Err(StreamingError::NotConnected);
        }

        tracing::info!("Streaming {} lines", lines.len());
        self.lines = lines;
        self.cursor = 0;
        self.in_flight.clear();
        self.errors.clear();
        self.current_command = None;
        self.started_at = Some(Instant::now());
        self.elapsed = Duration::ZERO;
        self.transition(StreamingState::Streaming);
        self.dispatch(sink);
        Ok(())
    }

    /// Account for one `ok` (`error` is `None`) or `error:` (`Some(response)`).
    ///
    /// Acknowledgments arriving while nothing is in flight belong to commands
    /// sent outside the session and are ignored.
    pub fn on_ack(&mut self, error: Option<&str>, sink: &mut dyn CommandSink) {
        if !self.state.is_active() {
            return;
        }
        let Some(index) = self.in_flight.pop_front() else {
            tracing::debug!("Acknowledgment with nothing in flight");
            return;
        };

        if let Some(response) = error {
            let command = prepare_line(&self.lines[index]).unwrap_or_default();
            tracing::warn!(line = index + 1, "{} rejected: {}", command, response);
            self.errors.push(CommandRejection {
                line_index: index,
                command,
                response: response.to_string(),
            });
        }

        self.dispatch(sink);
        self.publish_progress();
    }

    /// Hold the machine and stop dispatching; in-flight lines stay pending
    pub fn pause(&mut self, sink: &mut dyn CommandSink) -> Result<(), StreamingError> {
        if self.state != StreamingState::Streaming {
            return Err(self.invalid("pause"));
        }
        sink.send_realtime(RealtimeCommand::FeedHold.byte());
        self.transition(StreamingState::Paused);
        Ok(())
    }

    /// Release the hold and continue from the cursor
    pub fn resume(&mut self, sink: &mut dyn CommandSink) -> Result<(), StreamingError> {
        if self.state != StreamingState::Paused {
            return Err(self.invalid("resume"));
        }
        sink.send_realtime(RealtimeCommand::CycleStart.byte());
        self.transition(StreamingState::Streaming);
        self.dispatch(sink);
        Ok(())
    }

    /// Soft-reset the machine and drop the program.
    ///
    /// Rejections recorded so far are kept for the caller to inspect.
    pub fn cancel(&mut self, sink: &mut dyn CommandSink) -> Result<(), StreamingError> {
        if !self.state.is_active() {
            return Err(self.invalid("cancel"));
        }
        sink.send_realtime(RealtimeCommand::SoftReset.byte());
        self.lines.clear();
        self.cursor = 0;
        self.in_flight.clear();
        self.current_command = None;
        self.started_at = None;
        self.elapsed = Duration::ZERO;
        self.transition(StreamingState::Idle);
        Ok(())
    }

    /// Abort after an unrecoverable link failure
    pub fn fail(&mut self, reason: &str) {
        if !self.state.is_active() {
            return;
        }
        tracing::error!("Stream aborted: {}", reason);
        self.in_flight.clear();
        self.refresh_elapsed(Instant::now());
        self.transition(StreamingState::Error);
    }

    /// Refresh elapsed time; returns the progress snapshot while active
    pub fn tick(&mut self, now: Instant) -> Option<StreamProgress> {
        if !self.state.is_active() {
            return None;
        }
        self.refresh_elapsed(now);
        let progress = self.progress();
        self.bus
            .publish(AppEvent::Streaming(StreamingEvent::Progress(progress.clone())));
        Some(progress)
    }

    fn dispatch(&mut self, sink: &mut dyn CommandSink) {
        while self.state == StreamingState::Streaming
            && self.in_flight.len() < self.config.max_pending
            && self.cursor < self.lines.len()
        {
            match prepare_line(&self.lines[self.cursor]) {
                None => self.cursor += 1,
                Some(command) => {
                    if !sink.send_line(&command) {
                        tracing::warn!(line = self.cursor + 1, "Link not ready, dispatch stalled");
                        break;
                    }
                    tracing::debug!(line = self.cursor + 1, "> {}", command);
                    self.in_flight.push_back(self.cursor);
                    self.current_command = Some(command);
                    self.cursor += 1;
                }
            }
        }

        if self.state == StreamingState::Streaming
            && self.cursor >= self.lines.len()
            && self.in_flight.is_empty()
        {
            self.refresh_elapsed(Instant::now());
            tracing::info!(
                "Stream completed in {:.1}s with {} rejected lines",
                self.elapsed.as_secs_f64(),
                self.errors.len()
            );
            self.transition(StreamingState::Completed);
        }
    }

    fn refresh_elapsed(&mut self, now: Instant) {
        if let Some(started) = self.started_at {
            self.elapsed = now.saturating_duration_since(started);
        }
    }

    fn publish_progress(&self) {
        self.bus
            .publish(AppEvent::Streaming(StreamingEvent::Progress(self.progress())));
    }

    fn transition(&mut self, to: StreamingState) {
        let from = self.state;
        self.state = to;
        tracing::info!("Stream {} -> {}", from, to);
        self.bus
            .publish(AppEvent::Streaming(StreamingEvent::StateChanged {
                from,
                to,
                progress: self.progress(),
            }));
    }

    fn invalid(&self, operation: &'static str) -> StreamingError {
        StreamingError::InvalidState {
            operation,
            state: self.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        ready: bool,
        lines: Vec<String>,
        realtime: Vec<u8>,
    }

    impl RecordingSink {
        fn open() -> Self {
            Self {
                ready: true,
                ..Default::default()
            }
        }
    }

    impl CommandSink for RecordingSink {
        fn is_ready(&self) -> bool {
            self.ready
        }

        fn send_line(&mut self, line: &str) -> bool {
            if self.ready {
                self.lines.push(line.to_string());
            }
            self.ready
        }

        fn send_realtime(&mut self, byte: u8) -> bool {
            if self.ready {
                self.realtime.push(byte);
            }
            self.ready
        }
    }

    fn session() -> StreamingSession {
        StreamingSession::new(StreamConfig::default(), Arc::new(EventBus::new()))
    }

    fn program(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("G1 X{}", i)).collect()
    }

    #[test]
    fn test_window_limits_in_flight_lines() {
        let mut sink = RecordingSink::open();
        let mut session = session();
        session.start(program(10), &mut sink).unwrap();

        assert_eq!(sink.lines.len(), 4);
        assert_eq!(session.pending(), 4);

        for expected_sent in 5..=10 {
            session.on_ack(None, &mut sink);
            assert_eq!(sink.lines.len(), expected_sent);
            assert_eq!(session.pending(), 4);
        }
        for remaining in (0..4).rev() {
            session.on_ack(None, &mut sink);
            assert_eq!(session.pending(), remaining);
        }

        assert_eq!(sink.lines.len(), 10);
        assert_eq!(session.state(), StreamingState::Completed);
        assert_eq!(session.progress().percentage, 100.0);
    }

    #[test]
    fn test_comments_counted_but_not_sent() {
        let mut sink = RecordingSink::open();
        let mut session = session();
        let lines = vec![
            "%".to_string(),
            "(header)".to_string(),
            "G21 ; metric".to_string(),
            String::new(),
            "G90".to_string(),
            "%".to_string(),
        ];
        session.start(lines, &mut sink).unwrap();

        assert_eq!(sink.lines, vec!["G21", "G90"]);
        assert_eq!(session.progress().current_line, 6);
        assert_eq!(session.state(), StreamingState::Streaming);

        session.on_ack(None, &mut sink);
        session.on_ack(None, &mut sink);
        assert_eq!(session.state(), StreamingState::Completed);
    }

    #[test]
    fn test_errors_recorded_and_stream_continues() {
        let mut sink = RecordingSink::open();
        let mut session = session();
        session.start(program(6), &mut sink).unwrap();

        session.on_ack(Some("error:22"), &mut sink);
        assert_eq!(sink.lines.len(), 5);
        assert_eq!(session.errors().len(), 1);
        assert_eq!(session.errors()[0].line_index, 0);
        assert_eq!(session.errors()[0].command, "G1 X0");
        assert_eq!(session.errors()[0].response, "error:22");

        for _ in 0..5 {
            session.on_ack(None, &mut sink);
        }
        assert_eq!(session.state(), StreamingState::Completed);
        assert_eq!(session.progress().errors.len(), 1);
    }

    #[test]
    fn test_pause_holds_dispatch() {
        let mut sink = RecordingSink::open();
        let mut session = session();
        session.start(program(10), &mut sink).unwrap();

        session.pause(&mut sink).unwrap();
        assert_eq!(sink.realtime, vec![b'!']);
        assert_eq!(session.state(), StreamingState::Paused);

        // acknowledgments still drain the window but nothing new goes out
        session.on_ack(None, &mut sink);
        session.on_ack(None, &mut sink);
        assert_eq!(sink.lines.len(), 4);
        assert_eq!(session.pending(), 2);

        session.resume(&mut sink).unwrap();
        assert_eq!(sink.realtime, vec![b'!', b'~']);
        assert_eq!(sink.lines.len(), 6);
        assert_eq!(session.pending(), 4);
        assert_eq!(sink.lines[4], "G1 X4");
    }

    #[test]
    fn test_cancel_from_paused() {
        let mut sink = RecordingSink::open();
        let mut session = session();
        session.start(program(10), &mut sink).unwrap();
        session.pause(&mut sink).unwrap();
        session.cancel(&mut sink).unwrap();

        assert_eq!(session.state(), StreamingState::Idle);
        assert_eq!(sink.realtime, vec![b'!', 0x18]);
        assert!(session.errors().is_empty());
        assert_eq!(session.pending(), 0);
        assert_eq!(session.progress().total_lines, 0);
    }

    #[test]
    fn test_cancel_keeps_recorded_errors() {
        let mut sink = RecordingSink::open();
        let mut session = session();
        session.start(program(10), &mut sink).unwrap();
        session.on_ack(Some("error:20"), &mut sink);
        session.pause(&mut sink).unwrap();
        session.cancel(&mut sink).unwrap();

        assert_eq!(session.state(), StreamingState::Idle);
        assert_eq!(session.errors().len(), 1);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut sink = RecordingSink::open();
        let mut session = session();
        assert!(matches!(
            session.pause(&mut sink),
            Err(StreamingError::InvalidState { operation: "pause", .. })
        ));
        assert!(session.resume(&mut sink).is_err());
        assert!(session.cancel(&mut sink).is_err());

        session.start(program(3), &mut sink).unwrap();
        assert!(matches!(
            session.start(program(3), &mut sink),
            Err(StreamingError::AlreadyActive { .. })
        ));
        assert!(session.resume(&mut sink).is_err());
    }

    #[test]
    fn test_start_requires_open_link() {
        let mut sink = RecordingSink::default();
        let mut session = session();
        assert!(matches!(
            session.start(program(3), &mut sink),
            Err(StreamingError::NotConnected)
        ));
        assert_eq!(session.state(), StreamingState::Idle);
    }

    #[test]
    fn test_empty_program_completes_immediately() {
        let mut sink = RecordingSink::open();
        let mut session = session();
        session.start(Vec::new(), &mut sink).unwrap();
        assert_eq!(session.state(), StreamingState::Completed);
        assert!(sink.lines.is_empty());
    }

    #[test]
    fn test_fail_moves_to_error() {
        let mut sink = RecordingSink::open();
        let mut session = session();
        session.start(program(10), &mut sink).unwrap();
        session.fail("link lost");
        assert_eq!(session.state(), StreamingState::Error);
        assert_eq!(session.pending(), 0);

        // late acknowledgments are ignored
        session.on_ack(None, &mut sink);
        assert_eq!(sink.lines.len(), 4);

        // a failed session can be restarted
        session.start(program(2), &mut sink).unwrap();
        assert_eq!(session.state(), StreamingState::Streaming);
    }

    #[test]
    fn test_stray_ack_ignored() {
        let mut sink = RecordingSink::open();
        let mut session = session();
        session.on_ack(None, &mut sink);
        assert_eq!(session.state(), StreamingState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_reports_elapsed() {
        let mut sink = RecordingSink::open();
        let mut session = session();
        session.start(program(10), &mut sink).unwrap();

        tokio::time::advance(Duration::from_secs(3)).await;
        let progress = session.tick(Instant::now()).unwrap();
        assert_eq!(progress.elapsed, Duration::from_secs(3));
        assert_eq!(progress.current_line, 4);

        session.cancel(&mut sink).unwrap();
        assert!(session.tick(Instant::now()).is_none());
    }

    #[test]
    fn test_state_changes_published() {
        let bus = Arc::new(EventBus::new());
        let mut receiver = bus.receiver();
        let mut sink = RecordingSink::open();
        let mut session = StreamingSession::new(StreamConfig::default(), bus);
        session.start(vec!["G0 X1".to_string()], &mut sink).unwrap();

        match receiver.try_recv() {
            Ok(AppEvent::Streaming(StreamingEvent::StateChanged { from, to, .. })) => {
                assert_eq!(from, StreamingState::Idle);
                assert_eq!(to, StreamingState::Streaming);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
