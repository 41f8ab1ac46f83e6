use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use strokeplot_communication::{
    CancelToken, Reply, SerialStreamer, SimulatedController, StreamListener, StreamerConfig,
    StreamerState, Transport,
};
use strokeplot_core::{
    ConnectionError, Error, PenState, PlotCommand, PlotProgram, ProtocolError, ReadyMatch,
};

// Transport whose replies come from a closure over each written line
#[derive(Default)]
struct ScriptLog {
    written: Vec<String>,
    closes: usize,
}

struct ScriptedTransport {
    log: Arc<Mutex<ScriptLog>>,
    respond: Box<dyn FnMut(&str) -> Vec<String> + Send>,
    pending: VecDeque<String>,
    fail_on_write: Option<usize>,
}

impl ScriptedTransport {
    fn new(respond: impl FnMut(&str) -> Vec<String> + Send + 'static) -> Self {
        Self {
            log: Arc::new(Mutex::new(ScriptLog::default())),
            respond: Box::new(respond),
            pending: VecDeque::new(),
            fail_on_write: None,
        }
    }

    // the nth write (1-based) fails as if the cable were pulled
    fn failing_at(mut self, write: usize) -> Self {
        self.fail_on_write = Some(write);
        self
    }

    fn log(&self) -> Arc<Mutex<ScriptLog>> {
        Arc::clone(&self.log)
    }
}

impl Transport for ScriptedTransport {
    fn write_line(&mut self, line: &str) -> strokeplot_core::Result<()> {
        let writes = {
            let mut log = self.log.lock();
            log.written.push(line.to_string());
            log.written.len()
        };
        if self.fail_on_write == Some(writes) {
            return Err(ConnectionError::Io {
                reason: "device disconnected".to_string(),
            }
            .into());
        }
        let replies = (self.respond)(line);
        self.pending.extend(replies);
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> strokeplot_core::Result<Option<String>> {
        match self.pending.pop_front() {
            Some(line) => Ok(Some(line)),
            None => {
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> strokeplot_core::Result<()> {
        self.log.lock().closes += 1;
        Ok(())
    }

    fn name(&self) -> String {
        "scripted".to_string()
    }
}

// Listener that records everything it sees
#[derive(Default)]
struct Events {
    states: Vec<(StreamerState, StreamerState)>,
    exchanges: Vec<(usize, String, Reply)>,
    retries: Vec<(String, u32)>,
}

#[derive(Clone, Default)]
struct Recorder {
    events: Arc<Mutex<Events>>,
    cancel_at: Option<(usize, CancelToken)>,
}

impl StreamListener for Recorder {
    fn on_state_change(&mut self, from: StreamerState, to: StreamerState) {
        self.events.lock().states.push((from, to));
    }

    fn on_exchange(&mut self, index: usize, line: &str, reply: &Reply) {
        self.events
            .lock()
            .exchanges
            .push((index, line.to_string(), reply.clone()));
        if let Some((at, token)) = &self.cancel_at {
            if index == *at {
                token.cancel();
            }
        }
    }

    fn on_retry(&mut self, line: &str, attempt: u32) {
        self.events.lock().retries.push((line.to_string(), attempt));
    }
}

fn grbl(line: &str) -> Vec<String> {
    if line.is_empty() {
        vec!["$".to_string()]
    } else {
        vec!["ok".to_string()]
    }
}

fn fast_config() -> StreamerConfig {
    StreamerConfig {
        settle_delay: Duration::ZERO,
        pacing_delay: Duration::ZERO,
        ready_timeout: Duration::from_millis(40),
        reply_timeout: Duration::from_millis(40),
        max_retries: 2,
        poll_interval: Duration::from_millis(5),
        ..StreamerConfig::default()
    }
}

fn program() -> PlotProgram {
    vec![
        PlotCommand::new(0, 0, PenState::Up),
        PlotCommand::new(9, 18, PenState::Down),
    ]
    .into()
}

#[test]
fn test_full_run_exchanges_every_line_once() {
    let sim = SimulatedController::default();
    let handle = sim.handle();
    let recorder = Recorder::default();
    let events = Arc::clone(&recorder.events);

    let mut streamer = SerialStreamer::new(fast_config()).with_listener(recorder);
    let report = streamer.run(move || Ok(sim), program()).unwrap();

    assert_eq!(report.commands, 2);
    assert_eq!(report.exchanges, 2 * 2 + 3);
    assert_eq!(report.retries, 0);
    assert_eq!(streamer.state(), StreamerState::Closed);

    assert_eq!(
        handle.written_lines(),
        vec![
            "", "G1 X0 Y0 F1000", "M3", "S0", "S0", "G0 X0 Y0", "S1000", "G1 X9 Y18"
        ]
    );
    assert_eq!(handle.close_count(), 1);

    let events = events.lock();
    assert_eq!(
        events.states,
        vec![
            (StreamerState::Idle, StreamerState::AwaitingReady),
            (StreamerState::AwaitingReady, StreamerState::Streaming),
            (StreamerState::Streaming, StreamerState::Closed),
        ]
    );
    let indices: Vec<usize> = events.exchanges.iter().map(|(i, _, _)| *i).collect();
    assert_eq!(indices, (0..7).collect::<Vec<_>>());
    assert!(events.exchanges.iter().all(|(_, _, reply)| reply.is_ok()));
}

#[test]
fn test_empty_program_sends_startup_only() {
    let sim = SimulatedController::default();
    let handle = sim.handle();

    let mut streamer = SerialStreamer::new(fast_config());
    let report = streamer.run(move || Ok(sim), PlotProgram::default()).unwrap();

    assert_eq!(report.exchanges, 3);
    assert_eq!(handle.written_lines().len(), 4);
    assert_eq!(handle.close_count(), 1);
}

#[test]
fn test_open_failure_writes_nothing() {
    let recorder = Recorder::default();
    let events = Arc::clone(&recorder.events);

    let mut streamer = SerialStreamer::new(fast_config()).with_listener(recorder);
    let err = streamer
        .run(
            || -> strokeplot_core::Result<SimulatedController> {
                Err(ConnectionError::FailedToOpen {
                    port: "/dev/ttyUSB0".to_string(),
                    reason: "busy".to_string(),
                }
                .into())
            },
            program(),
        )
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Connection(ConnectionError::FailedToOpen { .. })
    ));
    assert_eq!(streamer.state(), StreamerState::Closed);
    assert_eq!(
        events.lock().states.last(),
        Some(&(StreamerState::AwaitingReady, StreamerState::Closed))
    );
    assert!(events.lock().exchanges.is_empty());
}

#[test]
fn test_reply_timeout_resends_then_fails() {
    let transport = ScriptedTransport::new(|line| {
        if line.is_empty() {
            vec!["$".to_string()]
        } else {
            Vec::new()
        }
    });
    let log = transport.log();

    let mut streamer = SerialStreamer::new(fast_config());
    let err = streamer.run(move || Ok(transport), program()).unwrap_err();

    match err {
        Error::Protocol(ProtocolError::ReplyTimeout {
            command, attempts, ..
        }) => {
            assert_eq!(command, "G1 X0 Y0 F1000");
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {other}"),
    }

    let log = log.lock();
    assert_eq!(
        log.written,
        vec!["", "G1 X0 Y0 F1000", "G1 X0 Y0 F1000", "G1 X0 Y0 F1000"]
    );
    assert_eq!(log.closes, 1);
    assert_eq!(streamer.state(), StreamerState::Closed);
}

#[test]
fn test_ready_timeout_rewakes_then_fails() {
    let transport = ScriptedTransport::new(|_| Vec::new());
    let log = transport.log();

    let config = StreamerConfig {
        max_retries: 1,
        ..fast_config()
    };
    let mut streamer = SerialStreamer::new(config);
    let err = streamer.run(move || Ok(transport), program()).unwrap_err();

    assert!(err.is_timeout());
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::ReadyTimeout { attempts: 2, .. })
    ));
    let log = log.lock();
    assert_eq!(log.written, vec!["", ""]);
    assert_eq!(log.closes, 1);
}

#[test]
fn test_banner_before_exact_token() {
    let sim = SimulatedController::new("$").with_banner("Grbl 1.1h");
    let mut streamer = SerialStreamer::new(fast_config());
    let report = streamer.run(move || Ok(sim), program()).unwrap();
    assert_eq!(report.exchanges, 7);
}

#[test]
fn test_contains_match_accepts_stock_banner() {
    let banner = |line: &str| {
        if line.is_empty() {
            vec!["Grbl 1.1h ['$' for help]".to_string()]
        } else {
            vec!["ok".to_string()]
        }
    };

    let exact = ScriptedTransport::new(banner);
    let config = StreamerConfig {
        max_retries: 0,
        ..fast_config()
    };
    let err = SerialStreamer::new(config.clone())
        .run(move || Ok(exact), program())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::ReadyTimeout { .. })
    ));

    let contains = ScriptedTransport::new(banner);
    let config = StreamerConfig {
        ready_match: ReadyMatch::Contains,
        ..config
    };
    let report = SerialStreamer::new(config)
        .run(move || Ok(contains), program())
        .unwrap();
    assert_eq!(report.exchanges, 7);
}

#[test]
fn test_lenient_mode_continues_after_error_reply() {
    let sim = SimulatedController::default().with_reply("error:20");
    let handle = sim.handle();

    let mut streamer = SerialStreamer::new(fast_config());
    let report = streamer.run(move || Ok(sim), program()).unwrap();

    assert_eq!(report.exchanges, 7);
    assert_eq!(handle.close_count(), 1);
}

#[test]
fn test_strict_mode_rejects_error_reply() {
    let sim = SimulatedController::default().with_reply("error:20");
    let handle = sim.handle();

    let config = StreamerConfig {
        strict_replies: true,
        ..fast_config()
    };
    let mut streamer = SerialStreamer::new(config);
    let err = streamer.run(move || Ok(sim), program()).unwrap_err();

    match err {
        Error::Protocol(ProtocolError::CommandRejected { command, .. }) => {
            assert_eq!(command, "G1 X0 Y0 F1000");
        }
        other => panic!("unexpected error: {other}"),
    }
    // not retried
    assert_eq!(handle.written_lines(), vec!["", "G1 X0 Y0 F1000"]);
    assert_eq!(handle.close_count(), 1);
}

#[test]
fn test_strict_mode_stops_on_alarm() {
    let sim = SimulatedController::default().with_reply("ALARM:1");
    let config = StreamerConfig {
        strict_replies: true,
        ..fast_config()
    };
    let err = SerialStreamer::new(config)
        .run(move || Ok(sim), program())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::Alarm { code: 1, .. })
    ));
}

#[test]
fn test_cancel_during_stream_closes_once() {
    let sim = SimulatedController::default();
    let handle = sim.handle();

    let token = CancelToken::new();
    let recorder = Recorder {
        cancel_at: Some((3, token.clone())),
        ..Recorder::default()
    };

    let mut streamer = SerialStreamer::new(fast_config())
        .with_cancel_token(token)
        .with_listener(recorder);
    let err = streamer.run(move || Ok(sim), program()).unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(handle.written_lines().len(), 1 + 4);
    assert_eq!(handle.close_count(), 1);
    assert_eq!(streamer.state(), StreamerState::Closed);
}

#[test]
fn test_cancel_before_run_writes_nothing() {
    let sim = SimulatedController::default();
    let handle = sim.handle();

    let mut streamer = SerialStreamer::new(fast_config());
    streamer.cancel_token().cancel();
    let err = streamer.run(move || Ok(sim), program()).unwrap_err();

    assert!(err.is_cancelled());
    assert!(handle.written_lines().is_empty());
    assert_eq!(handle.close_count(), 1);
}

#[test]
fn test_second_run_is_rejected() {
    let mut streamer = SerialStreamer::new(fast_config());
    streamer
        .run(|| Ok(SimulatedController::default()), program())
        .unwrap();

    let mut opened = false;
    let err = streamer
        .run(
            || {
                opened = true;
                Ok(SimulatedController::default())
            },
            program(),
        )
        .unwrap_err();

    assert!(!opened);
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::InvalidStateTransition { .. })
    ));
}

#[test]
fn test_lost_reply_is_resent_once() {
    let mut dropped = false;
    let transport = ScriptedTransport::new(move |line| {
        if line == "M3" && !dropped {
            dropped = true;
            return Vec::new();
        }
        grbl(line)
    });
    let log = transport.log();
    let recorder = Recorder::default();
    let events = Arc::clone(&recorder.events);

    let mut streamer = SerialStreamer::new(fast_config()).with_listener(recorder);
    let report = streamer.run(move || Ok(transport), program()).unwrap();

    assert_eq!(report.exchanges, 7);
    assert_eq!(report.retries, 1);
    let written = log.lock().written.clone();
    assert_eq!(written.iter().filter(|l| l.as_str() == "M3").count(), 2);
    assert_eq!(events.lock().retries, vec![("M3".to_string(), 1)]);
}

#[test]
fn test_blank_lines_are_not_replies() {
    let transport = ScriptedTransport::new(|line| {
        if line.is_empty() {
            vec!["$".to_string()]
        } else {
            vec![String::new(), "ok".to_string()]
        }
    });
    let log = transport.log();

    let report = SerialStreamer::new(fast_config())
        .run(move || Ok(transport), program())
        .unwrap();

    assert_eq!(report.exchanges, 7);
    assert_eq!(report.retries, 0);
    assert_eq!(log.lock().written.len(), 8);
}

#[test]
fn test_late_reply_after_resend_is_not_taken_by_next_line() {
    let mut m3_sends = 0;
    let transport = ScriptedTransport::new(move |line| {
        if line.is_empty() {
            return vec!["$".to_string()];
        }
        let reply = format!("[MSG:{line}]");
        if line == "M3" {
            m3_sends += 1;
            // first reply is late and lands together with the resend's
            return match m3_sends {
                1 => Vec::new(),
                2 => vec![reply.clone(), reply],
                _ => vec![reply],
            };
        }
        vec![reply]
    });
    let log = transport.log();
    let recorder = Recorder::default();
    let events = Arc::clone(&recorder.events);

    let mut streamer = SerialStreamer::new(fast_config()).with_listener(recorder);
    let report = streamer.run(move || Ok(transport), program()).unwrap();

    assert_eq!(report.exchanges, 7);
    assert_eq!(report.retries, 1);

    let events = events.lock();
    assert_eq!(events.exchanges.len(), 7);
    for (index, line, reply) in &events.exchanges {
        assert_eq!(
            reply,
            &Reply::Message(format!("[MSG:{line}]")),
            "exchange {index} took another line's reply"
        );
    }

    let written = log.lock().written.clone();
    assert_eq!(
        written,
        vec!["", "G1 X0 Y0 F1000", "M3", "M3", "S0", "S0", "G0 X0 Y0", "S1000", "G1 X9 Y18"]
    );
}

#[test]
fn test_write_failure_mid_stream_closes_once() {
    // wake, startup lines, then the first program line fails
    let transport = ScriptedTransport::new(grbl).failing_at(5);
    let log = transport.log();
    let recorder = Recorder::default();
    let events = Arc::clone(&recorder.events);

    let mut streamer = SerialStreamer::new(fast_config()).with_listener(recorder);
    let err = streamer.run(move || Ok(transport), program()).unwrap_err();

    assert!(err.is_connection_error());
    assert!(matches!(err, Error::Connection(ConnectionError::Io { .. })));
    assert_eq!(streamer.state(), StreamerState::Closed);

    let log = log.lock();
    assert_eq!(log.written.len(), 5);
    assert_eq!(log.closes, 1);
    assert_eq!(events.lock().exchanges.len(), 3);
    assert_eq!(
        events.lock().states.last(),
        Some(&(StreamerState::Streaming, StreamerState::Closed))
    );
}
