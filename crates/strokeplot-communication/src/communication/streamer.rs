//! Stop-and-wait streaming of a plot program
//!
//! The streamer owns the transport for a whole run and walks a fixed state
//! machine: `Idle -> AwaitingReady -> Streaming -> Closed`. At most one line
//! is ever in flight; the next line is written only after a reply to the
//! previous one has been read and the pacing delay has elapsed. When a line
//! had to be re-sent, the replies still owed to its earlier sends are read
//! and dropped before the next line goes out.
//!
//! Every wait is bounded by a timeout and polls the cancel token in short
//! slices. Whatever happens after the transport is opened, it is closed
//! exactly once before `run` returns.

use super::Transport;
use crate::firmware::Reply;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use strokeplot_core::{ConnectionError, Error, PlotProgram, ProtocolError, ReadyMatch, Result};
use strokeplot_designer::GcodeEncoder;

/// Shared flag that aborts a run from another thread
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Streamer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamerState {
    /// Nothing opened yet
    Idle,
    /// Transport open, waiting for the ready token
    AwaitingReady,
    /// Sending startup and program lines
    Streaming,
    /// Transport closed; terminal
    Closed,
}

impl StreamerState {
    /// Check if moving to `next` is allowed
    pub fn can_transition_to(self, next: StreamerState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::AwaitingReady)
                | (Self::Idle, Self::Closed)
                | (Self::AwaitingReady, Self::Streaming)
                | (Self::AwaitingReady, Self::Closed)
                | (Self::Streaming, Self::Closed)
        )
    }
}

impl fmt::Display for StreamerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::AwaitingReady => write!(f, "AwaitingReady"),
            Self::Streaming => write!(f, "Streaming"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// Timing and protocol options for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamerConfig {
    /// Delay after the wake byte before reading boot output
    pub settle_delay: Duration,
    /// Delay after each reply before the next line is written
    pub pacing_delay: Duration,
    /// Wait for the ready token per wake attempt
    pub ready_timeout: Duration,
    /// Wait for a reply per send attempt
    pub reply_timeout: Duration,
    /// Re-sends allowed after a timed out wait
    pub max_retries: u32,
    /// Longest single blocking read; bounds cancellation latency
    pub poll_interval: Duration,
    /// Line the controller prints once it accepts commands
    pub ready_token: String,
    /// How boot lines are compared with the token
    pub ready_match: ReadyMatch,
    /// Fail on `error:` and `ALARM:` replies instead of logging them
    pub strict_replies: bool,
    /// Renders commands as controller lines
    pub encoder: GcodeEncoder,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(100),
            pacing_delay: Duration::from_millis(100),
            ready_timeout: Duration::from_secs(10),
            reply_timeout: Duration::from_secs(10),
            max_retries: 2,
            poll_interval: Duration::from_millis(50),
            ready_token: "$".to_string(),
            ready_match: ReadyMatch::Exact,
            strict_replies: false,
            encoder: GcodeEncoder::default(),
        }
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamReport {
    /// Plot commands fully sent
    pub commands: usize,
    /// Exchanges completed, startup lines included
    pub exchanges: usize,
    /// Re-sends of wake bytes and command lines
    pub retries: u32,
    /// Wall time from open to close
    pub elapsed: Duration,
}

/// Observer for streaming progress
pub trait StreamListener: Send {
    /// Called after every state change
    fn on_state_change(&mut self, _from: StreamerState, _to: StreamerState) {}

    /// Called when a reply arrives; `index` counts exchanges from zero
    fn on_exchange(&mut self, _index: usize, _line: &str, _reply: &Reply) {}

    /// Called before a timed out line (empty for the wake byte) is re-sent
    fn on_retry(&mut self, _line: &str, _attempt: u32) {}
}

/// Drives a plot program over a transport
pub struct SerialStreamer {
    config: StreamerConfig,
    state: StreamerState,
    cancel: CancelToken,
    listener: Option<Box<dyn StreamListener>>,
    commands: usize,
    exchanges: usize,
    retries: u32,
}

impl SerialStreamer {
    /// Create an idle streamer
    pub fn new(config: StreamerConfig) -> Self {
        Self {
            config,
            state: StreamerState::Idle,
            cancel: CancelToken::new(),
            listener: None,
            commands: 0,
            exchanges: 0,
            retries: 0,
        }
    }

    /// Use an existing cancel token
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Attach a progress listener
    pub fn with_listener(mut self, listener: impl StreamListener + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    /// Current state
    pub fn state(&self) -> StreamerState {
        self.state
    }

    /// Token that cancels this streamer
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Streamer options
    pub fn config(&self) -> &StreamerConfig {
        &self.config
    }

    /// Open a transport with `open` and stream `program` through it
    ///
    /// A streamer runs once. The transport is closed before returning whether
    /// the run succeeded, failed or was cancelled; if `open` fails nothing is
    /// written and nothing is closed.
    pub fn run<T, F>(&mut self, open: F, program: PlotProgram) -> Result<StreamReport>
    where
        T: Transport,
        F: FnOnce() -> Result<T>,
    {
        let started = Instant::now();
        self.transition(StreamerState::AwaitingReady)?;

        let mut transport = match open() {
            Ok(transport) => transport,
            Err(e) => {
                tracing::error!("Could not open transport: {}", e);
                self.transition(StreamerState::Closed)?;
                return Err(open_failure(e));
            }
        };

        tracing::info!(
            "Streaming {} commands to {}",
            program.len(),
            transport.name()
        );

        let outcome = self.drive(&mut transport, &program);
        let closed = transport.close();
        self.transition(StreamerState::Closed)?;

        match (outcome, closed) {
            (Ok(()), Ok(())) => {
                let report = StreamReport {
                    commands: self.commands,
                    exchanges: self.exchanges,
                    retries: self.retries,
                    elapsed: started.elapsed(),
                };
                tracing::info!(
                    "Streamed {} commands in {} exchanges ({} retries) in {:.1?}",
                    report.commands,
                    report.exchanges,
                    report.retries,
                    report.elapsed
                );
                Ok(report)
            }
            (Ok(()), Err(e)) => {
                tracing::error!("Failed to close {}: {}", transport.name(), e);
                Err(e)
            }
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    tracing::warn!("Failed to close {}: {}", transport.name(), close_err);
                }
                tracing::error!("Streaming stopped after {} exchanges: {}", self.exchanges, e);
                Err(e)
            }
        }
    }

    fn drive<T: Transport>(&mut self, transport: &mut T, program: &PlotProgram) -> Result<()> {
        self.await_ready(transport)?;
        self.transition(StreamerState::Streaming)?;

        let encoder = self.config.encoder;
        for line in encoder.startup_lines() {
            self.exchange(transport, &line)?;
        }

        for command in program {
            for line in encoder.encode(command) {
                self.exchange(transport, &line)?;
            }
            self.commands += 1;
        }
        Ok(())
    }

    fn await_ready<T: Transport>(&mut self, transport: &mut T) -> Result<()> {
        let attempts = self.config.max_retries.saturating_add(1);

        for attempt in 1..=attempts {
            self.check_cancelled()?;
            transport.write_line("")?;
            self.pause(self.config.settle_delay)?;

            let deadline = Instant::now() + self.config.ready_timeout;
            while let Some(line) = self.read_until(transport, deadline)? {
                if self
                    .config
                    .ready_match
                    .matches(&line, &self.config.ready_token)
                {
                    tracing::info!("Controller ready on {}", transport.name());
                    return Ok(());
                }
                if !line.trim().is_empty() {
                    tracing::debug!("Boot: {}", line.trim());
                }
            }

            if attempt < attempts {
                tracing::warn!(
                    "No ready token after {:?}, waking controller again ({}/{})",
                    self.config.ready_timeout,
                    attempt,
                    self.config.max_retries
                );
                self.note_retry("", attempt);
            }
        }

        Err(ProtocolError::ReadyTimeout {
            timeout_ms: millis(self.config.ready_timeout),
            attempts,
        }
        .into())
    }

    fn exchange<T: Transport>(&mut self, transport: &mut T, line: &str) -> Result<Reply> {
        let attempts = self.config.max_retries.saturating_add(1);

        for attempt in 1..=attempts {
            self.check_cancelled()?;
            transport.write_line(line)?;

            let deadline = Instant::now() + self.config.reply_timeout;
            if let Some(reply) = self.await_reply(transport, deadline)? {
                // every earlier send of this line may still be answered
                self.discard_late_replies(transport, line, attempt - 1)?;

                let index = self.exchanges;
                self.exchanges += 1;
                if let Some(listener) = self.listener.as_mut() {
                    listener.on_exchange(index, line, &reply);
                }
                self.check_reply(line, &reply)?;
                self.pause(self.config.pacing_delay)?;
                return Ok(reply);
            }

            if attempt < attempts {
                tracing::warn!(
                    "No reply to '{}' after {:?}, re-sending ({}/{})",
                    line,
                    self.config.reply_timeout,
                    attempt,
                    self.config.max_retries
                );
                self.note_retry(line, attempt);
            }
        }

        Err(ProtocolError::ReplyTimeout {
            command: line.to_string(),
            timeout_ms: millis(self.config.reply_timeout),
            attempts,
        }
        .into())
    }

    /// Reads and drops up to `owed` replies left over from re-sends of `line`.
    ///
    /// Each one gets a full reply timeout; a missing reply means that send
    /// really was lost and nothing more is owed.
    fn discard_late_replies<T: Transport>(
        &mut self,
        transport: &mut T,
        line: &str,
        owed: u32,
    ) -> Result<()> {
        for _ in 0..owed {
            let deadline = Instant::now() + self.config.reply_timeout;
            match self.await_reply(transport, deadline)? {
                Some(late) => tracing::debug!("Discarding late reply to '{}': {}", line, late),
                None => break,
            }
        }
        Ok(())
    }

    /// Next non-blank line before `deadline`
    fn await_reply<T: Transport>(
        &mut self,
        transport: &mut T,
        deadline: Instant,
    ) -> Result<Option<Reply>> {
        while let Some(line) = self.read_until(transport, deadline)? {
            if !line.trim().is_empty() {
                return Ok(Some(Reply::parse(&line)));
            }
        }
        Ok(None)
    }

    fn read_until<T: Transport>(
        &self,
        transport: &mut T,
        deadline: Instant,
    ) -> Result<Option<String>> {
        loop {
            self.check_cancelled()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let slice = (deadline - now).min(self.poll_slice());
            if let Some(line) = transport.read_line(slice)? {
                return Ok(Some(line));
            }
        }
    }

    fn check_reply(&self, line: &str, reply: &Reply) -> Result<()> {
        match reply {
            Reply::Error(_) if self.config.strict_replies => Err(ProtocolError::CommandRejected {
                command: line.to_string(),
                reply: reply.to_string(),
            }
            .into()),
            Reply::Alarm(code) if self.config.strict_replies => Err(ProtocolError::Alarm {
                command: line.to_string(),
                code: *code,
            }
            .into()),
            Reply::Error(_) | Reply::Alarm(_) => {
                tracing::warn!("'{}' answered with {}", line, reply);
                Ok(())
            }
            Reply::Ok | Reply::Message(_) => Ok(()),
        }
    }

    fn pause(&self, delay: Duration) -> Result<()> {
        let deadline = Instant::now() + delay;
        loop {
            self.check_cancelled()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep((deadline - now).min(self.poll_slice()));
        }
    }

    fn poll_slice(&self) -> Duration {
        self.config.poll_interval.max(Duration::from_millis(1))
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(ProtocolError::Cancelled.into())
        } else {
            Ok(())
        }
    }

    fn note_retry(&mut self, line: &str, attempt: u32) {
        self.retries += 1;
        if let Some(listener) = self.listener.as_mut() {
            listener.on_retry(line, attempt);
        }
    }

    fn transition(&mut self, next: StreamerState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(ProtocolError::InvalidStateTransition {
                current: self.state.to_string(),
                requested: next.to_string(),
            }
            .into());
        }

        let previous = self.state;
        self.state = next;
        tracing::debug!("Streamer {} -> {}", previous, next);
        if let Some(listener) = self.listener.as_mut() {
            listener.on_state_change(previous, next);
        }
        Ok(())
    }
}

fn open_failure(e: Error) -> Error {
    match e {
        Error::Connection(_) => e,
        other => ConnectionError::FailedToOpen {
            port: "transport".to_string(),
            reason: other.to_string(),
        }
        .into(),
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use StreamerState::*;
        assert!(Idle.can_transition_to(AwaitingReady));
        assert!(Idle.can_transition_to(Closed));
        assert!(AwaitingReady.can_transition_to(Streaming));
        assert!(AwaitingReady.can_transition_to(Closed));
        assert!(Streaming.can_transition_to(Closed));

        assert!(!Idle.can_transition_to(Streaming));
        assert!(!Streaming.can_transition_to(AwaitingReady));
        assert!(!Closed.can_transition_to(Idle));
        assert!(!Closed.can_transition_to(AwaitingReady));
        assert!(!Closed.can_transition_to(Closed));
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_open_failure_wraps_foreign_errors() {
        let err = open_failure(Error::other("no device"));
        assert!(matches!(
            err,
            Error::Connection(ConnectionError::FailedToOpen { .. })
        ));

        let err = open_failure(ConnectionError::NoPortFound.into());
        assert!(matches!(err, Error::Connection(ConnectionError::NoPortFound)));
    }

    #[test]
    fn test_default_config() {
        let config = StreamerConfig::default();
        assert_eq!(config.ready_token, "$");
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert!(!config.strict_replies);
    }
}
