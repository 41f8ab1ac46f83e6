//! In-memory controller used for dry runs and tests.
//!
//! Behaves like a GRBL-style plotter: the first wake line produces an
//! optional banner followed by the ready token, and every non-empty command
//! line is answered with a single reply.

use super::Transport;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use strokeplot_core::Result;

#[derive(Debug, Default)]
struct SimulatorLog {
    written: Vec<String>,
    close_count: usize,
}

/// Read-only view of what a simulated controller received
#[derive(Debug, Clone)]
pub struct SimulatorHandle {
    log: Arc<Mutex<SimulatorLog>>,
}

impl SimulatorHandle {
    /// Every line written to the controller, including wake lines
    pub fn written_lines(&self) -> Vec<String> {
        self.log.lock().written.clone()
    }

    /// Number of times the transport was closed
    pub fn close_count(&self) -> usize {
        self.log.lock().close_count
    }
}

/// A transport that answers like a plotter controller
#[derive(Debug)]
pub struct SimulatedController {
    log: Arc<Mutex<SimulatorLog>>,
    replies: VecDeque<String>,
    banner: Option<String>,
    ready_token: String,
    reply: String,
    awake: bool,
}

impl SimulatedController {
    /// Controller that announces `ready_token` and acknowledges with "ok"
    pub fn new(ready_token: impl Into<String>) -> Self {
        Self {
            log: Arc::new(Mutex::new(SimulatorLog::default())),
            replies: VecDeque::new(),
            banner: None,
            ready_token: ready_token.into(),
            reply: "ok".to_string(),
            awake: false,
        }
    }

    /// Emit a boot banner before the ready token
    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = Some(banner.into());
        self
    }

    /// Answer every command with `reply` instead of "ok"
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = reply.into();
        self
    }

    /// Handle for inspecting traffic after the controller is moved away
    pub fn handle(&self) -> SimulatorHandle {
        SimulatorHandle {
            log: Arc::clone(&self.log),
        }
    }
}

impl Default for SimulatedController {
    fn default() -> Self {
        Self::new("$")
    }
}

impl Transport for SimulatedController {
    fn write_line(&mut self, line: &str) -> Result<()> {
        self.log.lock().written.push(line.to_string());

        if line.trim().is_empty() {
            if !self.awake {
                self.awake = true;
                if let Some(banner) = &self.banner {
                    self.replies.push_back(banner.clone());
                }
                self.replies.push_back(self.ready_token.clone());
            }
        } else {
            self.replies.push_back(self.reply.clone());
        }
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>> {
        match self.replies.pop_front() {
            Some(line) => Ok(Some(line)),
            None => {
                thread::sleep(timeout);
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.log.lock().close_count += 1;
        Ok(())
    }

    fn name(&self) -> String {
        "simulator".to_string()
    }
}
