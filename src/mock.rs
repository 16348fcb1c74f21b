//! Scripted stand-in for a [`Session`](crate::Session).
//!
//! A `MockSession` plays back canned output in reaction to the lines an
//! automaton sends, using the same buffer and pattern resolution as a real
//! pty session. Since no output can arrive without a send, an `expect` that
//! is still pending fails (or matches `Pattern::Timeout`) immediately instead
//! of sleeping.
//!
//! ```
//! use promptdriver::mock::MockSession;
//!
//! let session = MockSession::new("Enter password: ")
//!     .on("hunter2", "\r\n> ")
//!     .on_eof("exit", "bye\r\n");
//! # let _ = session;
//! ```

use crate::buffer::BufferManager;
use crate::pattern::{Pattern, PatternSet};
use crate::result::{ExpectError, ExpectResult};
use crate::session::{resolve, timed_out, Interact, DEFAULT_MAX_BUFFER_SIZE};
use std::collections::VecDeque;
use std::time::Duration;

/// One scripted reaction.
#[derive(Debug, Clone)]
struct Exchange {
    trigger: String,
    reply: String,
    eof: bool,
}

/// A session whose child is a script.
#[derive(Debug)]
pub struct MockSession {
    buffer: BufferManager,
    script: VecDeque<Exchange>,
    sent: Vec<String>,
    eof: bool,
    exit_code: Option<u32>,
    close_count: usize,
}

impl MockSession {
    /// Create a session that has already printed `initial`.
    pub fn new(initial: &str) -> Self {
        let mut buffer = BufferManager::new(DEFAULT_MAX_BUFFER_SIZE, false).with_transcript();
        buffer.append(initial.as_bytes());
        Self {
            buffer,
            script: VecDeque::new(),
            sent: Vec::new(),
            eof: false,
            exit_code: None,
            close_count: 0,
        }
    }

    /// When the next line sent equals `trigger`, print `reply`.
    pub fn on(mut self, trigger: &str, reply: &str) -> Self {
        self.script.push_back(Exchange {
            trigger: trigger.to_string(),
            reply: reply.to_string(),
            eof: false,
        });
        self
    }

    /// When the next line sent equals `trigger`, print `reply` and exit.
    pub fn on_eof(mut self, trigger: &str, reply: &str) -> Self {
        self.script.push_back(Exchange {
            trigger: trigger.to_string(),
            reply: reply.to_string(),
            eof: true,
        });
        self
    }

    /// Exit code reported once the script has ended.
    pub fn exit_code(mut self, code: u32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Every line sent so far, in order.
    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    /// How many sent lines equal `line`.
    pub fn sent_count(&self, line: &str) -> usize {
        self.sent.iter().filter(|s| s.as_str() == line).count()
    }

    /// How many times `close` was called.
    pub fn close_count(&self) -> usize {
        self.close_count
    }

    /// Whether every scripted exchange was consumed.
    pub fn script_exhausted(&self) -> bool {
        self.script.is_empty()
    }
}

impl Interact for MockSession {
    async fn send_line(&mut self, line: &str) -> Result<(), ExpectError> {
        if self.close_count > 0 || self.eof {
            return Err(ExpectError::ProcessExited);
        }
        self.sent.push(line.to_string());

        // Unscripted input gets no reaction; the next expect then times out
        if self.script.front().is_some_and(|e| e.trigger == line) {
            if let Some(exchange) = self.script.pop_front() {
                self.buffer.append(exchange.reply.as_bytes());
                self.eof = exchange.eof;
            }
        }
        Ok(())
    }

    async fn expect_within(
        &mut self,
        patterns: &[Pattern],
        timeout: Duration,
    ) -> Result<ExpectResult, ExpectError> {
        if self.close_count > 0 {
            return Err(ExpectError::ProcessExited);
        }
        let set = PatternSet::new(patterns)?;
        match resolve(&mut self.buffer, &set, self.eof) {
            Some(result) => result,
            None => timed_out(&mut self.buffer, &set, timeout),
        }
    }

    fn transcript(&self) -> String {
        self.buffer.transcript().unwrap_or_default()
    }

    async fn wait_exit(&mut self, _grace: Duration) -> Option<u32> {
        if self.eof {
            self.exit_code
        } else {
            None
        }
    }

    fn close(&mut self) {
        self.close_count += 1;
    }
}
