//! Session management for PTY-based process automation

mod builder;
mod interact;

pub use builder::SessionBuilder;
pub use interact::Interact;

#[cfg(any(test, feature = "mock"))]
pub(crate) use builder::DEFAULT_MAX_BUFFER_SIZE;

use crate::buffer::BufferManager;
use crate::pattern::{Pattern, PatternSet, Scan};
use crate::result::{ExpectError, ExpectResult};
use portable_pty::{Child, ChildKiller, ExitStatus, MasterPty};
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace, warn};

/// Poll interval while waiting for an exited child to be reaped.
const EXIT_POLL: Duration = Duration::from_millis(10);

/// A running child process attached to a pseudo-terminal.
///
/// A `Session` is owned by exactly one driving flow. Dropping it closes it:
/// the child is killed if still running and the pty is released.
///
/// # Examples
///
/// ```no_run
/// use promptdriver::{Session, Pattern};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut session = Session::builder()
///     .timeout(Duration::from_secs(30))
///     .spawn("python3 -i")?;
///
/// session.expect(Pattern::exact(">>> ")).await?;
/// session.send_line("print('Hello')").await?;
/// session.close();
/// # Ok(())
/// # }
/// ```
pub struct Session {
    master: Option<Box<dyn MasterPty + Send>>,
    child: Option<Box<dyn Child + Send + Sync>>,
    output: mpsc::UnboundedReceiver<Vec<u8>>,
    writer: Arc<Mutex<Option<Box<dyn Write + Send>>>>,
    buffer: BufferManager,
    timeout: Duration,
    eof_reached: bool,
    exit_status: Option<ExitStatus>,
}

impl Session {
    /// Create a new session builder.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Spawn a command with default options (`Session::builder().spawn(command)`).
    pub fn spawn(command: &str) -> Result<Self, ExpectError> {
        SessionBuilder::new().spawn(command)
    }

    /// Timeout applied by the next `expect`/`expect_any`.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Change the timeout applied by subsequent `expect`/`expect_any` calls.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Wait for a single pattern using the current timeout.
    pub async fn expect(&mut self, pattern: Pattern) -> Result<ExpectResult, ExpectError> {
        self.expect_any(&[pattern]).await
    }

    /// Wait for any of the given patterns using the current timeout.
    pub async fn expect_any(&mut self, patterns: &[Pattern]) -> Result<ExpectResult, ExpectError> {
        let timeout = self.timeout;
        self.expect_any_within(patterns, timeout).await
    }

    /// Wait for any of the given patterns for at most `timeout`.
    ///
    /// The earliest-starting match wins, ties going to the lower index. On
    /// timeout or end of input, `Pattern::Timeout` / `Pattern::Eof` in the
    /// list turn the condition into a match; otherwise the call fails with
    /// `ExpectError::Timeout` / `ExpectError::Eof`. Bytes that arrived but
    /// did not match stay buffered for the next call.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use promptdriver::{Session, Pattern};
    /// use std::time::Duration;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// # let mut session = Session::spawn("installer")?;
    /// let patterns = [Pattern::exact("Please enter your password"), Pattern::Eof];
    /// let result = session
    ///     .expect_any_within(&patterns, Duration::from_secs(10))
    ///     .await?;
    /// if result.pattern_index == 1 {
    ///     println!("exited early: {}", result.before);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn expect_any_within(
        &mut self,
        patterns: &[Pattern],
        timeout: Duration,
    ) -> Result<ExpectResult, ExpectError> {
        if self.master.is_none() {
            return Err(ExpectError::ProcessExited);
        }

        let set = PatternSet::new(patterns)?;
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(result) = resolve(&mut self.buffer, &set, self.eof_reached) {
                return result;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return timed_out(&mut self.buffer, &set, timeout);
            }

            match tokio::time::timeout(remaining, self.output.recv()).await {
                Ok(Some(chunk)) => {
                    trace!(bytes = chunk.len(), "read from pty");
                    self.buffer.append(&chunk);
                }
                Ok(None) => {
                    debug!("pty reached end of input");
                    self.eof_reached = true;
                }
                Err(_) => return timed_out(&mut self.buffer, &set, timeout),
            }
        }
    }

    /// Send raw bytes to the child and flush.
    pub async fn send(&mut self, data: &[u8]) -> Result<(), ExpectError> {
        let writer = self.writer.clone();
        let data = data.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut guard = writer.blocking_lock();
            let writer = guard
                .as_mut()
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::BrokenPipe))?;
            writer.write_all(&data)?;
            writer.flush()
        })
        .await
        .map_err(|e| ExpectError::IoError(std::io::Error::other(e)))??;

        Ok(())
    }

    /// Send a line to the process (appends newline).
    pub async fn send_line(&mut self, line: &str) -> Result<(), ExpectError> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.send(&data).await
    }

    /// Check if the process is still alive.
    pub fn is_alive(&mut self) -> Result<bool, ExpectError> {
        let child = self.child.as_mut().ok_or(ExpectError::ProcessExited)?;
        Ok(child.try_wait()?.is_none())
    }

    /// Everything the child has written so far, if transcript capture is on.
    pub fn transcript(&self) -> Option<String> {
        self.buffer.transcript()
    }

    /// Exit status recorded so far, without blocking.
    pub fn exit_status(&mut self) -> Option<&ExitStatus> {
        if self.exit_status.is_none() {
            if let Some(child) = self.child.as_mut() {
                if let Ok(Some(status)) = child.try_wait() {
                    self.exit_status = Some(status);
                }
            }
        }
        self.exit_status.as_ref()
    }

    /// Wait up to `grace` for the child to exit and return its exit code.
    ///
    /// Returns `None` if the child is still running after `grace`.
    pub async fn wait_exit(&mut self, grace: Duration) -> Option<u32> {
        let deadline = Instant::now() + grace;
        loop {
            if let Some(status) = self.exit_status() {
                return Some(status.exit_code());
            }
            if self.child.is_none() || Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(EXIT_POLL).await;
        }
    }

    /// Terminate the child if still running and release the pty.
    ///
    /// Idempotent and infallible; also invoked on drop.
    pub fn close(&mut self) {
        if let Some(mut child) = self.child.take() {
            match child.try_wait() {
                Ok(Some(status)) => self.exit_status = Some(status),
                _ => {
                    if let Err(e) = child.kill() {
                        warn!(error = %e, "failed to kill child");
                    }
                    match child.wait() {
                        Ok(status) => self.exit_status = Some(status),
                        Err(e) => warn!(error = %e, "failed to reap child"),
                    }
                }
            }
            debug!(status = ?self.exit_status, "session closed");
        }

        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
        self.master.take();
        self.output.close();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Decide an expect call from what is buffered, or `None` to keep reading.
pub(crate) fn resolve(
    buffer: &mut BufferManager,
    set: &PatternSet,
    at_eof: bool,
) -> Option<Result<ExpectResult, ExpectError>> {
    match set.scan(buffer.window(), at_eof) {
        Scan::Found { index, found } => {
            let (before, matched) = buffer.take_match(found.start, found.end);
            Some(Ok(ExpectResult {
                pattern_index: index,
                matched,
                before,
                captures: found.captures,
            }))
        }
        Scan::Eof => Some(match set.eof_index() {
            Some(index) => Ok(ExpectResult {
                pattern_index: index,
                matched: String::new(),
                before: buffer.take_all(),
                captures: vec![],
            }),
            None => Err(ExpectError::Eof),
        }),
        Scan::Pending => None,
    }
}

/// Outcome of an expect call whose budget ran out.
pub(crate) fn timed_out(
    buffer: &mut BufferManager,
    set: &PatternSet,
    duration: Duration,
) -> Result<ExpectResult, ExpectError> {
    match set.timeout_index() {
        Some(index) => Ok(ExpectResult {
            pattern_index: index,
            matched: String::new(),
            before: buffer.take_all(),
            captures: vec![],
        }),
        None => Err(ExpectError::Timeout { duration }),
    }
}
