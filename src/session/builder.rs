//! Session builder for configuration

use crate::buffer::BufferManager;
use crate::result::ExpectError;
use crate::session::Session;
use portable_pty::{native_pty_system, CommandBuilder, PtyPair, PtySize};
use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Default timeout for expect operations (in seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default maximum buffer size (in bytes)
pub(crate) const DEFAULT_MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Default PTY rows
const DEFAULT_PTY_ROWS: u16 = 24;

/// Default PTY columns
const DEFAULT_PTY_COLS: u16 = 200;

const READ_CHUNK: usize = 4096;

/// Builder for configuring and spawning sessions.
///
/// # Defaults
///
/// - Timeout: 30 seconds
/// - Max buffer size: 64 KiB
/// - ANSI stripping: disabled
/// - Transcript capture: disabled
/// - PTY size: 24 rows × 200 columns
///
/// # Examples
///
/// ```no_run
/// use promptdriver::Session;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let session = Session::builder()
///     .timeout(Duration::from_secs(60))
///     .strip_ansi(true)
///     .env("TERM", "dumb")
///     .spawn("/bin/bash --noprofile --norc")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    timeout: Duration,
    max_buffer_size: usize,
    strip_ansi: bool,
    capture_transcript: bool,
    pty_size: PtySize,
    env: Vec<(String, String)>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    /// Create a new session builder with default configuration.
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            strip_ansi: false,
            capture_transcript: false,
            pty_size: PtySize {
                rows: DEFAULT_PTY_ROWS,
                cols: DEFAULT_PTY_COLS,
                pixel_width: 0,
                pixel_height: 0,
            },
            env: Vec::new(),
        }
    }

    /// Set the initial timeout used by `expect`/`expect_any`.
    ///
    /// `expect_any_within` ignores it and takes its own.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the maximum size of the search window in bytes.
    ///
    /// Older unmatched output is no longer scanned but still ends up in the
    /// next result's `before`.
    pub fn max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size;
        self
    }

    /// Enable or disable ANSI escape sequence stripping before matching.
    pub fn strip_ansi(mut self, strip: bool) -> Self {
        self.strip_ansi = strip;
        self
    }

    /// Mirror all child output into a transcript, independent of matching.
    pub fn capture_transcript(mut self, capture: bool) -> Self {
        self.capture_transcript = capture;
        self
    }

    /// Set PTY (terminal) size.
    pub fn pty_size(mut self, rows: u16, cols: u16) -> Self {
        self.pty_size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        self
    }

    /// Set an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Spawn a shell-style command line and return a configured session.
    ///
    /// The line is split with POSIX shell quoting rules, so
    /// `bash -c "exit 0"` yields three arguments.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the line is empty or unbalanced, the program
    /// does not exist, or the process cannot be started, and `PtyError` if
    /// the pty cannot be created.
    pub fn spawn(self, command: &str) -> Result<Session, ExpectError> {
        let parts = shlex::split(command)
            .ok_or_else(|| ExpectError::SpawnError(format!("Unbalanced quoting: {command}")))?;
        let (program, args) = parts
            .split_first()
            .ok_or_else(|| ExpectError::SpawnError("Empty command".to_string()))?;
        self.spawn_program(program, args)
    }

    /// Spawn `program` with explicit arguments.
    pub fn spawn_program<S: AsRef<str>>(
        self,
        program: &str,
        args: &[S],
    ) -> Result<Session, ExpectError> {
        if program.contains('/') && !std::path::Path::new(program).exists() {
            return Err(ExpectError::SpawnError(format!(
                "{program}: no such file or directory"
            )));
        }

        let mut cmd = CommandBuilder::new(program);
        for arg in args {
            cmd.arg(arg.as_ref());
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let PtyPair { master, slave } = native_pty_system()
            .openpty(self.pty_size)
            .map_err(|e| ExpectError::PtyError(e.to_string()))?;

        let child = slave
            .spawn_command(cmd)
            .map_err(|e| ExpectError::SpawnError(e.to_string()))?;
        // Only the child may hold the slave side, otherwise the reader never sees EOF
        drop(slave);

        let reader = master
            .try_clone_reader()
            .map_err(|e| ExpectError::PtyError(e.to_string()))?;
        let writer = master
            .take_writer()
            .map_err(|e| ExpectError::PtyError(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("promptdriver-pty-reader".into())
            .spawn(move || pump(reader, tx))
            .map_err(|e| ExpectError::SpawnError(e.to_string()))?;

        debug!(program, pid = ?child.process_id(), "spawned child");

        let mut buffer = BufferManager::new(self.max_buffer_size, self.strip_ansi);
        if self.capture_transcript {
            buffer = buffer.with_transcript();
        }

        Ok(Session {
            master: Some(master),
            child: Some(child),
            output: rx,
            writer: Arc::new(Mutex::new(Some(writer))),
            buffer,
            timeout: self.timeout,
            eof_reached: false,
            exit_status: None,
        })
    }
}

/// Copy pty output into the session's channel until EOF or error.
fn pump(mut reader: Box<dyn Read + Send>, tx: mpsc::UnboundedSender<Vec<u8>>) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(5));
            }
            // EIO once the child side is gone
            Err(_) => break,
        }
    }
}
