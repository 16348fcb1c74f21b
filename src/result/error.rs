//! Error types for promptdriver

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during expect operations.
///
/// These are the transport-level failures of a single [`Session`](crate::Session).
/// Automatons translate them into [`AutomationError`] with the name of the
/// step that was waiting.
///
/// # Examples
///
/// ```no_run
/// use promptdriver::{ExpectError, Pattern, Session};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut session = Session::builder()
///     .timeout(Duration::from_secs(5))
///     .spawn("some-command")?;
///
/// match session.expect(Pattern::exact("done")).await {
///     Ok(result) => println!("Matched: {}", result.matched),
///     Err(ExpectError::Timeout { duration }) => {
///         eprintln!("Timed out after {:?}", duration);
///     }
///     Err(ExpectError::Eof) => {
///         eprintln!("Process exited unexpectedly");
///     }
///     Err(e) => return Err(e.into()),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Error, Debug)]
pub enum ExpectError {
    /// Timeout waiting for pattern.
    ///
    /// Returned when no alternative matched within the timeout of the call.
    /// Put `Pattern::Timeout` in the list to receive the condition as a match
    /// instead.
    #[error("Timeout waiting for pattern (after {duration:?})")]
    Timeout {
        /// Duration that was waited before timeout
        duration: Duration,
    },

    /// EOF reached before pattern matched.
    ///
    /// The child closed its side of the pty before any alternative matched.
    #[error("EOF reached before pattern matched")]
    Eof,

    /// Invalid pattern.
    #[error("Invalid pattern: {0}")]
    PatternError(#[from] PatternError),

    /// I/O error while reading from or writing to the pty.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// PTY creation or manipulation failed.
    #[error("PTY error: {0}")]
    PtyError(String),

    /// The command could not be spawned (not found, permission denied, ...).
    #[error("Failed to spawn process: {0}")]
    SpawnError(String),

    /// The session has been closed.
    #[error("Process has already exited")]
    ProcessExited,
}

/// Errors related to pattern creation.
#[derive(Error, Debug)]
pub enum PatternError {
    /// Invalid regex pattern.
    #[error("Invalid regex: {0}")]
    InvalidRegex(#[from] regex::Error),

    /// Empty pattern.
    #[error("Pattern cannot be empty")]
    EmptyPattern,
}

/// Category of a failed automaton run, as reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Target not found or process could not start.
    Spawn,
    /// No alternative matched within the step's budget.
    Timeout,
    /// The child exited before an expected pattern.
    UnexpectedEof,
    /// A recognized error could not be recovered.
    Protocol,
    /// The child reported a non-zero exit status.
    NonZeroExit,
    /// The program announced a fatal error during its run.
    ProgramFailed,
    /// Pty I/O or pattern compilation failure.
    Internal,
}

/// Fatal outcome of an automaton run.
///
/// Every variant renders a single human-readable message; no partial outcome
/// accompanies it.
#[derive(Error, Debug)]
pub enum AutomationError {
    /// The target program path does not exist.
    #[error("Error: the script '{0}' does not exist!")]
    TargetNotFound(String),

    /// The process or pty could not be created.
    #[error("Failed to start process: {0}")]
    Spawn(String),

    /// A step timed out.
    #[error("Timed out after {duration:?} waiting for {waiting_for}")]
    Timeout {
        /// What the automaton was waiting for
        waiting_for: String,
        /// Budget of the step
        duration: Duration,
    },

    /// The child terminated while a step still expected output.
    #[error("Unexpected program termination while waiting for {waiting_for}")]
    UnexpectedEof {
        /// What the automaton was waiting for
        waiting_for: String,
    },

    /// A recognized error pattern matched and the recovery policy gave up.
    #[error("{reason}\n  {raw}")]
    Unrecoverable {
        /// Diagnostic from the recovery policy
        reason: String,
        /// Raw error text from the child
        raw: String,
    },

    /// The child's own exit status was not `0`.
    #[error("ERROR: The command returned a non-zero exit code! '{code}'")]
    NonZeroExit {
        /// Exit status token exactly as printed
        code: String,
    },

    /// The program printed its fatal marker; the full transcript is attached.
    #[error("The program failed to run properly.\nOutput:\n{transcript}")]
    ProgramFailed {
        /// Everything the child wrote during the run
        transcript: String,
    },

    /// Pattern compilation failed.
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] PatternError),

    /// Any other session failure.
    #[error(transparent)]
    Session(ExpectError),
}

impl AutomationError {
    /// Translate a session error, naming the step that was waiting.
    pub fn at_step(err: ExpectError, waiting_for: &str) -> Self {
        match err {
            ExpectError::Timeout { duration } => AutomationError::Timeout {
                waiting_for: waiting_for.to_string(),
                duration,
            },
            ExpectError::Eof => AutomationError::UnexpectedEof {
                waiting_for: waiting_for.to_string(),
            },
            ExpectError::SpawnError(msg) | ExpectError::PtyError(msg) => {
                AutomationError::Spawn(msg)
            }
            ExpectError::PatternError(e) => AutomationError::Pattern(e),
            other => AutomationError::Session(other),
        }
    }

    /// Category of this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            AutomationError::TargetNotFound(_) | AutomationError::Spawn(_) => FailureKind::Spawn,
            AutomationError::Timeout { .. } => FailureKind::Timeout,
            AutomationError::UnexpectedEof { .. } => FailureKind::UnexpectedEof,
            AutomationError::Unrecoverable { .. } => FailureKind::Protocol,
            AutomationError::NonZeroExit { .. } => FailureKind::NonZeroExit,
            AutomationError::ProgramFailed { .. } => FailureKind::ProgramFailed,
            AutomationError::Pattern(_) | AutomationError::Session(_) => FailureKind::Internal,
        }
    }
}

impl From<ExpectError> for AutomationError {
    fn from(err: ExpectError) -> Self {
        AutomationError::at_step(err, "program output")
    }
}

/// Attach the waiting step to a session result.
pub trait StepContext<T> {
    /// Convert a session error into an [`AutomationError`] naming `waiting_for`.
    fn waiting_for(self, waiting_for: &str) -> Result<T, AutomationError>;
}

impl<T> StepContext<T> for Result<T, ExpectError> {
    fn waiting_for(self, waiting_for: &str) -> Result<T, AutomationError> {
        self.map_err(|e| AutomationError::at_step(e, waiting_for))
    }
}
