//! promptdriver: scripted automation of prompt-based CLI programs
//!
//! promptdriver drives interactive programs attached to a pseudo-terminal
//! through a sequence of sends and pattern-matched expectations, in the
//! spirit of the Unix `expect` utility. On top of the generic [`Session`] it
//! ships two complete automatons with automatic recovery from known errors:
//!
//! - [`program::ConfigEditor`]: runs a password-protected configuration tool
//!   from bash, adds missing items on demand, saves, dumps the configuration
//!   and verifies the tool's exit status.
//! - [`program::SilentInstaller`]: feeds a password to an installer, detects
//!   silent password rejection, answers its yes/no questions and collects
//!   reported errors and the full transcript.
//!
//! # Features
//!
//! - **Async/await**: Built on tokio; every `expect` has an explicit timeout
//! - **Ordered alternatives**: The earliest match wins, ties go to the first pattern
//! - **No lost output**: Bytes that arrive during a timed-out `expect` stay buffered
//! - **Pluggable recovery**: Error handling rules live in a [`recovery::RecoveryPolicy`]
//! - **ANSI stripping**: Optional removal of escape sequences before matching
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use promptdriver::{Session, Pattern};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = Session::builder()
//!         .timeout(Duration::from_secs(30))
//!         .spawn("python3 -i")?;
//!
//!     // Wait for the Python prompt
//!     session.expect(Pattern::exact(">>> ")).await?;
//!
//!     session.send_line("print('Hello, World!')").await?;
//!
//!     let result = session.expect(Pattern::exact(">>> ")).await?;
//!     println!("Output: {}", result.before);
//!
//!     session.close();
//!     Ok(())
//! }
//! ```
//!
//! # Pattern Matching
//!
//! - **Exact**: Fast string matching using Boyer-Moore-Horspool
//! - **Regex**: Byte-level regular expressions with capture groups
//! - **EOF**: Match end of file
//! - **Timeout**: Match timeout condition
//!
//! ```rust,no_run
//! use promptdriver::{Session, Pattern};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let mut session = Session::spawn("installer")?;
//! let patterns = [
//!     Pattern::regex(r"ERROR:[^\r\n]*\r\n")?,
//!     Pattern::regex(r"(?i)do you wish to continue")?,
//!     Pattern::Eof,
//! ];
//! let result = session
//!     .expect_any_within(&patterns, Duration::from_secs(60))
//!     .await?;
//! match result.pattern_index {
//!     0 => println!("error: {}", result.matched.trim()),
//!     1 => session.send_line("y").await?,
//!     _ => println!("installer exited"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Running an automaton
//!
//! ```rust,no_run
//! use promptdriver::program::SilentInstaller;
//! use promptdriver::report::{JsonReporter, ResultReporter};
//! use secrecy::SecretString;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let result = SilentInstaller::new("/opt/vendor/install.sh", SecretString::from("hunter2"))
//!     .run()
//!     .await;
//! JsonReporter::new(std::io::stdout()).report(&result)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod buffer;
mod pattern;
mod result;
mod session;

pub mod config;
pub mod program;
pub mod recovery;
pub mod report;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Public API exports
pub use buffer::strip_ansi;
pub use pattern::{Match, Matcher, Pattern, PatternSet, Scan};
pub use result::{
    AutomationError, ExpectError, ExpectResult, FailureKind, PatternError, StepContext,
};
pub use session::{Interact, Session, SessionBuilder};

// Re-export commonly used types
pub use portable_pty::ExitStatus;
