//! Result types for expect operations

mod error;

pub use error::{AutomationError, ExpectError, FailureKind, PatternError, StepContext};

/// Snapshot of one successful `expect` call.
///
/// The session's buffer is split at the match: everything before the match
/// start lands in `before`, the matched region in `matched`, and whatever
/// followed the match stays buffered for the next call.
///
/// # Examples
///
/// ```no_run
/// use promptdriver::{Session, Pattern};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let mut session = Session::spawn("bash")?;
/// session.send_line("uptime").await?;
///
/// // Wait for the prompt; `before` holds the command's output
/// let result = session.expect(Pattern::exact("$ ")).await?;
/// println!("Uptime: {}", result.before);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectResult {
    /// Index of the alternative that matched.
    ///
    /// For `Pattern::Eof` and `Pattern::Timeout` this is their position in the
    /// list.
    pub pattern_index: usize,

    /// The matched text. Empty for `Eof` and `Timeout`.
    pub matched: String,

    /// Text received since the previous match, up to the start of this one.
    pub before: String,

    /// Captured groups (for regex patterns).
    ///
    /// Index 0 is the full match, index 1+ each group. Empty for exact
    /// patterns.
    pub captures: Vec<String>,
}

impl ExpectResult {
    /// Capture group `i`, if the pattern had one and it participated.
    pub fn capture(&self, i: usize) -> Option<&str> {
        self.captures.get(i).map(String::as_str).filter(|s| !s.is_empty())
    }
}
