//! Pattern matching for expect operations

mod matcher;
mod set;

pub use matcher::{Match, Matcher};
pub use set::{PatternSet, Scan};

use crate::result::PatternError;
use regex::bytes::Regex;

/// One alternative of an `expect` call.
///
/// # Pattern Types
///
/// - **Exact**: literal text
/// - **Regex**: regular expression over the raw byte stream, with capture groups
/// - **Eof**: matches when the child closes its output
/// - **Timeout**: matches when the call's timeout elapses
///
/// # Examples
///
/// ```
/// use promptdriver::Pattern;
///
/// let p1 = Pattern::exact("password: ");
/// let p2 = Pattern::regex(r"Logfile:\s*(\S+)").unwrap();
/// let p3 = Pattern::Eof;
/// ```
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Exact string match.
    Exact(String),

    /// Regular expression match.
    ///
    /// The matched text and all capture groups are returned in the
    /// `ExpectResult`. Matching runs on bytes, so a multi-byte character split
    /// across two reads does not hide an otherwise complete match.
    Regex(Regex),

    /// Match end of file.
    ///
    /// Without this alternative, end of input fails the call with
    /// `ExpectError::Eof`.
    Eof,

    /// Match timeout condition.
    ///
    /// Without this alternative, an elapsed timeout fails the call with
    /// `ExpectError::Timeout`.
    Timeout,
}

impl Pattern {
    /// Create an exact string pattern.
    ///
    /// ```
    /// use promptdriver::Pattern;
    ///
    /// let pattern = Pattern::exact("> ");
    /// ```
    pub fn exact(s: impl Into<String>) -> Self {
        Pattern::Exact(s.into())
    }

    /// Create a regex pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is invalid.
    ///
    /// ```
    /// use promptdriver::Pattern;
    ///
    /// let pattern = Pattern::regex(r"(?i)do you wish to continue").unwrap();
    /// ```
    pub fn regex(pattern: &str) -> Result<Self, PatternError> {
        Ok(Pattern::Regex(Regex::new(pattern)?))
    }

    /// Convert pattern to a matcher implementation
    pub fn to_matcher(&self) -> Result<Option<Box<dyn Matcher>>, PatternError> {
        use matcher::{ExactMatcher, RegexMatcher};

        match self {
            Pattern::Exact(s) => Ok(Some(Box::new(ExactMatcher::new(s.as_bytes())?))),
            Pattern::Regex(r) => Ok(Some(Box::new(RegexMatcher::new(r.clone())))),
            // Resolved by the expect loop, not by scanning
            Pattern::Eof | Pattern::Timeout => Ok(None),
        }
    }
}
