//! Pattern matcher implementations

use crate::result::PatternError;
use regex::bytes::Regex;
use regex_automata::hybrid::dfa::{Cache, DFA};
use regex_automata::nfa::thompson;
use regex_automata::util::syntax;
use regex_automata::{Anchored, Input};

/// Result of a pattern match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Start position of the match
    pub start: usize,
    /// End position of the match
    pub end: usize,
    /// Captured groups (for regex)
    pub captures: Vec<String>,
}

/// Trait for pattern matching
pub trait Matcher: Send + Sync {
    /// Find the leftmost match in the buffer
    fn find(&self, buffer: &[u8]) -> Option<Match>;

    /// Earliest position below `before` where a match has started but
    /// could only complete once more bytes arrive.
    fn partial_start(&self, buffer: &[u8], before: usize) -> Option<usize>;
}

/// Exact string matcher using Boyer-Moore-Horspool algorithm
pub struct ExactMatcher {
    pattern: Vec<u8>,
    bad_char_table: [usize; 256],
}

impl ExactMatcher {
    /// Create a new exact matcher
    pub fn new(pattern: impl Into<Vec<u8>>) -> Result<Self, PatternError> {
        let pattern = pattern.into();

        if pattern.is_empty() {
            return Err(PatternError::EmptyPattern);
        }

        let mut bad_char_table = [pattern.len(); 256];
        for (i, &byte) in pattern.iter().enumerate().take(pattern.len() - 1) {
            bad_char_table[byte as usize] = pattern.len() - 1 - i;
        }

        Ok(Self {
            pattern,
            bad_char_table,
        })
    }
}

impl Matcher for ExactMatcher {
    fn find(&self, buffer: &[u8]) -> Option<Match> {
        let len = self.pattern.len();
        if buffer.len() < len {
            return None;
        }

        let mut pos = 0;
        while pos + len <= buffer.len() {
            if buffer[pos..pos + len] == self.pattern[..] {
                return Some(Match {
                    start: pos,
                    end: pos + len,
                    captures: vec![],
                });
            }

            let shift_char = buffer[pos + len - 1];
            pos += self.bad_char_table[shift_char as usize];
        }

        None
    }

    fn partial_start(&self, buffer: &[u8], before: usize) -> Option<usize> {
        (1..self.pattern.len())
            .rev()
            .find(|&i| buffer.ends_with(&self.pattern[..i]))
            .map(|i| buffer.len() - i)
            .filter(|&start| start < before)
    }
}

/// Regex matcher over raw bytes
pub struct RegexMatcher {
    regex: Regex,
    /// Lazy DFA of the same pattern, run anchored to find unfinished matches.
    /// `None` if the pattern has no DFA form.
    prefix: Option<DFA>,
}

impl RegexMatcher {
    /// Create a new regex matcher
    pub fn new(regex: Regex) -> Self {
        let prefix = DFA::builder()
            .syntax(syntax::Config::new().utf8(false))
            .thompson(thompson::Config::new().utf8(false))
            .build(regex.as_str())
            .ok();
        Self { regex, prefix }
    }
}

/// Whether an anchored run from `start` is still alive at the end of `buffer`.
fn still_open(dfa: &DFA, cache: &mut Cache, buffer: &[u8], start: usize) -> bool {
    let input = Input::new(buffer).range(start..).anchored(Anchored::Yes);
    let Ok(mut state) = dfa.start_state_forward(cache, &input) else {
        return false;
    };
    for &byte in &buffer[start..] {
        state = match dfa.next_state(cache, state, byte) {
            Ok(next) => next,
            Err(_) => return false,
        };
        if state.is_dead() || state.is_quit() {
            return false;
        }
    }
    true
}

impl Matcher for RegexMatcher {
    fn find(&self, buffer: &[u8]) -> Option<Match> {
        let captures = self.regex.captures(buffer)?;
        let full_match = captures.get(0)?;

        // Non-participating groups keep their slot so indices stay stable
        let capture_strings = captures
            .iter()
            .map(|cap| {
                cap.map(|c| String::from_utf8_lossy(c.as_bytes()).into_owned())
                    .unwrap_or_default()
            })
            .collect();

        Some(Match {
            start: full_match.start(),
            end: full_match.end(),
            captures: capture_strings,
        })
    }

    fn partial_start(&self, buffer: &[u8], before: usize) -> Option<usize> {
        let dfa = self.prefix.as_ref()?;
        let mut cache = dfa.create_cache();
        (0..before.min(buffer.len())).find(|&start| still_open(dfa, &mut cache, buffer, start))
    }
}
