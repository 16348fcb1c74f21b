//! Ordered alternatives and earliest-match resolution

use super::{Match, Matcher, Pattern};
use crate::result::PatternError;

/// Decision of one scan over the buffered window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scan {
    /// Alternative `index` matched.
    Found {
        /// Position of the alternative in the original list
        index: usize,
        /// Match location relative to the scanned window
        found: Match,
    },
    /// Nothing decided yet; more input may change the answer.
    Pending,
    /// Input ended without any alternative matching.
    Eof,
}

/// Compiled, priority-ordered list of alternatives.
///
/// The earliest-starting match across all alternatives wins; when two
/// alternatives match at the same offset the lower index wins.
pub struct PatternSet {
    matchers: Vec<(usize, Box<dyn Matcher>)>,
    eof_index: Option<usize>,
    timeout_index: Option<usize>,
}

impl PatternSet {
    /// Compile a list of patterns.
    pub fn new(patterns: &[Pattern]) -> Result<Self, PatternError> {
        let mut matchers = Vec::with_capacity(patterns.len());
        let mut eof_index = None;
        let mut timeout_index = None;

        for (idx, pattern) in patterns.iter().enumerate() {
            match pattern {
                Pattern::Eof => {
                    eof_index.get_or_insert(idx);
                }
                Pattern::Timeout => {
                    timeout_index.get_or_insert(idx);
                }
                _ => {
                    if let Some(matcher) = pattern.to_matcher()? {
                        matchers.push((idx, matcher));
                    }
                }
            }
        }

        Ok(Self {
            matchers,
            eof_index,
            timeout_index,
        })
    }

    /// Index of `Pattern::Eof` in the list, if present.
    pub fn eof_index(&self) -> Option<usize> {
        self.eof_index
    }

    /// Index of `Pattern::Timeout` in the list, if present.
    pub fn timeout_index(&self) -> Option<usize> {
        self.timeout_index
    }

    /// Scan `window` for the earliest match.
    ///
    /// While input is still open, a found match is held back if another
    /// alternative has begun an earlier match that only more input can
    /// finish.
    pub fn scan(&self, window: &[u8], at_eof: bool) -> Scan {
        let mut best: Option<(usize, Match)> = None;

        for (index, matcher) in &self.matchers {
            if let Some(found) = matcher.find(window) {
                let better = match &best {
                    Some((_, current)) => found.start < current.start,
                    None => true,
                };
                if better {
                    best = Some((*index, found));
                }
            }
        }

        match best {
            Some((index, found)) => {
                if !at_eof && self.could_start_before(window, found.start) {
                    Scan::Pending
                } else {
                    Scan::Found { index, found }
                }
            }
            None if at_eof => Scan::Eof,
            None => Scan::Pending,
        }
    }

    fn could_start_before(&self, window: &[u8], start: usize) -> bool {
        self.matchers
            .iter()
            .any(|(_, m)| m.partial_start(window, start).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(patterns: &[Pattern]) -> PatternSet {
        PatternSet::new(patterns).unwrap()
    }

    fn found_index(scan: Scan) -> usize {
        match scan {
            Scan::Found { index, .. } => index,
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn test_earliest_start_wins_over_list_order() {
        let set = set(&[Pattern::exact(">"), Pattern::exact("ERROR")]);
        let scan = set.scan(b"ERROR: nope\r\n> ", false);
        assert_eq!(found_index(scan), 1);
    }

    #[test]
    fn test_tie_goes_to_lower_index() {
        let set = set(&[
            Pattern::regex(r"ERROR[^\r\n]*?does not exist").unwrap(),
            Pattern::regex(r"ERROR[^\r\n]*\r?\n").unwrap(),
            Pattern::exact(">"),
        ]);
        let scan = set.scan(b"ERROR: \"socket.2\" does not exist\r\n> ", false);
        assert_eq!(found_index(scan), 0);
    }

    #[test]
    fn test_pending_without_match() {
        let set = set(&[Pattern::exact("password:")]);
        assert_eq!(set.scan(b"Enter pass", false), Scan::Pending);
    }

    #[test]
    fn test_eof_without_match() {
        let set = set(&[Pattern::exact("password:"), Pattern::Eof]);
        assert_eq!(set.scan(b"Enter pass", true), Scan::Eof);
        assert_eq!(set.eof_index(), Some(1));
    }

    #[test]
    fn test_partial_prefix_holds_back_later_match() {
        let set = set(&[Pattern::exact("abcd"), Pattern::exact("c")]);
        // "abc" may still become "abcd", which would start earlier than "c"
        assert_eq!(set.scan(b"xabc", false), Scan::Pending);
        assert_eq!(found_index(set.scan(b"xabcd", false)), 0);
        // At end of input the pending prefix can no longer complete
        assert_eq!(found_index(set.scan(b"xabc", true)), 1);
    }

    #[test]
    fn test_unfinished_error_line_holds_back_prompt() {
        let set = set(&[
            Pattern::regex(r"ERROR[^\r\n]*?does not exist").unwrap(),
            Pattern::regex(r"ERROR[^\r\n]*\r?\n").unwrap(),
            Pattern::exact(">"),
        ]);
        assert_eq!(set.scan(b"ERROR: value must be >", false), Scan::Pending);

        let done = set.scan(b"ERROR: value must be > 0\r\n> ", false);
        assert_eq!(found_index(done), 1);
    }

    #[test]
    fn test_finished_lines_do_not_hold_back_prompt() {
        let set = set(&[
            Pattern::regex(r"ERROR[^\r\n]*\r?\n").unwrap(),
            Pattern::exact(">"),
        ]);
        assert_eq!(found_index(set.scan(b"set port 7000\r\n> ", false)), 1);
        // Only an unfinished match that starts before the prompt counts
        assert_eq!(found_index(set.scan(b"> ERROR: late", false)), 1);
    }

    #[test]
    fn test_special_indices() {
        let set = set(&[Pattern::Timeout, Pattern::exact("x"), Pattern::Eof]);
        assert_eq!(set.timeout_index(), Some(0));
        assert_eq!(set.eof_index(), Some(2));
    }

    #[test]
    fn test_empty_exact_rejected() {
        assert!(PatternSet::new(&[Pattern::exact("")]).is_err());
    }

    proptest! {
        #[test]
        fn prop_earliest_then_lowest_index(
            window in "[ab]{0,40}",
            needles in prop::collection::vec("[ab]{1,4}", 1..6),
        ) {
            let patterns: Vec<Pattern> = needles.iter().map(Pattern::exact).collect();
            let set = set(&patterns);

            let expected = needles
                .iter()
                .enumerate()
                .filter_map(|(i, n)| window.find(n.as_str()).map(|start| (start, i)))
                .min();

            match (set.scan(window.as_bytes(), true), expected) {
                (Scan::Found { index, found }, Some((start, i))) => {
                    prop_assert_eq!(index, i);
                    prop_assert_eq!(found.start, start);
                    prop_assert_eq!(found.end, start + needles[i].len());
                }
                (Scan::Eof, None) => {}
                (scan, expected) => {
                    prop_assert!(false, "scan {:?} but expected {:?}", scan, expected);
                }
            }
        }
    }
}
