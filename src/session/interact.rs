//! The send/expect seam automatons are written against.

use super::Session;
use crate::pattern::Pattern;
use crate::result::{ExpectError, ExpectResult};
use std::future::Future;
use std::time::Duration;

/// A byte stream an automaton can drive with sends and expectations.
///
/// Implemented by [`Session`] for real children and by the scripted mock
/// session used in tests.
pub trait Interact: Send {
    /// Write `line` followed by a line terminator.
    fn send_line(&mut self, line: &str) -> impl Future<Output = Result<(), ExpectError>> + Send;

    /// Wait at most `timeout` for one of `patterns`.
    fn expect_within(
        &mut self,
        patterns: &[Pattern],
        timeout: Duration,
    ) -> impl Future<Output = Result<ExpectResult, ExpectError>> + Send;

    /// Full output captured so far (empty when capture is off).
    fn transcript(&self) -> String;

    /// Exit code of the child once it has terminated, waiting up to `grace`.
    fn wait_exit(&mut self, grace: Duration) -> impl Future<Output = Option<u32>> + Send;

    /// Terminate and release. Idempotent, never fails.
    fn close(&mut self);
}

impl Interact for Session {
    async fn send_line(&mut self, line: &str) -> Result<(), ExpectError> {
        Session::send_line(self, line).await
    }

    async fn expect_within(
        &mut self,
        patterns: &[Pattern],
        timeout: Duration,
    ) -> Result<ExpectResult, ExpectError> {
        self.expect_any_within(patterns, timeout).await
    }

    fn transcript(&self) -> String {
        Session::transcript(self).unwrap_or_default()
    }

    async fn wait_exit(&mut self, grace: Duration) -> Option<u32> {
        Session::wait_exit(self, grace).await
    }

    fn close(&mut self) {
        Session::close(self);
    }
}
