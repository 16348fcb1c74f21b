//! Automaton for a silent installer that asks for a password, then runs on
//! its own except for occasional yes/no questions.

use super::{ensure_target, give_up, Outcome, LOGFILE, SCRIPT_OUTPUT};
use crate::config::Settings;
use crate::pattern::Pattern;
use crate::recovery::{ErrorCategory, InstallerPolicy, RecoveryAction, RecoveryContext, RecoveryPolicy};
use crate::result::{AutomationError, ExpectError, PatternError, StepContext};
use crate::session::{Interact, Session};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Replaces the target when the child should exit before any prompt.
const EARLY_EXIT_COMMAND: (&str, &[&str]) = ("/bin/bash", &["-c", "exit 0"]);

/// A pattern the installer never prints.
const NEVER_PRINTED: &str = "bad expect this will cause a timeout";

/// Grace period for the exit status once output has ended.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// Deliberate failure injected into a run, for demos and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureMode {
    /// Send an empty password.
    #[serde(alias = "password", alias = "induce-bad-password")]
    BadPassword,
    /// Wait for text that never appears at the first continuation prompt.
    #[serde(alias = "induce-timeout")]
    Timeout,
    /// Answer "no" once an error has been seen.
    #[serde(alias = "error_abort", alias = "induce-abort-on-error")]
    AbortOnError,
    /// Run a program that exits immediately instead of the installer.
    #[serde(alias = "die_early", alias = "induce-early-exit")]
    EarlyExit,
}

impl FailureMode {
    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureMode::BadPassword => "bad-password",
            FailureMode::Timeout => "timeout",
            FailureMode::AbortOnError => "abort-on-error",
            FailureMode::EarlyExit => "early-exit",
        }
    }
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized failure mode name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown failure mode '{0}' (expected bad-password, timeout, abort-on-error or early-exit)")]
pub struct ParseFailureModeError(String);

impl FromStr for FailureMode {
    type Err = ParseFailureModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        let name = name.strip_prefix("induce-").unwrap_or(&name);
        match name {
            "bad-password" | "password" => Ok(FailureMode::BadPassword),
            "timeout" => Ok(FailureMode::Timeout),
            "abort-on-error" | "error_abort" => Ok(FailureMode::AbortOnError),
            "early-exit" | "die_early" => Ok(FailureMode::EarlyExit),
            _ => Err(ParseFailureModeError(s.to_string())),
        }
    }
}

struct Prompts {
    password: Pattern,
    already_installed: Pattern,
    error_line: Pattern,
    continue_prompt: Pattern,
    logfile: Pattern,
    fatal: Pattern,
}

impl Prompts {
    fn new() -> Result<Self, PatternError> {
        Ok(Self {
            password: Pattern::exact("Please enter your password"),
            already_installed: Pattern::regex(r"(?i)software already installed[^\r\n]*")?,
            error_line: Pattern::regex(r"ERROR:[^\r\n]*\r\n")?,
            continue_prompt: Pattern::regex(r"(?i)do you wish to continue")?,
            logfile: Pattern::regex(r"(?i)log file:[^\r\n]*\r\n")?,
            fatal: Pattern::exact("FATAL ERROR"),
        })
    }
}

/// Drives a silent installer: password, bad-password probe, then a loop
/// that collects error lines and the log file and answers continuation
/// questions until the installer exits.
///
/// ```no_run
/// use promptdriver::program::SilentInstaller;
/// use secrecy::SecretString;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let outcome = SilentInstaller::new("/opt/vendor/install.sh", SecretString::from("hunter2"))
///     .strict(true)
///     .run()
///     .await?;
/// println!("exit code {:?}", outcome.exit_code);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SilentInstaller {
    path: String,
    password: SecretString,
    timeout: Option<Duration>,
    strict: bool,
    failure_mode: Option<FailureMode>,
    settings: Settings,
    policy: Box<dyn RecoveryPolicy>,
}

impl SilentInstaller {
    /// Installer at `path`.
    pub fn new(path: impl Into<String>, password: SecretString) -> Self {
        Self {
            path: path.into(),
            password,
            timeout: None,
            strict: false,
            failure_mode: None,
            settings: Settings::default(),
            policy: Box::new(InstallerPolicy),
        }
    }

    /// Budget of the main loop; overrides `Settings::timeout_secs`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Answer "no" to continuation questions once an error was seen.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Inject a deliberate failure.
    pub fn failure_mode(mut self, mode: Option<FailureMode>) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Use `settings` for the startup and probe budgets.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the default yes/no policy.
    pub fn with_policy(mut self, policy: impl RecoveryPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    fn main_timeout(&self) -> Duration {
        self.timeout
            .unwrap_or_else(|| self.settings.timeout_or(DEFAULT_TIMEOUT))
    }

    fn is_strict(&self) -> bool {
        self.strict || self.failure_mode == Some(FailureMode::AbortOnError)
    }

    /// Spawn the installer and drive it to completion.
    pub async fn run(&self) -> Result<Outcome, AutomationError> {
        ensure_target(&self.path)?;
        let builder = Session::builder()
            .timeout(self.main_timeout())
            .max_buffer_size(self.settings.max_buffer_size)
            .capture_transcript(true);

        let spawned = if self.failure_mode == Some(FailureMode::EarlyExit) {
            warn!("early-exit mode: running a program that exits immediately");
            let (program, args) = EARLY_EXIT_COMMAND;
            builder.spawn_program(program, args)
        } else {
            builder.spawn_program::<&str>(&self.path, &[])
        };
        let mut session = spawned.waiting_for("installer start")?;
        self.run_on(&mut session).await
    }

    /// Drive an already started installer session.
    ///
    /// The session is closed before returning, whatever the result.
    pub async fn run_on<S: Interact>(&self, session: &mut S) -> Result<Outcome, AutomationError> {
        let result = self.drive(session).await;
        session.close();
        match &result {
            Ok(outcome) => info!(
                path = %self.path,
                changed = outcome.changed,
                exit_code = ?outcome.exit_code,
                "installer finished"
            ),
            Err(e) => warn!(path = %self.path, kind = ?e.kind(), error = %e, "installer failed"),
        }
        result
    }

    async fn drive<S: Interact>(&self, session: &mut S) -> Result<Outcome, AutomationError> {
        let p = Prompts::new()?;
        let timeout = self.main_timeout();
        let strict = self.is_strict();
        if let Some(mode) = self.failure_mode {
            warn!(%mode, "forced failure mode");
        }

        let first = session
            .expect_within(
                &[p.password.clone(), p.already_installed.clone()],
                self.settings.startup_timeout(),
            )
            .await
            .waiting_for("password prompt")?;
        if first.pattern_index == 1 {
            info!("software already installed");
            session.close();
            let exit_code = session.wait_exit(EXIT_GRACE).await.map(to_exit_code);
            return Ok(Outcome {
                changed: false,
                outputs: [(SCRIPT_OUTPUT.to_string(), first.matched.trim().to_string())].into(),
                errors_found: Some(Vec::new()),
                exit_code,
            });
        }

        if self.failure_mode == Some(FailureMode::BadPassword) {
            debug!("sending empty password");
            session.send_line("").await.waiting_for("password prompt")?;
        } else {
            debug!(password = "<redacted>", "sending password");
            session
                .send_line(self.password.expose_secret())
                .await
                .waiting_for("password prompt")?;
        }

        // A timeout here is the healthy path; end of input means rejection.
        match session.expect_within(&[Pattern::Eof], self.settings.probe()).await {
            Ok(exited) => {
                let action = self.policy.decide(
                    &ErrorCategory::EndOfInputAfterPassword,
                    &RecoveryContext {
                        prior_errors: 0,
                        strict,
                    },
                );
                return Err(give_up(action, &exited.before));
            }
            Err(ExpectError::Timeout { .. }) => debug!("password accepted"),
            Err(e) => return Err(AutomationError::at_step(e, "password probe")),
        }

        let alternatives = [
            p.error_line.clone(),
            p.continue_prompt.clone(),
            p.logfile.clone(),
            p.fatal.clone(),
            Pattern::Eof,
        ];
        let mut errors_found = Vec::new();
        let mut logfile = None;
        let mut program_failed = false;

        loop {
            let found = session
                .expect_within(&alternatives, timeout)
                .await
                .waiting_for("installer output")?;
            match found.pattern_index {
                0 => {
                    let line = found.matched.trim().to_string();
                    warn!(error = %line, "installer reported an error");
                    errors_found.push(line);
                }
                1 => {
                    if self.failure_mode == Some(FailureMode::Timeout) {
                        session
                            .expect_within(&[Pattern::exact(NEVER_PRINTED)], timeout)
                            .await
                            .waiting_for("continuation answer")?;
                    }
                    let context = RecoveryContext {
                        prior_errors: errors_found.len(),
                        strict,
                    };
                    match self.policy.decide(&ErrorCategory::ContinuePrompt, &context) {
                        RecoveryAction::Reply(answer) => {
                            debug!(answer = %answer, errors = errors_found.len(), "answering continuation prompt");
                            session
                                .send_line(&answer)
                                .await
                                .waiting_for("continuation prompt")?;
                        }
                        other => return Err(give_up(other, &found.matched)),
                    }
                }
                2 => {
                    logfile = found.matched.split_whitespace().last().map(str::to_string);
                    debug!(logfile = ?logfile, "installer announced its log file");
                }
                3 => {
                    warn!("installer reported a fatal error");
                    program_failed = true;
                }
                _ => break,
            }
        }

        let transcript = session.transcript();
        let exit_code = session.wait_exit(EXIT_GRACE).await.map(to_exit_code);
        if program_failed {
            return Err(AutomationError::ProgramFailed { transcript });
        }

        let mut outputs = BTreeMap::from([(SCRIPT_OUTPUT.to_string(), transcript)]);
        if let Some(logfile) = logfile {
            outputs.insert(LOGFILE.to_string(), logfile);
        }
        Ok(Outcome {
            changed: true,
            outputs,
            errors_found: Some(errors_found),
            exit_code,
        })
    }
}

fn to_exit_code(code: u32) -> i32 {
    i32::try_from(code).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSession;
    use crate::result::FailureKind;
    use tokio_test::{assert_err, assert_ok};

    const INSTALLER: &str = "/opt/vendor/install.sh";

    fn installer() -> SilentInstaller {
        SilentInstaller::new(INSTALLER, SecretString::from("hunter2"))
    }

    fn asking() -> MockSession {
        MockSession::new("Welcome\r\nPlease enter your password: ")
    }

    #[tokio::test]
    async fn test_already_installed_sends_no_password() {
        let mut session =
            MockSession::new("Checking...\r\nSoftware already installed at /opt/vendor\r\n");

        let outcome = assert_ok!(installer().run_on(&mut session).await);
        assert!(!outcome.changed);
        assert_eq!(
            outcome.output(SCRIPT_OUTPUT),
            Some("Software already installed at /opt/vendor")
        );
        assert!(session.sent().is_empty());
        assert!(session.close_count() >= 1);
    }

    #[tokio::test]
    async fn test_full_run_collects_errors_and_logfile() {
        let mut session = asking()
            .on(
                "hunter2",
                "\r\nInstalling\r\nERROR: optional component missing\r\nDo you wish to continue? ",
            )
            .on_eof("y", "y\r\nLog file: /var/log/vendor/install.log\r\nDone\r\n")
            .exit_code(0);

        let outcome = assert_ok!(installer().run_on(&mut session).await);
        assert!(outcome.changed);
        assert_eq!(
            outcome.errors_found,
            Some(vec!["ERROR: optional component missing".to_string()])
        );
        assert_eq!(outcome.output(LOGFILE), Some("/var/log/vendor/install.log"));
        assert!(outcome.output(SCRIPT_OUTPUT).unwrap().contains("Done"));
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(session.close_count(), 1);
    }

    #[tokio::test]
    async fn test_exit_right_after_password_means_bad_password() {
        let mut session = asking().on_eof("hunter2", "\r\n");

        let err = assert_err!(installer().run_on(&mut session).await);
        assert_eq!(err.kind(), FailureKind::Protocol);
        assert!(err.to_string().contains("password"));
        assert_eq!(session.close_count(), 1);
    }

    #[tokio::test]
    async fn test_bad_password_mode_sends_empty_line() {
        let mut session = asking().on_eof("", "\r\n");

        let err = assert_err!(
            installer()
                .failure_mode(Some(FailureMode::BadPassword))
                .run_on(&mut session)
                .await
        );
        assert_eq!(err.kind(), FailureKind::Protocol);
        assert_eq!(session.sent_count("hunter2"), 0);
    }

    #[tokio::test]
    async fn test_timeout_mode_fails_with_timeout() {
        let mut session = asking().on("hunter2", "\r\nDo you wish to continue? ");

        let err = assert_err!(
            installer()
                .failure_mode(Some(FailureMode::Timeout))
                .run_on(&mut session)
                .await
        );
        assert_eq!(err.kind(), FailureKind::Timeout);
        assert_eq!(session.sent_count("y"), 0);
        assert_eq!(session.close_count(), 1);
    }

    #[tokio::test]
    async fn test_strict_answers_no_after_error() {
        let mut session = asking()
            .on("hunter2", "\r\nERROR: disk almost full\r\nDo you wish to continue? ")
            .on_eof("n", "n\r\nAborted\r\n")
            .exit_code(1);

        let outcome = assert_ok!(installer().strict(true).run_on(&mut session).await);
        assert_eq!(session.sent_count("n"), 1);
        assert_eq!(session.sent_count("y"), 0);
        assert_eq!(outcome.exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_abort_on_error_mode_is_strict() {
        let mut session = asking()
            .on("hunter2", "\r\nERROR: disk almost full\r\nDo you wish to continue? ")
            .on_eof("n", "\r\n");

        assert_ok!(
            installer()
                .failure_mode(Some(FailureMode::AbortOnError))
                .run_on(&mut session)
                .await
        );
        assert_eq!(session.sent_count("n"), 1);
    }

    #[tokio::test]
    async fn test_fatal_error_fails_with_transcript() {
        // End of input must come after the probe, so put a question before it
        let mut session = asking()
            .on("hunter2", "\r\nDo you wish to continue? ")
            .on_eof("y", "\r\nFATAL ERROR: corrupt archive\r\n");

        let err = assert_err!(installer().run_on(&mut session).await);
        assert_eq!(err.kind(), FailureKind::ProgramFailed);
        assert!(err.to_string().contains("corrupt archive"));
    }

    #[tokio::test]
    async fn test_silent_installer_times_out() {
        let mut session = MockSession::new("Loading...");
        let err = assert_err!(installer().run_on(&mut session).await);
        assert_eq!(err.kind(), FailureKind::Timeout);
        assert!(err.to_string().contains("password prompt"));
    }

    #[test]
    fn test_failure_mode_names() {
        for (name, mode) in [
            ("bad-password", FailureMode::BadPassword),
            ("password", FailureMode::BadPassword),
            ("induce-bad-password", FailureMode::BadPassword),
            ("induce-timeout", FailureMode::Timeout),
            ("error_abort", FailureMode::AbortOnError),
            ("induce-abort-on-error", FailureMode::AbortOnError),
            ("die_early", FailureMode::EarlyExit),
            ("EARLY-EXIT", FailureMode::EarlyExit),
        ] {
            assert_eq!(name.parse::<FailureMode>(), Ok(mode), "{name}");
        }
        assert!("explode".parse::<FailureMode>().is_err());
        assert_eq!(FailureMode::AbortOnError.to_string(), "abort-on-error");
    }

    #[test]
    fn test_failure_mode_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: FailureMode,
        }
        let w: Wrapper = serde_json::from_str(r#"{"mode": "die_early"}"#).unwrap();
        assert_eq!(w.mode, FailureMode::EarlyExit);
    }
}
