//! Automaton for a password-protected configuration tool run from bash.
//!
//! The tool announces a log file, may ask for a password and to initialize a
//! new configuration, then reads commands at a `>` prompt. It understands
//! `add <item>`, `save`, `print config` and `exit`.

use super::{check_exit_status, ensure_target, give_up, Outcome, CURRENT_SETTINGS, LOGFILE};
use crate::config::Settings;
use crate::pattern::Pattern;
use crate::recovery::{
    missing_item_name, ConfigEditorPolicy, ErrorCategory, RecoveryAction, RecoveryContext,
    RecoveryPolicy,
};
use crate::result::{AutomationError, ExpectResult, PatternError, StepContext};
use crate::session::{Interact, Session};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Sets a prompt that program output cannot be mistaken for.
const SET_PROMPT: &str = r"PS1=[PROMPTDRIVER]\$";
const STATUS_COMMAND: &str = "echo $?";
const SHELL_EXIT: &str = "exit 0";

/// Steps of a config editor run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    AwaitShellPrompt,
    StartingProgram,
    AwaitLogfileAnnounce,
    AwaitAuthChallenge,
    AwaitReadyPrompt,
    ConfirmNewConfig,
    RunCommands,
    Save,
    PrintConfig,
    ExitProgram,
    AwaitShellReturn,
    VerifyExitCode,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::AwaitShellPrompt => "shell prompt",
            Stage::StartingProgram => "program start",
            Stage::AwaitLogfileAnnounce => "logfile announcement",
            Stage::AwaitAuthChallenge => "password or ready prompt",
            Stage::AwaitReadyPrompt => "ready prompt",
            Stage::ConfirmNewConfig => "new config confirmation",
            Stage::RunCommands => "command",
            Stage::Save => "save",
            Stage::PrintConfig => "print config",
            Stage::ExitProgram => "program exit",
            Stage::AwaitShellReturn => "shell prompt after exit",
            Stage::VerifyExitCode => "exit status",
            Stage::Done => "shell exit",
        };
        f.write_str(name)
    }
}

impl Stage {
    /// Step name used in error messages.
    ///
    /// Steps inside the program all wait for one of its prompts.
    fn waiting_for(self) -> String {
        match self {
            Stage::AwaitReadyPrompt
            | Stage::ConfirmNewConfig
            | Stage::RunCommands
            | Stage::Save
            | Stage::PrintConfig
            | Stage::ExitProgram => format!("a prompt in the program ({self})"),
            _ => self.to_string(),
        }
    }
}

/// Compiled prompt grammar of the tool and the wrapping shell.
struct Prompts {
    shell: Pattern,
    logfile: Pattern,
    password: Pattern,
    new_config: Pattern,
    ready: Pattern,
    missing_item: Pattern,
    error: Pattern,
    no_changes: Pattern,
    print_echo: Pattern,
}

impl Prompts {
    fn new() -> Result<Self, PatternError> {
        Ok(Self {
            shell: Pattern::regex(r"\[PROMPTDRIVER\][$#]")?,
            logfile: Pattern::regex(r"Logfile:\s*(\S+?/\S+?\.log)")?,
            password: Pattern::regex(r"Enter password:")?,
            new_config: Pattern::regex(r"Initialize New Config\?")?,
            ready: Pattern::exact(">"),
            missing_item: Pattern::regex(r"ERROR[^\r\n]*?does not exist")?,
            error: Pattern::regex(r"ERROR[^\r\n]*\r?\n")?,
            no_changes: Pattern::exact("No changes made"),
            print_echo: Pattern::exact("print config"),
        })
    }
}

/// Drives the config tool through bash: authenticate, run commands with
/// automatic creation of missing items, save, dump the configuration and
/// verify the tool's exit status.
///
/// # Examples
///
/// ```no_run
/// use promptdriver::program::ConfigEditor;
/// use secrecy::SecretString;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let outcome = ConfigEditor::new("/opt/tool/cfg", SecretString::from("hunter2"))
///     .commands(["set minheap 1024m", "set port 7000"])
///     .run()
///     .await?;
/// println!("{}", outcome.output("current_settings").unwrap_or_default());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigEditor {
    path: String,
    options: String,
    commands: Vec<String>,
    password: SecretString,
    timeout: Option<Duration>,
    settings: Settings,
    policy: Box<dyn RecoveryPolicy>,
}

impl ConfigEditor {
    /// Editor for the tool at `path` with no commands or options.
    pub fn new(path: impl Into<String>, password: SecretString) -> Self {
        Self {
            path: path.into(),
            options: String::new(),
            commands: Vec::new(),
            password,
            timeout: None,
            settings: Settings::default(),
            policy: Box::new(ConfigEditorPolicy),
        }
    }

    /// Commands to run, in order.
    pub fn commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands = commands.into_iter().map(Into::into).collect();
        self
    }

    /// Extra arguments appended to the tool's command line.
    pub fn options(mut self, options: impl Into<String>) -> Self {
        self.options = options.into();
        self
    }

    /// Budget of the long-running steps; overrides `Settings::timeout_secs`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Use `settings` for the remaining budgets and the shell.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the default add-then-retry policy.
    pub fn with_policy(mut self, policy: impl RecoveryPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    fn main_timeout(&self) -> Duration {
        self.timeout
            .unwrap_or_else(|| self.settings.timeout_or(DEFAULT_TIMEOUT))
    }

    /// Spawn the shell and run the tool in it.
    pub async fn run(&self) -> Result<Outcome, AutomationError> {
        ensure_target(&self.path)?;
        let mut session = Session::builder()
            .timeout(self.main_timeout())
            .max_buffer_size(self.settings.max_buffer_size)
            .strip_ansi(true)
            .env("TERM", "dumb")
            .spawn(&self.settings.shell)
            .waiting_for("shell start")?;
        self.run_on(&mut session).await
    }

    /// Run the tool through an already started shell session.
    ///
    /// The session is closed before returning, whatever the result.
    pub async fn run_on<S: Interact>(&self, session: &mut S) -> Result<Outcome, AutomationError> {
        let result = self.drive(session).await;
        session.close();
        match &result {
            Ok(outcome) => info!(path = %self.path, changed = outcome.changed, "config editor finished"),
            Err(e) => warn!(path = %self.path, kind = ?e.kind(), error = %e, "config editor failed"),
        }
        result
    }

    async fn drive<S: Interact>(&self, session: &mut S) -> Result<Outcome, AutomationError> {
        let p = Prompts::new()?;
        let startup = self.settings.startup_timeout();
        let timeout = self.main_timeout();
        let final_timeout = self.settings.final_timeout();

        enter(Stage::AwaitShellPrompt);
        send(session, SET_PROMPT, Stage::AwaitShellPrompt).await?;
        expect(session, &[p.shell.clone()], startup, Stage::AwaitShellPrompt).await?;

        enter(Stage::StartingProgram);
        let command_line = match self.options.trim() {
            "" => self.path.clone(),
            options => format!("{} {options}", self.path),
        };
        send(session, &command_line, Stage::StartingProgram).await?;

        enter(Stage::AwaitLogfileAnnounce);
        let announce =
            expect(session, &[p.logfile.clone()], startup, Stage::AwaitLogfileAnnounce).await?;
        let logfile = announce.capture(1).unwrap_or_default().to_string();
        debug!(logfile = %logfile, "program announced its log file");

        enter(Stage::AwaitAuthChallenge);
        let auth = [p.password.clone(), p.new_config.clone(), p.ready.clone()];
        let mut prompt = expect(session, &auth, startup, Stage::AwaitAuthChallenge)
            .await?
            .pattern_index;
        if prompt == 0 {
            enter(Stage::AwaitReadyPrompt);
            debug!(password = "<redacted>", "sending password");
            session
                .send_line(self.password.expose_secret())
                .await
                .waiting_for(&Stage::AwaitReadyPrompt.waiting_for())?;
            let ready = [p.new_config.clone(), p.ready.clone()];
            prompt = 1 + expect(session, &ready, timeout, Stage::AwaitReadyPrompt)
                .await?
                .pattern_index;
        } else {
            debug!("no password requested");
        }

        let mut changed = false;
        if prompt == 1 {
            enter(Stage::ConfirmNewConfig);
            send(session, "y", Stage::ConfirmNewConfig).await?;
            expect(session, &[p.ready.clone()], timeout, Stage::ConfirmNewConfig).await?;
            changed = true;
        }

        enter(Stage::RunCommands);
        for command in &self.commands {
            self.run_command(session, &p, command, timeout).await?;
        }

        if !self.commands.is_empty() {
            enter(Stage::Save);
            changed |= self.save(session, &p, final_timeout).await?;
        }

        enter(Stage::PrintConfig);
        send(session, "print config", Stage::PrintConfig).await?;
        expect(session, &[p.print_echo.clone()], final_timeout, Stage::PrintConfig).await?;
        let dump = expect(session, &[p.ready.clone()], final_timeout, Stage::PrintConfig).await?;
        let current_settings = dump.before.trim().to_string();

        enter(Stage::ExitProgram);
        send(session, "exit", Stage::ExitProgram).await?;

        enter(Stage::AwaitShellReturn);
        expect(session, &[p.shell.clone()], final_timeout, Stage::AwaitShellReturn).await?;

        enter(Stage::VerifyExitCode);
        send(session, STATUS_COMMAND, Stage::VerifyExitCode).await?;
        let status = expect(session, &[p.shell.clone()], final_timeout, Stage::VerifyExitCode).await?;
        let exit_code = check_exit_status(&status.before, STATUS_COMMAND)?;

        enter(Stage::Done);
        self.unwind(session, &p, final_timeout).await?;

        Ok(Outcome {
            changed,
            outputs: [
                (CURRENT_SETTINGS.to_string(), current_settings),
                (LOGFILE.to_string(), logfile),
            ]
            .into(),
            errors_found: None,
            exit_code: Some(exit_code),
        })
    }

    /// Send one command, recovering at most once from a recognized error.
    async fn run_command<S: Interact>(
        &self,
        session: &mut S,
        p: &Prompts,
        command: &str,
        timeout: Duration,
    ) -> Result<(), AutomationError> {
        let stage = Stage::RunCommands;
        let replies = [p.missing_item.clone(), p.error.clone(), p.ready.clone()];
        let mut corrected = false;

        loop {
            debug!(command, "sending command");
            send(session, command, stage).await?;
            let reply = expect(session, &replies, timeout, stage).await?;
            let category = match reply.pattern_index {
                0 => ErrorCategory::MissingItem {
                    item: missing_item_name(&reply.matched),
                },
                1 => ErrorCategory::CommandFailed,
                _ => return Ok(()),
            };

            let context = RecoveryContext {
                prior_errors: usize::from(corrected),
                strict: false,
            };
            let action = self.policy.decide(&category, &context);
            if corrected {
                return Err(give_up(action, &reply.matched));
            }

            let corrective = match action {
                RecoveryAction::Retry => None,
                RecoveryAction::SendAndRetry(line) => Some((line, true)),
                RecoveryAction::Reply(line) => Some((line, false)),
                abort @ RecoveryAction::Abort(_) => return Err(give_up(abort, &reply.matched)),
            };
            warn!(command, error = %reply.matched.trim(), ?corrective, "recovering from command error");

            // The prompt printed after the error belongs to the failed command
            expect(session, &[p.ready.clone()], timeout, stage).await?;

            if let Some((line, retry)) = corrective {
                send(session, &line, stage).await?;
                let ack = expect(session, &[p.error.clone(), p.ready.clone()], timeout, stage).await?;
                if ack.pattern_index == 0 {
                    let context = RecoveryContext {
                        prior_errors: 1,
                        strict: false,
                    };
                    return Err(give_up(self.policy.decide(&category, &context), &ack.matched));
                }
                if !retry {
                    return Ok(());
                }
            }
            corrected = true;
        }
    }

    /// Save the configuration; returns whether anything changed.
    async fn save<S: Interact>(
        &self,
        session: &mut S,
        p: &Prompts,
        timeout: Duration,
    ) -> Result<bool, AutomationError> {
        send(session, "save", Stage::Save).await?;
        let replies = [p.no_changes.clone(), p.error.clone(), p.ready.clone()];
        let mut changed = true;
        loop {
            let reply = expect(session, &replies, timeout, Stage::Save).await?;
            match reply.pattern_index {
                0 => changed = false,
                1 => {
                    let action = self
                        .policy
                        .decide(&ErrorCategory::SaveFailed, &RecoveryContext::default());
                    return Err(give_up(action, &reply.matched));
                }
                _ => return Ok(changed),
            }
        }
    }

    /// Exit the shell, and any shell nested in it, until end of input.
    async fn unwind<S: Interact>(
        &self,
        session: &mut S,
        p: &Prompts,
        timeout: Duration,
    ) -> Result<(), AutomationError> {
        let stage = Stage::Done;
        let alternatives = [p.shell.clone(), Pattern::Eof];
        for depth in 0..self.settings.max_unwind {
            send(session, SHELL_EXIT, stage).await?;
            if expect(session, &alternatives, timeout, stage).await?.pattern_index == 1 {
                debug!(depth, "shell exited");
                return Ok(());
            }
        }
        Err(AutomationError::Timeout {
            waiting_for: format!("{stage} after {} nested exits", self.settings.max_unwind),
            duration: timeout,
        })
    }
}

fn enter(stage: Stage) {
    debug!(%stage, "config editor stage");
}

async fn send<S: Interact>(session: &mut S, line: &str, stage: Stage) -> Result<(), AutomationError> {
    session.send_line(line).await.waiting_for(&stage.waiting_for())
}

async fn expect<S: Interact>(
    session: &mut S,
    patterns: &[Pattern],
    timeout: Duration,
    stage: Stage,
) -> Result<ExpectResult, AutomationError> {
    session
        .expect_within(patterns, timeout)
        .await
        .waiting_for(&stage.waiting_for())
}
