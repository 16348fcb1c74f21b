//! Error → corrective action rules.
//!
//! Automatons classify a recognized error into an [`ErrorCategory`] and ask
//! their [`RecoveryPolicy`] what to do. The session-driving loop only
//! executes the returned [`RecoveryAction`]; the rules themselves live here
//! so each program's recovery can be swapped or tested on its own.

use std::fmt;

/// A recognized condition reported by the child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A command referenced an item that does not exist yet.
    ///
    /// `item` is the base name to add, when it could be extracted from the
    /// error text.
    MissingItem {
        /// Base name of the missing item
        item: Option<String>,
    },
    /// Any other error line after a command.
    CommandFailed,
    /// Error while saving the configuration.
    SaveFailed,
    /// A yes/no "continue?" question.
    ContinuePrompt,
    /// The child exited right after receiving the password.
    EndOfInputAfterPassword,
}

/// State the decision may depend on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryContext {
    /// Recognized errors already seen for the current command (config
    /// editor) or during the whole run (installer).
    pub prior_errors: usize,
    /// Abort on errors instead of pressing on.
    pub strict: bool,
}

/// What the automaton should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Re-issue the failed command unchanged.
    Retry,
    /// Send a corrective line, then re-issue the failed command.
    SendAndRetry(String),
    /// Answer the prompt with this line and carry on.
    Reply(String),
    /// Give up with this diagnostic.
    Abort(String),
}

/// Maps recognized errors to corrective actions.
pub trait RecoveryPolicy: fmt::Debug + Send + Sync {
    /// Decide what to do about `category`.
    fn decide(&self, category: &ErrorCategory, context: &RecoveryContext) -> RecoveryAction;
}

const ADD_FAILED: &str = "ERROR: unable to automatically add new item, file a bug";
const COMMAND_FAILED: &str = "ERROR: unspecified error running a command";
const SAVE_FAILED: &str = "ERROR: unexpected error saving configuration";
const BAD_PASSWORD: &str =
    "The program exited right after the password was sent; it does not report bad passwords";

/// Add-the-missing-item-then-retry-once rules of the config editor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigEditorPolicy;

impl RecoveryPolicy for ConfigEditorPolicy {
    fn decide(&self, category: &ErrorCategory, context: &RecoveryContext) -> RecoveryAction {
        match category {
            ErrorCategory::MissingItem { item: Some(item) } if context.prior_errors == 0 => {
                RecoveryAction::SendAndRetry(format!("add {item}"))
            }
            ErrorCategory::MissingItem { .. } => RecoveryAction::Abort(ADD_FAILED.to_string()),
            ErrorCategory::SaveFailed => RecoveryAction::Abort(SAVE_FAILED.to_string()),
            ErrorCategory::EndOfInputAfterPassword => {
                RecoveryAction::Abort(BAD_PASSWORD.to_string())
            }
            ErrorCategory::CommandFailed | ErrorCategory::ContinuePrompt => {
                RecoveryAction::Abort(COMMAND_FAILED.to_string())
            }
        }
    }
}

/// Yes/no answering and bad-password heuristic of the silent installer.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallerPolicy;

impl RecoveryPolicy for InstallerPolicy {
    fn decide(&self, category: &ErrorCategory, context: &RecoveryContext) -> RecoveryAction {
        match category {
            ErrorCategory::ContinuePrompt if context.strict && context.prior_errors > 0 => {
                RecoveryAction::Reply("n".to_string())
            }
            ErrorCategory::ContinuePrompt => RecoveryAction::Reply("y".to_string()),
            ErrorCategory::EndOfInputAfterPassword => {
                RecoveryAction::Abort(BAD_PASSWORD.to_string())
            }
            ErrorCategory::MissingItem { .. } | ErrorCategory::CommandFailed => {
                RecoveryAction::Abort(COMMAND_FAILED.to_string())
            }
            ErrorCategory::SaveFailed => RecoveryAction::Abort(SAVE_FAILED.to_string()),
        }
    }
}

/// Base name of the item named in a "does not exist" error.
///
/// The name is the first double-quoted token, cut at its first `.`:
/// `ERROR: "socket.2" does not exist` yields `socket`.
pub fn missing_item_name(error_text: &str) -> Option<String> {
    let quoted = error_text.split('"').nth(1)?;
    let base = quoted.split('.').next()?.trim();
    (!base.is_empty()).then(|| base.to_string())
}
