//! Scripted automatons for specific interactive programs.
//!
//! Each automaton is a fixed sequence of send/expect steps written against
//! the [`Interact`](crate::Interact) seam, consults a
//! [`RecoveryPolicy`](crate::recovery::RecoveryPolicy) when the child reports
//! a recognized error, and produces exactly one [`Outcome`] or one
//! [`AutomationError`].

mod config_editor;
mod installer;

pub use config_editor::ConfigEditor;
pub use installer::{FailureMode, ParseFailureModeError, SilentInstaller};

use crate::recovery::RecoveryAction;
use crate::result::AutomationError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Output key: final configuration dump of the config editor.
pub const CURRENT_SETTINGS: &str = "current_settings";
/// Output key: log file announced by the program.
pub const LOGFILE: &str = "logfile";
/// Output key: installer transcript, or its "already installed" line.
pub const SCRIPT_OUTPUT: &str = "script_output";

/// Result of a successful automaton run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Outcome {
    /// Whether the run modified the target system.
    pub changed: bool,
    /// Named text captured during the run.
    pub outputs: BTreeMap<String, String>,
    /// Recognized error lines encountered without aborting (installer only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors_found: Option<Vec<String>>,
    /// Exit code of the target program, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl Outcome {
    /// Captured output `key`, if any.
    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).map(String::as_str)
    }
}

/// Verify the status printed by `echo $?`.
///
/// `echoed` is the text between the status command and the next shell
/// prompt. The first non-blank line that is not the echoed command itself
/// is the status token; anything but `0` is a failure carrying that token.
pub fn check_exit_status(echoed: &str, command: &str) -> Result<i32, AutomationError> {
    let code = echoed
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && *line != command)
        .unwrap_or_default();

    if code != "0" {
        return Err(AutomationError::NonZeroExit {
            code: code.to_string(),
        });
    }
    Ok(0)
}

fn ensure_target(path: &str) -> Result<(), AutomationError> {
    if Path::new(path).exists() {
        Ok(())
    } else {
        Err(AutomationError::TargetNotFound(path.to_string()))
    }
}

/// Turn a policy action that cannot be carried out into the fatal error.
fn give_up(action: RecoveryAction, raw: &str) -> AutomationError {
    let reason = match action {
        RecoveryAction::Abort(reason) => reason,
        _ => "ERROR: corrective attempt limit reached".to_string(),
    };
    AutomationError::Unrecoverable {
        reason,
        raw: raw.trim().to_string(),
    }
}
