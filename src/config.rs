//! Tunables shared by the automatons, optionally loaded from a TOML file.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading [`Settings`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// File that was requested
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`Settings`].
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is syntactically valid but unusable.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Timeouts and limits used when driving a program.
///
/// Every key is optional; missing keys take the defaults below and unknown
/// keys are rejected.
///
/// ```toml
/// timeout_secs = 300
/// startup_timeout_secs = 10
/// final_timeout_secs = 15
/// probe_secs = 2
/// shell = "/bin/bash --noprofile --norc"
/// max_unwind = 16
/// max_buffer_size = 65536
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Budget of the long-running steps; each automaton has its own default
    /// when this is unset.
    pub timeout_secs: Option<u64>,
    /// Budget of the first prompts after spawning.
    pub startup_timeout_secs: u64,
    /// Budget of the save/print/exit steps of the config editor.
    pub final_timeout_secs: u64,
    /// Window in which an exit right after the password means rejection.
    pub probe_secs: u64,
    /// Shell the config editor starts its program from.
    pub shell: String,
    /// Most `exit` commands sent while unwinding nested shells.
    pub max_unwind: usize,
    /// Search window size of each session in bytes.
    pub max_buffer_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            startup_timeout_secs: 10,
            final_timeout_secs: 15,
            probe_secs: 2,
            shell: "/bin/bash --noprofile --norc".to_string(),
            max_unwind: 16,
            max_buffer_size: 64 * 1024,
        }
    }
}

impl Settings {
    /// Read settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse settings from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if shlex::split(&self.shell).is_none_or(|parts| parts.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "shell is not a usable command line: {:?}",
                self.shell
            )));
        }
        if self.max_unwind == 0 {
            return Err(ConfigError::Invalid("max_unwind must be at least 1".into()));
        }
        if self.max_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "max_buffer_size must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Main timeout, falling back to `default` when unset.
    pub fn timeout_or(&self, default: Duration) -> Duration {
        self.timeout_secs.map(Duration::from_secs).unwrap_or(default)
    }

    /// Startup budget as a duration.
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// Final-step budget as a duration.
    pub fn final_timeout(&self) -> Duration {
        Duration::from_secs(self.final_timeout_secs)
    }

    /// Password probe window as a duration.
    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }
}
