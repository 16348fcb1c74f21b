//! Hands the result of a run to the caller.

use crate::program::Outcome;
use crate::result::AutomationError;
use serde_json::{json, Map, Value};
use std::io::{self, Write};

/// Receives the single outcome of an automaton run.
pub trait ResultReporter {
    /// Report a successful run.
    fn success(&mut self, outcome: &Outcome) -> io::Result<()>;

    /// Report a failed run.
    fn failure(&mut self, error: &AutomationError) -> io::Result<()>;

    /// Report whichever `result` holds; returns whether the run succeeded.
    fn report(&mut self, result: &Result<Outcome, AutomationError>) -> io::Result<bool> {
        match result {
            Ok(outcome) => self.success(outcome).map(|()| true),
            Err(error) => self.failure(error).map(|()| false),
        }
    }
}

/// Writes one JSON object per run, followed by a newline.
///
/// Success: `{"changed": .., "failed": false, <outputs>.., "return_code"?,
/// "errors_found"?}`. Failure: `{"changed": false, "failed": true, "kind":
/// .., "msg": ..}`.
#[derive(Debug)]
pub struct JsonReporter<W: Write> {
    writer: W,
}

impl<W: Write> JsonReporter<W> {
    /// Reporter writing to `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Give back the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn emit(&mut self, value: &Value) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, value)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

impl<W: Write> ResultReporter for JsonReporter<W> {
    fn success(&mut self, outcome: &Outcome) -> io::Result<()> {
        let mut object = Map::new();
        object.insert("changed".into(), outcome.changed.into());
        object.insert("failed".into(), false.into());
        for (key, value) in &outcome.outputs {
            object.insert(key.clone(), value.as_str().into());
        }
        if let Some(code) = outcome.exit_code {
            object.insert("return_code".into(), code.into());
        }
        if let Some(errors) = &outcome.errors_found {
            object.insert("errors_found".into(), errors.clone().into());
        }
        self.emit(&Value::Object(object))
    }

    fn failure(&mut self, error: &AutomationError) -> io::Result<()> {
        self.emit(&json!({
            "changed": false,
            "failed": true,
            "kind": error.kind(),
            "msg": error.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{CURRENT_SETTINGS, LOGFILE};

    fn written(reporter: JsonReporter<Vec<u8>>) -> Value {
        let bytes = reporter.into_inner();
        assert_eq!(bytes.last(), Some(&b'\n'));
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_success_flattens_outputs() {
        let outcome = Outcome {
            changed: true,
            outputs: [
                (CURRENT_SETTINGS.to_string(), "port=7000".to_string()),
                (LOGFILE.to_string(), "/tmp/cfg.log".to_string()),
            ]
            .into(),
            errors_found: None,
            exit_code: Some(0),
        };
        let mut reporter = JsonReporter::new(Vec::new());
        assert!(reporter.report(&Ok(outcome)).unwrap());

        assert_eq!(
            written(reporter),
            json!({
                "changed": true,
                "failed": false,
                "current_settings": "port=7000",
                "logfile": "/tmp/cfg.log",
                "return_code": 0,
            })
        );
    }

    #[test]
    fn test_success_with_errors_found() {
        let outcome = Outcome {
            errors_found: Some(vec!["ERROR: x".into()]),
            ..Default::default()
        };
        let mut reporter = JsonReporter::new(Vec::new());
        reporter.success(&outcome).unwrap();
        assert_eq!(written(reporter)["errors_found"], json!(["ERROR: x"]));
    }

    #[test]
    fn test_failure() {
        let error = AutomationError::NonZeroExit { code: "127".into() };
        let mut reporter = JsonReporter::new(Vec::new());
        assert!(!reporter.report(&Err(error)).unwrap());

        assert_eq!(
            written(reporter),
            json!({
                "changed": false,
                "failed": true,
                "kind": "non_zero_exit",
                "msg": "ERROR: The command returned a non-zero exit code! '127'",
            })
        );
    }
}
