//! Run reports - per-unit results and the aggregate outcome of one run.

use serde::Serialize;

use connectors::ExecOutput;

use crate::unit::Unit;

/// Outcome of one dispatched operation.
///
/// Immutable once attached to a [`UnitResult`]; `status` is derived by the
/// engine (default rule or the unit's failure condition) before attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub status: bool,
}

impl OpResult {
    /// Result of a command that ran to completion. Status starts from the
    /// default rule; the engine may overwrite it from a failure condition.
    pub fn from_output(output: ExecOutput) -> Self {
        let status = output.exit_code == 0 && output.stderr.is_empty();
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            status,
        }
    }

    /// An operation judged failed before or during execution.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
            exit_code: 1,
            status: false,
        }
    }

    /// The explicit no-op result for units with no recognized operation.
    pub fn noop() -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
            status: true,
        }
    }
}

/// One unit paired with what happened when it ran.
#[derive(Debug, Clone, Serialize)]
pub struct UnitResult {
    pub unit: Unit,
    pub result: OpResult,
}

/// Ordered results of one run.
///
/// Result order always equals unit order; `status` is true iff every unit
/// succeeded. Owned by a single engine invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub results: Vec<UnitResult>,
    pub status: bool,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            results: Vec::new(),
            status: true,
        }
    }

    /// Append a unit's result, folding its status into the aggregate.
    pub fn push(&mut self, unit: Unit, result: OpResult) {
        self.status = self.status && result.status;
        self.results.push(UnitResult { unit, result });
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}
