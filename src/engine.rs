//! Sequential execution driver.
//!
//! The engine walks an ordered unit list one unit at a time: render
//! variables, parse the unit's failure condition if it carries one, dispatch
//! to the matching operator, decide pass/fail, record the result. Failed
//! units do not stop the run; only validation errors and the handful of
//! fatal operator conditions do.

use std::collections::HashMap;
use std::sync::Arc;

use connectors::Connector;

use crate::cond::Expr;
use crate::error::{Error, Result};
use crate::ops::{Operators, StreamChunk};
use crate::render::{self, Bindings};
use crate::report::{OpResult, RunReport};
use crate::unit::{Unit, UnitKind};

/// Callback receiving output chunks from streaming units as they arrive.
pub type ChunkListener = Box<dyn FnMut(&StreamChunk) + Send>;

/// Drives an ordered unit list against a set of connectors.
pub struct Engine {
    ops: Operators,
    listeners: Vec<ChunkListener>,
}

impl Engine {
    /// An engine executing against a single default connector.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            ops: Operators::new(connector),
            listeners: Vec::new(),
        }
    }

    /// An engine with additional named targets units can select via their
    /// `target` attribute.
    pub fn with_targets(
        connector: Arc<dyn Connector>,
        targets: HashMap<String, Arc<dyn Connector>>,
    ) -> Self {
        Self {
            ops: Operators::new(connector).with_targets(targets),
            listeners: Vec::new(),
        }
    }

    /// Subscribe to output chunks from streaming units. Listeners live for
    /// the engine's lifetime and see every chunk from every streamed unit.
    pub fn subscribe(&mut self, listener: ChunkListener) {
        self.listeners.push(listener);
    }

    /// The operator layer, for callers that launch background commands
    /// directly.
    pub fn operators_mut(&mut self) -> &mut Operators {
        &mut self.ops
    }

    /// Execute every unit in document order and aggregate the results.
    ///
    /// Units keep running after a failed result; only a missing variable,
    /// a malformed failure condition, a streamed command on a non-local
    /// target, or a failed file install aborts.
    pub fn run_all(&mut self, units: &[Unit], bindings: &Bindings) -> Result<RunReport> {
        self.run_span(units, bindings)
    }

    /// Execute exactly one unit by its position in `units`.
    ///
    /// The single entry in the returned report is identical to what
    /// [`run_all`](Self::run_all) would have produced at that index.
    pub fn run_one(
        &mut self,
        units: &[Unit],
        index: usize,
        bindings: &Bindings,
    ) -> Result<RunReport> {
        let Some(unit) = units.get(index) else {
            return Err(Error::NoSuchUnit {
                index,
                count: units.len(),
            });
        };
        self.run_span(std::slice::from_ref(unit), bindings)
    }

    /// Force-terminate every background process spawned during this run.
    pub fn tear_down(&mut self) {
        self.ops.tear_down();
    }

    fn run_span(&mut self, units: &[Unit], bindings: &Bindings) -> Result<RunReport> {
        let mut report = RunReport::new();
        for unit in units {
            let result = self.run_unit(unit, bindings)?;
            log::info!(
                "unit {} {}",
                unit.index,
                if result.status { "passed" } else { "failed" }
            );
            report.push(unit.clone(), result);
        }
        Ok(report)
    }

    fn run_unit(&mut self, unit: &Unit, bindings: &Bindings) -> Result<OpResult> {
        let content = render::render(unit, bindings)?;

        // Parse the failure condition before any side effect so a malformed
        // expression aborts instead of discarding a completed operation.
        let failed_when = unit
            .failed_when
            .as_deref()
            .map(|raw| {
                Expr::parse(raw).map_err(|reason| Error::FailCondition {
                    expr: raw.to_string(),
                    reason,
                })
            })
            .transpose()?;

        log::debug!("unit {}: dispatching {:?}", unit.index, unit.kind);
        let Self { ops, listeners } = self;
        let mut result = match unit.kind {
            UnitKind::File => match unit.path.as_deref() {
                Some(path) => ops.place(
                    &content,
                    path,
                    unit.user.as_deref(),
                    unit.target.as_deref(),
                    unit.permission.as_deref(),
                )?,
                None => OpResult::failure("file unit has no path"),
            },
            UnitKind::Command if unit.stream => {
                let mut fanout = |chunk: &StreamChunk| {
                    for listener in listeners.iter_mut() {
                        listener(chunk);
                    }
                };
                ops.stream(&content, &mut fanout, unit.target.as_deref())?
            }
            UnitKind::Command => ops.run(
                &content,
                unit.user.as_deref(),
                unit.persistent.as_deref(),
                unit.privileged,
                unit.target.as_deref(),
            )?,
            UnitKind::Edit => match unit.path.as_deref() {
                Some(path) => ops.patch(
                    &content,
                    path,
                    unit.user.as_deref(),
                    unit.target.as_deref(),
                    unit.permission.as_deref(),
                ),
                None => OpResult::failure("edit unit has no path"),
            },
            UnitKind::Unknown => OpResult::noop(),
        };

        if let Some(expr) = failed_when {
            result.status = !expr.eval(result.exit_code, &result.stdout, &result.stderr);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors::{ExecOutput, ScriptedCall, ScriptedConnector};

    fn engine_over(conn: &Arc<ScriptedConnector>) -> Engine {
        Engine::new(Arc::clone(conn) as Arc<dyn Connector>)
    }

    fn bindings(pairs: &[(&str, &str)]) -> Bindings {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn report_preserves_input_order() {
        let conn = Arc::new(ScriptedConnector::local());
        let mut engine = engine_over(&conn);

        let units: Vec<Unit> = (0..4)
            .map(|i| {
                let mut unit = Unit::command(format!("echo {i}"));
                unit.index = i;
                unit
            })
            .collect();

        let report = engine.run_all(&units, &Bindings::new()).unwrap();
        let indices: Vec<usize> = report.results.iter().map(|r| r.unit.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(
            conn.exec_commands(),
            vec!["echo 0", "echo 1", "echo 2", "echo 3"]
        );
    }

    #[test]
    fn run_one_matches_run_all_entry() {
        let make_conn = || {
            let conn = Arc::new(ScriptedConnector::local());
            conn.push_exec(ExecOutput {
                stdout: "a".into(),
                ..Default::default()
            });
            conn.push_exec(ExecOutput {
                stderr: "boom".into(),
                exit_code: 1,
                ..Default::default()
            });
            conn
        };
        let units = vec![Unit::command("echo a"), Unit::command("bad")];

        let all = engine_over(&make_conn())
            .run_all(&units, &Bindings::new())
            .unwrap();

        // Same canned script, but consumed from the second output onward.
        let conn = Arc::new(ScriptedConnector::local());
        conn.push_exec(ExecOutput {
            stderr: "boom".into(),
            exit_code: 1,
            ..Default::default()
        });
        let one = engine_over(&conn)
            .run_one(&units, 1, &Bindings::new())
            .unwrap();

        assert_eq!(one.len(), 1);
        assert_eq!(one.results[0].result, all.results[1].result);
        assert_eq!(one.results[0].unit, all.results[1].unit);
    }

    #[test]
    fn run_one_rejects_out_of_range_index() {
        let conn = Arc::new(ScriptedConnector::local());
        let mut engine = engine_over(&conn);
        let units = vec![Unit::command("echo hi")];

        let err = engine.run_one(&units, 5, &Bindings::new()).unwrap_err();
        match err {
            Error::NoSuchUnit { index, count } => {
                assert_eq!(index, 5);
                assert_eq!(count, 1);
            }
            other => panic!("expected NoSuchUnit, got {other:?}"),
        }
        assert!(conn.calls().is_empty());
    }

    #[test]
    fn missing_variable_aborts_before_any_operator_call() {
        let conn = Arc::new(ScriptedConnector::local());
        let mut engine = engine_over(&conn);

        let mut unit = Unit::command("echo {{greeting}}");
        unit.variables = Some("greeting".into());

        let err = engine.run_all(&[unit], &Bindings::new()).unwrap_err();
        match err {
            Error::MissingVariable { name } => assert_eq!(name, "greeting"),
            other => panic!("expected MissingVariable, got {other:?}"),
        }
        assert!(conn.calls().is_empty());
    }

    #[test]
    fn bound_variables_are_substituted_into_the_command() {
        let conn = Arc::new(ScriptedConnector::local());
        let mut engine = engine_over(&conn);

        let mut unit = Unit::command("echo {{greeting}}");
        unit.variables = Some("greeting".into());

        engine
            .run_all(&[unit], &bindings(&[("greeting", "hello")]))
            .unwrap();
        assert_eq!(conn.exec_commands(), vec!["echo hello"]);
    }

    #[test]
    fn default_status_requires_clean_exit_and_empty_stderr() {
        let conn = Arc::new(ScriptedConnector::local());
        conn.push_exec(ExecOutput::default());
        conn.push_exec(ExecOutput {
            exit_code: 1,
            ..Default::default()
        });
        conn.push_exec(ExecOutput {
            stderr: "warning".into(),
            ..Default::default()
        });
        let mut engine = engine_over(&conn);

        let units = vec![
            Unit::command("a"),
            Unit::command("b"),
            Unit::command("c"),
        ];
        let report = engine.run_all(&units, &Bindings::new()).unwrap();

        let statuses: Vec<bool> = report.results.iter().map(|r| r.result.status).collect();
        assert_eq!(statuses, vec![true, false, false]);
        assert!(!report.status);
    }

    #[test]
    fn failed_when_overrides_the_default_rule() {
        let conn = Arc::new(ScriptedConnector::local());
        // Non-empty stderr would fail the default rule.
        conn.push_exec(ExecOutput {
            stderr: "deprecation warning".into(),
            ..Default::default()
        });
        let mut engine = engine_over(&conn);

        let mut unit = Unit::command("noisy");
        unit.failed_when = Some("exitCode != 0".into());

        let report = engine.run_all(&[unit], &Bindings::new()).unwrap();
        assert!(report.results[0].result.status);
        assert!(report.status);
    }

    #[test]
    fn failed_when_marks_matching_output_as_failed() {
        let conn = Arc::new(ScriptedConnector::local());
        conn.push_exec(ExecOutput {
            stdout: "ERROR: disk full".into(),
            ..Default::default()
        });
        let mut engine = engine_over(&conn);

        let mut unit = Unit::command("check");
        unit.failed_when = Some("stdout contains ERROR".into());

        let report = engine.run_all(&[unit], &Bindings::new()).unwrap();
        assert!(!report.results[0].result.status);
    }

    #[test]
    fn malformed_failed_when_aborts_without_dispatching() {
        let conn = Arc::new(ScriptedConnector::local());
        let mut engine = engine_over(&conn);

        let mut unit = Unit::command("echo hi");
        unit.failed_when = Some("pid == 4".into());

        let err = engine.run_all(&[unit], &Bindings::new()).unwrap_err();
        assert!(matches!(err, Error::FailCondition { .. }));
        assert!(conn.calls().is_empty());
    }

    #[test]
    fn failed_unit_does_not_stop_the_run() {
        let conn = Arc::new(ScriptedConnector::local());
        conn.push_exec(ExecOutput {
            exit_code: 1,
            ..Default::default()
        });
        let mut engine = engine_over(&conn);

        let units = vec![Unit::command("fails"), Unit::command("still runs")];
        let report = engine.run_all(&units, &Bindings::new()).unwrap();

        assert_eq!(report.len(), 2);
        assert!(!report.results[0].result.status);
        assert!(report.results[1].result.status);
        assert_eq!(conn.exec_commands().len(), 2);
    }

    #[test]
    fn streamed_unit_on_remote_target_aborts() {
        let conn = Arc::new(ScriptedConnector::remote());
        let mut engine = engine_over(&conn);

        let mut unit = Unit::command("tail -f log");
        unit.stream = true;

        let err = engine.run_all(&[unit], &Bindings::new()).unwrap_err();
        assert!(matches!(err, Error::StreamUnsupported { .. }));
        assert!(conn.calls().is_empty());
    }

    #[test]
    fn unknown_unit_kinds_record_a_successful_noop() {
        let conn = Arc::new(ScriptedConnector::local());
        let mut engine = engine_over(&conn);

        let mut unit = Unit::command("ignored");
        unit.kind = UnitKind::Unknown;

        let report = engine.run_all(&[unit], &Bindings::new()).unwrap();
        assert!(report.results[0].result.status);
        assert!(report.status);
        assert!(conn.calls().is_empty());
    }

    #[test]
    fn file_unit_without_path_records_a_failure() {
        let conn = Arc::new(ScriptedConnector::local());
        let mut engine = engine_over(&conn);

        let mut unit = Unit::command("content");
        unit.kind = UnitKind::File;

        let report = engine.run_all(&[unit], &Bindings::new()).unwrap();
        assert!(!report.results[0].result.status);
        assert!(report.results[0].result.stderr.contains("no path"));
        assert!(conn.calls().is_empty());
    }

    #[test]
    fn edit_unit_dispatches_to_patch() {
        let conn = Arc::new(ScriptedConnector::remote());
        let mut engine = engine_over(&conn);

        let report = engine
            .run_all(&[Unit::edit("--- a\n+++ b\n", "/srv/app.conf")], &Bindings::new())
            .unwrap();

        assert!(!report.results[0].result.status);
        assert!(
            report.results[0]
                .result
                .stderr
                .contains("/srv/app.conf does not exist.")
        );
        let calls = conn.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], ScriptedCall::PathExists(_)));
    }

    #[test]
    fn unit_target_selects_the_named_connector() {
        let default = Arc::new(ScriptedConnector::local());
        let worker = Arc::new(ScriptedConnector::local());
        let mut targets: HashMap<String, Arc<dyn Connector>> = HashMap::new();
        targets.insert("worker".into(), Arc::clone(&worker) as Arc<dyn Connector>);
        let mut engine =
            Engine::with_targets(Arc::clone(&default) as Arc<dyn Connector>, targets);

        let mut unit = Unit::command("uptime");
        unit.target = Some("worker".into());

        engine.run_all(&[unit], &Bindings::new()).unwrap();
        assert_eq!(worker.exec_commands(), vec!["uptime"]);
        assert!(default.exec_commands().is_empty());
    }

    #[test]
    fn tear_down_is_forwarded_to_operators() {
        let conn = Arc::new(ScriptedConnector::local());
        conn.push_pid(4242);
        let mut engine = engine_over(&conn);
        engine
            .operators_mut()
            .running("sleep 60", None, None, None)
            .unwrap();

        engine.tear_down();
        assert_eq!(conn.exec_commands(), vec!["kill -9 4242"]);
    }
}
