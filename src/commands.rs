//! Command implementations for the runbook binary.

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use connectors::{Connector, LocalConnector};
use runbook::{
    Bindings, Document, Engine, RunReport, StreamSource, Unit, UnitKind, extract,
};

use crate::cli::{ListArgs, RunArgs};

/// Execute a document's units and print the report. Returns the aggregate
/// run status.
pub fn run(args: RunArgs) -> Result<bool> {
    let units = load_units(&args.document)?;
    let bindings: Bindings = args.vars.into_iter().collect();

    let connector: Arc<dyn Connector> = Arc::new(LocalConnector::new(&args.working_dir));
    let mut engine = Engine::new(connector);

    // Mirror streamed output to the terminal as it arrives, unless the
    // caller asked for machine-readable output.
    if !args.json {
        engine.subscribe(Box::new(|chunk| match chunk.source {
            StreamSource::Stdout => print!("{}", chunk.data),
            StreamSource::Stderr => eprint!("{}", chunk.data),
        }));
    }

    let outcome = match args.step {
        Some(index) => engine.run_one(&units, index, &bindings),
        None => engine.run_all(&units, &bindings),
    };
    // Background processes die with the run, even one that aborted.
    engine.tear_down();
    let report = outcome?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(report.status)
}

/// Print a document's executable units without running anything.
pub fn list(args: ListArgs) -> Result<()> {
    let units = load_units(&args.document)?;
    if units.is_empty() {
        println!("no executable units");
        return Ok(());
    }

    for unit in &units {
        println!("{:>3}  {:<8} {}", unit.index, kind_label(unit), summarize(unit));
    }
    Ok(())
}

fn load_units(document: &std::path::Path) -> Result<Vec<Unit>> {
    let raw = fs::read_to_string(document)
        .with_context(|| format!("reading {}", document.display()))?;
    let doc = Document::from_json(&raw)
        .with_context(|| format!("parsing {}", document.display()))?;
    Ok(extract::units(&doc))
}

fn print_report(report: &RunReport) {
    for entry in &report.results {
        let label = if entry.result.status {
            " PASS ".on_green().white().bold()
        } else {
            " FAIL ".on_red().white().bold()
        };
        println!(
            "{label} [{}] {} {}",
            entry.unit.index,
            kind_label(&entry.unit),
            summarize(&entry.unit)
        );

        if !entry.result.status {
            for line in entry.result.stderr.lines() {
                println!("       {}", line.red());
            }
            if entry.result.stderr.is_empty() && entry.result.exit_code != 0 {
                println!("       {}", format!("exit code {}", entry.result.exit_code).red());
            }
        }
    }

    println!();
    if report.status {
        println!("{}", "run passed".green().bold());
    } else {
        println!("{}", "run failed".red().bold());
    }
}

fn kind_label(unit: &Unit) -> &'static str {
    match unit.kind {
        UnitKind::File => "file",
        UnitKind::Command => "command",
        UnitKind::Edit => "edit",
        UnitKind::Unknown => "skipped",
    }
}

/// One-line description of a unit: the destination for file-shaped units,
/// the first line of the command otherwise.
fn summarize(unit: &Unit) -> String {
    match unit.kind {
        UnitKind::File | UnitKind::Edit => unit.path.clone().unwrap_or_else(|| "<no path>".into()),
        UnitKind::Command | UnitKind::Unknown => {
            unit.content.lines().next().unwrap_or("").to_string()
        }
    }
}
