use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "runbook")]
#[command(version)]
#[command(about = "Execute runnable documentation against an execution target", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute the units of a rendered document
    Run(RunArgs),

    /// List a document's executable units without running them
    List(ListArgs),
}

#[derive(Parser)]
pub struct RunArgs {
    /// Rendered document (JSON intermediate representation)
    pub document: PathBuf,

    /// Bind a variable, e.g. --var HOST=db1 (repeatable)
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_binding)]
    pub vars: Vec<(String, String)>,

    /// Run only the unit at this zero-based index
    #[arg(long, value_name = "INDEX")]
    pub step: Option<usize>,

    /// Directory commands run in
    #[arg(long, default_value = ".", value_name = "DIR")]
    pub working_dir: PathBuf,

    /// Emit the run report as JSON instead of colored text
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct ListArgs {
    /// Rendered document (JSON intermediate representation)
    pub document: PathBuf,
}

fn parse_binding(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{raw}'")),
    }
}
