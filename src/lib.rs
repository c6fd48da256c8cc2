//! # Runbook
//!
//! An execution engine for runnable documentation.
//!
//! A rendered document carries ordered, annotated units of work: place a
//! file, run a shell command, apply a patch. This crate extracts those
//! units, substitutes caller-supplied variables, dispatches each unit to
//! the matching operator against a selectable execution target, and
//! aggregates structured pass/fail results into a run report.
//!
//! ## Core Concepts
//!
//! - **Unit**: one executable item extracted from a document
//! - **Bindings**: caller-supplied variable values substituted into units
//! - **Operators**: the concrete side-effecting operations (place, patch,
//!   run, stream, background run, teardown)
//! - **Engine**: the sequential driver producing a [`RunReport`]
//!
//! Execution targets come from the `connectors` crate: anything
//! implementing [`connectors::Connector`] works, and a local-machine
//! connector ships in the box.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use connectors::LocalConnector;
//! use runbook::{Bindings, Engine, Unit};
//!
//! let connector = Arc::new(LocalConnector::new("."));
//! let mut engine = Engine::new(connector);
//!
//! let units = vec![
//!     Unit::file("listen 8080\n", "app.conf"),
//!     Unit::command("cat app.conf"),
//! ];
//!
//! let report = engine.run_all(&units, &Bindings::new())?;
//! assert!(report.status);
//! engine.tear_down();
//! ```
//!
//! ## Failure model
//!
//! A unit that completes with a bad outcome (non-zero exit, noisy stderr,
//! a diff that does not apply) is recorded as failed and the run moves on.
//! Only four conditions abort: a declared variable with no binding, a
//! `failedWhen` expression that does not parse, a streamed command aimed
//! at a non-local target, and a file placement whose final install step
//! exits non-zero. See [`Error`] for the full taxonomy.

pub mod cond;
pub mod engine;
pub mod error;
pub mod extract;
pub mod ir;
pub mod ops;
pub mod render;
pub mod report;
pub mod unit;

// Re-export main types at crate root
pub use cond::Expr;
pub use engine::{ChunkListener, Engine};
pub use error::{Error, Result};
pub use ir::{Document, Node};
pub use ops::{Operators, StreamChunk, StreamSource};
pub use render::{Bindings, render};
pub use report::{OpResult, RunReport, UnitResult};
pub use unit::{Unit, UnitKind};
