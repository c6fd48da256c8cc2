//! # Connectors
//!
//! An abstraction over execution targets: the local machine, an SSH host,
//! a container, or a virtual machine.
//!
//! A [`Connector`] exposes the small capability surface an execution engine
//! needs - run a command, keep a named shell session alive between commands,
//! spawn a detached background process, move files on and off the target,
//! and answer basic state queries. Callers hold connectors as trait objects
//! and stay agnostic to which concrete target is behind them.
//!
//! ## Core Concepts
//!
//! - **Connector**: a handle to one execution target, rooted at a working
//!   directory
//! - **ConnectorKind**: discriminates local from the remote target families
//! - **ExecOutput**: captured stdout/stderr/exit code of one command
//! - **Persistent session**: a named, long-lived shell whose state (working
//!   directory, environment) survives across calls
//!
//! Only [`LocalConnector`] ships with this crate. Remote kinds are declared
//! in [`ConnectorKind`] so engines can discriminate on them, but their
//! transports (SSH, container runtimes, hypervisors) live in downstream
//! crates. [`ScriptedConnector`] is a recording test double.

pub mod error;
pub mod local;
pub mod scripted;

mod session;

pub use error::{Error, Result};
pub use local::LocalConnector;
pub use scripted::{ScriptedCall, ScriptedConnector};

use std::fmt;
use std::path::Path;

/// The family of execution target behind a connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorKind {
    /// The machine this process runs on
    Local,
    /// A remote host reached over SSH
    Ssh,
    /// A container (e.g. Docker)
    Container,
    /// A managed virtual machine
    VirtualMachine,
    /// A user-provided target family
    Custom(String),
}

impl ConnectorKind {
    /// Whether this kind executes on the local machine.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }
}

impl fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Ssh => write!(f, "ssh"),
            Self::Container => write!(f, "container"),
            Self::VirtualMachine => write!(f, "vm"),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// Captured output of one command run on a target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    /// Whether the command exited zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

impl From<std::process::Output> for ExecOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        }
    }
}

/// Handle to a detached background process.
#[derive(Debug, Clone, Default)]
pub struct SpawnHandle {
    /// Process id on the target, when the target reports one
    pub pid: Option<u32>,
}

/// One execution target.
///
/// At most one operation should be in flight per connector at a time;
/// already-detached background processes are the only exception.
pub trait Connector: Send + Sync + fmt::Debug {
    /// Which target family this connector drives.
    fn kind(&self) -> ConnectorKind;

    /// Working directory commands run in.
    fn working_dir(&self) -> &Path;

    /// Run a one-shot shell command to completion and capture its output.
    fn exec(&self, command: &str) -> Result<ExecOutput>;

    /// Run a command inside the named persistent session.
    ///
    /// The session is created on first use and keeps shell state (working
    /// directory, environment variables) across calls.
    fn exec_persistent(&self, command: &str, session: &str) -> Result<ExecOutput>;

    /// Start a detached background process and return its handle.
    fn spawn(&self, command: &str) -> Result<SpawnHandle>;

    /// Copy a file from the host onto the target.
    fn upload(&self, source: &Path, dest: &Path) -> Result<()>;

    /// Copy a file from the target onto the host.
    fn download(&self, source: &Path, dest: &Path) -> Result<()>;

    /// Whether a path exists on the target.
    fn path_exists(&self, path: &Path) -> bool;

    /// Query target state (e.g. "ready", "running").
    fn get_state(&self) -> Result<String>;
}
