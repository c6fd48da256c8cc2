//! Scripted connector for tests.
//!
//! Records every call it receives and replays canned responses, so engine
//! and operator tests can assert exactly which operations reached the
//! target, and in which order, without touching a real machine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::{Connector, ConnectorKind, ExecOutput, SpawnHandle};

/// One recorded call against a [`ScriptedConnector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedCall {
    Exec(String),
    ExecPersistent { command: String, session: String },
    Spawn(String),
    Upload { source: PathBuf, dest: PathBuf },
    Download { source: PathBuf, dest: PathBuf },
    PathExists(PathBuf),
    GetState,
}

#[derive(Debug, Default)]
struct ScriptedState {
    calls: Vec<ScriptedCall>,
    exec_queue: Vec<ExecOutput>,
    pid_queue: Vec<u32>,
    /// Simulated target filesystem: path -> content.
    files: HashMap<PathBuf, String>,
    next_pid: u32,
}

/// A connector whose behavior is scripted up front.
///
/// `exec` and `exec_persistent` pop canned outputs from a queue and fall
/// back to a successful empty output once the queue is drained. `spawn`
/// hands out queued pids, then sequential ones. Uploaded files land in an
/// in-memory map that `download` and `path_exists` consult.
#[derive(Debug)]
pub struct ScriptedConnector {
    kind: ConnectorKind,
    working_dir: PathBuf,
    state: Mutex<ScriptedState>,
}

impl ScriptedConnector {
    /// A scripted connector posing as the given target family.
    pub fn new(kind: ConnectorKind) -> Self {
        Self {
            kind,
            working_dir: PathBuf::from("."),
            state: Mutex::new(ScriptedState {
                next_pid: 1000,
                ..Default::default()
            }),
        }
    }

    /// A scripted connector posing as the local machine.
    pub fn local() -> Self {
        Self::new(ConnectorKind::Local)
    }

    /// A scripted connector posing as an SSH host.
    pub fn remote() -> Self {
        Self::new(ConnectorKind::Ssh)
    }

    /// Queue a canned output for the next `exec`/`exec_persistent` call.
    pub fn push_exec(&self, output: ExecOutput) {
        self.lock().exec_queue.push(output);
    }

    /// Queue a pid for the next `spawn` call.
    pub fn push_pid(&self, pid: u32) {
        self.lock().pid_queue.push(pid);
    }

    /// Seed a file on the simulated target.
    pub fn set_file(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.lock().files.insert(path.into(), content.into());
    }

    /// Content of a file on the simulated target, if present.
    pub fn file(&self, path: &Path) -> Option<String> {
        self.lock().files.get(path).cloned()
    }

    /// Every call recorded so far, in order.
    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.lock().calls.clone()
    }

    /// The `exec` command strings recorded so far, in order.
    pub fn exec_commands(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                ScriptedCall::Exec(cmd) => Some(cmd.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptedState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn pop_exec(&self) -> ExecOutput {
        let mut state = self.lock();
        if state.exec_queue.is_empty() {
            ExecOutput::default()
        } else {
            state.exec_queue.remove(0)
        }
    }
}

impl Connector for ScriptedConnector {
    fn kind(&self) -> ConnectorKind {
        self.kind.clone()
    }

    fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    fn exec(&self, command: &str) -> Result<ExecOutput> {
        self.lock().calls.push(ScriptedCall::Exec(command.into()));
        Ok(self.pop_exec())
    }

    fn exec_persistent(&self, command: &str, session: &str) -> Result<ExecOutput> {
        self.lock().calls.push(ScriptedCall::ExecPersistent {
            command: command.into(),
            session: session.into(),
        });
        Ok(self.pop_exec())
    }

    fn spawn(&self, command: &str) -> Result<SpawnHandle> {
        let mut state = self.lock();
        state.calls.push(ScriptedCall::Spawn(command.into()));
        let pid = if state.pid_queue.is_empty() {
            state.next_pid += 1;
            state.next_pid
        } else {
            state.pid_queue.remove(0)
        };
        Ok(SpawnHandle { pid: Some(pid) })
    }

    fn upload(&self, source: &Path, dest: &Path) -> Result<()> {
        let content = std::fs::read_to_string(source).map_err(|e| Error::Transfer {
            from: source.to_path_buf(),
            to: dest.to_path_buf(),
            source: e,
        })?;
        let mut state = self.lock();
        state.calls.push(ScriptedCall::Upload {
            source: source.to_path_buf(),
            dest: dest.to_path_buf(),
        });
        state.files.insert(dest.to_path_buf(), content);
        Ok(())
    }

    fn download(&self, source: &Path, dest: &Path) -> Result<()> {
        let content = {
            let mut state = self.lock();
            state.calls.push(ScriptedCall::Download {
                source: source.to_path_buf(),
                dest: dest.to_path_buf(),
            });
            state.files.get(source).cloned()
        };
        let content = content.ok_or_else(|| Error::Transfer {
            from: source.to_path_buf(),
            to: dest.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file on target"),
        })?;
        std::fs::write(dest, content).map_err(|e| Error::Transfer {
            from: source.to_path_buf(),
            to: dest.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }

    fn path_exists(&self, path: &Path) -> bool {
        let mut state = self.lock();
        state.calls.push(ScriptedCall::PathExists(path.to_path_buf()));
        state.files.contains_key(path)
    }

    fn get_state(&self) -> Result<String> {
        self.lock().calls.push(ScriptedCall::GetState);
        Ok("ready".to_string())
    }
}
