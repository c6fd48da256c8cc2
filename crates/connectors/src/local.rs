//! Connector for the machine this process runs on.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::session::ShellSession;
use crate::{Connector, ConnectorKind, ExecOutput, SpawnHandle};

/// Execution target backed by the local machine.
///
/// Commands run through `sh -c` rooted at the working directory. File
/// transfers are plain filesystem copies. Persistent sessions are kept as
/// live `sh` processes for the lifetime of the connector.
#[derive(Debug)]
pub struct LocalConnector {
    working_dir: PathBuf,
    sessions: Mutex<HashMap<String, ShellSession>>,
}

impl LocalConnector {
    /// Create a connector rooted at `working_dir`.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a possibly-relative path against the working directory.
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    fn copy(&self, source: &Path, dest: &Path) -> Result<()> {
        let from = self.resolve(source);
        let to = self.resolve(dest);
        std::fs::copy(&from, &to)
            .map(|_| ())
            .map_err(|source| Error::Transfer { from, to, source })
    }
}

impl Connector for LocalConnector {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Local
    }

    fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    fn exec(&self, command: &str) -> Result<ExecOutput> {
        log::debug!("local exec: {command}");
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .output()
            .map_err(|source| Error::Spawn {
                command: command.into(),
                source,
            })?;
        Ok(output.into())
    }

    fn exec_persistent(&self, command: &str, session: &str) -> Result<ExecOutput> {
        log::debug!("local exec in session '{session}': {command}");
        let mut sessions = match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !sessions.contains_key(session) {
            let opened = ShellSession::open(session, &self.working_dir)?;
            sessions.insert(session.to_string(), opened);
        }
        let shell = sessions
            .get_mut(session)
            .ok_or_else(|| Error::SessionBroken {
                session: session.into(),
                message: "session vanished".into(),
            })?;

        let result = shell.run(command);
        if result.is_err() {
            // A broken shell never recovers; drop it so the next call
            // starts fresh.
            sessions.remove(session);
        }
        result
    }

    fn spawn(&self, command: &str) -> Result<SpawnHandle> {
        log::debug!("local spawn: {command}");
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| Error::Spawn {
                command: command.into(),
                source,
            })?;
        Ok(SpawnHandle {
            pid: Some(child.id()),
        })
    }

    fn upload(&self, source: &Path, dest: &Path) -> Result<()> {
        self.copy(source, dest)
    }

    fn download(&self, source: &Path, dest: &Path) -> Result<()> {
        self.copy(source, dest)
    }

    fn path_exists(&self, path: &Path) -> bool {
        self.resolve(path).exists()
    }

    fn get_state(&self) -> Result<String> {
        Ok("ready".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector() -> (tempfile::TempDir, LocalConnector) {
        let dir = tempfile::tempdir().unwrap();
        let conn = LocalConnector::new(dir.path());
        (dir, conn)
    }

    #[test]
    fn exec_captures_output() {
        let (_dir, conn) = connector();
        let out = conn.exec("echo hello").unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.exit_code, 0);
        assert!(out.success());
    }

    #[test]
    fn exec_reports_nonzero_exit() {
        let (_dir, conn) = connector();
        let out = conn.exec("exit 7").unwrap();
        assert_eq!(out.exit_code, 7);
        assert!(!out.success());
    }

    #[test]
    fn exec_runs_in_working_dir() {
        let (dir, conn) = connector();
        let out = conn.exec("pwd").unwrap();
        assert_eq!(
            PathBuf::from(out.stdout.trim()).canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn persistent_session_keeps_environment() {
        let (_dir, conn) = connector();
        conn.exec_persistent("FOO=42; export FOO", "s1").unwrap();
        let out = conn.exec_persistent("echo $FOO", "s1").unwrap();
        assert_eq!(out.stdout.trim(), "42");
    }

    #[test]
    fn sessions_are_isolated_by_name() {
        let (_dir, conn) = connector();
        conn.exec_persistent("FOO=42; export FOO", "a").unwrap();
        let out = conn.exec_persistent("echo ${FOO:-unset}", "b").unwrap();
        assert_eq!(out.stdout.trim(), "unset");
    }

    #[test]
    fn upload_and_download_copy_files() {
        let (dir, conn) = connector();
        let src = dir.path().join("src.txt");
        std::fs::write(&src, "payload").unwrap();

        conn.upload(&src, Path::new("dest.txt")).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("dest.txt")).unwrap(),
            "payload"
        );

        conn.download(Path::new("dest.txt"), &dir.path().join("back.txt"))
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("back.txt")).unwrap(),
            "payload"
        );
    }

    #[test]
    fn path_exists_resolves_relative_paths() {
        let (dir, conn) = connector();
        assert!(!conn.path_exists(Path::new("missing.txt")));
        std::fs::write(dir.path().join("present.txt"), "x").unwrap();
        assert!(conn.path_exists(Path::new("present.txt")));
    }

    #[test]
    fn spawn_reports_a_pid() {
        let (_dir, conn) = connector();
        let handle = conn.spawn("sleep 0.1").unwrap();
        assert!(handle.pid.is_some());
    }

    #[test]
    fn state_is_ready() {
        let (_dir, conn) = connector();
        assert_eq!(conn.get_state().unwrap(), "ready");
    }
}
