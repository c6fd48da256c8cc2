//! Operators - the side-effecting operations units dispatch to.
//!
//! One `Operators` instance drives one session: it holds the default
//! connector, the named-target map, and the registry of background process
//! ids it has spawned. File-shaped operations stage through temporary files
//! (a local temp written on the host, a unique staging path on the target)
//! and finish with a privilege-aware move, so a half-written destination is
//! never observed.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{Sender, channel};
use std::time::Duration;

use tempfile::NamedTempFile;
use uuid::Uuid;

use connectors::{Connector, ExecOutput};

use crate::error::{Error, Result};
use crate::report::OpResult;

/// Which stream a progress chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    Stdout,
    Stderr,
}

/// One raw chunk of output from a streaming command, delivered as it
/// arrives.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub source: StreamSource,
    pub data: String,
}

/// How long a background command gets to reach a ready state before the
/// run moves on.
const SETTLE_INTERVAL: Duration = Duration::from_millis(500);

/// Side-effecting operations over a set of connectors.
#[derive(Debug)]
pub struct Operators {
    connector: Arc<dyn Connector>,
    targets: HashMap<String, Arc<dyn Connector>>,
    spawned: Vec<u32>,
    settle: Duration,
}

impl Operators {
    /// Operators driving a single default connector.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            targets: HashMap::new(),
            spawned: Vec::new(),
            settle: SETTLE_INTERVAL,
        }
    }

    /// Add named targets selectable per unit.
    pub fn with_targets(mut self, targets: HashMap<String, Arc<dyn Connector>>) -> Self {
        self.targets = targets;
        self
    }

    /// Override the background-command settle interval (tests).
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// The connector a unit runs against: its named target when known,
    /// else the default.
    pub fn connector_for(&self, target: Option<&str>) -> Arc<dyn Connector> {
        if let Some(name) = target {
            if let Some(conn) = self.targets.get(name) {
                log::debug!("using target '{name}'");
                return Arc::clone(conn);
            }
        }
        Arc::clone(&self.connector)
    }

    /// Background process ids tracked for teardown.
    pub fn tracked_pids(&self) -> &[u32] {
        &self.spawned
    }

    fn sudo_prefix(user: Option<&str>) -> String {
        user.map(|u| format!("sudo -u {u} ")).unwrap_or_default()
    }

    /// Unique staging path on the target.
    fn staging_path() -> PathBuf {
        PathBuf::from("/tmp").join(Uuid::new_v4().to_string())
    }

    /// Place `content` as a file at `location` on the target.
    ///
    /// Transport failures while staging come back as a failed result. A
    /// non-zero exit from the final move/chmod is re-raised instead - the
    /// destination was reachable but could not be installed, and that
    /// aborts the run.
    pub fn place(
        &self,
        content: &str,
        location: &str,
        user: Option<&str>,
        target: Option<&str>,
        permission: Option<&str>,
    ) -> Result<OpResult> {
        let conn = self.connector_for(target);
        log::info!("placing {} bytes into {location}", content.len());

        match Self::place_staged(conn.as_ref(), content, location, user, permission) {
            Ok(output) if output.exit_code != 0 => Err(Error::Place {
                location: location.to_string(),
                stderr: output.stderr,
            }),
            Ok(output) => Ok(OpResult::from_output(output)),
            Err(err) => Ok(OpResult::failure(err.to_string())),
        }
    }

    fn place_staged(
        conn: &dyn Connector,
        content: &str,
        location: &str,
        user: Option<&str>,
        permission: Option<&str>,
    ) -> Result<ExecOutput> {
        let local_tmp = NamedTempFile::new()?;
        std::fs::write(local_tmp.path(), content)?;

        if let Some(dir) = Path::new(location)
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
        {
            Self::ensure_dir(conn, dir, user)?;
        }

        let staging = Self::staging_path();
        conn.upload(local_tmp.path(), &staging)?;

        let sudo = Self::sudo_prefix(user);
        let mut output = conn.exec(&format!("{sudo}mv {} {location}", staging.display()))?;
        if let Some(mode) = permission {
            output = conn.exec(&format!("{sudo}chmod +{mode} {location}"))?;
        }

        // local_tmp removed on drop
        Ok(output)
    }

    fn ensure_dir(conn: &dyn Connector, dir: &Path, user: Option<&str>) -> Result<()> {
        if conn.kind().is_local() {
            let resolved = if dir.is_absolute() {
                dir.to_path_buf()
            } else {
                conn.working_dir().join(dir)
            };
            // create_dir_all treats an existing directory as success
            std::fs::create_dir_all(resolved)?;
        } else {
            conn.exec(&format!(
                "{}mkdir -p {}",
                Self::sudo_prefix(user),
                dir.display()
            ))?;
        }
        Ok(())
    }

    /// Apply a unified diff to the file at `location` on the target.
    ///
    /// Never raises: a missing target file, an unappliable diff, and
    /// transport failures all come back as failed results.
    pub fn patch(
        &self,
        diff: &str,
        location: &str,
        user: Option<&str>,
        target: Option<&str>,
        permission: Option<&str>,
    ) -> OpResult {
        let conn = self.connector_for(target);
        log::info!("patching {location}");

        match Self::patch_staged(conn.as_ref(), diff, location, user, permission) {
            Ok(result) => result,
            Err(err) => OpResult::failure(err.to_string()),
        }
    }

    fn patch_staged(
        conn: &dyn Connector,
        diff: &str,
        location: &str,
        user: Option<&str>,
        permission: Option<&str>,
    ) -> Result<OpResult> {
        if !conn.path_exists(Path::new(location)) {
            return Ok(OpResult::failure(format!("{location} does not exist.")));
        }

        let local_tmp = NamedTempFile::new()?;
        conn.download(Path::new(location), local_tmp.path())?;
        let content = std::fs::read_to_string(local_tmp.path())?;

        let patch = match diffy::Patch::from_str(diff) {
            Ok(patch) => patch,
            Err(err) => return Ok(OpResult::failure(format!("could not apply patch: {err}"))),
        };
        let patched = match diffy::apply(&content, &patch) {
            Ok(text) => text,
            Err(err) => return Ok(OpResult::failure(format!("could not apply patch: {err}"))),
        };

        std::fs::write(local_tmp.path(), patched)?;
        let staging = Self::staging_path();
        conn.upload(local_tmp.path(), &staging)?;

        let sudo = Self::sudo_prefix(user);
        let mut output = conn.exec(&format!("{sudo}mv {} {location}", staging.display()))?;
        if let Some(mode) = permission {
            output = conn.exec(&format!("{sudo}chmod +{mode} {location}"))?;
        }

        Ok(OpResult::from_output(output))
    }

    /// Run a command to completion on the target.
    pub fn run(
        &self,
        cmd: &str,
        user: Option<&str>,
        persistent: Option<&str>,
        privileged: bool,
        target: Option<&str>,
    ) -> Result<OpResult> {
        let conn = self.connector_for(target);
        log::info!("$ {cmd}");

        let full = format!("{}{cmd}", Self::sudo_prefix(user));
        let output = if privileged && conn.kind().is_local() {
            Self::run_privileged(cmd)
        } else if let Some(session) = persistent {
            conn.exec_persistent(&full, session)?
        } else {
            conn.exec(&full)?
        };

        Ok(OpResult::from_output(output))
    }

    /// Run through the OS privilege prompt: validate sudo first, then
    /// execute. Failures resolve as failed output rather than raising.
    fn run_privileged(cmd: &str) -> ExecOutput {
        match Command::new("sudo").arg("-v").status() {
            Ok(status) if status.success() => {}
            Ok(_) => {
                return ExecOutput {
                    stdout: String::new(),
                    stderr: "failed to acquire sudo privileges".into(),
                    exit_code: 1,
                };
            }
            Err(err) => {
                return ExecOutput {
                    stdout: String::new(),
                    stderr: err.to_string(),
                    exit_code: 1,
                };
            }
        }

        match Command::new("sudo").args(["sh", "-c", cmd]).output() {
            Ok(output) => output.into(),
            Err(err) => ExecOutput {
                stdout: String::new(),
                stderr: err.to_string(),
                exit_code: 1,
            },
        }
    }

    /// Run a command, delivering output chunks to `on_chunk` as they
    /// arrive. Local targets only; any other kind is rejected before a
    /// process is created. A spawn failure resolves as a failed result
    /// with the creation error in stderr.
    pub fn stream(
        &self,
        cmd: &str,
        on_chunk: &mut dyn FnMut(&StreamChunk),
        target: Option<&str>,
    ) -> Result<OpResult> {
        let conn = self.connector_for(target);
        let kind = conn.kind();
        if !kind.is_local() {
            return Err(Error::StreamUnsupported {
                kind: kind.to_string(),
            });
        }

        log::info!("$ {cmd} (streaming)");
        let child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .current_dir(conn.working_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match child {
            Ok(child) => child,
            Err(err) => return Ok(OpResult::failure(format!("failure to create command: {err}"))),
        };

        let (tx, rx) = channel();
        if let Some(pipe) = child.stdout.take() {
            spawn_chunk_reader(pipe, StreamSource::Stdout, tx.clone());
        }
        if let Some(pipe) = child.stderr.take() {
            spawn_chunk_reader(pipe, StreamSource::Stderr, tx.clone());
        }
        drop(tx);

        let mut stdout = String::new();
        let mut stderr = String::new();
        for chunk in rx {
            match chunk.source {
                StreamSource::Stdout => stdout.push_str(&chunk.data),
                StreamSource::Stderr => stderr.push_str(&chunk.data),
            }
            on_chunk(&chunk);
        }

        let status = child.wait()?;
        Ok(OpResult::from_output(ExecOutput {
            stdout,
            stderr,
            exit_code: status.code().unwrap_or(-1),
        }))
    }

    /// Launch a non-blocking background command, tracking its pid for
    /// teardown, then pause for the settle interval so the process can
    /// reach a ready state before follow-on units run.
    pub fn running(
        &mut self,
        cmd: &str,
        user: Option<&str>,
        persistent: Option<&str>,
        target: Option<&str>,
    ) -> Result<()> {
        let conn = self.connector_for(target);
        if persistent.is_some() {
            log::warn!("persistent sessions cannot host background commands; spawning detached");
        }

        log::info!("running background command: {cmd}");
        let handle = conn.spawn(&format!("{}{cmd}", Self::sudo_prefix(user)))?;
        if let Some(pid) = handle.pid {
            log::debug!("spawned pid {pid}");
            self.spawned.push(pid);
        }

        std::thread::sleep(self.settle);
        Ok(())
    }

    /// Force-terminate every tracked background process via the default
    /// connector. Best-effort; the registry is drained either way, so a
    /// repeat call issues nothing.
    pub fn tear_down(&mut self) {
        if self.spawned.is_empty() {
            return;
        }

        log::info!("tearing down background pids: {:?}", self.spawned);
        for pid in std::mem::take(&mut self.spawned) {
            match self.connector.exec(&format!("kill -9 {pid}")) {
                Ok(output) if !output.success() => {
                    log::warn!("kill -9 {pid} exited {}", output.exit_code);
                }
                Ok(_) => {}
                Err(err) => log::warn!("failed to kill {pid}: {err}"),
            }
        }
    }
}

/// Forward raw chunks from a child pipe into the channel until EOF.
fn spawn_chunk_reader<R: Read + Send + 'static>(
    mut pipe: R,
    source: StreamSource,
    tx: Sender<StreamChunk>,
) {
    std::thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let chunk = StreamChunk {
                        source,
                        data: String::from_utf8_lossy(&buf[..n]).to_string(),
                    };
                    if tx.send(chunk).is_err() {
                        break;
                    }
                }
            }
        }
    });
}
