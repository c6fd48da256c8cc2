//! Long-lived shell sessions.
//!
//! A session is one `sh` process kept alive across commands, so state such
//! as the working directory and exported environment variables persists.
//! Commands are delimited with sentinel lines written to both streams; the
//! sentinel on stdout also carries the command's exit code.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{Receiver, Sender, channel};

use crate::error::{Error, Result};
use crate::ExecOutput;

/// Marker line written after each command. Unlikely to collide with real
/// command output.
const SENTINEL: &str = "__connectors_cmd_done_a1b9__";

/// One persistent `sh` process with sentinel-delimited reads.
#[derive(Debug)]
pub struct ShellSession {
    name: String,
    child: Child,
    stdin: ChildStdin,
    stdout_rx: Receiver<String>,
    stderr_rx: Receiver<String>,
}

impl ShellSession {
    /// Spawn a fresh shell rooted at `working_dir`.
    pub fn open(name: &str, working_dir: &Path) -> Result<Self> {
        let mut child = Command::new("sh")
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| Error::Spawn {
                command: "sh".into(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or_else(|| Error::SessionBroken {
            session: name.into(),
            message: "shell stdin unavailable".into(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| Error::SessionBroken {
            session: name.into(),
            message: "shell stdout unavailable".into(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| Error::SessionBroken {
            session: name.into(),
            message: "shell stderr unavailable".into(),
        })?;

        let (stdout_tx, stdout_rx) = channel();
        let (stderr_tx, stderr_rx) = channel();
        spawn_line_reader(stdout, stdout_tx);
        spawn_line_reader(stderr, stderr_tx);

        log::debug!("opened persistent session '{name}'");

        Ok(Self {
            name: name.into(),
            child,
            stdin,
            stdout_rx,
            stderr_rx,
        })
    }

    /// Run one command in this session and collect its output.
    pub fn run(&mut self, command: &str) -> Result<ExecOutput> {
        // The stdout sentinel carries the command's exit code; the stderr
        // sentinel only delimits the stream.
        let script = format!(
            "{command}\nprintf '{SENTINEL} %s\\n' \"$?\"\nprintf '{SENTINEL}\\n' 1>&2\n"
        );
        self.stdin
            .write_all(script.as_bytes())
            .and_then(|()| self.stdin.flush())
            .map_err(|e| self.broken(format!("failed to write command: {e}")))?;

        let mut stdout = String::new();
        let exit_code = loop {
            let line = self
                .stdout_rx
                .recv()
                .map_err(|_| self.broken("shell stdout closed".into()))?;
            if let Some(code) = line.strip_prefix(SENTINEL) {
                break code.trim().parse::<i32>().unwrap_or(-1);
            }
            stdout.push_str(&line);
            stdout.push('\n');
        };

        let mut stderr = String::new();
        loop {
            let line = self
                .stderr_rx
                .recv()
                .map_err(|_| self.broken("shell stderr closed".into()))?;
            if line.starts_with(SENTINEL) {
                break;
            }
            stderr.push_str(&line);
            stderr.push('\n');
        }

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    fn broken(&self, message: String) -> Error {
        Error::SessionBroken {
            session: self.name.clone(),
            message,
        }
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Forward lines from a pipe into a channel until EOF.
fn spawn_line_reader<R: std::io::Read + Send + 'static>(pipe: R, tx: Sender<String>) {
    std::thread::spawn(move || {
        let reader = BufReader::new(pipe);
        for line in reader.lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}
