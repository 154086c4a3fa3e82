//! SSH transport: control-master connections, one-shot exec channels, and
//! interactive pty-backed shell channels.
//!
//! All remote access goes through the system `ssh` binary with an OpenSSH
//! control socket: the connection is authenticated once when the master is
//! opened, and every subsequent channel multiplexes over it. Unknown host
//! keys are accepted automatically (trust-on-first-use); there is no host-key
//! pinning.

use crate::error::SessionError;
use crate::session::SessionOutput;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::process::Stdio;
#[cfg(test)]
use std::sync::{Mutex as StdMutex, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, ChildStdout, Command};
use tokio::time::timeout;

/// Bounded read size for one interactive-channel poll.
const RECV_CHUNK: usize = 4096;
/// How long one `recv_available` call waits for data before reporting none.
const RECV_POLL_WINDOW: Duration = Duration::from_millis(50);

/// Local terminal size, passed in explicitly so the transport never reads
/// ambient process state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalGeometry {
    pub columns: u16,
    pub rows: u16,
}

impl Default for TerminalGeometry {
    fn default() -> Self {
        Self {
            columns: 80,
            rows: 24,
        }
    }
}

/// One authenticated ssh connection, exclusively owned by a single execution
/// attempt. Closed exactly once; `Drop` is the backstop for error paths.
pub struct SshConnection {
    target: String,
    control_path: PathBuf,
    closed: bool,
}

impl SshConnection {
    /// Open and authenticate a connection to `target` (`user@host`).
    ///
    /// Uses the given private key file when present, otherwise ambient ssh
    /// credentials (agent, default identities).
    pub async fn open(
        target: &str,
        private_key: Option<&Path>,
    ) -> Result<SshConnection, SessionError> {
        #[cfg(test)]
        {
            if let Some(hook) = connect_hook_slot()
                .lock()
                .expect("ssh connect hook lock")
                .as_ref()
            {
                hook(target);
                return Ok(SshConnection {
                    target: target.to_string(),
                    control_path: std::env::temp_dir().join("skiff-test.sock"),
                    closed: false,
                });
            }
        }

        let control_path = build_control_path(target);
        let args = master_args(target, &control_path, private_key);
        let output = Command::new("ssh")
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| SessionError::Connection(format!("ssh: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // The master never came up, so there is nothing to tear down.
            let _ = std::fs::remove_file(&control_path);
            return Err(SessionError::Connection(format!(
                "failed to open ssh connection to {target}: {}",
                stderr.trim()
            )));
        }

        tracing::info!(target = %target, "connected");
        Ok(SshConnection {
            target: target.to_string(),
            control_path,
            closed: false,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Run one command over a non-interactive exec channel, capturing stdout
    /// and stderr distinctly.
    pub async fn exec_command(
        &self,
        command: &str,
        limit: Option<Duration>,
        pty: bool,
    ) -> Result<SessionOutput, SessionError> {
        let args = exec_args(&self.target, &self.control_path, command, pty);
        let mut cmd = Command::new("ssh");
        // Dropping the in-flight future (timeout below) must terminate the
        // remote exec channel as well.
        cmd.kill_on_drop(true);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = cmd
            .spawn()
            .map_err(|e| SessionError::Channel(format!("ssh: {e}")))?;

        let wait = child.wait_with_output();
        let output = match limit {
            Some(limit) => timeout(limit, wait).await.map_err(|_| {
                SessionError::Channel(format!(
                    "timed out after {}s waiting for: {command}",
                    limit.as_secs()
                ))
            })?,
            None => wait.await,
        }
        .map_err(|e| SessionError::Channel(format!("ssh: {e}")))?;

        Ok(SessionOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Open an interactive pty-backed shell channel sized to `geometry`.
    ///
    /// Costs one extra round trip: the remote pty defaults to 80x24 because
    /// local stdin is a pipe, so the size is applied with `stty` before the
    /// channel is handed to the caller.
    pub async fn open_shell(
        &self,
        geometry: TerminalGeometry,
    ) -> Result<SshShellChannel, SessionError> {
        let args = shell_args(&self.target, &self.control_path);
        let mut cmd = Command::new("ssh");
        cmd.kill_on_drop(true);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| SessionError::Channel(format!("ssh: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::Channel("shell channel has no stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::Channel("shell channel has no stdout".into()))?;

        let mut channel = SshShellChannel {
            _child: child,
            stdin,
            stdout,
        };
        channel
            .send(&format!(
                "stty columns {} rows {}\n",
                geometry.columns, geometry.rows
            ))
            .await?;
        Ok(channel)
    }

    /// Release the control master. Safe to call once; later calls and `Drop`
    /// are no-ops.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        close_control_connection(&self.target, &self.control_path);
    }
}

impl Drop for SshConnection {
    fn drop(&mut self) {
        self.close();
    }
}

fn close_control_connection(target: &str, control_path: &Path) {
    #[cfg(test)]
    {
        if let Some(hook) = close_hook_slot()
            .lock()
            .expect("ssh close hook lock")
            .as_ref()
        {
            hook(target, control_path);
            return;
        }
    }

    let _ = std::process::Command::new("ssh")
        .arg("-S")
        .arg(control_path)
        .arg("-O")
        .arg("exit")
        .arg(target)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    let _ = std::fs::remove_file(control_path);
}

/// Bidirectional channel over an interactive `ssh -tt` session.
pub struct SshShellChannel {
    _child: tokio::process::Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

/// Seam between the screen driver and the wire. Production uses
/// [`SshShellChannel`]; tests script the remote side.
#[async_trait]
pub trait InteractiveChannel: Send {
    /// Write raw bytes to the remote shell.
    async fn send(&mut self, data: &str) -> Result<(), SessionError>;

    /// Read up to one bounded chunk of output if any arrives within a short
    /// poll window; `None` when the channel is quiet.
    async fn recv_available(&mut self) -> Result<Option<String>, SessionError>;
}

#[async_trait]
impl InteractiveChannel for SshShellChannel {
    async fn send(&mut self, data: &str) -> Result<(), SessionError> {
        self.stdin
            .write_all(data.as_bytes())
            .await
            .map_err(|e| SessionError::Channel(format!("send: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| SessionError::Channel(format!("send: {e}")))
    }

    async fn recv_available(&mut self) -> Result<Option<String>, SessionError> {
        let mut buf = [0u8; RECV_CHUNK];
        match timeout(RECV_POLL_WINDOW, self.stdout.read(&mut buf)).await {
            Ok(Ok(0)) => Ok(None),
            Ok(Ok(n)) => Ok(Some(String::from_utf8_lossy(&buf[..n]).to_string())),
            Ok(Err(e)) => Err(SessionError::Channel(format!("recv: {e}"))),
            Err(_) => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Argument builders (kept pure so the wire surface is testable)
// ---------------------------------------------------------------------------

fn master_args(target: &str, control_path: &Path, private_key: Option<&Path>) -> Vec<String> {
    let mut args = vec![
        "-MNf".to_string(),
        "-o".to_string(),
        "ControlMaster=yes".to_string(),
        "-o".to_string(),
        "ControlPersist=yes".to_string(),
        "-o".to_string(),
        format!("ControlPath={}", control_path.display()),
        "-o".to_string(),
        "StrictHostKeyChecking=accept-new".to_string(),
    ];
    if let Some(key) = private_key {
        args.push("-i".to_string());
        args.push(key.display().to_string());
    }
    args.push(target.to_string());
    args
}

fn exec_args(target: &str, control_path: &Path, command: &str, pty: bool) -> Vec<String> {
    let mut args = vec![
        if pty { "-tt" } else { "-T" }.to_string(),
        "-S".to_string(),
        control_path.display().to_string(),
        "-o".to_string(),
        "ControlMaster=no".to_string(),
        target.to_string(),
    ];
    args.push(command.to_string());
    args
}

fn shell_args(target: &str, control_path: &Path) -> Vec<String> {
    vec![
        "-tt".to_string(),
        "-S".to_string(),
        control_path.display().to_string(),
        "-o".to_string(),
        "ControlMaster=no".to_string(),
        target.to_string(),
    ]
}

fn build_control_path(target: &str) -> PathBuf {
    let mut hasher = DefaultHasher::new();
    target.hash(&mut hasher);
    std::process::id().hash(&mut hasher);
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .hash(&mut hasher);
    let hash = hasher.finish();
    std::env::temp_dir().join(format!("skiff-ssh-{hash:x}.sock"))
}

// ---------------------------------------------------------------------------
// Test hooks
// ---------------------------------------------------------------------------

#[cfg(test)]
type CloseHook = Box<dyn Fn(&str, &Path) + Send + Sync + 'static>;
#[cfg(test)]
type ConnectHook = Box<dyn Fn(&str) + Send + Sync + 'static>;

#[cfg(test)]
fn close_hook_slot() -> &'static StdMutex<Option<CloseHook>> {
    static SLOT: OnceLock<StdMutex<Option<CloseHook>>> = OnceLock::new();
    SLOT.get_or_init(|| StdMutex::new(None))
}

#[cfg(test)]
fn connect_hook_slot() -> &'static StdMutex<Option<ConnectHook>> {
    static SLOT: OnceLock<StdMutex<Option<ConnectHook>>> = OnceLock::new();
    SLOT.get_or_init(|| StdMutex::new(None))
}

#[cfg(test)]
pub(crate) fn set_close_hook_for_tests(hook: Option<CloseHook>) {
    *close_hook_slot().lock().expect("ssh close hook lock") = hook;
}

#[cfg(test)]
pub(crate) fn set_connect_hook_for_tests(hook: Option<ConnectHook>) {
    *connect_hook_slot().lock().expect("ssh connect hook lock") = hook;
}
