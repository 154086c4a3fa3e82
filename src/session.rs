//! Execution facade: one `Session` per target instance, one transport
//! connection per execution attempt.
//!
//! `run` picks between the plain one-shot path (distinct stdout/stderr, no
//! screen) and the screen-backed path (detachable, merged output). The
//! instance state is checked before any connection is attempted.

use crate::error::SessionError;
use crate::instance::{Instance, InstanceDirectory, InstanceState};
use crate::marker::CompletionMarker;
use crate::screen::{drive_screen, WaitMode};
use crate::transport::{SshConnection, TerminalGeometry};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default polling limit for detached runs when the caller sets none.
const DEFAULT_DETACH_TIMEOUT: Duration = Duration::from_secs(600);

/// One command execution attempt. Immutable once built.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub command: String,
    pub timeout: Option<Duration>,
    /// Allocate a pty on the one-shot path.
    pub use_pty: bool,
    /// Run under screen and detach once the command has started.
    pub detach: bool,
    /// Tear the screen session down when the command completes.
    pub terminate: bool,
}

impl ExecutionRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: None,
            use_pty: false,
            detach: false,
            terminate: true,
        }
    }
}

/// Captured output of one execution.
///
/// The screen path cannot separate the two streams; both fields then hold the
/// same merged buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutput {
    pub stdout: String,
    pub stderr: String,
}

impl SessionOutput {
    pub(crate) fn merged(buffer: String) -> Self {
        Self {
            stdout: buffer.clone(),
            stderr: buffer,
        }
    }
}

impl fmt::Display for SessionOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stdout: {}\nstderr: {}",
            self.stdout.trim(),
            self.stderr.trim()
        )
    }
}

/// Connection settings shared by every execution through one session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub user: String,
    pub private_key: Option<PathBuf>,
    pub geometry: TerminalGeometry,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            user: "ec2-user".to_string(),
            private_key: None,
            geometry: TerminalGeometry::default(),
        }
    }
}

/// Execution facade bound to one described instance.
pub struct Session {
    options: SessionOptions,
    instance: Instance,
}

impl Session {
    /// Describe the instance once through the directory collaborator and bind
    /// a session to the snapshot.
    pub async fn open(
        directory: &dyn InstanceDirectory,
        instance_id: &str,
        region: &str,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let instance = directory.describe(instance_id, region).await?;
        Ok(Self { options, instance })
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Execute one request, choosing the screen path when detachment is
    /// wanted and the plain one-shot path otherwise.
    pub async fn run(&self, request: &ExecutionRequest) -> Result<SessionOutput, SessionError> {
        self.ensure_running()?;

        if request.detach {
            self.run_in_screen(
                &request.command,
                true,
                request.terminate,
                screen_timeout(request),
            )
            .await
        } else {
            self.run_single(&request.command, request.timeout, request.use_pty)
                .await
        }
    }

    /// Run a command over a one-shot exec channel, no screen involved.
    /// Stdout and stderr come back distinct.
    pub async fn run_single(
        &self,
        command: &str,
        limit: Option<Duration>,
        pty: bool,
    ) -> Result<SessionOutput, SessionError> {
        let mut connection = self.connect().await?;
        let result = connection.exec_command(command, limit, pty).await;
        connection.close();
        result
    }

    /// Run a command inside a fresh, uniquely named screen session.
    ///
    /// With `detach` the call returns right after the detach sequence and the
    /// command keeps running remotely. Without it, channel output is polled
    /// (and mirrored to stdout live) until the completion marker or `limit`;
    /// an elapsed limit is a soft outcome that returns the partial buffer.
    /// The connection is closed on every exit path before any error
    /// propagates.
    pub async fn run_in_screen(
        &self,
        command: &str,
        detach: bool,
        terminate: bool,
        limit: Option<Duration>,
    ) -> Result<SessionOutput, SessionError> {
        self.ensure_running()?;

        let probe = self.run_single("which screen", None, false).await?;
        if !probe.stdout.contains("screen") {
            return Err(SessionError::MissingRemoteTool(
                "screen is not installed; cannot run detached".into(),
            ));
        }

        let marker = CompletionMarker::derive(command);
        let mut connection = self.connect().await?;
        let outcome = match connection.open_shell(self.options.geometry).await {
            Ok(mut channel) => {
                let mode = if detach {
                    WaitMode::Detach
                } else {
                    WaitMode::Poll { limit }
                };
                drive_screen(&mut channel, command, &marker, terminate, mode, !detach).await
            }
            Err(e) => Err(e),
        };
        // Close before surfacing any error so the screen session is left
        // alone and the master socket is gone.
        connection.close();
        let buffer = outcome?;

        if detach {
            tracing::info!(
                session = %marker.session_name,
                "command left running; reattach with: ssh {} -t screen -r {}",
                self.target()?,
                marker.session_name
            );
        }
        Ok(SessionOutput::merged(buffer))
    }

    fn ensure_running(&self) -> Result<(), SessionError> {
        if self.instance.state != InstanceState::Running {
            return Err(SessionError::NotRunning {
                instance_id: self.instance.instance_id.clone(),
                state: self.instance.state,
            });
        }
        Ok(())
    }

    fn target(&self) -> Result<String, SessionError> {
        let ip = self.instance.public_ip.as_deref().ok_or_else(|| {
            SessionError::Connection(format!(
                "instance {} has no public address",
                self.instance.instance_id
            ))
        })?;
        Ok(format!("{}@{ip}", self.options.user))
    }

    async fn connect(&self) -> Result<SshConnection, SessionError> {
        SshConnection::open(&self.target()?, self.options.private_key.as_deref()).await
    }
}

/// Polling limit for the screen path: detached runs always get a limit.
fn screen_timeout(request: &ExecutionRequest) -> Option<Duration> {
    Some(request.timeout.unwrap_or(DEFAULT_DETACH_TIMEOUT))
}
