//! Screen session driver: start a named session, inject the command and its
//! completion marker, then either poll for completion or detach.
//!
//! The driver owns only the interactive channel. The caller owns the
//! connection and closes it after the driver returns, whatever the outcome,
//! so the `Closed` state is reached on every path.

use crate::error::SessionError;
use crate::marker::{contains_completion, injection_line, CompletionMarker};
use crate::transport::InteractiveChannel;
use std::io::Write;
use tokio::time::{sleep, Duration, Instant};

/// Grace period after `screen -S` before the session accepts input. Screen
/// needs a moment to initialize; injecting earlier loses the command.
const SESSION_SETTLE_DELAY: Duration = Duration::from_millis(100);
/// How long to let the command start before detaching.
const DETACH_GRACE: Duration = Duration::from_secs(1);
/// Pause between polling iterations.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Screen's native detach sequence: Ctrl-A, then `d`.
const DETACH_KEYS: &str = "\x01d";

/// How the driver waits after injecting the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitMode {
    /// Poll output for the completion token. `None` means poll forever — the
    /// caller opts into that liveness risk deliberately.
    Poll { limit: Option<Duration> },
    /// Leave the command running and detach from the session.
    Detach,
}

/// Drive one command through a fresh screen session.
///
/// Returns the merged output accumulated from the channel; screen does not
/// separate stdout from stderr.
pub(crate) async fn drive_screen(
    channel: &mut dyn InteractiveChannel,
    command: &str,
    marker: &CompletionMarker,
    terminate: bool,
    mode: WaitMode,
    mirror_output: bool,
) -> Result<String, SessionError> {
    channel
        .send(&format!("screen -S {}\n", marker.session_name))
        .await?;
    sleep(SESSION_SETTLE_DELAY).await;

    channel
        .send(&injection_line(command, &marker.token, terminate))
        .await?;
    channel.send("\n").await?;

    let mut buffer = String::new();
    match mode {
        WaitMode::Detach => {
            sleep(DETACH_GRACE).await;
            // One bounded read, best effort: whatever already arrived is all
            // the caller gets. Draining further would stall behind a command
            // that streams output continuously.
            if let Some(chunk) = channel.recv_available().await? {
                buffer.push_str(&chunk);
            }
            channel.send(DETACH_KEYS).await?;
            tracing::info!(session = %marker.session_name, "detached from screen session");
        }
        WaitMode::Poll { limit } => {
            let started_at = Instant::now();
            loop {
                if let Some(chunk) = channel.recv_available().await? {
                    buffer.push_str(&chunk);
                    if mirror_output {
                        let mut stdout = std::io::stdout();
                        let _ = stdout.write_all(chunk.as_bytes());
                        let _ = stdout.flush();
                    }
                    if contains_completion(&buffer, &marker.token) {
                        break;
                    }
                }
                if let Some(limit) = limit {
                    if started_at.elapsed() > limit {
                        tracing::warn!(command = %command, "timeout waiting for command");
                        break;
                    }
                }
                sleep(POLL_INTERVAL).await;
            }
        }
    }

    Ok(buffer)
}
