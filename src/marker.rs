//! Completion-marker derivation, injection building, and output scanning.
//!
//! Screen does not report command completion, so skiff appends an `echo` of a
//! synthetic token to every injected command and scans the merged channel
//! output for it. The token is a digest fragment of the command text, never
//! human-plausible prompt text, so it does not collide with ordinary shell
//! output. The session name adds a nanosecond timestamp so repeated runs of
//! the same command land in distinct screen sessions.

use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

const SESSION_DIGEST_LEN: usize = 16;
const TOKEN_DIGEST_LEN: usize = 12;

/// Marker pair derived from one command's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionMarker {
    /// Unique screen session name (`skiff-<digest>-<nanos>`).
    pub session_name: String,
    /// Literal string scanned for in channel output.
    pub token: String,
}

impl CompletionMarker {
    /// Derive the marker pair for a command.
    ///
    /// The token is deterministic for a given command; the session name is
    /// unique across invocations.
    pub fn derive(command: &str) -> Self {
        let digest = command_digest(command);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        Self {
            session_name: format!("skiff-{}-{nanos}", &digest[..SESSION_DIGEST_LEN]),
            token: format!("CMD_COMPLETED_{}", &digest[..TOKEN_DIGEST_LEN]),
        }
    }
}

fn command_digest(command: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(command.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Build the exact line injected into the screen session.
///
/// The command runs first, then the token is echoed; when `terminate` is set
/// a `screen -X quit` rides on the same line so the session tears itself down
/// after the command finishes. The caller sends a newline afterwards to
/// trigger execution.
///
/// The command text is passed through verbatim: a command that prints the
/// token itself will be mistaken for completion. Known limitation.
pub fn injection_line(command: &str, token: &str, terminate: bool) -> String {
    if terminate {
        format!("{command}; echo '{token}'; screen -X quit")
    } else {
        format!("{command}; echo '{token}'")
    }
}

/// True iff `token` appears in `buffer` on a line of its own.
///
/// The echoed token arrives bounded by line breaks; a pty channel may use
/// either LF or CRLF. A token appearing as a substring of other text (the
/// echoed injection line, for instance) must not count.
pub fn contains_completion(buffer: &str, token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    let mut search = 0;
    while let Some(pos) = buffer[search..].find(token) {
        let start = search + pos;
        let end = start + token.len();
        if buffer[..start].ends_with('\n') && followed_by_line_break(&buffer[end..]) {
            return true;
        }
        search = start + 1;
    }
    false
}

fn followed_by_line_break(rest: &str) -> bool {
    rest.starts_with('\n') || rest.starts_with("\r\n")
}
