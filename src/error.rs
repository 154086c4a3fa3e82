//! Unified error types for skiff.

use std::fmt;

// ---------------------------------------------------------------------------
// SessionError
// ---------------------------------------------------------------------------

/// Errors arising while executing a command against a remote instance.
#[derive(Debug)]
pub enum SessionError {
    /// The target instance exists but is not in the `running` state.
    NotRunning {
        instance_id: String,
        state: crate::instance::InstanceState,
    },
    /// A tool required on the remote host is missing (e.g. `screen`).
    MissingRemoteTool(String),
    /// Opening or authenticating the ssh transport failed.
    Connection(String),
    /// The instance-directory lookup failed.
    Describe(String),
    /// The remote channel failed mid-flight.
    Channel(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRunning { instance_id, state } => {
                write!(f, "instance {instance_id} is not running (state: {state})")
            }
            Self::MissingRemoteTool(msg) => write!(f, "missing remote tool: {msg}"),
            Self::Connection(msg) => write!(f, "connection failed: {msg}"),
            Self::Describe(msg) => write!(f, "describe failed: {msg}"),
            Self::Channel(msg) => write!(f, "channel error: {msg}"),
        }
    }
}

impl std::error::Error for SessionError {}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors when loading or parsing configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Toml(e) => write!(f, "toml: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::InstanceState;

    #[test]
    fn session_error_display() {
        let e = SessionError::NotRunning {
            instance_id: "i-0abc".into(),
            state: InstanceState::Stopped,
        };
        assert_eq!(
            e.to_string(),
            "instance i-0abc is not running (state: stopped)"
        );
        assert_eq!(
            SessionError::MissingRemoteTool("screen is not installed".into()).to_string(),
            "missing remote tool: screen is not installed"
        );
        assert_eq!(
            SessionError::Connection("auth refused".into()).to_string(),
            "connection failed: auth refused"
        );
    }

    #[test]
    fn config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let e = ConfigError::from(io_err);
        let s = e.to_string();
        assert!(s.starts_with("io:"), "got: {s}");
        assert!(s.contains("file not found"));
    }

    #[test]
    fn config_error_from_toml() {
        let toml_err: toml::de::Error = toml::from_str::<toml::Value>("x = [unclosed").unwrap_err();
        let e = ConfigError::from(toml_err);
        assert!(e.to_string().starts_with("toml:"));
    }
}
