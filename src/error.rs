//! Unified error types for the stream adapter.
//!
//! Only transport faults are fatal to a run. Everything else in the core
//! degrades to "no event", "no preview", or an implicit rejection, so these
//! enums stay small on purpose.

use std::fmt;

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// Faults raised by the duplex channel underneath the frame queue.
///
/// `Clone` because one channel fault is fanned out to every waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The channel closed cleanly; no more frames will arrive.
    Closed,
    /// The channel reported an error and stopped delivering frames.
    Failed(String),
    /// An outbound envelope could not be written.
    Send(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "channel closed"),
            Self::Failed(msg) => write!(f, "channel failed: {msg}"),
            Self::Send(msg) => write!(f, "send failed: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

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

// ---------------------------------------------------------------------------
// SessionError
// ---------------------------------------------------------------------------

/// Errors from the agent session and the run loop driving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    Transport(TransportError),
    /// A prompt was submitted while another run is still streaming.
    Busy,
    /// `send_prompt` was called before `connect`.
    NotConnected,
    /// The agent refused the request outright.
    Rejected(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Busy => write!(f, "a prompt is already running"),
            Self::NotConnected => write!(f, "session is not connected"),
            Self::Rejected(msg) => write!(f, "rejected by agent: {msg}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<TransportError> for SessionError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_display() {
        assert_eq!(TransportError::Closed.to_string(), "channel closed");
        assert_eq!(
            TransportError::Failed("broken pipe".into()).to_string(),
            "channel failed: broken pipe"
        );
        assert_eq!(
            TransportError::Send("queue full".into()).to_string(),
            "send failed: queue full"
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

    #[test]
    fn session_error_wraps_transport_fault() {
        let e = SessionError::from(TransportError::Closed);
        assert_eq!(e.to_string(), "transport: channel closed");
        assert_eq!(SessionError::Busy.to_string(), "a prompt is already running");
    }
}
