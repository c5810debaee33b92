//! Error types for tcpfwd-core.

use thiserror::Error;

/// Main error type for forwarding operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A task with this name is already running.
    #[error("task already running: {name}")]
    DuplicateTask { name: String },

    /// A listen port could not be bound while starting a task.
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Outbound connect to a forward target failed.
    #[error("failed to connect to {target}: {source}")]
    Dial {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// Read or write failed in the middle of a relay.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Task or relay configuration rejected before start.
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },

    /// Configuration could not be read, parsed or written.
    #[error("config error: {message}")]
    Config { message: String },
}

impl Error {
    /// Returns true if this error is a synchronous `start_task` failure.
    ///
    /// These errors leave the registry unchanged: nothing was started and no
    /// listener of the attempted task stays bound.
    pub fn is_start_failure(&self) -> bool {
        matches!(
            self,
            Error::DuplicateTask { .. } | Error::Bind { .. } | Error::InvalidConfig { .. }
        )
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config {
            message: err.to_string(),
        }
    }
}

/// Convenience result type for forwarding operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_duplicate() {
        let err = Error::DuplicateTask { name: "t1".into() };
        assert_eq!(err.to_string(), "task already running: t1");
    }

    #[test]
    fn error_display_bind() {
        let err = Error::Bind {
            port: 15000,
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
        };
        assert_eq!(err.to_string(), "failed to bind port 15000: address in use");
    }

    #[test]
    fn error_display_dial() {
        let err = Error::Dial {
            target: "10.0.0.1:22".into(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert_eq!(err.to_string(), "failed to connect to 10.0.0.1:22: refused");
    }

    #[test]
    fn bind_error_keeps_source() {
        use std::error::Error as _;

        let err = Error::Bind {
            port: 1,
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.source().is_some());
    }

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn json_error_conversion() {
        let json_err = serde_json::from_str::<u16>("nope").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn start_failures() {
        assert!(Error::DuplicateTask { name: "a".into() }.is_start_failure());
        assert!(Error::invalid_config("bad").is_start_failure());
        assert!(Error::Bind {
            port: 80,
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        }
        .is_start_failure());

        assert!(!Error::Transport {
            message: "reset".into()
        }
        .is_start_failure());
    }
}
