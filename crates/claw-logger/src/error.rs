//! Error types for the logging control plane.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Coarse classification of [`LoggerError`] values.
///
/// Callers that only need to branch on the kind of failure can match on
/// this instead of destructuring the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No logger is registered under the requested name.
    LoggerNotFound,
    /// Duplicate logger name or malformed configuration.
    InvalidConfig,
    /// A log file could not be created or opened.
    FileCreationFailed,
    /// Asynchronous dispatch workers could not be started.
    AsyncInitFailed,
    /// A sink backend could not be constructed.
    SinkCreationFailed,
    /// The process lacks permission for a filesystem operation.
    PermissionDenied,
    /// The target filesystem is out of space.
    DiskFull,
    /// A network-backed sink failed.
    NetworkError,
    /// A structured payload could not be serialized.
    SerializationFailed,
    /// Any other I/O failure while writing or flushing.
    Io,
}

/// Errors that can occur in the logging control plane.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// No logger with the given name exists.
    #[error("logger not found: {name}")]
    LoggerNotFound {
        /// The requested logger name.
        name: String,
    },

    /// The configuration was rejected.
    #[error("invalid config: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected.
        reason: String,
    },

    /// A log file could not be created.
    #[error("failed to create log file {}: {source}", path.display())]
    FileCreationFailed {
        /// The file that could not be created.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Async dispatch could not be initialised.
    #[error("async logging init failed: {reason}")]
    AsyncInitFailed {
        /// Why initialisation failed.
        reason: String,
    },

    /// A sink could not be constructed.
    #[error("sink creation failed: {reason}")]
    SinkCreationFailed {
        /// Why construction failed.
        reason: String,
    },

    /// Permission was denied for a path.
    #[error("permission denied: {}", path.display())]
    PermissionDenied {
        /// The path that could not be accessed.
        path: PathBuf,
    },

    /// The disk holding a path is full.
    #[error("disk full: {}", path.display())]
    DiskFull {
        /// The path being written when space ran out.
        path: PathBuf,
    },

    /// A network sink failed.
    #[error("network error: {0}")]
    NetworkError(String),

    /// Serialization of a structured payload failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(String),

    /// An I/O error occurred while writing or flushing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl LoggerError {
    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::LoggerNotFound { .. } => ErrorKind::LoggerNotFound,
            Self::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            Self::FileCreationFailed { .. } => ErrorKind::FileCreationFailed,
            Self::AsyncInitFailed { .. } => ErrorKind::AsyncInitFailed,
            Self::SinkCreationFailed { .. } => ErrorKind::SinkCreationFailed,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::DiskFull { .. } => ErrorKind::DiskFull,
            Self::NetworkError(_) => ErrorKind::NetworkError,
            Self::SerializationFailed(_) => ErrorKind::SerializationFailed,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Shorthand for an [`LoggerError::InvalidConfig`].
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Classifies an I/O error raised while opening `path`.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                path: path.to_path_buf(),
            },
            io::ErrorKind::StorageFull => Self::DiskFull {
                path: path.to_path_buf(),
            },
            _ => Self::FileCreationFailed {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }
}

impl From<serde_json::Error> for LoggerError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationFailed(err.to_string())
    }
}

/// Result type alias for logger operations.
pub type Result<T> = std::result::Result<T, LoggerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = LoggerError::LoggerNotFound {
            name: "app".to_string(),
        };
        assert_eq!(err.to_string(), "logger not found: app");

        let err = LoggerError::invalid_config("logger name already exists: app");
        assert_eq!(
            err.to_string(),
            "invalid config: logger name already exists: app"
        );

        let err = LoggerError::NetworkError("connection reset".to_string());
        assert_eq!(err.to_string(), "network error: connection reset");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LoggerError>();
    }

    #[test]
    fn kind_matches_variant() {
        assert_eq!(
            LoggerError::LoggerNotFound {
                name: "x".to_string()
            }
            .kind(),
            ErrorKind::LoggerNotFound
        );
        assert_eq!(
            LoggerError::invalid_config("bad").kind(),
            ErrorKind::InvalidConfig
        );
        assert_eq!(
            LoggerError::AsyncInitFailed {
                reason: "spawn".to_string()
            }
            .kind(),
            ErrorKind::AsyncInitFailed
        );
        assert_eq!(
            LoggerError::SerializationFailed("x".to_string()).kind(),
            ErrorKind::SerializationFailed
        );
    }

    #[test]
    fn from_io_classifies_permission_denied() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        let err = LoggerError::from_io(Path::new("/var/log/app.log"), io_err);
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert!(err.to_string().contains("/var/log/app.log"));
    }

    #[test]
    fn from_io_classifies_storage_full() {
        let io_err = io::Error::new(io::ErrorKind::StorageFull, "full");
        let err = LoggerError::from_io(Path::new("app.log"), io_err);
        assert_eq!(err.kind(), ErrorKind::DiskFull);
    }

    #[test]
    fn from_io_defaults_to_file_creation_failed() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing dir");
        let err = LoggerError::from_io(Path::new("missing/app.log"), io_err);
        assert_eq!(err.kind(), ErrorKind::FileCreationFailed);
        assert!(err.to_string().contains("missing dir"));
    }

    #[test]
    fn io_conversion() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        let err: LoggerError = io_err.into();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn serde_json_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json");
        let err: LoggerError = match parse_err {
            Ok(_) => LoggerError::SerializationFailed("unexpected".to_string()),
            Err(e) => e.into(),
        };
        assert_eq!(err.kind(), ErrorKind::SerializationFailed);
    }

    #[test]
    fn result_type_err() {
        let result: Result<i32> = Err(LoggerError::NetworkError("down".to_string()));
        assert!(result.is_err());
    }
}
