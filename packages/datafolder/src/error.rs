//! Error types for data folder loading and configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Error reported by a wiki engine whose boot did not produce a server.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct BootError {
    message: String,
}

impl BootError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Why a data folder could not be initialized.
///
/// Every variant ends in the folder's terminal failure handler; none of them
/// is propagated past the loader.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The manifest file could not be read.
    #[error("cannot read manifest {path}: {source}")]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The manifest file is not valid JSON of the expected shape.
    #[error("cannot parse manifest {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The manifest names a folder type no initializer exists for.
    #[error("unsupported data folder type: {0}")]
    UnsupportedType(String),

    /// The wiki engine failed to boot.
    #[error("engine boot failed: {0}")]
    Boot(#[from] BootError),

    /// The boot task ended without a result (it panicked or was cancelled).
    #[error("boot task aborted: {0}")]
    Aborted(String),
}

/// Errors loading a service configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Transport failure reported by a socket implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SocketError {
    #[error("socket is closed")]
    Closed,

    #[error("send failed: {0}")]
    Send(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn boot_error_converts_into_load_error() {
        let e: LoadError = BootError::new("no boot.js").into();
        assert!(matches!(e, LoadError::Boot(_)));
        assert_eq!(e.to_string(), "engine boot failed: no boot.js");
    }

    #[test]
    fn manifest_read_keeps_io_source() {
        let e = LoadError::ManifestRead {
            path: PathBuf::from("/srv/w/tiddlywiki.info"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(e.to_string().contains("/srv/w/tiddlywiki.info"));
        assert!(StdError::source(&e).is_some());
    }

    #[test]
    fn unsupported_type_display() {
        let e = LoadError::UnsupportedType("jekyll".to_string());
        assert_eq!(e.to_string(), "unsupported data folder type: jekyll");
        assert!(StdError::source(&e).is_none());
    }

    #[test]
    fn socket_error_display() {
        assert_eq!(SocketError::Closed.to_string(), "socket is closed");
        assert!(SocketError::Send("broken pipe".to_string())
            .to_string()
            .contains("broken pipe"));
    }
}
