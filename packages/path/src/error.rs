//! Error types for mount computation.

use thiserror::Error;

/// Errors raised while deriving a mount from resolver output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MountError {
    /// The inbound request carried no usable URL path.
    #[error("request has no url path")]
    MissingPath,

    /// The resolver reported a boundary past the end of the file path.
    #[error("data folder boundary {index} is outside the file path ({len} segments)")]
    BoundaryOutOfRange { index: usize, len: usize },
}

/// Result type alias for mount operations.
pub type Result<T> = std::result::Result<T, MountError>;
