//! Error types for partition selection.

/// Category of a [`SelectionError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A caller-supplied parameter was missing or out of range.
    InvalidArgument,
}

/// Errors that can occur while configuring a partition selection strategy.
///
/// The display form is the bare message so callers can match on its prefix,
/// e.g. `"Delta has to be in the interval"`.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum SelectionError {
    /// Invalid parameter provided.
    #[error("{msg}")]
    InvalidArgument {
        /// Human-readable error description.
        msg: String,
    },
}

/// Result type for partition selection operations.
pub type Result<T> = std::result::Result<T, SelectionError>;

impl SelectionError {
    /// Create an invalid argument error.
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument { msg: msg.into() }
    }

    /// The error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
        }
    }

    /// The human-readable message.
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidArgument { msg } => msg,
        }
    }
}
