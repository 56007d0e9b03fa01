use thiserror::Error;

/// Errors surfaced to callers of [`crate::Library`].
///
/// Every variant is raised before any state changes.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("missing content hash")]
    MissingIdentity,

    #[error("invalid content hash: {0}")]
    InvalidIdentity(String),

    #[error("rating delta must be +1 or -1, got {0}")]
    InvalidDelta(i64),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("path escapes the library root: {0}")]
    OutsideRoot(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LibraryError {
    /// True for rejections caused by the caller's input rather than the library
    pub fn is_client_error(&self) -> bool {
        !matches!(self, LibraryError::Store(_) | LibraryError::Io(_))
    }
}

pub type LibraryResult<T> = std::result::Result<T, LibraryError>;
