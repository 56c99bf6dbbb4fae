use thiserror::Error;

/// Error taxonomy for the virtual file system.
///
/// `Configuration` never reaches a transport; everything else surfaces a
/// transport outcome wrapped with the high-level operation that failed.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("invalid connect parameters: {0}")]
    Configuration(String),

    #[error("remote path not found: {0}")]
    NotFound(String),

    #[error("{op} failed: {message}")]
    Transport { op: &'static str, message: String },

    #[error("{op} reported failure: {message}")]
    OperationFailed { op: &'static str, message: String },

    #[error("{0} is not supported by this file system")]
    Unsupported(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FsError {
    pub fn transport(op: &'static str, message: impl Into<String>) -> Self {
        Self::Transport {
            op,
            message: message.into(),
        }
    }

    pub fn operation_failed(op: &'static str, message: impl Into<String>) -> Self {
        Self::OperationFailed {
            op,
            message: message.into(),
        }
    }
}

// The russh Handler contract requires its error type to absorb russh errors.
impl From<russh::Error> for FsError {
    fn from(e: russh::Error) -> Self {
        FsError::transport("ssh", e.to_string())
    }
}

pub type FsResult<T> = std::result::Result<T, FsError>;
