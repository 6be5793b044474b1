//! Error taxonomy shared by every verification and decoding operation

use crate::storage::StorageError;

/// Result alias used across the library
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by verification, ABI resolution and decoding
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("contract {address} is already verified")]
    Conflict { address: String },

    #[error("failed to fetch source from {url}: {reason}")]
    UpstreamFetch { url: String, reason: String },

    #[error("compiler version {0} is not installed")]
    CompilerNotFound(String),

    /// The compiler ran but reported errors. `payload` keeps the compiler's own
    /// error list for diagnostic display.
    #[error("compilation failed: {message}")]
    Compile {
        message: String,
        payload: Option<serde_json::Value>,
    },

    #[error("deployed bytecode does not match compiled bytecode of {contract}")]
    BytecodeMismatch { contract: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("malformed compiler output: {0}")]
    MalformedOutput(String),

    #[error("verification queue is full")]
    QueueFull,

    /// A failure inside the service itself, such as a crashed worker
    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Fieldless classification of [`Error`], used by front-ends to pick a
/// status code without matching on payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    Conflict,
    UpstreamFetch,
    CompilerNotFound,
    Compile,
    BytecodeMismatch,
    Decode,
    MalformedOutput,
    QueueFull,
    Internal,
}

impl ErrorKind {
    /// HTTP status for this kind. Absent resources are always 404.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::InvalidInput => 400,
            ErrorKind::Conflict => 409,
            ErrorKind::UpstreamFetch => 502,
            ErrorKind::QueueFull => 503,
            ErrorKind::CompilerNotFound
            | ErrorKind::Compile
            | ErrorKind::BytecodeMismatch
            | ErrorKind::Decode
            | ErrorKind::MalformedOutput
            | ErrorKind::Internal => 500,
        }
    }

    /// Whether the caller can act on this error by changing the request
    pub fn is_actionable(self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidInput
                | ErrorKind::Conflict
                | ErrorKind::NotFound
                | ErrorKind::BytecodeMismatch
        )
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Conflict { .. } => ErrorKind::Conflict,
            Error::UpstreamFetch { .. } => ErrorKind::UpstreamFetch,
            Error::CompilerNotFound(_) => ErrorKind::CompilerNotFound,
            Error::Compile { .. } => ErrorKind::Compile,
            Error::BytecodeMismatch { .. } => ErrorKind::BytecodeMismatch,
            Error::Decode(_) => ErrorKind::Decode,
            Error::MalformedOutput(_) => ErrorKind::MalformedOutput,
            Error::QueueFull => ErrorKind::QueueFull,
            Error::Storage(StorageError::Conflict { .. }) => ErrorKind::Conflict,
            Error::Internal(_) | Error::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to show to API callers. Internal failures collapse to a
    /// generic text so storage and parser details do not leak.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal | ErrorKind::Decode | ErrorKind::MalformedOutput => {
                "internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }
}
