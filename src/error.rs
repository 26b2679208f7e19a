//! Error types for the value-set cache

use std::time::Duration;

use thiserror::Error;

/// Main error type for the cache
#[derive(Error, Debug)]
pub enum Error {
    /// Wire codec error
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Shared store or queue error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Simulation time cannot be represented as a calendar timestamp
    #[error("Invalid time: {0}")]
    InvalidTime(String),

    /// Link id not known to this process
    #[error("Unknown link: {0}")]
    UnknownLink(String),

    /// No configured service produces the quantity
    #[error("No service produces quantity: {0}")]
    UnroutableQuantity(String),

    /// Optional hard deadline elapsed while waiting for a value set
    #[error("Timed out after {waited:?} waiting for {key}")]
    Timeout {
        /// Store key being waited on
        key: String,
        /// Total time spent waiting
        waited: Duration,
    },

    /// General error
    #[error("{0}")]
    General(String),
}

/// Binary codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input ended before the value was complete
    #[error("Unexpected end of buffer: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof {
        /// Bytes required by the read
        needed: usize,
        /// Bytes left in the buffer
        remaining: usize,
    },

    /// Length prefix or byte count does not fit the element width
    #[error("Invalid length: {0}")]
    InvalidLength(String),

    /// String bytes are not valid (modified) UTF-8
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Encoded string exceeds the 65535-byte length prefix
    #[error("String too long: {0} bytes")]
    StringTooLong(usize),

    /// Data is corrupted
    #[error("Corrupted data: {0}")]
    CorruptedData(String),
}

/// Shared store and queue errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Could not reach the backing store
    #[error("Connection error: {0}")]
    Connection(String),

    /// The structure has been shut down
    #[error("Store closed: {0}")]
    Closed(String),

    /// A stored entry could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<CodecError> for StoreError {
    fn from(err: CodecError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_converts() {
        let err: Error = CodecError::StringTooLong(70_000).into();
        assert!(matches!(err, Error::Codec(CodecError::StringTooLong(70_000))));
        assert_eq!(err.to_string(), "Codec error: String too long: 70000 bytes");
    }

    #[test]
    fn test_timeout_display() {
        let err = Error::Timeout {
            key: "k".to_string(),
            waited: Duration::from_secs(3),
        };
        assert_eq!(err.to_string(), "Timed out after 3s waiting for k");
    }
}
