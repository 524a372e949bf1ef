//! Error types for exchange operations

use thiserror::Error;

/// Errors that can occur while exchanging data with the solver process
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// Segment creation failed at the OS level (permissions, resource limits)
    #[error("Failed to create segment '{name}': {reason}")]
    CreateFailed {
        /// Segment name
        name: String,
        /// OS-level failure description
        reason: String,
    },

    /// Segment not found on attach
    #[error("Segment not found: {name}")]
    NotFound {
        /// Segment name
        name: String,
    },

    /// Offset + length exceeds the segment or buffer size
    #[error("Out of bounds access: offset {offset} + {len} bytes exceeds size {size}")]
    OutOfBounds {
        /// Requested byte offset
        offset: usize,
        /// Requested byte length
        len: usize,
        /// Available size in bytes
        size: usize,
    },

    /// Declared shape or type tag disagrees with the requested reinterpretation
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// What the caller asked for
        expected: String,
        /// What the data actually declares
        found: String,
    },

    /// Hand-off wait exceeded its timeout budget
    #[error("Timed out after {waited_ms} ms waiting on '{name}'")]
    TimedOut {
        /// Gate or segment name waited on
        name: String,
        /// Milliseconds waited before giving up
        waited_ms: u64,
    },

    /// Fast-path prerequisites are missing on this host
    #[error("Shared-memory transport unavailable: {reason}")]
    TransportUnavailable {
        /// Why the fast path cannot be used
        reason: String,
    },

    /// Metadata file or record missing or unparseable when required
    #[error("Malformed metadata in {path}: {reason}")]
    MalformedMetadata {
        /// Path or location of the metadata
        path: String,
        /// Parse failure description
        reason: String,
    },

    /// Invalid segment size
    #[error("Invalid segment size: {size} bytes")]
    InvalidSize {
        /// Attempted size in bytes
        size: usize,
    },

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },

    /// Nix system call error
    #[error("System call error: {source}")]
    Nix {
        /// Source nix error
        #[from]
        source: nix::Error,
    },

    /// String slot did not contain valid UTF-8
    #[error("Invalid UTF-8 in string slot: {source}")]
    Utf8 {
        /// Source decode error
        #[from]
        source: std::string::FromUtf8Error,
    },
}

/// Result type for exchange operations
pub type ExchangeResult<T> = Result<T, ExchangeError>;
