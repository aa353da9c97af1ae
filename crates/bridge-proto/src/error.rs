//! Error types for the IRC protocol library.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Top-level protocol errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A line exceeded the configured limit.
    #[error("message too long: {actual} bytes (limit {limit})")]
    MessageTooLong {
        /// Length of the offending line.
        actual: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// An outgoing message carried a NUL byte.
    #[error("illegal control character: {0:?}")]
    IllegalControlChar(char),

    /// The line could not be parsed as an IRC message.
    #[error("invalid message {string:?}: {cause}")]
    InvalidMessage {
        /// The raw line.
        string: String,
        /// What went wrong.
        cause: MessageParseError,
    },
}

/// Reasons a single line fails to parse.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum MessageParseError {
    /// Nothing but whitespace.
    #[error("empty message")]
    EmptyMessage,

    /// A prefix marker with nothing after it.
    #[error("empty prefix")]
    EmptyPrefix,

    /// No command token.
    #[error("missing command")]
    MissingCommand,

    /// A known command without its mandatory parameters.
    #[error("not enough arguments for {command}: expected {expected}, got {got}")]
    NotEnoughArguments {
        /// Command name.
        command: &'static str,
        /// Minimum number of parameters.
        expected: usize,
        /// Number present.
        got: usize,
    },
}
