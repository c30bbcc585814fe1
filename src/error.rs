use std::collections::TryReserveError;

use thiserror::Error;

/// Errors that can occur while creating a [`ParserContext`](crate::ParserContext).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The field table could not be reserved.
    #[error("out of memory allocating parser context: {0}")]
    OutOfMemory(#[from] TryReserveError),
}

/// Reasons a flow was moved to [`ParseState::Error`](crate::ParseState::Error).
///
/// These are never returned from `parse`; they are recorded on the context
/// and exposed through [`ParserContext::error`](crate::ParserContext::error).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The leading bytes match neither the HTTP nor the FTP heuristic.
    #[error("unrecognized application protocol")]
    UnknownProtocol,
    /// A line ran past the scan window without a terminator.
    #[error("line exceeds the {limit}-byte scan window")]
    LineTooLong {
        /// The configured window that was exceeded.
        limit: usize,
    },
    /// An unexpected byte was encountered at a structural boundary.
    #[error("unexpected byte 0x{found:02X} (expected {expected})")]
    UnexpectedByte {
        /// Human-readable description of what was expected.
        expected: &'static str,
        /// The actual byte value found.
        found: u8,
    },
    /// The `Content-Length` header value is not a decimal integer.
    #[error("invalid Content-Length value")]
    InvalidContentLength,
    /// A chunk-size line holds no hex digits or overflows.
    #[error("invalid chunk size")]
    InvalidChunkSize,
}
