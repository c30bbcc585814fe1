//! # dpiparse
//!
//! A **streaming, zero-copy deep packet inspection parser** for
//! application-layer protocols (HTTP and FTP) carried over a transport flow.
//!
//! Each flow owns a [`ParserContext`]. Packets are fed in flow order together
//! with the offset where their application payload starts; the context
//! detects the protocol from the first bytes, then resumes the protocol's
//! state machine on every call. Extracted fields are [`GatherList`]s of
//! [`Segment`]s pointing into the packet buffers, never copies, and can be
//! queried at any time, even while the message is still incomplete.
//!
//! Validation is intentionally minimal: the parser favours throughput and
//! tolerates false positives.
//!
//! ## Quick start
//!
//! ```rust
//! use bytes::Bytes;
//! use dpiparse::{FieldId, ParseState, ProtocolId};
//!
//! let mut ctx = dpiparse::alloc().expect("context");
//!
//! let packet = Bytes::from_static(b"\x00\x01USER anonymous\r\n");
//! assert_eq!(dpiparse::parse(&packet, 2, &mut ctx), ParseState::Done);
//!
//! assert_eq!(dpiparse::protocol_get(&ctx), Some(ProtocolId::FTP));
//! let arg = dpiparse::field_get(&ctx, FieldId::FtpArg).unwrap();
//! assert!(arg.eq_bytes(b"anonymous"));
//!
//! dpiparse::dealloc(ctx);
//! ```
//!
//! ## Buffer ownership
//!
//! Payload buffers are [`bytes::Bytes`]. A segment holds a reference-counted
//! handle to its packet, so a buffer stays valid for as long as any field
//! points into it, and it cannot be modified in the meantime.

mod detect;
mod error;
mod ftp;
mod http;
mod output;
mod parser;
mod segment;
mod types;

pub use bytes::Bytes;

// Re-export public API.
pub use error::{ContextError, ParseError};
pub use output::{ContextSummary, FieldSummary, format_debug, format_fields_only, format_json};
pub use parser::{ParserConfig, ParserContext};
pub use segment::{GatherBytes, GatherList, Segment};
pub use types::{FieldId, ParseState, ProtocolId};

/// Allocate a parser context for a new flow.
///
/// # Errors
///
/// Returns [`ContextError::OutOfMemory`] if the context's field table cannot
/// be allocated; no partial context is produced.
pub fn alloc() -> Result<ParserContext, ContextError> {
    ParserContext::try_new()
}

/// Allocate a parser context using custom [`ParserConfig`] scan windows.
///
/// # Errors
///
/// Returns [`ContextError::OutOfMemory`] if allocation fails.
pub fn alloc_with_config(config: ParserConfig) -> Result<ParserContext, ContextError> {
    ParserContext::try_with_config(config)
}

/// Release a context and its bookkeeping.
///
/// Buffers referenced by its fields are only released if the caller holds no
/// other handle to them. The context is moved in, so it cannot be used again.
pub fn dealloc(ctx: ParserContext) {
    drop(ctx);
}

/// Parse the payload of `buffer` starting at `payload_offset`.
///
/// See [`ParserContext::parse`].
pub fn parse(buffer: &Bytes, payload_offset: usize, ctx: &mut ParserContext) -> ParseState {
    ctx.parse(buffer, payload_offset)
}

/// The detected protocol, or `None` while undetermined.
pub fn protocol_get(ctx: &ParserContext) -> Option<ProtocolId> {
    ctx.protocol()
}

/// The gathered value of `field_id`, or `None` when not found.
pub fn field_get(ctx: &ParserContext, field_id: FieldId) -> Option<&GatherList> {
    ctx.field(field_id)
}
