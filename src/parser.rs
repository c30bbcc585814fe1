use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::detect::{Delimiter, Detection, Detector};
use crate::error::{ContextError, ParseError};
use crate::ftp::FtpState;
use crate::http::HttpState;
use crate::segment::{Cursor, GatherList};
use crate::types::{FieldId, MAX_FIELD_SLOTS, ParseState, ProtocolId};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Scan windows for the grammars.
///
/// All sizes are in bytes.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Longest HTTP request, header, chunk-size or trailer line (default: 8 192).
    pub max_line_len: usize,
    /// Longest FTP command line, terminator excluded (default: 512).
    pub max_ftp_line_len: usize,
    /// Longest leading token considered during detection (default: 7).
    pub max_token_len: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_line_len: 8_192,
            max_ftp_line_len: 512,
            max_token_len: 7,
        }
    }
}

// ---------------------------------------------------------------------------
// Grammar plumbing
// ---------------------------------------------------------------------------

/// Outcome of feeding one buffer to a grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Progress {
    /// All bytes consumed; the message continues in a later buffer.
    More,
    /// The terminal byte was consumed; later bytes are left untouched.
    Done,
}

/// Per-protocol field slots, bound once the protocol is known.
#[derive(Debug, Default)]
pub(crate) struct FieldTable {
    protocol: Option<ProtocolId>,
    slots: Vec<GatherList>,
}

impl FieldTable {
    fn try_new() -> Result<Self, ContextError> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(MAX_FIELD_SLOTS)?;
        Ok(Self {
            protocol: None,
            slots,
        })
    }

    pub(crate) fn bind(&mut self, protocol: ProtocolId) {
        self.protocol = Some(protocol);
        self.slots.clear();
        self.slots
            .resize_with(protocol.fields().len(), GatherList::new);
    }

    fn unbind(&mut self) {
        self.protocol = None;
        self.slots.clear();
    }

    /// The value of `id`, if it belongs to the bound protocol and was seen.
    pub(crate) fn get(&self, id: FieldId) -> Option<&GatherList> {
        if self.protocol != Some(id.protocol()) {
            return None;
        }
        self.slots.get(id.slot()).filter(|list| !list.is_empty())
    }

    /// Slot for `id`; grammars only write fields of their own protocol.
    pub(crate) fn slot_mut(&mut self, id: FieldId) -> &mut GatherList {
        debug_assert_eq!(self.protocol, Some(id.protocol()));
        &mut self.slots[id.slot()]
    }

    fn iter(&self) -> impl Iterator<Item = (FieldId, &GatherList)> {
        self.protocol
            .map_or(&[][..], |p| p.fields())
            .iter()
            .copied()
            .zip(self.slots.iter())
            .filter(|(_, list)| !list.is_empty())
    }
}

/// Active grammar, selected once at detection time.
#[derive(Debug)]
enum Grammar {
    Detect(Detector),
    Http(HttpState),
    Ftp(FtpState),
    /// Terminal; transient sub-state has been released.
    Closed,
}

// ---------------------------------------------------------------------------
// ParserContext
// ---------------------------------------------------------------------------

/// Persistent per-flow parsing state.
///
/// Fields are stored as [`GatherList`]s referencing the buffers passed to
/// [`ParserContext::parse`], so they can be queried at any point, including
/// between calls and after an error.
///
/// # Usage
///
/// ```rust
/// use bytes::Bytes;
/// use dpiparse::{FieldId, ParseState, ParserContext, ProtocolId};
///
/// let mut ctx = ParserContext::try_new().unwrap();
///
/// let state = ctx.parse(&Bytes::from_static(b"GET /ind"), 0);
/// assert_eq!(state, ParseState::Partial);
///
/// let state = ctx.parse(&Bytes::from_static(b"ex.html HTTP/1.1\r\n\r\n"), 0);
/// assert_eq!(state, ParseState::Done);
///
/// assert_eq!(ctx.protocol(), Some(ProtocolId::HTTP));
/// assert!(ctx.field(FieldId::HttpUri).unwrap().eq_bytes(b"/index.html"));
/// ```
#[derive(Debug)]
pub struct ParserContext {
    config: ParserConfig,
    state: ParseState,
    grammar: Grammar,
    fields: FieldTable,
    error: Option<ParseError>,
    bytes_consumed: u64,
    resume_offset: Option<usize>,
}

impl ParserContext {
    /// Allocate a context with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::OutOfMemory`] if the field table cannot be
    /// reserved.
    pub fn try_new() -> Result<Self, ContextError> {
        Self::try_with_config(ParserConfig::default())
    }

    /// Allocate a context with custom scan windows.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::OutOfMemory`] if the field table cannot be
    /// reserved.
    pub fn try_with_config(config: ParserConfig) -> Result<Self, ContextError> {
        Ok(Self {
            config,
            state: ParseState::Init,
            grammar: Grammar::Detect(Detector::default()),
            fields: FieldTable::try_new()?,
            error: None,
            bytes_consumed: 0,
            resume_offset: None,
        })
    }

    /// Return the context to [`ParseState::Init`] so the next message of the
    /// same flow can be parsed. Captured fields are released.
    pub fn reset(&mut self) {
        self.state = ParseState::Init;
        self.grammar = Grammar::Detect(Detector::default());
        self.fields.unbind();
        self.error = None;
        self.bytes_consumed = 0;
        self.resume_offset = None;
    }

    /// Feed the payload of `buffer`, starting at `payload_offset`.
    ///
    /// Parsing resumes exactly where the previous call stopped. The context
    /// keeps references into `buffer` for every field byte it contained.
    /// Once [`ParseState::Done`] or [`ParseState::Error`] is reached, further
    /// calls change nothing and return the same state.
    pub fn parse(&mut self, buffer: &Bytes, payload_offset: usize) -> ParseState {
        if self.state.is_terminal() {
            trace!(state = %self.state, "flow already terminal, buffer ignored");
            return self.state;
        }
        if payload_offset > buffer.len() {
            warn!(
                payload_offset,
                buffer_len = buffer.len(),
                "payload offset past end of buffer, nothing to parse"
            );
            return self.state;
        }
        if payload_offset == buffer.len() {
            return self.state;
        }

        let mut cur = Cursor::new(buffer, payload_offset);
        let outcome = self.advance(&mut cur);
        self.bytes_consumed += (cur.pos() - payload_offset) as u64;

        self.state = match outcome {
            Ok(Progress::More) => ParseState::Partial,
            Ok(Progress::Done) => {
                self.resume_offset = Some(cur.pos());
                self.grammar = Grammar::Closed;
                debug!(
                    protocol = ?self.protocol(),
                    bytes_consumed = self.bytes_consumed,
                    "message complete"
                );
                ParseState::Done
            }
            Err(e) => {
                debug!(
                    protocol = ?self.protocol(),
                    offset = cur.pos(),
                    error = %e,
                    "flow rejected"
                );
                self.error = Some(e);
                self.grammar = Grammar::Closed;
                ParseState::Error
            }
        };

        trace!(
            state = %self.state,
            consumed = cur.pos() - payload_offset,
            "buffer parsed"
        );
        self.state
    }

    fn advance(&mut self, cur: &mut Cursor<'_>) -> Result<Progress, ParseError> {
        let max_token_len = self.config.max_token_len;
        loop {
            let detection = match &mut self.grammar {
                Grammar::Detect(detector) => detector.advance(cur, max_token_len)?,
                Grammar::Http(http) => return http.advance(cur, &mut self.fields, &self.config),
                Grammar::Ftp(ftp) => return ftp.advance(cur, &mut self.fields, &self.config),
                Grammar::Closed => return Ok(Progress::Done),
            };

            let Detection::Found {
                protocol,
                token,
                delimiter,
            } = detection
            else {
                return Ok(Progress::More);
            };

            let token_len = token.len();
            self.fields.bind(protocol);
            self.grammar = match protocol {
                ProtocolId::HTTP => {
                    *self.fields.slot_mut(FieldId::HttpMethod) = token;
                    Grammar::Http(HttpState::new(token_len))
                }
                ProtocolId::FTP => {
                    *self.fields.slot_mut(FieldId::FtpCommand) = token;
                    match delimiter {
                        Delimiter::Space => Grammar::Ftp(FtpState::new(token_len, false)),
                        Delimiter::Cr => Grammar::Ftp(FtpState::new(token_len, true)),
                        // Bare command already terminated.
                        Delimiter::Lf => return Ok(Progress::Done),
                    }
                }
            };
        }
    }

    // ----- public query ---------------------------------------------------

    /// Current top-level state.
    pub fn state(&self) -> ParseState {
        self.state
    }

    /// The detected protocol, or `None` while undetermined.
    pub fn protocol(&self) -> Option<ProtocolId> {
        self.fields.protocol
    }

    /// The value of `id` gathered so far.
    ///
    /// Returns `None` if the field does not belong to the detected protocol,
    /// has not been observed, or no protocol is known yet. While the state is
    /// [`ParseState::Partial`] the value may still grow.
    pub fn field(&self, id: FieldId) -> Option<&GatherList> {
        self.fields.get(id)
    }

    /// Every observed field, in field-table order.
    pub fn fields(&self) -> impl Iterator<Item = (FieldId, &GatherList)> {
        self.fields.iter()
    }

    /// Why the context entered [`ParseState::Error`].
    pub fn error(&self) -> Option<&ParseError> {
        self.error.as_ref()
    }

    /// Payload bytes consumed since allocation or the last [`reset`](Self::reset).
    pub fn bytes_consumed(&self) -> u64 {
        self.bytes_consumed
    }

    /// Offset in the last buffer just past the byte that completed the
    /// message. Bytes from there on belong to the next message of the flow.
    pub fn resume_offset(&self) -> Option<usize> {
        self.resume_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_is_unbound() {
        let ctx = ParserContext::try_new().unwrap();
        assert_eq!(ctx.state(), ParseState::Init);
        assert_eq!(ctx.protocol(), None);
        assert!(ctx.fields.slots.capacity() >= MAX_FIELD_SLOTS);
        assert_eq!(ctx.fields().count(), 0);
    }

    #[test]
    fn empty_payload_keeps_init() {
        let mut ctx = ParserContext::try_new().unwrap();
        let buf = Bytes::from_static(b"\x45\x00header");
        assert_eq!(ctx.parse(&buf, buf.len()), ParseState::Init);
        assert_eq!(ctx.parse(&buf, buf.len() + 4), ParseState::Init);
        assert_eq!(ctx.bytes_consumed(), 0);
    }

    #[test]
    fn table_rejects_foreign_fields() {
        let mut table = FieldTable::default();
        table.bind(ProtocolId::FTP);
        let buf = Bytes::from_static(b"USER");
        table
            .slot_mut(FieldId::FtpCommand)
            .push(crate::segment::Segment::from_range(&buf, 0..4));
        assert!(table.get(FieldId::FtpCommand).is_some());
        assert!(table.get(FieldId::HttpMethod).is_none());
        assert!(table.get(FieldId::FtpArg).is_none());
    }

    #[test]
    fn grammar_state_released_when_terminal() {
        let mut ctx = ParserContext::try_new().unwrap();
        ctx.parse(&Bytes::from_static(b"NOOP\r\n"), 0);
        assert_eq!(ctx.state(), ParseState::Done);
        assert!(matches!(ctx.grammar, Grammar::Closed));
    }
}
