//! HTTP/1.x request grammar.
//!
//! Captures the request-target, version and a fixed set of headers as
//! gather lists, then frames the body by `Transfer-Encoding: chunked` or
//! `Content-Length`. Validation is deliberately shallow: only the structure
//! needed to find field and message boundaries is checked.

use crate::error::ParseError;
use crate::parser::{FieldTable, ParserConfig, Progress};
use crate::segment::{Cursor, GatherList, Segment};
use crate::types::FieldId;

/// Header names (matched case-insensitively) and the fields they fill.
const HEADER_FIELDS: &[(&[u8], FieldId)] = &[
    (b"host", FieldId::HttpHost),
    (b"user-agent", FieldId::HttpUserAgent),
    (b"referer", FieldId::HttpReferer),
    (b"cookie", FieldId::HttpCookie),
    (b"content-type", FieldId::HttpContentType),
    (b"content-length", FieldId::HttpContentLength),
    (b"transfer-encoding", FieldId::HttpTransferEncoding),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    // ---- Request line ----
    UriStart,
    Uri,
    VersionStart,
    Version,
    RequestLineLf,

    // ---- Header section ----
    HeaderStart,
    HeaderName,
    HeaderValueOws,
    HeaderValue,
    HeaderLf,
    EndHeadersLf,

    // ---- Fixed-length body ----
    Body,

    // ---- Chunked transfer encoding ----
    ChunkSize,
    ChunkExt,
    ChunkSizeLf,
    ChunkData,
    ChunkDataCr,
    ChunkDataLf,

    // ---- Chunked trailers ----
    TrailerStart,
    TrailerLine,
    TrailerEndLf,
}

/// Resume point of the HTTP grammar between `parse` calls.
#[derive(Debug)]
pub(crate) struct HttpState {
    phase: Phase,
    /// Bytes scanned on the current line.
    line_len: usize,
    /// Name of the header being read; released once matched.
    header_name: GatherList,
    /// Field receiving the current header value, if recognized.
    capture: Option<FieldId>,
    /// Bit `i` is set once `HEADER_FIELDS[i]` has been seen.
    seen: u8,
    chunked: bool,
    content_length: Option<u64>,
    body_remaining: u64,
    chunk_digits: usize,
}

impl HttpState {
    /// Start after the method token and its delimiter.
    pub(crate) fn new(method_len: usize) -> Self {
        Self {
            phase: Phase::UriStart,
            line_len: method_len + 1,
            header_name: GatherList::new(),
            capture: None,
            seen: 0,
            chunked: false,
            content_length: None,
            body_remaining: 0,
            chunk_digits: 0,
        }
    }

    pub(crate) fn advance(
        &mut self,
        cur: &mut Cursor<'_>,
        fields: &mut FieldTable,
        config: &ParserConfig,
    ) -> Result<Progress, ParseError> {
        let limit = config.max_line_len;

        while !cur.is_empty() {
            match self.phase {
                // ===================== REQUEST LINE =====================
                Phase::UriStart => {
                    let (_, found) = self.scan(cur, limit, |b| b != b' ')?;
                    if found.is_some() {
                        self.phase = Phase::Uri;
                    }
                }

                Phase::Uri => {
                    let (run, found) =
                        self.scan(cur, limit, |b| matches!(b, b' ' | b'\r' | b'\n'))?;
                    fields.slot_mut(FieldId::HttpUri).push(run);
                    match found.and_then(|_| cur.next_byte()) {
                        Some(b' ') => self.phase = Phase::VersionStart,
                        Some(b'\r') => self.phase = Phase::RequestLineLf,
                        Some(_) => self.start_line(Phase::HeaderStart),
                        None => {}
                    }
                }

                Phase::VersionStart => {
                    let (_, found) = self.scan(cur, limit, |b| b != b' ')?;
                    if found.is_some() {
                        self.phase = Phase::Version;
                    }
                }

                Phase::Version => {
                    let (run, found) = self.scan(cur, limit, |b| matches!(b, b'\r' | b'\n'))?;
                    let version = fields.slot_mut(FieldId::HttpVersion);
                    version.push(run);
                    match found.and_then(|_| cur.next_byte()) {
                        Some(b'\r') => {
                            version.trim_end(is_ows);
                            self.phase = Phase::RequestLineLf;
                        }
                        Some(_) => {
                            version.trim_end(is_ows);
                            self.start_line(Phase::HeaderStart);
                        }
                        None => {}
                    }
                }

                Phase::RequestLineLf => {
                    expect_lf(cur, "LF after request-line CR")?;
                    self.start_line(Phase::HeaderStart);
                }

                // ===================== HEADERS =====================
                Phase::HeaderStart => match cur.peek() {
                    Some(b'\r') => {
                        cur.next_byte();
                        self.phase = Phase::EndHeadersLf;
                    }
                    Some(b'\n') => {
                        cur.next_byte();
                        if self.end_headers() {
                            return Ok(Progress::Done);
                        }
                    }
                    _ => self.phase = Phase::HeaderName,
                },

                Phase::HeaderName => {
                    let (run, found) =
                        self.scan(cur, limit, |b| matches!(b, b':' | b'\r' | b'\n'))?;
                    self.header_name.push(run);
                    match found.and_then(|_| cur.next_byte()) {
                        Some(b':') => {
                            self.capture = self.recognize();
                            self.header_name.clear();
                            self.phase = Phase::HeaderValueOws;
                        }
                        // A line without a colon carries nothing we want.
                        Some(b'\r') => {
                            self.header_name.clear();
                            self.phase = Phase::HeaderLf;
                        }
                        Some(_) => {
                            self.header_name.clear();
                            self.start_line(Phase::HeaderStart);
                        }
                        None => {}
                    }
                }

                Phase::HeaderValueOws => {
                    let (_, found) = self.scan(cur, limit, |b| !is_ows(b))?;
                    if found.is_some() {
                        self.phase = Phase::HeaderValue;
                    }
                }

                Phase::HeaderValue => {
                    let (run, found) = self.scan(cur, limit, |b| matches!(b, b'\r' | b'\n'))?;
                    if let Some(id) = self.capture {
                        fields.slot_mut(id).push(run);
                    }
                    match found.and_then(|_| cur.next_byte()) {
                        Some(b'\r') => {
                            self.finish_header(fields)?;
                            self.phase = Phase::HeaderLf;
                        }
                        Some(_) => {
                            self.finish_header(fields)?;
                            self.start_line(Phase::HeaderStart);
                        }
                        None => {}
                    }
                }

                Phase::HeaderLf => {
                    expect_lf(cur, "LF after header line CR")?;
                    self.start_line(Phase::HeaderStart);
                }

                // ===================== END OF HEADERS =====================
                Phase::EndHeadersLf => {
                    expect_lf(cur, "LF after end-of-headers CR")?;
                    if self.end_headers() {
                        return Ok(Progress::Done);
                    }
                }

                Phase::Body => {
                    let run = take_body(cur, &mut self.body_remaining);
                    fields.slot_mut(FieldId::HttpBody).push(run);
                    if self.body_remaining == 0 {
                        return Ok(Progress::Done);
                    }
                }

                // ===================== CHUNKED ENCODING =====================
                Phase::ChunkSize => {
                    self.line_len += 1;
                    if self.line_len > limit {
                        return Err(ParseError::LineTooLong { limit });
                    }
                    match cur.next_byte() {
                        Some(b) if b.is_ascii_hexdigit() => self.push_chunk_digit(b)?,
                        Some(b';') => {
                            self.check_chunk_size()?;
                            self.phase = Phase::ChunkExt;
                        }
                        Some(b'\r') => {
                            self.check_chunk_size()?;
                            self.phase = Phase::ChunkSizeLf;
                        }
                        Some(b'\n') => {
                            self.check_chunk_size()?;
                            self.after_chunk_size();
                        }
                        // Bad whitespace before an extension is tolerated.
                        Some(b' ' | b'\t') => {}
                        _ => return Err(ParseError::InvalidChunkSize),
                    }
                }

                Phase::ChunkExt => {
                    let (_, found) = self.scan(cur, limit, |b| matches!(b, b'\r' | b'\n'))?;
                    match found.and_then(|_| cur.next_byte()) {
                        Some(b'\r') => self.phase = Phase::ChunkSizeLf,
                        Some(_) => self.after_chunk_size(),
                        None => {}
                    }
                }

                Phase::ChunkSizeLf => {
                    expect_lf(cur, "LF after chunk size CR")?;
                    self.after_chunk_size();
                }

                Phase::ChunkData => {
                    let run = take_body(cur, &mut self.body_remaining);
                    fields.slot_mut(FieldId::HttpBody).push(run);
                    if self.body_remaining == 0 {
                        self.phase = Phase::ChunkDataCr;
                    }
                }

                Phase::ChunkDataCr => match cur.next_byte() {
                    Some(b'\r') => self.phase = Phase::ChunkDataLf,
                    Some(b'\n') => self.start_chunk(),
                    found => {
                        return Err(ParseError::UnexpectedByte {
                            expected: "CRLF after chunk data",
                            found: found.unwrap_or_default(),
                        });
                    }
                },

                Phase::ChunkDataLf => {
                    expect_lf(cur, "LF after chunk data CR")?;
                    self.start_chunk();
                }

                // ===================== TRAILER SECTION =====================
                Phase::TrailerStart => match cur.peek() {
                    Some(b'\r') => {
                        cur.next_byte();
                        self.phase = Phase::TrailerEndLf;
                    }
                    Some(b'\n') => {
                        cur.next_byte();
                        return Ok(Progress::Done);
                    }
                    _ => self.phase = Phase::TrailerLine,
                },

                Phase::TrailerLine => {
                    let (_, found) = self.scan(cur, limit, |b| b == b'\n')?;
                    if found.and_then(|_| cur.next_byte()).is_some() {
                        self.start_line(Phase::TrailerStart);
                    }
                }

                Phase::TrailerEndLf => {
                    expect_lf(cur, "LF after trailer-section CR")?;
                    return Ok(Progress::Done);
                }
            }
        }

        Ok(Progress::More)
    }

    // ----- helpers --------------------------------------------------------

    /// Consume a run of line bytes, enforcing the scan window.
    fn scan(
        &mut self,
        cur: &mut Cursor<'_>,
        limit: usize,
        stop: impl Fn(u8) -> bool,
    ) -> Result<(Segment, Option<u8>), ParseError> {
        let (run, found) = cur.take_until(stop);
        self.line_len += run.len();
        if self.line_len > limit {
            return Err(ParseError::LineTooLong { limit });
        }
        Ok((run, found))
    }

    fn start_line(&mut self, phase: Phase) {
        self.line_len = 0;
        self.phase = phase;
    }

    /// Map the completed header name to its field on first sight only.
    fn recognize(&mut self) -> Option<FieldId> {
        self.header_name.trim_end(is_ows);
        let index = HEADER_FIELDS
            .iter()
            .position(|(name, _)| self.header_name.eq_ignore_ascii_case(name))?;
        let bit = 1u8 << index;
        if self.seen & bit != 0 {
            return None;
        }
        self.seen |= bit;
        Some(HEADER_FIELDS[index].1)
    }

    fn finish_header(&mut self, fields: &mut FieldTable) -> Result<(), ParseError> {
        let Some(id) = self.capture.take() else {
            return Ok(());
        };
        let value = fields.slot_mut(id);
        value.trim_end(is_ows);
        match id {
            FieldId::HttpContentLength => {
                self.content_length = Some(parse_decimal(value)?);
            }
            FieldId::HttpTransferEncoding => {
                self.chunked = last_coding_is_chunked(value);
            }
            _ => {}
        }
        Ok(())
    }

    /// Pick the body framing; returns `true` when the message has no body.
    fn end_headers(&mut self) -> bool {
        // Transfer-Encoding takes precedence over Content-Length.
        if self.chunked {
            self.start_chunk();
            return false;
        }
        match self.content_length {
            Some(length) if length > 0 => {
                self.body_remaining = length;
                self.phase = Phase::Body;
                false
            }
            _ => true,
        }
    }

    fn start_chunk(&mut self) {
        self.body_remaining = 0;
        self.chunk_digits = 0;
        self.start_line(Phase::ChunkSize);
    }

    fn push_chunk_digit(&mut self, digit: u8) -> Result<(), ParseError> {
        let value = match digit {
            b'0'..=b'9' => digit - b'0',
            b'a'..=b'f' => digit - b'a' + 10,
            _ => digit - b'A' + 10,
        };
        self.body_remaining = self
            .body_remaining
            .checked_mul(16)
            .and_then(|v| v.checked_add(u64::from(value)))
            .ok_or(ParseError::InvalidChunkSize)?;
        self.chunk_digits += 1;
        Ok(())
    }

    fn check_chunk_size(&self) -> Result<(), ParseError> {
        if self.chunk_digits == 0 {
            return Err(ParseError::InvalidChunkSize);
        }
        Ok(())
    }

    fn after_chunk_size(&mut self) {
        if self.body_remaining == 0 {
            // Last chunk: skip the trailer section.
            self.start_line(Phase::TrailerStart);
        } else {
            self.phase = Phase::ChunkData;
        }
    }
}

fn expect_lf(cur: &mut Cursor<'_>, expected: &'static str) -> Result<(), ParseError> {
    match cur.next_byte() {
        Some(b'\n') | None => Ok(()),
        Some(found) => Err(ParseError::UnexpectedByte { expected, found }),
    }
}

/// Consume up to `remaining` body bytes from the buffer.
fn take_body(cur: &mut Cursor<'_>, remaining: &mut u64) -> Segment {
    let n = usize::try_from(*remaining).map_or(cur.remaining(), |r| r.min(cur.remaining()));
    let run = cur.take(n);
    *remaining -= run.len() as u64;
    run
}

fn parse_decimal(value: &GatherList) -> Result<u64, ParseError> {
    if value.is_empty() {
        return Err(ParseError::InvalidContentLength);
    }
    value.bytes().try_fold(0u64, |acc, b| {
        if !b.is_ascii_digit() {
            return Err(ParseError::InvalidContentLength);
        }
        acc.checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
            .ok_or(ParseError::InvalidContentLength)
    })
}

/// `true` if the final transfer coding in a trimmed value is `chunked`.
fn last_coding_is_chunked(value: &GatherList) -> bool {
    let start = value
        .bytes()
        .enumerate()
        .filter(|&(_, b)| b == b',')
        .last()
        .map_or(0, |(i, _)| i + 1);
    value
        .bytes()
        .skip(start)
        .skip_while(|&b| is_ows(b))
        .map(|b| b.to_ascii_lowercase())
        .eq(b"chunked".iter().copied())
}

/// Optional whitespace: `SP / HTAB`.
#[inline]
fn is_ows(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::types::ProtocolId;

    fn run(parts: &[&'static [u8]]) -> (Result<Progress, ParseError>, FieldTable) {
        let mut fields = FieldTable::default();
        fields.bind(ProtocolId::HTTP);
        let mut state = HttpState::new(3);
        let config = ParserConfig::default();
        let mut last = Ok(Progress::More);
        for &part in parts {
            let buf = Bytes::from_static(part);
            let mut cur = Cursor::new(&buf, 0);
            last = state.advance(&mut cur, &mut fields, &config);
            if !matches!(last, Ok(Progress::More)) {
                break;
            }
        }
        (last, fields)
    }

    fn value(fields: &FieldTable, id: FieldId) -> Option<Vec<u8>> {
        fields.get(id).map(GatherList::to_vec)
    }

    #[test]
    fn header_values_are_trimmed() {
        let (res, fields) = run(&[b"/ HTTP/1.1\r\nHost:   example.com \t\r\n\r\n"]);
        assert!(matches!(res, Ok(Progress::Done)));
        assert_eq!(value(&fields, FieldId::HttpHost).as_deref(), Some(&b"example.com"[..]));
    }

    #[test]
    fn first_header_occurrence_wins() {
        let (_, fields) = run(&[b"/ HTTP/1.1\r\nHost: a\r\nHost: b\r\n\r\n"]);
        assert_eq!(value(&fields, FieldId::HttpHost).as_deref(), Some(&b"a"[..]));
    }

    #[test]
    fn empty_first_header_still_wins() {
        let (res, fields) = run(&[b"/ HTTP/1.1\r\nHost:\r\nHost: b\r\n\r\n"]);
        assert!(matches!(res, Ok(Progress::Done)));
        assert!(value(&fields, FieldId::HttpHost).is_none());
    }

    #[test]
    fn whitespace_before_colon_is_tolerated() {
        let (res, fields) = run(&[b"/ HTTP/1.1\r\nHost \t: h\r\n\r\n"]);
        assert!(matches!(res, Ok(Progress::Done)));
        assert_eq!(value(&fields, FieldId::HttpHost).as_deref(), Some(&b"h"[..]));
    }

    #[test]
    fn only_final_coding_selects_chunked() {
        let te = |text: &'static [u8]| {
            let buf = Bytes::from_static(text);
            let mut list = GatherList::new();
            list.push(Segment::from_range(&buf, 0..text.len()));
            last_coding_is_chunked(&list)
        };
        assert!(te(b"chunked"));
        assert!(te(b"gzip,  Chunked"));
        assert!(!te(b"xchunkedy"));
        assert!(!te(b"chunked, gzip"));
    }

    #[test]
    fn line_without_colon_is_ignored() {
        let (res, fields) = run(&[b"/ HTTP/1.1\r\ngarbage\r\nHost: h\r\n\r\n"]);
        assert!(matches!(res, Ok(Progress::Done)));
        assert_eq!(value(&fields, FieldId::HttpHost).as_deref(), Some(&b"h"[..]));
    }

    #[test]
    fn header_name_split_across_buffers() {
        let (res, fields) = run(&[b"/ HTTP/1.1\r\nCont", b"ent-Len", b"gth: 2\r\n\r\nok"]);
        assert!(matches!(res, Ok(Progress::Done)));
        assert_eq!(value(&fields, FieldId::HttpBody).as_deref(), Some(&b"ok"[..]));
    }

    #[test]
    fn bad_content_length_is_hard_error() {
        let (res, _) = run(&[b"/ HTTP/1.1\r\nContent-Length: 1x\r\n\r\n"]);
        assert_eq!(res.err(), Some(ParseError::InvalidContentLength));
    }

    #[test]
    fn chunk_size_overflow_is_hard_error() {
        let (res, _) = run(&[
            b"/ HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n11111111111111111\r\n",
        ]);
        assert_eq!(res.err(), Some(ParseError::InvalidChunkSize));
    }

    #[test]
    fn cr_without_lf_is_hard_error() {
        let (res, _) = run(&[b"/ HTTP/1.1\rX"]);
        assert!(matches!(res, Err(ParseError::UnexpectedByte { found: b'X', .. })));
    }

    #[test]
    fn decimal_parsing() {
        let buf = Bytes::from_static(b"1234");
        let mut list = GatherList::new();
        list.push(Segment::from_range(&buf, 0..2));
        list.push(Segment::from_range(&buf, 2..4));
        assert_eq!(parse_decimal(&list), Ok(1234));
        assert!(parse_decimal(&GatherList::new()).is_err());
    }
}
