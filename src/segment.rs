//! Zero-copy field storage.
//!
//! A [`Segment`] names a byte range of a caller-owned packet buffer and a
//! [`GatherList`] strings segments together into one logical field value.
//! Segments hold a cloned [`Bytes`] handle, so the packet stays alive for as
//! long as any field references it and payload bytes are never duplicated.

use std::ops::Range;

use bytes::Bytes;

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// A contiguous slice of a payload buffer.
///
/// Invariant: `offset + len <= buffer.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    buffer: Bytes,
    offset: usize,
    len: usize,
}

impl Segment {
    /// Reference `len` bytes of `buffer` starting at `offset`.
    ///
    /// Returns `None` if the range does not fit inside the buffer.
    pub fn new(buffer: Bytes, offset: usize, len: usize) -> Option<Self> {
        let end = offset.checked_add(len)?;
        (end <= buffer.len()).then_some(Self {
            buffer,
            offset,
            len,
        })
    }

    pub(crate) fn from_range(buffer: &Bytes, range: Range<usize>) -> Self {
        debug_assert!(range.start <= range.end && range.end <= buffer.len());
        Self {
            buffer: buffer.clone(),
            offset: range.start,
            len: range.end - range.start,
        }
    }

    /// The whole packet buffer this segment points into.
    pub fn buffer(&self) -> &Bytes {
        &self.buffer
    }

    /// Offset of the first referenced byte within [`Segment::buffer`].
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of referenced bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the segment references no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The referenced bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[self.offset..self.offset + self.len]
    }
}

// ---------------------------------------------------------------------------
// GatherList
// ---------------------------------------------------------------------------

/// Ordered segments forming one field value, possibly spanning packets.
///
/// An empty list means the field has not been observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatherList {
    segments: Vec<Segment>,
}

impl GatherList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if no bytes have been gathered.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Total number of bytes across all segments.
    pub fn len(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }

    /// The segments in field byte order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Iterate over the value byte by byte without copying it.
    pub fn bytes(&self) -> GatherBytes<'_> {
        GatherBytes {
            segments: &self.segments,
            current: (&[] as &[u8]).iter(),
        }
    }

    /// Copy the value into a contiguous vector.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for segment in &self.segments {
            out.extend_from_slice(segment.as_bytes());
        }
        out
    }

    /// Return the value as a lossy UTF-8 string.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.to_vec()).into_owned()
    }

    /// Compare the value with `other` byte for byte.
    pub fn eq_bytes(&self, other: &[u8]) -> bool {
        self.len() == other.len() && self.bytes().eq(other.iter().copied())
    }

    /// Compare the value with `other`, ignoring ASCII case.
    pub fn eq_ignore_ascii_case(&self, other: &[u8]) -> bool {
        self.len() == other.len()
            && self
                .bytes()
                .zip(other.iter())
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    /// Returns `true` if `needle` occurs in the value, ignoring ASCII case.
    pub fn contains_ignore_ascii_case(&self, needle: &[u8]) -> bool {
        if needle.is_empty() {
            return true;
        }
        let mut haystack = self.bytes();
        loop {
            let window = haystack.clone();
            if window
                .take(needle.len())
                .zip(needle.iter())
                .filter(|(a, b)| a.eq_ignore_ascii_case(b))
                .count()
                == needle.len()
            {
                return true;
            }
            if haystack.next().is_none() {
                return false;
            }
        }
    }

    /// Append a segment; empty segments are dropped.
    pub(crate) fn push(&mut self, segment: Segment) {
        if !segment.is_empty() {
            self.segments.push(segment);
        }
    }

    /// Drop trailing bytes matching `pred`, possibly across segments.
    pub(crate) fn trim_end(&mut self, pred: impl Fn(u8) -> bool) {
        while let Some(last) = self.segments.pop() {
            let kept = last
                .as_bytes()
                .iter()
                .rposition(|&b| !pred(b))
                .map_or(0, |i| i + 1);
            if kept > 0 {
                self.segments.push(Segment::from_range(
                    &last.buffer,
                    last.offset..last.offset + kept,
                ));
                return;
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.segments.clear();
    }
}

impl<'a> IntoIterator for &'a GatherList {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

/// Byte iterator over a [`GatherList`]; see [`GatherList::bytes`].
#[derive(Debug, Clone)]
pub struct GatherBytes<'a> {
    segments: &'a [Segment],
    current: std::slice::Iter<'a, u8>,
}

impl Iterator for GatherBytes<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        loop {
            if let Some(&b) = self.current.next() {
                return Some(b);
            }
            let (first, rest) = self.segments.split_first()?;
            self.current = first.as_bytes().iter();
            self.segments = rest;
        }
    }
}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// Read position inside the payload region of one buffer.
pub(crate) struct Cursor<'a> {
    buf: &'a Bytes,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(buf: &'a Bytes, pos: usize) -> Self {
        Self { buf, pos }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub(crate) fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    /// Consume and return the next byte.
    pub(crate) fn next_byte(&mut self) -> Option<u8> {
        let b = *self.buf.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    /// Consume bytes up to (not including) the first one matching `stop`.
    ///
    /// Returns the consumed run and the stop byte, or `None` when the buffer
    /// ran out first.
    pub(crate) fn take_until(&mut self, stop: impl Fn(u8) -> bool) -> (Segment, Option<u8>) {
        let start = self.pos;
        let rest = &self.buf[start..];
        let (end, found) = match rest.iter().position(|&b| stop(b)) {
            Some(i) => (start + i, Some(rest[i])),
            None => (self.buf.len(), None),
        };
        self.pos = end;
        (Segment::from_range(self.buf, start..end), found)
    }

    /// Consume up to `n` bytes unconditionally.
    pub(crate) fn take(&mut self, n: usize) -> Segment {
        let start = self.pos;
        let end = start + n.min(self.remaining());
        self.pos = end;
        Segment::from_range(self.buf, start..end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(parts: &[&'static [u8]]) -> GatherList {
        let mut list = GatherList::new();
        for &part in parts {
            let buf = Bytes::from_static(part);
            let len = buf.len();
            list.push(Segment::from_range(&buf, 0..len));
        }
        list
    }

    #[test]
    fn segment_rejects_out_of_range() {
        let buf = Bytes::from_static(b"abcdef");
        assert!(Segment::new(buf.clone(), 2, 4).is_some());
        assert!(Segment::new(buf.clone(), 2, 5).is_none());
        assert!(Segment::new(buf, usize::MAX, 2).is_none());
    }

    #[test]
    fn segment_shares_buffer() {
        let buf = Bytes::from(b"hello world".to_vec());
        let seg = Segment::new(buf.clone(), 6, 5).unwrap();
        assert_eq!(seg.as_bytes(), b"world");
        assert_eq!(seg.buffer().as_ptr(), buf.as_ptr());
    }

    #[test]
    fn bytes_iterate_across_segments() {
        let l = list(&[b"/ind", b"ex.html"]);
        assert_eq!(l.len(), 11);
        assert!(l.eq_bytes(b"/index.html"));
        assert!(!l.eq_bytes(b"/index.htm"));
        assert_eq!(l.to_vec(), b"/index.html");
    }

    #[test]
    fn case_insensitive_helpers() {
        let l = list(&[b"Content-", b"LENGTH"]);
        assert!(l.eq_ignore_ascii_case(b"content-length"));
        let te = list(&[b"gzip, Chun", b"ked"]);
        assert!(te.contains_ignore_ascii_case(b"chunked"));
        assert!(!te.contains_ignore_ascii_case(b"deflate"));
    }

    #[test]
    fn trim_end_crosses_segments() {
        let mut l = list(&[b"a b ", b"  ", b"\t"]);
        l.trim_end(|b| b == b' ' || b == b'\t');
        assert!(l.eq_bytes(b"a b"));
        assert_eq!(l.segments().len(), 1);

        let mut blank = list(&[b"  "]);
        blank.trim_end(|b| b == b' ');
        assert!(blank.is_empty());
    }

    #[test]
    fn empty_segments_are_dropped() {
        let buf = Bytes::from_static(b"x");
        let mut l = GatherList::new();
        l.push(Segment::from_range(&buf, 1..1));
        assert!(l.is_empty());
    }

    #[test]
    fn cursor_take_until_stops_before_delimiter() {
        let buf = Bytes::from_static(b"USER anon");
        let mut cur = Cursor::new(&buf, 0);
        let (run, found) = cur.take_until(|b| b == b' ');
        assert_eq!(run.as_bytes(), b"USER");
        assert_eq!(found, Some(b' '));
        assert_eq!(cur.next_byte(), Some(b' '));
        let (run, found) = cur.take_until(|b| b == b'\r');
        assert_eq!(run.as_bytes(), b"anon");
        assert_eq!(found, None);
        assert!(cur.is_empty());
    }
}
