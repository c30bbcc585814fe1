//! Protocol detection from the leading token of a flow.
//!
//! Heuristics are checked in a fixed order (HTTP first, then FTP) at the
//! first delimiter after the token. The token itself is gathered, not
//! copied, and becomes the method or command field of the chosen protocol.

use tracing::debug;

use crate::error::ParseError;
use crate::segment::{Cursor, GatherList};
use crate::types::ProtocolId;

/// Request methods that select the HTTP grammar.
const HTTP_METHODS: &[&[u8]] = &[
    b"GET", b"HEAD", b"POST", b"PUT", b"DELETE", b"CONNECT", b"OPTIONS", b"TRACE", b"PATCH",
];

/// FTP commands are three or four letters (RFC 959 §5.3.1).
const FTP_COMMAND_LEN: std::ops::RangeInclusive<usize> = 3..=4;

/// How the leading token was terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delimiter {
    Space,
    Cr,
    Lf,
}

/// Outcome of one detection step.
#[derive(Debug)]
pub(crate) enum Detection {
    /// The buffer ended inside the leading token.
    Pending,
    /// A protocol was selected.
    Found {
        protocol: ProtocolId,
        token: GatherList,
        delimiter: Delimiter,
    },
}

/// Resumable detection state: the leading token gathered so far.
#[derive(Debug, Default)]
pub(crate) struct Detector {
    token: GatherList,
    token_len: usize,
}

impl Detector {
    pub(crate) fn advance(
        &mut self,
        cur: &mut Cursor<'_>,
        max_token_len: usize,
    ) -> Result<Detection, ParseError> {
        let (run, found) = cur.take_until(|b| !b.is_ascii_alphabetic());
        self.token_len += run.len();
        self.token.push(run);

        if self.token_len > max_token_len {
            return Err(ParseError::UnknownProtocol);
        }

        let Some(byte) = found else {
            return Ok(Detection::Pending);
        };
        cur.next_byte();

        let delimiter = match byte {
            b' ' => Delimiter::Space,
            b'\r' => Delimiter::Cr,
            b'\n' => Delimiter::Lf,
            _ => return Err(ParseError::UnknownProtocol),
        };

        let protocol = self
            .classify(delimiter)
            .ok_or(ParseError::UnknownProtocol)?;
        debug!(
            protocol = %protocol,
            token = %self.token.to_string_lossy(),
            "protocol detected"
        );

        Ok(Detection::Found {
            protocol,
            token: std::mem::take(&mut self.token),
            delimiter,
        })
    }

    fn classify(&self, delimiter: Delimiter) -> Option<ProtocolId> {
        if delimiter == Delimiter::Space && HTTP_METHODS.iter().any(|m| self.token.eq_bytes(m)) {
            return Some(ProtocolId::HTTP);
        }
        if FTP_COMMAND_LEN.contains(&self.token_len) {
            return Some(ProtocolId::FTP);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use rstest::rstest;

    use super::*;

    fn detect(input: &'static [u8]) -> Result<Detection, ParseError> {
        let buf = Bytes::from_static(input);
        let mut cur = Cursor::new(&buf, 0);
        Detector::default().advance(&mut cur, 7)
    }

    fn protocol_of(input: &'static [u8]) -> Option<ProtocolId> {
        match detect(input) {
            Ok(Detection::Found { protocol, .. }) => Some(protocol),
            _ => None,
        }
    }

    #[rstest]
    #[case::http_get(b"GET /x HTTP/1.1\r\n", Some(ProtocolId::HTTP))]
    #[case::http_options(b"OPTIONS * HTTP/1.1\r\n", Some(ProtocolId::HTTP))]
    #[case::http_put_wins_over_ftp(b"PUT /f HTTP/1.1\r\n", Some(ProtocolId::HTTP))]
    #[case::ftp_user(b"USER anonymous\r\n", Some(ProtocolId::FTP))]
    #[case::ftp_no_arg(b"QUIT\r\n", Some(ProtocolId::FTP))]
    #[case::ftp_bare_lf(b"PWD\n", Some(ProtocolId::FTP))]
    #[case::ftp_lowercase(b"retr file.txt\r\n", Some(ProtocolId::FTP))]
    #[case::ftp_dele_not_delete(b"DELE old.txt\r\n", Some(ProtocolId::FTP))]
    #[case::binary(b"\x01\x02\x03", None)]
    #[case::too_short(b"GO home\r\n", None)]
    #[case::http_method_without_space(b"GETX\r\n", Some(ProtocolId::FTP))]
    #[case::unknown_long_token(b"FOOBAR / HTTP/1.1\r\n", None)]
    #[case::token_too_long(b"ABCDEFGHIJ", None)]
    fn leading_token_selects_protocol(
        #[case] input: &'static [u8],
        #[case] expected: Option<ProtocolId>,
    ) {
        assert_eq!(protocol_of(input), expected);
    }

    #[test]
    fn pending_when_buffer_ends_in_token() {
        assert!(matches!(detect(b"GE"), Ok(Detection::Pending)));
    }

    #[test]
    fn token_is_handed_over() {
        match detect(b"USER anonymous\r\n") {
            Ok(Detection::Found {
                token, delimiter, ..
            }) => {
                assert!(token.eq_bytes(b"USER"));
                assert_eq!(delimiter, Delimiter::Space);
            }
            other => panic!("expected Found, got {other:?}"),
        }
    }
}
