//! FTP command-line grammar.
//!
//! One command line per cycle: the detected token is the command, the
//! remainder of the line (after the separating spaces) is the argument.

use crate::error::ParseError;
use crate::parser::{FieldTable, ParserConfig, Progress};
use crate::segment::{Cursor, Segment};
use crate::types::FieldId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    ArgStart,
    Arg,
    LineLf,
}

/// Resume point of the FTP grammar between `parse` calls.
#[derive(Debug)]
pub(crate) struct FtpState {
    phase: Phase,
    line_len: usize,
}

impl FtpState {
    /// Start after the command token; `saw_cr` when it ended the line.
    pub(crate) fn new(command_len: usize, saw_cr: bool) -> Self {
        Self {
            phase: if saw_cr { Phase::LineLf } else { Phase::ArgStart },
            line_len: command_len + 1,
        }
    }

    pub(crate) fn advance(
        &mut self,
        cur: &mut Cursor<'_>,
        fields: &mut FieldTable,
        config: &ParserConfig,
    ) -> Result<Progress, ParseError> {
        let limit = config.max_ftp_line_len;

        while !cur.is_empty() {
            match self.phase {
                Phase::ArgStart => {
                    let (_, found) = self.scan(cur, limit, |b| b != b' ')?;
                    if found.is_some() {
                        self.phase = Phase::Arg;
                    }
                }
                Phase::Arg => {
                    let (run, found) = self.scan(cur, limit, |b| matches!(b, b'\r' | b'\n'))?;
                    fields.slot_mut(FieldId::FtpArg).push(run);
                    match found.and_then(|_| cur.next_byte()) {
                        Some(b'\r') => self.phase = Phase::LineLf,
                        Some(_) => return Ok(Progress::Done),
                        None => {}
                    }
                }
                Phase::LineLf => {
                    return match cur.next_byte() {
                        Some(b'\n') | None => Ok(Progress::Done),
                        Some(found) => Err(ParseError::UnexpectedByte {
                            expected: "LF after command-line CR",
                            found,
                        }),
                    };
                }
            }
        }

        Ok(Progress::More)
    }

    /// Consume a run of line bytes within the lookahead window.
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
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::types::ProtocolId;

    #[test]
    fn argument_spans_buffers() {
        let mut fields = FieldTable::default();
        fields.bind(ProtocolId::FTP);
        let mut state = FtpState::new(4, false);
        let config = ParserConfig::default();

        let first = Bytes::from_static(b"  my");
        let mut cur = Cursor::new(&first, 0);
        assert_eq!(state.advance(&mut cur, &mut fields, &config), Ok(Progress::More));

        let second = Bytes::from_static(b"file.txt\r\n");
        let mut cur = Cursor::new(&second, 0);
        assert_eq!(state.advance(&mut cur, &mut fields, &config), Ok(Progress::Done));

        let arg = fields.get(FieldId::FtpArg).expect("argument captured");
        assert!(arg.eq_bytes(b"myfile.txt"));
        assert_eq!(arg.segments().len(), 2);
    }

    #[test]
    fn unterminated_line_hits_window() {
        let mut fields = FieldTable::default();
        fields.bind(ProtocolId::FTP);
        let mut state = FtpState::new(4, false);
        let config = ParserConfig {
            max_ftp_line_len: 16,
            ..ParserConfig::default()
        };
        let buf = Bytes::from_static(b"a-very-long-argument-without-end");
        let mut cur = Cursor::new(&buf, 0);
        assert_eq!(
            state.advance(&mut cur, &mut fields, &config),
            Err(ParseError::LineTooLong { limit: 16 })
        );
    }
}
