use serde::Serialize;
use std::fmt;

// ---------------------------------------------------------------------------
// ProtocolId
// ---------------------------------------------------------------------------

/// Application protocols the engine can recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProtocolId {
    HTTP,
    FTP,
}

impl ProtocolId {
    /// Fields that belong to this protocol, in slot order.
    pub fn fields(&self) -> &'static [FieldId] {
        match self {
            Self::HTTP => HTTP_FIELDS,
            Self::FTP => FTP_FIELDS,
        }
    }

    /// Return the protocol as a static string slice.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HTTP => "HTTP",
            Self::FTP => "FTP",
        }
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FieldId
// ---------------------------------------------------------------------------

/// Identifiers of the fields the grammars extract.
///
/// Every identifier belongs to exactly one protocol; querying a field of a
/// protocol other than the detected one always yields "not found".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FieldId {
    HttpMethod,
    HttpUri,
    HttpVersion,
    HttpHost,
    HttpUserAgent,
    HttpReferer,
    HttpCookie,
    HttpContentType,
    HttpContentLength,
    HttpTransferEncoding,
    /// Message body, chunk framing excluded.
    HttpBody,
    FtpCommand,
    FtpArg,
}

const HTTP_FIELDS: &[FieldId] = &[
    FieldId::HttpMethod,
    FieldId::HttpUri,
    FieldId::HttpVersion,
    FieldId::HttpHost,
    FieldId::HttpUserAgent,
    FieldId::HttpReferer,
    FieldId::HttpCookie,
    FieldId::HttpContentType,
    FieldId::HttpContentLength,
    FieldId::HttpTransferEncoding,
    FieldId::HttpBody,
];

const FTP_FIELDS: &[FieldId] = &[FieldId::FtpCommand, FieldId::FtpArg];

/// Largest per-protocol field table.
pub(crate) const MAX_FIELD_SLOTS: usize = HTTP_FIELDS.len();

impl FieldId {
    /// The protocol this field belongs to.
    pub fn protocol(&self) -> ProtocolId {
        match self {
            Self::FtpCommand | Self::FtpArg => ProtocolId::FTP,
            _ => ProtocolId::HTTP,
        }
    }

    /// Index of this field inside its protocol's field table.
    pub(crate) fn slot(&self) -> usize {
        match self {
            Self::HttpMethod | Self::FtpCommand => 0,
            Self::HttpUri | Self::FtpArg => 1,
            Self::HttpVersion => 2,
            Self::HttpHost => 3,
            Self::HttpUserAgent => 4,
            Self::HttpReferer => 5,
            Self::HttpCookie => 6,
            Self::HttpContentType => 7,
            Self::HttpContentLength => 8,
            Self::HttpTransferEncoding => 9,
            Self::HttpBody => 10,
        }
    }

    /// Return the field name as a static string slice.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HttpMethod => "http.method",
            Self::HttpUri => "http.uri",
            Self::HttpVersion => "http.version",
            Self::HttpHost => "http.host",
            Self::HttpUserAgent => "http.user_agent",
            Self::HttpReferer => "http.referer",
            Self::HttpCookie => "http.cookie",
            Self::HttpContentType => "http.content_type",
            Self::HttpContentLength => "http.content_length",
            Self::HttpTransferEncoding => "http.transfer_encoding",
            Self::HttpBody => "http.body",
            Self::FtpCommand => "ftp.command",
            Self::FtpArg => "ftp.arg",
        }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ParseState
// ---------------------------------------------------------------------------

/// Top-level progress of a flow, as returned by every `parse` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ParseState {
    /// No payload byte has been seen yet.
    Init,
    /// Some bytes were consumed; fields may be incomplete.
    Partial,
    /// The grammar reached its terminal point.
    Done,
    /// Protocol unrecognized or grammar violated.
    Error,
}

impl ParseState {
    /// `Done` and `Error` are terminal: further `parse` calls are no-ops.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Return the state as a static string slice.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Partial => "PARTIAL",
            Self::Done => "DONE",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for ParseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
