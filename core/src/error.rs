//! Outcome and error types for a firmware pull.
//!
//! # Design
//! A pull either succeeds (`PullOutcome`) or fails with exactly one
//! `PullError`. The first failure wins; nothing is aggregated or retried.
//! `ResultCode` flattens both into the single byte device firmware reports,
//! keeping the legacy numeric values so existing diagnostics stay readable.

use thiserror::Error;

/// Successful end states of a pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// A new image was flashed, finalized, and its Last-Modified persisted.
    Updated,

    /// The server answered 304; nothing was read past the headers.
    NoNewUpdate,
}

/// Errors returned by `PullOta::pull` and the pipeline stages it sequences.
#[derive(Debug, Error)]
pub enum PullError {
    #[error("URL could not be parsed: {0}")]
    UrlParse(String),

    /// A host, path, credential, or token exceeded its configured maximum.
    #[error("{field} is {len} bytes, limit is {max}")]
    RequestTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("unexpected HTTP status line: {0}")]
    HttpStatus(String),

    /// Malformed response: a header line with no terminator in sight.
    #[error("response header line exceeds {max} bytes")]
    HeaderLineTooLong { max: usize },

    #[error("firmware not found (404)")]
    NotFound,

    #[error("authorization rejected (401/403)")]
    HttpAuth,

    #[error("response carried no usable Content-Length")]
    NoContentLength,

    #[error("response Content-Type is not an octet stream")]
    InvalidContentType,

    #[error("response carried no Last-Modified header")]
    NoLastModified,

    #[error("flash sink refused to begin an update of {0} bytes")]
    StartingUpdate(usize),

    #[error("flash sink wrote {written} of {read} bytes")]
    ShortWrite { read: usize, written: usize },

    #[error("update incomplete after {written} of {expected} bytes")]
    UpdateIncomplete { written: usize, expected: usize },

    #[error("no data received for {0:?}")]
    StreamStalled(std::time::Duration),

    #[error("failed to persist Last-Modified: {0}")]
    PersistLastModified(#[source] std::io::Error),
}

/// Closed set of one-byte result codes, one per pull.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Success = 0x00,
    NoNewUpdate = 0x01,
    UrlParseError = 0x10,
    RequestTooLongError = 0x11,
    ConnectError = 0x20,
    HttpStatusError = 0x21,
    NoContentLengthError = 0x22,
    InvalidContentTypeError = 0x23,
    NoLastModifiedError = 0x24,
    NotFound = 0x25,
    HttpAuthError = 0x26,
    StartingUpdateError = 0x30,
    ShortWriteError = 0x31,
    UpdateIncompleteError = 0x32,
    StreamStalledError = 0x33,
    PersistLastModifiedError = 0x40,
}

impl ResultCode {
    pub const ALL: [ResultCode; 16] = [
        ResultCode::Success,
        ResultCode::NoNewUpdate,
        ResultCode::UrlParseError,
        ResultCode::RequestTooLongError,
        ResultCode::ConnectError,
        ResultCode::HttpStatusError,
        ResultCode::NoContentLengthError,
        ResultCode::InvalidContentTypeError,
        ResultCode::NoLastModifiedError,
        ResultCode::NotFound,
        ResultCode::HttpAuthError,
        ResultCode::StartingUpdateError,
        ResultCode::ShortWriteError,
        ResultCode::UpdateIncompleteError,
        ResultCode::StreamStalledError,
        ResultCode::PersistLastModifiedError,
    ];

    /// Stable snake_case name, suitable for logs and the C ABI.
    pub fn name(self) -> &'static str {
        match self {
            ResultCode::Success => "success",
            ResultCode::NoNewUpdate => "no_new_update",
            ResultCode::UrlParseError => "url_parse_error",
            ResultCode::RequestTooLongError => "request_too_long_error",
            ResultCode::ConnectError => "connect_error",
            ResultCode::HttpStatusError => "http_status_error",
            ResultCode::NoContentLengthError => "no_content_length_error",
            ResultCode::InvalidContentTypeError => "invalid_content_type_error",
            ResultCode::NoLastModifiedError => "no_last_modified_error",
            ResultCode::NotFound => "not_found",
            ResultCode::HttpAuthError => "http_auth_error",
            ResultCode::StartingUpdateError => "starting_update_error",
            ResultCode::ShortWriteError => "short_write_error",
            ResultCode::UpdateIncompleteError => "update_incomplete_error",
            ResultCode::StreamStalledError => "stream_stalled_error",
            ResultCode::PersistLastModifiedError => "persist_last_modified_error",
        }
    }

    pub fn is_error(self) -> bool {
        !matches!(self, ResultCode::Success | ResultCode::NoNewUpdate)
    }
}

impl TryFrom<u8> for ResultCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ResultCode::ALL
            .into_iter()
            .find(|code| *code as u8 == value)
            .ok_or(value)
    }
}

impl From<PullOutcome> for ResultCode {
    fn from(outcome: PullOutcome) -> Self {
        match outcome {
            PullOutcome::Updated => ResultCode::Success,
            PullOutcome::NoNewUpdate => ResultCode::NoNewUpdate,
        }
    }
}

impl From<&PullError> for ResultCode {
    fn from(err: &PullError) -> Self {
        match err {
            PullError::UrlParse(_) => ResultCode::UrlParseError,
            PullError::RequestTooLong { .. } => ResultCode::RequestTooLongError,
            PullError::Connect(_) => ResultCode::ConnectError,
            PullError::HttpStatus(_) | PullError::HeaderLineTooLong { .. } => ResultCode::HttpStatusError,
            PullError::NotFound => ResultCode::NotFound,
            PullError::HttpAuth => ResultCode::HttpAuthError,
            PullError::NoContentLength => ResultCode::NoContentLengthError,
            PullError::InvalidContentType => ResultCode::InvalidContentTypeError,
            PullError::NoLastModified => ResultCode::NoLastModifiedError,
            PullError::StartingUpdate(_) => ResultCode::StartingUpdateError,
            PullError::ShortWrite { .. } => ResultCode::ShortWriteError,
            PullError::UpdateIncomplete { .. } => ResultCode::UpdateIncompleteError,
            PullError::StreamStalled(_) => ResultCode::StreamStalledError,
            PullError::PersistLastModified(_) => ResultCode::PersistLastModifiedError,
        }
    }
}

impl From<&Result<PullOutcome, PullError>> for ResultCode {
    fn from(result: &Result<PullOutcome, PullError>) -> Self {
        match result {
            Ok(outcome) => (*outcome).into(),
            Err(err) => err.into(),
        }
    }
}
