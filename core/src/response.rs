//! Response header reader.
//!
//! # Design
//! Headers are consumed one line at a time until the blank terminator line
//! or until the peer disconnects. The status line is classified as soon as
//! it is seen, so a 304, 404, or auth failure returns before any further
//! line is read and never reaches the flash streamer. After the terminator,
//! three preconditions are checked in a fixed order: a non-negative
//! `Content-Length`, an octet-stream `Content-Type`, and a `Last-Modified`.

use crate::error::PullError;
use crate::header::header_value;
use crate::stall::Watchdog;
use crate::transport::{BufferedConnection, Connection};

const OCTET_STREAM_TYPES: [&str; 2] = ["application/octet-stream", "binary/octet-stream"];

/// Header fields collected while reading one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMeta {
    /// `-1` until a parseable `Content-Length` is seen.
    pub content_length: i64,
    /// Empty until a `Last-Modified` is seen.
    pub last_modified: String,
    /// Last `Content-Type` seen wins.
    pub valid_content_type: bool,
}

impl Default for ResponseMeta {
    fn default() -> Self {
        Self {
            content_length: -1,
            last_modified: String::new(),
            valid_content_type: false,
        }
    }
}

impl ResponseMeta {
    /// Fold one header line into the accumulator.
    pub fn absorb(&mut self, line: &str) {
        if let Some(value) = header_value(line, "content-length:") {
            self.content_length = value.trim_end().parse().unwrap_or(-1);
        } else if let Some(value) = header_value(line, "content-type:") {
            self.valid_content_type = OCTET_STREAM_TYPES.contains(&value.trim_end());
        } else if let Some(value) = header_value(line, "last-modified:") {
            self.last_modified = value.to_string();
        }
    }

    /// Check the streaming preconditions, first failure wins.
    pub fn validate(self) -> Result<FirmwareHeaders, PullError> {
        let content_length = usize::try_from(self.content_length).map_err(|_| PullError::NoContentLength)?;
        if !self.valid_content_type {
            return Err(PullError::InvalidContentType);
        }
        if self.last_modified.is_empty() {
            return Err(PullError::NoLastModified);
        }
        Ok(FirmwareHeaders {
            content_length,
            last_modified: self.last_modified,
        })
    }
}

/// Headers of a response that is safe to stream into flash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareHeaders {
    pub content_length: usize,
    pub last_modified: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderVerdict {
    NotModified,
    Firmware(FirmwareHeaders),
}

/// Classify a status line. `Ok(None)` means 200, carry on reading.
fn classify_status(line: &str) -> Result<Option<HeaderVerdict>, PullError> {
    if line.contains("304") {
        return Ok(Some(HeaderVerdict::NotModified));
    }
    if line.contains("404") {
        return Err(PullError::NotFound);
    }
    if line.contains("401") || line.contains("403") {
        return Err(PullError::HttpAuth);
    }
    if !line.contains("200") {
        return Err(PullError::HttpStatus(line.to_string()));
    }
    Ok(None)
}

pub fn read_headers<C: Connection>(
    conn: &mut BufferedConnection<C>,
    watchdog: &mut Watchdog,
) -> Result<HeaderVerdict, PullError> {
    let mut meta = ResponseMeta::default();

    while let Some(line) = conn.read_line(watchdog)? {
        if line.is_empty() {
            break;
        }
        log::debug!("< {line}");

        if line.get(..7).is_some_and(|p| p.eq_ignore_ascii_case("http/1.")) {
            if let Some(verdict) = classify_status(&line)? {
                return Ok(verdict);
            }
            continue;
        }
        meta.absorb(&line);
    }

    meta.validate().map(HeaderVerdict::Firmware)
}
