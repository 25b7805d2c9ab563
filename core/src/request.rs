//! Firmware GET request construction.
//!
//! # Design
//! `FirmwareRequest` describes the request as plain data; `to_wire` renders
//! the exact HTTP/1.0 bytes sent to the server. Header order is fixed:
//! `Host`, `User-Agent`, optional `Authorization`, optional
//! `If-Modified-Since`, `Connection: close`. Every variable part is checked
//! against `RequestLimits` first, so an oversized URL or token fails with
//! `RequestTooLong` instead of producing a truncated request.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::config::RequestLimits;
use crate::error::PullError;
use crate::url::ParsedUrl;

/// A single-shot `GET` described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareRequest {
    /// Request target including the leading slash and any query.
    pub target: String,
    pub headers: Vec<(String, String)>,
}

impl FirmwareRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn to_wire(&self) -> String {
        let mut wire = format!("GET {} HTTP/1.0\r\n", self.target);
        for (name, value) in &self.headers {
            wire.push_str(name);
            wire.push_str(": ");
            wire.push_str(value);
            wire.push_str("\r\n");
        }
        wire.push_str("\r\n");
        wire
    }
}

/// Builds conditional, optionally authenticated firmware requests.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    user_agent: String,
    bearer_token: Option<String>,
    limits: RequestLimits,
}

impl RequestBuilder {
    pub fn new(user_agent: &str, bearer_token: Option<&str>, limits: RequestLimits) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            bearer_token: bearer_token.map(str::to_string),
            limits,
        }
    }

    pub fn build(&self, url: &ParsedUrl, conditional_token: Option<&str>) -> Result<FirmwareRequest, PullError> {
        let limits = &self.limits;
        check_len("host", url.host.len(), limits.max_host_len)?;

        let mut target = String::from("/");
        target.push_str(url.path.as_deref().unwrap_or(""));
        if let Some(query) = &url.query {
            target.push('?');
            target.push_str(query);
        }
        check_len("request target", target.len(), limits.max_target_len)?;

        let mut headers = vec![
            ("Host".to_string(), url.host.clone()),
            ("User-Agent".to_string(), self.user_agent.clone()),
        ];
        if let Some(auth) = self.authorization(url)? {
            headers.push(("Authorization".to_string(), auth));
        }
        if let Some(token) = conditional_token.filter(|t| !t.is_empty()) {
            self.check_token(token)?;
            headers.push(("If-Modified-Since".to_string(), token.to_string()));
        }
        headers.push(("Connection".to_string(), "close".to_string()));

        let request = FirmwareRequest { target, headers };
        check_len("request", request.to_wire().len(), limits.max_request_len)?;
        Ok(request)
    }

    /// Fails if `token` could not be sent back as `If-Modified-Since`.
    pub fn check_token(&self, token: &str) -> Result<(), PullError> {
        check_len("conditional token", token.len(), self.limits.max_token_len)
    }

    /// Bearer token if configured, else Basic when the URL carries both a
    /// username and a password, else nothing.
    fn authorization(&self, url: &ParsedUrl) -> Result<Option<String>, PullError> {
        let max = self.limits.max_credentials_len;
        if let Some(token) = &self.bearer_token {
            check_len("bearer token", token.len(), max)?;
            return Ok(Some(format!("Bearer {token}")));
        }
        match (&url.username, &url.password) {
            (Some(user), Some(pass)) => {
                let credentials = format!("{user}:{pass}");
                check_len("credentials", credentials.len(), max)?;
                Ok(Some(format!("Basic {}", STANDARD.encode(credentials))))
            }
            _ => Ok(None),
        }
    }
}

fn check_len(field: &'static str, len: usize, max: usize) -> Result<(), PullError> {
    if len > max {
        return Err(PullError::RequestTooLong { field, len, max });
    }
    Ok(())
}
