//! Pre-parsed firmware URL.
//!
//! Parses `scheme://[user[:password]@]host[:port][/path][?query]`. Absent
//! components are `None` rather than empty strings: a URL with `user:@host`
//! has an empty password, which is not the same as having none.
//! No percent-decoding is performed; path and query are sent as given.

use crate::error::PullError;

/// Scheme, authority, and target of a firmware URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    pub scheme: String,
    pub host: String,
    /// `0` means "not given"; see [`ParsedUrl::effective_port`].
    pub port: u16,
    /// Path without its leading slash.
    pub path: Option<String>,
    pub query: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ParsedUrl {
    pub fn parse(input: &str) -> Result<Self, PullError> {
        let fail = |why: &str| PullError::UrlParse(format!("{why}: {input}"));

        let (scheme, rest) = input.split_once("://").ok_or_else(|| fail("missing scheme"))?;
        let scheme = scheme.to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(fail("unsupported scheme"));
        }

        let rest = rest.split_once('#').map_or(rest, |(before, _)| before);
        let (rest, query) = match rest.split_once('?') {
            Some((before, q)) => (before, Some(q.to_string())),
            None => (rest, None),
        };
        let (authority, path) = match rest.split_once('/') {
            Some((auth, p)) if !p.is_empty() => (auth, Some(p.to_string())),
            Some((auth, _)) => (auth, None),
            None => (rest, None),
        };

        let (userinfo, host_port) = match authority.rsplit_once('@') {
            Some((info, hp)) => (Some(info), hp),
            None => (None, authority),
        };
        let (username, password) = match userinfo {
            Some(info) => match info.split_once(':') {
                Some((user, pass)) => (Some(user.to_string()), Some(pass.to_string())),
                None => (Some(info.to_string()), None),
            },
            None => (None, None),
        };

        let (host, port) = split_host_port(host_port).ok_or_else(|| fail("invalid port"))?;
        if host.is_empty() {
            return Err(fail("missing host"));
        }

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
            path,
            query,
            username,
            password,
        })
    }

    pub fn is_https(&self) -> bool {
        self.scheme == "https"
    }

    /// The explicit port, or 443/80 by scheme when none was given.
    pub fn effective_port(&self) -> u16 {
        match self.port {
            0 if self.is_https() => 443,
            0 => 80,
            port => port,
        }
    }
}

/// Split `host[:port]`, keeping bracketed IPv6 literals intact.
fn split_host_port(host_port: &str) -> Option<(&str, u16)> {
    let port_sep = if host_port.starts_with('[') {
        let close = host_port.find(']')?;
        match &host_port[close + 1..] {
            "" => return Some((host_port, 0)),
            tail if tail.starts_with(':') => close + 1,
            _ => return None,
        }
    } else {
        match host_port.rfind(':') {
            Some(idx) => idx,
            None => return Some((host_port, 0)),
        }
    };
    let port = host_port[port_sep + 1..].parse::<u16>().ok()?;
    Some((&host_port[..port_sep], port))
}
