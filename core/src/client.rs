//! Pull orchestrator: one conditional firmware fetch, start to finish.
//!
//! # Design
//! `PullOta` owns the three device collaborators (connector, flash sink,
//! token store) and sequences a pull in a single pass:
//! parse URL, build request, connect, send, read headers, then either stop
//! on 304 or stream the body and persist the new `Last-Modified`. Any stage
//! may end the pull with its error; nothing is retried. The token is saved
//! only after the sink reports a finished image, so a partial download never
//! suppresses the next fetch. A failed save after a good flash is still
//! reported as a failure: the device runs the new image but will fetch it
//! again next time.
//!
//! Callers must not run two pulls against the same flash sink at once.

use crate::config::PullConfig;
use crate::error::{PullError, PullOutcome};
use crate::flash::{stream_to_flash, FlashSink};
use crate::request::RequestBuilder;
use crate::response::{read_headers, HeaderVerdict};
use crate::store::TokenStore;
use crate::transport::{BufferedConnection, Connector};
use crate::url::ParsedUrl;

pub struct PullOta<C, S, T> {
    connector: C,
    sink: S,
    store: T,
    config: PullConfig,
    requests: RequestBuilder,
}

impl<C, S, T> PullOta<C, S, T>
where
    C: Connector,
    S: FlashSink,
    T: TokenStore,
{
    pub fn new(connector: C, sink: S, store: T, config: PullConfig) -> Self {
        let requests = RequestBuilder::new(
            &config.user_agent,
            config.bearer_token.as_deref(),
            config.limits.clone(),
        );
        Self {
            connector,
            sink,
            store,
            config,
            requests,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn store(&self) -> &T {
        &self.store
    }

    /// Fetch `url` if it changed since the last applied image and flash it.
    /// `on_progress` receives `(bytes_written, total_bytes)` after every
    /// flash write and must return quickly.
    pub fn pull(
        &mut self,
        url: &str,
        mut on_progress: impl FnMut(usize, usize),
    ) -> Result<PullOutcome, PullError> {
        let result = ParsedUrl::parse(url).and_then(|url| self.pull_parsed(&url, &mut on_progress));
        match &result {
            Ok(outcome) => log::info!("pull finished: {outcome:?}"),
            Err(err) => log::warn!("pull failed: {err}"),
        }
        result
    }

    pub fn pull_parsed(
        &mut self,
        url: &ParsedUrl,
        on_progress: &mut dyn FnMut(usize, usize),
    ) -> Result<PullOutcome, PullError> {
        let port = url.effective_port();
        log::info!(
            "pulling {}://{}:{}/{}",
            url.scheme,
            url.host,
            port,
            url.path.as_deref().unwrap_or("")
        );

        let token = self.store.load();
        let request = self.requests.build(url, token.as_deref())?;
        log::debug!("> GET {} (conditional: {})", request.target, token.is_some());

        let conn = self
            .connector
            .connect(&url.host, port, url.is_https())
            .map_err(PullError::Connect)?;
        let mut conn = BufferedConnection::new(conn);
        conn.send(request.to_wire().as_bytes()).map_err(PullError::Connect)?;

        let mut watchdog = self.config.stall_policy().watchdog();
        let headers = match read_headers(&mut conn, &mut watchdog)? {
            HeaderVerdict::NotModified => {
                log::info!("firmware not modified since {}", token.as_deref().unwrap_or("-"));
                return Ok(PullOutcome::NoNewUpdate);
            }
            HeaderVerdict::Firmware(headers) => headers,
        };
        // a token the next request could not carry would wedge every later pull
        self.requests.check_token(&headers.last_modified)?;
        log::info!(
            "streaming {} bytes, last modified {}",
            headers.content_length,
            headers.last_modified
        );

        stream_to_flash(
            &mut conn,
            headers.content_length,
            &mut self.sink,
            self.config.chunk_size,
            &mut watchdog,
            on_progress,
        )?;
        drop(conn);

        self.store
            .save(&headers.last_modified)
            .map_err(PullError::PersistLastModified)?;
        Ok(PullOutcome::Updated)
    }
}
