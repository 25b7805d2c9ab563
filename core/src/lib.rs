//! Conditional over-the-air firmware pull for a single device.
//!
//! # Overview
//! Given a firmware URL, `PullOta` sends an HTTP/1.0 `GET` (with optional
//! bearer or basic auth and `If-Modified-Since`), reads the response headers
//! line by line, and streams exactly `Content-Length` bytes into the
//! device's flash-update sink. The response's `Last-Modified` is persisted
//! after a fully finalized image so the next pull can be conditional.
//!
//! # Design
//! - Device collaborators sit behind traits: `Connector`/`Connection` for
//!   the socket, `FlashSink` for the update partition, `TokenStore` for the
//!   persisted `Last-Modified`. Hosts and tests substitute in-memory ones.
//! - Everything runs synchronously on the caller's thread; the progress
//!   callback is invoked inline from the streaming loop.
//! - Every pull ends in exactly one `ResultCode`; `PullError` carries the
//!   detail behind the error codes.
//! - Reads that return no data while the peer is connected are polled under
//!   an idle timeout (`StallPolicy`) instead of spinning forever.

pub mod client;
pub mod config;
pub mod error;
pub mod flash;
pub mod header;
pub mod request;
pub mod response;
pub mod stall;
pub mod store;
pub mod transport;
pub mod url;

pub use client::PullOta;
pub use config::{PullConfig, RequestLimits};
pub use error::{PullError, PullOutcome, ResultCode};
pub use flash::{FlashSink, MemoryFlash};
pub use request::{FirmwareRequest, RequestBuilder};
pub use response::{FirmwareHeaders, HeaderVerdict, ResponseMeta};
pub use stall::StallPolicy;
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use transport::{BufferedConnection, Connection, Connector, TcpConnector};
pub use url::ParsedUrl;
