//! C-ABI wrapper around `pull-ota-core`.
//!
//! # Overview
//! Lets firmware written in C run a conditional OTA pull with the Rust core.
//! The host describes its socket, flash partition and token slot once in a
//! `PullOtaPlatform`, then calls `pullota_pull` with a URL and gets back the
//! one-byte result code.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - The pull runs synchronously on the caller's thread; all platform
//!   callbacks and the progress callback are invoked from inside it.
//! - The C caller owns the client handle and must release it with
//!   `pullota_client_free`. Strings returned by `pullota_result_name` are
//!   static and must not be freed.

pub mod types;

use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;

use pull_ota_core::{PullConfig, PullOta, ResultCode};

use types::*;

// ---------------------------------------------------------------------------
// Client lifecycle
// ---------------------------------------------------------------------------

/// Create a client over the host's `platform`.
///
/// `bearer_token` may be null. Returns null if `platform` is null, a required
/// callback is missing, the token is not UTF-8, or an internal panic occurs.
/// The table is copied; the caller may free it after this returns.
#[unsafe(no_mangle)]
pub extern "C" fn pullota_client_new(
    platform: *const PullOtaPlatform,
    bearer_token: *const c_char,
) -> *mut PullOtaClient {
    catch_unwind(|| {
        if platform.is_null() {
            return std::ptr::null_mut();
        }
        let Some(platform) = Platform::from_raw(unsafe { &*platform }) else {
            return std::ptr::null_mut();
        };
        let bearer_token = if bearer_token.is_null() {
            None
        } else {
            match unsafe { CStr::from_ptr(bearer_token) }.to_str() {
                Ok(token) => Some(token.to_string()),
                Err(_) => return std::ptr::null_mut(),
            }
        };

        let config = PullConfig {
            bearer_token,
            ..PullConfig::default()
        };
        let inner = PullOta::new(
            PlatformConnector(platform),
            PlatformFlash(platform),
            PlatformTokenStore(platform),
            config,
        );
        Box::into_raw(Box::new(PullOtaClient { inner }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a client created by `pullota_client_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn pullota_client_free(client: *mut PullOtaClient) {
    if !client.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { Box::from_raw(client) });
        });
    }
}

// ---------------------------------------------------------------------------
// Pull
// ---------------------------------------------------------------------------

/// Run one conditional pull of `url` and return its result code.
///
/// `progress` may be null; otherwise it is called with `progress_ctx` after
/// every flash write. A null `client` or `url`, or a URL that is not UTF-8,
/// yields `url_parse_error`. A panic inside the pull yields `connect_error`.
#[unsafe(no_mangle)]
pub extern "C" fn pullota_pull(
    client: *mut PullOtaClient,
    url: *const c_char,
    progress: Option<ProgressFn>,
    progress_ctx: *mut c_void,
) -> u8 {
    catch_unwind(AssertUnwindSafe(|| {
        if client.is_null() || url.is_null() {
            return ResultCode::UrlParseError;
        }
        let client = unsafe { &mut *client };
        let Ok(url) = unsafe { CStr::from_ptr(url) }.to_str() else {
            return ResultCode::UrlParseError;
        };
        let result = client.inner.pull(url, |written, total| {
            if let Some(progress) = progress {
                unsafe { progress(progress_ctx, written, total) };
            }
        });
        ResultCode::from(&result)
    }))
    .unwrap_or(ResultCode::ConnectError) as u8
}

// ---------------------------------------------------------------------------
// Result codes
// ---------------------------------------------------------------------------

fn result_names() -> &'static HashMap<u8, CString> {
    static NAMES: OnceLock<HashMap<u8, CString>> = OnceLock::new();
    NAMES.get_or_init(|| {
        ResultCode::ALL
            .into_iter()
            .filter_map(|code| Some((code as u8, CString::new(code.name()).ok()?)))
            .collect()
    })
}

/// Static name for a result code, `"unknown"` for values outside the set.
/// The returned string must not be freed.
#[unsafe(no_mangle)]
pub extern "C" fn pullota_result_name(code: u8) -> *const c_char {
    const UNKNOWN: &CStr = c"unknown";
    catch_unwind(|| {
        result_names()
            .get(&code)
            .map_or(UNKNOWN.as_ptr(), |name| name.as_ptr())
    })
    .unwrap_or(UNKNOWN.as_ptr())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted device: serves `response` in `chunk`-sized reads and records
    /// everything the core does to it.
    #[derive(Default)]
    struct FakeDevice {
        refuse: bool,
        response: VecDeque<u8>,
        chunk: usize,
        sent: Vec<u8>,
        host: String,
        port: u16,
        closed: bool,
        image: Vec<u8>,
        expected: usize,
        finished: bool,
        aborted: bool,
        token: Option<String>,
        progress: Vec<(usize, usize)>,
        served: usize,
        /// Answer `-1` once after this many bytes, as Arduino clients do
        /// when nothing has arrived yet.
        no_data_at: Option<usize>,
    }

    impl FakeDevice {
        fn serving(response: &[u8]) -> Self {
            Self {
                response: response.iter().copied().collect(),
                chunk: 3,
                ..Self::default()
            }
        }
    }

    fn dev<'a>(ctx: *mut c_void) -> &'a mut FakeDevice {
        unsafe { &mut *ctx.cast::<FakeDevice>() }
    }

    unsafe extern "C" fn fake_connect(ctx: *mut c_void, host: *const c_char, port: u16, _tls: bool) -> bool {
        let d = dev(ctx);
        d.host = unsafe { CStr::from_ptr(host) }.to_string_lossy().into_owned();
        d.port = port;
        !d.refuse
    }

    unsafe extern "C" fn fake_read(ctx: *mut c_void, buf: *mut u8, len: usize) -> isize {
        let d = dev(ctx);
        if d.no_data_at == Some(d.served) {
            d.no_data_at = None;
            return -1;
        }
        let n = len.min(d.chunk).min(d.response.len());
        d.served += n;
        for i in 0..n {
            let byte = d.response.pop_front().unwrap_or_default();
            unsafe { *buf.add(i) = byte };
        }
        n as isize
    }

    unsafe extern "C" fn fake_write(ctx: *mut c_void, data: *const u8, len: usize) -> isize {
        let data = unsafe { std::slice::from_raw_parts(data, len) };
        dev(ctx).sent.extend_from_slice(data);
        len as isize
    }

    unsafe extern "C" fn fake_connected(ctx: *mut c_void) -> bool {
        !dev(ctx).response.is_empty()
    }

    unsafe extern "C" fn fake_close(ctx: *mut c_void) {
        dev(ctx).closed = true;
    }

    unsafe extern "C" fn fake_begin(ctx: *mut c_void, size: usize) -> bool {
        let d = dev(ctx);
        d.expected = size;
        d.image.clear();
        true
    }

    unsafe extern "C" fn fake_update_write(ctx: *mut c_void, data: *const u8, len: usize) -> usize {
        let data = unsafe { std::slice::from_raw_parts(data, len) };
        dev(ctx).image.extend_from_slice(data);
        len
    }

    unsafe extern "C" fn fake_end(ctx: *mut c_void) -> bool {
        let d = dev(ctx);
        d.finished = d.image.len() == d.expected;
        d.finished
    }

    unsafe extern "C" fn fake_is_finished(ctx: *mut c_void) -> bool {
        dev(ctx).finished
    }

    unsafe extern "C" fn fake_abort(ctx: *mut c_void) {
        dev(ctx).aborted = true;
    }

    unsafe extern "C" fn fake_token_load(ctx: *mut c_void, buf: *mut c_char, cap: usize) -> usize {
        let Some(token) = dev(ctx).token.clone() else {
            return 0;
        };
        let len = token.len().min(cap - 1);
        unsafe {
            std::ptr::copy_nonoverlapping(token.as_ptr(), buf.cast::<u8>(), len);
            *buf.add(len) = 0;
        }
        len
    }

    unsafe extern "C" fn fake_token_save(ctx: *mut c_void, token: *const c_char) -> bool {
        dev(ctx).token = Some(unsafe { CStr::from_ptr(token) }.to_string_lossy().into_owned());
        true
    }

    unsafe extern "C" fn fake_progress(ctx: *mut c_void, written: usize, total: usize) {
        dev(ctx).progress.push((written, total));
    }

    fn platform(device: *mut FakeDevice) -> PullOtaPlatform {
        PullOtaPlatform {
            ctx: device.cast(),
            connect: Some(fake_connect),
            read: Some(fake_read),
            write: Some(fake_write),
            connected: Some(fake_connected),
            close: Some(fake_close),
            update_begin: Some(fake_begin),
            update_write: Some(fake_update_write),
            update_end: Some(fake_end),
            update_is_finished: Some(fake_is_finished),
            update_abort: Some(fake_abort),
            token_load: Some(fake_token_load),
            token_save: Some(fake_token_save),
        }
    }

    const FIRMWARE_RESPONSE: &[u8] = b"HTTP/1.0 200 OK\r\n\
Content-Length: 4\r\n\
Content-Type: application/octet-stream\r\n\
Last-Modified: Tue, 15 Nov 1994 08:12:31 GMT\r\n\
\r\n\
\xDE\xAD\xBE\xEF";

    #[test]
    fn client_new_null_platform_returns_null() {
        assert!(pullota_client_new(std::ptr::null(), std::ptr::null()).is_null());
    }

    #[test]
    fn client_new_missing_required_callback_returns_null() {
        let mut device = FakeDevice::default();
        let mut table = platform(&mut device);
        table.update_write = None;
        assert!(pullota_client_new(&table, std::ptr::null()).is_null());
    }

    #[test]
    fn client_new_accepts_null_optional_callbacks() {
        let mut device = FakeDevice::default();
        let mut table = platform(&mut device);
        table.close = None;
        table.update_abort = None;
        table.token_load = None;
        table.token_save = None;
        let client = pullota_client_new(&table, std::ptr::null());
        assert!(!client.is_null());
        pullota_client_free(client);
    }

    #[test]
    fn pull_flashes_image_and_saves_token() {
        let mut device = FakeDevice::serving(FIRMWARE_RESPONSE);
        let table = platform(&mut device);
        let client = pullota_client_new(&table, std::ptr::null());
        let url = CString::new("http://ota.local:8080/fw.bin").unwrap();

        let code = pullota_pull(client, url.as_ptr(), Some(fake_progress), table.ctx);
        pullota_client_free(client);

        assert_eq!(code, ResultCode::Success as u8);
        assert_eq!(device.host, "ota.local");
        assert_eq!(device.port, 8080);
        assert!(device.sent.starts_with(b"GET /fw.bin HTTP/1.0\r\n"));
        assert_eq!(device.image, vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(device.token.as_deref(), Some("Tue, 15 Nov 1994 08:12:31 GMT"));
        assert_eq!(device.progress.last(), Some(&(4, 4)));
        assert!(device.closed);
        assert!(!device.aborted);
    }

    #[test]
    fn pull_waits_through_negative_reads() {
        let body_start = FIRMWARE_RESPONSE.len() - 4;
        let mut device = FakeDevice::serving(FIRMWARE_RESPONSE);
        device.chunk = 1;
        device.no_data_at = Some(body_start + 2);
        let table = platform(&mut device);
        let client = pullota_client_new(&table, std::ptr::null());
        let url = CString::new("http://ota.local/fw.bin").unwrap();

        let code = pullota_pull(client, url.as_ptr(), None, std::ptr::null_mut());
        pullota_client_free(client);

        assert_eq!(code, ResultCode::Success as u8);
        assert_eq!(device.no_data_at, None);
        assert_eq!(device.image, vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(!device.aborted);
    }

    #[test]
    fn pull_sends_stored_token_and_handles_304() {
        let mut device = FakeDevice::serving(b"HTTP/1.0 304 Not Modified\r\n\r\n");
        device.token = Some("Mon, 14 Nov 1994 00:00:00 GMT".to_string());
        let table = platform(&mut device);
        let bearer = CString::new("s3cret").unwrap();
        let client = pullota_client_new(&table, bearer.as_ptr());
        let url = CString::new("http://ota.local/fw.bin").unwrap();

        let code = pullota_pull(client, url.as_ptr(), None, std::ptr::null_mut());
        pullota_client_free(client);

        assert_eq!(code, ResultCode::NoNewUpdate as u8);
        let sent = String::from_utf8(device.sent.clone()).unwrap();
        assert!(sent.contains("If-Modified-Since: Mon, 14 Nov 1994 00:00:00 GMT\r\n"));
        assert!(sent.contains("Authorization: Bearer s3cret\r\n"));
        assert!(device.image.is_empty());
    }

    #[test]
    fn pull_truncated_body_aborts_update() {
        let truncated = &FIRMWARE_RESPONSE[..FIRMWARE_RESPONSE.len() - 2];
        let mut device = FakeDevice::serving(truncated);
        let table = platform(&mut device);
        let client = pullota_client_new(&table, std::ptr::null());
        let url = CString::new("http://ota.local/fw.bin").unwrap();

        let code = pullota_pull(client, url.as_ptr(), None, std::ptr::null_mut());
        pullota_client_free(client);

        assert_eq!(code, ResultCode::UpdateIncompleteError as u8);
        assert!(device.aborted);
        assert_eq!(device.token, None);
    }

    #[test]
    fn pull_refused_connection_is_connect_error() {
        let mut device = FakeDevice::default();
        device.refuse = true;
        let table = platform(&mut device);
        let client = pullota_client_new(&table, std::ptr::null());
        let url = CString::new("http://ota.local/fw.bin").unwrap();

        let code = pullota_pull(client, url.as_ptr(), None, std::ptr::null_mut());
        pullota_client_free(client);

        assert_eq!(code, ResultCode::ConnectError as u8);
    }

    #[test]
    fn pull_bad_url_is_parse_error() {
        let mut device = FakeDevice::default();
        let table = platform(&mut device);
        let client = pullota_client_new(&table, std::ptr::null());
        let url = CString::new("ftp://ota.local/fw.bin").unwrap();

        let code = pullota_pull(client, url.as_ptr(), None, std::ptr::null_mut());
        pullota_client_free(client);

        assert_eq!(code, ResultCode::UrlParseError as u8);
        assert!(device.sent.is_empty());
    }

    #[test]
    fn pull_null_args_are_parse_errors() {
        let url = CString::new("http://ota.local/fw.bin").unwrap();
        let code = pullota_pull(std::ptr::null_mut(), url.as_ptr(), None, std::ptr::null_mut());
        assert_eq!(code, ResultCode::UrlParseError as u8);

        let mut device = FakeDevice::default();
        let table = platform(&mut device);
        let client = pullota_client_new(&table, std::ptr::null());
        let code = pullota_pull(client, std::ptr::null(), None, std::ptr::null_mut());
        pullota_client_free(client);
        assert_eq!(code, ResultCode::UrlParseError as u8);
    }

    #[test]
    fn result_names_are_static_c_strings() {
        let name = unsafe { CStr::from_ptr(pullota_result_name(0x00)) };
        assert_eq!(name.to_str().unwrap(), "success");
        let name = unsafe { CStr::from_ptr(pullota_result_name(0x33)) };
        assert_eq!(name.to_str().unwrap(), "stream_stalled_error");
        let name = unsafe { CStr::from_ptr(pullota_result_name(0x99)) };
        assert_eq!(name.to_str().unwrap(), "unknown");
    }

    #[test]
    fn free_null_is_safe() {
        pullota_client_free(std::ptr::null_mut());
    }
}
