//! `#[repr(C)]` platform table and the adapters that plug it into the core.
//!
//! # Design
//! The C host supplies one `PullOtaPlatform`: a `void* ctx` plus function
//! pointers for the socket, the flash partition and the token slot. Every
//! callback receives `ctx` back unchanged. `Platform` is the validated copy
//! with the required pointers unwrapped; the adapter types below each hold a
//! copy and implement one core trait on top of it.

use std::ffi::{c_char, c_void, CString};
use std::io;

use pull_ota_core::{Connection, Connector, FlashSink, PullOta, TokenStore};

/// Largest token (plus NUL) `token_load` may write.
pub const TOKEN_CAPACITY: usize = 256;

pub type ConnectFn = unsafe extern "C" fn(ctx: *mut c_void, host: *const c_char, port: u16, tls: bool) -> bool;
/// Returns bytes read, or zero or negative when nothing is available yet
/// (Arduino-style `-1`). Liveness is reported by `connected`.
pub type ReadFn = unsafe extern "C" fn(ctx: *mut c_void, buf: *mut u8, len: usize) -> isize;
/// Returns bytes accepted, negative on error.
pub type WriteFn = unsafe extern "C" fn(ctx: *mut c_void, data: *const u8, len: usize) -> isize;
pub type ConnectedFn = unsafe extern "C" fn(ctx: *mut c_void) -> bool;
pub type CloseFn = unsafe extern "C" fn(ctx: *mut c_void);
pub type UpdateBeginFn = unsafe extern "C" fn(ctx: *mut c_void, size: usize) -> bool;
pub type UpdateWriteFn = unsafe extern "C" fn(ctx: *mut c_void, data: *const u8, len: usize) -> usize;
pub type UpdateEndFn = unsafe extern "C" fn(ctx: *mut c_void) -> bool;
pub type UpdateIsFinishedFn = unsafe extern "C" fn(ctx: *mut c_void) -> bool;
pub type UpdateAbortFn = unsafe extern "C" fn(ctx: *mut c_void);
/// Copies the stored token into `buf` (NUL terminated) and returns its length,
/// or returns `0` when no token is stored.
pub type TokenLoadFn = unsafe extern "C" fn(ctx: *mut c_void, buf: *mut c_char, cap: usize) -> usize;
pub type TokenSaveFn = unsafe extern "C" fn(ctx: *mut c_void, token: *const c_char) -> bool;
pub type ProgressFn = unsafe extern "C" fn(ctx: *mut c_void, written: usize, total: usize);

/// Device services supplied by the C host.
///
/// `close`, `update_abort`, `token_load` and `token_save` may be null;
/// everything else is required.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct PullOtaPlatform {
    pub ctx: *mut c_void,
    pub connect: Option<ConnectFn>,
    pub read: Option<ReadFn>,
    pub write: Option<WriteFn>,
    pub connected: Option<ConnectedFn>,
    pub close: Option<CloseFn>,
    pub update_begin: Option<UpdateBeginFn>,
    pub update_write: Option<UpdateWriteFn>,
    pub update_end: Option<UpdateEndFn>,
    pub update_is_finished: Option<UpdateIsFinishedFn>,
    pub update_abort: Option<UpdateAbortFn>,
    pub token_load: Option<TokenLoadFn>,
    pub token_save: Option<TokenSaveFn>,
}

#[derive(Clone, Copy)]
pub(crate) struct Platform {
    ctx: *mut c_void,
    connect: ConnectFn,
    read: ReadFn,
    write: WriteFn,
    connected: ConnectedFn,
    close: Option<CloseFn>,
    update_begin: UpdateBeginFn,
    update_write: UpdateWriteFn,
    update_end: UpdateEndFn,
    update_is_finished: UpdateIsFinishedFn,
    update_abort: Option<UpdateAbortFn>,
    token_load: Option<TokenLoadFn>,
    token_save: Option<TokenSaveFn>,
}

impl Platform {
    /// `None` if any required callback is null.
    pub(crate) fn from_raw(raw: &PullOtaPlatform) -> Option<Self> {
        Some(Self {
            ctx: raw.ctx,
            connect: raw.connect?,
            read: raw.read?,
            write: raw.write?,
            connected: raw.connected?,
            close: raw.close,
            update_begin: raw.update_begin?,
            update_write: raw.update_write?,
            update_end: raw.update_end?,
            update_is_finished: raw.update_is_finished?,
            update_abort: raw.update_abort,
            token_load: raw.token_load,
            token_save: raw.token_save,
        })
    }
}

/// Opaque handle returned by `pullota_client_new`.
pub struct PullOtaClient {
    pub(crate) inner: PullOta<PlatformConnector, PlatformFlash, PlatformTokenStore>,
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

pub(crate) struct PlatformConnector(pub(crate) Platform);

impl Connector for PlatformConnector {
    type Conn = PlatformConnection;

    fn connect(&mut self, host: &str, port: u16, tls: bool) -> io::Result<PlatformConnection> {
        let host = CString::new(host).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let p = self.0;
        if unsafe { (p.connect)(p.ctx, host.as_ptr(), port, tls) } {
            Ok(PlatformConnection(p))
        } else {
            Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "platform connect failed",
            ))
        }
    }
}

/// Live platform socket. Closed on drop.
pub(crate) struct PlatformConnection(Platform);

impl Connection for PlatformConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let p = self.0;
        let n = unsafe { (p.read)(p.ctx, buf.as_mut_ptr(), buf.len()) };
        // negative means "no data yet"; a dead peer shows up in `connected`
        Ok(usize::try_from(n).unwrap_or(0).min(buf.len()))
    }

    fn write_all(&mut self, mut buf: &[u8]) -> io::Result<()> {
        let p = self.0;
        while !buf.is_empty() {
            let n = unsafe { (p.write)(p.ctx, buf.as_ptr(), buf.len()) };
            if n <= 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "platform write accepted no bytes",
                ));
            }
            buf = &buf[(n as usize).min(buf.len())..];
        }
        Ok(())
    }

    fn connected(&self) -> bool {
        let p = self.0;
        unsafe { (p.connected)(p.ctx) }
    }
}

impl Drop for PlatformConnection {
    fn drop(&mut self) {
        let p = self.0;
        if let Some(close) = p.close {
            unsafe { close(p.ctx) };
        }
    }
}

// ---------------------------------------------------------------------------
// Flash
// ---------------------------------------------------------------------------

pub(crate) struct PlatformFlash(pub(crate) Platform);

impl FlashSink for PlatformFlash {
    fn begin(&mut self, size: usize) -> bool {
        let p = self.0;
        unsafe { (p.update_begin)(p.ctx, size) }
    }

    fn write(&mut self, data: &[u8]) -> usize {
        let p = self.0;
        unsafe { (p.update_write)(p.ctx, data.as_ptr(), data.len()) }
    }

    fn end(&mut self) -> bool {
        let p = self.0;
        unsafe { (p.update_end)(p.ctx) }
    }

    fn is_finished(&self) -> bool {
        let p = self.0;
        unsafe { (p.update_is_finished)(p.ctx) }
    }

    fn abort(&mut self) {
        let p = self.0;
        if let Some(abort) = p.update_abort {
            unsafe { abort(p.ctx) };
        }
    }
}

// ---------------------------------------------------------------------------
// Token slot
// ---------------------------------------------------------------------------

pub(crate) struct PlatformTokenStore(pub(crate) Platform);

impl TokenStore for PlatformTokenStore {
    fn load(&self) -> Option<String> {
        let p = self.0;
        let load = p.token_load?;
        let mut buf = [0u8; TOKEN_CAPACITY];
        let len = unsafe { load(p.ctx, buf.as_mut_ptr().cast(), buf.len()) };
        let raw = &buf[..len.min(buf.len())];
        let token = String::from_utf8_lossy(raw);
        let token = token.trim_end_matches('\0');
        (!token.is_empty()).then(|| token.to_string())
    }

    fn save(&mut self, token: &str) -> io::Result<()> {
        let p = self.0;
        let Some(save) = p.token_save else {
            log::debug!("platform has no token slot, not persisting {token}");
            return Ok(());
        };
        let token = CString::new(token).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        if unsafe { save(p.ctx, token.as_ptr()) } {
            Ok(())
        } else {
            Err(io::Error::other("platform token_save failed"))
        }
    }
}
