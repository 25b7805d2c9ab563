//! Streaming firmware body into the update-flash region.
//!
//! # Design
//! Exactly `content_length` bytes are pulled from the connection and each
//! chunk is written to the sink as soon as it arrives. A write that accepts
//! fewer bytes than it was given is fatal: flash pages cannot be safely
//! resumed mid-write. Reads are capped at the bytes still expected, so a
//! server that sends more than it advertised never overruns the image.
//! Completion is decided by the sink (`is_finished`), not by the byte count.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::PullError;
use crate::stall::Watchdog;
use crate::transport::{BufferedConnection, Connection};

/// The device's flash-update target. Only one update may be in flight.
pub trait FlashSink {
    /// Prepare to receive an image of `size` bytes.
    fn begin(&mut self, size: usize) -> bool;
    /// Write a chunk; returns how many bytes were committed.
    fn write(&mut self, data: &[u8]) -> usize;
    /// Finalize the image after the last byte.
    fn end(&mut self) -> bool;
    fn is_finished(&self) -> bool;
    /// Drop a partially written image. Called on any failure after `begin`.
    fn abort(&mut self) {}
}

/// Flash sink that keeps the image in memory. Useful on hosts and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryFlash {
    pub capacity: usize,
    pub image: Vec<u8>,
    expected: Option<usize>,
    finished: bool,
}

impl MemoryFlash {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }
}

impl FlashSink for MemoryFlash {
    fn begin(&mut self, size: usize) -> bool {
        if size > self.capacity {
            return false;
        }
        self.image = Vec::with_capacity(size);
        self.expected = Some(size);
        self.finished = false;
        true
    }

    fn write(&mut self, data: &[u8]) -> usize {
        let Some(expected) = self.expected else {
            return 0;
        };
        let n = data.len().min(expected - self.image.len());
        self.image.extend_from_slice(&data[..n]);
        n
    }

    fn end(&mut self) -> bool {
        self.finished = self.expected == Some(self.image.len());
        self.finished
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn abort(&mut self) {
        self.image.clear();
        self.expected = None;
        self.finished = false;
    }
}

/// Stream `content_length` body bytes into `sink`, reporting
/// `(written_so_far, content_length)` after every write.
pub fn stream_to_flash<C, S>(
    conn: &mut BufferedConnection<C>,
    content_length: usize,
    sink: &mut S,
    chunk_size: usize,
    watchdog: &mut Watchdog,
    on_progress: &mut dyn FnMut(usize, usize),
) -> Result<usize, PullError>
where
    C: Connection,
    S: FlashSink + ?Sized,
{
    if !sink.begin(content_length) {
        return Err(PullError::StartingUpdate(content_length));
    }
    let result = pump(conn, content_length, sink, chunk_size, watchdog, on_progress);
    if let Err(err) = &result {
        log::warn!("aborting flash update: {err}");
        sink.abort();
    }
    result
}

fn pump<C, S>(
    conn: &mut BufferedConnection<C>,
    content_length: usize,
    sink: &mut S,
    chunk_size: usize,
    watchdog: &mut Watchdog,
    on_progress: &mut dyn FnMut(usize, usize),
) -> Result<usize, PullError>
where
    C: Connection,
    S: FlashSink + ?Sized,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut written_total = 0usize;

    while written_total < content_length && conn.is_open() {
        let want = buf.len().min(content_length - written_total);
        let read = conn.read(&mut buf[..want]);
        if read == 0 {
            if conn.is_open() {
                watchdog.idle()?;
            }
            continue;
        }
        watchdog.progressed();
        log::trace!("read {read} body bytes");

        let written = sink.write(&buf[..read]);
        written_total += written.min(read);
        notify(on_progress, written_total, content_length);

        if written != read {
            return Err(PullError::ShortWrite { read, written });
        }
    }

    if written_total == content_length && !sink.end() {
        log::warn!("flash sink rejected finalization");
    }
    if !sink.is_finished() {
        return Err(PullError::UpdateIncomplete {
            written: written_total,
            expected: content_length,
        });
    }
    Ok(written_total)
}

/// A panicking observer must not tear down a half-written update.
fn notify(on_progress: &mut dyn FnMut(usize, usize), written: usize, total: usize) {
    if catch_unwind(AssertUnwindSafe(|| on_progress(written, total))).is_err() {
        log::warn!("progress observer panicked at {written}/{total}");
    }
}
