use bytes::Bytes;

use crate::encoder::encode;
use crate::entry::LogEntry;

/// Default number of buffered entries per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Wraps the codec to encode arbitrarily long entry streams in bounded
/// memory: entries accumulate until the batch threshold, then the whole
/// batch is encoded and the buffer reset.
///
/// Every emitted buffer is fully self-contained — own header, own string
/// table. The dictionary is deliberately not carried across batches: the
/// same string re-enters each batch's table, trading some redundancy for a
/// flat memory ceiling regardless of input size.
pub struct StreamingEncoder {
    batch_size: usize,
    buf: Vec<LogEntry>,
}

impl StreamingEncoder {
    pub fn new() -> Self {
        Self::with_batch_size(DEFAULT_BATCH_SIZE)
    }

    /// `batch_size` of 0 is clamped to 1.
    pub fn with_batch_size(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            buf: Vec::with_capacity(batch_size),
        }
    }

    /// Buffer one entry. When the batch threshold is reached the buffered
    /// entries are encoded as one unit and returned; otherwise `None`.
    pub fn push(&mut self, entry: LogEntry) -> Option<Bytes> {
        self.buf.push(entry);
        if self.buf.len() >= self.batch_size {
            return self.flush();
        }
        None
    }

    /// Encode whatever is buffered, if anything. Call once after the last
    /// `push` to drain the final partial batch.
    pub fn flush(&mut self) -> Option<Bytes> {
        if self.buf.is_empty() {
            return None;
        }
        let encoded = encode(&self.buf);
        self.buf.clear();
        Some(encoded)
    }

    /// Entries currently buffered and not yet encoded.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Default for StreamingEncoder {
    fn default() -> Self {
        Self::new()
    }
}
