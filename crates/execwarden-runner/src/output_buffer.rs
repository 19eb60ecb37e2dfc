//! Tail-retaining byte accumulator for one output stream.
//!
//! Verbose commands can emit far more output than is worth keeping in memory.
//! With a capture limit set, an [`OutputBuffer`] keeps only the most recent
//! bytes, which is where final error messages end up.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Buffer shared between a stream reader and the result assembler.
pub(crate) type SharedBuffer = Arc<Mutex<OutputBuffer>>;

pub(crate) fn shared_buffer(limit: Option<usize>) -> SharedBuffer {
    Arc::new(Mutex::new(OutputBuffer::new(limit)))
}

/// Lock a shared buffer. A panicked holder cannot leave the buffer in a
/// state that violates its invariants, so poisoning is ignored.
pub(crate) fn lock_buffer(buffer: &SharedBuffer) -> MutexGuard<'_, OutputBuffer> {
    buffer.lock().unwrap_or_else(|p| p.into_inner())
}

/// Bounded accumulator that keeps the most recent bytes of a stream.
///
/// Invariants, after every [`append_chunk`](Self::append_chunk):
/// - `retained_len() <= limit` when a limit is set
/// - `retained_len() == min(limit, total_bytes())`
/// - `is_truncated() == (total_bytes() > retained_len())`, and once true it
///   stays true
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    retained: VecDeque<u8>,
    limit: Option<usize>,
    total_bytes: u64,
    truncated: bool,
}

impl OutputBuffer {
    /// Create a buffer; `None` means unbounded.
    #[must_use]
    pub fn new(limit: Option<usize>) -> Self {
        let initial = limit.map_or(8192, |l| l.min(8192));
        Self {
            retained: VecDeque::with_capacity(initial),
            limit,
            total_bytes: 0,
            truncated: false,
        }
    }

    /// Append bytes in the order they were produced.
    ///
    /// A chunk at least as large as the limit replaces the whole buffer with
    /// its own tail; smaller chunks evict just enough of the oldest bytes to
    /// fit.
    pub fn append_chunk(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.total_bytes += data.len() as u64;

        match self.limit {
            None => self.retained.extend(data),
            Some(limit) if data.len() >= limit => {
                self.retained.clear();
                self.retained.extend(&data[data.len() - limit..]);
            }
            Some(limit) => {
                let overflow = (self.retained.len() + data.len()).saturating_sub(limit);
                self.retained.drain(..overflow);
                self.retained.extend(data);
            }
        }

        if self.total_bytes > self.retained.len() as u64 {
            self.truncated = true;
        }
    }

    /// Configured capture limit, if any.
    #[must_use]
    pub const fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Bytes currently retained.
    #[must_use]
    pub fn retained_len(&self) -> usize {
        self.retained.len()
    }

    /// Bytes ever appended, including evicted ones.
    #[must_use]
    pub const fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Whether any appended byte has been evicted.
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Copy of the retained bytes, oldest first.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let (front, back) = self.retained.as_slices();
        let mut bytes = Vec::with_capacity(self.retained.len());
        bytes.extend_from_slice(front);
        bytes.extend_from_slice(back);
        bytes
    }

    /// Retained bytes as text.
    ///
    /// Decoding is lossy: invalid UTF-8 (including a multi-byte character
    /// cut in half by eviction) becomes U+FFFD. Truncated output is prefixed
    /// with a one-line notice stating how much was kept.
    #[must_use]
    pub fn render(&self) -> String {
        let bytes = self.to_bytes();
        let text = String::from_utf8_lossy(&bytes);
        if self.truncated {
            format!(
                "{}\n{text}",
                truncation_notice(self.retained.len(), self.total_bytes)
            )
        } else {
            text.into_owned()
        }
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Notice placed above truncated output.
#[must_use]
pub fn truncation_notice(retained: usize, total: u64) -> String {
    format!("[output truncated: showing last {retained} of {total} bytes]")
}
