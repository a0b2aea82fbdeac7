//! Reusable encode scratch.
//!
//! Bulk construction stages per-leaf record bytes in temporary buffers; a
//! [`Scratch`] recycles those allocations across nodes and across build
//! calls. Pool hits and misses never change the emitted bytes.

/// Recycled byte buffers for record staging.
#[derive(Debug, Default)]
pub struct Scratch {
    bufs: Vec<Vec<u8>>,
}

impl Scratch {
    #[must_use]
    pub fn new() -> Self {
        Scratch::default()
    }

    /// Take an empty buffer, reusing a pooled allocation when available.
    pub(crate) fn take_buf(&mut self) -> Vec<u8> {
        self.bufs.pop().unwrap_or_default()
    }

    /// Return a buffer to the pool.
    pub(crate) fn put_buf(&mut self, mut buf: Vec<u8>) {
        buf.clear();
        self.bufs.push(buf);
    }
}
