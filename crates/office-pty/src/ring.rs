//! Bounded scrollback buffer for PTY replay.

use std::collections::VecDeque;

/// Byte ring with a fixed capacity; oldest bytes are evicted first.
///
/// The transcript file is the durable record of a session. This buffer
/// only exists so a viewer attaching mid-run gets recent terminal
/// scrollback, so losing the oldest bytes is acceptable by construction.
#[derive(Debug)]
pub struct OutputRing {
    buf: VecDeque<u8>,
    max_bytes: usize,
}

impl OutputRing {
    /// Creates an empty ring holding at most `max_bytes`.
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buf: VecDeque::new(),
            max_bytes,
        }
    }

    /// Appends a chunk, evicting from the front if over capacity.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend(data);
        if self.buf.len() > self.max_bytes {
            let excess = self.buf.len() - self.max_bytes;
            self.buf.drain(..excess);
        }
    }

    /// Returns the buffered bytes, oldest first.
    pub fn snapshot(&self) -> Vec<u8> {
        self.buf.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_snapshot() {
        let mut ring = OutputRing::new(16);
        ring.push(b"hello ");
        ring.push(b"world");
        assert_eq!(ring.snapshot(), b"hello world");
        assert_eq!(ring.len(), 11);
    }

    #[test]
    fn test_eviction_drops_oldest_bytes() {
        let mut ring = OutputRing::new(8);
        ring.push(b"abcdefgh");
        ring.push(b"1234");
        assert_eq!(ring.len(), 8);
        assert_eq!(ring.snapshot(), b"efgh1234");
    }

    #[test]
    fn test_single_oversized_chunk_keeps_tail() {
        let mut ring = OutputRing::new(4);
        ring.push(b"0123456789");
        assert_eq!(ring.snapshot(), b"6789");
    }

    #[test]
    fn test_empty_ring() {
        let ring = OutputRing::new(4);
        assert!(ring.is_empty());
        assert!(ring.snapshot().is_empty());
    }
}
