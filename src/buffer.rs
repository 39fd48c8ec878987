//! Byte staging between the socket and the protocol engine

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// The three operations the protocol engine needs from a byte buffer.
///
/// The engine never allocates receive or send storage itself: it looks at
/// what is readable, releases what it has consumed, and pushes outgoing
/// bytes.
pub trait ByteBuffer {
    /// Contiguous bytes received but not yet released.
    fn readable(&self) -> &[u8];

    /// Drops the first `n` readable bytes. Releasing more than is readable
    /// empties the buffer.
    fn release(&mut self, n: usize);

    /// Appends bytes to the writable end.
    fn push(&mut self, bytes: &[u8]);
}

/// Growable buffer with a read offset.
///
/// Released bytes are only reclaimed lazily: when the buffer drains
/// completely, or when more room is requested for a socket read.
#[derive(Debug, Default)]
pub struct StreamBuffer {
    buf: Vec<u8>,
    start: usize,
}

impl StreamBuffer {
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            start: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len() - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn clear(&mut self) {
        self.buf.clear();
        self.start = 0;
    }

    /// Clears the buffer, reallocating it with `default` capacity when it
    /// grew past `max`.
    #[inline]
    pub fn reset(&mut self, default: usize, max: usize) {
        if self.buf.capacity() > max {
            self.buf = Vec::with_capacity(default);
        }
        self.clear();
    }

    /// Reads at most `chunk` bytes from `reader` onto the readable end,
    /// returning how many arrived (`0` on EOF).
    pub async fn read_from<R>(&mut self, reader: &mut R, chunk: usize) -> io::Result<usize>
    where
        R: AsyncRead + Unpin,
    {
        self.compact();

        let filled = self.buf.len();
        self.buf.resize(filled + chunk, 0);

        let result = reader.read(&mut self.buf[filled..]).await;
        let n = *result.as_ref().unwrap_or(&0);
        self.buf.truncate(filled + n);

        result
    }

    #[inline]
    fn compact(&mut self) {
        if self.start != 0 {
            self.buf.drain(..self.start);
            self.start = 0;
        }
    }
}

impl ByteBuffer for StreamBuffer {
    #[inline]
    fn readable(&self) -> &[u8] {
        &self.buf[self.start..]
    }

    #[inline]
    fn release(&mut self, n: usize) {
        self.start = (self.start + n).min(self.buf.len());
        if self.start == self.buf.len() {
            self.clear();
        }
    }

    #[inline]
    fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_and_push() {
        let mut buf = StreamBuffer::with_capacity(16);
        buf.push(b"GET / HTTP/1.1\r\n");

        buf.release(4);
        assert_eq!(buf.readable(), b"/ HTTP/1.1\r\n");

        buf.push(b"\r\n");
        assert_eq!(buf.readable(), b"/ HTTP/1.1\r\n\r\n");

        buf.release(100);
        assert!(buf.is_empty());
        assert_eq!(buf.readable(), b"");
    }

    #[test]
    fn reset_shrinks() {
        let mut buf = StreamBuffer::with_capacity(8);
        buf.push(&[0; 64]);

        buf.reset(8, 32);
        assert!(buf.is_empty());
        assert!(buf.buf.capacity() < 64);
    }

    #[tokio::test]
    async fn read_compacts() {
        let mut buf = StreamBuffer::with_capacity(8);
        buf.push(b"abcdef");
        buf.release(4);

        let mut src: &[u8] = b"ghij";
        assert_eq!(buf.read_from(&mut src, 16).await.unwrap(), 4);
        assert_eq!(buf.readable(), b"efghij");
        assert_eq!(buf.start, 0);

        assert_eq!(buf.read_from(&mut src, 16).await.unwrap(), 0);
        assert_eq!(buf.readable(), b"efghij");
    }
}
