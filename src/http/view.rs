//! Non-owning byte ranges into the read buffer

/// `offset + len` view into a byte buffer the span does not own.
///
/// A span stays meaningful only while the bytes it covers have not been
/// released from the buffer. Every access is bounds checked against the
/// slice it is resolved against, so a stale span yields `None` instead of
/// reading unrelated bytes.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Span {
    start: usize,
    len: usize,
}

impl Span {
    pub const EMPTY: Span = Span { start: 0, len: 0 };

    #[inline]
    pub const fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// Span covering `start..end`. An inverted range produces an empty span.
    #[inline]
    pub const fn between(start: usize, end: usize) -> Self {
        Self {
            start,
            len: end.saturating_sub(start),
        }
    }

    #[inline]
    pub const fn start(&self) -> usize {
        self.start
    }

    #[inline]
    pub const fn end(&self) -> usize {
        self.start + self.len
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get<'a>(&self, buf: &'a [u8]) -> Option<&'a [u8]> {
        buf.get(self.start..self.end())
    }

    /// Length-bounded ASCII case-insensitive comparison.
    #[inline]
    pub fn eq_ignore_case(&self, buf: &[u8], other: &[u8]) -> bool {
        self.get(buf)
            .is_some_and(|bytes| bytes.eq_ignore_ascii_case(other))
    }

    /// Shrinks the span so that it ends before trailing spaces and tabs.
    #[inline]
    pub(crate) fn trim_end(self, buf: &[u8]) -> Self {
        let Some(bytes) = self.get(buf) else {
            return self;
        };
        let len = bytes
            .iter()
            .rposition(|b| !matches!(b, b' ' | b'\t'))
            .map_or(0, |i| i + 1);

        Self { len, ..self }
    }
}
