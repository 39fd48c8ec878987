//! Resumable request-line, header-line and identity body parsers
//!
//! Every parser works on the readable region of the connection's read
//! buffer and keeps its progress in an [`Archive`]. When the region ends in
//! the middle of a grammar unit the parser parks its cursor at the end and
//! returns [`Flow::Again`]; calling it again once more bytes were appended
//! continues exactly where it stopped, without looking at a byte twice.
//!
//! ```text
//! GET /docs/index.html?lang=en HTTP/1.1\r\n
//! |-| |---------------||-----| |------|
//! Method     Path       Query   Version
//!
//! Host: example.com\r\n
//! |--|  |---------|
//! Name    Value
//! \r\n                  <- end of head
//! ```

use crate::{
    errors::ErrorKind,
    http::{
        headers::{Coding, HeaderFields},
        types::{Method, Version},
        view::Span,
    },
};
use memchr::{memchr2, memrchr2};

/// Outcome of a parser step that did not fail.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Flow {
    /// The grammar unit is complete.
    Ok,
    /// The buffer ended first; call again after more bytes arrive.
    Again,
}

/// Outcome of [`Archive::parse_header_line`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Line {
    Again,
    /// One header parsed into [`Archive::name`] / [`Archive::value`].
    Header,
    /// The blank line closing the head.
    End,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
enum LineState {
    #[default]
    Begin,
    Method,
    SpacesBeforeUrl,
    Url,
    SpacesBeforeVersion,
    H,
    Ht,
    Htt,
    Http,
    Slash,
    Major,
    Dot,
    Minor,
    Cr,
    Done,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
enum HeaderState {
    #[default]
    Begin,
    Name,
    BeforeValue,
    Value,
    ValueCr,
    BlankCr,
}

/// Components of the request target.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Url {
    /// Whole target as sent, query included.
    pub target: Span,
    pub path: Span,
    /// Query string without the leading `?`; empty when absent.
    pub query: Span,
    /// Bytes after the last `.` of the last path segment.
    pub extension: Span,
}

/// Per-request parse state carried across deliveries.
///
/// The cursor counts from the first readable byte of the read buffer, so
/// every [`Span`] below stays valid until the consumed bytes are released.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Archive {
    line: LineState,
    header: HeaderState,
    token_start: usize,
    pub(crate) cursor: usize,

    pub method: Option<Method>,
    pub url: Url,
    pub version: Version,

    /// Current header line, overwritten by every parsed header.
    pub name: Span,
    pub value: Span,
    pub headers: HeaderFields,

    pub transfer_encoding: Coding,
    pub content_length: usize,
    pub body_received: usize,

    pub keep_alive: bool,
    pub is_error_response: bool,
}

impl Archive {
    #[inline]
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// Advances through `METHOD SP URL SP HTTP/x.y CRLF`.
    ///
    /// Only `1.0` and `1.1` pass the digit checks; a larger digit run stops
    /// parsing at that digit.
    pub fn parse_request_line(&mut self, buf: &[u8]) -> Result<Flow, ErrorKind> {
        let mut pos = self.cursor;

        while let Some(&ch) = buf.get(pos) {
            match self.line {
                LineState::Begin => match ch {
                    b'A'..=b'Z' | b'a'..=b'z' => {
                        self.token_start = pos;
                        self.line = LineState::Method;
                    }
                    _ => return Err(ErrorKind::InvalidMethod),
                },
                LineState::Method => match ch {
                    b'A'..=b'Z' | b'a'..=b'z' if pos - self.token_start < Method::MAX_LEN => {}
                    b' ' => {
                        let token = Span::between(self.token_start, pos)
                            .get(buf)
                            .ok_or(ErrorKind::InvalidMethod)?;

                        self.method = Some(Method::from_token(token)?);
                        self.line = LineState::SpacesBeforeUrl;
                    }
                    _ => return Err(ErrorKind::InvalidMethod),
                },
                LineState::SpacesBeforeUrl => match ch {
                    b' ' | b'\t' => {}
                    b'\r' | b'\n' => return Err(ErrorKind::InvalidUrl),
                    _ => {
                        self.token_start = pos;
                        self.line = LineState::Url;
                    }
                },
                LineState::Url => match ch {
                    b' ' | b'\t' => {
                        self.url = parse_url(buf, Span::between(self.token_start, pos))?;
                        self.line = LineState::SpacesBeforeVersion;
                    }
                    b'\r' | b'\n' => return Err(ErrorKind::InvalidUrl),
                    _ => {}
                },
                LineState::SpacesBeforeVersion => match ch {
                    b' ' | b'\t' => {}
                    b'H' | b'h' => self.line = LineState::H,
                    _ => return Err(ErrorKind::InvalidVersion),
                },
                LineState::H => self.line = expect(ch, b'T', LineState::Ht)?,
                LineState::Ht => self.line = expect(ch, b'T', LineState::Htt)?,
                LineState::Htt => self.line = expect(ch, b'P', LineState::Http)?,
                LineState::Http => match ch {
                    b'/' => self.line = LineState::Slash,
                    _ => return Err(ErrorKind::InvalidVersion),
                },
                LineState::Slash => {
                    self.version.major = push_digit(0, ch)?;
                    self.line = LineState::Major;
                }
                LineState::Major => match ch {
                    b'.' => self.line = LineState::Dot,
                    _ => self.version.major = push_digit(self.version.major, ch)?,
                },
                LineState::Dot => {
                    self.version.minor = push_digit(0, ch)?;
                    self.line = LineState::Minor;
                }
                LineState::Minor => match ch {
                    b'\r' => self.line = LineState::Cr,
                    _ => self.version.minor = push_digit(self.version.minor, ch)?,
                },
                LineState::Cr => match ch {
                    b'\n' => {
                        self.line = LineState::Done;
                        self.header = HeaderState::Begin;
                        self.cursor = pos + 1;
                        return Ok(Flow::Ok);
                    }
                    _ => return Err(ErrorKind::InvalidVersion),
                },
                LineState::Done => return Ok(Flow::Ok),
            }

            pos += 1;
        }

        self.cursor = pos;
        Ok(Flow::Again)
    }

    /// Parses at most one header line, or the blank line ending the head.
    ///
    /// Names are not normalised here. Trailing whitespace is trimmed from
    /// the value and a bare `LF` is accepted as a line end.
    pub fn parse_header_line(&mut self, buf: &[u8]) -> Result<Line, ErrorKind> {
        let mut pos = self.cursor;

        while let Some(&ch) = buf.get(pos) {
            match self.header {
                HeaderState::Begin => match ch {
                    b'\r' => self.header = HeaderState::BlankCr,
                    b'\n' => return Ok(self.finish_line(pos, Line::End)),
                    _ if is_name_byte(ch) => {
                        self.token_start = pos;
                        self.header = HeaderState::Name;
                    }
                    _ => return Err(ErrorKind::InvalidHeader),
                },
                HeaderState::Name => match ch {
                    b':' => {
                        self.name = Span::between(self.token_start, pos);
                        self.header = HeaderState::BeforeValue;
                    }
                    _ if is_name_byte(ch) => {}
                    _ => return Err(ErrorKind::InvalidHeader),
                },
                HeaderState::BeforeValue => match ch {
                    b' ' | b'\t' => {}
                    b'\r' | b'\n' => return Err(ErrorKind::InvalidHeader),
                    _ => {
                        self.token_start = pos;
                        self.header = HeaderState::Value;
                    }
                },
                HeaderState::Value => match ch {
                    b'\r' => {
                        self.value = Span::between(self.token_start, pos).trim_end(buf);
                        self.header = HeaderState::ValueCr;
                    }
                    b'\n' => {
                        self.value = Span::between(self.token_start, pos).trim_end(buf);
                        return Ok(self.finish_line(pos, Line::Header));
                    }
                    _ => {
                        pos = match memchr2(b'\r', b'\n', &buf[pos..]) {
                            Some(offset) => pos + offset,
                            None => buf.len(),
                        };
                        continue;
                    }
                },
                HeaderState::ValueCr => match ch {
                    b'\n' => return Ok(self.finish_line(pos, Line::Header)),
                    _ => return Err(ErrorKind::InvalidHeader),
                },
                HeaderState::BlankCr => match ch {
                    b'\n' => return Ok(self.finish_line(pos, Line::End)),
                    _ => return Err(ErrorKind::InvalidHeader),
                },
            }

            pos += 1;
        }

        self.cursor = pos;
        Ok(Line::Again)
    }

    /// Counts identity body bytes, never past `content_length`, so bytes of
    /// a following request stay unread.
    pub fn parse_body(&mut self, buf: &[u8]) -> Flow {
        let available = buf.len().saturating_sub(self.cursor);
        let take = (self.content_length - self.body_received).min(available);

        self.body_received += take;
        self.cursor += take;

        match self.body_received >= self.content_length {
            true => Flow::Ok,
            false => Flow::Again,
        }
    }

    #[inline]
    fn finish_line(&mut self, lf: usize, line: Line) -> Line {
        self.cursor = lf + 1;
        self.header = HeaderState::Begin;
        line
    }
}

/// Splits `target` into path, query and extension. The target must begin
/// with `/`.
pub fn parse_url(buf: &[u8], target: Span) -> Result<Url, ErrorKind> {
    let bytes = target.get(buf).ok_or(ErrorKind::InvalidUrl)?;
    if bytes.first() != Some(&b'/') {
        return Err(ErrorKind::InvalidUrl);
    }

    let (path, query) = match memchr::memchr(b'?', bytes) {
        Some(i) => (
            Span::new(target.start(), i),
            Span::between(target.start() + i + 1, target.end()),
        ),
        None => (target, Span::new(target.end(), 0)),
    };

    let extension = match path.get(buf).and_then(|p| memrchr2(b'.', b'/', p)) {
        Some(i) if buf[path.start() + i] == b'.' => Span::between(path.start() + i + 1, path.end()),
        _ => Span::new(path.end(), 0),
    };

    Ok(Url {
        target,
        path,
        query,
        extension,
    })
}

#[inline(always)]
fn expect(ch: u8, upper: u8, next: LineState) -> Result<LineState, ErrorKind> {
    match ch.to_ascii_uppercase() == upper {
        true => Ok(next),
        false => Err(ErrorKind::InvalidVersion),
    }
}

#[inline(always)]
fn push_digit(acc: u8, ch: u8) -> Result<u8, ErrorKind> {
    if !ch.is_ascii_digit() {
        return Err(ErrorKind::InvalidVersion);
    }

    match acc * 10 + (ch - b'0') {
        n if n > 1 => Err(ErrorKind::UnsupportedVersion),
        n => Ok(n),
    }
}

#[inline(always)]
const fn is_name_byte(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'-'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text<'a>(span: Span, buf: &'a [u8]) -> &'a str {
        std::str::from_utf8(span.get(buf).unwrap()).unwrap()
    }

    fn request_line(src: &[u8]) -> (Result<Flow, ErrorKind>, Archive) {
        let mut archive = Archive::default();
        (archive.parse_request_line(src), archive)
    }

    #[test]
    fn request_line_ok() {
        #[rustfmt::skip]
        let cases = [
            ("GET / HTTP/1.1\r\n",                   Method::Get,    "/",            Version::HTTP_11),
            ("HEAD /a/b.txt HTTP/1.0\r\n",           Method::Head,   "/a/b.txt",     Version::HTTP_10),
            ("POST /form?x=1 HTTP/1.1\r\n",          Method::Post,   "/form?x=1",    Version::HTTP_11),
            ("PUT  \t/spaces   HTTP/1.1\r\n",        Method::Put,    "/spaces",      Version::HTTP_11),
            ("DELETE /item http/1.1\r\n",            Method::Delete, "/item",        Version::HTTP_11),
        ];

        for (src, method, target, version) in cases {
            let (result, archive) = request_line(src.as_bytes());

            assert_eq!(result, Ok(Flow::Ok), "{src:?}");
            assert_eq!(archive.method, Some(method));
            assert_eq!(text(archive.url.target, src.as_bytes()), target);
            assert_eq!(archive.version, version);
            assert_eq!(archive.cursor, src.len());
        }
    }

    #[test]
    fn request_line_rejected() {
        #[rustfmt::skip]
        let cases = [
            ("FOO /x HTTP/1.1\r\n",     ErrorKind::InvalidMethod),
            ("get /x HTTP/1.1\r\n",     ErrorKind::InvalidMethod),
            ("GETGETGET /x HTTP/1.1\r\n", ErrorKind::InvalidMethod),
            (" GET /x HTTP/1.1\r\n",    ErrorKind::InvalidMethod),
            ("GET\r\n",                 ErrorKind::InvalidMethod),
            ("GET x HTTP/1.1\r\n",      ErrorKind::InvalidUrl),
            ("GET /x\r\n",              ErrorKind::InvalidUrl),
            ("GET /x FTP/1.1\r\n",      ErrorKind::InvalidVersion),
            ("GET /x HTTP/1.x\r\n",     ErrorKind::InvalidVersion),
            ("GET /x HTTP/1.1\n",       ErrorKind::InvalidVersion),
            ("GET /x HTTP/1.1\r\r",     ErrorKind::InvalidVersion),
            ("GET /x HTTP/1.1 \r\n",    ErrorKind::InvalidVersion),
            ("GET /x HTTP/2.0\r\n",     ErrorKind::UnsupportedVersion),
            ("GET /x HTTP/1.2\r\n",     ErrorKind::UnsupportedVersion),
            ("GET /x HTTP/10.1\r\n",    ErrorKind::UnsupportedVersion),
            ("GET /x HTTP/1.10\r\n",    ErrorKind::UnsupportedVersion),
        ];

        for (src, expected) in cases {
            assert_eq!(request_line(src.as_bytes()).0, Err(expected), "{src:?}");
        }
    }

    #[test]
    fn version_rejected_at_first_bad_digit() {
        let src = b"GET /x HTTP/2.0\r\n";
        let mut archive = Archive::default();

        // Everything up to the major digit is accepted.
        assert_eq!(archive.parse_request_line(&src[..12]), Ok(Flow::Again));
        assert_eq!(
            archive.parse_request_line(&src[..13]),
            Err(ErrorKind::UnsupportedVersion)
        );
    }

    #[test]
    fn request_line_resumable() {
        let src = b"DELETE /files/report.final.pdf?download=1&v=2 HTTP/1.0\r\n";
        let (whole, expected) = request_line(src);
        assert_eq!(whole, Ok(Flow::Ok));

        for split in 1..src.len() {
            let mut archive = Archive::default();

            assert_eq!(archive.parse_request_line(&src[..split]), Ok(Flow::Again), "{split}");
            assert_eq!(archive.cursor, split);
            assert_eq!(archive.parse_request_line(src), Ok(Flow::Ok), "{split}");
            assert_eq!(archive, expected, "{split}");
        }
    }

    #[test]
    fn request_line_byte_by_byte() {
        let src = b"GET /a/b.txt HTTP/1.1\r\n";
        let (_, expected) = request_line(src);

        let mut archive = Archive::default();
        for end in 1..src.len() {
            assert_eq!(archive.parse_request_line(&src[..end]), Ok(Flow::Again));
        }
        assert_eq!(archive.parse_request_line(src), Ok(Flow::Ok));
        assert_eq!(archive, expected);
    }

    #[test]
    fn url_parts() {
        #[rustfmt::skip]
        let cases = [
            ("/",                    "/",          "",          ""),
            ("/a/b.txt",             "/a/b.txt",   "",          "txt"),
            ("/a/b",                 "/a/b",       "",          ""),
            ("/a.b/c",               "/a.b/c",     "",          ""),
            ("/a.b/c.tar.gz",        "/a.b/c.tar.gz", "",       "gz"),
            ("/dir/",                "/dir/",      "",          ""),
            ("/x.html?a=1&b=2",      "/x.html",    "a=1&b=2",   "html"),
            ("/x?",                  "/x",         "",          ""),
            ("/.hidden",             "/.hidden",   "",          "hidden"),
            ("/name.",               "/name.",     "",          ""),
        ];

        for (src, path, query, extension) in cases {
            let buf = src.as_bytes();
            let url = parse_url(buf, Span::new(0, buf.len())).unwrap();

            assert_eq!(text(url.path, buf), path, "{src}");
            assert_eq!(text(url.query, buf), query, "{src}");
            assert_eq!(text(url.extension, buf), extension, "{src}");
        }

        assert_eq!(parse_url(b"x/y", Span::new(0, 3)), Err(ErrorKind::InvalidUrl));
        assert_eq!(parse_url(b"", Span::new(0, 0)), Err(ErrorKind::InvalidUrl));
    }

    #[test]
    fn header_lines() {
        let src = b"Host: example.com\r\nX-Long-Name:\t value \t\r\nAccept: */*\n\r\n";
        let mut archive = Archive::default();

        #[rustfmt::skip]
        let expected = [
            ("Host",        "example.com"),
            ("X-Long-Name", "value"),
            ("Accept",      "*/*"),
        ];

        for (name, value) in expected {
            assert_eq!(archive.parse_header_line(src), Ok(Line::Header));
            assert_eq!(text(archive.name, src), name);
            assert_eq!(text(archive.value, src), value);
        }
        assert_eq!(archive.parse_header_line(src), Ok(Line::End));
        assert_eq!(archive.cursor, src.len());
    }

    #[test]
    fn header_line_rejected() {
        #[rustfmt::skip]
        let cases: [&[u8]; 7] = [
            b" Host: x\r\n",
            b"Host : x\r\n",
            b"Ho st: x\r\n",
            b"Host: \r\n",
            b"Host:\n",
            b"Host: x\r\r",
            b"\rX",
        ];

        for src in cases {
            let mut archive = Archive::default();
            assert_eq!(
                archive.parse_header_line(src),
                Err(ErrorKind::InvalidHeader),
                "{:?}",
                String::from_utf8_lossy(src)
            );
        }
    }

    #[test]
    fn blank_line_variants() {
        for src in [&b"\r\n"[..], b"\n"] {
            let mut archive = Archive::default();
            assert_eq!(archive.parse_header_line(src), Ok(Line::End));
            assert_eq!(archive.cursor, src.len());
        }
    }

    #[test]
    fn header_line_resumable() {
        let src = b"Content-Type: text/html; charset=utf-8\r\n";
        let mut expected = Archive::default();
        assert_eq!(expected.parse_header_line(src), Ok(Line::Header));

        for split in 1..src.len() {
            let mut archive = Archive::default();

            assert_eq!(archive.parse_header_line(&src[..split]), Ok(Line::Again), "{split}");
            assert_eq!(archive.parse_header_line(src), Ok(Line::Header), "{split}");
            assert_eq!(archive.name, expected.name);
            assert_eq!(archive.value, expected.value);
            assert_eq!(archive.cursor, src.len());
        }
    }

    #[test]
    fn body_counting() {
        let mut archive = Archive {
            content_length: 10,
            ..Archive::default()
        };

        assert_eq!(archive.parse_body(b"abcd"), Flow::Again);
        assert_eq!(archive.body_received, 4);

        archive.cursor = 0;
        assert_eq!(archive.parse_body(b"efghijGET / HTTP/1.1"), Flow::Ok);
        assert_eq!(archive.body_received, 10);
        assert_eq!(archive.cursor, 6);
    }

    #[test]
    fn empty_body_is_complete() {
        let mut archive = Archive::default();
        assert_eq!(archive.parse_body(b""), Flow::Ok);
        assert_eq!(archive.parse_body(b"GET"), Flow::Ok);
        assert_eq!(archive.cursor, 0);
    }
}
