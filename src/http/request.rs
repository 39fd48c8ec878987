use crate::{
    buffer::ByteBuffer,
    errors::ErrorKind,
    http::{
        headers::{self, HeaderEntry, HeaderField},
        mime::{self, DEFAULT_MIME},
        parser::{Archive, Flow, Line},
        resource::{DocumentRoot, Resource},
        table::KeyedTable,
        types::{Method, StatusCode, Version},
    },
    limits::{ConnLimits, ReqLimits, RespLimits},
};

/// Lookup tables shared by every connection.
///
/// Built once before the first connection is accepted and only read
/// afterwards; see [`KeyedTable`] for why that makes sharing sound.
#[derive(Debug)]
pub struct Registry {
    headers: KeyedTable<HeaderEntry>,
    mime: KeyedTable<&'static str>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            headers: headers::header_table(),
            mime: mime::mime_table(),
        }
    }

    #[inline]
    pub(crate) fn headers(&self) -> &KeyedTable<HeaderEntry> {
        &self.headers
    }

    /// `Content-Type` for a file extension, `text/html` when unknown.
    #[inline]
    pub fn content_type(&self, extension: &[u8]) -> &'static str {
        mime::content_type(&self.mime, extension)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the lifecycle needs besides the connection itself.
#[derive(Debug)]
pub struct Context {
    pub registry: Registry,
    pub root: DocumentRoot,
    pub conn_limits: ConnLimits,
    pub req_limits: ReqLimits,
    pub resp_limits: RespLimits,
}

impl Context {
    pub fn new(root: DocumentRoot) -> Self {
        Self {
            registry: Registry::new(),
            root,
            conn_limits: ConnLimits::default(),
            req_limits: ReqLimits::default(),
            resp_limits: RespLimits::default(),
        }
    }
}

/// Which part of the request the next bytes belong to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Phase {
    RequestLine,
    Headers,
    Body,
    Done,
}

/// Result of feeding the read buffer to [`Request::on_message`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Progress {
    /// More bytes are needed.
    Again,
    /// The request is finished (or failed); a response must be sent.
    Respond,
}

/// One HTTP request on a connection, reused for every request the
/// connection carries.
///
/// # Lifecycle
///
/// ```text
/// [ RequestLine ] --> [ Headers ] --> [ Body ] --> [ Done ]
///        |                 |              |
///        \-----------------+--------------+---> [ Done ] with an error status
/// ```
///
/// A missing resource does not leave the normal path: headers and body are
/// still consumed so the next request on the connection starts at the
/// right byte, and only then is the request answered with `404`.
///
/// Head bytes stay in the read buffer until the blank line is reached and
/// every header has been dispatched, then they are released in one step.
/// Body bytes are released as soon as they are counted.
#[derive(Debug)]
pub struct Request {
    pub(crate) archive: Archive,
    phase: Phase,
    resource: Option<Resource>,
    status: StatusCode,
    content_type: &'static str,
    not_found: bool,
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

impl Request {
    pub fn new() -> Self {
        Self {
            archive: Archive::default(),
            phase: Phase::RequestLine,
            resource: None,
            status: StatusCode::Ok,
            content_type: DEFAULT_MIME,
            not_found: false,
        }
    }

    #[inline]
    pub fn reset(&mut self) {
        self.archive.reset();
        self.phase = Phase::RequestLine;
        self.resource = None;
        self.status = StatusCode::Ok;
        self.content_type = DEFAULT_MIME;
        self.not_found = false;
    }

    #[inline]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    #[inline]
    pub const fn method(&self) -> Option<Method> {
        self.archive.method
    }

    #[inline]
    pub const fn version(&self) -> Version {
        self.archive.version
    }

    #[inline]
    pub const fn keep_alive(&self) -> bool {
        self.archive.keep_alive
    }

    #[inline]
    pub const fn is_error(&self) -> bool {
        self.archive.is_error_response
    }

    #[inline]
    pub const fn content_type(&self) -> &'static str {
        self.content_type
    }

    #[inline]
    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    #[inline]
    pub(crate) fn take_resource(&mut self) -> Option<Resource> {
        self.resource.take()
    }

    /// Forces the connection to close after this response.
    #[inline]
    pub(crate) fn close_after_response(&mut self) {
        self.archive.keep_alive = false;
    }

    /// Whether the connection may carry another request once this
    /// response is sent.
    #[inline]
    pub fn complete(&self) -> bool {
        self.archive.keep_alive
    }

    /// Drives the parser over the readable bytes until the request is done,
    /// has failed, or needs more bytes.
    pub fn on_message<B: ByteBuffer>(&mut self, rb: &mut B, ctx: &Context) -> Progress {
        loop {
            let step = match self.phase {
                Phase::RequestLine => self.handle_request_line(rb.readable(), ctx),
                Phase::Headers => self.handle_headers(rb, ctx),
                Phase::Body => self.handle_body(rb),
                Phase::Done => return Progress::Respond,
            };

            match step {
                Ok(Flow::Ok) => {}
                Ok(Flow::Again) => {
                    let in_head = matches!(self.phase, Phase::RequestLine | Phase::Headers);
                    if in_head && rb.readable().len() >= ctx.req_limits.head_size {
                        self.fail(ErrorKind::HeadTooLarge);
                        return Progress::Respond;
                    }
                    return Progress::Again;
                }
                Err(err) => {
                    self.fail(err);
                    return Progress::Respond;
                }
            }
        }
    }

    fn handle_request_line(&mut self, buf: &[u8], ctx: &Context) -> Result<Flow, ErrorKind> {
        if self.archive.parse_request_line(buf)? == Flow::Again {
            return Ok(Flow::Again);
        }

        let version = self.archive.version;
        if version.major != 1 {
            return Err(ErrorKind::UnsupportedVersion);
        }
        self.archive.keep_alive = version.keep_alive_default();

        let url = self.archive.url;
        let path = url.path.get(buf).ok_or(ErrorKind::InvalidUrl)?;

        match ctx.root.resolve(path) {
            Ok(resource) => {
                let extension: &[u8] = match resource.index {
                    true => b"html",
                    false => url.extension.get(buf).unwrap_or_default(),
                };
                self.content_type = ctx.registry.content_type(extension);
                self.resource = Some(resource);
            }
            Err(ErrorKind::NotFound) => self.not_found = true,
            Err(err) => return Err(err),
        }

        self.phase = Phase::Headers;
        Ok(Flow::Ok)
    }

    fn handle_headers<B: ByteBuffer>(&mut self, rb: &mut B, ctx: &Context) -> Result<Flow, ErrorKind> {
        loop {
            let buf = rb.readable();

            match self.archive.parse_header_line(buf)? {
                Line::Again => return Ok(Flow::Again),
                Line::Header => headers::dispatch(
                    ctx.registry.headers(),
                    &mut self.archive,
                    buf,
                    &ctx.req_limits,
                )?,
                Line::End => break,
            }
        }

        self.log_head(rb.readable());

        rb.release(self.archive.cursor);
        self.archive.cursor = 0;
        self.phase = Phase::Body;
        Ok(Flow::Ok)
    }

    fn handle_body<B: ByteBuffer>(&mut self, rb: &mut B) -> Result<Flow, ErrorKind> {
        let flow = self.archive.parse_body(rb.readable());
        rb.release(self.archive.cursor);
        self.archive.cursor = 0;

        if flow == Flow::Ok {
            self.phase = Phase::Done;
            if self.not_found {
                self.fail(ErrorKind::NotFound);
            }
        }
        Ok(flow)
    }

    fn fail(&mut self, err: ErrorKind) {
        let status = err.status();

        match err.forces_close() {
            true => {
                tracing::warn!(
                    status = status.as_u16(),
                    reason = status.reason(),
                    error = %err,
                    "rejecting request"
                );
                self.archive.keep_alive = false;
            }
            false => tracing::debug!(status = status.as_u16(), error = %err, "request failed"),
        }

        self.status = status;
        self.archive.is_error_response = true;
        self.resource = None;
        self.content_type = DEFAULT_MIME;
        self.phase = Phase::Done;
    }

    fn log_head(&self, buf: &[u8]) {
        if !tracing::enabled!(tracing::Level::DEBUG) {
            return;
        }

        let url = self.archive.url.target.get(buf).map(String::from_utf8_lossy);
        let host = self
            .archive
            .headers
            .value(HeaderField::Host, buf)
            .map(String::from_utf8_lossy);

        tracing::debug!(
            method = self.archive.method.map(|m| m.as_str()),
            url = ?url,
            host = ?host,
            version = ?self.archive.version,
            "request"
        );
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::buffer::StreamBuffer;
    use std::fs;
    use tempfile::TempDir;

    pub(crate) fn site() -> (TempDir, Context) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "x".repeat(42)).unwrap();
        fs::write(dir.path().join("notes.txt"), "plain text").unwrap();
        fs::write(dir.path().join("style.CSS"), "body {}").unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/index.html"), "docs").unwrap();

        let ctx = Context::new(DocumentRoot::open(dir.path()).unwrap());
        (dir, ctx)
    }

    fn feed(src: &[u8], ctx: &Context) -> (Progress, Request, StreamBuffer) {
        let mut rb = StreamBuffer::default();
        rb.push(src);

        let mut req = Request::new();
        let progress = req.on_message(&mut rb, ctx);
        (progress, req, rb)
    }

    #[test]
    fn serves_index() {
        let (_dir, ctx) = site();
        let (progress, mut req, rb) = feed(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n", &ctx);

        assert_eq!(progress, Progress::Respond);
        assert_eq!(req.status(), StatusCode::Ok);
        assert!(req.keep_alive());
        assert!(!req.is_error());
        assert_eq!(req.content_type(), "text/html");
        assert_eq!(req.take_resource().map(|r| r.size), Some(42));
        assert!(rb.is_empty());
    }

    #[test]
    fn content_types() {
        let (_dir, ctx) = site();

        #[rustfmt::skip]
        let cases = [
            ("/notes.txt", "text/plain"),
            ("/style.CSS", "text/css"),
            ("/docs",      "text/html"),
            ("/docs/",     "text/html"),
        ];

        for (path, expected) in cases {
            let src = format!("GET {path} HTTP/1.1\r\n\r\n");
            let (progress, req, _) = feed(src.as_bytes(), &ctx);

            assert_eq!(progress, Progress::Respond, "{path}");
            assert_eq!(req.status(), StatusCode::Ok, "{path}");
            assert_eq!(req.content_type(), expected, "{path}");
        }
    }

    #[test]
    fn keep_alive_derivation() {
        let (_dir, ctx) = site();

        #[rustfmt::skip]
        let cases = [
            ("GET / HTTP/1.1\r\n\r\n",                         true),
            ("GET / HTTP/1.0\r\n\r\n",                         false),
            ("GET / HTTP/1.1\r\nConnection: close\r\n\r\n",     false),
            ("GET / HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\n", true),
        ];

        for (src, keep_alive) in cases {
            let (progress, req, _) = feed(src.as_bytes(), &ctx);

            assert_eq!(progress, Progress::Respond, "{src:?}");
            assert_eq!(req.keep_alive(), keep_alive, "{src:?}");
        }
    }

    #[test]
    fn error_statuses() {
        let (_dir, ctx) = site();

        #[rustfmt::skip]
        let cases: [(&[u8], StatusCode); 9] = [
            (b"FOO /x HTTP/1.1\r\n",                                StatusCode::BadRequest),
            (b"GET /x HTTP/2.0\r\n",                                StatusCode::HttpVersionNotSupported),
            (b"GET /x HTTP/0.9\r\n",                                StatusCode::HttpVersionNotSupported),
            (b"GET / HTTP/1.1\r\nTransfer-Encoding: gzip\r\n\r\n",  StatusCode::NotImplemented),
            (b"GET / HTTP/1.1\r\nTransfer-Encoding: zstd\r\n\r\n",  StatusCode::BadRequest),
            (b"GET / HTTP/1.1\r\nConnection: maybe\r\n\r\n",        StatusCode::BadRequest),
            (b"GET / HTTP/1.1\r\nContent-Length: 0\r\n\r\n",        StatusCode::BadRequest),
            (b"POST / HTTP/1.1\r\nContent-Length: 99999999\r\n\r\n", StatusCode::PayloadTooLarge),
            (b"GET /\xff HTTP/1.1\r\n\r\n",                         StatusCode::BadRequest),
        ];

        for (src, status) in cases {
            let (progress, req, _) = feed(src, &ctx);

            assert_eq!(progress, Progress::Respond, "{:?}", String::from_utf8_lossy(src));
            assert_eq!(req.status(), status, "{:?}", String::from_utf8_lossy(src));
            assert!(req.is_error());
            assert!(!req.keep_alive());
        }
    }

    #[test]
    fn missing_resource_keeps_connection() {
        let (_dir, ctx) = site();
        let (progress, req, rb) = feed(b"GET /nope HTTP/1.1\r\nHost: x\r\n\r\n", &ctx);

        assert_eq!(progress, Progress::Respond);
        assert_eq!(req.status(), StatusCode::NotFound);
        assert!(req.is_error());
        assert!(req.keep_alive());
        assert!(rb.is_empty());

        let (_, req, _) = feed(b"GET /../index.html HTTP/1.1\r\n\r\n", &ctx);
        assert_eq!(req.status(), StatusCode::NotFound);
    }

    #[test]
    fn missing_resource_consumes_body() {
        let (_dir, ctx) = site();
        let (progress, req, rb) = feed(
            b"POST /nope HTTP/1.1\r\nContent-Length: 5\r\n\r\nhelloGET / HTTP/1.1\r\n\r\n",
            &ctx,
        );

        assert_eq!(progress, Progress::Respond);
        assert_eq!(req.status(), StatusCode::NotFound);
        assert_eq!(rb.readable(), b"GET / HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn missing_resource_still_validates_headers() {
        let (_dir, ctx) = site();
        let (_, req, _) = feed(b"GET /nope HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n", &ctx);

        assert_eq!(req.status(), StatusCode::NotImplemented);
        assert!(!req.keep_alive());
    }

    #[test]
    fn resumable_across_deliveries() {
        let (_dir, ctx) = site();
        let src = b"POST /notes.txt HTTP/1.1\r\nHost: example\r\nContent-Length: 4\r\n\r\nbody";

        for split in 1..src.len() {
            let mut rb = StreamBuffer::default();
            let mut req = Request::new();

            rb.push(&src[..split]);
            assert_eq!(req.on_message(&mut rb, &ctx), Progress::Again, "{split}");

            rb.push(&src[split..]);
            assert_eq!(req.on_message(&mut rb, &ctx), Progress::Respond, "{split}");
            assert_eq!(req.status(), StatusCode::Ok, "{split}");
            assert_eq!(req.archive.body_received, 4);
            assert!(rb.is_empty());
        }
    }

    #[test]
    fn head_released_after_dispatch() {
        let (_dir, ctx) = site();
        let mut rb = StreamBuffer::default();
        let mut req = Request::new();

        rb.push(b"GET / HTTP/1.1\r\nConnection: cl");
        assert_eq!(req.on_message(&mut rb, &ctx), Progress::Again);
        // Nothing released while the head is incomplete.
        assert_eq!(rb.readable(), b"GET / HTTP/1.1\r\nConnection: cl");

        rb.push(b"ose\r\nHost: x\r");
        assert_eq!(req.on_message(&mut rb, &ctx), Progress::Again);
        let connection = req.archive.headers.value(HeaderField::Connection, rb.readable());
        assert_eq!(connection, Some(&b"close"[..]));

        rb.push(b"\n\r\n");
        assert_eq!(req.on_message(&mut rb, &ctx), Progress::Respond);
        assert_eq!(req.status(), StatusCode::Ok);
        assert!(!req.keep_alive());
        assert!(rb.is_empty());
    }

    #[test]
    fn head_too_large() {
        let (_dir, ctx) = site();
        let mut src = b"GET /".to_vec();
        src.extend(std::iter::repeat(b'a').take(ctx.req_limits.head_size));

        let (progress, req, _) = feed(&src, &ctx);
        assert_eq!(progress, Progress::Respond);
        assert_eq!(req.status(), StatusCode::RequestHeaderFieldsTooLarge);
        assert!(!req.keep_alive());
    }

    #[test]
    fn pipelined_requests() {
        let (_dir, ctx) = site();
        let mut rb = StreamBuffer::default();
        rb.push(b"GET /notes.txt HTTP/1.1\r\n\r\nGET /nope HTTP/1.1\r\n\r\n");

        let mut req = Request::new();
        assert_eq!(req.on_message(&mut rb, &ctx), Progress::Respond);
        assert_eq!(req.status(), StatusCode::Ok);
        assert!(req.complete());

        req.reset();
        assert_eq!(req.on_message(&mut rb, &ctx), Progress::Respond);
        assert_eq!(req.status(), StatusCode::NotFound);
        assert!(rb.is_empty());
    }
}
