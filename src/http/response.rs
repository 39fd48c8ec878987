use crate::{
    buffer::ByteBuffer,
    http::{
        request::{Context, Request},
        types::Method,
    },
};
use std::{fs::File, future::Future, io, time::Duration, time::SystemTime};

/// Value of the `Server` header.
pub const SERVER_NAME: &str = concat!("filament/", env!("CARGO_PKG_VERSION"));

/// Largest number of file bytes handed to one `sendfile` call.
const SENDFILE_CHUNK: u64 = 1 << 20;

/// Where responses are written.
///
/// The header block goes through [`write_all`](Self::write_all); file bodies
/// through [`send_file`](Self::send_file), which lets a socket move them
/// without copying through user space.
pub trait Transport {
    fn write_all(&mut self, bytes: &[u8]) -> impl Future<Output = io::Result<()>>;

    /// Sends up to `count` bytes of `file` starting at `offset`, returning
    /// how many were sent. `0` means no progress is possible.
    fn send_file(
        &mut self,
        file: &File,
        offset: u64,
        count: usize,
    ) -> impl Future<Output = io::Result<usize>>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ResponsePhase {
    SendHeaders,
    SendBody,
    Done,
}

/// Outgoing half of a request: the header block staged in the write buffer
/// and the file that follows it.
#[derive(Debug)]
pub struct Response {
    phase: ResponsePhase,
    body: Option<File>,
    length: u64,
    sent: u64,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            phase: ResponsePhase::SendHeaders,
            body: None,
            length: 0,
            sent: 0,
        }
    }

    #[inline]
    pub fn reset(&mut self) {
        self.phase = ResponsePhase::SendHeaders;
        self.body = None;
        self.length = 0;
        self.sent = 0;
    }

    /// Body bytes still to be transferred.
    #[inline]
    pub fn remaining(&self) -> u64 {
        self.length - self.sent
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.phase == ResponsePhase::Done
    }

    /// Writes the status line and headers for `req` into `wb` and selects
    /// the body file.
    ///
    /// Error responses carry `error.html` from the document root when it
    /// exists and an empty body otherwise. `age` is how long the connection
    /// has been open; past the configured limit the response closes it.
    pub fn assemble<B: ByteBuffer>(
        &mut self,
        req: &mut Request,
        ctx: &Context,
        age: Duration,
        wb: &mut B,
    ) {
        let resource = match req.is_error() {
            true => ctx.root.error_page(),
            false => req.take_resource(),
        };
        let size = resource.as_ref().map_or(0, |r| r.size);

        if age > ctx.conn_limits.connection_time_limit {
            req.close_after_response();
        }
        let keep_alive = req.keep_alive();

        wb.push(req.version().response_line());
        wb.push(b" ");
        wb.push(req.status().code_reason());
        wb.push(b"\r\n");

        push_header(wb, b"Date", httpdate::fmt_http_date(SystemTime::now()).as_bytes());
        push_header(wb, b"Server", SERVER_NAME.as_bytes());
        push_header(wb, b"Content-Type", req.content_type().as_bytes());

        // A kept-alive connection needs the length even for an empty body,
        // or the client cannot find the end of the response.
        if size > 0 || keep_alive {
            push_header(wb, b"Content-Length", itoa::Buffer::new().format(size).as_bytes());
        }

        match keep_alive {
            true => {
                push_header(wb, b"Connection", b"keep-alive");

                let timeout = ctx.conn_limits.keep_alive_timeout.as_secs();
                wb.push(b"Keep-Alive: timeout=");
                wb.push(itoa::Buffer::new().format(timeout).as_bytes());
                wb.push(b", max=1\r\n");
            }
            false => push_header(wb, b"Connection", b"close"),
        }
        wb.push(b"\r\n");

        self.phase = ResponsePhase::SendHeaders;
        self.sent = 0;
        (self.body, self.length) = match (resource, req.method()) {
            (Some(resource), method) if method != Some(Method::Head) => {
                (Some(resource.file), resource.size)
            }
            _ => (None, 0),
        };
    }

    /// Flushes the staged header block, then the body file.
    pub async fn transmit<T, B>(&mut self, transport: &mut T, wb: &mut B) -> io::Result<()>
    where
        T: Transport,
        B: ByteBuffer,
    {
        if self.phase == ResponsePhase::SendHeaders {
            transport.write_all(wb.readable()).await?;
            let written = wb.readable().len();
            wb.release(written);
            self.phase = ResponsePhase::SendBody;
        }

        if let Some(file) = &self.body {
            while self.sent < self.length {
                let count = (self.length - self.sent).min(SENDFILE_CHUNK) as usize;

                match transport.send_file(file, self.sent, count).await? {
                    0 => {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "file shrank while being sent",
                        ))
                    }
                    n => self.sent += n as u64,
                }
            }
        }

        self.body = None;
        self.phase = ResponsePhase::Done;
        Ok(())
    }
}

#[inline]
fn push_header<B: ByteBuffer>(wb: &mut B, name: &[u8], value: &[u8]) {
    wb.push(name);
    wb.push(b": ");
    wb.push(value);
    wb.push(b"\r\n");
}
