use crate::{
    buffer::StreamBuffer,
    http::{
        request::{Context, Progress, Request},
        response::{Response, Transport},
    },
};
use std::{fs::File, io, net::SocketAddr, sync::Arc, time::Instant};
use tokio::{
    io::AsyncWriteExt,
    net::TcpStream,
    time::{timeout, Duration},
};

/// Serves one accepted socket until it closes.
pub(crate) async fn serve(ctx: Arc<Context>, mut stream: TcpStream, peer: SocketAddr) {
    let mut conn = HttpConnection::on_connection(ctx, peer);
    let result = conn.run(&mut stream).await;
    conn.on_disconnected(result);
}

/// Per-socket state: the request and response being worked on and the
/// two byte buffers between them and the socket.
pub(crate) struct HttpConnection {
    ctx: Arc<Context>,
    connection: Connection,

    request: Request,
    response: Response,

    rb: StreamBuffer,
    wb: StreamBuffer,
}

impl HttpConnection {
    #[inline]
    pub(crate) fn on_connection(ctx: Arc<Context>, peer: SocketAddr) -> Self {
        tracing::debug!(%peer, "connection accepted");

        let rb = StreamBuffer::with_capacity(ctx.req_limits.read_chunk);
        let wb = StreamBuffer::with_capacity(ctx.resp_limits.default_capacity);

        Self {
            ctx,
            connection: Connection::new(peer),
            request: Request::new(),
            response: Response::new(),
            rb,
            wb,
        }
    }

    #[inline]
    fn reset_request_response(&mut self) {
        self.request.reset();
        self.response.reset();

        let limits = &self.ctx.resp_limits;
        self.wb.reset(limits.default_capacity, limits.max_capacity);
    }

    /// Reads, parses and answers requests until the client disconnects or a
    /// response closes the connection.
    pub(crate) async fn run(&mut self, stream: &mut TcpStream) -> io::Result<()> {
        let read_timeout = self.ctx.conn_limits.socket_read_timeout;
        let write_timeout = self.ctx.conn_limits.socket_write_timeout;
        let read_chunk = self.ctx.req_limits.read_chunk;

        loop {
            let progress = match self.rb.is_empty() {
                true => Progress::Again,
                false => self.request.on_message(&mut self.rb, &self.ctx),
            };

            if progress == Progress::Again {
                if timeout(read_timeout, self.rb.read_from(stream, read_chunk)).await?? == 0 {
                    return Ok(());
                }
                continue;
            }

            let age = self.connection.created.elapsed();
            self.response
                .assemble(&mut self.request, &self.ctx, age, &mut self.wb);

            let mut socket = Socket {
                stream: &mut *stream,
                timeout: write_timeout,
            };
            self.response.transmit(&mut socket, &mut self.wb).await?;
            self.connection.request_count += 1;

            if !self.request.complete() {
                self.linger(stream, read_timeout).await;
                return Ok(());
            }
            self.reset_request_response();
        }
    }

    /// Closes the write half and discards whatever the client still sends,
    /// so unread request bytes do not turn the close into a reset that
    /// destroys the response in flight.
    async fn linger(&mut self, stream: &mut TcpStream, limit: Duration) {
        if stream.shutdown().await.is_err() {
            return;
        }

        let read_chunk = self.ctx.req_limits.read_chunk;
        let drain = async {
            loop {
                self.rb.clear();
                match self.rb.read_from(stream, read_chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };

        if timeout(limit, drain).await.is_err() {
            tracing::debug!(peer = %self.connection.peer, "client kept sending after close");
        }
    }

    pub(crate) fn on_disconnected(&self, result: io::Result<()>) {
        let peer = self.connection.peer;
        let requests = self.connection.request_count;

        match result {
            Ok(()) => tracing::debug!(%peer, requests, "connection closed"),
            Err(err) if err.kind() == io::ErrorKind::TimedOut => {
                tracing::debug!(%peer, requests, "connection timed out")
            }
            Err(err) => tracing::error!(%peer, requests, error = %err, "connection failed"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Connection {
    created: Instant,
    peer: SocketAddr,
    request_count: usize,
}

impl Connection {
    #[inline(always)]
    pub(crate) fn new(peer: SocketAddr) -> Self {
        Self {
            created: Instant::now(),
            peer,
            request_count: 0,
        }
    }
}

/// A TCP stream as a [`Transport`], each step bounded by the write timeout.
pub(crate) struct Socket<'a> {
    stream: &'a mut TcpStream,
    timeout: Duration,
}

impl Transport for Socket<'_> {
    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        timeout(self.timeout, self.stream.write_all(bytes)).await?
    }

    async fn send_file(&mut self, file: &File, offset: u64, count: usize) -> io::Result<usize> {
        timeout(self.timeout, sendfile::send(self.stream, file, offset, count)).await?
    }
}

#[cfg(target_os = "linux")]
mod sendfile {
    use std::{
        fs::File,
        io,
        os::unix::io::AsRawFd,
    };
    use tokio::{io::Interest, net::TcpStream};

    pub(super) async fn send(
        stream: &mut TcpStream,
        file: &File,
        offset: u64,
        count: usize,
    ) -> io::Result<usize> {
        let mut offset = libc::off_t::try_from(offset)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        let (out_fd, in_fd) = (stream.as_raw_fd(), file.as_raw_fd());

        loop {
            stream.writable().await?;

            let result = stream.try_io(Interest::WRITABLE, || {
                // SAFETY: both descriptors stay open for the duration of the
                // call and `offset` is a valid, exclusively borrowed `off_t`.
                let sent = unsafe { libc::sendfile(out_fd, in_fd, &mut offset, count) };
                match sent < 0 {
                    true => Err(io::Error::last_os_error()),
                    false => Ok(sent as usize),
                }
            });

            match result {
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
                result => return result,
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod sendfile {
    use std::{fs::File, io, os::unix::fs::FileExt};
    use tokio::{io::AsyncWriteExt, net::TcpStream};

    const COPY_CHUNK: usize = 64 * 1024;

    pub(super) async fn send(
        stream: &mut TcpStream,
        file: &File,
        offset: u64,
        count: usize,
    ) -> io::Result<usize> {
        let mut chunk = vec![0; count.min(COPY_CHUNK)];
        let n = file.read_at(&mut chunk, offset)?;
        stream.write_all(&chunk[..n]).await?;
        Ok(n)
    }
}
