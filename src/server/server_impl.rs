use crate::{
    http::{request::Context, resource::DocumentRoot},
    limits::{ConnLimits, ReqLimits, RespLimits, ServerLimits, WaitStrategy},
    server::connection,
};
use crossbeam::queue::SegQueue;
use socket2::{Domain, Protocol, Socket, Type};
use std::{io, net::SocketAddr, sync::Arc, thread};
use tokio::{
    net::{TcpListener, TcpStream},
    runtime,
    task::{self, yield_now, LocalSet},
    time::sleep as tokio_sleep,
};

/// A static file server.
///
/// The accept loop runs on the caller's runtime and hands sockets to a
/// fixed set of worker threads through a shared queue; see
/// [`ServerLimits`] for the admission rules.
///
/// # Examples
///
/// ```no_run
/// use filament::{DocumentRoot, Server};
///
/// #[tokio::main]
/// async fn main() -> std::io::Result<()> {
///     Server::builder()
///         .bind("127.0.0.1:8080".parse().unwrap())
///         .root(DocumentRoot::open("./www")?)
///         .build()?
///         .launch()
///         .await
/// }
/// ```
#[derive(Debug)]
pub struct Server {
    listener: std::net::TcpListener,
    local_addr: SocketAddr,
    stream_queue: TcpQueue,
    server_limits: ServerLimits,
}

impl Server {
    /// Creates a new builder for configuring the server instance.
    #[inline]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Address the listener is bound to.
    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections forever.
    ///
    /// Returns only if the listener cannot be registered with the runtime.
    pub async fn launch(self) -> io::Result<()> {
        let listener = TcpListener::from_std(self.listener)?;
        tracing::info!(addr = %self.local_addr, "listening");

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(error = %err, "accept failed");
                    continue;
                }
            };

            if self.stream_queue.len() >= self.server_limits.max_pending_connections {
                tracing::warn!(%peer, "pending queue full, dropping connection");
                continue;
            }

            if let Err(err) = stream.set_nodelay(true) {
                tracing::debug!(%peer, error = %err, "TCP_NODELAY not set");
            }

            match stream.into_std() {
                Ok(stream) => self.stream_queue.push((stream, peer)),
                Err(err) => tracing::warn!(%peer, error = %err, "cannot hand off connection"),
            }
        }
    }

    #[inline]
    async fn get_stream(
        queue: &TcpQueue,
        wait: &WaitStrategy,
    ) -> (std::net::TcpStream, SocketAddr) {
        loop {
            if let Some(value) = queue.pop() {
                return value;
            }

            match wait {
                WaitStrategy::Yield => yield_now().await,
                WaitStrategy::Sleep(time) => tokio_sleep(*time).await,
            }
        }
    }
}

/// Builder for configuring and creating [`Server`] instances.
///
/// A document root and either an address or a listener are required.
#[derive(Debug, Default)]
pub struct ServerBuilder {
    addr: Option<SocketAddr>,
    listener: Option<std::net::TcpListener>,
    root: Option<DocumentRoot>,

    server_limits: Option<ServerLimits>,
    connection_limits: Option<ConnLimits>,
    request_limits: Option<ReqLimits>,
    response_limits: Option<RespLimits>,
}

impl ServerBuilder {
    /// Address to bind a new listener to.
    #[inline(always)]
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.addr = Some(addr);
        self
    }

    /// Uses an already bound listener instead of [`bind`](Self::bind).
    #[inline(always)]
    pub fn listener(mut self, listener: std::net::TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Directory files are served from.
    #[inline(always)]
    pub fn root(mut self, root: DocumentRoot) -> Self {
        self.root = Some(root);
        self
    }

    #[inline(always)]
    pub fn server_limits(mut self, limits: ServerLimits) -> Self {
        self.server_limits = Some(limits);
        self
    }

    #[inline(always)]
    pub fn connection_limits(mut self, limits: ConnLimits) -> Self {
        self.connection_limits = Some(limits);
        self
    }

    #[inline(always)]
    pub fn request_limits(mut self, limits: ReqLimits) -> Self {
        self.request_limits = Some(limits);
        self
    }

    #[inline(always)]
    pub fn response_limits(mut self, limits: RespLimits) -> Self {
        self.response_limits = Some(limits);
        self
    }

    /// Binds the listener and starts the worker threads.
    ///
    /// # Errors
    ///
    /// Fails when no root or no address was given, when binding fails, or
    /// when a worker thread cannot be started.
    pub fn build(self) -> io::Result<Server> {
        let root = self.root.ok_or_else(|| missing("The `root` method must be called to create"))?;
        let server_limits = self.server_limits.unwrap_or_default();

        let listener = match (self.listener, self.addr) {
            (Some(listener), _) => {
                listener.set_nonblocking(true)?;
                listener
            }
            (None, Some(addr)) => bind(addr, server_limits.backlog)?,
            (None, None) => {
                return Err(missing("The `bind` or `listener` method must be called to create"))
            }
        };
        let local_addr = listener.local_addr()?;

        let ctx = Arc::new(Context {
            conn_limits: self.connection_limits.unwrap_or_default(),
            req_limits: self.request_limits.unwrap_or_default(),
            resp_limits: self.response_limits.unwrap_or_default(),
            ..Context::new(root)
        });

        let stream_queue = Arc::new(SegQueue::new());
        let workers = server_limits.worker_count();

        for id in 0..workers {
            spawn_worker(id, &stream_queue, &ctx, &server_limits.wait_strategy)?;
        }
        tracing::info!(
            workers,
            root = %ctx.root.path().display(),
            "server ready"
        );

        Ok(Server {
            listener,
            local_addr,
            stream_queue,
            server_limits,
        })
    }
}

/// Starts a worker thread with its own single-threaded runtime. Every
/// connection it picks up runs as a local task on that thread.
fn spawn_worker(
    id: usize,
    queue: &TcpQueue,
    ctx: &Arc<Context>,
    wait: &WaitStrategy,
) -> io::Result<()> {
    let runtime = runtime::Builder::new_current_thread().enable_all().build()?;
    let queue = queue.clone();
    let ctx = ctx.clone();
    let wait = wait.clone();

    thread::Builder::new()
        .name(format!("filament-worker-{id}"))
        .spawn(move || {
            let local = LocalSet::new();

            local.block_on(&runtime, async move {
                loop {
                    let (stream, peer) = Server::get_stream(&queue, &wait).await;

                    match TcpStream::from_std(stream) {
                        Ok(stream) => {
                            task::spawn_local(connection::serve(ctx.clone(), stream, peer));
                        }
                        Err(err) => tracing::warn!(%peer, error = %err, "cannot register connection"),
                    }
                }
            });
        })?;

    Ok(())
}

fn bind(addr: SocketAddr, backlog: u32) -> io::Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(i32::try_from(backlog).unwrap_or(i32::MAX))?;

    Ok(socket.into())
}

#[inline]
fn missing(message: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message)
}

type TcpQueue = Arc<SegQueue<(std::net::TcpStream, SocketAddr)>>;
