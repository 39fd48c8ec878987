//! Server configuration limits and timeouts
//!
//! # Memory Consumption
//!
//! Each active connection holds:
//!
//! `Total` = [`Read buffer`](crate::limits::ReqLimits::head_size) +
//!           [`Write buffer`](crate::limits::RespLimits#buffer-management) +
//!           `Runtime Overhead`
//!
//! File bodies are never staged in either buffer: they go from the page
//! cache to the socket with `sendfile`.
//!
//! # Examples
//!
//! ```no_run
//! use filament::{limits::{ConnLimits, ReqLimits, ServerLimits}, DocumentRoot, Server};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     Server::builder()
//!         .bind("127.0.0.1:8080".parse().unwrap())
//!         .root(DocumentRoot::open("./www")?)
//!         .server_limits(ServerLimits {
//!             workers: 4,
//!             ..ServerLimits::default()
//!         })
//!         .connection_limits(ConnLimits {
//!             connection_time_limit: Duration::from_secs(120),
//!             ..ConnLimits::default()
//!         })
//!         .request_limits(ReqLimits {
//!             head_size: 16 * 1024,
//!             ..ReqLimits::default()
//!         })
//!         .build()?
//!         .launch()
//!         .await
//! }
//! ```

use std::time::Duration;

/// Controls worker threads, connection admission and listener behavior.
///
/// # Connection management
/// ```text
///                            [------------]
///                            [ Tcp accept ]
///                            [------------]
///                                  ||
///                                  || TCP_STREAM
///                                  \/
/// [--------------]   Yes   /----------------\   No   [-------------]
/// [ Add to queue ] <====== | Queue has room | =====> [ Drop socket ]
/// [--------------]         \----------------/        [-------------]
///        ||
///        \/
/// [-------------------------]
/// [ Worker thread picks up  ]
/// [ and owns the connection ]
/// [-------------------------]
/// ```
///
/// # Workers
/// A worker is an OS thread running its own single-threaded Tokio runtime.
/// It pops sockets from the shared queue and drives each one on a local
/// task until it closes. A connection never moves to another worker, so
/// per-connection state needs no synchronisation.
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Number of worker threads (default: `0`).
    ///
    /// `0` uses [`std::thread::available_parallelism`].
    pub workers: usize,

    /// Maximum number of accepted sockets waiting for a worker (default: `1024`).
    ///
    /// Sockets accepted while the queue is full are closed immediately.
    pub max_pending_connections: usize,

    /// Listen backlog passed to `listen(2)` (default: `1024`).
    pub backlog: u32,

    /// How idle workers poll the queue (default: `Sleep(50μs)`).
    pub wait_strategy: WaitStrategy,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            workers: 0,
            max_pending_connections: 1024,
            backlog: 1024,
            wait_strategy: WaitStrategy::Sleep(Duration::from_micros(50)),

            _priv: (),
        }
    }
}

impl ServerLimits {
    /// Worker count with `0` resolved to the available parallelism.
    pub fn worker_count(&self) -> usize {
        match self.workers {
            0 => std::thread::available_parallelism().map_or(1, |n| n.get()),
            n => n,
        }
    }
}

/// Strategy for worker waiting when no connections are queued
#[derive(Debug, Clone)]
pub enum WaitStrategy {
    /// While waiting, uses [`tokio::task::yield_now()`]
    ///
    /// # Note
    /// Keeps every worker thread busy; only useful for latency benchmarks.
    Yield,

    /// While waiting, uses [`tokio::time::sleep()`]
    ///
    /// ```
    /// # #[tokio::main]
    /// # async fn main() {
    /// # let mut queue = vec![1, 2, 3];
    /// # let time = std::time::Duration::from_micros(50);
    /// let value = loop {
    ///     if let Some(value) = queue.pop() {
    ///         break value;
    ///     }
    ///
    ///     tokio::time::sleep(time).await;
    /// };
    /// # }
    /// ```
    Sleep(Duration),
}

/// Connection-level limits and timeouts
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// Maximum time to wait for the next bytes from the client (default: `30 seconds`)
    ///
    /// Applies between requests as well as inside one, so a stalled client
    /// is evicted after this long.
    pub socket_read_timeout: Duration,

    /// Maximum duration of a single write or file transfer step (default: `30 seconds`)
    pub socket_write_timeout: Duration,

    /// Connection age after which responses carry `Connection: close` (default: `60 seconds`)
    ///
    /// The request in flight is still answered; the client is told not to
    /// reuse the connection.
    pub connection_time_limit: Duration,

    /// Value advertised in `Keep-Alive: timeout=N, max=1` (default: `30 seconds`)
    pub keep_alive_timeout: Duration,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ConnLimits {
    #[inline(always)]
    fn default() -> Self {
        Self {
            socket_read_timeout: Duration::from_secs(30),
            socket_write_timeout: Duration::from_secs(30),
            connection_time_limit: Duration::from_secs(60),
            keep_alive_timeout: Duration::from_secs(30),

            _priv: (),
        }
    }
}

/// HTTP request parsing limits
///
/// 🔧 **You MAY need to increase these if you see:**
/// - `413 Payload Too Large` for legitimate uploads
/// - `431 Request Header Fields Too Large`
#[derive(Debug, Clone)]
pub struct ReqLimits {
    /// Maximum size of request line and headers together (default: `8 KB`)
    ///
    /// The whole head stays in the read buffer until its last header has
    /// been dispatched, so this also bounds the read buffer.
    pub head_size: usize,

    /// Largest accepted `Content-Length` (default: `8 MB`)
    ///
    /// Bodies are counted and discarded, never buffered whole.
    pub body_size: usize,

    /// Bytes requested from the socket per read (default: `4 KB`)
    pub read_chunk: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            head_size: 8 * 1024,
            body_size: 8 * 1024 * 1024,
            read_chunk: 4 * 1024,

            _priv: (),
        }
    }
}

/// Write buffer sizing.
///
/// # Buffer Management
///
/// The header block of every response is assembled in one buffer per
/// connection. Between requests the buffer is handled as follows:
/// ```rust
/// # use filament::limits::RespLimits;
/// # let limits = RespLimits::default();
/// # let mut buffer: Vec<u8> = Vec::with_capacity(limits.default_capacity);
/// #
/// if buffer.capacity() > limits.max_capacity {
///     buffer = Vec::with_capacity(limits.default_capacity);
/// } else {
///     buffer.clear();
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RespLimits {
    /// Initial write buffer capacity (default: `512 B`)
    pub default_capacity: usize,
    /// Capacity above which the buffer is reallocated (default: `4096 B`)
    pub max_capacity: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for RespLimits {
    fn default() -> Self {
        Self {
            default_capacity: 512,
            max_capacity: 4 * 1024,

            _priv: (),
        }
    }
}
