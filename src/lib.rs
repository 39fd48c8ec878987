//! filament - Incremental HTTP/1.x engine and zero-copy static file server
//!
//! A small server that answers `GET`-style requests with files from one
//! document root. Requests are parsed by resumable byte-level state
//! machines that never copy the request head: every parsed item is a
//! [`Span`] into the connection's read buffer.
//!
//! # Protocol Support
//!
//! - **HTTP/1.1**: persistent connections, pipelined requests, identity bodies
//! - **HTTP/1.0**: one request per connection unless `Connection: keep-alive` is sent
//! - Any `Transfer-Encoding` other than identity is refused with `501`
//!
//! # Request Lifecycle
//!
//! ```text
//! socket --> read buffer --> request line --> headers --> body --> response
//!                ^                                                    |
//!                \---------------- keep-alive ------------------------/
//! ```
//!
//! - The request line is parsed, then the path is resolved under the root
//! - Each header name is looked up in a frozen table and routed to its handler
//! - Body bytes are counted against `Content-Length` and discarded
//! - The response head is staged in the write buffer, the file follows with `sendfile`
//!
//! A missing file is answered with `404` only after the whole request has
//! been read, so the connection stays usable. Every other failure closes it.
//!
//! # Examples
//!
//! ```no_run
//! use filament::{limits::ServerLimits, DocumentRoot, Server};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     Server::builder()
//!         .bind("0.0.0.0:2019".parse().unwrap())
//!         .root(DocumentRoot::open("./www")?)
//!         .server_limits(ServerLimits {
//!             workers: 4,
//!             ..ServerLimits::default()
//!         })
//!         .build()?
//!         .launch()
//!         .await
//! }
//! ```
//!
//! The engine can also be driven without sockets:
//!
//! ```
//! use filament::{ByteBuffer, Progress, Request, StatusCode, StreamBuffer};
//! # fn main() -> std::io::Result<()> {
//! # let dir = tempfile::tempdir()?;
//! # std::fs::write(dir.path().join("index.html"), "hello")?;
//! let ctx = filament::Context::new(filament::DocumentRoot::open(dir.path())?);
//!
//! let mut rb = StreamBuffer::default();
//! let mut request = Request::new();
//!
//! rb.push(b"GET / HTTP/1.1\r\nHo");
//! assert_eq!(request.on_message(&mut rb, &ctx), Progress::Again);
//!
//! rb.push(b"st: example\r\n\r\n");
//! assert_eq!(request.on_message(&mut rb, &ctx), Progress::Respond);
//! assert_eq!(request.status(), StatusCode::Ok);
//! # Ok(())
//! # }
//! ```

pub(crate) mod http {
    pub(crate) mod headers;
    pub(crate) mod mime;
    pub(crate) mod parser;
    pub(crate) mod request;
    pub(crate) mod resource;
    pub(crate) mod response;
    pub(crate) mod table;
    pub(crate) mod types;
    pub(crate) mod view;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod server_impl;
}
pub mod buffer;
pub(crate) mod errors;
pub mod limits;

pub use crate::{
    buffer::{ByteBuffer, StreamBuffer},
    errors::ErrorKind,
    http::{
        headers::{Coding, HeaderEntry, HeaderField, HeaderFields, HeaderHandler},
        mime::DEFAULT_MIME,
        parser::{parse_url, Archive, Flow, Line, Url},
        request::{Context, Progress, Registry, Request},
        resource::{DocumentRoot, Resource},
        response::{Response, Transport, SERVER_NAME},
        table::{KeyedTable, TableBuilder},
        types::{Method, StatusCode, Version},
        view::Span,
    },
    server::server_impl::{Server, ServerBuilder},
};
