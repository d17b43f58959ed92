//! filament - Zero-allocation HTTP/1.1 connection engine
//!
//! A byte-stream request parser, RFC-compliant response serializer, and
//! per-connection state machine for servers that care about their steady
//! state: after warm-up, serving a request performs no allocation. Strict
//! [RFC 7230](https://datatracker.ietf.org/doc/html/rfc7230) framing is the
//! other half of the contract — the parser exists to be the one that cannot
//! be desynchronized.
//!
//! # What it does
//!
//! - **Request parsing** with zero-copy views into a pooled, reusable
//!   buffer: method, path, raw query, headers, body framing.
//! - **Header store** with a fixed-capacity inline tier and heap overflow
//!   fallback; case-insensitive lookup, insertion order preserved.
//! - **Body streaming**: `Content-Length` bounded reads and a chunked
//!   transfer decoder with DoS limits. Handlers consume the body; the
//!   engine never buffers it.
//! - **Response writing** with pre-serialized status lines, exact-once head
//!   emission, and chunked output helpers.
//! - **Persistent connections**: keep-alive, pipelining (bytes read past a
//!   request's end-of-headers are carried to the next parse), idle
//!   deadlines, max-requests, graceful close.
//! - **Object pools** for parsers, requests, response writers, and buffers;
//!   reset-on-release, concurrency-safe.
//!
//! # What it leaves to the host
//!
//! The TCP accept loop, TLS, routing, authentication, metrics, and
//! configuration loading all live outside: the engine boundary is one
//! accepted stream in, one [`Handler`] invoked per request.
//!
//! # Protocol support
//!
//! HTTP/1.1 exclusively. Requests carrying any other version are rejected
//! with [`Error::InvalidProtocol`]; requests carrying both `Content-Length`
//! and `Transfer-Encoding` are rejected outright (request-smuggling
//! mitigation, RFC 7230 §3.3.3).
//!
//! # Usage
//!
//! ```no_run
//! use filament::{Connection, Error, Handler, Pools, Request, ResponseWriter};
//! use filament::limits::ConnLimits;
//! use std::sync::Arc;
//! use tokio::io::{AsyncRead, AsyncWrite};
//! use tokio::net::TcpListener;
//!
//! struct Hello;
//!
//! impl<R, W> Handler<R, W> for Hello
//! where
//!     R: AsyncRead + Unpin + Send,
//!     W: AsyncWrite + Unpin + Send,
//! {
//!     async fn handle(
//!         &self,
//!         request: &mut Request<'_, R>,
//!         response: &mut ResponseWriter<'_, W>,
//!     ) -> Result<(), Error> {
//!         response.write_text(200, b"Hello world!").await
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     let handler = Arc::new(Hello);
//!     let pools = Pools::new();
//!
//!     loop {
//!         let (stream, _) = listener.accept().await?;
//!         let conn = Connection::new(
//!             stream,
//!             Arc::clone(&handler),
//!             ConnLimits::default(),
//!             Arc::clone(&pools),
//!         );
//!         tokio::spawn(conn.serve());
//!     }
//! }
//! ```
pub(crate) mod http {
    pub(crate) mod body;
    pub(crate) mod chunked;
    pub(crate) mod headers;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod handler;
}
pub(crate) mod errors;
pub mod limits;
pub(crate) mod pool;

pub use crate::{
    errors::{Error, IoError},
    http::{
        body::BodyReader,
        chunked::ChunkedError,
        headers::Headers,
        request::Request,
        response::ResponseWriter,
        types::MethodId,
    },
    pool::Pools,
    server::{
        connection::{ConnState, Connection, ConnectionHandle},
        handler::Handler,
    },
};
