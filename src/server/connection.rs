//! Per-connection serve loop: request lifecycle, keep-alive, pipelining.

use crate::{
    errors::Error,
    http::{
        body::{BodyKind, BodyReader},
        chunked::ChunkedDecoder,
        request::Request,
        response::ResponseWriter,
        types,
    },
    limits::ConnLimits,
    pool::Pools,
    server::handler::Handler,
};
use futures_util::FutureExt;
use std::{
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::{
    io::{self, AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter, ReadHalf, WriteHalf},
    time::Instant,
};

/// Observable lifecycle of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnState {
    /// Constructed, serve loop not yet entered.
    New = 0,
    /// Parsing or handling a request.
    Active = 1,
    /// Waiting for the next request on a keep-alive connection.
    Idle = 2,
    /// Terminal.
    Closed = 3,
}

impl ConnState {
    #[inline]
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnState::New,
            1 => ConnState::Active,
            2 => ConnState::Idle,
            _ => ConnState::Closed,
        }
    }
}

struct Shared {
    state: AtomicU8,
    close: AtomicBool,
    requests: AtomicUsize,
}

/// Cloneable observer/controller for a running [`Connection`].
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    /// Current connection state.
    pub fn state(&self) -> ConnState {
        ConnState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Requests served so far.
    pub fn requests(&self) -> usize {
        self.shared.requests.load(Ordering::Relaxed)
    }

    /// Requests a graceful close: the serve loop exits after the current
    /// request completes. Idempotent.
    pub fn close(&self) {
        self.shared.close.store(true, Ordering::Release);
    }
}

/// One accepted byte stream, served to completion.
///
/// The connection owns the stream, a pooled parser, and the handler
/// reference; [`serve`](Connection::serve) runs the request loop until the
/// peer closes, keep-alive ends, or an error makes the stream untrustworthy.
/// Requests on one connection are processed strictly in arrival order and
/// responses go out in the same order; bytes read past a request's
/// end-of-headers are carried over to the next parse, so pipelined peers
/// never lose data.
pub struct Connection<S, H>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
    H: Handler<ReadHalf<S>, BufWriter<WriteHalf<S>>>,
{
    rd: ReadHalf<S>,
    wr: BufWriter<WriteHalf<S>>,
    handler: Arc<H>,
    limits: ConnLimits,
    pools: Arc<Pools>,
    shared: Arc<Shared>,
}

impl<S, H> Connection<S, H>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
    H: Handler<ReadHalf<S>, BufWriter<WriteHalf<S>>>,
{
    pub fn new(stream: S, handler: Arc<H>, limits: ConnLimits, pools: Arc<Pools>) -> Self {
        let (rd, wr) = io::split(stream);
        let wr = BufWriter::with_capacity(limits.write_buffer_size, wr);

        Self {
            rd,
            wr,
            handler,
            limits,
            pools,
            shared: Arc::new(Shared {
                state: AtomicU8::new(ConnState::New as u8),
                close: AtomicBool::new(false),
                requests: AtomicUsize::new(0),
            }),
        }
    }

    /// Handle for observing state and requesting a graceful close.
    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Serves requests until the connection ends.
    ///
    /// `Ok(())` covers every orderly termination: peer close, keep-alive
    /// exit, `Connection: close`, the max-requests limit, or a graceful
    /// [`ConnectionHandle::close`]. Anything else — framing errors, handler
    /// errors, timeouts — is returned after the stream is shut down.
    pub async fn serve(mut self) -> Result<(), Error> {
        tracing::debug!("connection opened");
        let result = self.run().await;

        self.shared
            .state
            .store(ConnState::Closed as u8, Ordering::Release);
        let _ = self.wr.shutdown().await;

        match &result {
            Ok(()) => tracing::debug!(requests = self.shared.requests.load(Ordering::Relaxed), "connection closed"),
            Err(error) => tracing::debug!(%error, "connection closed with error"),
        }
        result
    }

    async fn run(&mut self) -> Result<(), Error> {
        let mut parser = self.pools.parsers.acquire();

        loop {
            if self.shared.close.load(Ordering::Acquire) {
                return Ok(());
            }

            let deadline = Instant::now() + self.limits.idle_timeout;
            self.shared
                .state
                .store(ConnState::Active as u8, Ordering::Release);

            let mut req_state = self.pools.requests.acquire();
            match parser
                .parse(
                    &mut self.rd,
                    &mut req_state,
                    deadline,
                    self.limits.read_buffer_size,
                )
                .await
            {
                Ok(()) => {}
                // EOF between requests: the peer is done with us.
                Err(Error::ConnectionClosed) => return Ok(()),
                Err(error) => {
                    tracing::debug!(%error, "request error");
                    return Err(error);
                }
            }

            let served = self.shared.requests.fetch_add(1, Ordering::Relaxed) + 1;
            let max = self.limits.max_requests_per_connection;
            let last_allowed = max != 0 && served >= max;
            let peer_close = req_state.close;

            let kind = if req_state.chunked {
                BodyKind::Chunked(ChunkedDecoder::new(
                    self.limits.max_chunk_size,
                    self.limits.max_body_size,
                ))
            } else {
                match req_state.content_length {
                    Some(len) if len > 0 => BodyKind::Length { remaining: len },
                    _ => BodyKind::Empty,
                }
            };
            let prefix = parser.take_unread();

            let mut resp_state = self.pools.responses.acquire();
            let mut response = ResponseWriter::new(
                &mut resp_state,
                &mut self.wr,
                &self.pools.heads,
                self.limits.write_timeout,
            );
            // The peer asked to close, or this is the last allowed request:
            // say so before the handler emits the head.
            if peer_close || last_allowed {
                response.header_set(types::CONNECTION, b"close")?;
            }

            let body = BodyReader::new(kind, prefix, &mut self.rd, self.limits.read_buffer_size);
            let mut request = Request::new(&req_state, body);

            let handled = match AssertUnwindSafe(self.handler.handle(&mut request, &mut response))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(_) => Err(Error::handler("handler panicked")),
            };

            // A failed handler still gets its partial response flushed; a
            // successful one gets head emission forced if it never wrote.
            let flushed = match &handled {
                Ok(()) => response.flush().await,
                Err(_) => response.flush_partial().await,
            };

            let reusable = handled.is_ok()
                && flushed.is_ok()
                && !peer_close
                && !last_allowed
                && !response.close_marked()
                && response.keep_alive_safe();
            drop(response);

            if !reusable {
                handled?;
                flushed?;
                tracing::trace!(served, "connection not reusable after response");
                return Ok(());
            }

            // Drain what the handler left unread; the remainder belongs to
            // the next pipelined request.
            let leftover = {
                let mut scratch = self.pools.scratch.acquire();
                request
                    .into_body()
                    .finish(self.limits.max_drain_bytes, &mut scratch.0)
                    .await?
            };
            let Some(leftover) = leftover else {
                tracing::trace!(served, "unread body over drain limit");
                return Ok(());
            };

            // Release order: response writer first, then request.
            drop(resp_state);
            drop(req_state);

            parser.restore_unread(leftover);
            self.shared
                .state
                .store(ConnState::Idle as u8, Ordering::Release);
            tracing::trace!(served, "request complete");
        }
    }
}
