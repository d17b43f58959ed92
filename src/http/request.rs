//! Request head parsing: zero-copy views over a pooled, reusable buffer.

use crate::{
    errors::Error,
    http::{
        body::BodyReader,
        headers::Headers,
        types::{self, MethodId},
    },
    limits::{MAX_HEAD, MAX_HEADER_COUNT, MAX_HEADERS_BLOCK, MAX_REQUEST_LINE, MAX_URI},
    pool::{Poolable, HEAD_CAPACITY},
};
use memchr::{memchr, memmem};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    time::{sleep_until, Instant},
};

/// `(start, len)` into the request head buffer.
type Span = (usize, usize);

/// Parsed request head plus body framing flags. Pooled; the byte views it
/// hands out are valid until it is released back to the pool.
#[derive(Debug)]
pub(crate) struct RequestState {
    pub(crate) head: Vec<u8>,
    pub(crate) method: MethodId,
    method_span: Span,
    uri_span: Span,
    path_span: Span,
    query_span: Option<Span>,
    proto_span: Span,
    pub(crate) headers: Headers,
    pub(crate) content_length: Option<u64>,
    pub(crate) chunked: bool,
    pub(crate) close: bool,
}

impl RequestState {
    #[inline(always)]
    fn slice(&self, span: Span) -> &[u8] {
        &self.head[span.0..span.0 + span.1]
    }
}

impl Poolable for RequestState {
    fn fresh() -> Self {
        Self {
            head: Vec::with_capacity(HEAD_CAPACITY),
            method: MethodId::Unknown,
            method_span: (0, 0),
            uri_span: (0, 0),
            path_span: (0, 0),
            query_span: None,
            proto_span: (0, 0),
            headers: Headers::new(),
            content_length: None,
            chunked: false,
            close: false,
        }
    }

    fn reset(&mut self) {
        self.head.clear();
        self.method = MethodId::Unknown;
        self.method_span = (0, 0);
        self.uri_span = (0, 0);
        self.path_span = (0, 0);
        self.query_span = None;
        self.proto_span = (0, 0);
        self.headers.reset();
        self.content_length = None;
        self.chunked = false;
        self.close = false;
    }
}

/// One parsed HTTP/1.1 request, handed to the handler.
///
/// All byte views point into a pooled buffer owned by the request for the
/// duration of the handler call; a handler that needs bytes past its return
/// must copy them. The request body is consumed through
/// [`body_mut`](Request::body_mut).
pub struct Request<'a, R> {
    state: &'a RequestState,
    body: BodyReader<'a, R>,
}

impl<'a, R> Request<'a, R> {
    pub(crate) fn new(state: &'a RequestState, body: BodyReader<'a, R>) -> Self {
        Self { state, body }
    }

    /// Identifier for the request method. [`MethodId::Unknown`] for custom
    /// verbs; see [`method_bytes`](Request::method_bytes) for the raw token.
    #[inline(always)]
    pub fn method(&self) -> MethodId {
        self.state.method
    }

    /// The method token exactly as it appeared on the wire.
    #[inline(always)]
    pub fn method_bytes(&self) -> &[u8] {
        self.state.slice(self.state.method_span)
    }

    /// The full request target: path plus raw query, exactly as sent.
    #[inline(always)]
    pub fn target(&self) -> &[u8] {
        self.state.slice(self.state.uri_span)
    }

    /// Request path. Begins with `/`, or is exactly `*`.
    #[inline(always)]
    pub fn path(&self) -> &[u8] {
        self.state.slice(self.state.path_span)
    }

    /// Raw query bytes after the first `?`; empty when no query was sent.
    #[inline(always)]
    pub fn query(&self) -> &[u8] {
        match self.state.query_span {
            Some(span) => self.state.slice(span),
            None => b"",
        }
    }

    /// Protocol bytes; always `HTTP/1.1` on a successfully parsed request.
    #[inline(always)]
    pub fn protocol(&self) -> &[u8] {
        self.state.slice(self.state.proto_span)
    }

    /// The request's header store.
    #[inline(always)]
    pub fn headers(&self) -> &Headers {
        &self.state.headers
    }

    /// First value of the named header, case-insensitive.
    #[inline(always)]
    pub fn header(&self, name: &[u8]) -> Option<&[u8]> {
        self.state.headers.get(name)
    }

    /// Declared `Content-Length`; `None` when absent or chunked.
    #[inline(always)]
    pub fn content_length(&self) -> Option<u64> {
        if self.state.chunked {
            None
        } else {
            self.state.content_length
        }
    }

    /// True when the body uses `Transfer-Encoding: chunked`.
    #[inline(always)]
    pub fn is_chunked(&self) -> bool {
        self.state.chunked
    }

    /// True when the request carried `Connection: close`.
    #[inline(always)]
    pub fn wants_close(&self) -> bool {
        self.state.close
    }

    /// The request body stream.
    #[inline(always)]
    pub fn body_mut(&mut self) -> &mut BodyReader<'a, R> {
        &mut self.body
    }

    pub(crate) fn into_body(self) -> BodyReader<'a, R> {
        self.body
    }

    /// Path as UTF-8, if valid.
    #[inline]
    pub fn path_str(&self) -> Option<&str> {
        simdutf8::basic::from_utf8(self.path()).ok()
    }

    /// Query as UTF-8, if valid.
    #[inline]
    pub fn query_str(&self) -> Option<&str> {
        simdutf8::basic::from_utf8(self.query()).ok()
    }

    /// Named header value as UTF-8, if present and valid.
    #[inline]
    pub fn header_str(&self, name: &[u8]) -> Option<&str> {
        simdutf8::basic::from_utf8(self.header(name)?).ok()
    }
}

//

/// Streaming request-head parser.
///
/// `buf` accumulates bytes until the `CRLF CRLF` terminator; `unread` holds
/// bytes read past the current request's end-of-headers, which belong to the
/// body or to the next pipelined request. Between requests `buf` is empty
/// (capacity retained) and `unread` is consumed by the next parse.
#[derive(Debug)]
pub(crate) struct Parser {
    buf: Vec<u8>,
    unread: Vec<u8>,
}

impl Poolable for Parser {
    fn fresh() -> Self {
        Self {
            buf: Vec::with_capacity(HEAD_CAPACITY),
            unread: Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.unread.clear();
    }
}

impl Parser {
    /// Reads and parses one request head into `req`.
    ///
    /// On success, `req` owns the head bytes and the parser's `unread` slice
    /// holds everything read past end-of-headers. On failure the caller must
    /// close the connection; the byte stream is no longer trusted for
    /// framing.
    pub(crate) async fn parse<R>(
        &mut self,
        io: &mut R,
        req: &mut RequestState,
        deadline: Instant,
        read_size: usize,
    ) -> Result<(), Error>
    where
        R: AsyncRead + Unpin,
    {
        // Pipelined bytes from the previous request come first.
        if !self.unread.is_empty() {
            debug_assert!(self.buf.is_empty());
            std::mem::swap(&mut self.buf, &mut self.unread);
            self.unread.clear();
        }

        let head_end = self.read_head(io, deadline, read_size).await?;

        self.unread.extend_from_slice(&self.buf[head_end..]);
        self.buf.truncate(head_end);

        let headers_start = self.parse_request_line(req)?;
        if head_end - headers_start > MAX_HEADERS_BLOCK {
            return Err(Error::HeadersTooLarge);
        }
        self.parse_headers(req, headers_start, head_end)?;

        // RFC 7230 §3.3.3: a message with both framings is a smuggling
        // vector and must be rejected outright.
        if req.content_length.is_some() && req.chunked {
            return Err(Error::ContentLengthWithTransferEncoding);
        }

        // Hand the head buffer to the request; take its empty one in trade.
        std::mem::swap(&mut self.buf, &mut req.head);
        self.buf.clear();

        tracing::trace!(
            method = req.method.as_str(),
            head = head_end,
            unread = self.unread.len(),
            "request head parsed"
        );

        Ok(())
    }

    #[inline]
    pub(crate) fn take_unread(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.unread)
    }

    #[inline]
    pub(crate) fn restore_unread(&mut self, unread: Vec<u8>) {
        debug_assert!(self.unread.is_empty());
        self.unread = unread;
    }

    /// Reads until `CRLF CRLF`, returning the offset just past it.
    async fn read_head<R>(
        &mut self,
        io: &mut R,
        deadline: Instant,
        read_size: usize,
    ) -> Result<usize, Error>
    where
        R: AsyncRead + Unpin,
    {
        let mut scanned = 0;

        loop {
            if let Some(at) = memmem::find(&self.buf[scanned..], b"\r\n\r\n") {
                let head_end = scanned + at + 4;
                if head_end > MAX_HEAD {
                    return Err(Error::HeadersTooLarge);
                }
                return Ok(head_end);
            }

            if self.buf.len() > MAX_HEAD {
                return Err(Error::HeadersTooLarge);
            }
            // The terminator may straddle a read boundary.
            scanned = self.buf.len().saturating_sub(3);

            self.buf.reserve(read_size);
            let n = tokio::select! {
                biased;

                read = io.read_buf(&mut self.buf) => read?,
                _ = sleep_until(deadline) => return Err(Error::Timeout),
            };

            if n == 0 {
                return match self.buf.is_empty() {
                    // Peer closed between requests: a clean end.
                    true => Err(Error::ConnectionClosed),
                    false => Err(Error::UnexpectedEof),
                };
            }
        }
    }

    /// `METHOD SP URI SP HTTP/1.1 CRLF`; returns the offset past the CRLF.
    fn parse_request_line(&self, req: &mut RequestState) -> Result<usize, Error> {
        let buf = &self.buf;
        // The head always ends in CRLF CRLF, so a CRLF exists.
        let line_end = memmem::find(buf, b"\r\n").unwrap_or(buf.len());
        if line_end > MAX_REQUEST_LINE {
            return Err(Error::RequestLineTooLarge);
        }
        let line = &buf[..line_end];

        let sp1 = memchr(b' ', line).ok_or(Error::InvalidRequestLine)?;
        let method = &line[..sp1];
        if !types::is_token(method) {
            return Err(Error::InvalidMethod);
        }

        let rest = &line[sp1 + 1..];
        let sp2 = memchr(b' ', rest).ok_or(Error::InvalidRequestLine)?;
        let uri = &rest[..sp2];
        let version = &rest[sp2 + 1..];

        if uri.len() > MAX_URI {
            return Err(Error::UriTooLong);
        }
        if uri.first() != Some(&b'/') && uri != b"*" {
            return Err(Error::InvalidPath);
        }
        if version != b"HTTP/1.1" {
            return Err(Error::InvalidProtocol);
        }

        let uri_start = sp1 + 1;
        req.method = MethodId::from_bytes(method);
        req.method_span = (0, sp1);
        req.uri_span = (uri_start, uri.len());
        match memchr(b'?', uri) {
            Some(q) => {
                req.path_span = (uri_start, q);
                req.query_span = Some((uri_start + q + 1, uri.len() - q - 1));
            }
            None => {
                req.path_span = (uri_start, uri.len());
                req.query_span = None;
            }
        }
        req.proto_span = (uri_start + sp2 + 1, version.len());

        Ok(line_end + 2)
    }

    /// Header lines from `pos` until the blank line before `head_end`.
    fn parse_headers(
        &self,
        req: &mut RequestState,
        mut pos: usize,
        head_end: usize,
    ) -> Result<(), Error> {
        let buf = &self.buf;
        let mut host_seen = false;

        while pos < head_end {
            let at = memmem::find(&buf[pos..head_end], b"\r\n").ok_or(Error::InvalidHeader)?;
            if at == 0 {
                // Blank line: end of headers.
                break;
            }
            let line = &buf[pos..pos + at];
            pos += at + 2;

            let colon = memchr(b':', line).ok_or(Error::InvalidHeader)?;
            if colon == 0 {
                return Err(Error::InvalidHeader);
            }
            // RFC 7230 §3.2.4: no whitespace between field name and colon.
            if matches!(line[colon - 1], b' ' | b'\t') {
                return Err(Error::InvalidHeader);
            }

            let name = &line[..colon];
            let value = trim_ows(&line[colon + 1..]);

            if req.headers.len() >= MAX_HEADER_COUNT {
                return Err(Error::TooManyHeaders);
            }
            req.headers.add(name, value)?;
            track_special(req, name, value, &mut host_seen)?;
        }

        Ok(())
    }
}

/// Framing-relevant headers are tracked while parsing.
#[inline]
fn track_special(
    req: &mut RequestState,
    name: &[u8],
    value: &[u8],
    host_seen: &mut bool,
) -> Result<(), Error> {
    if name.eq_ignore_ascii_case(b"content-length") {
        let len = types::parse_decimal(value).ok_or(Error::InvalidContentLength)?;
        match req.content_length {
            Some(prev) if prev != len => return Err(Error::DuplicateContentLength),
            Some(_) => {}
            None => req.content_length = Some(len),
        }
    } else if name.eq_ignore_ascii_case(b"transfer-encoding") {
        if value.eq_ignore_ascii_case(b"chunked") {
            req.chunked = true;
        }
    } else if name.eq_ignore_ascii_case(b"connection") {
        if value.eq_ignore_ascii_case(b"close") {
            req.close = true;
        }
    } else if name.eq_ignore_ascii_case(b"host") {
        // RFC 7230 §5.4: more than one Host is invalid.
        if *host_seen {
            return Err(Error::InvalidHeader);
        }
        *host_seen = true;
    }

    Ok(())
}

#[inline(always)]
fn trim_ows(mut value: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = value {
        value = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = value {
        value = rest;
    }
    value
}
