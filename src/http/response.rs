//! Response serialization: status line, headers, body, chunked writes.

use crate::{
    errors::Error,
    http::{headers::Headers, types},
    pool::{HeadBuf, Pool, Poolable},
};
use std::time::Duration;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    time::sleep,
};

const HEX: &[u8; 16] = b"0123456789abcdef";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Default,
    Chunked,
}

/// Pooled per-response state behind [`ResponseWriter`].
#[derive(Debug)]
pub(crate) struct ResponseState {
    status: u16,
    headers: Headers,
    emitted: bool,
    chunk_finished: bool,
    bytes_written: u64,
    mode: Mode,
}

impl Poolable for ResponseState {
    fn fresh() -> Self {
        Self {
            status: 200,
            headers: Headers::new(),
            emitted: false,
            chunk_finished: false,
            bytes_written: 0,
            mode: Mode::Default,
        }
    }

    fn reset(&mut self) {
        self.status = 200;
        self.headers.reset();
        self.emitted = false;
        self.chunk_finished = false;
        self.bytes_written = 0;
        self.mode = Mode::Default;
    }
}

/// Writer for one HTTP/1.1 response.
///
/// Headers and the status code may be changed freely until the first body
/// byte (or first chunk) is emitted; from then on the head is frozen and
/// further `header_*`/[`write_status`](ResponseWriter::write_status) calls
/// are ignored without faulting.
///
/// Status lines for the registered codes are pre-serialized; formatting
/// happens only for uncommon codes.
pub struct ResponseWriter<'a, W> {
    state: &'a mut ResponseState,
    sink: &'a mut W,
    heads: Pool<HeadBuf>,
    write_timeout: Option<Duration>,
}

impl<'a, W> ResponseWriter<'a, W>
where
    W: AsyncWrite + Unpin,
{
    pub(crate) fn new(
        state: &'a mut ResponseState,
        sink: &'a mut W,
        heads: &Pool<HeadBuf>,
        write_timeout: Option<Duration>,
    ) -> Self {
        Self {
            state,
            sink,
            heads: heads.clone(),
            write_timeout,
        }
    }

    /// Sets the pending status code. Defaults to 200; later calls overwrite
    /// earlier ones until the head is emitted, after which the call is
    /// ignored.
    pub fn write_status(&mut self, code: u16) -> Result<(), Error> {
        if self.state.emitted {
            return Ok(());
        }
        if !(100..=999).contains(&code) {
            return Err(Error::InvalidStatusCode);
        }
        self.state.status = code;
        Ok(())
    }

    /// Sets a header, replacing previous values. Ignored once the head has
    /// been emitted.
    pub fn header_set(&mut self, name: &[u8], value: &[u8]) -> Result<(), Error> {
        if self.state.emitted {
            return Ok(());
        }
        self.state.headers.set(name, value)
    }

    /// First value of a pending header.
    pub fn header_get(&self, name: &[u8]) -> Option<&[u8]> {
        self.state.headers.get(name)
    }

    /// Removes a pending header. Ignored once the head has been emitted.
    pub fn header_del(&mut self, name: &[u8]) {
        if !self.state.emitted {
            self.state.headers.del(name);
        }
    }

    /// Sets a multi-valued header, joining the values with `sep`.
    ///
    /// ```text
    /// header_multi(b"Accept", b"; ", [b"text/html", b"text/plain"])
    ///     => Accept: text/html; text/plain
    /// ```
    pub fn header_multi<'v, I>(&mut self, name: &[u8], sep: &[u8], values: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = &'v [u8]>,
    {
        if self.state.emitted {
            return Ok(());
        }

        let mut joined = Vec::new();
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                joined.extend_from_slice(sep);
            }
            joined.extend_from_slice(value);
        }
        self.state.headers.set(name, &joined)
    }

    /// Sets a parameterized header; parameters without a value are emitted
    /// bare.
    ///
    /// ```text
    /// header_params(b"Cache-Control", b", ", [(b"max-age", Some(b"3600")), (b"must-revalidate", None)])
    ///     => Cache-Control: max-age=3600, must-revalidate
    /// ```
    pub fn header_params<'v, I>(&mut self, name: &[u8], sep: &[u8], params: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (&'v [u8], Option<&'v [u8]>)>,
    {
        if self.state.emitted {
            return Ok(());
        }

        let mut joined = Vec::new();
        for (i, (key, value)) in params.into_iter().enumerate() {
            if i > 0 {
                joined.extend_from_slice(sep);
            }
            joined.extend_from_slice(key);
            if let Some(value) = value {
                joined.push(b'=');
                joined.extend_from_slice(value);
            }
        }
        self.state.headers.set(name, &joined)
    }

    /// Body bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.state.bytes_written
    }

    /// Writes body bytes, emitting the status line and headers first if
    /// they have not been sent yet.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if self.state.mode == Mode::Chunked {
            return Err(Error::HeadersAlreadyWritten);
        }

        self.emit_head().await?;
        self.sink.write_all(bytes).await?;
        self.state.bytes_written += bytes.len() as u64;
        Ok(())
    }

    /// Flushes the sink. An un-emitted response goes out as an empty body
    /// with the pending status and headers (plus `Content-Length: 0` when
    /// no framing header was set, so keep-alive stays possible).
    pub async fn flush(&mut self) -> Result<(), Error> {
        if !self.state.emitted {
            if self.state.mode == Mode::Default && !self.state.headers.has(types::CONTENT_LENGTH) {
                self.state.headers.set(types::CONTENT_LENGTH, b"0")?;
            }
            self.emit_head().await?;
        }
        self.flush_sink().await
    }

    /// Flushes whatever has been written, without forcing head emission.
    /// Used on handler-error paths: a partial response is flushed, an
    /// unstarted one is not fabricated.
    pub(crate) async fn flush_partial(&mut self) -> Result<(), Error> {
        self.flush_sink().await
    }

    /// Sets `Content-Type` and `Content-Length`, then writes the body.
    pub async fn write_text(&mut self, code: u16, body: &[u8]) -> Result<(), Error> {
        self.write_with_type(code, types::MIME_TEXT, body).await
    }

    /// As [`write_text`](ResponseWriter::write_text) with `text/html`.
    pub async fn write_html(&mut self, code: u16, body: &[u8]) -> Result<(), Error> {
        self.write_with_type(code, types::MIME_HTML, body).await
    }

    /// As [`write_text`](ResponseWriter::write_text) with `application/json`.
    pub async fn write_json(&mut self, code: u16, body: &[u8]) -> Result<(), Error> {
        self.write_with_type(code, types::MIME_JSON, body).await
    }

    /// Plain-text error response with the given status code.
    pub async fn write_error(&mut self, code: u16, msg: &[u8]) -> Result<(), Error> {
        self.write_text(code, msg).await
    }

    async fn write_with_type(
        &mut self,
        code: u16,
        content_type: &[u8],
        body: &[u8],
    ) -> Result<(), Error> {
        self.write_status(code)?;
        self.header_set(types::CONTENT_TYPE, content_type)?;
        let mut fmt = itoa::Buffer::new();
        self.header_set(types::CONTENT_LENGTH, fmt.format(body.len()).as_bytes())?;
        self.write(body).await
    }

    /// Emits one chunk. The first call switches the response to chunked
    /// mode, sets `Transfer-Encoding: chunked`, and emits the head. Empty
    /// input writes nothing: a zero-sized chunk is the body terminator and
    /// only [`finish_chunked`](ResponseWriter::finish_chunked) may emit it.
    pub async fn write_chunk(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.enter_chunked().await?;

        if bytes.is_empty() {
            return Ok(());
        }

        let mut size = [0u8; 18];
        let n = encode_chunk_size(bytes.len(), &mut size);
        self.sink.write_all(&size[..n]).await?;
        self.sink.write_all(bytes).await?;
        self.sink.write_all(b"\r\n").await?;
        self.state.bytes_written += bytes.len() as u64;
        Ok(())
    }

    /// Emits the terminating zero-sized chunk and final CRLF.
    pub async fn finish_chunked(&mut self) -> Result<(), Error> {
        self.enter_chunked().await?;

        if !self.state.chunk_finished {
            self.sink.write_all(b"0\r\n\r\n").await?;
            self.state.chunk_finished = true;
        }
        Ok(())
    }

    async fn enter_chunked(&mut self) -> Result<(), Error> {
        if self.state.mode == Mode::Default {
            if self.state.emitted {
                return Err(Error::HeadersAlreadyWritten);
            }
            self.state.mode = Mode::Chunked;
            self.state
                .headers
                .set(types::TRANSFER_ENCODING, b"chunked")?;
        }
        if self.state.chunk_finished {
            return Err(Error::HeadersAlreadyWritten);
        }
        self.emit_head().await
    }

    /// Status line + headers + blank line, exactly once per response.
    async fn emit_head(&mut self) -> Result<(), Error> {
        if self.state.emitted {
            return Ok(());
        }

        let mut head = self.heads.acquire();

        match types::status_line(self.state.status) {
            Some(line) => head.0.extend_from_slice(line),
            None => {
                // The only formatting path, reserved for uncommon codes.
                head.0.extend_from_slice(b"HTTP/1.1 ");
                let mut fmt = itoa::Buffer::new();
                head.0.extend_from_slice(fmt.format(self.state.status).as_bytes());
                head.0.push(b' ');
                head.0
                    .extend_from_slice(types::reason_phrase(self.state.status).as_bytes());
                head.0.extend_from_slice(b"\r\n");
            }
        }

        for (name, value) in self.state.headers.entries() {
            head.0.extend_from_slice(name);
            head.0.extend_from_slice(b": ");
            head.0.extend_from_slice(value);
            head.0.extend_from_slice(b"\r\n");
        }
        head.0.extend_from_slice(b"\r\n");

        self.sink.write_all(&head.0).await?;
        self.state.emitted = true;

        tracing::trace!(status = self.state.status, "response head emitted");
        Ok(())
    }

    async fn flush_sink(&mut self) -> Result<(), Error> {
        match self.write_timeout {
            Some(timeout) => {
                tokio::select! {
                    biased;

                    result = self.sink.flush() => result?,
                    _ = sleep(timeout) => return Err(Error::Timeout),
                }
            }
            None => self.sink.flush().await?,
        }
        Ok(())
    }

    /// True once the response head has gone out with usable body framing
    /// (a `Content-Length`, or a finished chunked body). Without framing
    /// the peer cannot delimit the body and the connection must close.
    pub(crate) fn keep_alive_safe(&self) -> bool {
        match self.state.mode {
            Mode::Default => self.state.headers.has(types::CONTENT_LENGTH),
            Mode::Chunked => self.state.chunk_finished,
        }
    }

    /// True when the response carries `Connection: close`.
    pub(crate) fn close_marked(&self) -> bool {
        self.state
            .headers
            .get(types::CONNECTION)
            .is_some_and(|v| v.eq_ignore_ascii_case(b"close"))
    }
}

/// Lowercase hex chunk-size line, `SIZE CRLF`. Returns bytes written.
fn encode_chunk_size(len: usize, out: &mut [u8; 18]) -> usize {
    let mut digits = [0u8; 16];
    let mut n = len;
    let mut count = 0;

    loop {
        digits[count] = HEX[n & 0xf];
        n >>= 4;
        count += 1;
        if n == 0 {
            break;
        }
    }

    let mut w = 0;
    for d in (0..count).rev() {
        out[w] = digits[d];
        w += 1;
    }
    out[w] = b'\r';
    out[w + 1] = b'\n';
    w + 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Pools;
    use std::io::Cursor;

    fn state() -> ResponseState {
        ResponseState::fresh()
    }

    macro_rules! render {
        (|$resp:ident| $body:block) => {{
            let pools = Pools::new();
            let mut st = state();
            let mut sink = Cursor::new(Vec::new());
            {
                let mut $resp = ResponseWriter::new(&mut st, &mut sink, &pools.heads, None);
                $body
                $resp.flush().await.unwrap();
            }
            sink.into_inner()
        }};
    }

    #[tokio::test]
    async fn json_body() {
        let out = render!(|resp| {
            resp.write_json(200, br#"{"ok":true}"#).await.unwrap();
        });

        assert_eq!(
            out,
            b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 11\r\n\r\n{\"ok\":true}"
        );
    }

    #[tokio::test]
    async fn empty_body_gets_content_length_zero() {
        let out = render!(|resp| {
            resp.write_status(201).unwrap();
        });

        assert_eq!(out, b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n");
    }

    #[tokio::test]
    async fn text_and_html_bodies() {
        let out = render!(|resp| {
            resp.write_text(404, b"missing").await.unwrap();
        });
        assert_eq!(
            out,
            b"HTTP/1.1 404 Not Found\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: 7\r\n\r\nmissing"
        );

        let out = render!(|resp| {
            resp.write_html(200, b"<p>hi</p>").await.unwrap();
        });
        assert_eq!(
            out,
            b"HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: 9\r\n\r\n<p>hi</p>"
        );
    }

    #[tokio::test]
    async fn headers_in_insertion_order() {
        let out = render!(|resp| {
            resp.header_set(b"X-First", b"1").unwrap();
            resp.header_set(b"X-Second", b"2").unwrap();
            resp.write_text(200, b"ok").await.unwrap();
        });

        assert_eq!(
            out,
            b"HTTP/1.1 200 OK\r\nX-First: 1\r\nX-Second: 2\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: 2\r\n\r\nok"
        );
    }

    #[tokio::test]
    async fn header_ops_frozen_after_emission() {
        let out = render!(|resp| {
            resp.write_text(200, b"ok").await.unwrap();

            // All ignored, none may fault.
            resp.write_status(500).unwrap();
            resp.header_set(b"X-Late", b"nope").unwrap();
            resp.header_del(b"Content-Type");
            resp.write(b"!").await.unwrap();
        });

        assert_eq!(
            out,
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: 2\r\n\r\nok!"
        );
    }

    #[tokio::test]
    async fn status_overwrites_before_emission() {
        let out = render!(|resp| {
            resp.write_status(404).unwrap();
            resp.write_status(302).unwrap();
            resp.header_set(b"Location", b"/new").unwrap();
            resp.header_set(b"Content-Length", b"0").unwrap();
            resp.write(b"").await.unwrap();
        });

        assert_eq!(
            out,
            b"HTTP/1.1 302 Found\r\nLocation: /new\r\nContent-Length: 0\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn multi_and_parameterized_headers() {
        let out = render!(|resp| {
            resp.header_multi(b"Accept", b"; ", [b"text/html" as &[u8], b"text/plain"])
                .unwrap();
            resp.header_multi(b"X-One", b", ", [b"solo" as &[u8]]).unwrap();
            resp.header_params(
                b"Cache-Control",
                b", ",
                [
                    (b"max-age" as &[u8], Some(b"3600" as &[u8])),
                    (b"must-revalidate", None),
                ],
            )
            .unwrap();
            resp.write_text(200, b"ok").await.unwrap();
        });

        assert_eq!(
            out,
            b"HTTP/1.1 200 OK\r\nAccept: text/html; text/plain\r\nX-One: solo\r\nCache-Control: max-age=3600, must-revalidate\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: 2\r\n\r\nok"
        );
    }

    #[tokio::test]
    async fn uncommon_status_is_formatted() {
        let out = render!(|resp| {
            resp.write_status(299).unwrap();
            resp.header_set(b"Content-Length", b"0").unwrap();
            resp.write(b"").await.unwrap();
        });

        assert_eq!(out, b"HTTP/1.1 299 Unknown\r\nContent-Length: 0\r\n\r\n");
    }

    #[tokio::test]
    async fn invalid_status_codes() {
        let pools = Pools::new();
        let mut st = state();
        let mut sink = Cursor::new(Vec::new());
        let mut resp = ResponseWriter::new(&mut st, &mut sink, &pools.heads, None);

        assert_eq!(resp.write_status(99), Err(Error::InvalidStatusCode));
        assert_eq!(resp.write_status(1000), Err(Error::InvalidStatusCode));
        assert_eq!(resp.write_status(100), Ok(()));
    }

    #[tokio::test]
    async fn chunked_writes() {
        let out = render!(|resp| {
            resp.write_chunk(b"hello").await.unwrap();
            resp.write_chunk(b" world").await.unwrap();
            resp.write_chunk(b"").await.unwrap();
            resp.finish_chunked().await.unwrap();
        });

        assert_eq!(
            out,
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn chunked_round_trip() {
        use crate::http::chunked::ChunkedDecoder;

        let out = render!(|resp| {
            for part in [b"alpha" as &[u8], b"beta", b"a-much-longer-chunk-payload"] {
                resp.write_chunk(part).await.unwrap();
            }
            resp.finish_chunked().await.unwrap();
        });

        let body_start = memchr::memmem::find(&out, b"\r\n\r\n").unwrap() + 4;
        let mut decoder = ChunkedDecoder::new(u64::MAX, None);
        let mut buf = out[body_start..].to_vec();
        let mut pos = 0;
        let mut io = tokio::io::empty();
        let mut decoded = Vec::new();
        let mut dst = [0u8; 16];

        loop {
            let n = decoder
                .read(&mut buf, &mut pos, &mut io, &mut dst, 4096)
                .await
                .unwrap();
            if n == 0 {
                break;
            }
            decoded.extend_from_slice(&dst[..n]);
        }

        assert_eq!(decoded, b"alphabetaa-much-longer-chunk-payload");
    }

    #[tokio::test]
    async fn mode_conflicts() {
        let pools = Pools::new();

        let mut st = state();
        let mut sink = Cursor::new(Vec::new());
        let mut resp = ResponseWriter::new(&mut st, &mut sink, &pools.heads, None);
        resp.write(b"plain").await.unwrap();
        assert_eq!(
            resp.write_chunk(b"late").await,
            Err(Error::HeadersAlreadyWritten)
        );

        let mut st = state();
        let mut sink = Cursor::new(Vec::new());
        let mut resp = ResponseWriter::new(&mut st, &mut sink, &pools.heads, None);
        resp.write_chunk(b"chunked").await.unwrap();
        assert_eq!(resp.write(b"late").await, Err(Error::HeadersAlreadyWritten));

        let mut st = state();
        let mut sink = Cursor::new(Vec::new());
        let mut resp = ResponseWriter::new(&mut st, &mut sink, &pools.heads, None);
        resp.write_chunk(b"body").await.unwrap();
        resp.finish_chunked().await.unwrap();
        assert_eq!(
            resp.write_chunk(b"late").await,
            Err(Error::HeadersAlreadyWritten)
        );
    }

    #[tokio::test]
    async fn keep_alive_safety() {
        let pools = Pools::new();

        let mut st = state();
        let mut sink = Cursor::new(Vec::new());
        let mut resp = ResponseWriter::new(&mut st, &mut sink, &pools.heads, None);
        resp.write_text(200, b"ok").await.unwrap();
        assert!(resp.keep_alive_safe());
        assert!(!resp.close_marked());

        // A raw write with no Content-Length leaves the peer without framing.
        let mut st = state();
        let mut sink = Cursor::new(Vec::new());
        let mut resp = ResponseWriter::new(&mut st, &mut sink, &pools.heads, None);
        resp.write(b"raw").await.unwrap();
        assert!(!resp.keep_alive_safe());

        // Unfinished chunked responses are not reusable either.
        let mut st = state();
        let mut sink = Cursor::new(Vec::new());
        let mut resp = ResponseWriter::new(&mut st, &mut sink, &pools.heads, None);
        resp.write_chunk(b"part").await.unwrap();
        assert!(!resp.keep_alive_safe());
        resp.finish_chunked().await.unwrap();
        assert!(resp.keep_alive_safe());

        let mut st = state();
        let mut sink = Cursor::new(Vec::new());
        let mut resp = ResponseWriter::new(&mut st, &mut sink, &pools.heads, None);
        resp.header_set(b"Connection", b"close").unwrap();
        resp.write_text(200, b"bye").await.unwrap();
        assert!(resp.close_marked());
    }

    #[tokio::test]
    async fn bytes_written_counts_body_only() {
        let pools = Pools::new();
        let mut st = state();
        let mut sink = Cursor::new(Vec::new());
        let mut resp = ResponseWriter::new(&mut st, &mut sink, &pools.heads, None);

        resp.write_text(200, b"12345").await.unwrap();
        assert_eq!(resp.bytes_written(), 5);
    }

    #[test]
    fn chunk_size_encoding() {
        #[rustfmt::skip]
        let cases = [
            (1,        "1\r\n"),
            (10,       "a\r\n"),
            (15,       "f\r\n"),
            (16,       "10\r\n"),
            (255,      "ff\r\n"),
            (4096,     "1000\r\n"),
            (65535,    "ffff\r\n"),
        ];

        for (len, expected) in cases {
            let mut out = [0u8; 18];
            let n = encode_chunk_size(len, &mut out);
            assert_eq!(&out[..n], expected.as_bytes());
        }
    }

    #[test]
    fn reset_contract() {
        let mut st = state();
        st.status = 500;
        st.headers.set(b"X", b"y").unwrap();
        st.emitted = true;
        st.chunk_finished = true;
        st.bytes_written = 9;
        st.mode = Mode::Chunked;

        st.reset();

        assert_eq!(st.status, 200);
        assert_eq!(st.headers.len(), 0);
        assert!(!st.emitted);
        assert!(!st.chunk_finished);
        assert_eq!(st.bytes_written, 0);
        assert_eq!(st.mode, Mode::Default);
    }
}
