//! Request body stream: empty, Content-Length bounded, or chunked.

use crate::{errors::Error, http::chunked::ChunkedDecoder};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Framing selected by the parser for one request body.
pub(crate) enum BodyKind {
    Empty,
    Length { remaining: u64 },
    Chunked(ChunkedDecoder),
}

/// Streaming reader over one request body.
///
/// Composes the parser's unread bytes (read past end-of-headers) with the
/// connection's read half, bounded by the request's framing. The reader is
/// finite and not restartable: after it reports `Ok(0)` the body is
/// complete and further reads keep returning `Ok(0)`.
///
/// Bytes buffered beyond the body's end belong to the next pipelined
/// request; the serve loop recovers them via [`finish`](BodyReader::finish)
/// after the handler returns.
pub struct BodyReader<'a, R> {
    kind: BodyKind,
    buf: Vec<u8>,
    pos: usize,
    io: &'a mut R,
    read_size: usize,
}

impl<'a, R> BodyReader<'a, R>
where
    R: AsyncRead + Unpin,
{
    pub(crate) fn new(kind: BodyKind, prefix: Vec<u8>, io: &'a mut R, read_size: usize) -> Self {
        Self {
            kind,
            buf: prefix,
            pos: 0,
            io,
            read_size,
        }
    }

    /// Reads decoded body bytes into `dst`. `Ok(0)` means end of body.
    pub async fn read(&mut self, dst: &mut [u8]) -> Result<usize, Error> {
        if dst.is_empty() {
            return Ok(0);
        }

        let BodyReader {
            kind,
            buf,
            pos,
            io,
            read_size,
        } = self;

        match kind {
            BodyKind::Empty => Ok(0),
            BodyKind::Length { remaining } => {
                if *remaining == 0 {
                    return Ok(0);
                }

                let want = dst
                    .len()
                    .min(usize::try_from(*remaining).unwrap_or(usize::MAX));
                let n = if *pos < buf.len() {
                    let avail = buf.len() - *pos;
                    let n = want.min(avail);
                    dst[..n].copy_from_slice(&buf[*pos..*pos + n]);
                    *pos += n;
                    n
                } else {
                    let n = io.read(&mut dst[..want]).await?;
                    if n == 0 {
                        return Err(Error::UnexpectedEof);
                    }
                    n
                };

                *remaining -= n as u64;
                Ok(n)
            }
            BodyKind::Chunked(decoder) => {
                if decoder.is_done() {
                    return Ok(0);
                }
                decoder.read(buf, pos, io, dst, *read_size).await
            }
        }
    }

    /// Reads the remainder of the body into `out`. Returns the number of
    /// bytes appended.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize, Error> {
        let mut tmp = [0u8; 4096];
        let mut total = 0;

        loop {
            let n = self.read(&mut tmp).await?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&tmp[..n]);
            total += n;
        }
    }

    /// Drains whatever the handler left unread, then surrenders the bytes
    /// that belong to the next pipelined request.
    ///
    /// Returns `Ok(None)` when more than `max_drain` bytes would have to be
    /// discarded; the caller should close the connection instead of
    /// draining.
    pub(crate) async fn finish(
        mut self,
        max_drain: u64,
        scratch: &mut [u8],
    ) -> Result<Option<Vec<u8>>, Error> {
        let mut drained: u64 = 0;

        loop {
            let n = self.read(scratch).await?;
            if n == 0 {
                break;
            }
            drained += n as u64;
            if drained > max_drain {
                return Ok(None);
            }
        }

        let mut leftover = self.buf;
        leftover.drain(..self.pos);
        Ok(Some(leftover))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::chunked::ChunkedDecoder;

    const MAX: u64 = 16 * 1024 * 1024;

    #[tokio::test]
    async fn length_body_from_prefix_and_stream() {
        let mut io = &b"llo world"[..];
        let mut body = BodyReader::new(
            BodyKind::Length { remaining: 11 },
            b"he".to_vec(),
            &mut io,
            4096,
        );

        let mut out = Vec::new();
        assert_eq!(body.read_to_end(&mut out).await.unwrap(), 11);
        assert_eq!(out, b"hello world");
        assert_eq!(body.read(&mut [0u8; 8]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn length_body_stops_at_boundary() {
        // Prefix carries the body plus the head of the next request.
        let mut io = tokio::io::empty();
        let mut body = BodyReader::new(
            BodyKind::Length { remaining: 4 },
            b"bodyGET / HTTP/1.1\r\n".to_vec(),
            &mut io,
            4096,
        );

        let mut out = Vec::new();
        body.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"body");

        let leftover = body.finish(u64::MAX, &mut [0u8; 64]).await.unwrap();
        assert_eq!(leftover.as_deref(), Some(b"GET / HTTP/1.1\r\n" as &[u8]));
    }

    #[tokio::test]
    async fn length_body_truncated() {
        let mut io = &b"sho"[..];
        let mut body = BodyReader::new(
            BodyKind::Length { remaining: 10 },
            Vec::new(),
            &mut io,
            4096,
        );

        let mut out = Vec::new();
        assert_eq!(
            body.read_to_end(&mut out).await.unwrap_err(),
            Error::UnexpectedEof
        );
    }

    #[tokio::test]
    async fn empty_body_preserves_pipelined_bytes() {
        let mut io = tokio::io::empty();
        let body = BodyReader::new(
            BodyKind::Empty,
            b"GET /next HTTP/1.1\r\n\r\n".to_vec(),
            &mut io,
            4096,
        );

        let leftover = body.finish(u64::MAX, &mut [0u8; 64]).await.unwrap();
        assert_eq!(
            leftover.as_deref(),
            Some(b"GET /next HTTP/1.1\r\n\r\n" as &[u8])
        );
    }

    #[tokio::test]
    async fn chunked_body_leftover_after_terminator() {
        let mut io = tokio::io::empty();
        let mut body = BodyReader::new(
            BodyKind::Chunked(ChunkedDecoder::new(MAX, None)),
            b"5\r\nhello\r\n0\r\n\r\nGET /next HTTP/1.1\r\n\r\n".to_vec(),
            &mut io,
            4096,
        );

        let mut out = Vec::new();
        body.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");

        let leftover = body.finish(u64::MAX, &mut [0u8; 64]).await.unwrap();
        assert_eq!(
            leftover.as_deref(),
            Some(b"GET /next HTTP/1.1\r\n\r\n" as &[u8])
        );
    }

    #[tokio::test]
    async fn finish_drains_unread_body() {
        let mut io = &b"llo world"[..];
        let body = BodyReader::new(
            BodyKind::Length { remaining: 11 },
            b"he".to_vec(),
            &mut io,
            4096,
        );

        let leftover = body.finish(u64::MAX, &mut [0u8; 4]).await.unwrap();
        assert_eq!(leftover.as_deref(), Some(b"" as &[u8]));
    }

    #[tokio::test]
    async fn finish_refuses_oversized_drain() {
        let mut io = &b"0123456789"[..];
        let body = BodyReader::new(
            BodyKind::Length { remaining: 10 },
            Vec::new(),
            &mut io,
            4096,
        );

        assert_eq!(body.finish(4, &mut [0u8; 4]).await.unwrap(), None);
    }
}
