//! Streaming decoder for `Transfer-Encoding: chunked` request bodies.

use crate::errors::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Cap on extension bytes, applied for the entire body.
const EXTENSIONS_LIMIT: u64 = 16 * 1024;

/// Cap on trailer bytes after the zero-size chunk.
const TRAILER_LIMIT: usize = 16 * 1024;

/// Failures specific to chunked framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkedError {
    /// The chunk size line does not start with a hex digit, or contains an
    /// unexpected byte.
    InvalidSize,
    /// A chunk extension contained a bare LF, or extensions exceeded their
    /// byte cap.
    InvalidExtension,
    /// A chunk's data was not followed by CRLF.
    InvalidFraming,
    /// A single chunk exceeded the configured maximum chunk size, or its
    /// hex size overflowed.
    ChunkTooLarge,
    /// The decoded body exceeded the configured maximum total size.
    BodyTooLarge,
    /// Trailer headers after the zero-size chunk exceeded their byte cap.
    TrailerTooLarge,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ChunkState {
    // Size line. `Start` insists on at least one hex digit.
    Start,
    Size,
    SizeLws,
    Extension,
    SizeLf,
    // Chunk payload and its trailing CRLF.
    Data,
    DataCr,
    // After the zero-size chunk: trailer lines until the final empty line.
    EndCr,
    Trailer,
    TrailerLf,
    EndLf,
    Done,
}

/// Decoder state for one chunked body. Sizes accumulate into `remaining`
/// while scanning the size line; the same field then counts down through the
/// chunk payload.
#[derive(Debug)]
pub(crate) struct ChunkedDecoder {
    state: ChunkState,
    remaining: u64,
    total: u64,
    ext_bytes: u64,
    trailer_bytes: usize,
    max_chunk: u64,
    max_body: Option<u64>,
}

impl ChunkedDecoder {
    pub(crate) fn new(max_chunk: u64, max_body: Option<u64>) -> Self {
        Self {
            state: ChunkState::Start,
            remaining: 0,
            total: 0,
            ext_bytes: 0,
            trailer_bytes: 0,
            max_chunk,
            max_body,
        }
    }

    #[inline(always)]
    pub(crate) fn is_done(&self) -> bool {
        self.state == ChunkState::Done
    }

    /// Pulls decoded body bytes into `dst`. Returns `Ok(0)` once the
    /// terminating chunk and trailers have been consumed.
    ///
    /// `buf`/`pos` hold already-read bytes (the parser's unread slice first,
    /// then refills); `io` supplies the rest of the stream.
    pub(crate) async fn read<R>(
        &mut self,
        buf: &mut Vec<u8>,
        pos: &mut usize,
        io: &mut R,
        dst: &mut [u8],
        read_size: usize,
    ) -> Result<usize, Error>
    where
        R: AsyncRead + Unpin,
    {
        use ChunkState::*;

        loop {
            self.state = match self.state {
                Start => match hex_digit(next_byte(buf, pos, io, read_size).await?) {
                    Some(d) => {
                        self.remaining = d as u64;
                        Size
                    }
                    None => return Err(ChunkedError::InvalidSize.into()),
                },
                Size => {
                    let byte = next_byte(buf, pos, io, read_size).await?;
                    match hex_digit(byte) {
                        Some(d) => {
                            self.remaining = self
                                .remaining
                                .checked_mul(16)
                                .and_then(|v| v.checked_add(d as u64))
                                .ok_or(ChunkedError::ChunkTooLarge)?;
                            Size
                        }
                        None => match byte {
                            b'\t' | b' ' => SizeLws,
                            b';' => Extension,
                            b'\r' => SizeLf,
                            _ => return Err(ChunkedError::InvalidSize.into()),
                        },
                    }
                }
                SizeLws => match next_byte(buf, pos, io, read_size).await? {
                    b'\t' | b' ' => SizeLws,
                    b';' => Extension,
                    b'\r' => SizeLf,
                    _ => return Err(ChunkedError::InvalidSize.into()),
                },
                Extension => match next_byte(buf, pos, io, read_size).await? {
                    b'\r' => SizeLf,
                    // Extensions are discarded, but a bare LF inside one is
                    // an injection vector for sloppy re-parsers.
                    b'\n' => return Err(ChunkedError::InvalidExtension.into()),
                    _ => {
                        self.ext_bytes += 1;
                        if self.ext_bytes >= EXTENSIONS_LIMIT {
                            return Err(ChunkedError::InvalidExtension.into());
                        }
                        Extension
                    }
                },
                SizeLf => {
                    if next_byte(buf, pos, io, read_size).await? != b'\n' {
                        return Err(ChunkedError::InvalidSize.into());
                    }
                    if self.remaining == 0 {
                        EndCr
                    } else {
                        if self.remaining > self.max_chunk {
                            return Err(ChunkedError::ChunkTooLarge.into());
                        }
                        self.total = self
                            .total
                            .checked_add(self.remaining)
                            .ok_or(ChunkedError::BodyTooLarge)?;
                        if let Some(max) = self.max_body {
                            if self.total > max {
                                return Err(ChunkedError::BodyTooLarge.into());
                            }
                        }
                        Data
                    }
                }
                Data => {
                    let want = dst.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
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

                    self.remaining -= n as u64;
                    if self.remaining == 0 {
                        self.state = DataCr;
                    }
                    return Ok(n);
                }
                DataCr => match next_byte(buf, pos, io, read_size).await? {
                    b'\r' => {
                        if next_byte(buf, pos, io, read_size).await? != b'\n' {
                            return Err(ChunkedError::InvalidFraming.into());
                        }
                        Start
                    }
                    _ => return Err(ChunkedError::InvalidFraming.into()),
                },
                EndCr => match next_byte(buf, pos, io, read_size).await? {
                    b'\r' => EndLf,
                    _ => {
                        self.bump_trailer()?;
                        Trailer
                    }
                },
                Trailer => match next_byte(buf, pos, io, read_size).await? {
                    b'\r' => TrailerLf,
                    _ => {
                        self.bump_trailer()?;
                        Trailer
                    }
                },
                TrailerLf => {
                    if next_byte(buf, pos, io, read_size).await? != b'\n' {
                        return Err(ChunkedError::InvalidFraming.into());
                    }
                    EndCr
                }
                EndLf => {
                    if next_byte(buf, pos, io, read_size).await? != b'\n' {
                        return Err(ChunkedError::InvalidFraming.into());
                    }
                    Done
                }
                Done => return Ok(0),
            };
        }
    }

    #[inline(always)]
    fn bump_trailer(&mut self) -> Result<(), Error> {
        self.trailer_bytes += 1;
        if self.trailer_bytes >= TRAILER_LIMIT {
            return Err(ChunkedError::TrailerTooLarge.into());
        }
        Ok(())
    }
}

#[inline(always)]
const fn hex_digit(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// One byte from the buffered prefix, refilling from `io` when exhausted.
async fn next_byte<R>(
    buf: &mut Vec<u8>,
    pos: &mut usize,
    io: &mut R,
    read_size: usize,
) -> Result<u8, Error>
where
    R: AsyncRead + Unpin,
{
    if *pos < buf.len() {
        let byte = buf[*pos];
        *pos += 1;
        return Ok(byte);
    }

    buf.clear();
    *pos = 0;
    buf.reserve(read_size);
    if io.read_buf(buf).await? == 0 {
        return Err(Error::UnexpectedEof);
    }

    *pos = 1;
    Ok(buf[0])
}
