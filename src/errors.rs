use crate::http::chunked::ChunkedError;
use std::{error, fmt, io};

/// Errors produced by the connection engine.
///
/// Every failure is reported by name; none is retried at this layer. Any
/// error surfaced from the parser or the serve loop is fatal to the
/// connection, because the byte stream can no longer be trusted for framing.
#[derive(Debug, PartialEq)]
pub enum Error {
    InvalidRequestLine,
    InvalidMethod,
    InvalidPath,
    InvalidProtocol,
    RequestLineTooLarge,
    UriTooLong,

    InvalidHeader,
    HeaderTooLarge,
    TooManyHeaders,
    HeadersTooLarge,

    InvalidContentLength,
    ContentLengthWithTransferEncoding,
    DuplicateContentLength,

    Chunked(ChunkedError),

    UnexpectedEof,
    ConnectionClosed,
    Timeout,
    MaxRequestsExceeded,

    HeadersAlreadyWritten,
    InvalidStatusCode,

    /// A handler returned an error (or panicked; the panic barrier maps the
    /// unwind to this variant). Fatal to the connection after the partial
    /// response is flushed.
    Handler(String),

    Io(IoError),
}

impl Error {
    /// Shorthand for a handler-level failure.
    #[inline]
    pub fn handler<M: Into<String>>(msg: M) -> Self {
        Error::Handler(msg.into())
    }

    /// True for errors that originate in request parsing, i.e. the ones a
    /// host may want to answer with 400 / 413 / 431 before closing.
    pub const fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidRequestLine
                | Error::InvalidMethod
                | Error::InvalidPath
                | Error::InvalidProtocol
                | Error::RequestLineTooLarge
                | Error::UriTooLong
                | Error::InvalidHeader
                | Error::HeaderTooLarge
                | Error::TooManyHeaders
                | Error::HeadersTooLarge
                | Error::InvalidContentLength
                | Error::ContentLengthWithTransferEncoding
                | Error::DuplicateContentLength
        )
    }
}

impl error::Error for Error {}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<ChunkedError> for Error {
    fn from(err: ChunkedError) -> Self {
        Error::Chunked(err)
    }
}
impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(IoError(err))
    }
}

/// [`io::Error`] wrapper comparing by [`io::ErrorKind`], so error values
/// stay table-testable.
#[derive(Debug)]
pub struct IoError(pub io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}
