//! Connection configuration and protocol limits
//!
//! # Security-First Defaults
//!
//! The hard limits below are fixed by the wire contract and are intentionally
//! conservative to prevent:
//! - Resource exhaustion attacks
//! - Slowloris attacks
//! - Header flooding
//! - Request smuggling via oversized or malformed framing
//!
//! The tunable knobs live in [`ConnLimits`]; the framing caps are constants
//! because every peer must be able to rely on them.

use std::time::Duration;

/// Maximum length of the request line (method, URI, version) in bytes.
pub const MAX_REQUEST_LINE: usize = 8 * 1024;

/// Maximum length of the request URI in bytes.
pub const MAX_URI: usize = 8 * 1024;

/// Maximum size of the headers block in bytes.
pub const MAX_HEADERS_BLOCK: usize = 8 * 1024;

/// Maximum size of the whole request head (request line + headers),
/// including the terminating `CRLF CRLF`.
pub const MAX_HEAD: usize = MAX_REQUEST_LINE + MAX_HEADERS_BLOCK;

/// Number of header entries stored in the inline tier.
pub const MAX_INLINE_HEADERS: usize = 32;

/// Maximum header name length in bytes. Longer names are rejected outright,
/// they never spill to the overflow tier.
pub const MAX_INLINE_NAME: usize = 64;

/// Maximum header value length stored inline; longer values move to the
/// overflow tier.
pub const MAX_INLINE_VALUE: usize = 128;

/// Hard cap on a single header value in bytes, inline or overflow.
pub const MAX_HEADER_VALUE: usize = 8 * 1024;

/// Hard cap on the total number of headers in one request.
pub const MAX_HEADER_COUNT: usize = 100;

/// Per-connection tunables consumed by the serve loop.
///
/// Defaults balance throughput, memory, and protection against slow or
/// hostile peers. Only change them if you understand the consequences.
///
/// # Examples
///
/// ```
/// use filament::limits::ConnLimits;
/// use std::time::Duration;
///
/// let limits = ConnLimits {
///     idle_timeout: Duration::from_secs(15),
///     max_requests_per_connection: 1_000,
///     ..ConnLimits::default()
/// };
/// assert_eq!(limits.read_buffer_size, 4096);
/// ```
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// Keep-alive idle timeout (default: `60 seconds`).
    ///
    /// Applied as an absolute deadline on the read side before each parse.
    /// A connection that produces no complete request head within the
    /// deadline is closed with [`Error::Timeout`](crate::Error::Timeout).
    pub idle_timeout: Duration,

    /// Optional write timeout applied before each flush (default: `None`).
    pub write_timeout: Option<Duration>,

    /// Maximum requests served per connection; `0` = unlimited (default: `0`).
    ///
    /// When the limit is configured, the last allowed response carries
    /// `Connection: close` and the connection terminates after it.
    pub max_requests_per_connection: usize,

    /// Read granularity in bytes (default: `4096`).
    pub read_buffer_size: usize,

    /// Capacity of the buffered writer in bytes (default: `4096`).
    pub write_buffer_size: usize,

    /// Maximum size of a single chunk in a chunked request body
    /// (default: `16 MiB`).
    pub max_chunk_size: u64,

    /// Optional cap on the total decoded size of a chunked request body
    /// (default: unlimited).
    pub max_body_size: Option<u64>,

    /// How many unread body bytes the serve loop is willing to drain after
    /// the handler returns before giving up and closing instead
    /// (default: `64 KiB`).
    pub max_drain_bytes: u64,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ConnLimits {
    #[inline(always)]
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            write_timeout: None,
            max_requests_per_connection: 0,
            read_buffer_size: 4096,
            write_buffer_size: 4096,
            max_chunk_size: 16 * 1024 * 1024,
            max_body_size: None,
            max_drain_bytes: 64 * 1024,

            _priv: (),
        }
    }
}
