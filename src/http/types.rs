//! Core HTTP protocol types and byte-level utilities

// Common header names and content types used by the engine itself.
pub(crate) const CONTENT_LENGTH: &[u8] = b"Content-Length";
pub(crate) const CONTENT_TYPE: &[u8] = b"Content-Type";
pub(crate) const TRANSFER_ENCODING: &[u8] = b"Transfer-Encoding";
pub(crate) const CONNECTION: &[u8] = b"Connection";
pub(crate) const HOST: &[u8] = b"Host";

pub(crate) const MIME_TEXT: &[u8] = b"text/plain; charset=utf-8";
pub(crate) const MIME_HTML: &[u8] = b"text/html; charset=utf-8";
pub(crate) const MIME_JSON: &[u8] = b"application/json";

// METHOD

/// Identifier for the nine standard HTTP request methods.
///
/// Parsing is byte-exact and case-sensitive per
/// [RFC 7230 §3.1.1](https://datatracker.ietf.org/doc/html/rfc7230#section-3.1.1):
/// `get` is *not* `GET`. Any other syntactically valid token maps to
/// [`Unknown`](MethodId::Unknown); the raw bytes stay available on the
/// request so handlers can examine custom verbs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum MethodId {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Connect,
    Trace,
    #[default]
    Unknown,
}

impl MethodId {
    /// Maps a raw method token to its identifier. Case-sensitive.
    #[inline(always)]
    pub const fn from_bytes(src: &[u8]) -> Self {
        match src {
            b"GET" => MethodId::Get,
            b"POST" => MethodId::Post,
            b"PUT" => MethodId::Put,
            b"DELETE" => MethodId::Delete,
            b"PATCH" => MethodId::Patch,
            b"HEAD" => MethodId::Head,
            b"OPTIONS" => MethodId::Options,
            b"CONNECT" => MethodId::Connect,
            b"TRACE" => MethodId::Trace,
            _ => MethodId::Unknown,
        }
    }

    /// Canonical byte literal; empty for [`Unknown`](MethodId::Unknown).
    #[inline(always)]
    pub const fn as_bytes(&self) -> &'static [u8] {
        match self {
            MethodId::Get => b"GET",
            MethodId::Post => b"POST",
            MethodId::Put => b"PUT",
            MethodId::Delete => b"DELETE",
            MethodId::Patch => b"PATCH",
            MethodId::Head => b"HEAD",
            MethodId::Options => b"OPTIONS",
            MethodId::Connect => b"CONNECT",
            MethodId::Trace => b"TRACE",
            MethodId::Unknown => b"",
        }
    }

    /// Canonical string form; empty for [`Unknown`](MethodId::Unknown).
    #[inline(always)]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MethodId::Get => "GET",
            MethodId::Post => "POST",
            MethodId::Put => "PUT",
            MethodId::Delete => "DELETE",
            MethodId::Patch => "PATCH",
            MethodId::Head => "HEAD",
            MethodId::Options => "OPTIONS",
            MethodId::Connect => "CONNECT",
            MethodId::Trace => "TRACE",
            MethodId::Unknown => "",
        }
    }
}

// TOKEN / DIGITS

/// `tchar` per RFC 7230 §3.2.6.
#[inline(always)]
pub(crate) const fn is_tchar(b: u8) -> bool {
    matches!(
        b,
        b'!' | b'#'
            | b'$'
            | b'%'
            | b'&'
            | b'\''
            | b'*'
            | b'+'
            | b'-'
            | b'.'
            | b'^'
            | b'_'
            | b'`'
            | b'|'
            | b'~'
            | b'0'..=b'9'
            | b'a'..=b'z'
            | b'A'..=b'Z'
    )
}

#[inline(always)]
pub(crate) fn is_token(src: &[u8]) -> bool {
    !src.is_empty() && src.iter().all(|&b| is_tchar(b))
}

/// Parses a non-negative ASCII decimal. `None` on any non-digit byte,
/// an empty slice, or overflow.
#[inline(always)]
pub(crate) fn parse_decimal(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }

    let mut result: u64 = 0;
    for &byte in bytes {
        if !byte.is_ascii_digit() {
            return None;
        }

        result = result
            .checked_mul(10)?
            .checked_add((byte - b'0') as u64)?;
    }

    Some(result)
}

// STATUS LINES

macro_rules! status_lines {
    ($( $code:literal => $reason:literal; )+) => {
        /// Pre-serialized status line for a registered code, e.g.
        /// `b"HTTP/1.1 200 OK\r\n"`. `None` for unregistered codes, which
        /// are formatted per emission instead.
        #[inline]
        pub(crate) const fn status_line(code: u16) -> Option<&'static [u8]> {
            match code { $(
                $code => Some(concat!("HTTP/1.1 ", $code, " ", $reason, "\r\n").as_bytes()),
            )+ _ => None }
        }

        /// Canonical reason phrase for a registered code.
        #[inline]
        pub(crate) const fn reason_phrase(code: u16) -> &'static str {
            match code { $(
                $code => $reason,
            )+ _ => "Unknown" }
        }
    }
}

status_lines! {
    100 => "Continue";
    101 => "Switching Protocols";
    102 => "Processing";

    200 => "OK";
    201 => "Created";
    202 => "Accepted";
    203 => "Non Authoritative Information";
    204 => "No Content";
    205 => "Reset Content";
    206 => "Partial Content";
    207 => "Multi-Status";
    208 => "Already Reported";
    226 => "IM Used";

    300 => "Multiple Choices";
    301 => "Moved Permanently";
    302 => "Found";
    303 => "See Other";
    304 => "Not Modified";
    305 => "Use Proxy";
    307 => "Temporary Redirect";
    308 => "Permanent Redirect";

    400 => "Bad Request";
    401 => "Unauthorized";
    402 => "Payment Required";
    403 => "Forbidden";
    404 => "Not Found";
    405 => "Method Not Allowed";
    406 => "Not Acceptable";
    407 => "Proxy Authentication Required";
    408 => "Request Timeout";
    409 => "Conflict";
    410 => "Gone";
    411 => "Length Required";
    412 => "Precondition Failed";
    413 => "Payload Too Large";
    414 => "URI Too Long";
    415 => "Unsupported Media Type";
    416 => "Range Not Satisfiable";
    417 => "Expectation Failed";
    418 => "I'm a teapot";
    421 => "Misdirected Request";
    422 => "Unprocessable Entity";
    423 => "Locked";
    424 => "Failed Dependency";
    425 => "Too Early";
    426 => "Upgrade Required";
    428 => "Precondition Required";
    429 => "Too Many Requests";
    431 => "Request Header Fields Too Large";
    451 => "Unavailable For Legal Reasons";

    500 => "Internal Server Error";
    501 => "Not Implemented";
    502 => "Bad Gateway";
    503 => "Service Unavailable";
    504 => "Gateway Timeout";
    505 => "HTTP Version Not Supported";
    506 => "Variant Also Negotiates";
    507 => "Insufficient Storage";
    508 => "Loop Detected";
    510 => "Not Extended";
    511 => "Network Authentication Required";
}


#[cfg(test)]
mod token_tests {
    use super::*;

    #[test]
    fn tokens() {
        #[rustfmt::skip]
        let cases = [
            (b"GET" as &[u8],        true),
            (b"X-CUSTOM",            true),
            (b"a1!#$%&'*+-.^_`|~",   true),

            (b"",                    false),
            (b"GE T",                false),
            (b"GET\r",               false),
            (b"G\x00T",              false),
            (b"na:me",               false),
        ];

        for (bytes, expected) in cases {
            assert_eq!(is_token(bytes), expected, "{:?}", bytes);
        }
    }

    #[test]
    fn decimals() {
        #[rustfmt::skip]
        let cases = [
            (b"0" as &[u8],                      Some(0)),
            (b"25",                              Some(25)),
            (b"18446744073709551615",            Some(u64::MAX)),

            (b"",                                None),
            (b"-1",                              None),
            (b"12a",                             None),
            (b" 12",                             None),
            (b"18446744073709551616",            None),
            (b"99999999999999999999999999",      None),
        ];

        for (bytes, expected) in cases {
            assert_eq!(parse_decimal(bytes), expected);
        }
    }
}
