//! Request/response framing over raw byte streams

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::request::{Headers, Method, Request};
use crate::response::Response;

/// Maximum size of a request head (request line + headers)
const MAX_HEAD_SIZE: usize = 16 * 1024;

/// Maximum accepted request body size
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Protocol codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("request head too large: {size} bytes (max {max})")]
    HeadTooLarge { size: usize, max: usize },

    #[error("request body too large: {size} bytes (max {max})")]
    BodyTooLarge { size: usize, max: usize },
}

impl CodecError {
    /// Whether the stream is still usable after this error
    ///
    /// A malformed head has been consumed from the buffer, so decoding can
    /// resume at the next request. Size-limit and IO errors leave the stream
    /// in an unrecoverable position.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

/// Codec for the server side: decodes [`Request`], encodes [`Response`]
///
/// Stateless by design: a decode that cannot complete leaves the buffer
/// untouched and is simply retried when more bytes arrive, which is what
/// keeps one codec instance valid across every request of a keep-alive
/// connection.
pub struct HttpCodec;

impl HttpCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HttpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for HttpCodec {
    type Item = Request;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // The head ends at the first blank line
        let Some(head_len) = find_head_end(src) else {
            if src.len() > MAX_HEAD_SIZE {
                return Err(CodecError::HeadTooLarge {
                    size: src.len(),
                    max: MAX_HEAD_SIZE,
                });
            }
            return Ok(None);
        };

        if head_len > MAX_HEAD_SIZE {
            return Err(CodecError::HeadTooLarge {
                size: head_len,
                max: MAX_HEAD_SIZE,
            });
        }

        // Parse the head without consuming, so a partial body can wait for
        // more bytes and be re-parsed on the next call.
        let parsed = parse_head(&src[..head_len]);

        let (method, path, headers) = match parsed {
            Ok(parts) => parts,
            Err(e) => {
                // Drop the offending head so the connection can resync at
                // the next request boundary.
                src.advance(head_len);
                return Err(e);
            }
        };

        let body_len = match headers.get("Content-Length") {
            Some(value) => value.trim().parse::<usize>().map_err(|_| {
                src.advance(head_len);
                CodecError::Malformed(format!("invalid Content-Length: {value:?}"))
            })?,
            None => 0,
        };

        if body_len > MAX_BODY_SIZE {
            return Err(CodecError::BodyTooLarge {
                size: body_len,
                max: MAX_BODY_SIZE,
            });
        }

        if src.len() < head_len + body_len {
            src.reserve(head_len + body_len - src.len());
            return Ok(None);
        }

        src.advance(head_len);
        let body = src.split_to(body_len).to_vec();

        Ok(Some(Request {
            method,
            path,
            headers,
            body,
        }))
    }
}

impl Encoder<Response> for HttpCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        use std::fmt::Write;

        let mut head = String::with_capacity(256);
        let _ = write!(
            head,
            "HTTP/1.1 {} {}\r\n",
            item.status.code(),
            item.status.reason()
        );
        let _ = write!(head, "Content-Length: {}\r\n", item.body.len());

        // Ambient headers every response carries: connection reuse,
        // wide-open cross-origin access for the viewer page, and cache
        // disabling so polling clients always re-fetch.
        head.push_str("Connection: keep-alive\r\n");
        head.push_str("Access-Control-Allow-Origin: *\r\n");
        head.push_str("Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n");
        head.push_str("Access-Control-Allow-Headers: *\r\n");
        head.push_str("Cache-Control: no-cache, no-store, must-revalidate\r\n");
        head.push_str("Pragma: no-cache\r\n");
        head.push_str("Expires: 0\r\n");

        for (name, value) in item.headers.iter() {
            let _ = write!(head, "{}: {}\r\n", name, value);
        }
        head.push_str("\r\n");

        dst.reserve(head.len() + item.body.len());
        dst.put_slice(head.as_bytes());
        dst.put_slice(&item.body);
        Ok(())
    }
}

/// Find the end of the request head (offset just past the blank line)
fn find_head_end(src: &BytesMut) -> Option<usize> {
    src.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// Parse request line and header lines from the head bytes
fn parse_head(head: &[u8]) -> Result<(Method, String, Headers), CodecError> {
    let text = std::str::from_utf8(head)
        .map_err(|_| CodecError::Malformed("head is not valid UTF-8".into()))?;

    let mut lines = text.split("\r\n");

    let request_line = lines
        .next()
        .ok_or_else(|| CodecError::Malformed("empty head".into()))?;

    let mut parts = request_line.split_whitespace();
    let method_token = parts
        .next()
        .ok_or_else(|| CodecError::Malformed("missing method".into()))?;
    let path = parts
        .next()
        .ok_or_else(|| CodecError::Malformed("missing path".into()))?;
    let version = parts
        .next()
        .ok_or_else(|| CodecError::Malformed("missing version".into()))?;

    if parts.next().is_some() {
        return Err(CodecError::Malformed(format!(
            "trailing tokens in request line: {request_line:?}"
        )));
    }

    let method = Method::parse(method_token).ok_or_else(|| {
        CodecError::Malformed(format!("unsupported method: {method_token:?}"))
    })?;

    if !version.starts_with("HTTP/") {
        return Err(CodecError::Malformed(format!(
            "unsupported protocol version: {version:?}"
        )));
    }

    let mut headers = Headers::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| CodecError::Malformed(format!("invalid header line: {line:?}")))?;
        headers.insert(name.trim(), value.trim());
    }

    Ok((method, path.to_string(), headers))
}
