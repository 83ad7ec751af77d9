//! Response construction
//!
//! Responses carry only their own status, content headers, and body. The
//! ambient header set every response shares (keep-alive, CORS, cache
//! disabling, Content-Length) is stamped by the encoder so no handler can
//! forget it.

use crate::request::Headers;

/// Status codes the server actually produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    NoContent,
    NotFound,
    ServerError,
}

impl Status {
    pub fn code(&self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::NoContent => 204,
            Self::NotFound => 404,
            Self::ServerError => 500,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NoContent => "No Content",
            Self::NotFound => "Not Found",
            Self::ServerError => "Internal Server Error",
        }
    }
}

/// One outbound response
#[derive(Debug, Clone)]
pub struct Response {
    pub status: Status,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl Response {
    /// Build a 200 response with an explicit content type
    pub fn ok(content_type: &str, body: Vec<u8>) -> Self {
        let mut headers = Headers::new();
        headers.insert("Content-Type", content_type);
        Self {
            status: Status::Ok,
            headers,
            body,
        }
    }

    pub fn html(body: &str) -> Self {
        Self::ok("text/html; charset=utf-8", body.as_bytes().to_vec())
    }

    pub fn json(body: String) -> Self {
        Self::ok("application/json", body.into_bytes())
    }

    pub fn text(body: &str) -> Self {
        Self::ok("text/plain; charset=utf-8", body.as_bytes().to_vec())
    }

    /// Empty-body preflight response
    pub fn no_content() -> Self {
        Self {
            status: Status::NoContent,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            headers: {
                let mut headers = Headers::new();
                headers.insert("Content-Type", "text/plain; charset=utf-8");
                headers
            },
            body: b"Not Found".to_vec(),
        }
    }

    pub fn server_error() -> Self {
        Self {
            status: Status::ServerError,
            headers: {
                let mut headers = Headers::new();
                headers.insert("Content-Type", "text/plain; charset=utf-8");
                headers
            },
            body: b"Internal Server Error".to_vec(),
        }
    }
}
