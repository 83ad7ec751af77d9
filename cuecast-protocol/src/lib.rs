//! cuecast-protocol: Wire protocol for the cuecast viewer API
//!
//! Implements the minimal HTTP/1.1 subset the cue-list distribution server
//! speaks over raw TCP streams: a request decoder, a response encoder, and
//! the typed request/response surface used by the router. Framing is done
//! by hand on `BytesMut` buffers; there is deliberately no full HTTP stack
//! underneath.

pub mod codec;
pub mod request;
pub mod response;

// Re-export the main types at crate root for convenience
pub use codec::{CodecError, HttpCodec};
pub use request::{Headers, Method, Request};
pub use response::{Response, Status};
