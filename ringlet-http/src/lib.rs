//! ringlet-http — streaming HTTP/1.1 request parsing for ringlet.
//!
//! The parser is a resumable coroutine ([`RequestParser`]) fed arbitrarily
//! fragmented byte chunks. It suspends whenever input runs out mid-message
//! and completes with either a parsed [`Request`] plus the leftover bytes
//! of the final chunk, or a single failure sentinel for malformed input.
//!
//! ```rust
//! use ringlet_http::{Feed, RequestParser};
//!
//! let mut parser = RequestParser::new();
//! assert!(matches!(parser.feed("GET / HTT"), Feed::NeedMore));
//! match parser.feed("P/1.1\r\nHost: x\r\n\r\n") {
//!     Feed::Complete { request, .. } => assert_eq!(request.version, "HTTP/1.1"),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```
//!
//! Grammar coverage is RFC 7230 request-line + header fields + an optional
//! `Content-Length`-bounded body. Line endings are strictly `CRLF`; paths
//! are percent-decoded; chunked transfer encoding is not supported.

pub(crate) mod grammar;
pub mod parser;
pub mod request;

/// Outcome of one feed call.
pub use parser::Feed;
/// A resumable HTTP/1.1 request parser.
pub use parser::RequestParser;
/// Header fields with case-insensitive lookup.
pub use request::Headers;
/// Request method.
pub use request::Method;
/// A fully parsed request.
pub use request::Request;
/// Origin or absolute request target.
pub use request::RequestTarget;
