//! Error types for HTTP protocol handling
//!
//! [`HttpError`] is the top-level error a connection can end with. It wraps
//! [`ParseError`] (request side) and [`SendError`] (response side) and adds
//! the transport-level outcomes a connection distinguishes for logging:
//! timeouts, peer resets and server shutdown.
//!
//! [`HandlerError`] is the error a request handler may return; the engine
//! maps it to either a canned `500` or a silent close.

use std::error::Error;
use std::io;
use thiserror::Error;

/// The top-level error type for HTTP connection processing.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Errors that occur while parsing the request
    #[error("request error: {source}")]
    Request {
        #[from]
        source: ParseError,
    },

    /// Errors that occur while emitting the response
    #[error("response error: {source}")]
    Response {
        #[from]
        source: SendError,
    },

    /// A socket read or write did not complete within the configured timeout
    #[error("socket timeout")]
    Timeout,

    /// The peer closed the connection in the middle of a request
    #[error("connection reset by peer")]
    PeerReset,

    /// The server is shutting down and the connection was asked to stop
    #[error("server is shutting down")]
    Shutdown,
}

/// Errors that occur during HTTP request parsing.
#[derive(Error, Debug)]
pub enum ParseError {
    /// Header block exceeds the maximum allowed size (the receive buffer size)
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    /// Number of headers exceeds the maximum allowed
    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    /// Malformed request line or header block
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// HTTP version is not HTTP/1.0 or HTTP/1.1
    #[error("invalid http version")]
    InvalidVersion,

    /// HTTP/1.1 request without a Host header
    #[error("missing host header")]
    MissingHost,

    /// Invalid Content-Length header
    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    /// I/O error while receiving the request
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_request<S: ToString>(str: S) -> Self {
        Self::InvalidRequest { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    /// True when the canned response for this error is `413` rather than `400`.
    pub fn is_too_large(&self) -> bool {
        matches!(self, Self::TooLargeHeader { .. })
    }
}

/// Errors that occur during HTTP response generation and sending.
#[derive(Error, Debug)]
pub enum SendError {
    /// I/O error during sending
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// The error a request handler may return to the engine.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Transport failure while reading the body or writing the response;
    /// the connection is closed without a further response.
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// Anything else the handler raises; maps to a canned `500` when the
    /// response is still uncommitted.
    #[error("internal handler error: {source}")]
    Internal { source: Box<dyn Error + Send + Sync> },
}

impl HandlerError {
    pub fn internal<E: Into<Box<dyn Error + Send + Sync>>>(e: E) -> Self {
        Self::Internal { source: e.into() }
    }
}
