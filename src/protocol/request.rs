//! Parsed request head.
//!
//! A [`RequestHead`] is produced by the request decoder once the full header
//! block has been received and validated. It carries the uppercased method
//! token, the normalized request-target, the percent-decoded path, the HTTP
//! version, the header map and the declared content length.

use std::fmt;

use crate::protocol::HeaderMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http10,
    Http11,
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpVersion::Http10 => f.write_str("HTTP/1.0"),
            HttpVersion::Http11 => f.write_str("HTTP/1.1"),
        }
    }
}

#[derive(Debug)]
pub struct RequestHead {
    method: String,
    uri: String,
    path: String,
    version: HttpVersion,
    headers: HeaderMap,
    content_length: u64,
    expect_continue: bool,
}

impl RequestHead {
    pub(crate) fn new(
        method: String,
        uri: String,
        path: String,
        version: HttpVersion,
        headers: HeaderMap,
        content_length: u64,
        expect_continue: bool,
    ) -> Self {
        Self { method, uri, path, version, headers, content_length, expect_continue }
    }

    /// A placeholder head for connections that never produced a valid
    /// request (canned 400/413 responses still need one).
    pub(crate) fn empty() -> Self {
        Self {
            method: String::new(),
            uri: String::new(),
            path: String::new(),
            version: HttpVersion::Http11,
            headers: HeaderMap::new(),
            content_length: 0,
            expect_continue: false,
        }
    }

    /// The request method, uppercased.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The normalized request-target as sent by the client.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The percent-decoded path component of the request-target.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// The declared Content-Length, 0 when absent.
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// True when the client asked for a `100 Continue` before sending the
    /// body and no body bytes have arrived yet.
    pub(crate) fn expect_continue(&self) -> bool {
        self.expect_continue
    }

    /// The request-side keep-alive rule: HTTP/1.0 closes unless the client
    /// sent `Connection: keep-alive`, HTTP/1.1 stays open unless it sent
    /// `Connection: close`.
    pub fn keep_alive(&self) -> bool {
        let connection = self.headers.get("Connection");
        if self.version == HttpVersion::Http10 && connection != Some("keep-alive") {
            return false;
        }
        connection != Some("close")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(version: HttpVersion, connection: Option<&str>) -> RequestHead {
        let mut headers = HeaderMap::new();
        if let Some(value) = connection {
            headers.insert("Connection", value);
        }
        RequestHead::new("GET".into(), "/".into(), "/".into(), version, headers, 0, false)
    }

    #[test]
    fn http10_defaults_to_close() {
        assert!(!head(HttpVersion::Http10, None).keep_alive());
        assert!(head(HttpVersion::Http10, Some("keep-alive")).keep_alive());
        assert!(!head(HttpVersion::Http10, Some("close")).keep_alive());
    }

    #[test]
    fn http11_defaults_to_keep_alive() {
        assert!(head(HttpVersion::Http11, None).keep_alive());
        assert!(head(HttpVersion::Http11, Some("keep-alive")).keep_alive());
        assert!(!head(HttpVersion::Http11, Some("close")).keep_alive());
    }
}
