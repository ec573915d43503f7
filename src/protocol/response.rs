//! Mutable response head.
//!
//! Status and headers are plain local mutations until the response commits;
//! the response encoder assembles the prelude from this state exactly once.

use std::fmt;

/// A response status token: code plus reason phrase, e.g. `200 OK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub code: u16,
    pub reason: &'static str,
}

impl Status {
    pub const CONTINUE: Status = Status { code: 100, reason: "Continue" };
    pub const OK: Status = Status { code: 200, reason: "OK" };
    pub const CREATED: Status = Status { code: 201, reason: "Created" };
    pub const NO_CONTENT: Status = Status { code: 204, reason: "No Content" };
    pub const MOVED_PERMANENTLY: Status = Status { code: 301, reason: "Moved Permanently" };
    pub const BAD_REQUEST: Status = Status { code: 400, reason: "Bad Request" };
    pub const FORBIDDEN: Status = Status { code: 403, reason: "Forbidden" };
    pub const NOT_FOUND: Status = Status { code: 404, reason: "File Not Found" };
    pub const METHOD_NOT_ALLOWED: Status = Status { code: 405, reason: "Method Not Allowed" };
    pub const ENTITY_TOO_LARGE: Status = Status { code: 413, reason: "Request Entity Too Large" };
    pub const INTERNAL_ERROR: Status = Status { code: 500, reason: "Internal Server Error" };
    pub const UNAVAILABLE: Status = Status { code: 503, reason: "Service Unavailable" };
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason)
    }
}

/// The pre-commit state of a response: status plus a case-sensitive,
/// insertion-ordered header list.
#[derive(Debug)]
pub struct ResponseHead {
    status: Status,
    headers: Vec<(String, String)>,
}

impl ResponseHead {
    pub fn new() -> Self {
        Self { status: Status::OK, headers: Vec::new() }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    /// Set a header, replacing an existing exact-name match in place.
    pub fn set_header(&mut self, name: &str, value: &str) {
        match self.headers.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    /// Exact-name lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl Default for ResponseHead {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_token_display() {
        assert_eq!(Status::NOT_FOUND.to_string(), "404 File Not Found");
        assert_eq!(Status::OK.to_string(), "200 OK");
    }

    #[test]
    fn header_lookup_is_case_sensitive() {
        let mut head = ResponseHead::new();
        head.set_header("Content-Type", "text/plain");

        assert_eq!(head.header("Content-Type"), Some("text/plain"));
        assert_eq!(head.header("content-type"), None);
    }

    #[test]
    fn set_header_replaces_in_place() {
        let mut head = ResponseHead::new();
        head.set_header("Allow", "GET");
        head.set_header("Location", "/x/");
        head.set_header("Allow", "GET, HEAD");

        let entries: Vec<_> = head.headers().collect();
        assert_eq!(entries, vec![("Allow", "GET, HEAD"), ("Location", "/x/")]);
    }
}
