//! Response prelude assembly.
//!
//! The status line and headers are emitted exactly once, as a prefix of the
//! first transport write. `Server`, `Connection` and `Date` are always
//! stamped by the engine; the no-cache defaults are injected unless the
//! handler overrode them.

use std::time::{Duration, SystemTime};

use bytes::{BufMut, BytesMut};

use crate::protocol::{ResponseHead, Status};
use crate::util::SERVER_TOKEN;

const INIT_PRELUDE_SIZE: usize = 1024;

/// The interstitial response sent when a client asked for `100 Continue`.
pub const CONTINUE_PRELUDE: &[u8] = b"HTTP/1.1 100 Continue\r\nContent-Length: 0\r\n\r\n";

/// Decide the `Connection` header value at commit time.
///
/// Error statuses that poison the stream close it, a connection past its
/// keep-alive budget closes regardless of the client's preference, and
/// otherwise the request-side rule applies. A zero budget therefore
/// disables keep-alive entirely.
pub fn connection_value(
    status: Status,
    connection_age: Duration,
    max_connection_time: Duration,
    request_keep_alive: bool,
) -> &'static str {
    let poisoned = matches!(status.code, 400 | 413 | 503);
    if poisoned || connection_age > max_connection_time || !request_keep_alive {
        "close"
    } else {
        "keep-alive"
    }
}

/// Build the full response prelude, using `connection` as the `Connection`
/// header value.
pub fn encode_prelude(head: &ResponseHead, connection: &str) -> BytesMut {
    let mut dst = BytesMut::with_capacity(INIT_PRELUDE_SIZE);

    dst.put_slice(b"HTTP/1.1 ");
    dst.put_slice(head.status().to_string().as_bytes());
    dst.put_slice(b"\r\n");

    put_header(&mut dst, "Server", SERVER_TOKEN);
    put_header(&mut dst, "Connection", connection);
    put_header(&mut dst, "Date", &httpdate::fmt_http_date(SystemTime::now()));

    if head.header("Cache-Control").is_none() {
        put_header(&mut dst, "Cache-Control", "no-cache, no-store, must-revalidate");
    }
    if head.header("Pragma").is_none() {
        put_header(&mut dst, "Pragma", "no-cache");
    }
    if head.header("Expires").is_none() {
        put_header(&mut dst, "Expires", "0");
    }

    for (name, value) in head.headers() {
        if matches!(name, "Server" | "Connection" | "Date") {
            continue;
        }
        put_header(&mut dst, name, value);
    }

    dst.put_slice(b"\r\n");
    dst
}

fn put_header(dst: &mut BytesMut, name: &str, value: &str) {
    dst.put_slice(name.as_bytes());
    dst.put_slice(b": ");
    dst.put_slice(value.as_bytes());
    dst.put_slice(b"\r\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(prelude: &BytesMut) -> Vec<String> {
        String::from_utf8(prelude.to_vec()).unwrap().split("\r\n").map(str::to_string).collect()
    }

    #[test]
    fn prelude_carries_the_required_headers() {
        let mut head = ResponseHead::new();
        head.set_header("Content-Length", "0");

        let prelude = encode_prelude(&head, "keep-alive");
        let lines = lines(&prelude);

        assert_eq!(lines[0], "HTTP/1.1 200 OK");
        assert!(lines.iter().any(|l| l == &format!("Server: {SERVER_TOKEN}")));
        assert!(lines.iter().any(|l| l == "Connection: keep-alive"));
        assert!(lines.iter().any(|l| l.starts_with("Date: ") && l.ends_with(" GMT")));
        assert!(lines.iter().any(|l| l == "Cache-Control: no-cache, no-store, must-revalidate"));
        assert!(lines.iter().any(|l| l == "Pragma: no-cache"));
        assert!(lines.iter().any(|l| l == "Expires: 0"));
        assert!(lines.iter().any(|l| l == "Content-Length: 0"));
        // header block terminator
        assert_eq!(&lines[lines.len() - 2..], &["".to_string(), "".to_string()]);
    }

    #[test]
    fn cache_defaults_yield_to_the_handler() {
        let mut head = ResponseHead::new();
        head.set_header("Cache-Control", "max-age=60");

        let prelude = encode_prelude(&head, "close");
        let lines = lines(&prelude);

        assert!(lines.iter().any(|l| l == "Cache-Control: max-age=60"));
        assert!(!lines.iter().any(|l| l.starts_with("Cache-Control: no-cache")));
        // the untouched defaults are still injected
        assert!(lines.iter().any(|l| l == "Pragma: no-cache"));
    }

    #[test]
    fn error_statuses_force_close() {
        let age = Duration::from_millis(1);
        let budget = Duration::from_secs(10);

        assert_eq!(connection_value(Status::BAD_REQUEST, age, budget, true), "close");
        assert_eq!(connection_value(Status::ENTITY_TOO_LARGE, age, budget, true), "close");
        assert_eq!(connection_value(Status::UNAVAILABLE, age, budget, true), "close");
        assert_eq!(connection_value(Status::NOT_FOUND, age, budget, true), "keep-alive");
    }

    #[test]
    fn exhausted_budget_forces_close() {
        let budget = Duration::from_millis(100);

        assert_eq!(connection_value(Status::OK, Duration::from_millis(101), budget, true), "close");
        assert_eq!(connection_value(Status::OK, Duration::from_millis(50), budget, true), "keep-alive");
        // a zero budget disables keep-alive
        assert_eq!(connection_value(Status::OK, Duration::from_nanos(1), Duration::ZERO, true), "close");
    }

    #[test]
    fn request_side_rule_applies_last() {
        let age = Duration::from_millis(1);
        let budget = Duration::from_secs(10);

        assert_eq!(connection_value(Status::OK, age, budget, false), "close");
        assert_eq!(connection_value(Status::OK, age, budget, true), "keep-alive");
    }
}
