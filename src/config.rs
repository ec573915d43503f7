//! Server and static-handler options, plus the `<name> <value>` pair
//! configuration surface.
//!
//! Every option can come from the command line (positional pairs) or from
//! the environment as `KSAH_<NAME>`; command-line values win. Unknown names
//! are ignored, malformed values are ignored with a warning, and each
//! setter applies the guard the option calls for.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub keep_alive: bool,
    pub no_delay: bool,
    pub reuse_address: bool,
    /// Receive buffer size; doubles as the maximum header size.
    pub rcv_buf: usize,
    pub snd_buf: usize,
    pub backlog: i32,
    /// Total bytes in the request-side buffer pool.
    pub buffer_cache_size: usize,
    /// Socket read/write timeout.
    pub timeout: Duration,
    /// Keep-alive budget per connection; zero disables keep-alive.
    pub max_connection_time: Duration,
    pub max_connections: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            keep_alive: true,
            no_delay: true,
            reuse_address: true,
            rcv_buf: 64 * 1024,
            snd_buf: 64 * 1024,
            backlog: 1024,
            buffer_cache_size: 16 * 1024 * 1024,
            timeout: Duration::from_secs(2),
            max_connection_time: Duration::from_millis(10_000),
            max_connections: 1024,
        }
    }
}

impl ServerOptions {
    /// Ignored unless larger than 1024.
    pub fn set_rcv_buf(&mut self, value: usize) {
        if value > 1024 {
            self.rcv_buf = value;
        }
    }

    /// Ignored unless larger than 1024.
    pub fn set_snd_buf(&mut self, value: usize) {
        if value > 1024 {
            self.snd_buf = value;
        }
    }

    /// Ignored unless positive.
    pub fn set_backlog(&mut self, value: i32) {
        if value > 0 {
            self.backlog = value;
        }
    }

    /// Rounded down to a power of two; anything below 1024 turns the pool off.
    pub fn set_buffer_cache_size(&mut self, value: usize) {
        self.buffer_cache_size = floor_pow2(value);
    }

    /// Ignored unless non-zero.
    pub fn set_timeout(&mut self, value: Duration) {
        if !value.is_zero() {
            self.timeout = value;
        }
    }

    pub fn set_max_connection_time(&mut self, millis: u64) {
        self.max_connection_time = Duration::from_millis(millis);
    }

    /// Ignored unless positive.
    pub fn set_max_connections(&mut self, value: usize) {
        if value > 0 {
            self.max_connections = value;
        }
    }
}

#[derive(Debug, Clone)]
pub struct StaticOptions {
    pub root: PathBuf,
    /// File transfer buffer size.
    pub buffer_size: usize,
    /// Total bytes in the file-side buffer pool.
    pub buffer_cache_size: usize,
    /// Charset appended to text, JSON and XHTML content types.
    pub charset: String,
    pub list: bool,
    pub write: bool,
}

impl Default for StaticOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("www"),
            buffer_size: 64 * 1024,
            buffer_cache_size: 16 * 1024 * 1024,
            charset: "UTF-8".to_string(),
            list: true,
            write: false,
        }
    }
}

impl StaticOptions {
    /// Ignored unless the path is a directory.
    pub fn set_root(&mut self, value: &Path) {
        if value.is_dir() {
            self.root = value.to_path_buf();
        }
    }

    /// Ignored below 1024.
    pub fn set_buffer_size(&mut self, value: usize) {
        if value >= 1024 {
            self.buffer_size = value;
        }
    }

    /// Rounded down to a power of two; anything below 1024 turns the pool off.
    pub fn set_buffer_cache_size(&mut self, value: usize) {
        self.buffer_cache_size = floor_pow2(value);
    }

    /// Normalizes the supplied name against the known charsets; unknown
    /// names keep the previous value.
    pub fn set_charset(&mut self, value: &str) {
        match normalize_charset(value) {
            Some(charset) => self.charset = charset.to_string(),
            None => warn!(charset = value, "unknown charset, keeping {}", self.charset),
        }
    }
}

fn floor_pow2(value: usize) -> usize {
    if value < 1024 {
        0
    } else {
        1usize << (usize::BITS - 1 - value.leading_zeros())
    }
}

fn normalize_charset(name: &str) -> Option<&'static str> {
    match name.to_ascii_uppercase().replace('_', "-").as_str() {
        "UTF-8" | "UTF8" => Some("UTF-8"),
        "US-ASCII" | "ASCII" | "ANSI-X3.4-1968" => Some("US-ASCII"),
        "ISO-8859-1" | "ISO8859-1" | "LATIN1" | "LATIN-1" => Some("ISO-8859-1"),
        "UTF-16" | "UTF16" => Some("UTF-16"),
        _ => None,
    }
}

/// `<integer> ":" <TIME_UNIT>`, unit names matching the usual executor time
/// units, case-insensitive.
fn parse_timeout(value: &str) -> Option<Duration> {
    let (number, unit) = value.split_once(':')?;
    let number: u64 = number.trim().parse().ok()?;
    let duration = match unit.trim().to_ascii_uppercase().as_str() {
        "NANOSECONDS" => Duration::from_nanos(number),
        "MICROSECONDS" => Duration::from_micros(number),
        "MILLISECONDS" => Duration::from_millis(number),
        "SECONDS" => Duration::from_secs(number),
        "MINUTES" => Duration::from_secs(number.checked_mul(60)?),
        "HOURS" => Duration::from_secs(number.checked_mul(3600)?),
        "DAYS" => Duration::from_secs(number.checked_mul(86_400)?),
        _ => return None,
    };
    Some(duration)
}

/// Collect positional `<name> <value>` pairs; `None` for an odd argument
/// count.
pub fn parse_pairs(args: &[String]) -> Option<HashMap<String, String>> {
    if args.len() % 2 != 0 {
        return None;
    }
    let mut pairs = HashMap::new();
    for pair in args.chunks(2) {
        pairs.insert(pair[0].clone(), pair[1].clone());
    }
    Some(pairs)
}

fn lookup(pairs: &HashMap<String, String>, name: &str) -> Option<String> {
    pairs
        .get(name)
        .cloned()
        .or_else(|| env::var(format!("KSAH_{}", name.to_uppercase())).ok())
        .filter(|value| !value.is_empty())
}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}

macro_rules! apply_number {
    ($pairs:expr, $name:literal, $type:ty, $apply:expr) => {
        if let Some(value) = lookup($pairs, $name) {
            match value.parse::<$type>() {
                Ok(parsed) => $apply(parsed),
                Err(_) => warn!(option = $name, value = %value, "ignoring malformed option value"),
            }
        }
    };
}

/// Server options from pairs plus environment.
pub fn server_options(pairs: &HashMap<String, String>) -> ServerOptions {
    let mut options = ServerOptions::default();

    if let Some(value) = lookup(pairs, "keepalive") {
        options.keep_alive = parse_bool(&value);
    }
    if let Some(value) = lookup(pairs, "nodelay") {
        options.no_delay = parse_bool(&value);
    }
    if let Some(value) = lookup(pairs, "reuseaddress") {
        options.reuse_address = parse_bool(&value);
    }
    apply_number!(pairs, "rcvbuf", usize, |v| options.set_rcv_buf(v));
    apply_number!(pairs, "sndbuf", usize, |v| options.set_snd_buf(v));
    apply_number!(pairs, "backlog", i32, |v| options.set_backlog(v));
    apply_number!(pairs, "buffercache", usize, |v| options.set_buffer_cache_size(v));
    apply_number!(pairs, "maxconnnections", usize, |v| options.set_max_connections(v));
    apply_number!(pairs, "maxconnectiontime", u64, |v| options.set_max_connection_time(v));
    if let Some(value) = lookup(pairs, "timeout") {
        match parse_timeout(&value) {
            Some(timeout) => options.set_timeout(timeout),
            None => warn!(option = "timeout", value = %value, "ignoring malformed option value"),
        }
    }

    options
}

/// Static-handler options from pairs plus environment.
pub fn static_options(pairs: &HashMap<String, String>) -> StaticOptions {
    let mut options = StaticOptions::default();

    if let Some(value) = lookup(pairs, "root") {
        options.set_root(Path::new(&value));
    }
    apply_number!(pairs, "bufferSize", usize, |v| options.set_buffer_size(v));
    apply_number!(pairs, "staticbuffercache", usize, |v| options.set_buffer_cache_size(v));
    if let Some(value) = lookup(pairs, "charset") {
        options.set_charset(&value);
    }
    if let Some(value) = lookup(pairs, "list") {
        options.list = parse_bool(&value);
    }
    if let Some(value) = lookup(pairs, "write") {
        options.write = parse_bool(&value);
    }

    options
}

/// The bind address: `port` is mandatory, `address` defaults to all
/// interfaces.
pub fn bind_address(pairs: &HashMap<String, String>) -> Option<String> {
    let port = lookup(pairs, "port")?;
    let address = lookup(pairs, "address").unwrap_or_else(|| "0.0.0.0".to_string());
    Some(format!("{address}:{port}"))
}

pub fn usage() -> String {
    let mut usage = String::from("\nksah [\"<option-name>\" \"<option-value>\"]\n\nOptions:\n");
    for (name, description) in [
        ("port", "\"<number>\" - The port to bind to (mandatory)."),
        ("address", "\"<interface>\" - The interface name to bind to (optional, default: \"0.0.0.0\")."),
        ("backlog", "\"<number>\" - The backlog size (optional, default: \"1024\")."),
        ("keepalive", "\"<boolean>\" - Set tcp keepalive (optional, default: \"true\")."),
        ("nodelay", "\"<boolean>\" - Set tcp nodelay (optional, default: \"true\")."),
        ("reuseaddress", "\"<boolean>\" - Set tcp reuseaddress (optional, default: \"true\")."),
        ("rcvbuf", "\"<number>\" - The size of the receive buffer which is also the max header size (optional, default: \"65536\")."),
        ("sndbuf", "\"<number>\" - The size of the send buffer (optional, default: \"65536\")."),
        ("buffercache", "\"<number>\" - The total size of pooled buffers used for receiving (optional, default: \"16777216\")."),
        ("timeout", "\"<number>:<unit>\" - The read/write timeout for a socket (optional, default: \"2:SECONDS\")."),
        ("maxconnnections", "\"<number>\" - The max number of concurrent connections (optional, default: \"1024\")."),
        ("maxconnectiontime", "\"<number>\" - The max time a connection is keep-alive in milliseconds, 0 for no keep-alive (optional, default: \"10000\")."),
        ("root", "\"<path>\" - The location of the web root (optional, default: \"./www\")."),
        ("bufferSize", "\"<number>\" - The size of the read file buffer (optional, default: \"65536\")."),
        ("staticbuffercache", "\"<number>\" - The total size of pooled buffers used for reading files (optional, default: \"16777216\")."),
        ("charset", "\"<encoding>\" - The charset send for text/ mime files (optional, default: \"UTF-8\")."),
        ("list", "\"<boolean>\" - Enable directory listings (optional, default: \"true\")."),
        ("write", "\"<boolean>\" - Enable writing via PUT and DELETE (optional, default: \"false\")."),
    ] {
        usage.push_str(name);
        usage.push(' ');
        usage.push_str(description);
        usage.push('\n');
    }
    usage
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries.iter().map(|(n, v)| (n.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults() {
        let options = ServerOptions::default();
        assert_eq!(options.rcv_buf, 65536);
        assert_eq!(options.backlog, 1024);
        assert_eq!(options.buffer_cache_size, 16 * 1024 * 1024);
        assert_eq!(options.timeout, Duration::from_secs(2));
        assert_eq!(options.max_connection_time, Duration::from_millis(10_000));
        assert_eq!(options.max_connections, 1024);

        let options = StaticOptions::default();
        assert_eq!(options.buffer_size, 65536);
        assert_eq!(options.charset, "UTF-8");
        assert!(options.list);
        assert!(!options.write);
    }

    #[test]
    fn guards_ignore_bad_values() {
        let mut options = ServerOptions::default();
        options.set_rcv_buf(512);
        assert_eq!(options.rcv_buf, 65536);
        options.set_backlog(0);
        options.set_backlog(-5);
        assert_eq!(options.backlog, 1024);
        options.set_max_connections(0);
        assert_eq!(options.max_connections, 1024);
        options.set_timeout(Duration::ZERO);
        assert_eq!(options.timeout, Duration::from_secs(2));

        let mut options = StaticOptions::default();
        options.set_buffer_size(100);
        assert_eq!(options.buffer_size, 65536);
        options.set_root(Path::new("/definitely/not/a/dir"));
        assert_eq!(options.root, PathBuf::from("www"));
    }

    #[test]
    fn buffer_cache_rounds_down_to_a_power_of_two() {
        assert_eq!(floor_pow2(16 * 1024 * 1024), 16 * 1024 * 1024);
        assert_eq!(floor_pow2(5000), 4096);
        assert_eq!(floor_pow2(1024), 1024);
        assert_eq!(floor_pow2(1023), 0);
        assert_eq!(floor_pow2(0), 0);
    }

    #[test]
    fn timeout_grammar() {
        assert_eq!(parse_timeout("2:SECONDS"), Some(Duration::from_secs(2)));
        assert_eq!(parse_timeout("500:MILLISECONDS"), Some(Duration::from_millis(500)));
        assert_eq!(parse_timeout("3:minutes"), Some(Duration::from_secs(180)));
        assert_eq!(parse_timeout("1:DAYS"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_timeout("2 : SECONDS"), Some(Duration::from_secs(2)));

        assert_eq!(parse_timeout("2"), None);
        assert_eq!(parse_timeout("two:SECONDS"), None);
        assert_eq!(parse_timeout("2:FORTNIGHTS"), None);
        assert_eq!(parse_timeout("-2:SECONDS"), None);
    }

    #[test]
    fn charset_normalization() {
        let mut options = StaticOptions::default();
        options.set_charset("utf8");
        assert_eq!(options.charset, "UTF-8");
        options.set_charset("iso-8859-1");
        assert_eq!(options.charset, "ISO-8859-1");
        options.set_charset("klingon-5");
        assert_eq!(options.charset, "ISO-8859-1");
    }

    #[test]
    fn pair_parsing() {
        let args: Vec<String> = ["port", "8080", "write", "true"].iter().map(|s| s.to_string()).collect();
        let parsed = parse_pairs(&args).unwrap();
        assert_eq!(parsed.get("port").map(String::as_str), Some("8080"));

        let odd: Vec<String> = ["port"].iter().map(|s| s.to_string()).collect();
        assert!(parse_pairs(&odd).is_none());
    }

    #[test]
    fn options_from_pairs() {
        let options = server_options(&pairs(&[
            ("rcvbuf", "2048"),
            ("timeout", "5:SECONDS"),
            ("maxconnectiontime", "0"),
            ("nodelay", "false"),
            ("unknown", "ignored"),
        ]));
        assert_eq!(options.rcv_buf, 2048);
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert_eq!(options.max_connection_time, Duration::ZERO);
        assert!(!options.no_delay);

        let options = static_options(&pairs(&[("write", "true"), ("list", "false"), ("bufferSize", "4096")]));
        assert!(options.write);
        assert!(!options.list);
        assert_eq!(options.buffer_size, 4096);
    }

    #[test]
    fn bind_address_requires_a_port() {
        assert_eq!(bind_address(&pairs(&[("port", "8080")])), Some("0.0.0.0:8080".to_string()));
        assert_eq!(bind_address(&pairs(&[("address", "127.0.0.1"), ("port", "80")])), Some("127.0.0.1:80".to_string()));
        assert_eq!(bind_address(&pairs(&[("address", "127.0.0.1")])), None);
    }
}
