//! Incremental HTTP request-head decoder.
//!
//! The connection appends every network read to one accumulation buffer and
//! calls [`RequestDecoder::decode`] after each read:
//!
//! - `Ok(None)`: the header block is incomplete, read more
//! - `Ok(Some(head))`: a complete, valid head; any body prefix that arrived
//!   with it is left in the buffer
//! - `Err(ParseError::TooLargeHeader { .. })`: the header block overran the
//!   receive-buffer size, which doubles as the maximum header size
//! - `Err(_)`: malformed request
//!
//! The header block is tokenized with httparse; request-target normalization,
//! percent-decoding and validation follow on top.

use bytes::{Buf, BytesMut};
use tracing::trace;

use crate::ensure;
use crate::protocol::{HeaderMap, HttpVersion, ParseError, RequestHead};

const MAX_HEADER_NUM: usize = 64;

pub struct RequestDecoder {
    max_header_bytes: usize,
}

impl RequestDecoder {
    pub fn new(max_header_bytes: usize) -> Self {
        Self { max_header_bytes }
    }

    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RequestHead>, ParseError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut req = httparse::Request::new(&mut headers);

        let parsed = req.parse(src).map_err(|e| match e {
            httparse::Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            httparse::Error::Version => ParseError::InvalidVersion,
            e => ParseError::invalid_request(e.to_string()),
        })?;

        let offset = match parsed {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => {
                ensure!(src.len() < self.max_header_bytes, ParseError::too_large_header(src.len(), self.max_header_bytes));
                return Ok(None);
            }
        };
        trace!(header_size = offset, "parsed request header block");
        ensure!(offset <= self.max_header_bytes, ParseError::too_large_header(offset, self.max_header_bytes));

        let version = match req.version {
            Some(0) => HttpVersion::Http10,
            Some(1) => HttpVersion::Http11,
            _ => return Err(ParseError::InvalidVersion),
        };

        let method = req.method.ok_or_else(|| ParseError::invalid_request("missing method"))?.to_ascii_uppercase();
        let target = req.path.ok_or_else(|| ParseError::invalid_request("missing request-target"))?;
        let uri = normalize_target(target);
        let path = decode_path(&uri)?;

        let mut header_map = HeaderMap::new();
        for header in req.headers.iter() {
            let value = String::from_utf8_lossy(header.value);
            header_map.insert(header.name, value.trim());
        }

        if version == HttpVersion::Http11 && !header_map.contains("Host") {
            return Err(ParseError::MissingHost);
        }

        let content_length = match header_map.get("Content-Length") {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map_err(|_| ParseError::invalid_content_length(format!("value {value} is not a non-negative integer")))?,
            None => 0,
        };

        // release the header bytes, keeping any body prefix buffered
        src.advance(offset);

        let expect_continue = version == HttpVersion::Http11
            && content_length > 0
            && src.is_empty()
            && header_map.get("Expect") == Some("100-continue");

        Ok(Some(RequestHead::new(method, uri, path, version, header_map, content_length, expect_continue)))
    }
}

/// Normalize the request-target: strip a `scheme://authority` prefix through
/// the first `/` after the authority (defaulting to `/`), and force a
/// leading `/` otherwise.
fn normalize_target(target: &str) -> String {
    let mut uri = target.to_string();
    if let Some(scheme) = uri.find("://") {
        let authority = scheme + 3;
        uri = match uri[authority..].find('/') {
            Some(slash) => uri[authority + slash..].to_string(),
            None => "/".to_string(),
        };
    }
    if !uri.starts_with('/') {
        uri.insert(0, '/');
    }
    uri
}

/// The percent-decoded path component of the normalized target.
fn decode_path(uri: &str) -> Result<String, ParseError> {
    let end = uri.find(['?', '#']).unwrap_or(uri.len());
    let decoded = urlencoding::decode(&uri[..end])
        .map_err(|e| ParseError::invalid_request(format!("request-target is not valid utf-8: {e}")))?;
    Ok(decoded.into_owned())
}
