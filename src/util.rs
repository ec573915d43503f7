//! Stateless HTTP helpers: canned error responses, content-type sniffing,
//! date formatting, HTML/URL encoding and the directory-listing document.

use std::io;
use std::path::Path;
use std::time::SystemTime;

use tokio::fs;

use crate::connection::HttpContext;
use crate::protocol::Status;

/// The `Server` header value stamped on every response.
pub const SERVER_TOKEN: &str = concat!("ksah/", env!("CARGO_PKG_VERSION"));

pub async fn send_not_found(context: &mut HttpContext<'_>) -> io::Result<()> {
    send(Status::NOT_FOUND, "<!DOCTYPE html><html><body><h1>File Not Found</h1></body></html>", context).await
}

pub async fn send_moved(location: &str, head: bool, context: &mut HttpContext<'_>) -> io::Result<()> {
    let body = if head {
        String::new()
    } else {
        format!("<!DOCTYPE html><html><body><a href=\"{location}\">{location}</a></body></html>")
    };
    context.set_header("Location", location);
    send(Status::MOVED_PERMANENTLY, &body, context).await
}

pub async fn send_not_implemented(context: &mut HttpContext<'_>) -> io::Result<()> {
    send(Status::METHOD_NOT_ALLOWED, "<!DOCTYPE html><html><body><h1>Method Not Allowed</h1></body></html>", context)
        .await
}

pub async fn send_internal_server_error(context: &mut HttpContext<'_>) -> io::Result<()> {
    send(Status::INTERNAL_ERROR, "<!DOCTYPE html><html><body><h1>Internal Server Error</h1></body></html>", context)
        .await
}

pub async fn send_forbidden(context: &mut HttpContext<'_>) -> io::Result<()> {
    send(Status::FORBIDDEN, "<!DOCTYPE html><html><body><h1>Forbidden</h1></body></html>", context).await
}

pub async fn send_too_large(context: &mut HttpContext<'_>) -> io::Result<()> {
    send(Status::ENTITY_TOO_LARGE, "<!DOCTYPE html><html><body><h1>Request Entity Too Large</h1></body></html>", context)
        .await
}

pub async fn send_unavailable(context: &mut HttpContext<'_>) -> io::Result<()> {
    send(Status::UNAVAILABLE, "<!DOCTYPE html><html><body><h1>Service Unavailable</h1></body></html>", context).await
}

pub async fn send_bad_request(context: &mut HttpContext<'_>) -> io::Result<()> {
    send(Status::BAD_REQUEST, "<!DOCTYPE html><html><body><h1>Bad Request</h1></body></html>", context).await
}

async fn send(status: Status, body: &str, context: &mut HttpContext<'_>) -> io::Result<()> {
    context.set_status(status);
    context.set_header("Content-Type", "text/html; charset=UTF-8");
    context.set_header("Content-Length", &body.len().to_string());
    context.write(body.as_bytes()).await?;
    context.end().await
}

/// RFC-1123 GMT date, the format HTTP wants everywhere.
pub fn format_date(time: SystemTime) -> String {
    httpdate::fmt_http_date(time)
}

/// Map a file name to its content type, appending the configured charset
/// for text, JSON and XHTML types.
pub fn content_type(file_name: &str, charset: &str) -> String {
    let content_type = if file_name.ends_with(".html") {
        "text/html"
    } else if file_name.ends_with(".jpg") || file_name.ends_with(".jpeg") {
        "image/jpeg"
    } else if file_name.ends_with(".png") {
        "image/png"
    } else if file_name.ends_with(".pdf") {
        "application/pdf"
    } else if file_name.ends_with(".ps") {
        "application/postscript"
    } else if file_name.ends_with(".css") {
        "text/css"
    } else if file_name.ends_with(".js") {
        "application/javascript"
    } else if file_name.ends_with(".gif") {
        "image/gif"
    } else if file_name.ends_with(".swf") {
        "application/x-shockwave-flash"
    } else if file_name.ends_with(".txt") {
        "text/plain"
    } else if file_name.ends_with(".json") {
        "application/json"
    } else if file_name.ends_with(".xml") {
        "application/xhtml+xml"
    } else if file_name.ends_with(".properties") {
        "text/plain"
    } else {
        "application/octet-stream"
    };

    if content_type == "application/xhtml+xml" || content_type == "application/json" || content_type.starts_with("text/") {
        format!("{content_type}; charset={charset}")
    } else {
        content_type.to_string()
    }
}

/// HTML-escape a name: `"` `<` `>` `&` and anything beyond ASCII become
/// numeric character references.
pub fn encode_html(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c as u32 > 127 || matches!(c, '"' | '<' | '>' | '&') {
            out.push_str(&format!("&#{};", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

/// Percent-encode a name for use as a link target, keeping the RFC-3986
/// pchar set and `/` intact.
pub fn encode_url(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for &b in name.as_bytes() {
        if b.is_ascii_alphanumeric() || b"-._~!$&'()*+,;=:@/".contains(&b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// Build the directory-listing document for `path` under `root`.
pub async fn list_dir(path: &Path, root: &Path) -> io::Result<String> {
    let is_root = path == root;
    let title = if is_root {
        "/".to_string()
    } else {
        encode_html(&path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default())
    };

    let mut names = Vec::new();
    let mut dir = fs::read_dir(path).await?;
    while let Some(entry) = dir.next_entry().await? {
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().await?.is_dir() {
            name.push('/');
        }
        names.push(name);
    }
    names.sort();

    let mut document = String::from(
        "<!DOCTYPE html>\n\
         <html>\n    \
             <head>\n        \
                 <title>",
    );
    document.push_str(&title);
    document.push_str(
        "</title>\n        \
         <meta charset=\"UTF-8\">\n        \
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n    \
         </head>\n    \
         <body>\n        \
         <h1>",
    );
    document.push_str(&title);
    document.push_str("</h1>\n        <ul>\n            <li>");
    push_link(if is_root { "/" } else { ".." }, &mut document);
    document.push_str("</li>");

    for name in &names {
        document.push_str("\n            <li>");
        push_link(name, &mut document);
        document.push_str("</li>");
    }

    document.push_str("\n        </ul>\n    </body>\n</html>");

    Ok(document)
}

fn push_link(name: &str, document: &mut String) {
    document.push_str("<a href=\"");
    document.push_str(&encode_url(name));
    document.push_str("\">");
    document.push_str(&encode_html(name));
    document.push_str("</a>");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type("index.html", "UTF-8"), "text/html; charset=UTF-8");
        assert_eq!(content_type("a.txt", "UTF-8"), "text/plain; charset=UTF-8");
        assert_eq!(content_type("a.properties", "UTF-8"), "text/plain; charset=UTF-8");
        assert_eq!(content_type("data.json", "ISO-8859-1"), "application/json; charset=ISO-8859-1");
        assert_eq!(content_type("doc.xml", "UTF-8"), "application/xhtml+xml; charset=UTF-8");
        assert_eq!(content_type("pic.jpeg", "UTF-8"), "image/jpeg");
        assert_eq!(content_type("pic.png", "UTF-8"), "image/png");
        assert_eq!(content_type("movie.swf", "UTF-8"), "application/x-shockwave-flash");
        assert_eq!(content_type("unknown.bin", "UTF-8"), "application/octet-stream");
        assert_eq!(content_type("noextension", "UTF-8"), "application/octet-stream");
    }

    #[test]
    fn html_escaping_uses_numeric_references() {
        assert_eq!(encode_html("plain-name.txt"), "plain-name.txt");
        assert_eq!(encode_html("a<b>&\"c\""), "a&#60;b&#62;&#38;&#34;c&#34;");
        assert_eq!(encode_html("über"), "&#252;ber");
    }

    #[test]
    fn url_encoding_keeps_path_characters() {
        assert_eq!(encode_url("test.html"), "test.html");
        assert_eq!(encode_url("dir/"), "dir/");
        assert_eq!(encode_url("with space.txt"), "with%20space.txt");
        // UTF-8 bytes are encoded individually
        assert_eq!(encode_url("ü"), "%C3%BC");
    }

    #[tokio::test]
    async fn listing_document_shape() {
        let dir = std::env::temp_dir().join(format!("ksah-list-{}", std::process::id()));
        let sub = dir.join("sub");
        tokio::fs::create_dir_all(&sub).await.unwrap();
        tokio::fs::write(dir.join("test.html"), b"x").await.unwrap();

        let document = list_dir(&dir, &dir).await.unwrap();

        assert!(document.starts_with("<!DOCTYPE html>\n<html>\n    <head>\n        <title>/</title>"));
        assert!(document.contains("<h1>/</h1>"));
        assert!(document.contains("<li><a href=\"/\">/</a></li>"));
        assert!(document.contains("<li><a href=\"sub/\">sub/</a></li>"));
        assert!(document.contains("<li><a href=\"test.html\">test.html</a></li>"));
        // directories sort ahead of files here: "sub/" < "test.html"
        let sub_at = document.find("sub/").unwrap();
        let file_at = document.find("test.html").unwrap();
        assert!(sub_at < file_at);
        assert!(document.ends_with("\n        </ul>\n    </body>\n</html>"));

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
