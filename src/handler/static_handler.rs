//! The reference static-file handler.
//!
//! Resolves request paths under a document root, serves files and directory
//! listings for GET/HEAD, answers OPTIONS, and (when writing is enabled)
//! accepts PUT and DELETE. File transfers in both directions go through the
//! handler's own buffer pool, one buffer per transfer.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, error, warn};

use crate::buffer::{BufferPool, PoolBuffer};
use crate::config::StaticOptions;
use crate::connection::HttpContext;
use crate::handler::Handler;
use crate::protocol::{HandlerError, RequestHead, Status};
use crate::util;

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

pub struct StaticHandler {
    root: PathBuf,
    pool: Arc<BufferPool>,
    charset: String,
    list: bool,
    write: bool,
}

impl StaticHandler {
    pub fn new(options: &StaticOptions) -> io::Result<Self> {
        let root = options.root.canonicalize()?;
        if !root.is_dir() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "root dir not found"));
        }
        let count = options.buffer_cache_size / options.buffer_size;
        Ok(Self {
            root,
            pool: Arc::new(BufferPool::with_capacity(count, options.buffer_size)),
            charset: options.charset.clone(),
            list: options.list,
            write: options.write,
        })
    }

    /// Join the decoded request path onto the root and resolve `.`/`..`
    /// lexically. `None` when the path would escape the root.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let mut resolved = self.root.clone();
        for component in Path::new(path).components() {
            match component {
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir => {
                    if resolved == self.root {
                        return None;
                    }
                    resolved.pop();
                }
                Component::Normal(segment) => resolved.push(segment),
                Component::Prefix(_) => return None,
            }
        }
        Some(resolved)
    }

    async fn do_get_or_head(&self, head: bool, path: PathBuf, context: &mut HttpContext<'_>) -> io::Result<()> {
        if !exists(&path).await {
            return util::send_not_found(context).await;
        }

        let mut path = path;
        if is_dir(&path).await {
            let index = path.join("index.html");
            if exists(&index).await {
                path = index;
            }
        }

        if is_dir(&path).await {
            if !self.list {
                util::send_forbidden(context).await
            } else if !context.request().path().ends_with('/') {
                let location = format!("{}/", context.request().uri());
                util::send_moved(&location, head, context).await
            } else {
                self.send_dir(context, &path, head).await
            }
        } else {
            self.send_file(context, &path, head).await
        }
    }

    async fn do_options(&self, path: PathBuf, context: &mut HttpContext<'_>) -> io::Result<()> {
        if !exists(&path).await {
            let parent_exists = match path.parent() {
                Some(parent) => exists(parent).await,
                None => false,
            };
            if !parent_exists {
                return util::send_not_found(context).await;
            }
            context.set_header("Allow", "PUT, OPTIONS").set_header("Content-Length", "0");
            return context.end().await;
        }

        let mut path = path;
        if is_dir(&path).await {
            let index = path.join("index.html");
            if exists(&index).await {
                path = index;
            }
        }

        if is_dir(&path).await {
            if !self.list {
                util::send_forbidden(context).await
            } else if !context.request().path().ends_with('/') {
                let location = format!("{}/", context.request().uri());
                util::send_moved(&location, false, context).await
            } else {
                context.set_header("Allow", "GET, HEAD, OPTIONS").set_header("Content-Length", "0");
                context.end().await
            }
        } else {
            context.set_header("Allow", "GET, HEAD, PUT, DELETE, OPTIONS").set_header("Content-Length", "0");
            context.end().await
        }
    }

    async fn do_put(&self, path: PathBuf, context: &mut HttpContext<'_>) -> io::Result<()> {
        let parent_is_dir = match path.parent() {
            Some(parent) => is_dir(parent).await,
            None => false,
        };
        if !parent_is_dir || is_dir(&path).await {
            return util::send_forbidden(context).await;
        }
        if is_unsupported_content(context.request()) {
            return util::send_not_implemented(context).await;
        }

        let size = context.request().content_length();
        let existed = exists(&path).await;

        // stream into a temporary sibling and rename on success, so a failed
        // request never corrupts an existing file
        let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, TMP_SEQ.fetch_add(1, Ordering::Relaxed)));

        let file = match fs::File::create(&tmp).await {
            Ok(file) => file,
            Err(e) => {
                error!(cause = %e, "failed to create upload file");
                return util::send_internal_server_error(context).await;
            }
        };

        let mut buffer = self.pool.checkout();
        buffer.resize(self.pool.buffer_size(), 0);
        let received = receive_body(context, file, size, &mut buffer).await;
        self.pool.checkin(buffer);

        let renamed = match received {
            Ok(()) => fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        match renamed {
            Ok(()) => {
                context
                    .set_status(if existed { Status::NO_CONTENT } else { Status::CREATED })
                    .set_header("Content-Length", "0");
                context.end().await
            }
            Err(e) => {
                warn!(cause = %e, "upload failed");
                if let Err(cause) = fs::remove_file(&tmp).await {
                    debug!(cause = %cause, "failed to remove upload temp file");
                }
                util::send_internal_server_error(context).await
            }
        }
    }

    async fn do_delete(&self, path: PathBuf, context: &mut HttpContext<'_>) -> io::Result<()> {
        if is_dir(&path).await {
            util::send_forbidden(context).await
        } else if !exists(&path).await {
            util::send_not_found(context).await
        } else {
            match fs::remove_file(&path).await {
                Ok(()) => {
                    context.set_status(Status::NO_CONTENT).set_header("Content-Length", "0");
                    context.end().await
                }
                Err(e) => {
                    error!(cause = %e, "failed to delete file");
                    util::send_internal_server_error(context).await
                }
            }
        }
    }

    async fn send_dir(&self, context: &mut HttpContext<'_>, path: &Path, head: bool) -> io::Result<()> {
        let content = match util::list_dir(path, &self.root).await {
            Ok(content) => content,
            Err(e) => {
                warn!(cause = %e, "failed to list directory");
                return util::send_internal_server_error(context).await;
            }
        };

        context
            .set_header("Content-Type", "text/html; charset=UTF-8")
            .set_header("Content-Length", &content.len().to_string());
        if !head {
            context.write(content.as_bytes()).await?;
        }
        context.end().await
    }

    async fn send_file(&self, context: &mut HttpContext<'_>, path: &Path, head: bool) -> io::Result<()> {
        let file = match fs::File::open(path).await {
            Ok(file) => file,
            Err(e) => {
                warn!(cause = %e, "failed to open file");
                return util::send_internal_server_error(context).await;
            }
        };
        let metadata = match file.metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(cause = %e, "failed to stat file");
                return util::send_internal_server_error(context).await;
            }
        };

        let size = metadata.len();
        let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        context
            .set_status(Status::OK)
            .set_header("Content-Type", &util::content_type(&file_name, &self.charset))
            .set_header("Content-Length", &size.to_string());
        if let Ok(modified) = metadata.modified() {
            context.set_header("Last-Modified", &util::format_date(modified));
        }

        if head || size == 0 {
            return context.end().await;
        }

        let mut buffer = self.pool.checkout();
        let result = stream_file(context, file, size, &mut buffer).await;
        self.pool.checkin(buffer);

        match result {
            Ok(()) => Ok(()),
            Err(e) if !context.is_committed() => {
                warn!(cause = %e, "failed to read file");
                util::send_internal_server_error(context).await
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Handler for StaticHandler {
    async fn handle(&self, context: &mut HttpContext<'_>) -> Result<(), HandlerError> {
        let request_path = context.request().path().to_string();
        let resolved = match self.resolve(&request_path) {
            Some(resolved) => resolved,
            None => {
                util::send_forbidden(context).await?;
                return Ok(());
            }
        };

        if request_path.ends_with('/') && !is_dir(&resolved).await {
            util::send_not_found(context).await?;
            return Ok(());
        }

        let method = context.request().method().to_string();
        match method.as_str() {
            "HEAD" => self.do_get_or_head(true, resolved, context).await?,
            "GET" => self.do_get_or_head(false, resolved, context).await?,
            "OPTIONS" => self.do_options(resolved, context).await?,
            "PUT" if self.write => self.do_put(resolved, context).await?,
            "DELETE" if self.write => self.do_delete(resolved, context).await?,
            _ => util::send_not_implemented(context).await?,
        }
        Ok(())
    }
}

async fn stream_file(context: &mut HttpContext<'_>, mut file: fs::File, size: u64, buffer: &mut PoolBuffer) -> io::Result<()> {
    let mut sent: u64 = 0;
    while sent < size {
        buffer.clear();
        let read = file.read_buf(&mut **buffer).await?;
        if read == 0 {
            warn!(sent, size, "file truncated while streaming");
            break;
        }
        let take = (read as u64).min(size - sent) as usize;
        context.write(&buffer[..take]).await?;
        sent += take as u64;
    }
    context.end().await
}

async fn receive_body(
    context: &mut HttpContext<'_>,
    mut file: fs::File,
    size: u64,
    buffer: &mut PoolBuffer,
) -> io::Result<()> {
    let mut received: u64 = 0;
    while received < size {
        let read = context.read_body(&mut buffer[..]).await?;
        if read == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "unexpected end of request body"));
        }
        file.write_all(&buffer[..read]).await?;
        received += read as u64;
    }
    file.flush().await
}

/// PUT supports no `Content-*` headers beyond length, type and an identity
/// encoding, and no transfer encoding other than identity.
fn is_unsupported_content(request: &RequestHead) -> bool {
    for (name, _) in request.headers().iter() {
        let lower = name.to_ascii_lowercase();
        if lower == "transfer-encoding" {
            let identity = request.header("Transfer-Encoding").map(|v| v.eq_ignore_ascii_case("identity")).unwrap_or(false);
            if !identity {
                return true;
            }
        } else if lower.starts_with("content-") && lower != "content-length" && lower != "content-type" {
            let identity = lower == "content-encoding"
                && request.header("Content-Encoding").map(|v| v.eq_ignore_ascii_case("identity")).unwrap_or(false);
            if !identity {
                return true;
            }
        }
    }
    false
}

async fn exists(path: &Path) -> bool {
    fs::metadata(path).await.is_ok()
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{HeaderMap, HttpVersion};

    fn handler_at(root: &str) -> StaticHandler {
        StaticHandler {
            root: PathBuf::from(root),
            pool: Arc::new(BufferPool::with_capacity(0, 1024)),
            charset: "UTF-8".to_string(),
            list: true,
            write: false,
        }
    }

    #[test]
    fn resolve_stays_inside_the_root() {
        let handler = handler_at("/srv/www");

        assert_eq!(handler.resolve("/a/b.txt"), Some(PathBuf::from("/srv/www/a/b.txt")));
        assert_eq!(handler.resolve("/"), Some(PathBuf::from("/srv/www")));
        assert_eq!(handler.resolve("/a/./b"), Some(PathBuf::from("/srv/www/a/b")));
        assert_eq!(handler.resolve("/a/../b"), Some(PathBuf::from("/srv/www/b")));
    }

    #[test]
    fn resolve_rejects_escapes() {
        let handler = handler_at("/srv/www");

        assert_eq!(handler.resolve("/.."), None);
        assert_eq!(handler.resolve("/../etc/passwd"), None);
        assert_eq!(handler.resolve("/a/../../etc/passwd"), None);
    }

    fn put_head(headers: &[(&str, &str)]) -> RequestHead {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(name, value);
        }
        RequestHead::new("PUT".into(), "/f".into(), "/f".into(), HttpVersion::Http11, map, 0, false)
    }

    #[test]
    fn content_header_support_for_put() {
        assert!(!is_unsupported_content(&put_head(&[("Content-Length", "5")])));
        assert!(!is_unsupported_content(&put_head(&[("Content-Length", "5"), ("Content-Type", "text/plain")])));
        assert!(!is_unsupported_content(&put_head(&[("Content-Encoding", "identity")])));
        assert!(!is_unsupported_content(&put_head(&[("Transfer-Encoding", "identity")])));

        assert!(is_unsupported_content(&put_head(&[("Content-Encoding", "gzip")])));
        assert!(is_unsupported_content(&put_head(&[("Content-Range", "bytes 0-1/2")])));
        assert!(is_unsupported_content(&put_head(&[("Transfer-Encoding", "chunked")])));
    }
}
