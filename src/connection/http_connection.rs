//! Per-socket connection state machine.
//!
//! Each accepted socket is served by one task running [`HttpConnection::process`]:
//! read into a pooled buffer, feed the request decoder, dispatch the verdict
//! (handler, canned 400 or canned 413), then either reuse the connection for
//! the next request or close it, following the committed `Connection` value.
//! All I/O on the socket is sequential on this task, so there is never more
//! than one outstanding read or write.

use std::io::{self, IoSlice};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tokio_util::sync::CancellationToken;

use tracing::{debug, error, trace};

use crate::buffer::BufferPool;
use crate::codec::RequestDecoder;
use crate::config::ServerOptions;
use crate::connection::HttpContext;
use crate::handler::Handler;
use crate::protocol::{HandlerError, HttpError, RequestHead, SendError};
use crate::util;

pub struct HttpConnection {
    pub(crate) stream: TcpStream,
    // bytes received but not yet consumed: header accumulation while
    // parsing, then the body pre-buffer, then the start of the next
    // kept-alive request
    pub(crate) acc: BytesMut,
    pool: Arc<BufferPool>,
    pub(crate) timeout: Duration,
    pub(crate) max_connection_time: Duration,
    max_header_bytes: usize,
    pub(crate) started: Instant,
    cancel: CancellationToken,
}

impl HttpConnection {
    pub fn new(stream: TcpStream, pool: Arc<BufferPool>, options: &ServerOptions, cancel: CancellationToken) -> Self {
        Self {
            stream,
            acc: BytesMut::new(),
            pool,
            timeout: options.timeout,
            max_connection_time: options.max_connection_time,
            max_header_bytes: options.rcv_buf,
            started: Instant::now(),
            cancel,
        }
    }

    /// Serve requests on this socket until it closes. The socket is dropped
    /// (and thereby closed) on return.
    pub async fn process(mut self, handler: Arc<dyn Handler>) -> Result<(), HttpError> {
        let mut decoder = RequestDecoder::new(self.max_header_bytes);
        loop {
            let head = loop {
                match decoder.decode(&mut self.acc) {
                    Ok(Some(head)) => break head,
                    Ok(None) => {}
                    Err(e) => {
                        let mut context = HttpContext::new(&mut self, RequestHead::empty());
                        let send = if e.is_too_large() {
                            util::send_too_large(&mut context).await
                        } else {
                            util::send_bad_request(&mut context).await
                        };
                        if let Err(cause) = send {
                            debug!(cause = %cause, "failed to send request error response");
                        }
                        return Err(e.into());
                    }
                }

                let received = match self.recv().await {
                    Ok(received) => received,
                    Err(e) => return Err(self.classify(e)),
                };
                if received == 0 {
                    if self.acc.is_empty() {
                        trace!("connection closed by peer");
                        return Ok(());
                    }
                    return Err(HttpError::PeerReset);
                }
            };

            trace!(method = head.method(), path = head.path(), "dispatching request");
            let mut context = HttpContext::new(&mut self, head);

            match handler.handle(&mut context).await {
                Ok(()) => {}
                Err(HandlerError::Io { source }) => {
                    debug!(cause = %source, "handler transport error, closing connection");
                    return Err(SendError::io(source).into());
                }
                Err(e) => {
                    error!(cause = %e, "handler failed");
                    if !context.is_committed() {
                        if let Err(cause) = util::send_internal_server_error(&mut context).await {
                            debug!(cause = %cause, "failed to send 500 response");
                        }
                    }
                    return Ok(());
                }
            }

            // the commit/end-exactly-once contract is engine enforced
            if !context.is_ended() {
                context.end().await.map_err(|e| HttpError::from(SendError::io(e)))?;
            }

            let close = context.connection_close();
            if context.body_remaining() > 0 {
                if context.expects_100() {
                    // the client never got its 100, the remaining body may
                    // never arrive
                    return Ok(());
                }
                if let Err(cause) = context.skip_body().await {
                    debug!(cause = %cause, "failed to drain request body");
                    return Ok(());
                }
            }

            if close {
                return Ok(());
            }
        }
    }

    /// One pooled socket read appended to the accumulation buffer. Returns
    /// the number of bytes received, 0 when the peer closed the connection.
    pub(crate) async fn recv(&mut self) -> io::Result<usize> {
        let mut buffer = self.pool.checkout();
        let result = {
            let stream = &mut self.stream;
            let cancel = self.cancel.clone();
            tokio::select! {
                _ = cancel.cancelled() => Err(shutdown_error()),
                read = time::timeout(self.timeout, stream.read_buf(&mut *buffer)) => match read {
                    Ok(result) => result,
                    Err(_) => Err(io::Error::from(io::ErrorKind::TimedOut)),
                },
            }
        };
        if let Ok(received) = &result {
            self.acc.extend_from_slice(&buffer[..*received]);
        }
        self.pool.checkin(buffer);
        result
    }

    /// Write `head` and `body` to the socket as one gathered write when the
    /// transport supports it, retrying partial writes with the remaining
    /// slices until everything is flushed.
    pub(crate) async fn send_all(&mut self, mut head: &[u8], mut body: &[u8]) -> io::Result<()> {
        let timeout = self.timeout;
        let cancel = self.cancel.clone();
        let stream = &mut self.stream;
        let vectored = stream.is_write_vectored();

        while !head.is_empty() || !body.is_empty() {
            let write = async {
                if head.is_empty() {
                    stream.write(body).await
                } else if body.is_empty() || !vectored {
                    stream.write(head).await
                } else {
                    let slices = [IoSlice::new(head), IoSlice::new(body)];
                    stream.write_vectored(&slices).await
                }
            };
            let written = tokio::select! {
                _ = cancel.cancelled() => return Err(shutdown_error()),
                result = time::timeout(timeout, write) => match result {
                    Ok(result) => result?,
                    Err(_) => return Err(io::Error::from(io::ErrorKind::TimedOut)),
                },
            };
            if written == 0 {
                return Err(io::Error::from(io::ErrorKind::WriteZero));
            }
            let from_head = written.min(head.len());
            head = &head[from_head..];
            body = &body[written - from_head..];
        }
        Ok(())
    }

    fn classify(&self, e: io::Error) -> HttpError {
        if self.cancel.is_cancelled() {
            HttpError::Shutdown
        } else {
            match e.kind() {
                io::ErrorKind::TimedOut => HttpError::Timeout,
                io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => {
                    HttpError::PeerReset
                }
                _ => crate::protocol::ParseError::from(e).into(),
            }
        }
    }
}

fn shutdown_error() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "server is shutting down")
}
