//! The handler-facing side of a connection.
//!
//! An `HttpContext` exists for exactly one request/response exchange. It
//! exposes the parsed request head, an async pull-style body reader and the
//! response surface (status/header setters plus `write`/`end`). The status
//! line and headers are emitted exactly once, as a prefix of the first
//! transport write; after that commit only body bytes flow.

use std::io;

use bytes::{Buf, BytesMut};

use crate::codec::{connection_value, encode_prelude, CONTINUE_PRELUDE};
use crate::connection::HttpConnection;
use crate::protocol::{RequestHead, ResponseHead, Status};

pub struct HttpContext<'conn> {
    conn: &'conn mut HttpConnection,
    request: RequestHead,
    response: ResponseHead,
    committed: bool,
    ended: bool,
    close: bool,
    body_consumed: u64,
    pending_100: bool,
}

impl<'conn> HttpContext<'conn> {
    pub(crate) fn new(conn: &'conn mut HttpConnection, request: RequestHead) -> Self {
        let pending_100 = request.expect_continue();
        Self {
            conn,
            request,
            response: ResponseHead::new(),
            committed: false,
            ended: false,
            close: false,
            body_consumed: 0,
            pending_100,
        }
    }

    pub fn request(&self) -> &RequestHead {
        &self.request
    }

    pub fn set_status(&mut self, status: Status) -> &mut Self {
        self.response.set_status(status);
        self
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.response.set_header(name, value);
        self
    }

    /// True once the status line and headers have been handed to the
    /// transport.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub(crate) fn is_ended(&self) -> bool {
        self.ended
    }

    /// The `Connection` decision made at commit; only meaningful once the
    /// response has committed.
    pub(crate) fn connection_close(&self) -> bool {
        self.close
    }

    pub(crate) fn body_remaining(&self) -> u64 {
        self.request.content_length() - self.body_consumed
    }

    pub(crate) fn expects_100(&self) -> bool {
        self.pending_100
    }

    /// Read request body bytes into `dst`, returning the number copied or 0
    /// once the declared content length has been consumed.
    ///
    /// Bytes that arrived together with the header block are served first;
    /// after that the socket is read through the server's buffer pool. The
    /// first read that has to hit the socket sends the pending
    /// `100 Continue` when the client asked for one.
    pub async fn read_body(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        if dst.is_empty() {
            return Ok(0);
        }
        loop {
            let remaining = self.body_remaining();
            if remaining == 0 {
                return Ok(0);
            }
            if !self.conn.acc.is_empty() {
                let n = remaining.min(dst.len() as u64).min(self.conn.acc.len() as u64) as usize;
                dst[..n].copy_from_slice(&self.conn.acc[..n]);
                self.conn.acc.advance(n);
                self.body_consumed += n as u64;
                return Ok(n);
            }
            if self.pending_100 {
                self.pending_100 = false;
                self.conn.send_all(CONTINUE_PRELUDE, &[]).await?;
            }
            if self.conn.recv().await? == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection reset by peer"));
            }
        }
    }

    /// Write body bytes, committing the response first when necessary. The
    /// prelude and the first body buffer go out as one gathered write.
    pub async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if self.committed {
            self.conn.send_all(&[], data).await
        } else {
            let prelude = self.commit();
            self.conn.send_all(&prelude, data).await
        }
    }

    /// Finish the response. Without a prior `write` this emits the prelude
    /// alone. Calling `end` more than once is a no-op.
    pub async fn end(&mut self) -> io::Result<()> {
        if self.ended {
            return Ok(());
        }
        self.ended = true;
        if !self.committed {
            let prelude = self.commit();
            self.conn.send_all(&prelude, &[]).await?;
        }
        Ok(())
    }

    /// Consume whatever is left of the request body so a kept-alive
    /// connection starts the next request at a clean boundary.
    pub(crate) async fn skip_body(&mut self) -> io::Result<()> {
        loop {
            let remaining = self.body_remaining();
            if remaining == 0 {
                return Ok(());
            }
            if !self.conn.acc.is_empty() {
                let n = remaining.min(self.conn.acc.len() as u64) as usize;
                self.conn.acc.advance(n);
                self.body_consumed += n as u64;
                continue;
            }
            if self.conn.recv().await? == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection reset by peer"));
            }
        }
    }

    fn commit(&mut self) -> BytesMut {
        let connection = match self.response.header("Connection") {
            Some(value) => value.to_string(),
            None => connection_value(
                self.response.status(),
                self.conn.started.elapsed(),
                self.conn.max_connection_time,
                self.request.keep_alive(),
            )
            .to_string(),
        };
        self.close = connection != "keep-alive";
        self.committed = true;
        encode_prelude(&self.response, &connection)
    }
}
