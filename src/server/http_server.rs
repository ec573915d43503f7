//! Listening socket, accept loop and shutdown coordination.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::buffer::BufferPool;
use crate::config::ServerOptions;
use crate::connection::HttpConnection;
use crate::handler::{Handler, UnavailableHandler};
use crate::protocol::HttpError;

/// A running HTTP server.
///
/// Bind with [`HttpServer::bind`]; the accept loop and every connection run
/// as background tasks. [`close`](HttpServer::close) stops accepting and
/// tells open connections to shut down; [`await_close`](HttpServer::await_close)
/// waits for them with a timeout.
pub struct HttpServer {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    tracker: TaskTracker,
    open_connections: Arc<AtomicUsize>,
}

impl HttpServer {
    pub async fn bind(addr: SocketAddr, options: ServerOptions, handler: Arc<dyn Handler>) -> io::Result<HttpServer> {
        let socket = Socket::new(
            if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 },
            Type::STREAM,
            Some(Protocol::TCP),
        )?;
        socket.set_reuse_address(options.reuse_address)?;
        socket.set_recv_buffer_size(options.rcv_buf)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(options.backlog)?;

        let listener = TcpListener::from_std(socket.into())?;
        let local_addr = listener.local_addr()?;

        let pool = Arc::new(BufferPool::with_capacity(options.buffer_cache_size / options.rcv_buf, options.rcv_buf));
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let open_connections = Arc::new(AtomicUsize::new(0));

        tracker.spawn(accept_loop(
            listener,
            options,
            pool,
            handler,
            cancel.clone(),
            tracker.clone(),
            open_connections.clone(),
        ));

        Ok(HttpServer { local_addr, cancel, tracker, open_connections })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of connections currently open.
    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::SeqCst)
    }

    /// Stop accepting and ask every open connection to shut down. Returns
    /// immediately; pair with [`await_close`](HttpServer::await_close).
    pub fn close(&self) {
        info!("closing server");
        self.cancel.cancel();
        self.tracker.close();
    }

    /// Wait for the accept loop and all connections to finish. `true` once
    /// everything terminated, `false` when the timeout was hit first.
    pub async fn await_close(&self, timeout: Duration) -> bool {
        time::timeout(timeout, self.tracker.wait()).await.is_ok()
    }
}

async fn accept_loop(
    listener: TcpListener,
    options: ServerOptions,
    pool: Arc<BufferPool>,
    handler: Arc<dyn Handler>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    open_connections: Arc<AtomicUsize>,
) {
    info!(addr = %listener.local_addr().map(|a| a.to_string()).unwrap_or_default(), "listening");

    loop {
        let (stream, remote_addr) = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            },
        };

        if let Err(e) = apply_socket_options(&stream, &options) {
            warn!(cause = %e, "failed to apply socket options");
        }

        // over the cap, the connection still gets served, but only with a 503
        let over_capacity = open_connections.fetch_add(1, Ordering::SeqCst) >= options.max_connections;
        let connection_handler: Arc<dyn Handler> = if over_capacity {
            debug!(client = %remote_addr, "connection cap reached, serving 503");
            Arc::new(UnavailableHandler)
        } else {
            handler.clone()
        };

        let connection = HttpConnection::new(stream, pool.clone(), &options, cancel.clone());
        let open_connections = open_connections.clone();
        tracker.spawn(async move {
            match connection.process(connection_handler).await {
                Ok(()) => trace!(client = %remote_addr, "connection finished"),
                Err(e @ (HttpError::Timeout | HttpError::PeerReset | HttpError::Shutdown)) => {
                    debug!(client = %remote_addr, cause = %e, "connection closed")
                }
                Err(e) => debug!(client = %remote_addr, cause = %e, "connection failed"),
            }
            open_connections.fetch_sub(1, Ordering::SeqCst);
        });
    }

    info!("listener closed");
}

fn apply_socket_options(stream: &TcpStream, options: &ServerOptions) -> io::Result<()> {
    stream.set_nodelay(options.no_delay)?;
    let socket = socket2::SockRef::from(stream);
    socket.set_keepalive(options.keep_alive)?;
    socket.set_send_buffer_size(options.snd_buf)?;
    Ok(())
}
