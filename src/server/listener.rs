//! HTTP-FLV server listener
//!
//! Accepts TCP connections, applies the connection limit and socket options,
//! and hands each connection to the relay router.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::serve::{Listener, ListenerExt};
use axum::Router;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::Result;
use crate::registry::StreamRegistry;
use crate::server::config::ServerConfig;
use crate::server::routes;
use crate::session::SessionContext;

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// HTTP-FLV relay server
pub struct FlvServer {
    ctx: SessionContext,
}

impl FlvServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry(config, Arc::new(StreamRegistry::new()))
    }

    /// Create a server sharing an existing registry
    pub fn with_registry(config: ServerConfig, registry: Arc<StreamRegistry>) -> Self {
        Self {
            ctx: SessionContext::new(registry, Arc::new(config)),
        }
    }

    /// Get a reference to the stream registry
    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.ctx.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.ctx.config
    }

    /// Relay routes, for mounting into a larger application
    pub fn router(&self) -> Router {
        routes::router(self.ctx.clone())
    }

    /// Run the server
    ///
    /// This method only returns if the listener fails to bind.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.ctx.config.bind_addr).await?;
        tracing::info!(addr = %self.ctx.config.bind_addr, "HTTP-FLV server listening");

        self.serve_until(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// On shutdown every live session is stopped, which ends open player
    /// streams and uploads so the connections can drain.
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = RelayListener::new(listener, &self.ctx.config).tap_io(|_: &mut Connection| {});
        let registry = Arc::clone(&self.ctx.registry);
        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("Shutdown signal received");
                for session in registry.live_sessions() {
                    session.stop();
                }
            })
            .await?;

        Ok(())
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.ctx.config.bind_addr
    }
}

/// TCP listener enforcing `max_connections` and `tcp_nodelay`
struct RelayListener {
    inner: TcpListener,
    connection_semaphore: Option<Arc<Semaphore>>,
    tcp_nodelay: bool,
}

impl RelayListener {
    fn new(inner: TcpListener, config: &ServerConfig) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            inner,
            connection_semaphore,
            tcp_nodelay: config.tcp_nodelay,
        }
    }
}

impl Listener for RelayListener {
    type Io = Connection;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            let (socket, peer_addr) = match self.inner.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            // Check connection limit
            let permit = match &self.connection_semaphore {
                Some(sem) => match Arc::clone(sem).try_acquire_owned() {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                        continue;
                    }
                },
                None => None,
            };

            if self.tcp_nodelay {
                if let Err(e) = socket.set_nodelay(true) {
                    tracing::error!(error = %e, "Failed to configure socket");
                    continue;
                }
            }

            tracing::debug!(peer = %peer_addr, "New connection");
            return (
                Connection {
                    socket,
                    _permit: permit,
                },
                peer_addr,
            );
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

/// Accepted socket holding its connection permit until it is dropped
struct Connection {
    socket: TcpStream,
    _permit: Option<OwnedSemaphorePermit>,
}

impl AsyncRead for Connection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.socket).poll_read(cx, buf)
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.socket).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.socket).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.socket.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.socket).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.socket).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_connection_limit() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut listener =
            RelayListener::new(listener, &ServerConfig::default().max_connections(1));

        let _first = TcpStream::connect(addr).await.unwrap();
        let (held, _) = listener.accept().await;

        // Over the limit: accepted and closed right away
        let mut second = TcpStream::connect(addr).await.unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.1 });

        let mut buf = [0u8; 1];
        let n = tokio::time::timeout(Duration::from_secs(2), second.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);

        // A freed permit lets the next connection through
        drop(held);
        let third = TcpStream::connect(addr).await.unwrap();
        let peer = tokio::time::timeout(Duration::from_secs(2), accept)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(peer, third.local_addr().unwrap());
    }
}
