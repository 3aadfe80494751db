//! Sequential TCP listener.
//!
//! Accepts one connection at a time and runs the connection handler to
//! completion before accepting the next. The listening socket is owned by
//! [`Listener`] and released when it is dropped.

use crate::config::Config;
use crate::error::BindError;
use crate::handler::{handle_connection, HandlerSettings};
use bytes::Bytes;
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Owns the listening socket and the handler settings.
pub struct Listener {
    listener: TcpListener,
    local_addr: SocketAddr,
    settings: HandlerSettings,
}

impl Listener {
    /// Resolve, bind and listen. Must be called inside a tokio runtime.
    pub fn bind(config: &Config) -> Result<Self, BindError> {
        let addr = resolve(&config.host, config.port)?;
        let socket_err = |source| BindError::Socket {
            addr: addr.to_string(),
            source,
        };

        let std_listener = create_listener(addr, config.backlog).map_err(socket_err)?;
        let listener = TcpListener::from_std(std_listener).map_err(socket_err)?;
        let local_addr = listener.local_addr().map_err(socket_err)?;

        info!(
            host = %config.host,
            port = local_addr.port(),
            "Server running on {}:{}...",
            config.host,
            local_addr.port()
        );

        Ok(Listener {
            listener,
            local_addr,
            settings: HandlerSettings {
                response: Bytes::from(config.response.clone()),
                chunk_size: config.chunk_size,
                read_timeout: config.read_timeout,
            },
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept and serve connections until `shutdown` resolves.
    ///
    /// Shutdown is only observed between connections. Returns the number of
    /// connections served.
    pub async fn run<F>(self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut served = 0u64;

        loop {
            let accepted = tokio::select! {
                _ = &mut shutdown => {
                    info!("Server shutdown requested");
                    break;
                }
                accepted = self.listener.accept() => accepted,
            };

            let (mut stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    continue;
                }
            };

            info!(peer = %peer, "Accepted connection");
            match handle_connection(&mut stream, &self.settings).await {
                Ok(stats) => {
                    debug!(
                        peer = %peer,
                        messages = stats.messages,
                        bytes = stats.bytes,
                        "Connection closed"
                    );
                }
                Err(e) => {
                    warn!(peer = %peer, error = %e, "Client handling error");
                }
            }
            drop(stream);
            served += 1;
        }

        debug!(addr = %self.local_addr, "Closing listening socket");
        served
    }
}

/// Resolve `(host, port)` to a bind address. An empty host binds all
/// IPv4 interfaces; otherwise an IPv4 result is preferred over IPv6.
fn resolve(host: &str, port: u16) -> Result<SocketAddr, BindError> {
    if host.is_empty() {
        return Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)));
    }

    let display = format!("{host}:{port}");
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| BindError::Resolve {
            addr: display.clone(),
            source,
        })?
        .collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or(BindError::NoAddress(display))
}

/// Create a TCP listener with SO_REUSEADDR so restarts survive TIME_WAIT.
fn create_listener(addr: SocketAddr, backlog: i32) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    Ok(socket.into())
}
