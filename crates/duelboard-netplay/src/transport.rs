//! Byte-stream transports.
//!
//! A transport opens exactly one reliable, ordered stream per session, either
//! by accepting one inbound connection or by connecting out. Everything above
//! this module sees only [`Connection`].

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

use duelboard_netproto::PeerId;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::error::LinkError;
use crate::session::{LinkInfo, LinkSide};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An open stream plus the identities of both ends.
pub struct Connection {
    pub reader: BoxReader,
    pub writer: BoxWriter,
    pub info: LinkInfo,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("info", &self.info).finish()
    }
}

/// A bound listener waiting for its single peer.
pub trait Acceptor: Send {
    /// Address a peer should connect to.
    fn local_addr(&self) -> String;

    /// Wait for one peer. The listener is released once this resolves.
    fn accept(self: Box<Self>) -> BoxFuture<'static, Result<Connection, LinkError>>;
}

/// Pluggable stream backend.
pub trait Transport: Send + Sync {
    /// Bind a listener advertised under `service`.
    fn listen<'a>(&'a self, service: &'a str)
    -> BoxFuture<'a, Result<Box<dyn Acceptor>, LinkError>>;

    /// Bind, then wait for one peer.
    fn listen_and_accept<'a>(
        &'a self,
        service: &'a str,
    ) -> BoxFuture<'a, Result<Connection, LinkError>> {
        Box::pin(async move { self.listen(service).await?.accept().await })
    }

    /// Open a stream to `address`.
    fn connect<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<Connection, LinkError>>;

    /// Stop any background peer discovery before connecting. Most
    /// transports have none.
    fn cancel_discovery(&self) {}

    /// Transport name for logging.
    fn name(&self) -> &'static str;
}

/// TCP transport. Peer identities are the socket addresses of each end.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    bind: SocketAddr,
}

impl TcpTransport {
    pub fn new(bind: SocketAddr) -> Self {
        Self { bind }
    }
}

struct TcpAcceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Acceptor for TcpAcceptor {
    fn local_addr(&self) -> String {
        self.local_addr.to_string()
    }

    fn accept(self: Box<Self>) -> BoxFuture<'static, Result<Connection, LinkError>> {
        Box::pin(async move {
            let (stream, peer) = self
                .listener
                .accept()
                .await
                .map_err(|e| LinkError::from_open(&e))?;
            debug!(%peer, "Accepted inbound stream");
            // Listener drops here; later connection attempts are refused.
            into_connection(stream, LinkSide::Listener)
        })
    }
}

impl Transport for TcpTransport {
    fn listen<'a>(
        &'a self,
        service: &'a str,
    ) -> BoxFuture<'a, Result<Box<dyn Acceptor>, LinkError>> {
        Box::pin(async move {
            let listener = TcpListener::bind(self.bind)
                .await
                .map_err(|e| LinkError::from_open(&e))?;
            let local_addr = listener
                .local_addr()
                .map_err(|e| LinkError::from_open(&e))?;
            info!(%service, %local_addr, "TCP listener bound");
            Ok(Box::new(TcpAcceptor {
                listener,
                local_addr,
            }) as Box<dyn Acceptor>)
        })
    }

    fn connect<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<Connection, LinkError>> {
        Box::pin(async move {
            let stream = TcpStream::connect(address)
                .await
                .map_err(|e| LinkError::from_open(&e))?;
            into_connection(stream, LinkSide::Initiator)
        })
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

fn into_connection(stream: TcpStream, side: LinkSide) -> Result<Connection, LinkError> {
    let _ = stream.set_nodelay(true);
    let local = stream.local_addr().map_err(|e| LinkError::from_open(&e))?;
    let remote = stream.peer_addr().map_err(|e| LinkError::from_open(&e))?;
    let info = LinkInfo {
        local_id: addr_id(local)?,
        remote_id: addr_id(remote)?,
        side,
    };
    let (read_half, write_half) = stream.into_split();
    Ok(Connection {
        reader: Box::new(read_half),
        writer: Box::new(write_half),
        info,
    })
}

fn addr_id(addr: SocketAddr) -> Result<PeerId, LinkError> {
    PeerId::new(addr.to_string()).map_err(|e| LinkError::PeerUnreachable(e.to_string()))
}
