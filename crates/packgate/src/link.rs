//! WebSocket host links using `tokio-tungstenite`.
//!
//! A host link is the connection from one proxy plugin to packgate.
//! [`LinkListener`] accepts the TCP side; [`HostLink::upgrade`] performs
//! the WebSocket upgrade, which the server does inside the link's own
//! task so a slow host can't stall the accept loop.
//!
//! A link is split into a [`LinkSender`] and a [`LinkReceiver`] so the
//! writer task and the read loop never contend for a lock.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::LinkError;

/// Counter for generating unique link IDs.
static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<TcpStream>;

/// Opaque identifier for a host link, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(u64);

impl LinkId {
    fn next() -> Self {
        Self(NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// LinkListener
// ---------------------------------------------------------------------------

/// Listens for incoming host links.
pub struct LinkListener {
    listener: TcpListener,
}

impl LinkListener {
    /// Binds to the given address. Port 0 picks a free port.
    pub async fn bind(addr: &str) -> Result<Self, LinkError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(LinkError::AcceptFailed)?;
        tracing::info!(addr, "host bridge listening");
        Ok(Self { listener })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for the next TCP connection. The WebSocket upgrade is left
    /// to [`HostLink::upgrade`].
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), LinkError> {
        self.listener.accept().await.map_err(LinkError::AcceptFailed)
    }
}

// ---------------------------------------------------------------------------
// HostLink
// ---------------------------------------------------------------------------

/// An upgraded WebSocket link to one proxy plugin.
pub struct HostLink {
    id: LinkId,
    addr: SocketAddr,
    ws: WsStream,
}

impl HostLink {
    /// Performs the WebSocket upgrade on an accepted TCP stream.
    pub async fn upgrade(stream: TcpStream, addr: SocketAddr) -> Result<Self, LinkError> {
        let ws = tokio_tungstenite::accept_async(stream).await.map_err(|e| {
            LinkError::AcceptFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                e,
            ))
        })?;

        let id = LinkId::next();
        tracing::debug!(%id, %addr, "accepted host link");
        Ok(Self { id, addr, ws })
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Splits the link into independently owned halves.
    pub fn split(self) -> (LinkSender, LinkReceiver) {
        let (sink, stream) = self.ws.split();
        (LinkSender { sink }, LinkReceiver { stream })
    }
}

/// The sending half of a host link.
pub struct LinkSender {
    sink: SplitSink<WsStream, Message>,
}

impl LinkSender {
    /// Sends one encoded frame as a text message.
    pub async fn send(&mut self, data: Vec<u8>) -> Result<(), LinkError> {
        let text = String::from_utf8(data).map_err(|e| {
            LinkError::SendFailed(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| {
                LinkError::SendFailed(std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))
            })
    }

    /// Sends a close frame.
    pub async fn close(&mut self) -> Result<(), LinkError> {
        self.sink.close().await.map_err(|e| {
            LinkError::SendFailed(std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))
        })
    }
}

/// The receiving half of a host link.
pub struct LinkReceiver {
    stream: SplitStream<WsStream>,
}

impl LinkReceiver {
    /// Receives the next data frame, text or binary.
    ///
    /// Returns `Ok(None)` when the link is cleanly closed.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, LinkError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_bytes().to_vec())),
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/frame
                Some(Err(e)) => {
                    return Err(LinkError::ReceiveFailed(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_id_display() {
        assert_eq!(LinkId(7).to_string(), "link-7");
    }

    #[test]
    fn test_link_id_next_is_unique() {
        let a = LinkId::next();
        let b = LinkId::next();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_bind_port_zero_reports_real_port() {
        let listener = LinkListener::bind("127.0.0.1:0").await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }
}
