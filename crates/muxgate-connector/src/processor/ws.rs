//! WebSocket sub-processor.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::accept_async;
use tracing::warn;

use crate::transport::{MuxStream, PrefixedStream, WsByteStream};

/// Upgrades classified HTTP sockets to WebSocket connections. Once closed it
/// refuses new sockets; established connections are unaffected.
#[derive(Debug, Default)]
pub struct WsProcessor {
    closed: AtomicBool,
}

impl WsProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the server side of the WebSocket upgrade over the socket, with
    /// the sniffed request bytes replayed so the handshake parser sees the
    /// full request. Returns `None` when closed or when the upgrade fails.
    pub async fn add<S>(&self, socket: S, first: Vec<u8>) -> Option<MuxStream<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if self.closed.load(Ordering::SeqCst) {
            warn!("ws processor closed, rejecting socket");
            return None;
        }
        match accept_async(PrefixedStream::new(socket, first)).await {
            Ok(ws) => Some(MuxStream::Ws(WsByteStream::new(ws))),
            Err(e) => {
                warn!("websocket upgrade failed: {e}");
                None
            }
        }
    }

    /// Stops accepting. Safe to call more than once.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
