//! Raw-TCP sub-processor.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::transport::{MuxStream, PrefixedStream};

/// Accepts classified raw-TCP sockets. Once closed it refuses new sockets;
/// connections already handed out are unaffected.
#[derive(Debug, Default)]
pub struct TcpProcessor {
    closed: AtomicBool,
}

impl TcpProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a classified socket so the sniffed bytes are replayed first.
    /// Returns `None` when the processor has been closed; the socket is
    /// dropped and with it the connection.
    pub fn add<S>(&self, socket: S, first: Vec<u8>) -> Option<MuxStream<S>> {
        if self.closed.load(Ordering::SeqCst) {
            warn!("tcp processor closed, rejecting socket");
            return None;
        }
        Some(MuxStream::Tcp(PrefixedStream::new(socket, first)))
    }

    /// Stops accepting. Safe to call more than once.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
