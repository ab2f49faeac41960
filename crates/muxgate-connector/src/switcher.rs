//! Transport switcher: sniffs the first bytes of every accepted socket and
//! routes it to the raw-TCP or WebSocket sub-processor.
//!
//! Classification reads a single chunk. If it starts with an HTTP method
//! name the socket is treated as a WebSocket upgrade request; anything else
//! is raw TCP. Either way the sniffed bytes are replayed to the chosen
//! sub-processor, so no client byte is lost.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ConnectorConfig;
use crate::processor::{TcpProcessor, WsProcessor};
use crate::transport::MuxStream;

/// HTTP request lines start with one of these method names.
const HTTP_METHODS: [&str; 5] = ["GET", "POST", "DELETE", "PUT", "HEAD"];

/// How much of the first chunk is examined for classification.
const SNIFF_LEN: usize = 4;

const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// A classified connection ready for the protocol layer.
pub struct Accepted {
    pub stream: MuxStream<TcpStream>,
    pub peer: SocketAddr,
}

/// Owns the accept loop and both sub-processors.
pub struct Switcher {
    running: Arc<AtomicBool>,
    classify_timeout: Duration,
    set_no_delay: bool,
    tcp: Arc<TcpProcessor>,
    ws: Arc<WsProcessor>,
}

/// True when the chunk opens like an HTTP request line. Only the first
/// [`SNIFF_LEN`] bytes are examined; "DELE" is enough to identify DELETE.
pub fn is_http(first: &[u8]) -> bool {
    let head = match std::str::from_utf8(&first[..first.len().min(SNIFF_LEN)]) {
        Ok(head) => head,
        Err(_) => return false,
    };
    HTTP_METHODS.iter().any(|method| {
        head.starts_with(method) || (head.len() == SNIFF_LEN && method.starts_with(head))
    })
}

impl Switcher {
    pub fn new(config: &ConnectorConfig) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            classify_timeout: config.heartbeat(),
            set_no_delay: config.set_no_delay,
            tcp: Arc::new(TcpProcessor::new()),
            ws: Arc::new(WsProcessor::new()),
        }
    }

    /// Stops the accept loop and both sub-processors. Sockets still waiting
    /// for their first bytes are dropped. Safe to call more than once.
    pub fn close(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("switcher closing");
        }
        self.tcp.close();
        self.ws.close();
    }

    /// Accept loop. Each socket gets its own classification task so a silent
    /// client cannot stall the listener. Returns when [`close`](Self::close)
    /// is called.
    pub async fn run(self: Arc<Self>, listener: TcpListener, accepted: mpsc::Sender<Accepted>) {
        info!("switcher accepting connections");
        while self.running.load(Ordering::SeqCst) {
            let (socket, peer) =
                match tokio::time::timeout(ACCEPT_POLL, listener.accept()).await {
                    Ok(Ok(pair)) => pair,
                    Ok(Err(e)) => {
                        warn!("accept failed: {e}");
                        continue;
                    }
                    // idle poll tick, re-check the running flag
                    Err(_) => continue,
                };
            debug!(%peer, "socket accepted");
            tokio::spawn(Arc::clone(&self).classify(socket, peer, accepted.clone()));
        }
        info!("switcher stopped");
    }

    /// Reads the first chunk (bounded by the idle deadline), classifies the
    /// socket, and hands it to the matching sub-processor.
    async fn classify(
        self: Arc<Self>,
        mut socket: TcpStream,
        peer: SocketAddr,
        accepted: mpsc::Sender<Accepted>,
    ) {
        let mut buf = [0u8; 4096];
        let n = match tokio::time::timeout(self.classify_timeout, socket.read(&mut buf)).await {
            Ok(Ok(0)) => {
                debug!(%peer, "socket closed before first bytes");
                return;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                warn!(%peer, "read failed before classification: {e}");
                return;
            }
            Err(_) => {
                warn!(%peer, "no data before classify deadline, dropping socket");
                return;
            }
        };
        let first = buf[..n].to_vec();

        if !self.running.load(Ordering::SeqCst) {
            debug!(%peer, "switcher closed during classification, dropping socket");
            return;
        }

        let stream = if is_http(&first) {
            debug!(%peer, "classified as websocket upgrade");
            match self.ws.add(socket, first).await {
                Some(stream) => stream,
                None => return,
            }
        } else {
            debug!(%peer, "classified as raw tcp");
            if self.set_no_delay {
                if let Err(e) = socket.set_nodelay(true) {
                    warn!(%peer, "set_nodelay failed: {e}");
                }
            }
            match self.tcp.add(socket, first) {
                Some(stream) => stream,
                None => return,
            }
        };

        if accepted.send(Accepted { stream, peer }).await.is_err() {
            debug!(%peer, "connection consumer gone, dropping socket");
        }
    }
}
