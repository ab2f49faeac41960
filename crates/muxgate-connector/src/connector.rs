//! Connector surface: listener setup, codec strategy selection, and the
//! stream of new connections handed to the embedding application.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::Context;
use muxgate_core::{
    CompressedCodec, MessageCodec, OutboundPacket, PacketCodec, PlainCodec, PublishPacket,
    RouteDictionary, SchemaRegistry, TopicPayload,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;

use crate::adaptor::{Adaptor, InboundRequest};
use crate::config::ConnectorConfig;
use crate::connection::{Connection, ConnectionHandle};
use crate::switcher::Switcher;

/// What the embedding application receives from a running connector.
pub enum ConnectorEvent {
    /// A classified connection finished setup. `requests` yields the
    /// decoded client requests; it closes when the connection does.
    Connection {
        handle: ConnectionHandle,
        requests: mpsc::UnboundedReceiver<InboundRequest>,
    },
}

/// The gateway front end. One instance per listening port.
pub struct Connector {
    host: String,
    port: u16,
    config: Arc<ConnectorConfig>,
    dictionary: Arc<dyn RouteDictionary>,
    schemas: Arc<dyn SchemaRegistry>,
    packets: Arc<dyn PacketCodec>,
    codec: Arc<dyn MessageCodec>,
    /// Kick notice packet bytes, composed once and shared by every
    /// connection.
    kick_payload: Arc<Vec<u8>>,
    switcher: Arc<Switcher>,
    running: AtomicBool,
    next_id: Arc<AtomicU32>,
}

impl Connector {
    /// Builds a connector. The codec strategy is fixed here: any enabled
    /// compression layer selects the envelope codec, otherwise plain text.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        config: ConnectorConfig,
        dictionary: Arc<dyn RouteDictionary>,
        schemas: Arc<dyn SchemaRegistry>,
        packets: Arc<dyn PacketCodec>,
    ) -> Self {
        let config = Arc::new(config);
        let codec: Arc<dyn MessageCodec> = if config.compression_enabled() {
            Arc::new(CompressedCodec::new(
                config.compression(),
                Arc::clone(&dictionary),
                Arc::clone(&schemas),
            ))
        } else {
            Arc::new(PlainCodec)
        };

        let kick = codec.compose_kick();
        let kick_payload = Arc::new(packets.encode(&OutboundPacket::Publish(PublishPacket {
            message_id: 0,
            topic: kick.topic.to_string(),
            payload: kick.payload,
            qos: 0,
        })));

        let switcher = Arc::new(Switcher::new(&config));

        Self {
            host: host.into(),
            port,
            config,
            dictionary,
            schemas,
            packets,
            codec,
            kick_payload,
            switcher,
            running: AtomicBool::new(false),
            next_id: Arc::new(AtomicU32::new(1)),
        }
    }

    /// Binds the listener and starts the switcher and connection tasks.
    /// Returns the stream of connector events.
    ///
    /// # Errors
    ///
    /// Fails when the listen address cannot be bound.
    pub async fn start(&self) -> anyhow::Result<mpsc::Receiver<ConnectorEvent>> {
        let host = if self.config.distinct_host {
            self.host.as_str()
        } else {
            "0.0.0.0"
        };
        let listener = TcpListener::bind((host, self.port))
            .await
            .with_context(|| format!("failed to bind {}:{}", host, self.port))?;
        let addr: SocketAddr = listener
            .local_addr()
            .context("listener has no local address")?;
        info!(%addr, "connector listening");
        self.running.store(true, Ordering::SeqCst);

        let (accepted_tx, mut accepted_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(64);

        tokio::spawn(Arc::clone(&self.switcher).run(listener, accepted_tx));

        let config = Arc::clone(&self.config);
        let dictionary = Arc::clone(&self.dictionary);
        let schemas = Arc::clone(&self.schemas);
        let packets = Arc::clone(&self.packets);
        let codec = Arc::clone(&self.codec);
        let kick_payload = Arc::clone(&self.kick_payload);
        let next_id = Arc::clone(&self.next_id);
        tokio::spawn(async move {
            while let Some(accepted) = accepted_rx.recv().await {
                let id = next_id.fetch_add(1, Ordering::SeqCst);
                let adaptor = Adaptor::new(
                    Arc::clone(&config),
                    Arc::clone(&codec),
                    Arc::clone(&dictionary),
                    Arc::clone(&schemas),
                );
                let (handle, requests) = Connection::spawn(
                    id,
                    accepted.peer,
                    accepted.stream,
                    Arc::clone(&config),
                    adaptor,
                    Arc::clone(&packets),
                    Arc::clone(&codec),
                    Arc::clone(&kick_payload),
                );
                if event_tx
                    .send(ConnectorEvent::Connection { handle, requests })
                    .await
                    .is_err()
                {
                    // application stopped consuming, let the switcher's
                    // close path finish the rest
                    break;
                }
            }
        });

        Ok(event_rx)
    }

    /// Stops accepting new connections. With `force`, in-flight
    /// pre-classification sockets are dropped as well; established
    /// connections keep running until kicked or disconnected individually.
    pub fn stop(&self, force: bool) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!(force, "connector stopping");
        }
        self.switcher.close();
    }

    /// Alias for an unforced [`stop`](Self::stop).
    pub fn close(&self) {
        self.stop(false);
    }

    /// The message codec chosen at construction, for embedding applications
    /// that encode pushes up front and broadcast the bytes.
    pub fn codec(&self) -> &Arc<dyn MessageCodec> {
        &self.codec
    }

    /// The pre-composed kick notice as a topic payload.
    pub fn kick_notice(&self) -> TopicPayload {
        self.codec.compose_kick()
    }
}
