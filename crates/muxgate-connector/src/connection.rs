//! Per-connection actor.
//!
//! Each classified connection gets one task that owns its transport, its
//! lifecycle state, and its adaptor. The task multiplexes four inputs: bytes
//! from the peer, commands from [`ConnectionHandle`]s, and the heartbeat and
//! handshake deadlines. Deadlines are plain `Option<Instant>` fields
//! re-evaluated every loop turn, so rearming is an assignment and cancelling
//! is `None`; there are no timer handles to leak.

use std::net::SocketAddr;
use std::sync::Arc;

use muxgate_core::{
    InboundPacket, MessageCodec, OutboundMessage, OutboundPacket, PacketCodec, PublishPacket,
    TopicPayload, WireMessage, HANDSHAKE_TOPIC,
};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::adaptor::{Adaptor, AdaptorAction, InboundRequest, PublishAction};
use crate::config::ConnectorConfig;
use crate::lifecycle::{AttemptOutcome, Lifecycle, SendDisposition};
use crate::transport::MuxStream;

pub type ConnectionId = u32;

/// Commands a [`ConnectionHandle`] can issue to the actor.
#[derive(Debug)]
pub enum Command {
    Send(WireMessage),
    Kick,
    Disconnect,
}

/// Cheap clonable handle to one connection's actor.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer: SocketAddr,
    commands: mpsc::UnboundedSender<Command>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Queues a message for the send path. Returns false when the actor has
    /// already exited.
    pub fn send(&self, msg: WireMessage) -> bool {
        self.commands.send(Command::Send(msg)).is_ok()
    }

    /// Asks the actor to push the kick notice and stop serving the peer.
    pub fn kick(&self) -> bool {
        self.commands.send(Command::Kick).is_ok()
    }

    /// Asks the actor to tear the connection down.
    pub fn disconnect(&self) -> bool {
        self.commands.send(Command::Disconnect).is_ok()
    }
}

/// The actor state. Construct with [`Connection::spawn`].
pub struct Connection<S> {
    id: ConnectionId,
    peer: SocketAddr,
    stream: MuxStream<S>,
    config: Arc<ConnectorConfig>,
    lifecycle: Lifecycle,
    adaptor: Adaptor,
    packets: Arc<dyn PacketCodec>,
    codec: Arc<dyn MessageCodec>,
    /// Kick notice, packet-encoded once at connector start.
    kick_payload: Arc<Vec<u8>>,
    requests: mpsc::UnboundedSender<InboundRequest>,
    commands: mpsc::UnboundedReceiver<Command>,
    read_buf: Vec<u8>,
    heartbeat_deadline: Option<Instant>,
    handshake_deadline: Option<Instant>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Spawns the actor task. Returns the handle and the stream of decoded
    /// requests; the request channel closing signals the connection's end.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        id: ConnectionId,
        peer: SocketAddr,
        stream: MuxStream<S>,
        config: Arc<ConnectorConfig>,
        adaptor: Adaptor,
        packets: Arc<dyn PacketCodec>,
        codec: Arc<dyn MessageCodec>,
        kick_payload: Arc<Vec<u8>>,
    ) -> (ConnectionHandle, mpsc::UnboundedReceiver<InboundRequest>) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let connection = Connection {
            id,
            peer,
            stream,
            lifecycle: Lifecycle::new(config.handshake_max_times),
            config,
            adaptor,
            packets,
            codec,
            kick_payload,
            requests: request_tx,
            commands: command_rx,
            read_buf: Vec::new(),
            heartbeat_deadline: None,
            handshake_deadline: None,
        };
        tokio::spawn(connection.run());

        (
            ConnectionHandle {
                id,
                peer,
                commands: command_tx,
            },
            request_rx,
        )
    }

    async fn run(mut self) {
        info!(id = self.id, peer = %self.peer, "connection started");
        // armed from the start so a classified-but-silent peer is reaped
        self.touch_heartbeat();
        let mut chunk = [0u8; 4096];

        while !self.lifecycle.is_closed() {
            let heartbeat = self.heartbeat_deadline;
            let handshake = self.handshake_deadline;

            tokio::select! {
                read = tokio::io::AsyncReadExt::read(&mut self.stream, &mut chunk) => {
                    match read {
                        Ok(0) => {
                            debug!(id = self.id, "peer closed the stream");
                            self.disconnect().await;
                        }
                        Ok(n) => {
                            self.read_buf.extend_from_slice(&chunk[..n]);
                            self.drain_packets().await;
                        }
                        Err(e) => {
                            warn!(id = self.id, "read failed: {e}");
                            self.disconnect().await;
                        }
                    }
                }
                Some(command) = self.commands.recv() => {
                    self.handle_command(command).await;
                }
                _ = tokio::time::sleep_until(heartbeat.unwrap_or_else(Instant::now)),
                        if heartbeat.is_some() => {
                    self.on_heartbeat_expired().await;
                }
                _ = tokio::time::sleep_until(handshake.unwrap_or_else(Instant::now)),
                        if handshake.is_some() => {
                    self.on_handshake_expired().await;
                }
            }
        }
        info!(id = self.id, peer = %self.peer, "connection closed");
    }

    /// Decodes and dispatches every complete packet in the read buffer.
    async fn drain_packets(&mut self) {
        loop {
            if self.lifecycle.is_closed() {
                return;
            }
            match self.packets.decode(&mut self.read_buf) {
                Ok(Some(packet)) => self.dispatch(packet).await,
                Ok(None) => return,
                Err(e) => {
                    warn!(id = self.id, "packet decode failed, disconnecting: {e}");
                    self.disconnect().await;
                    return;
                }
            }
        }
    }

    async fn dispatch(&mut self, packet: InboundPacket) {
        match packet {
            InboundPacket::Connect(connect) => {
                debug!(id = self.id, client_id = %connect.client_id, "connect");
                self.touch_heartbeat();
                if self.handshake_deadline.is_none() && !self.lifecycle.handshake_completed() {
                    self.handshake_deadline =
                        Some(Instant::now() + self.config.handshake_window());
                }
                self.write_packet(&OutboundPacket::Connack { return_code: 0 })
                    .await;
            }
            InboundPacket::PingReq => {
                self.touch_heartbeat();
                self.write_packet(&OutboundPacket::Pingresp).await;
            }
            InboundPacket::Publish(publish) => {
                self.touch_heartbeat();
                if publish.topic == HANDSHAKE_TOPIC {
                    self.handle_handshake(&publish).await;
                } else {
                    let handshaken = self.lifecycle.handshake_completed();
                    let actions = self.adaptor.on_publish(handshaken, &publish);
                    self.apply_actions(actions).await;
                }
            }
            InboundPacket::Subscribe(subscribe) => {
                self.touch_heartbeat();
                let actions = self.adaptor.on_subscribe(&subscribe);
                self.apply_actions(actions).await;
            }
            InboundPacket::Disconnect => {
                debug!(id = self.id, "peer requested disconnect");
                self.disconnect().await;
            }
        }
    }

    async fn handle_handshake(&mut self, publish: &PublishPacket) {
        if publish.qos == 1 {
            self.write_packet(&OutboundPacket::Puback {
                message_id: publish.message_id,
            })
            .await;
        }

        if self.lifecycle.register_handshake_attempt() == AttemptOutcome::LimitExceeded {
            error!(id = self.id, peer = %self.peer, "handshake attempt limit exceeded");
            self.disconnect().await;
            return;
        }
        if self.lifecycle.handshake_completed() {
            warn!(id = self.id, "handshake after completion ignored");
            return;
        }

        let response = match self.adaptor.on_handshake(&publish.payload) {
            Ok(response) => response,
            Err(e) => {
                error!(id = self.id, "handshake payload rejected: {e}");
                return;
            }
        };

        self.handshake_deadline = None;
        self.lifecycle.complete_handshake();
        info!(id = self.id, peer = %self.peer, "handshake completed");
        self.write_message(response).await;
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send(msg) => self.send(msg).await,
            Command::Kick => self.kick().await,
            Command::Disconnect => self.disconnect().await,
        }
    }

    /// The send path. Correlation is resolved first: a message answering a
    /// pending subscribe becomes its ack and is written in any live state.
    /// Everything else passes the lifecycle guard.
    async fn send(&mut self, msg: WireMessage) {
        let msg = match msg {
            WireMessage::Structured(msg) => match self.adaptor.publish(msg) {
                PublishAction::Suback {
                    message_id,
                    granted,
                } => {
                    if self.lifecycle.is_closed() {
                        error!(id = self.id, "subscribe ack on closed connection dropped");
                        return;
                    }
                    self.write_packet(&OutboundPacket::Suback {
                        message_id,
                        granted,
                    })
                    .await;
                    return;
                }
                PublishAction::Push(msg) => WireMessage::Structured(msg),
            },
            raw => raw,
        };

        match self.lifecycle.send_disposition() {
            SendDisposition::Dropped => {
                error!(id = self.id, "send on closed connection dropped");
            }
            SendDisposition::NotHandshaked => {
                warn!(id = self.id, "send before handshake rejected");
            }
            SendDisposition::Rekick => {
                debug!(id = self.id, "send to kicked connection, re-kicking");
                self.kick().await;
            }
            SendDisposition::Write => match msg {
                WireMessage::Raw(bytes) => self.write_bytes(&bytes).await,
                WireMessage::Structured(msg) => self.write_message(msg).await,
            },
        }
    }

    /// Writes the pre-built kick notice, bypassing the handshake guard, then
    /// leaves the connection waiting for the peer to hang up.
    async fn kick(&mut self) {
        if !self.lifecycle.begin_kick() {
            return;
        }
        info!(id = self.id, peer = %self.peer, "kicking");
        let payload = Arc::clone(&self.kick_payload);
        self.write_bytes(&payload).await;
        self.lifecycle.finish_kick();
    }

    /// Terminal teardown: first call shuts the transport down and drops the
    /// request channel side effects, later calls do nothing.
    async fn disconnect(&mut self) {
        if !self.lifecycle.close() {
            return;
        }
        self.heartbeat_deadline = None;
        self.handshake_deadline = None;
        if let Err(e) = self.stream.shutdown().await {
            debug!(id = self.id, "shutdown after close: {e}");
        }
    }

    async fn on_heartbeat_expired(&mut self) {
        if self.config.disconnect_on_timeout {
            info!(id = self.id, peer = %self.peer, "heartbeat timeout, disconnecting");
            self.disconnect().await;
        } else {
            debug!(id = self.id, "heartbeat timeout ignored");
            self.touch_heartbeat();
        }
    }

    async fn on_handshake_expired(&mut self) {
        // one-shot either way
        self.handshake_deadline = None;
        if self.config.disconnect_on_timeout {
            info!(id = self.id, peer = %self.peer, "handshake timeout, disconnecting");
            self.disconnect().await;
        } else {
            debug!(id = self.id, "handshake timeout ignored");
        }
    }

    /// Pushes the heartbeat deadline forward. Called on every qualifying
    /// inbound packet.
    fn touch_heartbeat(&mut self) {
        self.heartbeat_deadline = Some(Instant::now() + self.config.heartbeat());
    }

    async fn apply_actions(&mut self, actions: Vec<AdaptorAction>) {
        for action in actions {
            match action {
                AdaptorAction::Emit(request) => {
                    // receiver gone means the router stopped; the connection
                    // keeps serving acks until told otherwise
                    let _ = self.requests.send(request);
                }
                AdaptorAction::SendPacket(packet) => self.write_packet(&packet).await,
                AdaptorAction::Disconnect { reason } => {
                    warn!(id = self.id, reason, "adaptor requested disconnect");
                    self.disconnect().await;
                    return;
                }
            }
        }
    }

    /// Encodes a structured message with the wire codec and sends it as a
    /// publish packet. Encode failures drop the message, not the connection.
    async fn write_message(&mut self, msg: OutboundMessage) {
        let TopicPayload { topic, payload } = match self.codec.encode(&msg) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!(id = self.id, "message encode failed, dropped: {e}");
                return;
            }
        };
        self.write_packet(&OutboundPacket::Publish(PublishPacket {
            message_id: 0,
            topic: topic.to_string(),
            payload,
            qos: 0,
        }))
        .await;
    }

    async fn write_packet(&mut self, packet: &OutboundPacket) {
        let bytes = self.packets.encode(packet);
        self.write_bytes(&bytes).await;
    }

    /// Writes and flushes. The flush matters on the WebSocket transport,
    /// where frames sit in the sink until flushed.
    async fn write_bytes(&mut self, bytes: &[u8]) {
        let result = async {
            self.stream.write_all(bytes).await?;
            self.stream.flush().await
        }
        .await;
        if let Err(e) = result {
            warn!(id = self.id, "write failed: {e}");
            self.disconnect().await;
        }
    }
}
