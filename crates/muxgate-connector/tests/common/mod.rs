//! Shared test plumbing: a length-prefixed JSON packet codec standing in for
//! the external packet codec, and a connection actor wired to an in-memory
//! duplex pipe.

// not every test binary uses every helper
#![allow(dead_code)]

use std::sync::Arc;

use muxgate_core::{
    CompressedCodec, EmptySchemas, InboundPacket, MessageCodec, OutboundPacket, PacketCodec,
    PacketError, PlainCodec, PublishPacket, StaticDictionary,
};
use muxgate_connector::adaptor::{Adaptor, InboundRequest};
use muxgate_connector::config::ConnectorConfig;
use muxgate_connector::connection::{Connection, ConnectionHandle};
use muxgate_connector::transport::{MuxStream, PrefixedStream};
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::sync::mpsc;

/// Stub packet codec: every packet is a `u32` big-endian length prefix
/// followed by its JSON serialization. Trivially streaming, so coalesced and
/// split reads exercise the same paths a real codec would.
pub struct JsonPacketCodec;

impl PacketCodec for JsonPacketCodec {
    fn encode(&self, packet: &OutboundPacket) -> Vec<u8> {
        frame(&serde_json::to_vec(packet).expect("outbound packet serializes"))
    }

    fn decode(&self, buf: &mut Vec<u8>) -> Result<Option<InboundPacket>, PacketError> {
        let Some((body, consumed)) = next_frame(buf)? else {
            return Ok(None);
        };
        let packet = serde_json::from_slice(&body)
            .map_err(|e| PacketError::Malformed(e.to_string()))?;
        buf.drain(..consumed);
        Ok(Some(packet))
    }
}

pub fn frame(body: &[u8]) -> Vec<u8> {
    let mut out = (body.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(body);
    out
}

fn next_frame(buf: &[u8]) -> Result<Option<(Vec<u8>, usize)>, PacketError> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if buf.len() < 4 + len {
        return Ok(None);
    }
    Ok(Some((buf[4..4 + len].to_vec(), 4 + len)))
}

/// Serializes an inbound packet the way a test client sends it.
pub fn encode_inbound(packet: &InboundPacket) -> Vec<u8> {
    frame(&serde_json::to_vec(packet).expect("inbound packet serializes"))
}

/// The client side of a connection under test.
pub struct TestClient {
    pub stream: DuplexStream,
    buf: Vec<u8>,
}

impl TestClient {
    /// Reads until one complete outbound packet is available. `None` on EOF.
    pub async fn next_packet(&mut self) -> Option<OutboundPacket> {
        loop {
            if let Some((body, consumed)) = next_frame(&self.buf).expect("well-framed output") {
                self.buf.drain(..consumed);
                return Some(serde_json::from_slice(&body).expect("outbound packet parses"));
            }
            let mut chunk = [0u8; 1024];
            match self.stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return None,
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
            }
        }
    }

    /// True when the actor has shut the stream down.
    pub async fn at_eof(&mut self) -> bool {
        self.next_packet().await.is_none()
    }
}

/// A connection actor over an in-memory pipe, plus its client end.
pub struct TestConn {
    pub handle: ConnectionHandle,
    pub requests: mpsc::UnboundedReceiver<InboundRequest>,
    pub client: TestClient,
}

pub fn message_codec(config: &ConnectorConfig) -> Arc<dyn MessageCodec> {
    if config.compression_enabled() {
        Arc::new(CompressedCodec::new(
            config.compression(),
            Arc::new(StaticDictionary::empty()),
            Arc::new(EmptySchemas),
        ))
    } else {
        Arc::new(PlainCodec)
    }
}

/// Routes actor logs through the test harness; `RUST_LOG` filters as usual.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Spawns a connection actor the way the connector does, over a duplex pipe.
pub fn spawn_connection(config: ConnectorConfig) -> TestConn {
    init_tracing();
    let config = Arc::new(config);
    let codec = message_codec(&config);
    let packets: Arc<dyn PacketCodec> = Arc::new(JsonPacketCodec);

    let kick = codec.compose_kick();
    let kick_payload = Arc::new(packets.encode(&OutboundPacket::Publish(PublishPacket {
        message_id: 0,
        topic: kick.topic.to_string(),
        payload: kick.payload,
        qos: 0,
    })));

    let adaptor = Adaptor::new(
        Arc::clone(&config),
        Arc::clone(&codec),
        Arc::new(StaticDictionary::empty()),
        Arc::new(EmptySchemas),
    );

    let (client, server) = tokio::io::duplex(64 * 1024);
    let (handle, requests) = Connection::spawn(
        1,
        "127.0.0.1:9".parse().expect("literal addr"),
        MuxStream::Tcp(PrefixedStream::new(server, Vec::new())),
        config,
        adaptor,
        packets,
        codec,
        kick_payload,
    );

    TestConn {
        handle,
        requests,
        client: TestClient {
            stream: client,
            buf: Vec::new(),
        },
    }
}
