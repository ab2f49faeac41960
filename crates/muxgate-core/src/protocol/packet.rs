//! Parsed control packets and the external packet-codec boundary.
//!
//! The gateway does not parse or serialize control packets itself: an
//! external [`PacketCodec`] turns the transport byte stream into the typed
//! packets below and typed acknowledgements back into bytes. These structs
//! are that boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by a packet codec while extracting packets from a stream.
#[derive(Debug, Error, PartialEq)]
pub enum PacketError {
    /// The buffered bytes cannot form a valid packet.
    #[error("malformed packet: {0}")]
    Malformed(String),

    /// The packet type byte is not a recognized value.
    #[error("unknown packet type: 0x{0:02X}")]
    UnknownType(u8),
}

/// CONNECT: opens the application-level session on a fresh transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectPacket {
    /// Client-chosen identifier, opaque to the gateway.
    pub client_id: String,
    /// Keep-alive interval requested by the client, in seconds.
    pub keep_alive: u16,
    /// Whether the client asked for a clean (non-resumed) session.
    pub clean_session: bool,
}

/// PUBLISH: carries an application payload toward the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishPacket {
    /// Per-client message identifier; used for PUBACK correlation.
    pub message_id: u16,
    /// Topic the payload was published on.
    pub topic: String,
    /// Raw payload bytes; interpretation happens in the adaptor.
    pub payload: Vec<u8>,
    /// Quality-of-service level (0 or 1).
    pub qos: u8,
}

/// A single requested subscription inside a SUBSCRIBE packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub topic: String,
    pub qos: u8,
}

/// SUBSCRIBE: requests one or more subscriptions; acknowledged by SUBACK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribePacket {
    /// Message identifier the later SUBACK must echo.
    pub message_id: u16,
    pub subscriptions: Vec<Subscription>,
}

/// All inbound (client → gateway) control packets the gateway reacts to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InboundPacket {
    Connect(ConnectPacket),
    Publish(PublishPacket),
    Subscribe(SubscribePacket),
    PingReq,
    Disconnect,
}

/// All outbound (gateway → client) control packets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutboundPacket {
    Connack {
        /// 0 = accepted; non-zero values are protocol-defined rejections.
        return_code: u8,
    },
    Puback {
        message_id: u16,
    },
    Suback {
        message_id: u16,
        /// Granted result produced by the router for the original subscribe.
        granted: serde_json::Value,
    },
    Pingresp,
    Publish(PublishPacket),
}

/// Byte-level packet parsing/serialization, supplied by the embedding
/// application.
///
/// `decode` is streaming: it consumes exactly one complete packet from the
/// front of `buf` when one is available, and returns `Ok(None)` when more
/// bytes are needed. Callers accumulate reads into `buf` and call `decode`
/// in a loop, the same way the transport read loop drains coalesced reads.
pub trait PacketCodec: Send + Sync {
    /// Serializes one outbound packet to wire bytes.
    fn encode(&self, packet: &OutboundPacket) -> Vec<u8>;

    /// Extracts the next complete packet from `buf`, draining its bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError`] when the buffered bytes are malformed; the
    /// connection treats that as a protocol violation.
    fn decode(&self, buf: &mut Vec<u8>) -> Result<Option<InboundPacket>, PacketError>;
}
