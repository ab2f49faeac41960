//! # muxgate-core
//!
//! Shared protocol layer for the muxgate gateway: the compact wire envelope,
//! the layered outbound message codec (route-dictionary compression,
//! schema-based body serialization, size-gated gzip), the route dictionary
//! and schema registry seams, and the parsed control-packet types exchanged
//! with the external packet codec.
//!
//! This crate is used by the connector and by anything that needs to speak
//! the wire format. It has zero dependencies on sockets or OS APIs.

pub mod protocol;
pub mod registry;
pub mod wire;

// Re-export the most-used types at the crate root so callers can write
// `muxgate_core::MessageCodec` instead of the full module path.
pub use protocol::constants::{
    CODE_ERROR, CODE_OK, DEFAULT_TOPIC, HANDSHAKE_ROUTE, HANDSHAKE_TOPIC, KICK_ROUTE,
};
pub use protocol::packet::{
    ConnectPacket, InboundPacket, OutboundPacket, PacketCodec, PacketError, PublishPacket,
    SubscribePacket, Subscription,
};
pub use registry::{
    EmptySchemas, RouteDictionary, SchemaError, SchemaRegistry, SchemaSide, StaticDictionary,
};
pub use wire::codec::{
    CodecError, CompressedCodec, CompressionConfig, DecodedMessage, MessageCodec, OutboundMessage,
    PlainCodec, TopicPayload, WireMessage,
};
pub use wire::envelope::{Envelope, MessageKind, RouteRef, WireError};
