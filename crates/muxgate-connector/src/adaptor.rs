//! Protocol adaptor: turns inbound control packets into router requests and
//! router messages back into outbound packets.
//!
//! Pure translation layer. Each method returns what the connection actor
//! should do; the adaptor itself never touches the transport, which keeps the
//! routing rules synchronously testable. One adaptor instance exists per
//! connection, so the pending-subscribe table dies with the connection.

use std::collections::HashMap;
use std::sync::Arc;

use muxgate_core::{
    CodecError, MessageCodec, OutboundMessage, OutboundPacket, PublishPacket, RouteDictionary,
    SchemaRegistry, SubscribePacket, CODE_OK, HANDSHAKE_ROUTE,
};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::config::ConnectorConfig;

/// A decoded client request on its way to the router.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundRequest {
    /// Correlation id the response must carry. 0 for fire-and-forget.
    pub id: u32,
    pub route: String,
    pub body: Value,
}

/// One step the connection actor performs on the adaptor's behalf.
#[derive(Debug)]
pub enum AdaptorAction {
    /// Forward the request to the router.
    Emit(InboundRequest),
    /// Write a control packet to the client.
    SendPacket(OutboundPacket),
    /// Tear the connection down.
    Disconnect { reason: &'static str },
}

/// Where a router message goes: back as a subscribe ack, or out as a push.
#[derive(Debug, PartialEq)]
pub enum PublishAction {
    Suback { message_id: u16, granted: Value },
    Push(OutboundMessage),
}

/// Shape of a publish payload when clients carry their own routes.
#[derive(Debug, serde::Deserialize)]
struct SelfRoutedPayload {
    #[serde(default)]
    id: Option<u32>,
    route: String,
    #[serde(default)]
    body: Value,
}

pub struct Adaptor {
    config: Arc<ConnectorConfig>,
    codec: Arc<dyn MessageCodec>,
    dictionary: Arc<dyn RouteDictionary>,
    schemas: Arc<dyn SchemaRegistry>,
    /// Subscribe requests awaiting their router response, by message id.
    pending_subscribes: HashMap<u16, SubscribePacket>,
}

impl Adaptor {
    pub fn new(
        config: Arc<ConnectorConfig>,
        codec: Arc<dyn MessageCodec>,
        dictionary: Arc<dyn RouteDictionary>,
        schemas: Arc<dyn SchemaRegistry>,
    ) -> Self {
        Self {
            config,
            codec,
            dictionary,
            schemas,
            pending_subscribes: HashMap::new(),
        }
    }

    /// Handles a non-handshake publish. The ack (when qos 1) is produced
    /// first and unconditionally; whether the payload yields a request is a
    /// separate matter.
    pub fn on_publish(&self, handshaken: bool, packet: &PublishPacket) -> Vec<AdaptorAction> {
        let mut actions = Vec::new();
        if packet.qos == 1 {
            actions.push(AdaptorAction::SendPacket(OutboundPacket::Puback {
                message_id: packet.message_id,
            }));
        }

        if self.config.strict_ready && !handshaken {
            warn!("publish before handshake, disconnecting");
            actions.push(AdaptorAction::Disconnect {
                reason: "client not ready",
            });
            return actions;
        }

        if self.config.self_defined_route {
            match serde_json::from_slice::<SelfRoutedPayload>(&packet.payload) {
                Ok(parsed) => actions.push(AdaptorAction::Emit(InboundRequest {
                    id: parsed.id.unwrap_or(u32::from(packet.message_id)),
                    route: parsed.route,
                    body: parsed.body,
                })),
                Err(e) => error!("self-routed publish payload rejected: {e}"),
            }
            return actions;
        }

        match &self.config.publish_route {
            Some(route) => {
                let body = match serde_json::from_slice(&packet.payload) {
                    Ok(body) => body,
                    Err(_) => Value::String(String::from_utf8_lossy(&packet.payload).into_owned()),
                };
                actions.push(AdaptorAction::Emit(InboundRequest {
                    id: u32::from(packet.message_id),
                    route: route.clone(),
                    body,
                }));
            }
            None => error!("no publish route configured, dropping publish"),
        }
        actions
    }

    /// Records the subscribe as pending and forwards it to the router. The
    /// router's response comes back through [`publish`](Self::publish) and is
    /// matched by message id.
    pub fn on_subscribe(&mut self, packet: &SubscribePacket) -> Vec<AdaptorAction> {
        let route = match &self.config.subscribe_route {
            Some(route) => route.clone(),
            None => {
                error!("no subscribe route configured, dropping subscribe");
                return Vec::new();
            }
        };
        debug!(
            message_id = packet.message_id,
            "subscribe pending router response"
        );
        self.pending_subscribes
            .insert(packet.message_id, packet.clone());
        vec![AdaptorAction::Emit(InboundRequest {
            id: u32::from(packet.message_id),
            route,
            body: json!({ "subscriptions": packet.subscriptions }),
        })]
    }

    /// Decodes a handshake payload and builds the response message. A
    /// reconnecting client gets a bare status; a fresh one also gets the
    /// route dictionary and schema descriptors so it can decode compressed
    /// traffic.
    ///
    /// # Errors
    ///
    /// Returns the codec error when the payload does not decode; the caller
    /// logs it and drops the packet.
    pub fn on_handshake(&self, payload: &[u8]) -> Result<OutboundMessage, CodecError> {
        let decoded = self.codec.decode(payload)?;

        let reconnect = decoded
            .body
            .get("reconnect")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let body = if reconnect {
            json!({ "code": CODE_OK })
        } else {
            json!({
                "code": CODE_OK,
                "dict": self.dictionary.entries(),
                "schemas": self.schemas.descriptors(),
            })
        };

        Ok(OutboundMessage {
            id: Some(decoded.id),
            route: Some(HANDSHAKE_ROUTE.to_string()),
            body,
        })
    }

    /// Routes a message from the router: a pending subscribe with the same
    /// id becomes its ack and leaves the table, everything else is a push.
    pub fn publish(&mut self, msg: OutboundMessage) -> PublishAction {
        if let Some(id) = msg.id {
            if let Ok(message_id) = u16::try_from(id) {
                if self.pending_subscribes.remove(&message_id).is_some() {
                    debug!(message_id, "subscribe acknowledged");
                    return PublishAction::Suback {
                        message_id,
                        granted: msg.body,
                    };
                }
            }
        }
        PublishAction::Push(msg)
    }
}
