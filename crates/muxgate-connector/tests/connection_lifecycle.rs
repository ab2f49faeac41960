//! End-to-end lifecycle behavior of the connection actor: handshake,
//! timeouts, kick semantics, and teardown idempotence.

mod common;

use std::time::Duration;

use muxgate_core::{
    ConnectPacket, InboundPacket, OutboundMessage, OutboundPacket, PublishPacket, WireMessage,
    CODE_OK,
};
use muxgate_connector::config::ConnectorConfig;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;

use common::{encode_inbound, spawn_connection};

fn connect() -> InboundPacket {
    InboundPacket::Connect(ConnectPacket {
        client_id: "test-client".to_string(),
        keep_alive: 60,
        clean_session: true,
    })
}

fn handshake_publish(id: u32, body: Value) -> InboundPacket {
    InboundPacket::Publish(PublishPacket {
        message_id: 1,
        topic: "hak".to_string(),
        payload: serde_json::to_vec(&json!({
            "id": id,
            "route": "doHandshake",
            "body": body,
        }))
        .unwrap(),
        qos: 0,
    })
}

fn push(route: &str, body: Value) -> WireMessage {
    WireMessage::Structured(OutboundMessage {
        id: None,
        route: Some(route.to_string()),
        body,
    })
}

fn payload_json(packet: &OutboundPacket) -> Value {
    match packet {
        OutboundPacket::Publish(publish) => serde_json::from_slice(&publish.payload).unwrap(),
        other => panic!("expected publish, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handshake_reaches_working_and_enables_pushes() {
    let mut conn = spawn_connection(ConnectorConfig::default());

    conn.client
        .stream
        .write_all(&encode_inbound(&connect()))
        .await
        .unwrap();
    assert_eq!(
        conn.client.next_packet().await,
        Some(OutboundPacket::Connack { return_code: 0 })
    );

    conn.client
        .stream
        .write_all(&encode_inbound(&handshake_publish(1, json!({}))))
        .await
        .unwrap();
    let response = payload_json(&conn.client.next_packet().await.unwrap());
    assert_eq!(response["id"], 1);
    assert_eq!(response["route"], "doHandshake");
    assert_eq!(response["body"]["code"], json!(CODE_OK));
    assert!(response["body"].get("dict").is_some());

    // before the handshake this would be rejected; now it flows
    assert!(conn.handle.send(push("news.update", json!({"n": 1}))));
    let pushed = payload_json(&conn.client.next_packet().await.unwrap());
    assert_eq!(pushed["route"], "news.update");
    assert_eq!(pushed["body"]["n"], 1);
}

#[tokio::test]
async fn test_repeat_handshake_is_ignored() {
    let mut conn = spawn_connection(ConnectorConfig::default());

    conn.client
        .stream
        .write_all(&encode_inbound(&handshake_publish(1, json!({}))))
        .await
        .unwrap();
    assert_eq!(
        payload_json(&conn.client.next_packet().await.unwrap())["id"],
        1
    );

    // second handshake produces no response; the ping proves nothing was
    // written in between
    conn.client
        .stream
        .write_all(&encode_inbound(&handshake_publish(2, json!({}))))
        .await
        .unwrap();
    conn.client
        .stream
        .write_all(&encode_inbound(&InboundPacket::PingReq))
        .await
        .unwrap();
    assert_eq!(conn.client.next_packet().await, Some(OutboundPacket::Pingresp));
}

#[tokio::test]
async fn test_reconnect_handshake_gets_bare_status() {
    let mut conn = spawn_connection(ConnectorConfig::default());

    conn.client
        .stream
        .write_all(&encode_inbound(&handshake_publish(
            3,
            json!({"reconnect": true}),
        )))
        .await
        .unwrap();
    let response = payload_json(&conn.client.next_packet().await.unwrap());
    assert_eq!(response["body"], json!({"code": CODE_OK}));
}

#[tokio::test]
async fn test_send_before_handshake_is_rejected() {
    let mut conn = spawn_connection(ConnectorConfig::default());

    conn.client
        .stream
        .write_all(&encode_inbound(&connect()))
        .await
        .unwrap();
    assert_eq!(
        conn.client.next_packet().await,
        Some(OutboundPacket::Connack { return_code: 0 })
    );

    assert!(conn.handle.send(push("news.update", json!(1))));
    conn.client
        .stream
        .write_all(&encode_inbound(&InboundPacket::PingReq))
        .await
        .unwrap();
    // the rejected push left no bytes behind
    assert_eq!(conn.client.next_packet().await, Some(OutboundPacket::Pingresp));
}

#[tokio::test]
async fn test_handshake_attempt_limit_forces_close() {
    let mut conn = spawn_connection(ConnectorConfig {
        handshake_max_times: 2,
        ..ConnectorConfig::default()
    });

    // malformed payloads: each attempt counts but none completes
    let bad = InboundPacket::Publish(PublishPacket {
        message_id: 1,
        topic: "hak".to_string(),
        payload: b"not json".to_vec(),
        qos: 0,
    });
    for _ in 0..3 {
        conn.client
            .stream
            .write_all(&encode_inbound(&bad))
            .await
            .unwrap();
    }

    assert!(conn.client.at_eof().await, "third attempt must close");
    assert!(conn.requests.recv().await.is_none());
}

#[tokio::test]
async fn test_kick_then_send_rekicks() {
    let mut conn = spawn_connection(ConnectorConfig::default());

    conn.client
        .stream
        .write_all(&encode_inbound(&handshake_publish(1, json!({}))))
        .await
        .unwrap();
    conn.client.next_packet().await.unwrap();

    assert!(conn.handle.kick());
    let kick = payload_json(&conn.client.next_packet().await.unwrap());
    assert_eq!(kick, json!({"route": "onKick"}));

    // a send to a kicked connection triggers exactly one more kick notice
    assert!(conn.handle.send(push("news.update", json!(1))));
    let kick_again = payload_json(&conn.client.next_packet().await.unwrap());
    assert_eq!(kick_again, json!({"route": "onKick"}));

    // the transport itself stays up until the peer leaves
    conn.client
        .stream
        .write_all(&encode_inbound(&InboundPacket::Disconnect))
        .await
        .unwrap();
    assert!(conn.client.at_eof().await);
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let mut conn = spawn_connection(ConnectorConfig::default());

    assert!(conn.handle.disconnect());
    conn.handle.disconnect();
    assert!(conn.client.at_eof().await);
    assert!(conn.requests.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_handshake_window_expiry_disconnects() {
    let mut conn = spawn_connection(ConnectorConfig::default());

    conn.client
        .stream
        .write_all(&encode_inbound(&connect()))
        .await
        .unwrap();
    assert_eq!(
        conn.client.next_packet().await,
        Some(OutboundPacket::Connack { return_code: 0 })
    );

    // no handshake follows; the 10s window expires under paused time
    assert!(conn.client.at_eof().await);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_expiry_disconnects_after_handshake() {
    let mut conn = spawn_connection(ConnectorConfig::default());

    conn.client
        .stream
        .write_all(&encode_inbound(&connect()))
        .await
        .unwrap();
    conn.client.next_packet().await.unwrap();
    conn.client
        .stream
        .write_all(&encode_inbound(&handshake_publish(1, json!({}))))
        .await
        .unwrap();
    conn.client.next_packet().await.unwrap();

    // silence past the 90s heartbeat window
    assert!(conn.client.at_eof().await);
    assert!(conn.requests.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_expiry_ignored_when_timeout_disconnect_disabled() {
    let mut conn = spawn_connection(ConnectorConfig {
        disconnect_on_timeout: false,
        ..ConnectorConfig::default()
    });

    conn.client
        .stream
        .write_all(&encode_inbound(&connect()))
        .await
        .unwrap();
    assert_eq!(
        conn.client.next_packet().await,
        Some(OutboundPacket::Connack { return_code: 0 })
    );

    // both deadlines fire well within 400s and are ignored
    let idle =
        tokio::time::timeout(Duration::from_secs(400), conn.client.next_packet()).await;
    assert!(idle.is_err(), "connection must stay silent but open");

    conn.client
        .stream
        .write_all(&encode_inbound(&InboundPacket::PingReq))
        .await
        .unwrap();
    assert_eq!(conn.client.next_packet().await, Some(OutboundPacket::Pingresp));
}
