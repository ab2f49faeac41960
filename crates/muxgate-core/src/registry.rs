//! Route dictionary and schema registry seams.
//!
//! Both registries are owned by the embedding application and treated as
//! immutable snapshots after the connector starts. The gateway only needs
//! lookups, per-route encode/decode, and the snapshots exchanged during the
//! handshake, so the seams are small sync traits. [`StaticDictionary`] and
//! [`EmptySchemas`] are in-memory implementations used as defaults and in
//! tests.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

/// Which peer a schema describes messages for.
///
/// Server-side schemas encode outbound bodies; client-side schemas decode
/// inbound ones. A route may have either, both, or neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaSide {
    Client,
    Server,
}

/// Errors surfaced by a schema registry.
#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("no schema registered for route {0}")]
    Missing(String),

    #[error("schema encode failed for route {route}: {reason}")]
    Encode { route: String, reason: String },

    #[error("schema decode failed for route {route}: {reason}")]
    Decode { route: String, reason: String },
}

/// Bidirectional route string ⇄ compact id mapping.
pub trait RouteDictionary: Send + Sync {
    /// Compact id for a route, if the dictionary knows it.
    fn id_for(&self, route: &str) -> Option<u16>;

    /// Route string for a compact id, if the dictionary knows it.
    fn route_for(&self, id: u16) -> Option<String>;

    /// Full route → id snapshot, sent to clients during the handshake.
    fn entries(&self) -> HashMap<String, u16>;
}

/// Per-route binary body encode/decode capability.
pub trait SchemaRegistry: Send + Sync {
    /// Whether a schema exists for `route` on the given side.
    fn has_schema(&self, side: SchemaSide, route: &str) -> bool;

    /// Encodes `body` with the route's schema.
    ///
    /// # Errors
    ///
    /// [`SchemaError::Missing`] when no schema exists, or
    /// [`SchemaError::Encode`] when the body does not fit the schema.
    fn encode(&self, side: SchemaSide, route: &str, body: &Value) -> Result<Vec<u8>, SchemaError>;

    /// Decodes schema-encoded bytes back into a structured value.
    ///
    /// # Errors
    ///
    /// [`SchemaError::Missing`] or [`SchemaError::Decode`].
    fn decode(&self, side: SchemaSide, route: &str, data: &[u8]) -> Result<Value, SchemaError>;

    /// Schema descriptor snapshot sent to clients during the handshake.
    fn descriptors(&self) -> Value;
}

// ── In-memory implementations ─────────────────────────────────────────────────

/// Immutable in-memory dictionary built from `(route, id)` pairs.
#[derive(Debug, Default)]
pub struct StaticDictionary {
    forward: HashMap<String, u16>,
    reverse: HashMap<u16, String>,
}

impl StaticDictionary {
    /// Builds a dictionary from route/id pairs. Later duplicates win.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, u16)>,
        S: Into<String>,
    {
        let mut forward = HashMap::new();
        let mut reverse = HashMap::new();
        for (route, id) in pairs {
            let route = route.into();
            forward.insert(route.clone(), id);
            reverse.insert(id, route);
        }
        Self { forward, reverse }
    }

    /// An empty dictionary: every lookup misses, so routes stay literal.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl RouteDictionary for StaticDictionary {
    fn id_for(&self, route: &str) -> Option<u16> {
        self.forward.get(route).copied()
    }

    fn route_for(&self, id: u16) -> Option<String> {
        self.reverse.get(&id).cloned()
    }

    fn entries(&self) -> HashMap<String, u16> {
        self.forward.clone()
    }
}

/// Schema registry with no schemas: every body falls back to JSON.
#[derive(Debug, Default)]
pub struct EmptySchemas;

impl SchemaRegistry for EmptySchemas {
    fn has_schema(&self, _side: SchemaSide, _route: &str) -> bool {
        false
    }

    fn encode(&self, _side: SchemaSide, route: &str, _body: &Value) -> Result<Vec<u8>, SchemaError> {
        Err(SchemaError::Missing(route.to_string()))
    }

    fn decode(&self, _side: SchemaSide, route: &str, _data: &[u8]) -> Result<Value, SchemaError> {
        Err(SchemaError::Missing(route.to_string()))
    }

    fn descriptors(&self) -> Value {
        Value::Object(serde_json::Map::new())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
