//! Protocol constants shared by the codec, the adaptor, and the connector.
//!
//! Every encoded payload travels on one fixed topic regardless of its logical
//! route; the route only becomes visible again after envelope decode.

/// Topic all ordinary encoded payloads are published on.
pub const DEFAULT_TOPIC: &str = "pmc";

/// Topic the client publishes its handshake message on.
pub const HANDSHAKE_TOPIC: &str = "hak";

/// Logical route of the handshake exchange.
pub const HANDSHAKE_ROUTE: &str = "doHandshake";

/// Route of the server-initiated kick notice.
pub const KICK_ROUTE: &str = "onKick";

/// Status code for a successful handshake response.
pub const CODE_OK: u32 = 200;

/// Status code for a rejected handshake response.
pub const CODE_ERROR: u32 = 500;
