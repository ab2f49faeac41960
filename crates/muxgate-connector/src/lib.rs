//! # muxgate-connector
//!
//! The gateway itself: a single TCP listener whose first-bytes sniffer routes
//! each socket to a raw-TCP or WebSocket sub-processor, a per-connection
//! lifecycle actor with heartbeat and handshake deadlines, and the adaptor
//! that translates control packets into router requests and back.
//!
//! Wire-level concerns (envelope, message codec, dictionaries, schemas) live
//! in `muxgate-core`; this crate owns sockets, timers, and state.

pub mod adaptor;
pub mod config;
pub mod connection;
pub mod connector;
pub mod lifecycle;
pub mod processor;
pub mod switcher;
pub mod transport;

pub use adaptor::{Adaptor, AdaptorAction, InboundRequest, PublishAction};
pub use config::{ConfigError, ConnectorConfig};
pub use connection::{Command, Connection, ConnectionHandle, ConnectionId};
pub use connector::{Connector, ConnectorEvent};
pub use lifecycle::{AttemptOutcome, ConnState, Lifecycle, SendDisposition};
pub use switcher::{Accepted, Switcher};
pub use transport::{MuxStream, PrefixedStream, WsByteStream};
