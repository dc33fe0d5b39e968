//! Realtime connection layer for support chat
//!
//! Provides the client side of the per-session realtime channel:
//! - Typed frames for messages, typing indicators and read markers
//! - A transport abstraction with WebSocket and in-process implementations
//! - A managed connection with fixed-delay reconnection and owner-driven teardown
//!
//! # Architecture
//!
//! - **Events**: Frame definitions and the tag-less inbound message quirk
//! - **Transport**: `Connector` trait, WebSocket connector, endpoint construction
//! - **Memory**: In-process connector handing out the server side of each link
//! - **State**: Connection lifecycle states
//! - **Connection**: `ConnectionManager`, the owned reconnecting connection

pub mod connection;
pub mod events;
pub mod memory;
pub mod state;
pub mod transport;

pub use connection::{ConnectionEvent, ConnectionHandle, ConnectionManager, ConnectionOptions};
pub use events::{InboundFrame, OutboundFrame};
pub use memory::{MemoryConnector, MemoryPeer};
pub use state::ConnectionState;
pub use transport::{realtime_endpoint, Connector, TransportLink, WsConnector};
