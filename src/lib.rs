//! DriftMQ - resilient MQTT v3.1.1 client session engine
//!
//! The pieces a client needs to speak MQTT and survive connection loss
//! without losing guaranteed-delivery messages: a binary packet codec, a
//! topic router with wildcard and shared-subscription matching, a keepalive
//! monitor, and pluggable persistence for in-flight packets. Transport
//! setup and the connect/reconnect loop are left to the embedding
//! application.

pub mod codec;
pub mod config;
pub mod events;
pub mod keepalive;
pub mod message;
pub mod protocol;
pub mod router;
pub mod session;
pub mod store;
pub mod topic;

pub use config::SessionConfig;
pub use events::ConnectionEvent;
pub use keepalive::{KeepaliveMonitor, PingTimeout};
pub use message::Message;
pub use protocol::{CodecError, ConnectReturnCode, Packet, PacketType, QoS};
pub use router::{MessageHandler, Router};
pub use session::ConnectionState;
pub use store::{FileStore, MemoryStore, OrderedMemoryStore, Store};
