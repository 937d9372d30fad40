//! Pluggable persistence for in-flight packets
//!
//! QoS 1 and 2 exchanges must survive a reconnect, so every packet with an
//! unfinished delivery handshake is stored under a direction-qualified key
//! until the handshake completes. Any durability backend can be supplied by
//! implementing [`Store`]; three implementations ship with the crate.

mod file;
mod memory;
mod ordered;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use ordered::OrderedMemoryStore;

use tracing::error;

use crate::protocol::{Packet, QoS};

/// Capability contract shared by every persistence backend.
///
/// Stores must be opened before use. Operating on an unopened or closed
/// store is deliberately a logged no-op rather than a panic or an error:
/// durability code runs on both sides of connection teardown and must
/// tolerate lifecycle races without crashing the caller.
pub trait Store: Send + Sync {
    /// Make the store usable.
    fn open(&self);
    /// Store a packet under the given key.
    fn put(&self, key: &str, packet: Packet);
    /// Retrieve the packet stored under the key, if any.
    fn get(&self, key: &str) -> Option<Packet>;
    /// All keys currently in the store.
    fn all(&self) -> Vec<String>;
    /// Remove the packet stored under the key.
    fn del(&self, key: &str);
    /// Disallow further use of the store.
    fn close(&self);
    /// Remove every stored packet.
    fn reset(&self);
}

/// Key for a packet received from the broker.
pub fn inbound_key(packet_id: u16) -> String {
    format!("i.{}", packet_id)
}

/// Key for a packet sent to the broker.
pub fn outbound_key(packet_id: u16) -> String {
    format!("o.{}", packet_id)
}

/// Extract the packet identifier from a store key.
pub fn packet_id_from_key(key: &str) -> Option<u16> {
    key.get(2..)?.parse().ok()
}

/// Record an outgoing packet's effect on the in-flight table.
///
/// Sending a QoS>0 PUBLISH, PUBREL, SUBSCRIBE or UNSUBSCRIBE stores the
/// packet under its outbound key until the broker acknowledges it. Sending
/// a PUBACK or PUBCOMP completes an inbound exchange and retires the stored
/// inbound publish.
pub fn persist_outbound(store: &dyn Store, packet: &Packet) {
    let details = packet.details();
    match details.qos {
        QoS::AtMostOnce => match packet {
            Packet::PubAck(_) | Packet::PubComp(_) => {
                store.del(&inbound_key(details.packet_id));
            }
            _ => {}
        },
        QoS::AtLeastOnce | QoS::ExactlyOnce => match packet {
            Packet::Publish(_)
            | Packet::PubRel(_)
            | Packet::Subscribe(_)
            | Packet::Unsubscribe(_) => {
                store.put(&outbound_key(details.packet_id), packet.clone());
            }
            _ => {
                error!(packet_type = %packet.packet_type(), "asked to persist an invalid outbound packet");
            }
        },
    }
}

/// Record an incoming packet's effect on the in-flight table.
///
/// A received acknowledgement retires the stored outbound packet it
/// answers; a received QoS>0 PUBLISH is stored under its inbound key until
/// our own acknowledgement goes out.
pub fn persist_inbound(store: &dyn Store, packet: &Packet) {
    let details = packet.details();
    match details.qos {
        QoS::AtMostOnce => match packet {
            Packet::PubAck(_) | Packet::SubAck(_) | Packet::UnsubAck(_) | Packet::PubComp(_) => {
                store.del(&outbound_key(details.packet_id));
            }
            // PUBREC leaves the outbound publish in place until PUBCOMP
            Packet::Publish(_) | Packet::PubRec(_) | Packet::PingResp | Packet::ConnAck(_) => {}
            _ => {
                error!(packet_type = %packet.packet_type(), "asked to persist an invalid inbound packet");
            }
        },
        QoS::AtLeastOnce | QoS::ExactlyOnce => match packet {
            Packet::Publish(_) | Packet::PubRel(_) => {
                store.put(&inbound_key(details.packet_id), packet.clone());
            }
            _ => {
                error!(packet_type = %packet.packet_type(), "asked to persist an invalid inbound packet");
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use std::sync::Arc;

    use super::*;
    use crate::protocol::{PubAck, PubComp, Publish, SubAck, Subscribe, Subscription};

    fn publish(qos: QoS, packet_id: u16) -> Packet {
        Packet::Publish(Publish {
            qos,
            packet_id: (qos != QoS::AtMostOnce).then_some(packet_id),
            topic: Arc::from("a/b"),
            payload: Bytes::from_static(b"payload"),
            ..Default::default()
        })
    }

    #[test]
    fn key_helpers_round_trip() {
        assert_eq!(inbound_key(42), "i.42");
        assert_eq!(outbound_key(65535), "o.65535");
        assert_eq!(packet_id_from_key("i.42"), Some(42));
        assert_eq!(packet_id_from_key("o.65535"), Some(65535));
        assert_eq!(packet_id_from_key("o."), None);
        assert_eq!(packet_id_from_key("x"), None);
    }

    #[test]
    fn outbound_publish_is_stored_until_acknowledged() {
        let store = MemoryStore::new();
        store.open();

        let packet = publish(QoS::AtLeastOnce, 3);
        persist_outbound(&store, &packet);
        assert_eq!(store.get("o.3"), Some(packet));

        persist_inbound(&store, &Packet::PubAck(PubAck::new(3)));
        assert_eq!(store.get("o.3"), None);
    }

    #[test]
    fn inbound_publish_is_retired_by_our_ack() {
        let store = MemoryStore::new();
        store.open();

        let packet = publish(QoS::ExactlyOnce, 8);
        persist_inbound(&store, &packet);
        assert!(store.get("i.8").is_some());

        persist_outbound(&store, &Packet::PubComp(PubComp::new(8)));
        assert_eq!(store.get("i.8"), None);
    }

    #[test]
    fn suback_retires_stored_subscribe() {
        let store = MemoryStore::new();
        store.open();

        let subscribe = Packet::Subscribe(Subscribe {
            packet_id: 5,
            subscriptions: vec![Subscription {
                filter: "a/#".to_string(),
                qos: QoS::AtLeastOnce,
            }],
        });
        persist_outbound(&store, &subscribe);
        assert!(store.get("o.5").is_some());

        persist_inbound(
            &store,
            &Packet::SubAck(SubAck {
                packet_id: 5,
                return_codes: vec![],
            }),
        );
        assert_eq!(store.get("o.5"), None);
    }

    #[test]
    fn qos0_publish_is_never_persisted() {
        let store = MemoryStore::new();
        store.open();

        persist_outbound(&store, &publish(QoS::AtMostOnce, 0));
        persist_inbound(&store, &publish(QoS::AtMostOnce, 0));
        assert!(store.all().is_empty());
    }
}
