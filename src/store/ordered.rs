//! Insertion-ordered in-memory persistence
//!
//! [`super::MemoryStore`] is backed by a hash map, so the order in which
//! `all()` returns keys is undefined. Retransmission after a reconnect must
//! replay packets in their original send order, so this variant stamps every
//! `put` with its insertion time and sorts `all()` by it.

use std::time::Instant;

use ahash::AHashMap;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::{packet_id_from_key, Store};
use crate::protocol::Packet;

/// A packet and the moment it was first stored. The sequence number breaks
/// ties between packets stored within the same clock tick.
struct StoredMessage {
    ts: Instant,
    seq: u64,
    packet: Packet,
}

#[derive(Default)]
struct Inner {
    messages: AHashMap<String, StoredMessage>,
    next_seq: u64,
    opened: bool,
}

/// In-memory store whose `all()` returns keys in insertion order.
#[derive(Default)]
pub struct OrderedMemoryStore {
    inner: RwLock<Inner>,
}

impl OrderedMemoryStore {
    /// A new, unopened store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for OrderedMemoryStore {
    fn open(&self) {
        let mut inner = self.inner.write();
        inner.opened = true;
        debug!("ordered memory store opened");
    }

    fn put(&self, key: &str, packet: Packet) {
        let mut inner = self.inner.write();
        if !inner.opened {
            error!("ordered memory store used before open");
            return;
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.messages.insert(
            key.to_owned(),
            StoredMessage {
                ts: Instant::now(),
                seq,
                packet,
            },
        );
    }

    fn get(&self, key: &str) -> Option<Packet> {
        let inner = self.inner.read();
        if !inner.opened {
            error!("ordered memory store used before open");
            return None;
        }
        let packet_id = packet_id_from_key(key).unwrap_or(0);
        let found = inner.messages.get(key).map(|m| m.packet.clone());
        if found.is_none() {
            warn!(packet_id, "ordered memory store get: message not found");
        } else {
            debug!(packet_id, "ordered memory store get: message found");
        }
        found
    }

    fn all(&self) -> Vec<String> {
        let inner = self.inner.read();
        if !inner.opened {
            error!("ordered memory store used before open");
            return Vec::new();
        }

        let mut stamped: Vec<(Instant, u64, &String)> = inner
            .messages
            .iter()
            .map(|(key, m)| (m.ts, m.seq, key))
            .collect();
        stamped.sort_by_key(|&(ts, seq, _)| (ts, seq));
        stamped.into_iter().map(|(_, _, key)| key.clone()).collect()
    }

    fn del(&self, key: &str) {
        let mut inner = self.inner.write();
        if !inner.opened {
            error!("ordered memory store used before open");
            return;
        }
        let packet_id = packet_id_from_key(key).unwrap_or(0);
        if inner.messages.remove(key).is_none() {
            info!(packet_id, "ordered memory store del: message not found");
        } else {
            debug!(packet_id, "ordered memory store del: message deleted");
        }
    }

    fn close(&self) {
        let mut inner = self.inner.write();
        if !inner.opened {
            error!("trying to close ordered memory store, but not open");
            return;
        }
        inner.opened = false;
        debug!("ordered memory store closed");
    }

    fn reset(&self) {
        let mut inner = self.inner.write();
        if !inner.opened {
            error!("trying to reset ordered memory store, but not open");
        }
        inner.messages.clear();
        info!("ordered memory store wiped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Publish, QoS};
    use crate::store::outbound_key;

    fn sample(packet_id: u16) -> Packet {
        Packet::Publish(Publish {
            qos: QoS::AtLeastOnce,
            packet_id: Some(packet_id),
            topic: std::sync::Arc::from("sample"),
            ..Default::default()
        })
    }

    #[test]
    fn all_preserves_insertion_order() {
        let store = OrderedMemoryStore::new();
        store.open();

        store.put(&outbound_key(10), sample(10));
        store.put(&outbound_key(2), sample(2));
        store.put(&outbound_key(7), sample(7));

        assert_eq!(store.all(), vec!["o.10", "o.2", "o.7"]);
    }

    #[test]
    fn delete_keeps_remaining_order() {
        let store = OrderedMemoryStore::new();
        store.open();

        store.put(&outbound_key(1), sample(1));
        store.put(&outbound_key(2), sample(2));
        store.put(&outbound_key(3), sample(3));
        store.del(&outbound_key(2));

        assert_eq!(store.all(), vec!["o.1", "o.3"]);
    }

    #[test]
    fn overwriting_restamps_the_entry() {
        let store = OrderedMemoryStore::new();
        store.open();

        store.put(&outbound_key(1), sample(1));
        store.put(&outbound_key(2), sample(2));
        store.put(&outbound_key(1), sample(1));

        assert_eq!(store.all(), vec!["o.2", "o.1"]);
    }

    #[test]
    fn reset_empties_the_store() {
        let store = OrderedMemoryStore::new();
        store.open();

        store.put(&outbound_key(1), sample(1));
        store.reset();
        assert!(store.all().is_empty());
    }
}
