//! In-memory persistence
//!
//! A "persistence" mechanism wholly stored in memory, useful only for as
//! long as the owning client instance exists.

use ahash::AHashMap;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::{packet_id_from_key, Store};
use crate::protocol::Packet;

#[derive(Default)]
struct Inner {
    messages: AHashMap<String, Packet>,
    opened: bool,
}

/// Unordered in-memory store. The order of [`Store::all`] is unspecified.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// A new, unopened store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn open(&self) {
        let mut inner = self.inner.write();
        inner.opened = true;
        debug!("memory store opened");
    }

    fn put(&self, key: &str, packet: Packet) {
        let mut inner = self.inner.write();
        if !inner.opened {
            error!("memory store used before open");
            return;
        }
        inner.messages.insert(key.to_owned(), packet);
    }

    fn get(&self, key: &str) -> Option<Packet> {
        let inner = self.inner.read();
        if !inner.opened {
            error!("memory store used before open");
            return None;
        }
        let packet_id = packet_id_from_key(key).unwrap_or(0);
        let found = inner.messages.get(key).cloned();
        if found.is_none() {
            warn!(packet_id, "memory store get: message not found");
        } else {
            debug!(packet_id, "memory store get: message found");
        }
        found
    }

    fn all(&self) -> Vec<String> {
        let inner = self.inner.read();
        if !inner.opened {
            error!("memory store used before open");
            return Vec::new();
        }
        inner.messages.keys().cloned().collect()
    }

    fn del(&self, key: &str) {
        let mut inner = self.inner.write();
        if !inner.opened {
            error!("memory store used before open");
            return;
        }
        let packet_id = packet_id_from_key(key).unwrap_or(0);
        if inner.messages.remove(key).is_none() {
            info!(packet_id, "memory store del: message not found");
        } else {
            debug!(packet_id, "memory store del: message deleted");
        }
    }

    fn close(&self) {
        let mut inner = self.inner.write();
        if !inner.opened {
            error!("trying to close memory store, but not open");
            return;
        }
        inner.opened = false;
        debug!("memory store closed");
    }

    fn reset(&self) {
        let mut inner = self.inner.write();
        if !inner.opened {
            error!("trying to reset memory store, but not open");
        }
        inner.messages.clear();
        info!("memory store wiped");
    }
}
