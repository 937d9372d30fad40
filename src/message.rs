//! Inbound message view handed to subscription callbacks

use std::fmt;
use std::sync::{Arc, Once};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use crate::protocol::{Packet, PubAck, PubRec, Publish, QoS};
use crate::store::{persist_outbound, Store};

/// A received PUBLISH as seen by subscription callbacks.
///
/// Clones share one underlying message, so fanning a message out to several
/// callbacks is cheap and the acknowledgement fires at most once no matter
/// how many clones call [`Message::ack`].
#[derive(Clone)]
pub struct Message {
    inner: Arc<MessageInner>,
}

struct MessageInner {
    topic: Arc<str>,
    payload: Bytes,
    qos: QoS,
    retained: bool,
    duplicate: bool,
    packet_id: u16,
    acked: Once,
    outbound: mpsc::UnboundedSender<Packet>,
    store: Arc<dyn Store>,
}

impl Message {
    pub(crate) fn from_publish(
        publish: &Publish,
        outbound: mpsc::UnboundedSender<Packet>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            inner: Arc::new(MessageInner {
                topic: publish.topic.clone(),
                payload: publish.payload.clone(),
                qos: publish.qos,
                retained: publish.retain,
                duplicate: publish.dup,
                packet_id: publish.packet_id.unwrap_or(0),
                acked: Once::new(),
                outbound,
                store,
            }),
        }
    }

    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    pub fn payload(&self) -> &Bytes {
        &self.inner.payload
    }

    pub fn qos(&self) -> QoS {
        self.inner.qos
    }

    pub fn retained(&self) -> bool {
        self.inner.retained
    }

    pub fn duplicate(&self) -> bool {
        self.inner.duplicate
    }

    pub fn packet_id(&self) -> u16 {
        self.inner.packet_id
    }

    /// Acknowledge the message: PUBACK for QoS 1 (retiring the stored
    /// inbound copy first), PUBREC for QoS 2, nothing for QoS 0.
    ///
    /// The router calls this after the callbacks return; calling it again
    /// is a no-op.
    pub fn ack(&self) {
        self.inner.acked.call_once(|| match self.inner.qos {
            QoS::AtMostOnce => {}
            QoS::AtLeastOnce => {
                let puback = Packet::PubAck(PubAck::new(self.inner.packet_id));
                persist_outbound(self.inner.store.as_ref(), &puback);
                if self.inner.outbound.send(puback).is_err() {
                    debug!(packet_id = self.inner.packet_id, "puback dropped, writer gone");
                }
            }
            QoS::ExactlyOnce => {
                let pubrec = Packet::PubRec(PubRec::new(self.inner.packet_id));
                if self.inner.outbound.send(pubrec).is_err() {
                    debug!(packet_id = self.inner.packet_id, "pubrec dropped, writer gone");
                }
            }
        });
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("topic", &self.inner.topic)
            .field("qos", &self.inner.qos)
            .field("retained", &self.inner.retained)
            .field("duplicate", &self.inner.duplicate)
            .field("packet_id", &self.inner.packet_id)
            .field("payload_len", &self.inner.payload.len())
            .finish()
    }
}
