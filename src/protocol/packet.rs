//! MQTT packet definitions
//!
//! Closed sum type over the 14 MQTT v3.1.1 control packet kinds.

use std::sync::Arc;

use bytes::Bytes;

use super::{ConnectReturnCode, PacketType, QoS, SubscribeReturnCode};

/// MQTT control packet
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
pub enum Packet {
    Connect(Box<Connect>),
    ConnAck(ConnAck),
    Publish(Publish),
    PubAck(PubAck),
    PubRec(PubRec),
    PubRel(PubRel),
    PubComp(PubComp),
    Subscribe(Subscribe),
    SubAck(SubAck),
    Unsubscribe(Unsubscribe),
    UnsubAck(UnsubAck),
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    /// Get the packet type discriminant
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::ConnAck(_) => PacketType::ConnAck,
            Packet::Publish(_) => PacketType::Publish,
            Packet::PubAck(_) => PacketType::PubAck,
            Packet::PubRec(_) => PacketType::PubRec,
            Packet::PubRel(_) => PacketType::PubRel,
            Packet::PubComp(_) => PacketType::PubComp,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::SubAck(_) => PacketType::SubAck,
            Packet::Unsubscribe(_) => PacketType::Unsubscribe,
            Packet::UnsubAck(_) => PacketType::UnsubAck,
            Packet::PingReq => PacketType::PingReq,
            Packet::PingResp => PacketType::PingResp,
            Packet::Disconnect => PacketType::Disconnect,
        }
    }

    /// An empty packet of the given type, ready to be populated.
    ///
    /// Total over every known discriminant; unknown type bytes are rejected
    /// earlier, by [`PacketType::from_u8`].
    pub fn empty(packet_type: PacketType) -> Packet {
        match packet_type {
            PacketType::Connect => Packet::Connect(Box::default()),
            PacketType::ConnAck => Packet::ConnAck(ConnAck::default()),
            PacketType::Publish => Packet::Publish(Publish::default()),
            PacketType::PubAck => Packet::PubAck(PubAck::default()),
            PacketType::PubRec => Packet::PubRec(PubRec::default()),
            PacketType::PubRel => Packet::PubRel(PubRel::default()),
            PacketType::PubComp => Packet::PubComp(PubComp::default()),
            PacketType::Subscribe => Packet::Subscribe(Subscribe::default()),
            PacketType::SubAck => Packet::SubAck(SubAck::default()),
            PacketType::Unsubscribe => Packet::Unsubscribe(Unsubscribe::default()),
            PacketType::UnsubAck => Packet::UnsubAck(UnsubAck::default()),
            PacketType::PingReq => Packet::PingReq,
            PacketType::PingResp => Packet::PingResp,
            PacketType::Disconnect => Packet::Disconnect,
        }
    }

    /// The delivery facet used by the persistence helpers.
    ///
    /// PUBLISH reports its own QoS; PUBREL, SUBSCRIBE and UNSUBSCRIBE carry
    /// a mandated QoS-1 handshake; acknowledgements report QoS 0 with the
    /// identifier of the exchange they complete.
    pub fn details(&self) -> Details {
        match self {
            Packet::Publish(p) => Details {
                qos: p.qos,
                packet_id: p.packet_id.unwrap_or(0),
            },
            Packet::PubAck(p) => Details::qos0(p.packet_id),
            Packet::PubRec(p) => Details::qos0(p.packet_id),
            Packet::PubRel(p) => Details {
                qos: QoS::AtLeastOnce,
                packet_id: p.packet_id,
            },
            Packet::PubComp(p) => Details::qos0(p.packet_id),
            Packet::Subscribe(p) => Details {
                qos: QoS::AtLeastOnce,
                packet_id: p.packet_id,
            },
            Packet::SubAck(p) => Details::qos0(p.packet_id),
            Packet::Unsubscribe(p) => Details {
                qos: QoS::AtLeastOnce,
                packet_id: p.packet_id,
            },
            Packet::UnsubAck(p) => Details::qos0(p.packet_id),
            Packet::Connect(_)
            | Packet::ConnAck(_)
            | Packet::PingReq
            | Packet::PingResp
            | Packet::Disconnect => Details::qos0(0),
        }
    }
}

/// QoS and packet identifier facet common to all packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Details {
    pub qos: QoS,
    pub packet_id: u16,
}

impl Details {
    fn qos0(packet_id: u16) -> Self {
        Self {
            qos: QoS::AtMostOnce,
            packet_id,
        }
    }
}

/// CONNECT packet (client -> server)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    /// Client identifier
    pub client_id: String,
    /// Clean session flag
    pub clean_session: bool,
    /// Keep alive interval in seconds
    pub keep_alive: u16,
    /// Username (optional)
    pub username: Option<String>,
    /// Password (optional)
    pub password: Option<Bytes>,
    /// Will message (optional)
    pub will: Option<Will>,
}

impl Default for Connect {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            clean_session: true,
            keep_alive: 60,
            username: None,
            password: None,
            will: None,
        }
    }
}

/// Will message configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Will {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

/// CONNACK packet (server -> client)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    /// Session present flag
    pub session_present: bool,
    /// Connect return code
    pub return_code: ConnectReturnCode,
}

impl Default for ConnAck {
    fn default() -> Self {
        Self {
            session_present: false,
            return_code: ConnectReturnCode::Accepted,
        }
    }
}

/// PUBLISH packet (bidirectional)
///
/// The topic uses `Arc<str>` so cloning during fan-out to multiple
/// subscriptions is O(1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    /// Duplicate delivery flag
    pub dup: bool,
    /// Quality of service
    pub qos: QoS,
    /// Retain flag
    pub retain: bool,
    /// Topic name
    pub topic: Arc<str>,
    /// Packet identifier (present only for QoS > 0)
    pub packet_id: Option<u16>,
    /// Payload
    pub payload: Bytes,
}

impl Default for Publish {
    fn default() -> Self {
        Self {
            dup: false,
            qos: QoS::AtMostOnce,
            retain: false,
            topic: Arc::from(""),
            packet_id: None,
            payload: Bytes::new(),
        }
    }
}

/// PUBACK packet (QoS 1 acknowledgement)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PubAck {
    pub packet_id: u16,
}

impl PubAck {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

/// PUBREC packet (QoS 2 step 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PubRec {
    pub packet_id: u16,
}

impl PubRec {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

/// PUBREL packet (QoS 2 step 2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PubRel {
    pub packet_id: u16,
}

impl PubRel {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

/// PUBCOMP packet (QoS 2 step 3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PubComp {
    pub packet_id: u16,
}

impl PubComp {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

/// Single subscription request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Topic filter
    pub filter: String,
    /// Requested maximum QoS
    pub qos: QoS,
}

/// SUBSCRIBE packet (client -> server)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Subscribe {
    pub packet_id: u16,
    pub subscriptions: Vec<Subscription>,
}

/// SUBACK packet (server -> client)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubAck {
    pub packet_id: u16,
    pub return_codes: Vec<SubscribeReturnCode>,
}

/// UNSUBSCRIBE packet (client -> server)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Unsubscribe {
    pub packet_id: u16,
    pub filters: Vec<String>,
}

/// UNSUBACK packet (server -> client)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnsubAck {
    pub packet_id: u16,
}

impl UnsubAck {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_total_over_all_packet_types() {
        for raw in 1u8..=14 {
            let packet_type = PacketType::from_u8(raw).unwrap();
            assert_eq!(Packet::empty(packet_type).packet_type(), packet_type);
        }
        assert_eq!(PacketType::from_u8(0), None);
        assert_eq!(PacketType::from_u8(15), None);
    }

    #[test]
    fn details_report_handshake_qos() {
        let publish = Packet::Publish(Publish {
            qos: QoS::ExactlyOnce,
            packet_id: Some(9),
            ..Default::default()
        });
        assert_eq!(publish.details().qos, QoS::ExactlyOnce);
        assert_eq!(publish.details().packet_id, 9);

        let pubrel = Packet::PubRel(PubRel::new(9));
        assert_eq!(pubrel.details().qos, QoS::AtLeastOnce);

        let puback = Packet::PubAck(PubAck::new(9));
        assert_eq!(puback.details().qos, QoS::AtMostOnce);
        assert_eq!(puback.details().packet_id, 9);

        assert_eq!(Packet::PingReq.details().packet_id, 0);
    }
}
