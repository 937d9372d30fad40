//! MQTT packet decoder
//!
//! Reads one control packet at a time from a blocking byte stream.

use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;

use super::{read_binary, read_remaining_length, read_string, read_u16};
use crate::protocol::{
    CodecError, ConnAck, Connect, ConnectReturnCode, DecodeError, Packet, PacketType, PubAck,
    PubComp, PubRec, PubRel, Publish, QoS, SubAck, Subscribe, SubscribeReturnCode, Subscription,
    UnsubAck, Unsubscribe, Will,
};

/// Decoded fixed header of an MQTT control packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub remaining_length: u32,
}

impl FixedHeader {
    /// Parse the first byte and the remaining-length field that follows it.
    pub fn read_from<R: Read>(first_byte: u8, r: &mut R) -> Result<Self, CodecError> {
        let type_nibble = first_byte >> 4;
        let packet_type = PacketType::from_u8(type_nibble)
            .ok_or(CodecError::Decode(DecodeError::InvalidPacketType(type_nibble)))?;

        let qos_bits = (first_byte >> 1) & 0x03;
        let qos = QoS::from_u8(qos_bits).ok_or(CodecError::Decode(DecodeError::InvalidQoS(qos_bits)))?;

        Ok(Self {
            packet_type,
            dup: (first_byte >> 3) & 0x01 > 0,
            qos,
            retain: first_byte & 0x01 > 0,
            remaining_length: read_remaining_length(r)?,
        })
    }

    /// The four flag bits of the first header byte.
    fn flags(&self) -> u8 {
        (self.dup as u8) << 3 | (self.qos as u8) << 1 | self.retain as u8
    }
}

/// Read a single packet from the stream.
///
/// Exactly `remaining_length` bytes are consumed after the fixed header; a
/// short read surfaces the I/O error unchanged and never yields a partially
/// populated packet. The codec never retries - retry policy belongs to the
/// caller.
pub fn read_packet<R: Read>(r: &mut R) -> Result<Packet, CodecError> {
    let mut first = [0u8; 1];
    r.read_exact(&mut first)?;

    let header = FixedHeader::read_from(first[0], r)?;

    let mut body = vec![0u8; header.remaining_length as usize];
    r.read_exact(&mut body)?;

    decode_body(&header, &body).map_err(CodecError::Decode)
}

fn decode_body(fh: &FixedHeader, body: &[u8]) -> Result<Packet, DecodeError> {
    match fh.packet_type {
        PacketType::Connect => decode_connect(fh, body),
        PacketType::ConnAck => decode_connack(fh, body),
        PacketType::Publish => decode_publish(fh, body),
        PacketType::PubAck => Ok(Packet::PubAck(PubAck::new(decode_ack_body(fh, 0x00, body)?))),
        PacketType::PubRec => Ok(Packet::PubRec(PubRec::new(decode_ack_body(fh, 0x00, body)?))),
        PacketType::PubRel => Ok(Packet::PubRel(PubRel::new(decode_ack_body(fh, 0x02, body)?))),
        PacketType::PubComp => Ok(Packet::PubComp(PubComp::new(decode_ack_body(fh, 0x00, body)?))),
        PacketType::Subscribe => decode_subscribe(fh, body),
        PacketType::SubAck => decode_suback(fh, body),
        PacketType::Unsubscribe => decode_unsubscribe(fh, body),
        PacketType::UnsubAck => Ok(Packet::UnsubAck(UnsubAck::new(decode_ack_body(fh, 0x00, body)?))),
        PacketType::PingReq => decode_empty(fh, body).map(|_| Packet::PingReq),
        PacketType::PingResp => decode_empty(fh, body).map(|_| Packet::PingResp),
        PacketType::Disconnect => decode_empty(fh, body).map(|_| Packet::Disconnect),
    }
}

fn decode_connect(fh: &FixedHeader, body: &[u8]) -> Result<Packet, DecodeError> {
    if fh.flags() != 0 {
        return Err(DecodeError::InvalidFlags);
    }

    let mut pos = 0;

    let (protocol_name, n) = read_string(&body[pos..])?;
    pos += n;

    // "MQIsdp" is the legacy 3.1 name; accepted for interoperability
    if protocol_name != "MQTT" && protocol_name != "MQIsdp" {
        return Err(DecodeError::InvalidProtocolName);
    }

    if pos >= body.len() {
        return Err(DecodeError::UnexpectedEof);
    }
    let level = body[pos];
    pos += 1;
    if level != 3 && level != 4 {
        return Err(DecodeError::InvalidProtocolLevel(level));
    }

    if pos >= body.len() {
        return Err(DecodeError::UnexpectedEof);
    }
    let connect_flags = body[pos];
    pos += 1;

    // Reserved bit must be 0
    if connect_flags & 0x01 != 0 {
        return Err(DecodeError::InvalidFlags);
    }

    let clean_session = connect_flags & 0x02 != 0;
    let will_flag = connect_flags & 0x04 != 0;
    let will_qos_bits = (connect_flags >> 3) & 0x03;
    let will_retain = connect_flags & 0x20 != 0;
    let password_flag = connect_flags & 0x40 != 0;
    let username_flag = connect_flags & 0x80 != 0;

    // [MQTT-3.1.2-22] a password requires a username
    if !username_flag && password_flag {
        return Err(DecodeError::InvalidFlags);
    }

    let will_qos = QoS::from_u8(will_qos_bits).ok_or(DecodeError::InvalidQoS(will_qos_bits))?;

    // If there is no will, its QoS and retain bits must be 0
    if !will_flag && (will_qos_bits != 0 || will_retain) {
        return Err(DecodeError::InvalidFlags);
    }

    let keep_alive = read_u16(&body[pos..])?;
    pos += 2;

    let (client_id, n) = read_string(&body[pos..])?;
    pos += n;
    let client_id = client_id.to_string();

    let will = if will_flag {
        let (will_topic, n) = read_string(&body[pos..])?;
        pos += n;
        let will_topic = will_topic.to_string();

        let (will_payload, n) = read_binary(&body[pos..])?;
        pos += n;

        Some(Will {
            topic: will_topic,
            payload: Bytes::copy_from_slice(will_payload),
            qos: will_qos,
            retain: will_retain,
        })
    } else {
        None
    };

    let username = if username_flag {
        let (s, n) = read_string(&body[pos..])?;
        pos += n;
        Some(s.to_string())
    } else {
        None
    };

    let password = if password_flag {
        let (data, _) = read_binary(&body[pos..])?;
        Some(Bytes::copy_from_slice(data))
    } else {
        None
    };

    Ok(Packet::Connect(Box::new(Connect {
        client_id,
        clean_session,
        keep_alive,
        username,
        password,
        will,
    })))
}

fn decode_connack(fh: &FixedHeader, body: &[u8]) -> Result<Packet, DecodeError> {
    if fh.flags() != 0 {
        return Err(DecodeError::InvalidFlags);
    }

    if body.len() != 2 {
        return Err(DecodeError::MalformedPacket("CONNACK body must be 2 bytes"));
    }

    let acknowledge_flags = body[0];
    // Only bit 0 (session present) is defined
    if acknowledge_flags & 0xFE != 0 {
        return Err(DecodeError::InvalidFlags);
    }

    let return_code =
        ConnectReturnCode::from_u8(body[1]).ok_or(DecodeError::InvalidReturnCode(body[1]))?;

    Ok(Packet::ConnAck(ConnAck {
        session_present: acknowledge_flags & 0x01 != 0,
        return_code,
    }))
}

fn decode_publish(fh: &FixedHeader, body: &[u8]) -> Result<Packet, DecodeError> {
    // DUP must be 0 for QoS 0
    if fh.qos == QoS::AtMostOnce && fh.dup {
        return Err(DecodeError::MalformedPacket("DUP must be 0 for QoS 0"));
    }

    let mut pos = 0;

    let (topic, n) = read_string(&body[pos..])?;
    pos += n;

    // Wildcards are only legal in filters, never in a published topic
    if topic.contains('+') || topic.contains('#') {
        return Err(DecodeError::MalformedPacket("topic contains wildcard"));
    }
    let topic: Arc<str> = Arc::from(topic);

    let packet_id = if fh.qos != QoS::AtMostOnce {
        let id = read_u16(&body[pos..])?;
        if id == 0 {
            return Err(DecodeError::MalformedPacket("packet id cannot be 0"));
        }
        pos += 2;
        Some(id)
    } else {
        None
    };

    Ok(Packet::Publish(Publish {
        dup: fh.dup,
        qos: fh.qos,
        retain: fh.retain,
        topic,
        packet_id,
        payload: Bytes::copy_from_slice(&body[pos..]),
    }))
}

/// Shared shape of PUBACK/PUBREC/PUBREL/PUBCOMP/UNSUBACK: flag check plus a
/// body holding exactly one packet identifier.
fn decode_ack_body(fh: &FixedHeader, expected_flags: u8, body: &[u8]) -> Result<u16, DecodeError> {
    if fh.flags() != expected_flags {
        return Err(DecodeError::InvalidFlags);
    }
    if body.len() != 2 {
        return Err(DecodeError::MalformedPacket("expected exactly a packet identifier"));
    }
    Ok(u16::from_be_bytes([body[0], body[1]]))
}

fn decode_subscribe(fh: &FixedHeader, body: &[u8]) -> Result<Packet, DecodeError> {
    // SUBSCRIBE must have flags 0010
    if fh.flags() != 0x02 {
        return Err(DecodeError::InvalidFlags);
    }

    let packet_id = read_u16(body)?;
    if packet_id == 0 {
        return Err(DecodeError::MalformedPacket("packet id cannot be 0"));
    }
    let mut pos = 2;

    let mut subscriptions = Vec::new();
    while pos < body.len() {
        let (filter, n) = read_string(&body[pos..])?;
        pos += n;

        // [MQTT-4.7.3-1]
        if filter.is_empty() {
            return Err(DecodeError::MalformedPacket("topic filter cannot be empty"));
        }
        let filter = filter.to_string();

        if pos >= body.len() {
            return Err(DecodeError::UnexpectedEof);
        }
        let qos_byte = body[pos];
        pos += 1;

        let qos = QoS::from_u8(qos_byte & 0x03).ok_or(DecodeError::InvalidQoS(qos_byte & 0x03))?;

        subscriptions.push(Subscription { filter, qos });
    }

    if subscriptions.is_empty() {
        return Err(DecodeError::MalformedPacket(
            "SUBSCRIBE must have at least one topic filter",
        ));
    }

    Ok(Packet::Subscribe(Subscribe {
        packet_id,
        subscriptions,
    }))
}

fn decode_suback(fh: &FixedHeader, body: &[u8]) -> Result<Packet, DecodeError> {
    if fh.flags() != 0 {
        return Err(DecodeError::InvalidFlags);
    }

    let packet_id = read_u16(body)?;
    let mut return_codes = Vec::new();
    for &code in &body[2..] {
        return_codes
            .push(SubscribeReturnCode::from_u8(code).ok_or(DecodeError::InvalidReturnCode(code))?);
    }

    Ok(Packet::SubAck(SubAck {
        packet_id,
        return_codes,
    }))
}

fn decode_unsubscribe(fh: &FixedHeader, body: &[u8]) -> Result<Packet, DecodeError> {
    // UNSUBSCRIBE must have flags 0010
    if fh.flags() != 0x02 {
        return Err(DecodeError::InvalidFlags);
    }

    let packet_id = read_u16(body)?;
    if packet_id == 0 {
        return Err(DecodeError::MalformedPacket("packet id cannot be 0"));
    }
    let mut pos = 2;

    let mut filters = Vec::new();
    while pos < body.len() {
        let (filter, n) = read_string(&body[pos..])?;
        pos += n;

        if filter.is_empty() {
            return Err(DecodeError::MalformedPacket("topic filter cannot be empty"));
        }

        filters.push(filter.to_string());
    }

    if filters.is_empty() {
        return Err(DecodeError::MalformedPacket(
            "UNSUBSCRIBE must have at least one topic filter",
        ));
    }

    Ok(Packet::Unsubscribe(Unsubscribe { packet_id, filters }))
}

fn decode_empty(fh: &FixedHeader, body: &[u8]) -> Result<(), DecodeError> {
    if fh.flags() != 0 {
        return Err(DecodeError::InvalidFlags);
    }
    if !body.is_empty() {
        return Err(DecodeError::MalformedPacket("unexpected payload"));
    }
    Ok(())
}
