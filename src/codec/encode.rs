//! MQTT packet encoder

use std::io::Write;

use bytes::{BufMut, BytesMut};

use super::{field_len, write_binary, write_remaining_length, write_string};
use crate::protocol::{
    CodecError, ConnAck, Connect, EncodeError, Packet, Publish, QoS, SubAck, Subscribe,
    Unsubscribe,
};

/// Encode a packet into the buffer.
///
/// The remaining-length field always equals the exact byte length of
/// everything written after the fixed header.
pub fn encode(packet: &Packet, buf: &mut BytesMut) -> Result<(), EncodeError> {
    match packet {
        Packet::Connect(p) => encode_connect(p, buf),
        Packet::ConnAck(p) => encode_connack(p, buf),
        Packet::Publish(p) => encode_publish(p, buf),
        Packet::PubAck(p) => encode_ack(0x40, p.packet_id, buf),
        Packet::PubRec(p) => encode_ack(0x50, p.packet_id, buf),
        Packet::PubRel(p) => encode_ack(0x62, p.packet_id, buf), // PUBREL carries flags 0010
        Packet::PubComp(p) => encode_ack(0x70, p.packet_id, buf),
        Packet::Subscribe(p) => encode_subscribe(p, buf),
        Packet::SubAck(p) => encode_suback(p, buf),
        Packet::Unsubscribe(p) => encode_unsubscribe(p, buf),
        Packet::UnsubAck(p) => encode_ack(0xB0, p.packet_id, buf),
        Packet::PingReq => {
            buf.put_u8(0xC0);
            buf.put_u8(0x00);
            Ok(())
        }
        Packet::PingResp => {
            buf.put_u8(0xD0);
            buf.put_u8(0x00);
            Ok(())
        }
        Packet::Disconnect => {
            buf.put_u8(0xE0);
            buf.put_u8(0x00);
            Ok(())
        }
    }
}

/// Encode a packet and write it to the stream in one call.
pub fn write_packet<W: Write>(packet: &Packet, w: &mut W) -> Result<(), CodecError> {
    let mut buf = BytesMut::new();
    encode(packet, &mut buf)?;
    w.write_all(&buf)?;
    Ok(())
}

fn encode_connect(packet: &Connect, buf: &mut BytesMut) -> Result<(), EncodeError> {
    // Protocol name + level + connect flags + keep alive
    let mut remaining_length = 6 + 1 + 1 + 2;

    remaining_length += field_len(packet.client_id.len());

    if let Some(ref will) = packet.will {
        remaining_length += field_len(will.topic.len());
        remaining_length += field_len(will.payload.len());
    }

    if let Some(ref username) = packet.username {
        remaining_length += field_len(username.len());
    }

    if let Some(ref password) = packet.password {
        remaining_length += field_len(password.len());
    }

    buf.put_u8(0x10);
    write_remaining_length(buf, remaining_length as u32)?;

    write_string(buf, "MQTT");
    buf.put_u8(0x04); // protocol level 4

    let mut connect_flags: u8 = 0;
    if packet.clean_session {
        connect_flags |= 0x02;
    }
    if let Some(ref will) = packet.will {
        connect_flags |= 0x04;
        connect_flags |= (will.qos as u8) << 3;
        if will.retain {
            connect_flags |= 0x20;
        }
    }
    if packet.password.is_some() {
        connect_flags |= 0x40;
    }
    if packet.username.is_some() {
        connect_flags |= 0x80;
    }
    buf.put_u8(connect_flags);

    buf.put_u16(packet.keep_alive);

    write_string(buf, &packet.client_id);

    if let Some(ref will) = packet.will {
        write_string(buf, &will.topic);
        write_binary(buf, &will.payload);
    }

    if let Some(ref username) = packet.username {
        write_string(buf, username);
    }

    if let Some(ref password) = packet.password {
        write_binary(buf, password);
    }

    Ok(())
}

fn encode_connack(packet: &ConnAck, buf: &mut BytesMut) -> Result<(), EncodeError> {
    buf.put_u8(0x20);
    buf.put_u8(0x02);
    buf.put_u8(if packet.session_present { 0x01 } else { 0x00 });
    buf.put_u8(packet.return_code as u8);
    Ok(())
}

fn encode_publish(packet: &Publish, buf: &mut BytesMut) -> Result<(), EncodeError> {
    let mut remaining_length = field_len(packet.topic.len());
    if packet.qos != QoS::AtMostOnce {
        remaining_length += 2;
    }
    remaining_length += packet.payload.len();

    let mut first_byte: u8 = 0x30;
    if packet.dup {
        first_byte |= 0x08;
    }
    first_byte |= (packet.qos as u8) << 1;
    if packet.retain {
        first_byte |= 0x01;
    }
    buf.put_u8(first_byte);
    write_remaining_length(buf, remaining_length as u32)?;

    write_string(buf, &packet.topic);

    if packet.qos != QoS::AtMostOnce {
        buf.put_u16(packet.packet_id.unwrap_or(0));
    }

    buf.put_slice(&packet.payload);

    Ok(())
}

/// PUBACK/PUBREC/PUBREL/PUBCOMP/UNSUBACK all encode as a first byte plus a
/// two-byte body holding the packet identifier.
fn encode_ack(first_byte: u8, packet_id: u16, buf: &mut BytesMut) -> Result<(), EncodeError> {
    buf.put_u8(first_byte);
    buf.put_u8(0x02);
    buf.put_u16(packet_id);
    Ok(())
}

fn encode_subscribe(packet: &Subscribe, buf: &mut BytesMut) -> Result<(), EncodeError> {
    let mut remaining_length = 2;
    for sub in &packet.subscriptions {
        remaining_length += field_len(sub.filter.len()) + 1;
    }

    buf.put_u8(0x82); // SUBSCRIBE carries flags 0010
    write_remaining_length(buf, remaining_length as u32)?;

    buf.put_u16(packet.packet_id);

    for sub in &packet.subscriptions {
        write_string(buf, &sub.filter);
        buf.put_u8(sub.qos as u8);
    }

    Ok(())
}

fn encode_suback(packet: &SubAck, buf: &mut BytesMut) -> Result<(), EncodeError> {
    let remaining_length = 2 + packet.return_codes.len();

    buf.put_u8(0x90);
    write_remaining_length(buf, remaining_length as u32)?;

    buf.put_u16(packet.packet_id);
    for code in &packet.return_codes {
        buf.put_u8(code.to_u8());
    }

    Ok(())
}

fn encode_unsubscribe(packet: &Unsubscribe, buf: &mut BytesMut) -> Result<(), EncodeError> {
    let mut remaining_length = 2;
    for filter in &packet.filters {
        remaining_length += field_len(filter.len());
    }

    buf.put_u8(0xA2); // UNSUBSCRIBE carries flags 0010
    write_remaining_length(buf, remaining_length as u32)?;

    buf.put_u16(packet.packet_id);
    for filter in &packet.filters {
        write_string(buf, filter);
    }

    Ok(())
}
