//! Protocol error types

use std::fmt;
use std::io;

/// Errors that can occur while decoding a packet body.
///
/// Every variant is a protocol violation: the peer produced bytes that do
/// not form a legal MQTT v3.1.1 packet. Transport failures are reported
/// separately as [`CodecError::Io`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Packet body ended before the field being read was complete
    UnexpectedEof,
    /// Unknown packet type nibble
    InvalidPacketType(u8),
    /// Remaining length field ran past its 4-byte maximum
    MalformedRemainingLength,
    /// Protocol name was not "MQTT" (or the legacy "MQIsdp")
    InvalidProtocolName,
    /// Unsupported protocol level
    InvalidProtocolLevel(u8),
    /// Invalid QoS value
    InvalidQoS(u8),
    /// String field was not valid UTF-8
    InvalidUtf8,
    /// Invalid CONNACK or SUBACK return code
    InvalidReturnCode(u8),
    /// Fixed-header flags illegal for the packet type
    InvalidFlags,
    /// Malformed packet
    MalformedPacket(&'static str),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "packet body shorter than its remaining length"),
            Self::InvalidPacketType(t) => write!(f, "invalid packet type: {}", t),
            Self::MalformedRemainingLength => write!(f, "malformed remaining length encoding"),
            Self::InvalidProtocolName => write!(f, "invalid protocol name"),
            Self::InvalidProtocolLevel(v) => write!(f, "invalid protocol level: {}", v),
            Self::InvalidQoS(q) => write!(f, "invalid QoS value: {}", q),
            Self::InvalidUtf8 => write!(f, "invalid UTF-8 string"),
            Self::InvalidReturnCode(c) => write!(f, "invalid return code: {}", c),
            Self::InvalidFlags => write!(f, "invalid packet flags"),
            Self::MalformedPacket(msg) => write!(f, "malformed packet: {}", msg),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Errors that can occur during packet encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Remaining length exceeds the protocol maximum (268,435,455 bytes)
    PacketTooLarge,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PacketTooLarge => write!(f, "packet too large"),
        }
    }
}

impl std::error::Error for EncodeError {}

/// Error returned by the stream-level reader/writer.
///
/// Transport errors pass through unchanged so the caller can apply its own
/// retry policy; malformed content is reported distinctly because the
/// connection itself may still be usable.
#[derive(Debug)]
pub enum CodecError {
    /// Transport error (short read, closed connection)
    Io(io::Error),
    /// The peer sent bytes that do not form a legal packet
    Decode(DecodeError),
    /// The packet could not be represented on the wire
    Encode(EncodeError),
}

impl CodecError {
    /// True when the error is a protocol violation rather than a transport
    /// failure.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::Decode(e) => write!(f, "decode error: {}", e),
            Self::Encode(e) => write!(f, "encode error: {}", e),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Decode(e) => Some(e),
            Self::Encode(e) => Some(e),
        }
    }
}

impl From<io::Error> for CodecError {
    fn from(e: io::Error) -> Self {
        CodecError::Io(e)
    }
}

impl From<DecodeError> for CodecError {
    fn from(e: DecodeError) -> Self {
        CodecError::Decode(e)
    }
}

impl From<EncodeError> for CodecError {
    fn from(e: EncodeError) -> Self {
        CodecError::Encode(e)
    }
}
