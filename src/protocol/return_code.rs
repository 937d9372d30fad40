//! CONNACK and SUBACK return code taxonomies

use super::QoS;

/// CONNACK return codes.
///
/// Codes `0x00`-`0x05` come from the broker; `NetworkError` and
/// `ProtocolViolation` are produced locally by the client when a connect
/// attempt dies before a CONNACK arrives, and never appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectReturnCode {
    Accepted = 0x00,
    BadProtocolVersion = 0x01,
    IdentifierRejected = 0x02,
    ServerUnavailable = 0x03,
    BadCredentials = 0x04,
    NotAuthorized = 0x05,
    /// Client-local synthetic code
    NetworkError = 0xFE,
    /// Client-local synthetic code
    ProtocolViolation = 0xFF,
}

impl ConnectReturnCode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x00 => Some(Self::Accepted),
            0x01 => Some(Self::BadProtocolVersion),
            0x02 => Some(Self::IdentifierRejected),
            0x03 => Some(Self::ServerUnavailable),
            0x04 => Some(Self::BadCredentials),
            0x05 => Some(Self::NotAuthorized),
            0xFE => Some(Self::NetworkError),
            0xFF => Some(Self::ProtocolViolation),
            _ => None,
        }
    }

    pub fn is_accepted(self) -> bool {
        self == Self::Accepted
    }
}

impl std::fmt::Display for ConnectReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Accepted => "Connection Accepted",
            Self::BadProtocolVersion => "Connection Refused: Bad Protocol Version",
            Self::IdentifierRejected => "Connection Refused: Client Identifier Rejected",
            Self::ServerUnavailable => "Connection Refused: Server Unavailable",
            Self::BadCredentials => "Connection Refused: Username or Password in unknown format",
            Self::NotAuthorized => "Connection Refused: Not Authorised",
            Self::NetworkError => "Connection Error",
            Self::ProtocolViolation => "Connection Refused: Protocol Violation",
        };
        f.write_str(text)
    }
}

/// Per-filter result carried in a SUBACK payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeReturnCode {
    /// Subscription accepted at the given maximum QoS
    Granted(QoS),
    /// Subscription refused (0x80)
    Failure,
}

impl SubscribeReturnCode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x80 => Some(Self::Failure),
            _ => QoS::from_u8(v).map(Self::Granted),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Granted(qos) => qos as u8,
            Self::Failure => 0x80,
        }
    }
}
