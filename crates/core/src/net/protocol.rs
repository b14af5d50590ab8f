use std::fmt;

use rkyv::{Archive, Deserialize, Serialize, rancor};

pub const MAX_PACKET_SIZE: usize = 1200;
pub const PROTOCOL_VERSION: u32 = 2;
pub const PROTOCOL_MAGIC: u32 = 0x5350_4C4D;
pub const DEFAULT_PORT: u16 = 27315;
pub const DEFAULT_GROUP: [u8; 4] = [239, 255, 42, 99];
pub const DEFAULT_CHANNEL: &str = "spellcast-mesh-v2";

pub const SPELL_RANGE_METERS: f64 = 6.1;
pub const INCANTATION_WINDOW_MS: u64 = 5000;
pub const REQUIRED_REPETITIONS: u32 = 3;
pub const HEARTBEAT_PERIOD_MS: u64 = 500;
pub const PEER_TIMEOUT_MS: u64 = 5000;
pub const RESTART_BACKOFF_MS: u64 = 1000;

pub type PeerId = String;

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[rkyv(derive(Debug))]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        glam::DVec2::new(self.x, self.y).distance(glam::DVec2::new(other.x, other.y))
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[rkyv(compare(PartialEq), derive(Debug))]
#[serde(rename_all = "lowercase")]
pub enum SpellId {
    #[default]
    Shove,
    Pull,
    Ignite,
}

impl SpellId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpellId::Shove => "shove",
            SpellId::Pull => "pull",
            SpellId::Ignite => "ignite",
        }
    }

    /// Past participle used in the spoken feedback line.
    pub fn verb(&self) -> &'static str {
        match self {
            SpellId::Shove => "shoved",
            SpellId::Pull => "pulled",
            SpellId::Ignite => "ignited",
        }
    }
}

impl fmt::Display for SpellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct Heartbeat {
    pub sender_id: PeerId,
    pub name: String,
    pub position: Position,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct SpellCast {
    pub sender_id: PeerId,
    pub name: String,
    pub cast_id: String,
    pub spell_id: SpellId,
    pub target_id: PeerId,
    pub incantation: String,
    pub source_range_meters: f64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct SpellAck {
    pub sender_id: PeerId,
    pub name: String,
    pub cast_id: String,
    pub success: bool,
    pub result_message: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Heartbeat,
    SpellCast,
    SpellAck,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Heartbeat => "HEARTBEAT",
            MessageKind::SpellCast => "SPELL_CAST",
            MessageKind::SpellAck => "SPELL_ACK",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum Message {
    Heartbeat(Heartbeat),
    SpellCast(SpellCast),
    SpellAck(SpellAck),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Heartbeat(_) => MessageKind::Heartbeat,
            Message::SpellCast(_) => MessageKind::SpellCast,
            Message::SpellAck(_) => MessageKind::SpellAck,
        }
    }

    pub fn sender_id(&self) -> &str {
        match self {
            Message::Heartbeat(m) => &m.sender_id,
            Message::SpellCast(m) => &m.sender_id,
            Message::SpellAck(m) => &m.sender_id,
        }
    }

    pub fn sender_name(&self) -> &str {
        match self {
            Message::Heartbeat(m) => &m.name,
            Message::SpellCast(m) => &m.name,
            Message::SpellAck(m) => &m.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(compare(PartialEq), derive(Debug))]
pub struct PacketHeader {
    pub magic: u32,
    pub version: u32,
    pub channel: String,
}

impl PacketHeader {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            version: PROTOCOL_VERSION,
            channel: channel.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == PROTOCOL_MAGIC && self.version == PROTOCOL_VERSION
    }
}

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Message,
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
    #[error("packet of {0} bytes exceeds MTU")]
    TooLarge(usize),
}

impl Packet {
    pub fn new(channel: impl Into<String>, payload: Message) -> Self {
        Self {
            header: PacketHeader::new(channel),
            payload,
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        let bytes = rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(PacketError::Serialize)?;

        if bytes.len() > MAX_PACKET_SIZE {
            return Err(PacketError::TooLarge(bytes.len()));
        }

        Ok(bytes)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, PacketError> {
        // Datagram buffers carry no alignment guarantee.
        let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(data.len());
        aligned.extend_from_slice(data);
        rkyv::from_bytes::<Self, rancor::Error>(&aligned).map_err(PacketError::Deserialize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cast() -> Message {
        Message::SpellCast(SpellCast {
            sender_id: "a-1".to_string(),
            name: "Riven-12".to_string(),
            cast_id: "c-1".to_string(),
            spell_id: SpellId::Shove,
            target_id: "b-2".to_string(),
            incantation: "Bob, my power shoves thee".to_string(),
            source_range_meters: 5.0,
            timestamp: 1_700_000_000_000,
        })
    }

    #[test]
    fn test_packet_serialization() {
        let packet = Packet::new(DEFAULT_CHANNEL, cast());

        let serialized = packet.serialize().unwrap();
        let deserialized = Packet::deserialize(&serialized).unwrap();

        assert_eq!(packet, deserialized);
        assert!(deserialized.header.is_valid());
        assert_eq!(deserialized.payload.kind(), MessageKind::SpellCast);
    }

    #[test]
    fn test_unaligned_datagram_decodes() {
        let packet = Packet::new(
            "room",
            Message::Heartbeat(Heartbeat {
                sender_id: "a".to_string(),
                name: "Lux-3".to_string(),
                position: Position::new(1.5, -2.0),
                timestamp: 42,
            }),
        );
        let serialized = packet.serialize().unwrap();

        let mut shifted = vec![0u8];
        shifted.extend_from_slice(&serialized);

        let decoded = Packet::deserialize(&shifted[1..]).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(Packet::deserialize(&[1, 2, 3, 4, 5, 6, 7, 8, 9]).is_err());
    }

    #[test]
    fn test_oversized_packet_rejected() {
        let packet = Packet::new(
            "room",
            Message::SpellAck(SpellAck {
                sender_id: "a".to_string(),
                name: "x".repeat(MAX_PACKET_SIZE),
                cast_id: "c".to_string(),
                success: true,
                result_message: String::new(),
                timestamp: 0,
            }),
        );

        assert!(matches!(packet.serialize(), Err(PacketError::TooLarge(_))));
    }

    #[test]
    fn test_distance_boundary_is_exact() {
        let origin = Position::new(0.0, 0.0);
        assert_eq!(origin.distance_to(&Position::new(6.1, 0.0)), 6.1);
        assert_eq!(origin.distance_to(&Position::new(3.0, 4.0)), 5.0);
    }

    #[test]
    fn test_message_accessors() {
        let message = cast();
        assert_eq!(message.sender_id(), "a-1");
        assert_eq!(message.sender_name(), "Riven-12");
        assert_eq!(message.kind().as_str(), "SPELL_CAST");
    }
}
