mod endpoint;
mod local;
mod protocol;
mod stats;
mod transport;

pub use endpoint::{UdpMesh, UdpMeshConfig};
pub use local::{LocalHub, LocalMesh};
pub use protocol::{
    DEFAULT_CHANNEL, DEFAULT_GROUP, DEFAULT_PORT, HEARTBEAT_PERIOD_MS, Heartbeat,
    INCANTATION_WINDOW_MS, MAX_PACKET_SIZE, Message, MessageKind, PEER_TIMEOUT_MS,
    PROTOCOL_MAGIC, PROTOCOL_VERSION, Packet, PacketError, PacketHeader, PeerId, Position,
    REQUIRED_REPETITIONS, RESTART_BACKOFF_MS, SPELL_RANGE_METERS, SpellAck, SpellCast, SpellId,
};
pub use stats::{NetworkStats, PacketLossSimulation};
pub use transport::{
    EchoPolicy, MeshTransport, OfflineMesh, Subscribers, Subscription, SubscriptionId,
    TransportError,
};
