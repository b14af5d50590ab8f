pub mod engine;
pub mod event;
pub mod identity;
pub mod incantation;
pub mod net;
pub mod presence;
pub mod speech;
pub mod spell;
pub mod time;

pub use engine::{Engine, EngineConfig, PhraseSource, TickTimer};
pub use event::{
    ActivityLog, Effect, EffectSink, EngineEvent, LogEntry, LogKind, NoEffects, RecordingEffects,
};
pub use identity::{Identity, IdentityError};
pub use incantation::{
    ChargeSnapshot, INCANTATION_PHRASE, IncantationBuffer, IncantationPhrase, incantation_for,
};
pub use net::{
    DEFAULT_CHANNEL, DEFAULT_PORT, Heartbeat, LocalHub, LocalMesh, MeshTransport, Message,
    MessageKind, NetworkStats, OfflineMesh, Packet, PacketError, PacketHeader,
    PacketLossSimulation, PeerId, Position, SpellAck, SpellCast, SpellId, Subscription,
    TransportError, UdpMesh, UdpMeshConfig,
};
pub use presence::{PeerNode, PresenceChange, PresenceRegistry};
pub use speech::{ListenerOutput, ListenerState, SpeechEngine, SpeechError, SpeechEvent, VoiceListener};
pub use spell::{Caster, SpellError, SpellResolver};
