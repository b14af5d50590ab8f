mod activity;
mod types;

pub use activity::{ActivityLog, DEFAULT_LOG_CAPACITY, LogEntry};
pub use types::{Effect, EffectSink, EngineEvent, LogKind, NoEffects, RecordingEffects};
