use serde::{Deserialize, Serialize};

use crate::event::DEFAULT_LOG_CAPACITY;
use crate::net::{
    HEARTBEAT_PERIOD_MS, INCANTATION_WINDOW_MS, PEER_TIMEOUT_MS, REQUIRED_REPETITIONS,
    RESTART_BACKOFF_MS, SPELL_RANGE_METERS, SpellId,
};

/// Timing and gameplay constants. Every participant in one mesh must agree
/// on these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub spell_range_meters: f64,
    pub incantation_window_ms: u64,
    pub required_repetitions: u32,
    pub heartbeat_period_ms: u64,
    pub peer_timeout_ms: u64,
    pub restart_backoff_ms: u64,
    pub log_capacity: usize,
    pub spell: SpellId,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            spell_range_meters: SPELL_RANGE_METERS,
            incantation_window_ms: INCANTATION_WINDOW_MS,
            required_repetitions: REQUIRED_REPETITIONS,
            heartbeat_period_ms: HEARTBEAT_PERIOD_MS,
            peer_timeout_ms: PEER_TIMEOUT_MS,
            restart_backoff_ms: RESTART_BACKOFF_MS,
            log_capacity: DEFAULT_LOG_CAPACITY,
            spell: SpellId::Shove,
        }
    }
}
