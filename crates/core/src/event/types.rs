use std::cell::RefCell;
use std::rc::Rc;

use crate::net::{PeerId, SpellId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogKind {
    Info,
    Combat,
    System,
    Error,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Info => "info",
            LogKind::Combat => "combat",
            LogKind::System => "system",
            LogKind::Error => "error",
        }
    }
}

/// A spell that landed on the local participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Effect {
    pub spell: SpellId,
    pub caster_name: String,
    pub cast_id: String,
}

impl Effect {
    /// Line spoken back to the target.
    pub fn announcement(&self) -> String {
        format!("You are {} by {}", self.spell.verb(), self.caster_name)
    }
}

/// Out-of-band feedback for received spells (speech, vibration, screen flash).
pub trait EffectSink {
    fn on_effect(&mut self, effect: &Effect);
}

#[derive(Debug, Default)]
pub struct NoEffects;

impl EffectSink for NoEffects {
    fn on_effect(&mut self, _effect: &Effect) {}
}

/// Keeps every effect it receives, in order. Clones share the same record,
/// so a handle kept outside the engine sees what the engine delivered.
#[derive(Debug, Clone, Default)]
pub struct RecordingEffects {
    effects: Rc<RefCell<Vec<Effect>>>,
}

impl RecordingEffects {
    pub fn effects(&self) -> Vec<Effect> {
        self.effects.borrow().clone()
    }
}

impl EffectSink for RecordingEffects {
    fn on_effect(&mut self, effect: &Effect) {
        self.effects.borrow_mut().push(effect.clone());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    PeerJoined {
        id: PeerId,
        name: String,
    },
    PeerLeft {
        id: PeerId,
        name: String,
    },
    CastSent {
        cast_id: String,
        spell: SpellId,
        target_id: PeerId,
    },
    CastFailed {
        target: String,
        reason: String,
    },
    EffectReceived(Effect),
    AckReceived {
        cast_id: String,
        from: String,
        success: bool,
    },
}
