mod config;
mod tick;

use std::collections::VecDeque;

pub use config::EngineConfig;
pub use tick::TickTimer;

use crate::event::{ActivityLog, Effect, EffectSink, EngineEvent, NoEffects};
use crate::identity::Identity;
use crate::incantation::{ChargeSnapshot, IncantationBuffer};
use crate::net::{
    Heartbeat, MeshTransport, Message, NetworkStats, Position, SpellAck, SpellCast, SpellId,
    Subscription, TransportError,
};
use crate::presence::{PeerNode, PresenceChange, PresenceRegistry};
use crate::speech::{ListenerOutput, ListenerState, SpeechEngine, VoiceListener};
use crate::spell::{Caster, SpellError, SpellResolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhraseSource {
    Speech,
    Manual,
}

/// One participant's session. Owns the registry, the incantation buffer and
/// the transport subscription; everything runs on the caller's thread, one
/// handler at a time.
pub struct Engine {
    identity: Identity,
    position: Position,
    config: EngineConfig,
    transport: Box<dyn MeshTransport>,
    subscription: Option<Subscription>,
    registry: PresenceRegistry,
    buffer: IncantationBuffer,
    resolver: SpellResolver,
    listener: VoiceListener,
    effects: Box<dyn EffectSink>,
    heartbeat: TickTimer,
    log: ActivityLog,
    events: VecDeque<EngineEvent>,
    transcript: String,
    last_poll_error: Option<String>,
    last_publish_error: Option<String>,
}

impl Engine {
    pub fn new(
        identity: Identity,
        mut transport: Box<dyn MeshTransport>,
        config: EngineConfig,
        now: u64,
    ) -> Self {
        let subscription = transport.subscribe();
        let mut log = ActivityLog::new(config.log_capacity);
        log.system(
            now,
            format!("System initialized. Device ID: {}...", identity.short_id()),
        );

        Self {
            registry: PresenceRegistry::new(identity.id.clone()),
            buffer: IncantationBuffer::new(
                config.incantation_window_ms,
                config.required_repetitions,
            ),
            resolver: SpellResolver::new(config.spell_range_meters),
            listener: VoiceListener::new(None, config.restart_backoff_ms),
            heartbeat: TickTimer::new(config.heartbeat_period_ms),
            effects: Box::new(NoEffects),
            subscription: Some(subscription),
            position: Position::default(),
            events: VecDeque::new(),
            transcript: String::new(),
            last_poll_error: None,
            last_publish_error: None,
            identity,
            transport,
            config,
            log,
        }
    }

    pub fn with_effects(mut self, effects: impl EffectSink + 'static) -> Self {
        self.effects = Box::new(effects);
        self
    }

    pub fn with_speech(mut self, engine: impl SpeechEngine + 'static) -> Self {
        self.listener = VoiceListener::new(Some(Box::new(engine)), self.config.restart_backoff_ms);
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn channel(&self) -> &str {
        self.transport.channel()
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub fn registry(&self) -> &PresenceRegistry {
        &self.registry
    }

    pub fn peers(&self) -> Vec<PeerNode> {
        self.registry.snapshot()
    }

    pub fn charges(&self) -> &ChargeSnapshot {
        self.buffer.charges()
    }

    pub fn buffer(&self) -> &IncantationBuffer {
        &self.buffer
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn listener_state(&self) -> ListenerState {
        self.listener.state()
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    /// For hosts that need to record their own entries, e.g. a transport
    /// fallback decided before the engine existed.
    pub fn log_mut(&mut self) -> &mut ActivityLog {
        &mut self.log
    }

    pub fn stats(&self) -> &NetworkStats {
        self.transport.stats()
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = EngineEvent> + '_ {
        self.events.drain(..)
    }

    /// One pass of the event loop: inbound traffic, speech, then the
    /// heartbeat tick when its period has elapsed.
    pub fn update(&mut self, now: u64) {
        self.pump(now);
        self.update_listener(now);

        if self.heartbeat.poll(now) {
            self.tick(now);
        }
    }

    /// Broadcasts presence and drops peers that went quiet.
    pub fn tick(&mut self, now: u64) {
        let heartbeat = Message::Heartbeat(Heartbeat {
            sender_id: self.identity.id.clone(),
            name: self.identity.name.clone(),
            position: self.position,
            timestamp: now,
        });
        match self.transport.publish(heartbeat) {
            Ok(()) => self.last_publish_error = None,
            Err(e) => note_network_error(&mut self.log, &mut self.last_publish_error, now, e),
        }

        for peer in self.registry.prune(now, self.config.peer_timeout_ms) {
            self.log.system(now, format!("{} left the mesh", peer.name));
            self.events.push_back(EngineEvent::PeerLeft {
                id: peer.id,
                name: peer.name,
            });
        }
    }

    /// Pulls everything the medium delivered and handles it in order.
    pub fn pump(&mut self, now: u64) -> usize {
        match self.transport.poll() {
            Ok(_) => self.last_poll_error = None,
            Err(e) => note_network_error(&mut self.log, &mut self.last_poll_error, now, e),
        }
        self.dispatch_inbox(now)
    }

    pub fn submit_phrase(&mut self, text: &str, source: PhraseSource, now: u64) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        match source {
            PhraseSource::Speech => {
                self.transcript = text.to_string();
                self.log.info(now, format!("Recognized: \"{}\"", text));
            }
            PhraseSource::Manual => {
                self.log.info(now, format!("Manual Input: \"{}\"", text));
            }
        }

        let charged = self.buffer.append(text, now);

        let mut cast_any = false;
        for (target, _count) in charged {
            if self.attempt_cast(&target, self.config.spell, now).is_ok() {
                cast_any = true;
            }
        }

        // Whole-buffer reset so leftover repetitions cannot fire again.
        if cast_any {
            self.buffer.clear();
        }

        self.dispatch_inbox(now);
    }

    /// Resolves `target` and casts `spell` on it. Failures are logged and
    /// returned; nothing is sent for them.
    pub fn attempt_cast(
        &mut self,
        target: &str,
        spell: SpellId,
        now: u64,
    ) -> Result<SpellCast, SpellError> {
        let caster = Caster {
            identity: &self.identity,
            position: self.position,
        };

        match self.resolver.attempt_cast(
            &self.registry,
            self.transport.as_mut(),
            caster,
            target,
            spell,
            now,
        ) {
            Ok(cast) => {
                self.events.push_back(EngineEvent::CastSent {
                    cast_id: cast.cast_id.clone(),
                    spell: cast.spell_id,
                    target_id: cast.target_id.clone(),
                });
                Ok(cast)
            }
            Err(e) => {
                self.log.error(now, e.to_string());
                self.events.push_back(EngineEvent::CastFailed {
                    target: target.to_string(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    pub fn start_listening(&mut self, now: u64) {
        let outputs = self.listener.start(now);
        self.apply_listener_outputs(outputs, now);
    }

    pub fn stop_listening(&mut self) {
        self.listener.stop();
    }

    /// Leaves the mesh and silences speech input. The engine stays readable
    /// afterwards but no longer receives traffic.
    pub fn shutdown(&mut self) {
        self.listener.stop();
        if let Some(subscription) = self.subscription.take() {
            self.transport.unsubscribe(subscription.id());
        }
    }

    fn dispatch_inbox(&mut self, now: u64) -> usize {
        let mut handled = 0;
        loop {
            let messages = match self.subscription.as_mut() {
                Some(subscription) => subscription.drain(),
                None => return handled,
            };
            if messages.is_empty() {
                return handled;
            }
            handled += messages.len();
            for message in messages {
                self.handle_message(message, now);
            }
        }
    }

    fn handle_message(&mut self, message: Message, now: u64) {
        match message {
            Message::Heartbeat(heartbeat) => self.handle_heartbeat(&heartbeat, now),
            Message::SpellCast(cast) => self.handle_cast(&cast, now),
            Message::SpellAck(ack) => self.handle_ack(&ack, now),
        }
    }

    fn handle_heartbeat(&mut self, heartbeat: &Heartbeat, now: u64) {
        if self.registry.ingest(heartbeat, now) == PresenceChange::Joined {
            self.log
                .system(now, format!("{} joined the mesh", heartbeat.name));
            self.events.push_back(EngineEvent::PeerJoined {
                id: heartbeat.sender_id.clone(),
                name: heartbeat.name.clone(),
            });
        }
    }

    fn handle_cast(&mut self, cast: &SpellCast, now: u64) {
        if cast.sender_id == self.identity.id {
            let target = self
                .registry
                .get(&cast.target_id)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| cast.target_id.clone());
            self.log
                .combat(now, format!("Casting [{}] on {}...", cast.spell_id, target));
            return;
        }

        self.log
            .combat(now, format!("{} cast [{}]", cast.name, cast.spell_id));

        if cast.target_id == self.identity.id {
            self.log.error(
                now,
                format!("*** HIT BY {} ***", cast.spell_id.as_str().to_uppercase()),
            );
            self.events.push_back(EngineEvent::EffectReceived(Effect {
                spell: cast.spell_id,
                caster_name: cast.name.clone(),
                cast_id: cast.cast_id.clone(),
            }));
        }

        if let Err(e) = self.resolver.on_cast_received(
            cast,
            &self.identity,
            self.effects.as_mut(),
            self.transport.as_mut(),
            now,
        ) {
            self.log
                .error(now, format!("Could not acknowledge cast: {}", e));
        }
    }

    fn handle_ack(&mut self, ack: &SpellAck, now: u64) {
        self.log.system(now, self.resolver.on_ack_received(ack));
        self.events.push_back(EngineEvent::AckReceived {
            cast_id: ack.cast_id.clone(),
            from: ack.name.clone(),
            success: ack.success,
        });
    }

    fn update_listener(&mut self, now: u64) {
        let outputs = self.listener.update(now);
        self.apply_listener_outputs(outputs, now);
    }

    fn apply_listener_outputs(&mut self, outputs: Vec<ListenerOutput>, now: u64) {
        for output in outputs {
            match output {
                ListenerOutput::Phrase {
                    text,
                    recognized_at,
                } => self.submit_phrase(&text, PhraseSource::Speech, recognized_at),
                ListenerOutput::Interim(text) => self.transcript = text,
                ListenerOutput::System(message) => {
                    self.log.system(now, message);
                }
                ListenerOutput::Error(e) => {
                    self.log.error(now, e.to_string());
                }
            }
        }
    }
}

/// Logs a transport failure unless it repeats the last one seen on the same
/// path. Publish and poll each keep their own `last`.
fn note_network_error(
    log: &mut ActivityLog,
    last: &mut Option<String>,
    now: u64,
    error: TransportError,
) {
    let message = format!("Network error: {}", error);
    if last.as_deref() != Some(message.as_str()) {
        log.error(now, message.clone());
        *last = Some(message);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
