use crate::event::{Effect, EffectSink};
use crate::identity::Identity;
use crate::incantation::incantation_for;
use crate::net::{
    MeshTransport, Message, Position, SPELL_RANGE_METERS, SpellAck, SpellCast, SpellId,
    TransportError,
};
use crate::presence::{PeerNode, PresenceRegistry};

pub const IMPACT_MESSAGE: &str = "Target impacted successfully.";

#[derive(Debug, thiserror::Error)]
pub enum SpellError {
    #[error("Target '{target}' not found or out of signal range.")]
    TargetNotFound { target: String },
    #[error("Target '{target}' is too far ({distance:.1}m > {range}m).")]
    OutOfRange {
        target: String,
        distance: f64,
        range: f64,
    },
    #[error("cast could not be sent: {0}")]
    Transport(#[from] TransportError),
}

/// Who is casting, and from where.
#[derive(Debug, Clone, Copy)]
pub struct Caster<'a> {
    pub identity: &'a Identity,
    pub position: Position,
}

#[derive(Debug, Clone, Copy)]
pub struct SpellResolver {
    range_meters: f64,
}

impl Default for SpellResolver {
    fn default() -> Self {
        Self::new(SPELL_RANGE_METERS)
    }
}

impl SpellResolver {
    pub fn new(range_meters: f64) -> Self {
        Self { range_meters }
    }

    /// Looks the target up by name and checks the range gate. The boundary
    /// distance itself is in range.
    pub fn resolve<'r>(
        &self,
        registry: &'r PresenceRegistry,
        target_name: &str,
        origin: Position,
    ) -> Result<(&'r PeerNode, f64), SpellError> {
        let peer = registry
            .find_by_name(target_name)
            .ok_or_else(|| SpellError::TargetNotFound {
                target: target_name.to_string(),
            })?;

        let distance = peer.distance_from(&origin);
        if distance > self.range_meters {
            return Err(SpellError::OutOfRange {
                target: target_name.to_string(),
                distance,
                range: self.range_meters,
            });
        }

        Ok((peer, distance))
    }

    pub fn attempt_cast(
        &self,
        registry: &PresenceRegistry,
        transport: &mut dyn MeshTransport,
        caster: Caster<'_>,
        target_name: &str,
        spell: SpellId,
        now: u64,
    ) -> Result<SpellCast, SpellError> {
        let (peer, distance) = self.resolve(registry, target_name, caster.position)?;

        let cast = SpellCast {
            sender_id: caster.identity.id.clone(),
            name: caster.identity.name.clone(),
            cast_id: uuid::Uuid::new_v4().to_string(),
            spell_id: spell,
            target_id: peer.id.clone(),
            incantation: incantation_for(target_name),
            source_range_meters: distance,
            timestamp: now,
        };

        transport.publish(Message::SpellCast(cast.clone()))?;
        log::info!(
            "cast {} [{}] on {} at {:.1}m",
            cast.cast_id,
            spell,
            peer.name,
            distance
        );

        Ok(cast)
    }

    /// Applies a cast addressed to `me` and acknowledges it. Casts for anyone
    /// else return `Ok(None)`.
    pub fn on_cast_received(
        &self,
        cast: &SpellCast,
        me: &Identity,
        effects: &mut dyn EffectSink,
        transport: &mut dyn MeshTransport,
        now: u64,
    ) -> Result<Option<SpellAck>, TransportError> {
        if cast.target_id != me.id {
            return Ok(None);
        }

        effects.on_effect(&Effect {
            spell: cast.spell_id,
            caster_name: cast.name.clone(),
            cast_id: cast.cast_id.clone(),
        });

        let ack = SpellAck {
            sender_id: me.id.clone(),
            name: me.name.clone(),
            cast_id: cast.cast_id.clone(),
            success: true,
            result_message: IMPACT_MESSAGE.to_string(),
            timestamp: now,
        };
        transport.publish(Message::SpellAck(ack.clone()))?;

        Ok(Some(ack))
    }

    pub fn on_ack_received(&self, ack: &SpellAck) -> String {
        if ack.success {
            format!("ACK from {}: {}", ack.name, ack.result_message)
        } else {
            format!("NACK from {}: {}", ack.name, ack.result_message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RecordingEffects;
    use crate::net::{MessageKind, OfflineMesh};

    fn setup(peer_at: Position) -> (PresenceRegistry, Identity) {
        let me = Identity::new("me", "Riven-1");
        let mut registry = PresenceRegistry::new("me");
        registry.upsert("b", "Bob", peer_at, 0);
        (registry, me)
    }

    #[test]
    fn unknown_target_is_not_found() {
        let (registry, _) = setup(Position::new(1.0, 0.0));
        let err = SpellResolver::default()
            .resolve(&registry, "Alice", Position::default())
            .unwrap_err();

        assert!(matches!(err, SpellError::TargetNotFound { .. }));
        assert_eq!(
            err.to_string(),
            "Target 'Alice' not found or out of signal range."
        );
    }

    #[test]
    fn range_gate_is_inclusive() {
        let resolver = SpellResolver::default();

        let (registry, _) = setup(Position::new(6.1, 0.0));
        let (_, distance) = resolver
            .resolve(&registry, "bob", Position::default())
            .unwrap();
        assert_eq!(distance, 6.1);

        let (registry, _) = setup(Position::new(6.1000001, 0.0));
        let err = resolver
            .resolve(&registry, "bob", Position::default())
            .unwrap_err();
        assert!(matches!(err, SpellError::OutOfRange { .. }));
        assert_eq!(err.to_string(), "Target 'bob' is too far (6.1m > 6.1m).");
    }

    #[test]
    fn successful_cast_is_published_and_echoed() {
        let (registry, me) = setup(Position::new(5.0, 0.0));
        let mut mesh = OfflineMesh::new("room");
        let mut sub = mesh.subscribe();

        let cast = SpellResolver::default()
            .attempt_cast(
                &registry,
                &mut mesh,
                Caster {
                    identity: &me,
                    position: Position::default(),
                },
                "Bob",
                SpellId::Shove,
                42,
            )
            .unwrap();

        assert_eq!(cast.target_id, "b");
        assert_eq!(cast.sender_id, "me");
        assert_eq!(cast.source_range_meters, 5.0);
        assert_eq!(cast.incantation, "Bob, my power shoves thee");

        let echoed = sub.drain();
        assert_eq!(echoed.len(), 1);
        assert_eq!(echoed[0], Message::SpellCast(cast));
    }

    #[test]
    fn out_of_range_cast_publishes_nothing() {
        let (registry, me) = setup(Position::new(10.0, 0.0));
        let mut mesh = OfflineMesh::new("room");
        let mut sub = mesh.subscribe();

        let result = SpellResolver::default().attempt_cast(
            &registry,
            &mut mesh,
            Caster {
                identity: &me,
                position: Position::default(),
            },
            "Bob",
            SpellId::Shove,
            42,
        );

        assert!(matches!(result, Err(SpellError::OutOfRange { .. })));
        assert!(sub.try_next().is_none());
    }

    #[test]
    fn cast_for_me_triggers_effect_and_ack() {
        let me = Identity::new("b", "Bob");
        let mut mesh = OfflineMesh::new("room");
        let mut sub = mesh.subscribe();
        let mut effects = RecordingEffects::default();

        let cast = SpellCast {
            sender_id: "a".to_string(),
            name: "Alice".to_string(),
            cast_id: "c-9".to_string(),
            spell_id: SpellId::Shove,
            target_id: "b".to_string(),
            incantation: String::new(),
            source_range_meters: 5.0,
            timestamp: 0,
        };

        let ack = SpellResolver::default()
            .on_cast_received(&cast, &me, &mut effects, &mut mesh, 7)
            .unwrap()
            .unwrap();

        assert!(ack.success);
        assert_eq!(ack.cast_id, "c-9");
        assert_eq!(effects.effects().len(), 1);
        assert_eq!(effects.effects()[0].caster_name, "Alice");

        let sent = sub.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind(), MessageKind::SpellAck);
    }

    #[test]
    fn cast_for_someone_else_is_ignored() {
        let me = Identity::new("c", "Carol");
        let mut mesh = OfflineMesh::new("room");
        let mut effects = RecordingEffects::default();

        let cast = SpellCast {
            sender_id: "a".to_string(),
            name: "Alice".to_string(),
            cast_id: "c-9".to_string(),
            spell_id: SpellId::Pull,
            target_id: "b".to_string(),
            incantation: String::new(),
            source_range_meters: 5.0,
            timestamp: 0,
        };

        let ack = SpellResolver::default()
            .on_cast_received(&cast, &me, &mut effects, &mut mesh, 7)
            .unwrap();

        assert!(ack.is_none());
        assert!(effects.effects().is_empty());
    }

    #[test]
    fn ack_summary() {
        let ack = SpellAck {
            sender_id: "b".to_string(),
            name: "Bob".to_string(),
            cast_id: "c".to_string(),
            success: true,
            result_message: IMPACT_MESSAGE.to_string(),
            timestamp: 0,
        };
        assert_eq!(
            SpellResolver::default().on_ack_received(&ack),
            "ACK from Bob: Target impacted successfully."
        );
    }
}
