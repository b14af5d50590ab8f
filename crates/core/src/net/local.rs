use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::protocol::{Message, Packet, PeerId};
use super::stats::{NetworkStats, PacketLossSimulation};
use super::transport::{
    EchoPolicy, MeshTransport, Subscribers, Subscription, SubscriptionId, TransportError,
    accept_inbound,
};

#[derive(Debug)]
struct HubMember {
    member_id: u64,
    channel: String,
    inbox: UnboundedSender<Vec<u8>>,
}

#[derive(Debug, Default)]
struct HubInner {
    members: Vec<HubMember>,
    next_member_id: u64,
}

/// In-process broadcast medium. Every member joined on a channel receives the
/// datagrams of every other member on that channel.
#[derive(Debug, Clone, Default)]
pub struct LocalHub {
    inner: Arc<Mutex<HubInner>>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, channel: impl Into<String>, local_id: impl Into<PeerId>) -> LocalMesh {
        let channel = channel.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let member_id = {
            let mut inner = self.lock();
            let member_id = inner.next_member_id;
            inner.next_member_id += 1;
            inner.members.push(HubMember {
                member_id,
                channel: channel.clone(),
                inbox: tx,
            });
            member_id
        };

        LocalMesh {
            hub: self.clone(),
            member_id,
            channel,
            local_id: local_id.into(),
            inbox: rx,
            echo: EchoPolicy::default(),
            subscribers: Subscribers::new(),
            stats: NetworkStats::default(),
            packet_loss: PacketLossSimulation::default(),
        }
    }

    pub fn member_count(&self) -> usize {
        self.lock().members.len()
    }

    fn broadcast(&self, from: u64, channel: &str, datagram: &[u8]) -> usize {
        let mut inner = self.lock();
        let mut delivered = 0;
        inner.members.retain(|member| {
            if member.member_id == from || member.channel != channel {
                return true;
            }
            let alive = member.inbox.send(datagram.to_vec()).is_ok();
            if alive {
                delivered += 1;
            }
            alive
        });
        delivered
    }

    fn leave(&self, member_id: u64) {
        self.lock().members.retain(|m| m.member_id != member_id);
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub struct LocalMesh {
    hub: LocalHub,
    member_id: u64,
    channel: String,
    local_id: PeerId,
    inbox: UnboundedReceiver<Vec<u8>>,
    echo: EchoPolicy,
    subscribers: Subscribers,
    stats: NetworkStats,
    packet_loss: PacketLossSimulation,
}

impl LocalMesh {
    pub fn set_packet_loss(&mut self, sim: PacketLossSimulation) {
        self.packet_loss = sim;
    }
}

impl MeshTransport for LocalMesh {
    fn channel(&self) -> &str {
        &self.channel
    }

    fn publish(&mut self, message: Message) -> Result<(), TransportError> {
        let packet = Packet::new(self.channel.clone(), message);
        let datagram = packet.serialize()?;

        if self.packet_loss.should_drop() {
            self.stats.packets_dropped += 1;
        } else {
            self.hub.broadcast(self.member_id, &self.channel, &datagram);
            self.stats.record_sent(datagram.len());
        }

        if self.echo.echoes(packet.payload.kind()) {
            self.subscribers.dispatch(&packet.payload);
        }

        Ok(())
    }

    fn subscribe(&mut self) -> Subscription {
        self.subscribers.subscribe()
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    fn poll(&mut self) -> Result<usize, TransportError> {
        let mut dispatched = 0;
        while let Ok(datagram) = self.inbox.try_recv() {
            if let Some(message) =
                accept_inbound(&datagram, &self.channel, &self.local_id, &mut self.stats)
            {
                self.subscribers.dispatch(&message);
                dispatched += 1;
            }
        }
        Ok(dispatched)
    }

    fn stats(&self) -> &NetworkStats {
        &self.stats
    }
}

impl Drop for LocalMesh {
    fn drop(&mut self) {
        self.hub.leave(self.member_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::{Heartbeat, MessageKind, Position, SpellAck, SpellCast, SpellId};

    fn heartbeat(sender: &str) -> Message {
        Message::Heartbeat(Heartbeat {
            sender_id: sender.to_string(),
            name: sender.to_string(),
            position: Position::new(1.0, 2.0),
            timestamp: 10,
        })
    }

    fn cast(sender: &str) -> Message {
        Message::SpellCast(SpellCast {
            sender_id: sender.to_string(),
            name: sender.to_string(),
            cast_id: "c-1".to_string(),
            spell_id: SpellId::Shove,
            target_id: "b".to_string(),
            incantation: String::new(),
            source_range_meters: 1.0,
            timestamp: 10,
        })
    }

    #[test]
    fn heartbeat_reaches_others_but_not_self() {
        let hub = LocalHub::new();
        let mut a = hub.join("room", "a");
        let mut b = hub.join("room", "b");
        let mut a_sub = a.subscribe();
        let mut b_sub = b.subscribe();

        a.publish(heartbeat("a")).unwrap();

        assert_eq!(a.poll().unwrap(), 0);
        assert_eq!(b.poll().unwrap(), 1);
        assert!(a_sub.try_next().is_none());
        assert_eq!(b_sub.try_next().unwrap(), heartbeat("a"));
    }

    #[test]
    fn casts_and_acks_echo_locally_once() {
        let hub = LocalHub::new();
        let mut a = hub.join("room", "a");
        let mut b = hub.join("room", "b");
        let mut a_sub = a.subscribe();
        let mut b_sub = b.subscribe();

        a.publish(cast("a")).unwrap();
        a.publish(Message::SpellAck(SpellAck {
            sender_id: "a".to_string(),
            name: "a".to_string(),
            cast_id: "c-1".to_string(),
            success: true,
            result_message: "done".to_string(),
            timestamp: 11,
        }))
        .unwrap();
        a.poll().unwrap();
        b.poll().unwrap();

        let echoed: Vec<MessageKind> = a_sub.drain().iter().map(Message::kind).collect();
        assert_eq!(echoed, vec![MessageKind::SpellCast, MessageKind::SpellAck]);
        assert_eq!(b_sub.drain().len(), 2);
    }

    #[test]
    fn channels_are_mutually_invisible() {
        let hub = LocalHub::new();
        let mut a = hub.join("room", "a");
        let mut c = hub.join("attic", "c");
        let mut c_sub = c.subscribe();

        a.publish(heartbeat("a")).unwrap();

        assert_eq!(c.poll().unwrap(), 0);
        assert!(c_sub.try_next().is_none());
    }

    #[test]
    fn dropped_member_leaves_hub() {
        let hub = LocalHub::new();
        let a = hub.join("room", "a");
        let _b = hub.join("room", "b");
        assert_eq!(hub.member_count(), 2);

        drop(a);
        assert_eq!(hub.member_count(), 1);
    }

    #[test]
    fn simulated_loss_still_echoes() {
        let hub = LocalHub::new();
        let mut a = hub.join("room", "a");
        let mut b = hub.join("room", "b");
        a.set_packet_loss(PacketLossSimulation::new(100.0));
        let mut a_sub = a.subscribe();

        a.publish(cast("a")).unwrap();

        assert_eq!(b.poll().unwrap(), 0);
        assert_eq!(a.stats().packets_dropped, 1);
        assert_eq!(a_sub.drain().len(), 1);
    }
}
