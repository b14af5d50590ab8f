use std::io;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::protocol::{Message, MessageKind, Packet, PacketError};
use super::stats::NetworkStats;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("mesh channel unavailable: {0}")]
    Unavailable(#[source] io::Error),
    #[error("network error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error("mesh medium closed")]
    Closed,
}

/// Whether a published message is also delivered to the publisher's own
/// subscribers. Heartbeats stay off the local path; casts and acks are echoed
/// so the caster logs its own traffic without relying on medium loopback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoPolicy {
    pub heartbeat: bool,
    pub spell_cast: bool,
    pub spell_ack: bool,
}

impl Default for EchoPolicy {
    fn default() -> Self {
        Self {
            heartbeat: false,
            spell_cast: true,
            spell_ack: true,
        }
    }
}

impl EchoPolicy {
    pub fn echoes(&self, kind: MessageKind) -> bool {
        match kind {
            MessageKind::Heartbeat => self.heartbeat,
            MessageKind::SpellCast => self.spell_cast,
            MessageKind::SpellAck => self.spell_ack,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Inbox for one subscriber. Messages arrive in the order the transport
/// observed them.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    inbox: UnboundedReceiver<Message>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn try_next(&mut self) -> Option<Message> {
        self.inbox.try_recv().ok()
    }

    pub fn drain(&mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Some(message) = self.try_next() {
            messages.push(message);
        }
        messages
    }
}

#[derive(Debug, Default)]
pub struct Subscribers {
    senders: Vec<(SubscriptionId, UnboundedSender<Message>)>,
    next_id: u64,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Subscription {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.push((id, tx));

        Subscription { id, inbox: rx }
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.senders.len();
        self.senders.retain(|(sid, _)| *sid != id);
        self.senders.len() != before
    }

    pub fn dispatch(&mut self, message: &Message) {
        // Dropped subscriptions deregister themselves here.
        self.senders
            .retain(|(_, tx)| tx.send(message.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

pub trait MeshTransport {
    fn channel(&self) -> &str;

    /// Broadcast to every other participant on the channel, echoing locally
    /// according to the transport's [`EchoPolicy`].
    fn publish(&mut self, message: Message) -> Result<(), TransportError>;

    fn subscribe(&mut self) -> Subscription;

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool;

    /// Moves everything the medium has delivered into subscriber inboxes and
    /// returns the number of messages dispatched.
    fn poll(&mut self) -> Result<usize, TransportError>;

    fn stats(&self) -> &NetworkStats;
}

/// Checks an inbound datagram against the local channel and id. Returns the
/// message when it should be dispatched.
pub(crate) fn accept_inbound(
    data: &[u8],
    channel: &str,
    local_id: &str,
    stats: &mut NetworkStats,
) -> Option<Message> {
    let packet = match Packet::deserialize(data) {
        Ok(packet) => packet,
        Err(e) => {
            log::debug!("dropping undecodable datagram: {}", e);
            stats.packets_rejected += 1;
            return None;
        }
    };

    if !packet.header.is_valid() || packet.header.channel != channel {
        stats.packets_rejected += 1;
        return None;
    }

    stats.record_received(data.len());

    // Medium loopback; local echo already happened on publish.
    if packet.payload.sender_id() == local_id {
        return None;
    }

    Some(packet.payload)
}

/// Transport used when the shared medium cannot be opened. Publishes go
/// nowhere; local echoes still reach subscribers so the node keeps logging.
#[derive(Debug)]
pub struct OfflineMesh {
    channel: String,
    echo: EchoPolicy,
    subscribers: Subscribers,
    stats: NetworkStats,
}

impl OfflineMesh {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            echo: EchoPolicy::default(),
            subscribers: Subscribers::new(),
            stats: NetworkStats::default(),
        }
    }
}

impl MeshTransport for OfflineMesh {
    fn channel(&self) -> &str {
        &self.channel
    }

    fn publish(&mut self, message: Message) -> Result<(), TransportError> {
        if self.echo.echoes(message.kind()) {
            self.subscribers.dispatch(&message);
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
        Ok(0)
    }

    fn stats(&self) -> &NetworkStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::{Heartbeat, Position, SpellAck};

    fn heartbeat(sender: &str) -> Message {
        Message::Heartbeat(Heartbeat {
            sender_id: sender.to_string(),
            name: "Vi-7".to_string(),
            position: Position::default(),
            timestamp: 0,
        })
    }

    fn ack(sender: &str) -> Message {
        Message::SpellAck(SpellAck {
            sender_id: sender.to_string(),
            name: "Vi-7".to_string(),
            cast_id: "c".to_string(),
            success: true,
            result_message: "ok".to_string(),
            timestamp: 0,
        })
    }

    #[test]
    fn default_echo_policy() {
        let policy = EchoPolicy::default();
        assert!(!policy.echoes(MessageKind::Heartbeat));
        assert!(policy.echoes(MessageKind::SpellCast));
        assert!(policy.echoes(MessageKind::SpellAck));
    }

    #[test]
    fn subscribers_receive_in_order() {
        let mut subscribers = Subscribers::new();
        let mut first = subscribers.subscribe();
        let mut second = subscribers.subscribe();

        subscribers.dispatch(&heartbeat("a"));
        subscribers.dispatch(&ack("b"));

        for sub in [&mut first, &mut second] {
            let received = sub.drain();
            assert_eq!(received.len(), 2);
            assert_eq!(received[0].sender_id(), "a");
            assert_eq!(received[1].sender_id(), "b");
        }
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut subscribers = Subscribers::new();
        let mut sub = subscribers.subscribe();

        assert!(subscribers.unsubscribe(sub.id()));
        assert!(!subscribers.unsubscribe(sub.id()));

        subscribers.dispatch(&heartbeat("a"));
        assert!(sub.try_next().is_none());
    }

    #[test]
    fn dropped_subscription_is_pruned() {
        let mut subscribers = Subscribers::new();
        let sub = subscribers.subscribe();
        drop(sub);

        subscribers.dispatch(&heartbeat("a"));
        assert!(subscribers.is_empty());
    }

    #[test]
    fn accept_inbound_filters_channel_and_loopback() {
        let mut stats = NetworkStats::default();

        let other = Packet::new("room", heartbeat("peer")).serialize().unwrap();
        let own = Packet::new("room", heartbeat("me")).serialize().unwrap();
        let foreign = Packet::new("elsewhere", heartbeat("peer"))
            .serialize()
            .unwrap();

        assert!(accept_inbound(&other, "room", "me", &mut stats).is_some());
        assert!(accept_inbound(&own, "room", "me", &mut stats).is_none());
        assert!(accept_inbound(&foreign, "room", "me", &mut stats).is_none());
        assert!(accept_inbound(&[0u8; 4], "room", "me", &mut stats).is_none());

        assert_eq!(stats.packets_received, 2);
        assert_eq!(stats.packets_rejected, 2);
    }

    #[test]
    fn offline_mesh_echoes_only_casts_and_acks() {
        let mut mesh = OfflineMesh::new("room");
        let mut sub = mesh.subscribe();

        mesh.publish(heartbeat("me")).unwrap();
        mesh.publish(ack("me")).unwrap();

        assert_eq!(mesh.poll().unwrap(), 0);
        let received = sub.drain();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].kind(), MessageKind::SpellAck);
    }
}
