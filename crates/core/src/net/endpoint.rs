use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};

use super::protocol::{DEFAULT_GROUP, DEFAULT_PORT, MAX_PACKET_SIZE, Message, Packet, PeerId};
use super::stats::{NetworkStats, PacketLossSimulation};
use super::transport::{
    EchoPolicy, MeshTransport, Subscribers, Subscription, SubscriptionId, TransportError,
    accept_inbound,
};

#[derive(Debug, Clone)]
pub struct UdpMeshConfig {
    pub group: Ipv4Addr,
    pub port: u16,
    pub interface: Ipv4Addr,
    pub multicast_ttl: u32,
    pub packet_loss: PacketLossSimulation,
}

impl Default for UdpMeshConfig {
    fn default() -> Self {
        Self {
            group: Ipv4Addr::from(DEFAULT_GROUP),
            port: DEFAULT_PORT,
            interface: Ipv4Addr::UNSPECIFIED,
            multicast_ttl: 1,
            packet_loss: PacketLossSimulation::default(),
        }
    }
}

/// Mesh medium over IPv4 multicast. Every node bound to the same group and
/// port hears every datagram; the packet header's channel name separates
/// meshes that share a group.
pub struct UdpMesh {
    socket: UdpSocket,
    group: Ipv4Addr,
    interface: Ipv4Addr,
    group_addr: SocketAddr,
    channel: String,
    local_id: PeerId,
    echo: EchoPolicy,
    subscribers: Subscribers,
    stats: NetworkStats,
    packet_loss: PacketLossSimulation,
    recv_buffer: [u8; MAX_PACKET_SIZE],
}

impl UdpMesh {
    pub fn join(
        config: &UdpMeshConfig,
        channel: impl Into<String>,
        local_id: impl Into<PeerId>,
    ) -> Result<Self, TransportError> {
        let socket = Self::open_socket(config).map_err(TransportError::Unavailable)?;
        let channel = channel.into();

        log::info!(
            "Joined mesh '{}' on {}:{}",
            channel,
            config.group,
            config.port
        );

        Ok(Self {
            socket,
            group: config.group,
            interface: config.interface,
            group_addr: SocketAddr::V4(SocketAddrV4::new(config.group, config.port)),
            channel,
            local_id: local_id.into(),
            echo: EchoPolicy::default(),
            subscribers: Subscribers::new(),
            stats: NetworkStats::default(),
            packet_loss: config.packet_loss.clone(),
            recv_buffer: [0u8; MAX_PACKET_SIZE],
        })
    }

    /// Several nodes on one host share the port, so address reuse is set
    /// before binding.
    fn open_socket(config: &UdpMeshConfig) -> io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
        socket.set_reuse_port(true)?;
        let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port));
        socket.bind(&bind_addr.into())?;

        socket.join_multicast_v4(&config.group, &config.interface)?;
        socket.set_multicast_loop_v4(true)?;
        socket.set_multicast_ttl_v4(config.multicast_ttl)?;
        socket.set_nonblocking(true)?;
        Ok(socket.into())
    }

    pub fn set_packet_loss(&mut self, sim: PacketLossSimulation) {
        self.packet_loss = sim;
    }
}

impl MeshTransport for UdpMesh {
    fn channel(&self) -> &str {
        &self.channel
    }

    fn publish(&mut self, message: Message) -> Result<(), TransportError> {
        let packet = Packet::new(self.channel.clone(), message);
        let data = packet.serialize()?;

        if self.packet_loss.should_drop() {
            self.stats.packets_dropped += 1;
        } else {
            let bytes = self.socket.send_to(&data, self.group_addr)?;
            self.stats.record_sent(bytes);
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

        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((size, _addr)) => {
                    let datagram = &self.recv_buffer[..size];
                    if let Some(message) =
                        accept_inbound(datagram, &self.channel, &self.local_id, &mut self.stats)
                    {
                        self.subscribers.dispatch(&message);
                        dispatched += 1;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(dispatched)
    }

    fn stats(&self) -> &NetworkStats {
        &self.stats
    }
}

impl Drop for UdpMesh {
    fn drop(&mut self) {
        let _ = self.socket.leave_multicast_v4(&self.group, &self.interface);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_admin_scoped_group() {
        let config = UdpMeshConfig::default();
        assert!(config.group.is_multicast());
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.multicast_ttl, 1);
        assert!(!config.packet_loss.enabled);
    }
}
