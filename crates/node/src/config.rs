use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use spellmesh::net::DEFAULT_GROUP;
use spellmesh::{DEFAULT_CHANNEL, DEFAULT_PORT, EngineConfig, PacketLossSimulation, UdpMeshConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub name: Option<String>,
    pub channel: String,
    pub identity_path: PathBuf,
    pub group: Ipv4Addr,
    pub port: u16,
    pub multicast_ttl: u32,
    pub offline: bool,
    pub x: f64,
    pub y: f64,
    pub packet_loss: PacketLossSimulation,
    pub engine: EngineConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: None,
            channel: DEFAULT_CHANNEL.to_string(),
            identity_path: PathBuf::from(".spellmesh/device_id"),
            group: Ipv4Addr::from(DEFAULT_GROUP),
            port: DEFAULT_PORT,
            multicast_ttl: 1,
            offline: false,
            x: 0.0,
            y: 0.0,
            packet_loss: PacketLossSimulation::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn mesh(&self) -> UdpMeshConfig {
        UdpMeshConfig {
            group: self.group,
            port: self.port,
            multicast_ttl: self.multicast_ttl,
            packet_loss: self.packet_loss.clone(),
            ..UdpMeshConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spellmesh::SpellId;

    #[test]
    fn empty_file_gives_defaults() {
        let config = NodeConfig::parse("").unwrap();

        assert_eq!(config.channel, DEFAULT_CHANNEL);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn partial_engine_table_keeps_other_defaults() {
        let config = NodeConfig::parse(
            r#"
            name = "Alice"
            channel = "arena"
            group = "239.1.2.3"

            [engine]
            spell_range_meters = 3.5
            spell = "pull"

            [packet_loss]
            enabled = true
            loss_percent = 20.0
            "#,
        )
        .unwrap();

        assert_eq!(config.name.as_deref(), Some("Alice"));
        assert_eq!(config.group, Ipv4Addr::new(239, 1, 2, 3));
        assert_eq!(config.engine.spell_range_meters, 3.5);
        assert_eq!(config.engine.spell, SpellId::Pull);
        assert_eq!(config.engine.required_repetitions, 3);
        assert!(config.mesh().packet_loss.enabled);
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = NodeConfig::load(&dir.path().join("missing.toml")).unwrap_err();

        assert!(err.to_string().contains("missing.toml"));
    }
}
