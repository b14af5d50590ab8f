use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rand::Rng;

use crate::net::PeerId;

const NAMES: [&str; 7] = ["Riven", "Hero", "Zed", "Lux", "Jinx", "Vi", "Ekko"];

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("could not read device id from {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("could not persist device id to {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Stable device id plus the display name announced in heartbeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: PeerId,
    pub name: String,
}

impl Identity {
    pub fn new(id: impl Into<PeerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Fresh id and random name, nothing persisted.
    pub fn generate() -> Self {
        Self::new(new_device_id(), random_name())
    }

    pub fn load_or_create(path: &Path, name: Option<String>) -> Result<Self, IdentityError> {
        let id = load_or_create_device_id(path)?;
        Ok(Self::new(id, name.unwrap_or_else(random_name)))
    }

    /// First eight characters of the id, for headers and logs.
    pub fn short_id(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }
}

pub fn new_device_id() -> PeerId {
    uuid::Uuid::new_v4().to_string()
}

pub fn random_name() -> String {
    let mut rng = rand::rng();
    let base = NAMES[rng.random_range(0..NAMES.len())];
    format!("{}-{}", base, rng.random_range(0..100))
}

/// Reads the persisted device id, creating the file with a fresh id when it
/// is missing or empty.
pub fn load_or_create_device_id(path: &Path) -> Result<PeerId, IdentityError> {
    match fs::read_to_string(path) {
        Ok(contents) if !contents.trim().is_empty() => return Ok(contents.trim().to_string()),
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(IdentityError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    }

    let id = new_device_id();
    let write = |source| IdentityError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write)?;
    }
    fs::write(path, &id).map_err(write)?;

    log::info!("Created device id at {}", path.display());
    Ok(id)
}
