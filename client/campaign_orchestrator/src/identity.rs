//! Named actors and the ledger addresses they act as.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::journal::{read_json, write_json_atomic};

#[derive(Debug, Error)]
pub enum KeyringError {
    #[error("keyring {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("unknown actor {0:?}")]
    Unknown(String),
    #[error("actor {0:?} already exists")]
    Exists(String),
    #[error("invalid actor name {0:?}")]
    InvalidName(String),
}

/// The address an orchestrator submits requests as.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct KeyringFile {
    actors: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct Keyring {
    path: Option<PathBuf>,
    file: KeyringFile,
}

impl Keyring {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn open(path: &Path) -> Result<Self, KeyringError> {
        let file = read_json(path)
            .map_err(|source| KeyringError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .unwrap_or_default();
        Ok(Self {
            path: Some(path.to_path_buf()),
            file,
        })
    }

    pub fn get(&self, name: &str) -> Result<Identity, KeyringError> {
        self.file
            .actors
            .get(name)
            .map(|address| Identity {
                name: name.to_string(),
                address: address.clone(),
            })
            .ok_or_else(|| KeyringError::Unknown(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.file.actors.contains_key(name)
    }

    pub fn insert(&mut self, name: &str, address: String) -> Result<Identity, KeyringError> {
        let valid = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';
        if name.is_empty() || !name.chars().all(valid) {
            return Err(KeyringError::InvalidName(name.to_string()));
        }
        if self.contains(name) {
            return Err(KeyringError::Exists(name.to_string()));
        }
        self.file.actors.insert(name.to_string(), address.clone());

        if let Some(path) = &self.path {
            if let Err(source) = write_json_atomic(path, &self.file) {
                self.file.actors.remove(name);
                return Err(KeyringError::Io {
                    path: path.clone(),
                    source,
                });
            }
        }
        Ok(Identity {
            name: name.to_string(),
            address,
        })
    }

    /// Reverse lookup for display.
    pub fn name_of(&self, address: &str) -> Option<&str> {
        self.file
            .actors
            .iter()
            .find(|(_, known)| known.as_str() == address)
            .map(|(name, _)| name.as_str())
    }

    pub fn identities(&self) -> impl Iterator<Item = Identity> + '_ {
        self.file.actors.iter().map(|(name, address)| Identity {
            name: name.clone(),
            address: address.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let mut keyring = Keyring::in_memory();
        keyring.insert("alice", "CALICE".into()).unwrap();

        assert_eq!(keyring.get("alice").unwrap().address, "CALICE");
        assert_eq!(keyring.name_of("CALICE"), Some("alice"));
        assert!(matches!(keyring.get("bob"), Err(KeyringError::Unknown(_))));
        assert!(matches!(
            keyring.insert("alice", "COTHER".into()),
            Err(KeyringError::Exists(_))
        ));
        assert!(matches!(
            keyring.insert("bad name", "C".into()),
            Err(KeyringError::InvalidName(_))
        ));
    }

    #[test]
    fn persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyring.json");

        let mut keyring = Keyring::open(&path).unwrap();
        keyring.insert("creator", "CCREATOR".into()).unwrap();
        keyring.insert("backer", "CBACKER".into()).unwrap();

        let reopened = Keyring::open(&path).unwrap();
        let names: Vec<_> = reopened.identities().map(|id| id.name).collect();
        assert_eq!(names, vec!["backer", "creator"]);
    }
}
