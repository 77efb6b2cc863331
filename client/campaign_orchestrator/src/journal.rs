//! Append-only record of what a persistent sandbox has included, replayed on
//! open to rebuild ledger state.
//!
//! One JSON document per line: a header naming the network, then one entry
//! per line. A line is written and synced before the sandbox acts on it.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Network;
use crate::request::Request;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalEntry {
    Account {
        address: String,
    },
    Mint {
        to: String,
        amount: i128,
        ledger_time: u64,
    },
    Include {
        request: Request,
        ledger: u32,
        ledger_time: u64,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct JournalHeader {
    network: Network,
}

#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    entries: Vec<JournalEntry>,
}

fn invalid(reason: impl ToString) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, reason.to_string())
}

impl Journal {
    /// Open the journal at `path`, or start an empty one. A torn last line
    /// is cut off.
    pub fn open(path: &Path, network: Network) -> io::Result<Self> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let header = JournalHeader { network };
                let mut line = serde_json::to_vec(&header).map_err(invalid)?;
                line.push(b'\n');
                write_atomic(path, &line)?;
                return Ok(Self {
                    path: path.to_path_buf(),
                    entries: Vec::new(),
                });
            }
            Err(err) => return Err(err),
        };

        let mut lines = Vec::new();
        let mut offset = 0;
        for raw in bytes.split_inclusive(|b| *b == b'\n') {
            lines.push((offset, raw));
            offset += raw.len();
        }
        let Some(((_, header), rest)) = lines.split_first() else {
            return Err(invalid(format!("journal {} has no header", path.display())));
        };
        let header: JournalHeader = serde_json::from_slice(header).map_err(invalid)?;
        if header.network != network {
            return Err(invalid(format!(
                "journal {} belongs to network {:?}, not {:?}",
                path.display(),
                header.network,
                network
            )));
        }

        let mut entries = Vec::with_capacity(rest.len());
        for (index, (start, raw)) in rest.iter().enumerate() {
            match serde_json::from_slice::<JournalEntry>(raw) {
                Ok(entry) => entries.push(entry),
                Err(err) if index + 1 == rest.len() => {
                    warn!(path = %path.display(), %err, "truncating torn journal tail");
                    OpenOptions::new()
                        .write(true)
                        .open(path)?
                        .set_len(*start as u64)?;
                }
                Err(err) => {
                    return Err(invalid(format!(
                        "journal {} line {}: {err}",
                        path.display(),
                        index + 2
                    )))
                }
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Write `entry` to disk; it is only recorded in memory once the write
    /// is synced.
    pub fn append(&mut self, entry: JournalEntry) -> io::Result<()> {
        let mut line = serde_json::to_vec(&entry).map_err(invalid)?;
        line.push(b'\n');
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(&line)?;
        file.sync_data()?;
        self.entries.push(entry);
        Ok(())
    }
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(invalid),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Write via a sibling temp file and rename, so readers never see a torn file.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(invalid)?;
    write_atomic(path, &bytes)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mint(amount: i128) -> JournalEntry {
        JournalEntry::Mint {
            to: "CA".into(),
            amount,
            ledger_time: 10,
        }
    }

    #[test]
    fn append_persists_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.jsonl");

        let mut journal = Journal::open(&path, Network::Sandbox).unwrap();
        assert!(journal.entries().is_empty());
        journal.append(mint(50)).unwrap();
        journal.append(mint(7)).unwrap();

        let reopened = Journal::open(&path, Network::Sandbox).unwrap();
        assert_eq!(reopened.entries(), journal.entries());
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn refuses_journal_of_other_network() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let mut journal = Journal::open(&path, Network::Sandbox).unwrap();
        journal.append(mint(1)).unwrap();

        let err = Journal::open(&path, Network::Ephemeral).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn torn_tail_is_cut_off() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let mut journal = Journal::open(&path, Network::Sandbox).unwrap();
        journal.append(mint(5)).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"mint":{"to":"C"#).unwrap();
        drop(file);

        let mut reopened = Journal::open(&path, Network::Sandbox).unwrap();
        assert_eq!(reopened.entries(), &[mint(5)]);
        reopened.append(mint(6)).unwrap();
        let again = Journal::open(&path, Network::Sandbox).unwrap();
        assert_eq!(again.entries(), &[mint(5), mint(6)]);
    }

    #[test]
    fn failed_append_records_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let mut journal = Journal::open(&path, Network::Sandbox).unwrap();
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(journal.append(mint(5)).is_err());
        assert!(journal.entries().is_empty());
    }
}
