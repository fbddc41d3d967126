//! Persistence peripheral: the save-RAM window and its backing store.
//!
//! Save data is keyed by program identity (`bytebox_` + content digest)
//! and stored as a JSON array of exactly 1,024 byte values. Load is
//! unconditional at session start; flush is gated by the save-request
//! flag, which is consumed on every flush so the cartridge must re-request
//! each save. No persistence failure ever interrupts gameplay.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use log::warn;
use thiserror::Error;

use crate::core::map::SysFlags;
use crate::core::{Bus16, map};

/// Errors surfaced by a save store. Always logged, never fatal.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("save store io failure: {0}")]
    Io(#[from] io::Error),
    #[error("malformed save data: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Key-value store behind the save hardware.
pub trait SaveStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError>;
}

/// In-memory store for tests and headless sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SaveStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One JSON file per key under a directory.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SaveStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        match fs::read_to_string(self.path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path(key), value)?;
        Ok(())
    }
}

/// Software representation of the save hardware, bound to one session key.
pub struct Wram {
    key: String,
}

impl Wram {
    pub fn new(identity: &str) -> Self {
        Self {
            key: format!("bytebox_{identity}"),
        }
    }

    /// Store key for this session.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Restore a previously stored window into the bus. Missing,
    /// unreadable, or malformed data is treated as absent.
    pub fn sync(&self, bus: &mut Bus16, store: &dyn SaveStore) {
        let value = match store.get(&self.key) {
            Ok(Some(value)) => value,
            Ok(None) => return,
            Err(err) => {
                warn!("error on sync WRAM: {err}");
                return;
            }
        };
        let data: Vec<u8> = match serde_json::from_str(&value) {
            Ok(data) => data,
            Err(err) => {
                warn!("discarding malformed WRAM blob: {err}");
                return;
            }
        };
        let len = data.len().min(map::WRAM_LEN);
        // the window is in bounds by construction of the region map
        let _ = bus.load(map::WRAM as u32, &data[..len]);
    }

    /// Per-tick flush check: a set save-request flag is consumed and the
    /// current window is written out under the session key.
    pub fn flush_check(&self, bus: &mut Bus16, store: &mut dyn SaveStore) {
        if !bus.test_bits(map::SYSFLAGS, SysFlags::SAVE_REQUEST.bits()) {
            return;
        }
        bus.clear_bits(map::SYSFLAGS, SysFlags::SAVE_REQUEST.bits());

        let window = bus.region(map::WRAM, map::WRAM_LEN);
        let result = serde_json::to_string(window)
            .map_err(PersistenceError::from)
            .and_then(|json| store.set(&self.key, &json));
        if let Err(err) = result {
            warn!("error on store WRAM: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn request_save(bus: &mut Bus16) {
        bus.set_bits(map::SYSFLAGS, SysFlags::SAVE_REQUEST.bits());
    }

    #[test]
    fn flush_round_trips_the_window() {
        let mut bus = Bus16::new();
        let mut store = MemoryStore::new();
        let wram = Wram::new("0123456789abcdef");

        let pattern: Vec<u8> = (0..map::WRAM_LEN).map(|i| (i % 251) as u8).collect();
        bus.load(map::WRAM as u32, &pattern).unwrap();
        request_save(&mut bus);
        wram.flush_check(&mut bus, &mut store);

        // the request flag was consumed
        assert!(!bus.test_bits(map::SYSFLAGS, SysFlags::SAVE_REQUEST.bits()));

        let mut fresh = Bus16::new();
        wram.sync(&mut fresh, &store);
        assert_eq!(fresh.region(map::WRAM, map::WRAM_LEN), &pattern[..]);
    }

    #[test]
    fn flush_only_fires_on_request() {
        let mut bus = Bus16::new();
        let mut store = MemoryStore::new();
        let wram = Wram::new("0123456789abcdef");

        bus.set(map::WRAM, 0x55);
        wram.flush_check(&mut bus, &mut store);
        assert_eq!(store.get(wram.key()).unwrap(), None);
    }

    #[test]
    fn different_identity_sees_no_data() {
        let mut bus = Bus16::new();
        let mut store = MemoryStore::new();

        bus.set(map::WRAM, 0xAA);
        request_save(&mut bus);
        Wram::new("aaaaaaaaaaaaaaaa").flush_check(&mut bus, &mut store);

        let mut fresh = Bus16::new();
        Wram::new("bbbbbbbbbbbbbbbb").sync(&mut fresh, &store);
        assert!(fresh.region(map::WRAM, map::WRAM_LEN).iter().all(|&b| b == 0));
    }

    #[test]
    fn malformed_blobs_are_ignored() {
        let mut bus = Bus16::new();
        let mut store = MemoryStore::new();
        let wram = Wram::new("0123456789abcdef");

        for blob in ["not json", "{\"a\":1}", "[1, 2, 999]"] {
            store.set(wram.key(), blob).unwrap();
            wram.sync(&mut bus, &store);
            assert!(bus.region(map::WRAM, map::WRAM_LEN).iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn short_blobs_fill_only_their_prefix() {
        let mut bus = Bus16::new();
        let mut store = MemoryStore::new();
        let wram = Wram::new("0123456789abcdef");

        store.set(wram.key(), "[7, 8, 9]").unwrap();
        wram.sync(&mut bus, &store);
        assert_eq!(bus.region(map::WRAM, 4), &[7, 8, 9, 0]);
    }

    #[test]
    fn file_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path());

        assert_eq!(store.get("bytebox_missing").unwrap(), None);
        store.set("bytebox_test", "[1,2,3]").unwrap();
        assert_eq!(
            store.get("bytebox_test").unwrap().as_deref(),
            Some("[1,2,3]")
        );
    }

    #[test]
    fn store_key_carries_the_console_prefix() {
        assert_eq!(Wram::new("0011223344556677").key(), "bytebox_0011223344556677");
    }
}
