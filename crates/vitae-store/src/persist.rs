//! Persistence collaborator
//!
//! The core never talks to a concrete storage engine; it hands keyed JSON
//! snapshots to whatever implements [`Persistence`]. Writes are
//! best-effort: a failure is logged by the caller and never propagates or
//! blocks the interview.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

/// Fixed logical names the session persists under
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageKey {
    /// Survey context snapshot (without the live episode reference)
    Context,
    /// Current machine state name
    MachineState,
    /// Amendable answer history
    Answers,
    /// Episodes (markers excluded)
    Items,
    /// Group catalog
    Groups,
    /// Session options (role, flags)
    Options,
    /// The single buffered bulk import awaiting store readiness
    PendingImport,
}

impl StorageKey {
    pub const ALL: [StorageKey; 7] = [
        StorageKey::Context,
        StorageKey::MachineState,
        StorageKey::Answers,
        StorageKey::Items,
        StorageKey::Groups,
        StorageKey::Options,
        StorageKey::PendingImport,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StorageKey::Context => "context",
            StorageKey::MachineState => "machine_state",
            StorageKey::Answers => "answers",
            StorageKey::Items => "items",
            StorageKey::Groups => "groups",
            StorageKey::Options => "options",
            StorageKey::PendingImport => "pending_import",
        }
    }
}

/// Persistence failure. Callers log and continue; nothing downstream of a
/// failed save is allowed to break.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("backend write failed: {0}")]
    Write(String),
}

/// Keyed snapshot storage
pub trait Persistence {
    fn load(&self, key: StorageKey) -> Option<Value>;
    fn save(&mut self, key: StorageKey, value: Value) -> Result<(), PersistError>;
    fn remove(&mut self, key: StorageKey);
}

/// In-memory backend: the default collaborator and the test stand-in
#[derive(Debug, Default)]
pub struct MemoryBackend {
    map: HashMap<&'static str, Value>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::default()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}

impl Persistence for MemoryBackend {
    fn load(&self, key: StorageKey) -> Option<Value> {
        self.map.get(key.name()).cloned()
    }

    fn save(&mut self, key: StorageKey, value: Value) -> Result<(), PersistError> {
        self.map.insert(key.name(), value);
        Ok(())
    }

    fn remove(&mut self, key: StorageKey) {
        self.map.remove(key.name());
    }
}

/// Backend that refuses every write; exercises the best-effort path
#[derive(Debug, Default)]
pub struct FailingBackend;

impl Persistence for FailingBackend {
    fn load(&self, _key: StorageKey) -> Option<Value> {
        None
    }

    fn save(&mut self, key: StorageKey, _value: Value) -> Result<(), PersistError> {
        Err(PersistError::Write(format!("refused: {}", key.name())))
    }

    fn remove(&mut self, _key: StorageKey) {}
}
