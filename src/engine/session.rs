//! The session gate: the only place plaintext records live.

use std::sync::{Mutex, MutexGuard};

use log::{info, warn};

use crate::engine::filter::QueryFilter;
use crate::engine::persistence::{EncryptedStore, StoreKey};
use crate::engine::records::{EventType, LogRecord, Meta, RecordSet};
use crate::{Error, Result};

struct Unlocked {
    key: StoreKey,
    records: RecordSet,
}

/// A caller-owned handle over one store file.
///
/// Starts locked. [`unlock`](Session::unlock) derives the key and keeps it
/// together with the decrypted records until [`lock`](Session::lock) is called
/// or the handle is dropped; a failed unlock also leaves the handle locked.
/// All operations go through one mutex, so concurrent mutations within a
/// process are applied and persisted one at a time.
///
/// Another process unlocking the same file keeps its own copy; whichever
/// persists last overwrites the other's changes.
pub struct Session {
    store: EncryptedStore,
    state: Mutex<Option<Unlocked>>,
}

impl Session {
    pub fn new(store: EncryptedStore) -> Self {
        Self {
            store,
            state: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &EncryptedStore {
        &self.store
    }

    /// Blocks for the duration of key derivation.
    pub fn unlock(&self, password: &str) -> Result<Vec<LogRecord>> {
        let mut state = self.state()?;
        // Any previous session ends here, whatever the outcome.
        *state = None;

        match self.store.open_or_create(password) {
            Ok((key, records)) => {
                info!("Log store unlocked ({} records)", records.len());
                let out = records.records().to_vec();
                *state = Some(Unlocked { key, records });
                Ok(out)
            }
            Err(e) => {
                warn!("Failed to unlock log store: {}", e);
                Err(e)
            }
        }
    }

    /// Drops the plaintext records and zeroes the key.
    pub fn lock(&self) -> Result<()> {
        let mut state = self.state()?;
        if state.take().is_some() {
            info!("Log store locked");
        }
        Ok(())
    }

    pub fn is_unlocked(&self) -> bool {
        self.state().map(|s| s.is_some()).unwrap_or(false)
    }

    pub fn list(&self, filter: &QueryFilter) -> Result<Vec<LogRecord>> {
        let state = self.state()?;
        let unlocked = state.as_ref().ok_or(Error::NotUnlocked)?;
        Ok(unlocked.records.query(filter))
    }

    /// Appends, persists, and returns the full updated list.
    pub fn append(&self, event_type: EventType, meta: Meta, preview: &str) -> Result<Vec<LogRecord>> {
        self.mutate(|records| {
            let id = records.append(event_type, meta, preview);
            info!("Appended log record {} ({})", id, event_type);
            true
        })
    }

    /// Removes `id` and persists. An unknown id returns the list unchanged.
    pub fn delete(&self, id: u64) -> Result<Vec<LogRecord>> {
        self.mutate(|records| {
            let removed = records.delete(id);
            if removed {
                info!("Deleted log record {}", id);
            }
            removed
        })
    }

    /// Applies `f` to a copy of the records and persists it. The in-memory
    /// copy is replaced only after the file has been written, so a failed
    /// write leaves memory and disk in agreement and the call can be retried.
    fn mutate<F>(&self, f: F) -> Result<Vec<LogRecord>>
    where
        F: FnOnce(&mut RecordSet) -> bool,
    {
        let mut state = self.state()?;
        let unlocked = state.as_mut().ok_or(Error::NotUnlocked)?;

        let mut next = unlocked.records.clone();
        if f(&mut next) {
            self.store.persist(&unlocked.key, &next)?;
            unlocked.records = next;
        }
        Ok(unlocked.records.records().to_vec())
    }

    fn state(&self) -> Result<MutexGuard<'_, Option<Unlocked>>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("session lock poisoned".to_string()))
    }
}
