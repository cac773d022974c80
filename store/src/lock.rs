//! The nightly coordination lock.
//!
//! A single named parameter in the coordination column family holds the
//! timestamp of the run that acquired it. A fresh value means a duplicate
//! invocation and the caller aborts; a stale value means the previous run
//! crashed and is overwritten. Release deletes the parameter and a missing
//! parameter on release is not an error, so a failed release self-heals
//! through the staleness threshold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::rocks::RocksStore;
use crate::schema::cf;

/// The orchestrator's lock parameter name.
pub const ORCHESTRATOR_LOCK: &str = "nightly-orchestrator";

/// Age past which a held lock is considered stale and overwritten.
pub const LOCK_STALE_AFTER_SECS: i64 = 3600;

#[derive(Debug, Serialize, Deserialize)]
struct LockRecord {
    acquired_at: DateTime<Utc>,
}

/// How an acquisition succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// The lock was free.
    Acquired,
    /// A stale holder was overwritten.
    AcquiredStale,
}

impl RocksStore {
    /// Acquire the named lock at `now`.
    ///
    /// # Errors
    ///
    /// - `StoreError::LockHeld` when a holder younger than the staleness
    ///   threshold exists.
    /// - Database errors otherwise.
    pub fn acquire_lock(&self, name: &str, now: DateTime<Utc>) -> Result<LockState> {
        let handle = self.lock_cf()?;
        let existing = self
            .db
            .get_cf(&handle, name.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let state = match existing {
            Some(data) => {
                let record: LockRecord = ciborium::from_reader(data.as_slice())
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                let age_secs = (now - record.acquired_at).num_seconds();
                if age_secs < LOCK_STALE_AFTER_SECS {
                    return Err(StoreError::LockHeld {
                        name: name.to_string(),
                        age_secs,
                    });
                }
                tracing::warn!(
                    lock = name,
                    age_secs,
                    "overwriting stale lock from a crashed run"
                );
                LockState::AcquiredStale
            }
            None => LockState::Acquired,
        };

        let record = LockRecord { acquired_at: now };
        let mut buf = Vec::new();
        ciborium::into_writer(&record, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.db
            .put_cf(&handle, name.as_bytes(), buf)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(state)
    }

    /// Release the named lock. Missing locks are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails; callers treat this
    /// as non-fatal.
    pub fn release_lock(&self, name: &str) -> Result<()> {
        let handle = self.lock_cf()?;
        self.db
            .delete_cf(&handle, name.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn lock_cf(&self) -> Result<std::sync::Arc<rocksdb::BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(cf::COORDINATION)
            .ok_or_else(|| StoreError::Database("coordination column family missing".into()))
    }
}
