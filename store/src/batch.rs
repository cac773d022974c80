//! Batched key-value reads and writes.
//!
//! Requests are chunked to the store's native batch limits (read 100, write
//! 25), chunks run concurrently, and any "unprocessed" residue a chunk
//! reports is retried with exponential backoff (`100ms * 2^(n-1)`), four
//! attempts in total. Residue surviving the last attempt is logged; readers
//! get a best-effort partial result and writers a shortfall count. Neither
//! operation fails its caller on residue.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

/// Native batch limit for reads.
pub const READ_CHUNK: usize = 100;

/// Native batch limit for writes.
pub const WRITE_CHUNK: usize = 25;

/// Total attempts per batch (first try plus three retries).
pub const MAX_ATTEMPTS: u32 = 4;

/// Backoff before retry `n` (1-based): `100ms * 2^(n-1)`.
#[must_use]
pub fn backoff_delay(retry: u32) -> Duration {
    Duration::from_millis(100 * 2u64.pow(retry.saturating_sub(1)))
}

/// A record address: column family plus encoded key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    /// The column family the record lives in.
    pub cf: &'static str,
    /// The encoded key within that family.
    pub key: Vec<u8>,
}

/// One write in a batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Insert or replace a record.
    Put {
        /// The record address.
        key: RecordKey,
        /// The encoded record.
        value: Vec<u8>,
    },
    /// Remove a record.
    Delete {
        /// The record address.
        key: RecordKey,
    },
}

/// Result of one read chunk: fetched records plus unprocessed residue.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Keys that resolved, with their raw values. Missing records are
    /// simply absent.
    pub found: Vec<(RecordKey, Vec<u8>)>,
    /// Keys the backend could not process this attempt.
    pub unprocessed: Vec<RecordKey>,
}

/// Result of one write chunk: unprocessed residue only.
#[derive(Debug, Default)]
pub struct WriteOutcome {
    /// Operations the backend could not process this attempt.
    pub unprocessed: Vec<WriteOp>,
}

/// A store capable of chunked batch reads and writes.
///
/// Implementations never fail a whole chunk with an error; transient
/// trouble is reported as unprocessed residue so the retry loop above can
/// take another pass.
#[async_trait]
pub trait BatchBackend: Send + Sync {
    /// Fetch up to [`READ_CHUNK`] records.
    async fn fetch_chunk(&self, keys: &[RecordKey]) -> FetchOutcome;

    /// Apply up to [`WRITE_CHUNK`] writes.
    async fn write_chunk(&self, ops: &[WriteOp]) -> WriteOutcome;
}

/// Read a key set in concurrent chunks, retrying unprocessed residue.
///
/// Returns whatever resolved; missing records are absent from the map.
pub async fn batched_read<B: BatchBackend>(
    backend: &B,
    keys: Vec<RecordKey>,
) -> HashMap<RecordKey, Vec<u8>> {
    let mut found = HashMap::with_capacity(keys.len());
    let mut pending = keys;

    for attempt in 1..=MAX_ATTEMPTS {
        if pending.is_empty() {
            break;
        }
        if attempt > 1 {
            tokio::time::sleep(backoff_delay(attempt - 1)).await;
        }

        let chunks: Vec<Vec<RecordKey>> = pending.chunks(READ_CHUNK).map(<[_]>::to_vec).collect();
        let outcomes = join_all(chunks.iter().map(|chunk| backend.fetch_chunk(chunk))).await;

        pending = Vec::new();
        for outcome in outcomes {
            found.extend(outcome.found);
            pending.extend(outcome.unprocessed);
        }
    }

    if !pending.is_empty() {
        tracing::warn!(
            unprocessed = pending.len(),
            "batched read exhausted retries; returning partial result"
        );
    }
    found
}

/// Write operations in concurrent chunks, retrying unprocessed residue.
///
/// Returns the shortfall: the number of operations still unprocessed after
/// the final attempt.
pub async fn batched_write<B: BatchBackend>(backend: &B, ops: Vec<WriteOp>) -> usize {
    let mut pending = ops;

    for attempt in 1..=MAX_ATTEMPTS {
        if pending.is_empty() {
            break;
        }
        if attempt > 1 {
            tokio::time::sleep(backoff_delay(attempt - 1)).await;
        }

        let chunks: Vec<Vec<WriteOp>> = pending.chunks(WRITE_CHUNK).map(<[_]>::to_vec).collect();
        let outcomes = join_all(chunks.iter().map(|chunk| backend.write_chunk(chunk))).await;

        pending = outcomes
            .into_iter()
            .flat_map(|outcome| outcome.unprocessed)
            .collect();
    }

    if !pending.is_empty() {
        tracing::warn!(
            unprocessed = pending.len(),
            "batched write exhausted retries; records were dropped"
        );
    }
    pending.len()
}
