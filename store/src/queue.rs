//! The durable chunk queue between the orchestrator and the workers.
//!
//! Messages are keyed by ULID, so iteration order is publish order. Each
//! entry tracks its receive count and a visibility deadline: receiving a
//! message hides it for the visibility window, acknowledging deletes it,
//! and a crash simply lets the deadline lapse so the message is redelivered.
//! A message received more than the configured maximum moves to the
//! dead-letter family for manual draining.

use chrono::{DateTime, Utc};
use rocksdb::IteratorMode;
use serde::{Deserialize, Serialize};

use commutecast_core::{DayOfWeek, RouteId, UserId};

use crate::batch::{backoff_delay, MAX_ATTEMPTS};
use crate::error::{Result, StoreError};
use crate::rocks::RocksStore;
use crate::schema::cf;

/// Queue publishes are batched at this size.
pub const PUBLISH_BATCH: usize = 10;

/// How long a received message stays invisible before redelivery.
pub const VISIBILITY_TIMEOUT_SECS: i64 = 300;

/// Default maximum receives before a message is dead-lettered.
pub const DEFAULT_MAX_RECEIVES: u32 = 3;

/// The projection of one schedule carried to the workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRef {
    /// The owning user.
    pub user_id: UserId,
    /// The route to forecast.
    pub route_id: RouteId,
    /// Local arrival target, `"HH:MM"`.
    pub arrive_by: String,
    /// IANA timezone name.
    pub timezone: String,
    /// Days the commute recurs on.
    pub days_of_week: Vec<DayOfWeek>,
}

/// One queue message: a chunk of up to 1000 route references.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMessage {
    /// Unique message id.
    pub id: String,
    /// Position of this chunk in the nightly run.
    pub chunk_index: usize,
    /// Number of routes in this chunk.
    pub chunk_size: usize,
    /// The routes to forecast.
    pub routes: Vec<RouteRef>,
}

#[derive(Debug, Serialize, Deserialize)]
struct QueueEntry {
    message: ChunkMessage,
    receive_count: u32,
    invisible_until: i64,
}

/// A received message plus the receipt needed to acknowledge it.
#[derive(Debug)]
pub struct ReceivedChunk {
    /// Opaque receipt handle (the storage key).
    pub receipt: Vec<u8>,
    /// The message body.
    pub message: ChunkMessage,
    /// How many times this message has now been delivered.
    pub receive_count: u32,
}

impl RocksStore {
    /// Publish a single chunk message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn publish_chunk(&self, message: &ChunkMessage) -> Result<()> {
        let handle = self.queue_cf(cf::QUEUE)?;
        let entry = QueueEntry {
            message: message.clone(),
            receive_count: 0,
            invisible_until: 0,
        };
        let mut buf = Vec::new();
        ciborium::into_writer(&entry, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.db
            .put_cf(&handle, ulid::Ulid::new().to_string().as_bytes(), buf)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Publish chunk messages in batches of [`PUBLISH_BATCH`], retrying only
    /// the failed entries with exponential backoff.
    ///
    /// Returns the number of messages that could not be published after the
    /// final attempt; the residue is logged.
    pub async fn publish_chunks(&self, messages: Vec<ChunkMessage>) -> usize {
        let mut pending = messages;

        for attempt in 1..=MAX_ATTEMPTS {
            if pending.is_empty() {
                break;
            }
            if attempt > 1 {
                tokio::time::sleep(backoff_delay(attempt - 1)).await;
            }

            let mut failed = Vec::new();
            for batch in pending.chunks(PUBLISH_BATCH) {
                for message in batch {
                    if let Err(e) = self.publish_chunk(message) {
                        tracing::debug!(chunk = message.chunk_index, error = %e, "publish failed");
                        failed.push(message.clone());
                    }
                }
            }
            pending = failed;
        }

        if !pending.is_empty() {
            tracing::warn!(
                unpublished = pending.len(),
                "chunk publish exhausted retries; chunks were dropped this run"
            );
        }
        pending.len()
    }

    /// Receive the next visible message, if any.
    ///
    /// The delivered message becomes invisible for the visibility window and
    /// its receive count is incremented. Messages delivered more than
    /// `max_receives` times move to the dead-letter family instead of being
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn receive_chunk(
        &self,
        now: DateTime<Utc>,
        max_receives: u32,
    ) -> Result<Option<ReceivedChunk>> {
        let handle = self.queue_cf(cf::QUEUE)?;

        for item in self.db.iterator_cf(&handle, IteratorMode::Start) {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let mut entry: QueueEntry = ciborium::from_reader(value.as_ref())
                .map_err(|e| StoreError::Serialization(e.to_string()))?;

            if entry.invisible_until > now.timestamp() {
                continue;
            }

            entry.receive_count += 1;
            if entry.receive_count > max_receives {
                self.dead_letter(&key, &entry)?;
                continue;
            }

            entry.invisible_until = now.timestamp() + VISIBILITY_TIMEOUT_SECS;
            let mut buf = Vec::new();
            ciborium::into_writer(&entry, &mut buf)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            self.db
                .put_cf(&handle, &key, buf)
                .map_err(|e| StoreError::Database(e.to_string()))?;

            return Ok(Some(ReceivedChunk {
                receipt: key.to_vec(),
                message: entry.message,
                receive_count: entry.receive_count,
            }));
        }
        Ok(None)
    }

    /// Acknowledge a received message, removing it from the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn ack_chunk(&self, receipt: &[u8]) -> Result<()> {
        let handle = self.queue_cf(cf::QUEUE)?;
        self.db
            .delete_cf(&handle, receipt)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Messages currently parked in the dead-letter family.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn dead_letters(&self) -> Result<Vec<ChunkMessage>> {
        let handle = self.queue_cf(cf::QUEUE_DLQ)?;
        let mut messages = Vec::new();
        for item in self.db.iterator_cf(&handle, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let entry: QueueEntry = ciborium::from_reader(value.as_ref())
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            messages.push(entry.message);
        }
        Ok(messages)
    }

    fn dead_letter(&self, key: &[u8], entry: &QueueEntry) -> Result<()> {
        tracing::warn!(
            message_id = %entry.message.id,
            chunk = entry.message.chunk_index,
            receives = entry.receive_count,
            "dead-lettering chunk message"
        );
        let queue = self.queue_cf(cf::QUEUE)?;
        let dlq = self.queue_cf(cf::QUEUE_DLQ)?;
        let mut buf = Vec::new();
        ciborium::into_writer(entry, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut batch = rocksdb::WriteBatch::default();
        batch.put_cf(&dlq, key, buf);
        batch.delete_cf(&queue, key);
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn queue_cf(&self, name: &str) -> Result<std::sync::Arc<rocksdb::BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn chunk(index: usize) -> ChunkMessage {
        ChunkMessage {
            id: format!("msg-{index}"),
            chunk_index: index,
            chunk_size: 1,
            routes: vec![RouteRef {
                user_id: UserId::generate(),
                route_id: RouteId::generate(),
                arrive_by: "08:30".into(),
                timezone: "Europe/Dublin".into(),
                days_of_week: vec![DayOfWeek::Mon],
            }],
        }
    }

    #[test]
    fn fifo_receive_and_ack() {
        let (store, _dir) = create_test_store();
        let now = Utc::now();

        store.publish_chunk(&chunk(0)).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        store.publish_chunk(&chunk(1)).unwrap();

        let first = store.receive_chunk(now, 3).unwrap().unwrap();
        assert_eq!(first.message.chunk_index, 0);
        store.ack_chunk(&first.receipt).unwrap();

        let second = store.receive_chunk(now, 3).unwrap().unwrap();
        assert_eq!(second.message.chunk_index, 1);
        store.ack_chunk(&second.receipt).unwrap();

        assert!(store.receive_chunk(now, 3).unwrap().is_none());
    }

    #[test]
    fn received_message_is_invisible_until_deadline() {
        let (store, _dir) = create_test_store();
        let now = Utc::now();
        store.publish_chunk(&chunk(0)).unwrap();

        let first = store.receive_chunk(now, 3).unwrap().unwrap();
        assert_eq!(first.receive_count, 1);

        // Within the window nothing is deliverable.
        assert!(store.receive_chunk(now, 3).unwrap().is_none());

        // Past the window the unacked message comes back.
        let later = now + Duration::seconds(VISIBILITY_TIMEOUT_SECS + 1);
        let redelivered = store.receive_chunk(later, 3).unwrap().unwrap();
        assert_eq!(redelivered.message.chunk_index, 0);
        assert_eq!(redelivered.receive_count, 2);
    }

    #[test]
    fn poison_message_moves_to_dead_letter_queue() {
        let (store, _dir) = create_test_store();
        let mut now = Utc::now();
        store.publish_chunk(&chunk(7)).unwrap();

        // Never acked: deliveries 1 and 2 succeed, the third attempt trips
        // the max and dead-letters.
        for _ in 0..2 {
            assert!(store.receive_chunk(now, 2).unwrap().is_some());
            now += Duration::seconds(VISIBILITY_TIMEOUT_SECS + 1);
        }
        assert!(store.receive_chunk(now, 2).unwrap().is_none());

        let dead = store.dead_letters().unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].chunk_index, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn publish_chunks_reports_no_residue_on_healthy_store() {
        let (store, _dir) = create_test_store();
        let messages: Vec<_> = (0..25).map(chunk).collect();
        assert_eq!(store.publish_chunks(messages).await, 0);
    }
}
