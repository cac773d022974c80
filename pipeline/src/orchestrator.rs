//! The nightly orchestrator.
//!
//! Runs at 00:00 UTC behind the coordination lock: scans every live
//! schedule, projects it to the queue shape, shards into chunks of 1000
//! and publishes one message per chunk. Presence of a schedule is the sole
//! activation signal; the route's display flag does not suppress
//! forecasting.

use chrono::{DateTime, Utc};

use commutecast_store::{
    ChunkMessage, LockState, RocksStore, RouteRef, Store, StoreError, ORCHESTRATOR_LOCK,
};

use crate::error::PipelineError;

/// Routes per queue message.
pub const CHUNK_SIZE: usize = 1000;

/// Schedules examined per scan page.
pub const SCAN_PAGE_SIZE: usize = 500;

/// Outcome of one orchestrator invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSummary {
    /// False when a fresh lock holder forced a duplicate-invocation abort.
    pub ran: bool,
    /// Live schedules projected.
    pub schedules: usize,
    /// Chunk messages published.
    pub chunks_published: usize,
    /// Chunks lost to publish residue after retries.
    pub publish_shortfall: usize,
}

impl OrchestratorSummary {
    fn skipped() -> Self {
        Self {
            ran: false,
            schedules: 0,
            chunks_published: 0,
            publish_shortfall: 0,
        }
    }
}

/// Run the nightly fan-out under the idempotency lock.
///
/// A second invocation within the staleness threshold observes the lock
/// and publishes nothing; a crashed previous run is healed by overwriting
/// its stale lock.
///
/// # Errors
///
/// Returns an error when the lock store or the schedule scan fails
/// outright; the platform's alarms own that case.
pub async fn run_orchestrator(
    store: &RocksStore,
    now: DateTime<Utc>,
) -> Result<OrchestratorSummary, PipelineError> {
    match store.acquire_lock(ORCHESTRATOR_LOCK, now) {
        Ok(LockState::Acquired) => {}
        Ok(LockState::AcquiredStale) => {
            tracing::warn!("previous orchestrator run did not release its lock");
        }
        Err(StoreError::LockHeld { age_secs, .. }) => {
            tracing::info!(age_secs, "orchestrator lock held, duplicate invocation skipped");
            return Ok(OrchestratorSummary::skipped());
        }
        Err(e) => return Err(e.into()),
    }

    let result = fan_out(store, now).await;

    if let Err(e) = store.release_lock(ORCHESTRATOR_LOCK) {
        // Stale-lock semantics cover an unreleased lock.
        tracing::warn!(error = %e, "failed to release orchestrator lock");
    }
    result
}

async fn fan_out(
    store: &RocksStore,
    now: DateTime<Utc>,
) -> Result<OrchestratorSummary, PipelineError> {
    let mut refs: Vec<RouteRef> = Vec::new();
    let mut cursor: Option<Vec<u8>> = None;

    loop {
        let page = store.scan_schedules(now, cursor.as_deref(), SCAN_PAGE_SIZE)?;
        refs.extend(page.entries.into_iter().map(|entry| RouteRef {
            user_id: entry.user_id,
            route_id: entry.schedule.route_id,
            arrive_by: entry.schedule.arrive_by,
            timezone: entry.schedule.timezone,
            days_of_week: entry.schedule.days_of_week,
        }));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    let schedules = refs.len();
    let messages: Vec<ChunkMessage> = refs
        .chunks(CHUNK_SIZE)
        .enumerate()
        .map(|(chunk_index, chunk)| ChunkMessage {
            id: uuid::Uuid::new_v4().to_string(),
            chunk_index,
            chunk_size: chunk.len(),
            routes: chunk.to_vec(),
        })
        .collect();
    let chunk_count = messages.len();

    let publish_shortfall = store.publish_chunks(messages).await;

    let summary = OrchestratorSummary {
        ran: true,
        schedules,
        chunks_published: chunk_count - publish_shortfall,
        publish_shortfall,
    };
    tracing::info!(
        schedules = summary.schedules,
        chunks = summary.chunks_published,
        shortfall = summary.publish_shortfall,
        "orchestrator fan-out finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use commutecast_core::{DayOfWeek, RouteId, Schedule, UserId};
    use commutecast_store::lock::LOCK_STALE_AFTER_SECS;
    use tempfile::TempDir;

    fn seed_schedule(store: &RocksStore, now: DateTime<Utc>, active: bool) {
        let schedule = Schedule {
            route_id: RouteId::generate(),
            arrive_by: "08:30".into(),
            timezone: "Europe/Dublin".into(),
            days_of_week: vec![DayOfWeek::Mon],
            ttl: now.timestamp() + 3600,
            active,
        };
        store
            .update_route_records(&UserId::generate(), None, Some(&schedule))
            .unwrap();
    }

    #[tokio::test]
    async fn projects_live_schedules_into_chunks() {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        let now = Utc::now();

        for _ in 0..3 {
            seed_schedule(&store, now, true);
        }
        seed_schedule(&store, now, false);

        let summary = run_orchestrator(&store, now).await.unwrap();
        assert!(summary.ran);
        assert_eq!(summary.schedules, 3);
        assert_eq!(summary.chunks_published, 1);

        let received = store.receive_chunk(now, 3).unwrap().unwrap();
        assert_eq!(received.message.routes.len(), 3);
        assert_eq!(received.message.chunk_size, 3);
    }

    #[tokio::test]
    async fn duplicate_invocation_publishes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        let now = Utc::now();
        seed_schedule(&store, now, true);

        // Simulate a concurrent holder that has not released.
        store
            .acquire_lock(ORCHESTRATOR_LOCK, now - Duration::minutes(10))
            .unwrap();

        let summary = run_orchestrator(&store, now).await.unwrap();
        assert!(!summary.ran);
        assert!(store.receive_chunk(now, 3).unwrap().is_none());

        // Past the staleness threshold a third invocation proceeds.
        let later = now + Duration::seconds(LOCK_STALE_AFTER_SECS);
        let summary = run_orchestrator(&store, later).await.unwrap();
        assert!(summary.ran);
        assert_eq!(summary.chunks_published, 1);
    }

    #[tokio::test]
    async fn lock_is_released_after_a_run() {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        let now = Utc::now();

        assert!(run_orchestrator(&store, now).await.unwrap().ran);
        // Immediately runnable again because the lock was released.
        assert!(run_orchestrator(&store, now + Duration::minutes(1))
            .await
            .unwrap()
            .ran);
    }
}
