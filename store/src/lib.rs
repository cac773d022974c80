//! RocksDB storage layer for commutecast.
//!
//! This crate persists every durable piece of the system:
//!
//! - `profiles`, `routes`, `schedules`, `forecasts`: the per-user route
//!   store, keyed by composite `user_id || route_id` keys
//! - `city_index`: per-city metadata and the active route counter that
//!   drives scraper selection
//! - `weather_days`, `event_days`: day-partitioned scrape output with TTLs
//! - `coordination`: the orchestrator's idempotency lock
//! - `queue` / `queue_dlq`: the durable chunk queue feeding the workers
//!
//! Multi-item lifecycle mutations (route create/delete) go through atomic
//! compound writes with conditions, mirroring the transactional contract of
//! the route lifecycle. Bulk reads and writes go through [`batch`], which
//! chunks to the store's batch limits and retries unprocessed residue with
//! exponential backoff.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod batch;
pub mod error;
pub mod keys;
pub mod lock;
pub mod queue;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use lock::{LockState, ORCHESTRATOR_LOCK};
pub use queue::{ChunkMessage, ReceivedChunk, RouteRef};
pub use rocks::RocksStore;

use chrono::{DateTime, NaiveDate, Utc};

use commutecast_core::{
    CityKey, CityRecord, EventsDay, Forecast, Profile, Route, RouteId, Schedule, UserId, WeatherDay,
};

/// City metadata supplied by the route lifecycle when registering a route.
#[derive(Debug, Clone)]
pub struct CityMeta {
    /// Display name of the city.
    pub city: String,
    /// ISO country code.
    pub country_code: String,
    /// Representative latitude.
    pub lat: f64,
    /// Representative longitude.
    pub lng: f64,
}

/// One schedule surfaced by a paginated scan.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    /// The owning user.
    pub user_id: UserId,
    /// The schedule record.
    pub schedule: Schedule,
}

/// One page of a schedule scan.
#[derive(Debug)]
pub struct SchedulePage {
    /// Live schedules in this page.
    pub entries: Vec<ScheduleEntry>,
    /// Cursor for the next page; `None` when exhausted.
    pub next_cursor: Option<Vec<u8>>,
}

/// The storage trait defining all route-store, city-index and delay-store
/// operations.
///
/// This abstracts the storage layer so handlers and pipeline tasks can be
/// exercised against the same surface.
pub trait Store: Send + Sync {
    // =========================================================================
    // Profile operations
    // =========================================================================

    /// Create a profile unless one already exists.
    ///
    /// Returns `false` (and leaves the existing record untouched) when the
    /// user already has a profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn create_profile(&self, profile: &Profile) -> Result<bool>;

    /// Get a profile by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_profile(&self, user_id: &UserId) -> Result<Option<Profile>>;

    // =========================================================================
    // Route operations
    // =========================================================================

    /// Get a route by owner and ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_route(&self, user_id: &UserId, route_id: &RouteId) -> Result<Option<Route>>;

    /// List all routes a user owns.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_routes(&self, user_id: &UserId) -> Result<Vec<Route>>;

    // =========================================================================
    // Schedule operations
    // =========================================================================

    /// Get a schedule by owner and route ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_schedule(&self, user_id: &UserId, route_id: &RouteId) -> Result<Option<Schedule>>;

    /// Scan live schedules across all users, one page at a time.
    ///
    /// Inactive and expired schedules are skipped. Pass the returned cursor
    /// back in until it is `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn scan_schedules(
        &self,
        now: DateTime<Utc>,
        start_after: Option<&[u8]>,
        limit: usize,
    ) -> Result<SchedulePage>;

    // =========================================================================
    // Forecast operations
    // =========================================================================

    /// Get the current forecast for a route.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_forecast(&self, user_id: &UserId, route_id: &RouteId) -> Result<Option<Forecast>>;

    /// Replace the forecast for a route.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_forecast(&self, user_id: &UserId, forecast: &Forecast) -> Result<()>;

    /// Delete the forecast for a route. Missing records are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_forecast(&self, user_id: &UserId, route_id: &RouteId) -> Result<()>;

    // =========================================================================
    // City index operations
    // =========================================================================

    /// Get a city index record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_city(&self, key: &CityKey) -> Result<Option<CityRecord>>;

    /// Insert or replace a city index record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_city(&self, key: &CityKey, record: &CityRecord) -> Result<()>;

    /// All cities with `active_route_count > 0`, the scraper work list.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn active_cities(&self) -> Result<Vec<(CityKey, CityRecord)>>;

    // =========================================================================
    // Delay store operations
    // =========================================================================

    /// Get the weather record for a city and date, if present and unexpired.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_weather_day(
        &self,
        key: &CityKey,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<WeatherDay>>;

    /// Get the events record for a city and date, if present and unexpired.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_events_day(
        &self,
        key: &CityKey,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<EventsDay>>;

    // =========================================================================
    // Compound lifecycle operations
    // =========================================================================

    /// Atomically register a route: increment the profile counter under the
    /// 20-route cap, put the route and schedule, and upsert the city index
    /// with `active_route_count + 1`.
    ///
    /// # Errors
    ///
    /// - `StoreError::RouteCapReached` when the user already holds the
    ///   maximum number of routes; nothing is written.
    /// - Database errors otherwise.
    fn create_route(
        &self,
        user_id: &UserId,
        route: &Route,
        schedule: &Schedule,
        city_meta: &CityMeta,
    ) -> Result<()>;

    /// Atomically write the requested subset of a route's records, as an
    /// update transaction. At least one of `route` / `schedule` must be
    /// provided by the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn update_route_records(
        &self,
        user_id: &UserId,
        route: Option<&Route>,
        schedule: Option<&Schedule>,
    ) -> Result<()>;

    /// Mark a schedule inactive with a short TTL, so the next orchestrator
    /// run skips it while the record ages out.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` when no schedule exists.
    fn mark_schedule_inactive(&self, user_id: &UserId, route_id: &RouteId, ttl: i64) -> Result<()>;

    /// Atomically delete a route: remove the route record, decrement the
    /// city counter under the `> 0` condition, and decrement the profile
    /// counter.
    ///
    /// # Errors
    ///
    /// - `StoreError::CityCounterDrift` when the city counter is already
    ///   zero; nothing is written and the caller compensates.
    /// - Database errors otherwise.
    fn delete_route(&self, user_id: &UserId, route_id: &RouteId, city_key: &CityKey) -> Result<()>;

    /// Compensating path for [`Store::delete_route`] drift: delete the route
    /// and decrement the profile counter, leaving the city counter alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn compensate_delete_route(&self, user_id: &UserId, route_id: &RouteId) -> Result<()>;
}
