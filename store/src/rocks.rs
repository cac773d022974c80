//! `RocksDB` storage implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use commutecast_core::{
    CityKey, CityRecord, EventsDay, Forecast, Profile, Route, RouteId, Schedule, UserId, WeatherDay,
};

use crate::batch::{batched_read, batched_write, BatchBackend, FetchOutcome, RecordKey, WriteOp, WriteOutcome};
use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{CityMeta, ScheduleEntry, SchedulePage, Store};

use async_trait::async_trait;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    pub(crate) db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_record<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn put_record<T: serde::Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let data = Self::serialize(value)?;
        self.db
            .put_cf(&cf, key, data)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    // =========================================================================
    // Batched helpers (used by scrapers and the forecast worker)
    // =========================================================================

    /// Batch-load routes for the given (owner, route) references.
    pub async fn batch_get_routes(
        &self,
        refs: &[(UserId, RouteId)],
    ) -> HashMap<(UserId, RouteId), Route> {
        let record_keys: Vec<RecordKey> = refs
            .iter()
            .map(|(user_id, route_id)| RecordKey {
                cf: cf::ROUTES,
                key: keys::user_route_key(user_id, route_id),
            })
            .collect();

        let raw = batched_read(self, record_keys).await;
        let mut routes = HashMap::with_capacity(raw.len());
        for (record_key, data) in raw {
            let Some(ids) = keys::split_user_route_key(&record_key.key) else {
                continue;
            };
            match Self::deserialize::<Route>(&data) {
                Ok(route) => {
                    routes.insert(ids, route);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping undecodable route record");
                }
            }
        }
        routes
    }

    /// Batch-load unexpired weather records for (city, date) pairs.
    pub async fn batch_get_weather_days(
        &self,
        pairs: &[(CityKey, NaiveDate)],
        now: DateTime<Utc>,
    ) -> HashMap<(CityKey, NaiveDate), WeatherDay> {
        let record_keys: Vec<RecordKey> = pairs
            .iter()
            .map(|(city, date)| RecordKey {
                cf: cf::WEATHER_DAYS,
                key: keys::city_day_key(city, *date),
            })
            .collect();

        let raw = batched_read(self, record_keys).await;
        let mut days = HashMap::with_capacity(raw.len());
        for (_, data) in raw {
            match Self::deserialize::<WeatherDay>(&data) {
                Ok(day) if day.ttl > now.timestamp() => {
                    days.insert((day.city_key.clone(), day.date), day);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "skipping undecodable weather record");
                }
            }
        }
        days
    }

    /// Batch-load unexpired event records for (city, date) pairs.
    pub async fn batch_get_events_days(
        &self,
        pairs: &[(CityKey, NaiveDate)],
        now: DateTime<Utc>,
    ) -> HashMap<(CityKey, NaiveDate), EventsDay> {
        let record_keys: Vec<RecordKey> = pairs
            .iter()
            .map(|(city, date)| RecordKey {
                cf: cf::EVENT_DAYS,
                key: keys::city_day_key(city, *date),
            })
            .collect();

        let raw = batched_read(self, record_keys).await;
        let mut days = HashMap::with_capacity(raw.len());
        for (_, data) in raw {
            match Self::deserialize::<EventsDay>(&data) {
                Ok(day) if day.ttl > now.timestamp() => {
                    days.insert((day.city_key.clone(), day.date), day);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "skipping undecodable events record");
                }
            }
        }
        days
    }

    /// Batch-write weather day records. Returns the shortfall count.
    pub async fn batch_put_weather_days(&self, days: &[WeatherDay]) -> usize {
        let mut ops = Vec::with_capacity(days.len());
        for day in days {
            match Self::serialize(day) {
                Ok(value) => ops.push(WriteOp::Put {
                    key: RecordKey {
                        cf: cf::WEATHER_DAYS,
                        key: keys::city_day_key(&day.city_key, day.date),
                    },
                    value,
                }),
                Err(e) => tracing::warn!(error = %e, "failed to encode weather record"),
            }
        }
        batched_write(self, ops).await
    }

    /// Batch-write event day records. Returns the shortfall count.
    pub async fn batch_put_events_days(&self, days: &[EventsDay]) -> usize {
        let mut ops = Vec::with_capacity(days.len());
        for day in days {
            match Self::serialize(day) {
                Ok(value) => ops.push(WriteOp::Put {
                    key: RecordKey {
                        cf: cf::EVENT_DAYS,
                        key: keys::city_day_key(&day.city_key, day.date),
                    },
                    value,
                }),
                Err(e) => tracing::warn!(error = %e, "failed to encode events record"),
            }
        }
        batched_write(self, ops).await
    }

    /// Batch-write route forecasts. Returns the shortfall count.
    pub async fn batch_put_forecasts(&self, items: &[(UserId, Forecast)]) -> usize {
        let mut ops = Vec::with_capacity(items.len());
        for (user_id, forecast) in items {
            match Self::serialize(forecast) {
                Ok(value) => ops.push(WriteOp::Put {
                    key: RecordKey {
                        cf: cf::FORECASTS,
                        key: keys::user_route_key(user_id, &forecast.route_id),
                    },
                    value,
                }),
                Err(e) => tracing::warn!(error = %e, "failed to encode forecast record"),
            }
        }
        batched_write(self, ops).await
    }
}

#[async_trait]
impl BatchBackend for RocksStore {
    async fn fetch_chunk(&self, record_keys: &[RecordKey]) -> FetchOutcome {
        let mut handles = HashMap::new();
        for record_key in record_keys {
            if !handles.contains_key(record_key.cf) {
                match self.cf(record_key.cf) {
                    Ok(handle) => {
                        handles.insert(record_key.cf, handle);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "batch fetch: column family unavailable");
                        return FetchOutcome {
                            found: Vec::new(),
                            unprocessed: record_keys.to_vec(),
                        };
                    }
                }
            }
        }

        let queries: Vec<_> = record_keys
            .iter()
            .map(|rk| (&handles[rk.cf], rk.key.clone()))
            .collect();
        let results = self.db.multi_get_cf(queries);

        let mut outcome = FetchOutcome::default();
        for (record_key, result) in record_keys.iter().zip(results) {
            match result {
                Ok(Some(value)) => outcome.found.push((record_key.clone(), value)),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "batch fetch: key unprocessed");
                    outcome.unprocessed.push(record_key.clone());
                }
            }
        }
        outcome
    }

    async fn write_chunk(&self, ops: &[WriteOp]) -> WriteOutcome {
        let mut batch = WriteBatch::default();
        for op in ops {
            let record_key = match op {
                WriteOp::Put { key, .. } | WriteOp::Delete { key } => key,
            };
            let Ok(handle) = self.cf(record_key.cf) else {
                return WriteOutcome {
                    unprocessed: ops.to_vec(),
                };
            };
            match op {
                WriteOp::Put { key, value } => batch.put_cf(&handle, &key.key, value),
                WriteOp::Delete { key } => batch.delete_cf(&handle, &key.key),
            }
        }

        match self.db.write(batch) {
            Ok(()) => WriteOutcome::default(),
            Err(e) => {
                tracing::debug!(error = %e, "batch write: chunk unprocessed");
                WriteOutcome {
                    unprocessed: ops.to_vec(),
                }
            }
        }
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Profile operations
    // =========================================================================

    fn create_profile(&self, profile: &Profile) -> Result<bool> {
        let key = keys::user_key(&profile.user_id);
        if self
            .get_record::<Profile>(cf::PROFILES, &key)?
            .is_some()
        {
            return Ok(false);
        }
        self.put_record(cf::PROFILES, &key, profile)?;
        Ok(true)
    }

    fn get_profile(&self, user_id: &UserId) -> Result<Option<Profile>> {
        self.get_record(cf::PROFILES, &keys::user_key(user_id))
    }

    // =========================================================================
    // Route operations
    // =========================================================================

    fn get_route(&self, user_id: &UserId, route_id: &RouteId) -> Result<Option<Route>> {
        self.get_record(cf::ROUTES, &keys::user_route_key(user_id, route_id))
    }

    fn list_routes(&self, user_id: &UserId) -> Result<Vec<Route>> {
        let cf = self.cf(cf::ROUTES)?;
        let prefix = keys::user_prefix(user_id);

        let mut routes = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            routes.push(Self::deserialize(&value)?);
        }
        Ok(routes)
    }

    // =========================================================================
    // Schedule operations
    // =========================================================================

    fn get_schedule(&self, user_id: &UserId, route_id: &RouteId) -> Result<Option<Schedule>> {
        self.get_record(cf::SCHEDULES, &keys::user_route_key(user_id, route_id))
    }

    fn scan_schedules(
        &self,
        now: DateTime<Utc>,
        start_after: Option<&[u8]>,
        limit: usize,
    ) -> Result<SchedulePage> {
        let cf = self.cf(cf::SCHEDULES)?;
        let mode = match start_after {
            Some(cursor) => IteratorMode::From(cursor, Direction::Forward),
            None => IteratorMode::Start,
        };

        let mut entries = Vec::new();
        let mut examined = 0usize;
        let mut last_key: Option<Vec<u8>> = None;
        let mut exhausted = true;

        for item in self.db.iterator_cf(&cf, mode) {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            // The cursor is the last key of the previous page; skip it.
            if start_after == Some(key.as_ref()) {
                continue;
            }
            if examined >= limit {
                exhausted = false;
                break;
            }
            examined += 1;
            last_key = Some(key.to_vec());

            let Some((user_id, _)) = keys::split_user_route_key(&key) else {
                tracing::warn!("skipping schedule with malformed key");
                continue;
            };
            let schedule: Schedule = match Self::deserialize(&value) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(%user_id, error = %e, "skipping undecodable schedule");
                    continue;
                }
            };
            if schedule.is_live(now) {
                entries.push(ScheduleEntry { user_id, schedule });
            }
        }

        Ok(SchedulePage {
            entries,
            next_cursor: if exhausted { None } else { last_key },
        })
    }

    // =========================================================================
    // Forecast operations
    // =========================================================================

    fn get_forecast(&self, user_id: &UserId, route_id: &RouteId) -> Result<Option<Forecast>> {
        self.get_record(cf::FORECASTS, &keys::user_route_key(user_id, route_id))
    }

    fn put_forecast(&self, user_id: &UserId, forecast: &Forecast) -> Result<()> {
        self.put_record(
            cf::FORECASTS,
            &keys::user_route_key(user_id, &forecast.route_id),
            forecast,
        )
    }

    fn delete_forecast(&self, user_id: &UserId, route_id: &RouteId) -> Result<()> {
        let cf = self.cf(cf::FORECASTS)?;
        self.db
            .delete_cf(&cf, keys::user_route_key(user_id, route_id))
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    // =========================================================================
    // City index operations
    // =========================================================================

    fn get_city(&self, key: &CityKey) -> Result<Option<CityRecord>> {
        self.get_record(cf::CITY_INDEX, &keys::city_key(key))
    }

    fn put_city(&self, key: &CityKey, record: &CityRecord) -> Result<()> {
        self.put_record(cf::CITY_INDEX, &keys::city_key(key), record)
    }

    fn active_cities(&self) -> Result<Vec<(CityKey, CityRecord)>> {
        let cf = self.cf(cf::CITY_INDEX)?;
        let mut cities = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let record: CityRecord = match Self::deserialize(&value) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping undecodable city record");
                    continue;
                }
            };
            if !record.is_active() {
                continue;
            }
            let city_key = String::from_utf8_lossy(&key)
                .parse::<CityKey>()
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            cities.push((city_key, record));
        }
        Ok(cities)
    }

    // =========================================================================
    // Delay store operations
    // =========================================================================

    fn get_weather_day(
        &self,
        key: &CityKey,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<WeatherDay>> {
        let day: Option<WeatherDay> =
            self.get_record(cf::WEATHER_DAYS, &keys::city_day_key(key, date))?;
        Ok(day.filter(|d| d.ttl > now.timestamp()))
    }

    fn get_events_day(
        &self,
        key: &CityKey,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<EventsDay>> {
        let day: Option<EventsDay> =
            self.get_record(cf::EVENT_DAYS, &keys::city_day_key(key, date))?;
        Ok(day.filter(|d| d.ttl > now.timestamp()))
    }

    // =========================================================================
    // Compound lifecycle operations
    // =========================================================================

    fn create_route(
        &self,
        user_id: &UserId,
        route: &Route,
        schedule: &Schedule,
        city_meta: &CityMeta,
    ) -> Result<()> {
        let now = Utc::now();

        // Condition: the profile counter stays under the cap. A missing
        // profile counts as zero (the counter update is an upsert).
        let mut profile = self.get_profile(user_id)?.unwrap_or_else(|| {
            Profile::new(*user_id, String::new(), now)
        });
        if profile.route_count >= commutecast_core::MAX_ROUTES_PER_USER {
            return Err(StoreError::RouteCapReached {
                user_id: user_id.to_string(),
            });
        }
        profile.route_count += 1;

        // City index upsert: bump the counter, refresh last_active_at, keep
        // first_registered_at.
        let city = match self.get_city(&route.city_key)? {
            Some(mut existing) => {
                existing.active_route_count += 1;
                existing.last_active_at = now;
                existing
            }
            None => CityRecord::new(
                city_meta.city.clone(),
                city_meta.country_code.clone(),
                city_meta.lat,
                city_meta.lng,
                now,
            ),
        };

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &self.cf(cf::PROFILES)?,
            keys::user_key(user_id),
            Self::serialize(&profile)?,
        );
        batch.put_cf(
            &self.cf(cf::ROUTES)?,
            keys::user_route_key(user_id, &route.route_id),
            Self::serialize(route)?,
        );
        batch.put_cf(
            &self.cf(cf::SCHEDULES)?,
            keys::user_route_key(user_id, &schedule.route_id),
            Self::serialize(schedule)?,
        );
        batch.put_cf(
            &self.cf(cf::CITY_INDEX)?,
            keys::city_key(&route.city_key),
            Self::serialize(&city)?,
        );
        self.write(batch)
    }

    fn update_route_records(
        &self,
        user_id: &UserId,
        route: Option<&Route>,
        schedule: Option<&Schedule>,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();
        if let Some(route) = route {
            batch.put_cf(
                &self.cf(cf::ROUTES)?,
                keys::user_route_key(user_id, &route.route_id),
                Self::serialize(route)?,
            );
        }
        if let Some(schedule) = schedule {
            batch.put_cf(
                &self.cf(cf::SCHEDULES)?,
                keys::user_route_key(user_id, &schedule.route_id),
                Self::serialize(schedule)?,
            );
        }
        self.write(batch)
    }

    fn mark_schedule_inactive(&self, user_id: &UserId, route_id: &RouteId, ttl: i64) -> Result<()> {
        let mut schedule =
            self.get_schedule(user_id, route_id)?
                .ok_or_else(|| StoreError::NotFound {
                    entity: "schedule",
                    id: route_id.to_string(),
                })?;
        schedule.active = false;
        schedule.ttl = ttl;
        self.put_record(
            cf::SCHEDULES,
            &keys::user_route_key(user_id, route_id),
            &schedule,
        )
    }

    fn delete_route(&self, user_id: &UserId, route_id: &RouteId, city_key: &CityKey) -> Result<()> {
        // Condition: the city counter must still be positive.
        let mut city = self
            .get_city(city_key)?
            .filter(|c| c.active_route_count > 0)
            .ok_or_else(|| StoreError::CityCounterDrift {
                city_key: city_key.to_string(),
            })?;
        city.active_route_count -= 1;

        let mut batch = WriteBatch::default();
        batch.delete_cf(
            &self.cf(cf::ROUTES)?,
            keys::user_route_key(user_id, route_id),
        );
        batch.put_cf(
            &self.cf(cf::CITY_INDEX)?,
            keys::city_key(city_key),
            Self::serialize(&city)?,
        );
        if let Some(mut profile) = self.get_profile(user_id)? {
            profile.route_count = profile.route_count.saturating_sub(1);
            batch.put_cf(
                &self.cf(cf::PROFILES)?,
                keys::user_key(user_id),
                Self::serialize(&profile)?,
            );
        }
        self.write(batch)
    }

    fn compensate_delete_route(&self, user_id: &UserId, route_id: &RouteId) -> Result<()> {
        let mut batch = WriteBatch::default();
        batch.delete_cf(
            &self.cf(cf::ROUTES)?,
            keys::user_route_key(user_id, route_id),
        );
        if let Some(mut profile) = self.get_profile(user_id)? {
            profile.route_count = profile.route_count.saturating_sub(1);
            batch.put_cf(
                &self.cf(cf::PROFILES)?,
                keys::user_key(user_id),
                Self::serialize(&profile)?,
            );
        }
        self.write(batch)
    }
}
