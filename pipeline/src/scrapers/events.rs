//! The nightly event scrape.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Days, Duration, NaiveDate, Utc};
use futures::future::join_all;
use tokio::sync::Semaphore;

use commutecast_core::{EventRecord, EventsDay};
use commutecast_store::{RocksStore, Store};

use crate::error::PipelineError;
use crate::providers::events::{EventSource, ProviderEvent};
use crate::scrapers::{ScrapeSummary, MAX_CONCURRENT_CITIES, RECORD_TTL_DAYS, SCRAPE_HORIZON_DAYS};

/// Scrape events for every active city and persist one record per city and
/// day offset 1..=7, bucketed by the event's local date.
///
/// Days without events still get a record, so the worker can tell "no
/// events" apart from "no data".
///
/// # Errors
///
/// Returns an error only when the city index itself cannot be read;
/// per-city provider failures are counted and skipped.
pub async fn run_event_scrape(
    store: &RocksStore,
    source: &dyn EventSource,
    now: DateTime<Utc>,
) -> Result<ScrapeSummary, PipelineError> {
    let cities = store.active_cities()?;
    tracing::info!(cities = cities.len(), "starting event scrape");

    let today = now.date_naive();
    let window_start = today + Days::new(1);
    let window_end = today + Days::new(SCRAPE_HORIZON_DAYS);

    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_CITIES));
    let fetches = cities.iter().map(|(city_key, record)| {
        let semaphore = Arc::clone(&semaphore);
        async move {
            let _permit = semaphore.acquire().await;
            let result = source
                .events_between(record.city_lat, record.city_lng, window_start, window_end)
                .await;
            (city_key, result)
        }
    });
    let results = join_all(fetches).await;

    let ttl = (now + Duration::days(RECORD_TTL_DAYS)).timestamp();
    let mut days = Vec::new();
    let mut cities_failed = 0usize;

    for (city_key, result) in results {
        match result {
            Ok(events) => {
                let mut buckets = bucket_by_local_date(events);
                for offset in 1..=SCRAPE_HORIZON_DAYS {
                    let date = today + Days::new(offset);
                    days.push(EventsDay {
                        city_key: city_key.clone(),
                        date,
                        events: buckets.remove(&date).unwrap_or_default(),
                        scraped_at: now,
                        ttl,
                    });
                }
            }
            Err(e) => {
                cities_failed += 1;
                tracing::warn!(city = %city_key, error = %e, "event fetch failed, city skipped");
            }
        }
    }

    let records = days.len();
    let write_shortfall = store.batch_put_events_days(&days).await;

    let summary = ScrapeSummary {
        cities: cities.len(),
        cities_failed,
        records_written: records - write_shortfall,
        write_shortfall,
    };
    tracing::info!(
        cities = summary.cities,
        failed = summary.cities_failed,
        written = summary.records_written,
        "event scrape finished"
    );
    Ok(summary)
}

fn bucket_by_local_date(events: Vec<ProviderEvent>) -> HashMap<NaiveDate, Vec<EventRecord>> {
    let mut buckets: HashMap<NaiveDate, Vec<EventRecord>> = HashMap::new();
    for event in events {
        buckets
            .entry(event.local_date)
            .or_default()
            .push(EventRecord {
                name: event.name,
                venue: event.venue,
                lat: event.lat,
                lng: event.lng,
                start_time: event.local_time,
                url: event.url,
            });
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use commutecast_core::{CityKey, CityRecord};
    use tempfile::TempDir;

    use crate::providers::events::EventError;

    struct StubEvents {
        events: Vec<ProviderEvent>,
    }

    #[async_trait]
    impl EventSource for StubEvents {
        async fn events_between(
            &self,
            _lat: f64,
            _lng: f64,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<Vec<ProviderEvent>, EventError> {
            // The scraper is expected to ask for tomorrow .. tomorrow+6.
            assert_eq!(end - start, chrono::Duration::days(6));
            Ok(self.events.clone())
        }
    }

    fn event_on(date: NaiveDate, name: &str) -> ProviderEvent {
        ProviderEvent {
            name: name.into(),
            venue: "Venue".into(),
            lat: 53.36,
            lng: -6.26,
            local_date: date,
            local_time: "18:00".into(),
            url: String::new(),
        }
    }

    #[tokio::test]
    async fn buckets_events_by_local_date_and_writes_empty_days() {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 8, 3, 23, 0, 0).unwrap();

        let key = CityKey::build("IE", "Dublin");
        let mut record = CityRecord::new("Dublin".into(), "IE".into(), 53.35, -6.26, now);
        record.active_route_count = 1;
        store.put_city(&key, &record).unwrap();

        let d2 = now.date_naive() + Days::new(2);
        let source = StubEvents {
            events: vec![event_on(d2, "Concert"), event_on(d2, "Match")],
        };
        let summary = run_event_scrape(&store, &source, now).await.unwrap();
        assert_eq!(summary.records_written, 7);

        let busy = store.get_events_day(&key, d2, now).unwrap().unwrap();
        assert_eq!(busy.events.len(), 2);

        // A horizon day with nothing on still has a (empty) record.
        let quiet = store
            .get_events_day(&key, now.date_naive() + Days::new(5), now)
            .unwrap()
            .unwrap();
        assert!(quiet.events.is_empty());
    }
}
