//! The nightly weather scrape.

use std::sync::Arc;

use chrono::{DateTime, Days, Duration, Utc};
use futures::future::join_all;
use tokio::sync::Semaphore;

use commutecast_core::WeatherDay;
use commutecast_store::{RocksStore, Store};

use crate::error::PipelineError;
use crate::providers::weather::WeatherSource;
use crate::scrapers::{ScrapeSummary, MAX_CONCURRENT_CITIES, RECORD_TTL_DAYS, SCRAPE_HORIZON_DAYS};

/// Scrape hourly precipitation for every active city and persist one
/// record per city and day offset 1..=7.
///
/// # Errors
///
/// Returns an error only when the city index itself cannot be read;
/// per-city provider failures are counted and skipped.
pub async fn run_weather_scrape(
    store: &RocksStore,
    source: &dyn WeatherSource,
    now: DateTime<Utc>,
) -> Result<ScrapeSummary, PipelineError> {
    let cities = store.active_cities()?;
    tracing::info!(cities = cities.len(), "starting weather scrape");

    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_CITIES));
    let fetches = cities.iter().map(|(city_key, record)| {
        let semaphore = Arc::clone(&semaphore);
        async move {
            let _permit = semaphore.acquire().await;
            let result = source
                .hourly_precipitation(record.city_lat, record.city_lng)
                .await;
            (city_key, result)
        }
    });
    let results = join_all(fetches).await;

    let today = now.date_naive();
    let ttl = (now + Duration::days(RECORD_TTL_DAYS)).timestamp();
    let mut days = Vec::new();
    let mut cities_failed = 0usize;

    for (city_key, result) in results {
        match result {
            Ok(forecast) => {
                for offset in 1..=SCRAPE_HORIZON_DAYS {
                    let date = today + Days::new(offset);
                    days.push(WeatherDay {
                        city_key: city_key.clone(),
                        date,
                        hourly: forecast.slice_utc_date(date),
                        scraped_at: now,
                        ttl,
                    });
                }
            }
            Err(e) => {
                cities_failed += 1;
                tracing::warn!(city = %city_key, error = %e, "weather fetch failed, city skipped");
            }
        }
    }

    let records = days.len();
    let write_shortfall = store.batch_put_weather_days(&days).await;

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
        "weather scrape finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use commutecast_core::{CityKey, CityRecord};
    use tempfile::TempDir;

    use crate::providers::weather::{HourlyForecast, WeatherError};

    struct StubWeather {
        fail_for_lat: Option<f64>,
    }

    #[async_trait]
    impl WeatherSource for StubWeather {
        async fn hourly_precipitation(
            &self,
            lat: f64,
            _lng: f64,
        ) -> Result<HourlyForecast, WeatherError> {
            if Some(lat) == self.fail_for_lat {
                return Err(WeatherError::Api { status: 503 });
            }
            // Fixed horizon of hourly values covering the scrape window.
            let times: Vec<String> = (1..=7u64)
                .flat_map(|offset| {
                    let date = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap() + Days::new(offset);
                    (0..24).map(move |h| format!("{date}T{h:02}:00")).collect::<Vec<_>>()
                })
                .collect();
            let values = vec![0.1; times.len()];
            Ok(HourlyForecast::from_series(&times, &values))
        }
    }

    use chrono::NaiveDate;

    fn seed_city(store: &RocksStore, cc: &str, city: &str, lat: f64, count: i64) -> CityKey {
        let key = CityKey::build(cc, city);
        let mut record = CityRecord::new(city.into(), cc.into(), lat, -6.26, Utc::now());
        record.active_route_count = count;
        store.put_city(&key, &record).unwrap();
        key
    }

    #[tokio::test]
    async fn writes_seven_day_records_per_active_city() {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 8, 3, 23, 0, 0).unwrap();

        let dublin = seed_city(&store, "IE", "Dublin", 53.3498, 2);
        seed_city(&store, "FR", "Paris", 48.8566, 0); // inactive, skipped

        let source = StubWeather { fail_for_lat: None };
        let summary = run_weather_scrape(&store, &source, now).await.unwrap();

        assert_eq!(summary.cities, 1);
        assert_eq!(summary.records_written, 7);
        assert_eq!(summary.cities_failed, 0);

        // Tomorrow exists, today does not.
        let tomorrow = now.date_naive() + Days::new(1);
        let day = store.get_weather_day(&dublin, tomorrow, now).unwrap().unwrap();
        assert_eq!(day.hourly.len(), 24);
        assert!(store
            .get_weather_day(&dublin, now.date_naive(), now)
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn failed_city_does_not_poison_the_run() {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 8, 3, 23, 0, 0).unwrap();

        seed_city(&store, "IE", "Dublin", 53.3498, 1);
        seed_city(&store, "GB", "London", 51.5072, 1);

        let source = StubWeather {
            fail_for_lat: Some(51.5072),
        };
        let summary = run_weather_scrape(&store, &source, now).await.unwrap();

        assert_eq!(summary.cities, 2);
        assert_eq!(summary.cities_failed, 1);
        assert_eq!(summary.records_written, 7);
    }
}
