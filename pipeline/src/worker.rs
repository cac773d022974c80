//! The forecast worker.
//!
//! Consumes one chunk message at a time: batch-loads the referenced
//! routes, joins them against the scraped city data for each day's next
//! calendar date, runs the recommendation engine and batch-writes one
//! forecast per route. Per-route failures are logged and skipped so one
//! bad record never poisons a chunk; a chunk-level failure propagates so
//! the queue redrives the message toward the dead-letter family.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, Utc};

use commutecast_core::timekeeping::{format_hhmm, local_mins_to_utc, parse_hhmm};
use commutecast_core::{
    geo, recommend, CityKey, DayForecast, DayOfWeek, EventRecord, EventsDay, Forecast, LatLng,
    RecommendationInput, Route, RouteId, UserId, WeatherDay,
};
use commutecast_store::{ChunkMessage, RocksStore, RouteRef};

use crate::error::PipelineError;

/// Outcome of processing one chunk message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOutcome {
    /// Forecast records written.
    pub forecasts_written: usize,
    /// Routes skipped on per-route failures.
    pub routes_skipped: usize,
}

/// Outcome of one worker drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSummary {
    /// Messages processed and acknowledged.
    pub messages_processed: usize,
    /// Messages left for redelivery after a processing failure.
    pub messages_failed: usize,
}

/// Process one chunk message.
///
/// # Errors
///
/// Returns an error when the store itself fails; the caller leaves the
/// message unacknowledged so the queue redelivers it.
pub async fn process_chunk(
    store: &RocksStore,
    message: &ChunkMessage,
    now: DateTime<Utc>,
) -> Result<ChunkOutcome, PipelineError> {
    let today = now.date_naive();

    // Batch-load every referenced route.
    let refs: Vec<(UserId, RouteId)> = message
        .routes
        .iter()
        .map(|r| (r.user_id, r.route_id))
        .collect();
    let routes = store.batch_get_routes(&refs).await;

    // Distinct cities and the union of days across the chunk.
    let cities: BTreeSet<CityKey> = routes.values().map(|r| r.city_key.clone()).collect();
    let day_union: BTreeSet<DayOfWeek> = message
        .routes
        .iter()
        .flat_map(|r| r.days_of_week.iter().copied())
        .collect();

    // Each day name resolves to its next calendar date, wrapping 1..=7.
    let date_for: BTreeMap<DayOfWeek, NaiveDate> = day_union
        .iter()
        .map(|&day| (day, day.next_date_after(today)))
        .collect();

    // One delay-store load for every (city, date) pair; missing records
    // resolve to empty data downstream.
    let pairs: Vec<(CityKey, NaiveDate)> = cities
        .iter()
        .flat_map(|city| date_for.values().map(|&date| (city.clone(), date)))
        .collect();
    let weather = store.batch_get_weather_days(&pairs, now).await;
    let events = store.batch_get_events_days(&pairs, now).await;

    let mut forecasts: Vec<(UserId, Forecast)> = Vec::new();
    let mut routes_skipped = 0usize;

    for route_ref in &message.routes {
        let route = routes.get(&(route_ref.user_id, route_ref.route_id));
        match build_route_forecast(route_ref, route, &date_for, &weather, &events, now) {
            Ok(Some(forecast)) => forecasts.push((route_ref.user_id, forecast)),
            Ok(None) => routes_skipped += 1,
            Err(e) => {
                routes_skipped += 1;
                tracing::warn!(
                    user_id = %route_ref.user_id,
                    route_id = %route_ref.route_id,
                    error = %e,
                    "route skipped"
                );
            }
        }
    }

    let shortfall = store.batch_put_forecasts(&forecasts).await;
    Ok(ChunkOutcome {
        forecasts_written: forecasts.len() - shortfall,
        routes_skipped,
    })
}

/// Build the forecast for one route, or `None` when the route record is
/// gone (a schedule can outlive its route briefly after deletion).
fn build_route_forecast(
    route_ref: &RouteRef,
    route: Option<&Route>,
    date_for: &BTreeMap<DayOfWeek, NaiveDate>,
    weather: &HashMap<(CityKey, NaiveDate), WeatherDay>,
    events: &HashMap<(CityKey, NaiveDate), EventsDay>,
    now: DateTime<Utc>,
) -> Result<Option<Forecast>, PipelineError> {
    let Some(route) = route else {
        tracing::warn!(
            user_id = %route_ref.user_id,
            route_id = %route_ref.route_id,
            "schedule references a missing route"
        );
        return Ok(None);
    };

    let arrive_local_mins = parse_hhmm(&route_ref.arrive_by)?;
    let origin = route.origin.lat_lng();
    let destination = route.destination.lat_lng();

    let mut days: BTreeMap<DayOfWeek, DayForecast> = BTreeMap::new();
    for day in &route_ref.days_of_week {
        let Some(&forecast_date) = date_for.get(day) else {
            continue;
        };

        let arrive_utc_mins =
            local_mins_to_utc(arrive_local_mins, &route_ref.timezone, forecast_date);
        let arrive_by_utc = format_hhmm(arrive_utc_mins);

        let weather_day = weather.get(&(route.city_key.clone(), forecast_date));
        let events_day = events.get(&(route.city_key.clone(), forecast_date));

        let corridor_events: Vec<EventRecord> = events_day
            .map(|day| {
                day.events
                    .iter()
                    .filter(|event| {
                        in_commute_window(event, arrive_local_mins)
                            && geo::in_corridor(
                                LatLng {
                                    latitude: event.lat,
                                    longitude: event.lng,
                                },
                                origin,
                                destination,
                            )
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let recommendation = recommend(&RecommendationInput {
            hourly: weather_day.map_or(&[], |day| day.hourly.as_slice()),
            corridor_events: &corridor_events,
            arrive_by_utc: &arrive_by_utc,
            static_duration_mins: route.static_duration,
            forecast_date,
        })?;

        days.insert(
            *day,
            DayForecast {
                forecast_date,
                recommendation,
                has_weather_data: weather_day.is_some(),
                has_event_data: events_day.is_some(),
            },
        );
    }

    Ok(Some(Forecast {
        route_id: route.route_id,
        days,
        generated_at: now,
    }))
}

/// Commute-window filter: events starting at or before the local arrival
/// target. Events with unparseable start times cannot be placed in the
/// window and are excluded.
fn in_commute_window(event: &EventRecord, arrive_local_mins: u32) -> bool {
    match parse_hhmm(&event.start_time) {
        Ok(start) => start <= arrive_local_mins,
        Err(_) => {
            tracing::warn!(event = %event.name, "event has unparseable start time, excluded");
            false
        }
    }
}

/// Drain the queue: receive, process, acknowledge.
///
/// A failed message is left unacknowledged so it redelivers after the
/// visibility window, reaching the dead-letter family once it exceeds the
/// max receive count.
///
/// # Errors
///
/// Returns an error when the queue itself cannot be read.
pub async fn run_worker(
    store: &RocksStore,
    max_receives: u32,
) -> Result<WorkerSummary, PipelineError> {
    let mut summary = WorkerSummary {
        messages_processed: 0,
        messages_failed: 0,
    };

    loop {
        let Some(received) = store.receive_chunk(Utc::now(), max_receives)? else {
            break;
        };
        let message_id = received.message.id.clone();

        match process_chunk(store, &received.message, Utc::now()).await {
            Ok(outcome) => {
                store.ack_chunk(&received.receipt)?;
                summary.messages_processed += 1;
                tracing::info!(
                    message_id,
                    written = outcome.forecasts_written,
                    skipped = outcome.routes_skipped,
                    "chunk processed"
                );
            }
            Err(e) => {
                summary.messages_failed += 1;
                tracing::error!(
                    message_id,
                    receive_count = received.receive_count,
                    error = %e,
                    "chunk failed, left for redelivery"
                );
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, TimeZone};
    use commutecast_core::{HourlyPrecip, Location, Profile, TravelMode, Waypoint};
    use commutecast_store::Store;
    use tempfile::TempDir;

    fn waypoint(lat: f64, lng: f64, label: &str) -> Waypoint {
        Waypoint {
            location: Location {
                lat_lng: LatLng {
                    latitude: lat,
                    longitude: lng,
                },
            },
            label: label.into(),
            place_id: None,
        }
    }

    /// The Dublin test route from §8: Spire to Glasnevin, 25 minutes.
    fn dublin_route(route_id: RouteId) -> Route {
        let now = Utc::now();
        Route {
            route_id,
            title: "Home to office".into(),
            origin: waypoint(53.3498, -6.2603, "Home"),
            destination: waypoint(53.3849, -6.2579, "Office"),
            intermediates: Vec::new(),
            travel_mode: TravelMode::Drive,
            static_duration: 25,
            traffic_duration: None,
            distance_meters: None,
            city_key: CityKey::build("IE", "Dublin"),
            city_lat: 53.3498,
            city_lng: -6.2603,
            user_active: true,
            geometry: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn chunk_for(user_id: UserId, route_id: RouteId, arrive_by: &str) -> ChunkMessage {
        ChunkMessage {
            id: "msg-1".into(),
            chunk_index: 0,
            chunk_size: 1,
            routes: vec![RouteRef {
                user_id,
                route_id,
                arrive_by: arrive_by.into(),
                timezone: "Europe/Dublin".into(),
                days_of_week: vec![DayOfWeek::Mon],
            }],
        }
    }

    async fn seed_weather(
        store: &RocksStore,
        date: NaiveDate,
        hours: &[(u32, f64)],
        now: DateTime<Utc>,
    ) {
        let day = WeatherDay {
            city_key: CityKey::build("IE", "Dublin"),
            date,
            hourly: hours
                .iter()
                .map(|&(hour, precipitation_mm)| HourlyPrecip {
                    hour,
                    precipitation_mm,
                })
                .collect(),
            scraped_at: now,
            ttl: now.timestamp() + 8 * 24 * 3600,
        };
        assert_eq!(store.batch_put_weather_days(std::slice::from_ref(&day)).await, 0);
    }

    async fn seed_events(
        store: &RocksStore,
        date: NaiveDate,
        events: Vec<EventRecord>,
        now: DateTime<Utc>,
    ) {
        let day = EventsDay {
            city_key: CityKey::build("IE", "Dublin"),
            date,
            events,
            scraped_at: now,
            ttl: now.timestamp() + 8 * 24 * 3600,
        };
        assert_eq!(store.batch_put_events_days(std::slice::from_ref(&day)).await, 0);
    }

    fn corridor_event(name: &str, start_time: &str) -> EventRecord {
        EventRecord {
            name: name.into(),
            venue: "Botanic Gardens".into(),
            lat: 53.3674,
            lng: -6.2591,
            start_time: start_time.into(),
            url: String::new(),
        }
    }

    /// Winter Monday so the Dublin offset is zero; next MON is 2026-01-12.
    fn winter_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 0, 30, 0).unwrap()
    }

    fn setup() -> (RocksStore, TempDir, UserId, RouteId) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        let user_id = UserId::generate();
        let route_id = RouteId::generate();
        store
            .update_route_records(&user_id, Some(&dublin_route(route_id)), None)
            .unwrap();
        (store, dir, user_id, route_id)
    }

    #[tokio::test]
    async fn rain_only_scenario() {
        let (store, _dir, user_id, route_id) = setup();
        let now = winter_now();
        let next_monday = NaiveDate::from_ymd_opt(2026, 1, 12).unwrap();

        seed_weather(&store, next_monday, &[(8, 0.7)], now).await;

        let outcome = process_chunk(&store, &chunk_for(user_id, route_id, "08:30"), now)
            .await
            .unwrap();
        assert_eq!(outcome.forecasts_written, 1);

        let forecast = store.get_forecast(&user_id, &route_id).unwrap().unwrap();
        let monday = &forecast.days[&DayOfWeek::Mon];
        assert_eq!(monday.forecast_date, next_monday);
        assert!(monday.has_weather_data);
        assert!(!monday.has_event_data);
        assert_eq!(monday.recommendation.extra_buffer_mins, 10);
        assert!(monday.recommendation.reasoning.contains("Rain expected"));
        assert_eq!(
            monday.recommendation.adjusted_depart_by,
            "2026-01-12T07:55:00Z"
        );
    }

    #[tokio::test]
    async fn event_on_corridor_scenario() {
        let (store, _dir, user_id, route_id) = setup();
        let now = winter_now();
        let next_monday = NaiveDate::from_ymd_opt(2026, 1, 12).unwrap();

        seed_weather(&store, next_monday, &[(17, 0.0), (18, 0.0)], now).await;
        seed_events(
            &store,
            next_monday,
            vec![corridor_event("Winter Concert", "18:00")],
            now,
        )
        .await;

        process_chunk(&store, &chunk_for(user_id, route_id, "18:30"), now)
            .await
            .unwrap();

        let forecast = store.get_forecast(&user_id, &route_id).unwrap().unwrap();
        let monday = &forecast.days[&DayOfWeek::Mon];
        assert_eq!(monday.recommendation.extra_buffer_mins, 30);
        assert!(monday.recommendation.reasoning.contains("Winter Concert"));
        assert_eq!(
            monday.recommendation.adjusted_depart_by,
            "2026-01-12T17:35:00Z"
        );
    }

    #[tokio::test]
    async fn rain_and_two_events_scenario() {
        let (store, _dir, user_id, route_id) = setup();
        let now = winter_now();
        let next_monday = NaiveDate::from_ymd_opt(2026, 1, 12).unwrap();

        seed_weather(&store, next_monday, &[(18, 1.2)], now).await;
        seed_events(
            &store,
            next_monday,
            vec![
                corridor_event("Concert", "17:30"),
                corridor_event("Match", "18:15"),
            ],
            now,
        )
        .await;

        process_chunk(&store, &chunk_for(user_id, route_id, "18:30"), now)
            .await
            .unwrap();

        let forecast = store.get_forecast(&user_id, &route_id).unwrap().unwrap();
        assert_eq!(
            forecast.days[&DayOfWeek::Mon].recommendation.extra_buffer_mins,
            70
        );
    }

    #[tokio::test]
    async fn events_after_arrival_or_off_corridor_are_ignored() {
        let (store, _dir, user_id, route_id) = setup();
        let now = winter_now();
        let next_monday = NaiveDate::from_ymd_opt(2026, 1, 12).unwrap();

        let mut far_event = corridor_event("Howth Market", "08:00");
        far_event.lat = 53.3870;
        far_event.lng = -6.0650;
        seed_events(
            &store,
            next_monday,
            vec![
                // Starts after the 08:30 arrival target.
                corridor_event("Evening Show", "20:00"),
                far_event,
            ],
            now,
        )
        .await;

        process_chunk(&store, &chunk_for(user_id, route_id, "08:30"), now)
            .await
            .unwrap();

        let forecast = store.get_forecast(&user_id, &route_id).unwrap().unwrap();
        let monday = &forecast.days[&DayOfWeek::Mon];
        assert_eq!(monday.recommendation.extra_buffer_mins, 0);
        assert!(monday.has_event_data);
    }

    #[tokio::test]
    async fn missing_city_data_still_produces_a_forecast() {
        let (store, _dir, user_id, route_id) = setup();
        let now = winter_now();

        let outcome = process_chunk(&store, &chunk_for(user_id, route_id, "08:30"), now)
            .await
            .unwrap();
        assert_eq!(outcome.forecasts_written, 1);

        let forecast = store.get_forecast(&user_id, &route_id).unwrap().unwrap();
        let monday = &forecast.days[&DayOfWeek::Mon];
        assert!(!monday.has_weather_data);
        assert!(!monday.has_event_data);
        assert_eq!(monday.recommendation.extra_buffer_mins, 0);
    }

    #[tokio::test]
    async fn missing_route_is_skipped_not_fatal() {
        let (store, _dir, user_id, route_id) = setup();
        let now = winter_now();

        let mut message = chunk_for(user_id, route_id, "08:30");
        message.routes.push(RouteRef {
            user_id,
            route_id: RouteId::generate(),
            arrive_by: "09:00".into(),
            timezone: "Europe/Dublin".into(),
            days_of_week: vec![DayOfWeek::Tue],
        });

        let outcome = process_chunk(&store, &message, now).await.unwrap();
        assert_eq!(outcome.forecasts_written, 1);
        assert_eq!(outcome.routes_skipped, 1);
    }

    #[tokio::test]
    async fn worker_drains_queue_and_acks() {
        let (store, _dir, user_id, route_id) = setup();
        store
            .publish_chunk(&chunk_for(user_id, route_id, "08:30"))
            .unwrap();

        let summary = run_worker(&store, 3).await.unwrap();
        assert_eq!(summary.messages_processed, 1);
        assert_eq!(summary.messages_failed, 0);
        assert!(store.get_forecast(&user_id, &route_id).unwrap().is_some());

        // Acked: a second drain finds nothing.
        let summary = run_worker(&store, 3).await.unwrap();
        assert_eq!(summary.messages_processed, 0);
    }

    #[tokio::test]
    async fn forecast_days_follow_the_reference_days() {
        let (store, _dir, user_id, route_id) = setup();
        let now = winter_now();

        let mut message = chunk_for(user_id, route_id, "08:30");
        message.routes[0].days_of_week = vec![DayOfWeek::Mon, DayOfWeek::Thu];

        process_chunk(&store, &message, now).await.unwrap();

        let forecast = store.get_forecast(&user_id, &route_id).unwrap().unwrap();
        let keys: Vec<_> = forecast.days.keys().copied().collect();
        assert_eq!(keys, vec![DayOfWeek::Mon, DayOfWeek::Thu]);
        // Thursday is 2026-01-08, three days after the winter Monday.
        assert_eq!(
            forecast.days[&DayOfWeek::Thu].forecast_date,
            now.date_naive() + Days::new(3)
        );
    }

    #[tokio::test]
    async fn profile_record_is_untouched_by_the_worker() {
        let (store, _dir, user_id, route_id) = setup();
        let now = winter_now();
        let profile = Profile::new(user_id, "a@example.com".into(), now);
        store.create_profile(&profile).unwrap();

        process_chunk(&store, &chunk_for(user_id, route_id, "08:30"), now)
            .await
            .unwrap();
        assert_eq!(store.get_profile(&user_id).unwrap().unwrap().route_count, 0);
    }

    #[test]
    fn commute_window_comparison_is_on_minutes() {
        assert!(in_commute_window(&corridor_event("E", "08:30"), 510));
        assert!(in_commute_window(&corridor_event("E", "00:00"), 510));
        assert!(!in_commute_window(&corridor_event("E", "08:31"), 510));
        assert!(!in_commute_window(&corridor_event("E", "late"), 510));
    }
}
