//! The departure recommendation engine.
//!
//! Deterministic phase-1 rules behind a single function. The worker depends
//! only on this signature, so alternative implementations (a model
//! endpoint, an LLM call) can swap in without touching the pipeline.

use chrono::{Duration, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};

use crate::delay::{EventRecord, HourlyPrecip};
use crate::error::Result;
use crate::route::Recommendation;
use crate::timekeeping::parse_hhmm;

/// Commute-window precipitation above this total adds a rain buffer, mm.
pub const RAIN_THRESHOLD_MM: f64 = 0.5;

/// Extra minutes added when rain is expected.
pub const RAIN_BUFFER_MINS: u32 = 10;

/// Extra minutes added per corridor event.
pub const EVENT_BUFFER_MINS: u32 = 30;

/// Inputs for one route on one forecast date.
#[derive(Debug)]
pub struct RecommendationInput<'a> {
    /// Hourly precipitation for the forecast date (UTC hours). Empty when
    /// no weather record exists.
    pub hourly: &'a [HourlyPrecip],

    /// Events already filtered down to the commute window and corridor.
    pub corridor_events: &'a [EventRecord],

    /// Arrival target converted to UTC, `"HH:MM"`.
    pub arrive_by_utc: &'a str,

    /// Baseline journey time in minutes.
    pub static_duration_mins: u32,

    /// The calendar date being forecast.
    pub forecast_date: NaiveDate,
}

/// Sum precipitation over the inclusive UTC hour window
/// `[floor((arrive - static) / 60), floor(arrive / 60)]`.
fn commute_window_precipitation(
    hourly: &[HourlyPrecip],
    arrive_mins_utc: u32,
    static_duration_mins: u32,
) -> f64 {
    let arrive = i64::from(arrive_mins_utc);
    let depart_hour = (arrive - i64::from(static_duration_mins)).div_euclid(60);
    let arrive_hour = arrive.div_euclid(60);
    hourly
        .iter()
        .filter(|h| i64::from(h.hour) >= depart_hour && i64::from(h.hour) <= arrive_hour)
        .map(|h| h.precipitation_mm)
        .sum()
}

/// Produce the departure recommendation for one route and date.
///
/// A negative departure offset naturally resolves to the previous calendar
/// day; there is no clamping.
///
/// # Errors
///
/// Returns an error when `arrive_by_utc` is not a valid `HH:MM` time.
pub fn recommend(input: &RecommendationInput<'_>) -> Result<Recommendation> {
    let arrive_mins = parse_hhmm(input.arrive_by_utc)?;

    let mut extra_buffer_mins: u32 = 0;
    let mut reasons: Vec<String> = Vec::new();

    let precip =
        commute_window_precipitation(input.hourly, arrive_mins, input.static_duration_mins);
    if precip > RAIN_THRESHOLD_MM {
        extra_buffer_mins += RAIN_BUFFER_MINS;
        reasons
            .push("Rain expected during your commute window — allow extra time".to_string());
    }

    for event in input.corridor_events {
        extra_buffer_mins += EVENT_BUFFER_MINS;
        reasons.push(format!("Event near your route: {}", event.name));
    }

    let depart_mins = i64::from(arrive_mins)
        - i64::from(input.static_duration_mins)
        - i64::from(extra_buffer_mins);

    let midnight = Utc.from_utc_datetime(&input.forecast_date.and_time(NaiveTime::MIN));
    let adjusted_depart_by = (midnight + Duration::minutes(depart_mins))
        .to_rfc3339_opts(SecondsFormat::Secs, true);

    let reasoning = if reasons.is_empty() {
        "No significant delays expected".to_string()
    } else {
        reasons.join("; ")
    };

    Ok(Recommendation {
        adjusted_depart_by,
        extra_buffer_mins,
        reasoning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hourly(values: &[(u32, f64)]) -> Vec<HourlyPrecip> {
        values
            .iter()
            .map(|&(hour, precipitation_mm)| HourlyPrecip {
                hour,
                precipitation_mm,
            })
            .collect()
    }

    fn event(name: &str) -> EventRecord {
        EventRecord {
            name: name.to_string(),
            venue: "Venue".to_string(),
            lat: 53.36,
            lng: -6.26,
            start_time: "18:00".to_string(),
            url: "https://events.example/e/1".to_string(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn clear_day_departs_static_duration_early() {
        let rec = recommend(&RecommendationInput {
            hourly: &[],
            corridor_events: &[],
            arrive_by_utc: "08:30",
            static_duration_mins: 25,
            forecast_date: date(2026, 8, 10),
        })
        .unwrap();
        assert_eq!(rec.extra_buffer_mins, 0);
        assert_eq!(rec.adjusted_depart_by, "2026-08-10T08:05:00Z");
    }

    #[test]
    fn rain_over_threshold_adds_ten_minutes() {
        let hours = hourly(&[(8, 0.7)]);
        let rec = recommend(&RecommendationInput {
            hourly: &hours,
            corridor_events: &[],
            arrive_by_utc: "08:30",
            static_duration_mins: 25,
            forecast_date: date(2026, 8, 10),
        })
        .unwrap();
        assert_eq!(rec.extra_buffer_mins, 10);
        assert!(rec.reasoning.contains("Rain expected"));
        assert_eq!(rec.adjusted_depart_by, "2026-08-10T07:55:00Z");
    }

    #[test]
    fn rain_at_threshold_adds_nothing() {
        let hours = hourly(&[(8, 0.5)]);
        let rec = recommend(&RecommendationInput {
            hourly: &hours,
            corridor_events: &[],
            arrive_by_utc: "08:30",
            static_duration_mins: 25,
            forecast_date: date(2026, 8, 10),
        })
        .unwrap();
        assert_eq!(rec.extra_buffer_mins, 0);
    }

    #[test]
    fn each_corridor_event_adds_thirty_minutes() {
        let events = vec![event("Concert"), event("Match")];
        let hours = hourly(&[(17, 1.2)]);
        let rec = recommend(&RecommendationInput {
            hourly: &hours,
            corridor_events: &events,
            arrive_by_utc: "18:30",
            static_duration_mins: 25,
            forecast_date: date(2026, 8, 10),
        })
        .unwrap();
        // 10 for rain + 2 * 30 for events.
        assert_eq!(rec.extra_buffer_mins, 70);
        assert!(rec.reasoning.contains("Concert"));
        assert!(rec.reasoning.contains("Match"));
    }

    #[test]
    fn event_only_shifts_departure_by_thirty() {
        let events = vec![event("Summer Concert")];
        let rec = recommend(&RecommendationInput {
            hourly: &[],
            corridor_events: &events,
            arrive_by_utc: "18:30",
            static_duration_mins: 25,
            forecast_date: date(2026, 8, 10),
        })
        .unwrap();
        assert_eq!(rec.extra_buffer_mins, 30);
        assert_eq!(rec.adjusted_depart_by, "2026-08-10T17:35:00Z");
    }

    #[test]
    fn negative_departure_crosses_midnight_backwards() {
        let rec = recommend(&RecommendationInput {
            hourly: &[],
            corridor_events: &[],
            arrive_by_utc: "00:30",
            static_duration_mins: 45,
            forecast_date: date(2026, 8, 10),
        })
        .unwrap();
        assert_eq!(rec.adjusted_depart_by, "2026-08-09T23:45:00Z");
    }

    #[test]
    fn window_spans_depart_and_arrive_hours() {
        // Arrive 09:10, static 30: window covers hours 8 and 9.
        let hours = hourly(&[(7, 5.0), (8, 0.4), (9, 0.3), (10, 5.0)]);
        let rec = recommend(&RecommendationInput {
            hourly: &hours,
            corridor_events: &[],
            arrive_by_utc: "09:10",
            static_duration_mins: 30,
            forecast_date: date(2026, 8, 10),
        })
        .unwrap();
        // 0.4 + 0.3 = 0.7 > 0.5, but the hour-7 and hour-10 downpours are
        // outside the window.
        assert_eq!(rec.extra_buffer_mins, 10);
    }

    #[test]
    fn bad_arrival_time_is_an_error() {
        assert!(recommend(&RecommendationInput {
            hourly: &[],
            corridor_events: &[],
            arrive_by_utc: "25:00",
            static_duration_mins: 10,
            forecast_date: date(2026, 8, 10),
        })
        .is_err());
    }
}
