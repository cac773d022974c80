//! Day-partitioned city records written by the scrapers.
//!
//! One record per (city, date) and type, covering days 1..7 ahead of the
//! scrape. Workers join routes against these; a missing record means the
//! scraper had nothing for that night and is tolerated.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::city::CityKey;

/// One hour of precipitation forecast, UTC.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyPrecip {
    /// Hour of day, 0..=23.
    pub hour: u32,
    /// Expected precipitation in millimetres.
    pub precipitation_mm: f64,
}

/// Hourly precipitation for one city on one UTC date.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherDay {
    /// The city this record covers.
    pub city_key: CityKey,

    /// The UTC calendar date.
    pub date: NaiveDate,

    /// The 24 hourly values for `date`.
    pub hourly: Vec<HourlyPrecip>,

    /// When the scraper fetched this.
    pub scraped_at: DateTime<Utc>,

    /// Expiry, epoch seconds (one day past the last useful date).
    pub ttl: i64,
}

/// A public event near a city, as extracted from the event provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Event name.
    pub name: String,

    /// Venue name.
    pub venue: String,

    /// Venue latitude. Always finite; events with unusable coordinates are
    /// dropped at extraction.
    pub lat: f64,

    /// Venue longitude.
    pub lng: f64,

    /// Local start time, `"HH:MM"`.
    pub start_time: String,

    /// Provider URL for the event.
    pub url: String,
}

/// Events for one city on one local date.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsDay {
    /// The city this record covers.
    pub city_key: CityKey,

    /// The local calendar date the events start on.
    pub date: NaiveDate,

    /// Events bucketed onto `date`. May be empty.
    pub events: Vec<EventRecord>,

    /// When the scraper fetched this.
    pub scraped_at: DateTime<Utc>,

    /// Expiry, epoch seconds.
    pub ttl: i64,
}
