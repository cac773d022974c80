//! Weather provider client.
//!
//! One GET per (lat, lng) returns 8 days of hourly precipitation in UTC.
//! A failed fetch is non-fatal for the night: the city simply contributes
//! no weather data and the worker forecasts without it.

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use reqwest::Client;
use serde::Deserialize;

use async_trait::async_trait;
use commutecast_core::HourlyPrecip;

/// Per-request timeout.
pub const WEATHER_TIMEOUT_SECS: u64 = 10;

/// Days of forecast requested, today plus the 7-day scrape horizon.
pub const FORECAST_DAYS: u32 = 8;

/// Error type for weather provider operations.
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider returned a non-success status.
    #[error("weather API error: HTTP {status}")]
    Api {
        /// The HTTP status code.
        status: u16,
    },
}

/// Raw provider response: parallel arrays of timestamps and values.
#[derive(Debug, Deserialize)]
struct ForecastResponse {
    hourly: HourlyBlock,
}

#[derive(Debug, Deserialize)]
struct HourlyBlock {
    time: Vec<String>,
    precipitation: Vec<f64>,
}

/// A parsed 8-day hourly precipitation forecast, UTC.
#[derive(Debug, Default, Clone)]
pub struct HourlyForecast {
    entries: Vec<(NaiveDate, u32, f64)>,
}

impl HourlyForecast {
    /// Build from provider hour values, e.g. `"2026-08-03T05:00"`.
    ///
    /// Timestamps that fail to parse are dropped with a warning; the
    /// provider occasionally pads series with nulls near the horizon.
    #[must_use]
    pub fn from_series(times: &[String], values: &[f64]) -> Self {
        let mut entries = Vec::with_capacity(times.len());
        for (time, value) in times.iter().zip(values) {
            match NaiveDateTime::parse_from_str(time, "%Y-%m-%dT%H:%M") {
                Ok(dt) => entries.push((dt.date(), dt.time().hour(), *value)),
                Err(_) => {
                    tracing::warn!(time, "dropping unparseable forecast timestamp");
                }
            }
        }
        Self { entries }
    }

    /// The 24 hourly values falling on one UTC date.
    #[must_use]
    pub fn slice_utc_date(&self, date: NaiveDate) -> Vec<HourlyPrecip> {
        self.entries
            .iter()
            .filter(|(d, _, _)| *d == date)
            .map(|&(_, hour, precipitation_mm)| HourlyPrecip {
                hour,
                precipitation_mm,
            })
            .collect()
    }

}

/// A source of hourly precipitation forecasts. The scraper depends on this
/// seam; tests substitute a stub.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Fetch the 8-day hourly forecast for a coordinate.
    async fn hourly_precipitation(&self, lat: f64, lng: f64)
        -> Result<HourlyForecast, WeatherError>;
}

/// HTTP client for the weather provider.
#[derive(Debug, Clone)]
pub struct WeatherClient {
    client: Client,
    base_url: String,
}

impl WeatherClient {
    /// Create a new client against the given provider base URL.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built (should not happen with
    /// default settings).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(WEATHER_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl WeatherSource for WeatherClient {
    async fn hourly_precipitation(
        &self,
        lat: f64,
        lng: f64,
    ) -> Result<HourlyForecast, WeatherError> {
        let url = format!(
            "{}/forecast?latitude={lat}&longitude={lng}&hourly=precipitation&timezone=UTC&forecast_days={FORECAST_DAYS}",
            self.base_url
        );

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::Api {
                status: status.as_u16(),
            });
        }

        let body: ForecastResponse = response.json().await?;
        Ok(HourlyForecast::from_series(
            &body.hourly.time,
            &body.hourly.precipitation,
        ))
    }
}
