//! Event provider client.
//!
//! Paginated, geo-bounded event search: page 0 first to learn the page
//! count, then the remaining pages concurrently, capped at five pages (the
//! provider stops serving past ~1000 results and rate-limits around
//! 5 req/s). The API key comes lazily from the secret resolver, once per
//! process.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::OnceCell;

use async_trait::async_trait;

/// Per-request timeout.
pub const EVENTS_TIMEOUT_SECS: u64 = 10;

/// Hard cap on pages fetched per city.
pub const MAX_PAGES: usize = 5;

/// Results requested per page.
pub const PAGE_SIZE: u32 = 200;

/// Search radius around the city centre, km.
pub const SEARCH_RADIUS_KM: u32 = 25;

/// Name of the secret holding the event provider API key.
pub const API_KEY_SECRET: &str = "events-api-key";

/// Error type for event provider operations.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider returned a non-success status.
    #[error("events API error: HTTP {status}")]
    Api {
        /// The HTTP status code.
        status: u16,
    },

    /// The API key could not be resolved.
    #[error("secret resolution failed: {0}")]
    Secret(String),
}

/// Resolves named secrets (the event provider API key).
///
/// Deployment owns where secrets live; the client only needs this seam.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Fetch the value of a named secret.
    async fn resolve(&self, name: &str) -> Result<String, EventError>;
}

/// One event as extracted from the provider, coordinates already validated.
#[derive(Debug, Clone)]
pub struct ProviderEvent {
    /// Event name.
    pub name: String,
    /// Venue name.
    pub venue: String,
    /// Venue latitude (finite).
    pub lat: f64,
    /// Venue longitude (finite).
    pub lng: f64,
    /// Local calendar date the event starts on.
    pub local_date: NaiveDate,
    /// Local start time, `"HH:MM"`.
    pub local_time: String,
    /// Provider URL.
    pub url: String,
}

// Provider wire shapes. Only the fields we extract are modelled.

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(rename = "_embedded", default)]
    embedded: Option<EmbeddedEvents>,
    page: PageInfo,
}

#[derive(Debug, Deserialize)]
struct EmbeddedEvents {
    #[serde(default)]
    events: Vec<EventDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    total_pages: usize,
}

#[derive(Debug, Deserialize)]
struct EventDto {
    name: String,
    #[serde(default)]
    url: Option<String>,
    dates: DatesDto,
    #[serde(rename = "_embedded", default)]
    embedded: Option<EmbeddedVenues>,
}

#[derive(Debug, Deserialize)]
struct DatesDto {
    start: StartDto,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartDto {
    local_date: String,
    #[serde(default)]
    local_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddedVenues {
    #[serde(default)]
    venues: Vec<VenueDto>,
}

#[derive(Debug, Deserialize)]
struct VenueDto {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    location: Option<LocationDto>,
}

#[derive(Debug, Deserialize)]
struct LocationDto {
    latitude: String,
    longitude: String,
}

/// A source of nearby events. The scraper depends on this seam; tests
/// substitute a stub.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetch all events around a coordinate in a closed date window.
    async fn events_between(
        &self,
        lat: f64,
        lng: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ProviderEvent>, EventError>;
}

/// HTTP client for the event provider.
pub struct EventClient {
    client: Client,
    base_url: String,
    resolver: Arc<dyn SecretResolver>,
    api_key: OnceCell<String>,
}

impl EventClient {
    /// Create a new client against the given provider base URL.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built (should not happen with
    /// default settings).
    #[must_use]
    pub fn new(base_url: impl Into<String>, resolver: Arc<dyn SecretResolver>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(EVENTS_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            resolver,
            api_key: OnceCell::new(),
        }
    }

    /// The API key, resolved on first use and cached for the process.
    async fn api_key(&self) -> Result<&str, EventError> {
        self.api_key
            .get_or_try_init(|| self.resolver.resolve(API_KEY_SECRET))
            .await
            .map(String::as_str)
    }

    async fn fetch_page(
        &self,
        api_key: &str,
        lat: f64,
        lng: f64,
        start: NaiveDate,
        end: NaiveDate,
        page: usize,
    ) -> Result<EventsResponse, EventError> {
        let url = format!(
            "{}/events.json?apikey={api_key}&latlong={lat},{lng}&radius={SEARCH_RADIUS_KM}&unit=km\
             &startDateTime={start}T00:00:00Z&endDateTime={end}T23:59:59Z\
             &size={PAGE_SIZE}&page={page}&sort=date,asc",
            self.base_url
        );

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EventError::Api {
                status: status.as_u16(),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl EventSource for EventClient {
    async fn events_between(
        &self,
        lat: f64,
        lng: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ProviderEvent>, EventError> {
        let api_key = self.api_key().await?.to_string();

        let first = self.fetch_page(&api_key, lat, lng, start, end, 0).await?;
        let total_pages = first.page.total_pages.min(MAX_PAGES);
        let mut events = extract_events(first);

        if total_pages > 1 {
            let tails = join_all(
                (1..total_pages).map(|page| self.fetch_page(&api_key, lat, lng, start, end, page)),
            )
            .await;
            for tail in tails {
                match tail {
                    Ok(response) => events.extend(extract_events(response)),
                    Err(e) => {
                        tracing::warn!(error = %e, "event page fetch failed, continuing");
                    }
                }
            }
        }

        Ok(events)
    }
}

/// Flatten one response page into validated events.
///
/// Events with unparseable dates or non-finite coordinates are dropped
/// with a warning rather than poisoning the scrape.
fn extract_events(response: EventsResponse) -> Vec<ProviderEvent> {
    let Some(embedded) = response.embedded else {
        return Vec::new();
    };

    let mut events = Vec::with_capacity(embedded.events.len());
    for dto in embedded.events {
        let Ok(local_date) = NaiveDate::parse_from_str(&dto.dates.start.local_date, "%Y-%m-%d")
        else {
            tracing::warn!(event = %dto.name, "dropping event with unparseable date");
            continue;
        };

        let venue = dto
            .embedded
            .as_ref()
            .and_then(|e| e.venues.first());
        let Some((lat, lng)) = venue.and_then(|v| v.location.as_ref()).and_then(|loc| {
            let lat = loc.latitude.parse::<f64>().ok()?;
            let lng = loc.longitude.parse::<f64>().ok()?;
            (lat.is_finite() && lng.is_finite()).then_some((lat, lng))
        }) else {
            tracing::warn!(event = %dto.name, "dropping event without usable coordinates");
            continue;
        };

        // Provider times look like "18:00:00"; keep the HH:MM prefix.
        let local_time = dto
            .dates
            .start
            .local_time
            .as_deref()
            .map_or("00:00".to_string(), |t| {
                t.chars().take(5).collect::<String>()
            });

        events.push(ProviderEvent {
            name: dto.name,
            venue: venue
                .and_then(|v| v.name.clone())
                .unwrap_or_else(|| "Unknown venue".to_string()),
            lat,
            lng,
            local_date,
            local_time,
            url: dto.url.unwrap_or_default(),
        });
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_response(json: &str) -> EventsResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn extracts_well_formed_events() {
        let response = sample_response(
            r#"{
            "_embedded": { "events": [{
                "name": "Summer Concert",
                "url": "https://events.example/e/1",
                "dates": { "start": { "localDate": "2026-08-05", "localTime": "18:00:00" } },
                "_embedded": { "venues": [{
                    "name": "Botanic Gardens",
                    "location": { "latitude": "53.3674", "longitude": "-6.2591" }
                }]}
            }]},
            "page": { "size": 200, "totalElements": 1, "totalPages": 1, "number": 0 }
        }"#,
        );

        let events = extract_events(response);
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.venue, "Botanic Gardens");
        assert_eq!(event.local_time, "18:00");
        assert_eq!(
            event.local_date,
            NaiveDate::from_ymd_opt(2026, 8, 5).unwrap()
        );
        assert!((event.lat - 53.3674).abs() < 1e-9);
    }

    #[test]
    fn drops_events_with_bad_coordinates() {
        let response = sample_response(
            r#"{
            "_embedded": { "events": [
                {
                    "name": "No venue",
                    "dates": { "start": { "localDate": "2026-08-05" } }
                },
                {
                    "name": "Bad coords",
                    "dates": { "start": { "localDate": "2026-08-05" } },
                    "_embedded": { "venues": [{
                        "location": { "latitude": "NaN", "longitude": "-6.26" }
                    }]}
                }
            ]},
            "page": { "totalPages": 1 }
        }"#,
        );

        assert!(extract_events(response).is_empty());
    }

    #[test]
    fn missing_time_defaults_to_midnight() {
        let response = sample_response(
            r#"{
            "_embedded": { "events": [{
                "name": "All day",
                "dates": { "start": { "localDate": "2026-08-05" } },
                "_embedded": { "venues": [{
                    "location": { "latitude": "53.3", "longitude": "-6.2" }
                }]}
            }]},
            "page": { "totalPages": 1 }
        }"#,
        );

        let events = extract_events(response);
        assert_eq!(events[0].local_time, "00:00");
        assert_eq!(events[0].venue, "Unknown venue");
    }

    #[test]
    fn empty_page_yields_no_events() {
        let response = sample_response(r#"{ "page": { "totalPages": 0 } }"#);
        assert!(extract_events(response).is_empty());
    }
}
