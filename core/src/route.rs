//! User-facing domain records: profiles, routes, schedules, forecasts.
//!
//! These are the records persisted in the route store under a user
//! partition. Wire names are camelCase to match the client contract.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::city::CityKey;
use crate::days::DayOfWeek;
use crate::ids::{RouteId, UserId};

/// Per-user profile, created once by the identity-provider hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// The user this profile belongs to.
    pub user_id: UserId,

    /// Email captured at confirmation time.
    pub email: String,

    /// Number of routes the user currently holds. Capped at 20 and kept in
    /// lockstep with the ROUTE records by the lifecycle transactions.
    pub route_count: u32,

    /// When the profile was created.
    pub created_at: DateTime<Utc>,
}

impl Profile {
    /// Create a fresh profile with no routes.
    #[must_use]
    pub fn new(user_id: UserId, email: String, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            email,
            route_count: 0,
            created_at: now,
        }
    }
}

/// A geographic coordinate pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatLng {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

/// A waypoint location wrapper (matches the place-picker payload shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// The resolved coordinates.
    pub lat_lng: LatLng,
}

/// A resolved place on a route: origin, destination, or intermediate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Waypoint {
    /// Coordinates resolved by the external geocoding service.
    pub location: Location,

    /// Human-readable label.
    pub label: String,

    /// Provider place id, when the picker supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_id: Option<String>,
}

impl Waypoint {
    /// Convenience accessor for the coordinates.
    #[must_use]
    pub fn lat_lng(&self) -> LatLng {
        self.location.lat_lng
    }
}

/// Mode of travel for a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TravelMode {
    /// Private car.
    Drive,
    /// Public transit.
    Transit,
    /// On foot.
    Walk,
    /// Motorbike or scooter.
    TwoWheeler,
    /// Bicycle.
    Bicycle,
}

/// A registered commute route.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Route identifier.
    pub route_id: RouteId,

    /// Display title, at most 48 characters.
    pub title: String,

    /// Start of the commute.
    pub origin: Waypoint,

    /// End of the commute.
    pub destination: Waypoint,

    /// Optional via points.
    #[serde(default)]
    pub intermediates: Vec<Waypoint>,

    /// Mode of travel.
    pub travel_mode: TravelMode,

    /// Baseline journey time in minutes, ignoring traffic. The single
    /// source of truth for departure arithmetic.
    pub static_duration: u32,

    /// Journey time with typical traffic, minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_duration: Option<u32>,

    /// Route length in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<u64>,

    /// The city this route is forecast against.
    pub city_key: CityKey,

    /// City latitude (origin coordinates at creation).
    pub city_lat: f64,

    /// City longitude.
    pub city_lng: f64,

    /// Display flag only; does not suppress forecasting.
    pub user_active: bool,

    /// Encoded polyline for display, when the client supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<String>,

    /// When the route was created.
    pub created_at: DateTime<Utc>,

    /// When the route was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Recurrence and local timing for a route.
///
/// A schedule exists iff the route is eligible for the nightly pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// The route this schedule belongs to.
    pub route_id: RouteId,

    /// Local wall-clock arrival target, `"HH:MM"`.
    pub arrive_by: String,

    /// IANA timezone name, the canonical tiebreaker for `arrive_by`.
    pub timezone: String,

    /// Days the commute recurs on.
    pub days_of_week: Vec<DayOfWeek>,

    /// Expiry, epoch seconds. Refreshed on every update.
    pub ttl: i64,

    /// Cleared on delete so the next orchestrator run skips the route
    /// while the record ages out.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Schedule {
    /// Whether the orchestrator should pick this schedule up.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.active && self.ttl > now.timestamp()
    }
}

/// The recommendation produced for one route on one forecast date.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    /// Departure instant, RFC 3339 UTC with whole-second precision.
    pub adjusted_depart_by: String,

    /// Extra minutes added on top of the static duration.
    pub extra_buffer_mins: u32,

    /// Human-readable explanation of the buffers applied.
    pub reasoning: String,
}

/// One day's entry in a route forecast.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayForecast {
    /// The calendar date this entry covers.
    pub forecast_date: NaiveDate,

    /// The departure recommendation.
    pub recommendation: Recommendation,

    /// Whether a weather record existed for the city and date.
    pub has_weather_data: bool,

    /// Whether an events record existed for the city and date.
    pub has_event_data: bool,
}

/// Most recent nightly forecast for a route, replaced wholesale each run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Forecast {
    /// The route this forecast belongs to.
    pub route_id: RouteId,

    /// Per-day entries, keyed by day name. Keys are always a subset of the
    /// schedule's `days_of_week`.
    pub days: BTreeMap<DayOfWeek, DayForecast>,

    /// When the worker produced this forecast.
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_liveness() {
        let now = Utc::now();
        let mut schedule = Schedule {
            route_id: RouteId::generate(),
            arrive_by: "08:30".into(),
            timezone: "Europe/Dublin".into(),
            days_of_week: vec![DayOfWeek::Mon],
            ttl: now.timestamp() + 3600,
            active: true,
        };
        assert!(schedule.is_live(now));

        schedule.active = false;
        assert!(!schedule.is_live(now));

        schedule.active = true;
        schedule.ttl = now.timestamp() - 1;
        assert!(!schedule.is_live(now));
    }

    #[test]
    fn waypoint_wire_shape() {
        let json = r#"{
            "location": { "latLng": { "latitude": 53.3498, "longitude": -6.2603 } },
            "label": "Spire of Dublin",
            "placeId": "ChIJ"
        }"#;
        let wp: Waypoint = serde_json::from_str(json).unwrap();
        assert!((wp.lat_lng().latitude - 53.3498).abs() < 1e-9);
        assert_eq!(wp.place_id.as_deref(), Some("ChIJ"));
    }

    #[test]
    fn travel_mode_wire_names() {
        assert_eq!(
            serde_json::to_string(&TravelMode::TwoWheeler).unwrap(),
            "\"TWO_WHEELER\""
        );
    }
}
