//! Core types and forecasting logic for commutecast.
//!
//! This crate provides the foundational types used throughout the platform:
//!
//! - **Identifiers**: `UserId`, `RouteId`
//! - **Routes**: `Route`, `Schedule`, `Forecast`, `Profile`, `Waypoint`
//! - **City data**: `CityKey`, `CityRecord`, `WeatherDay`, `EventsDay`
//! - **Forecast math**: day-of-week resolution, DST-aware local-to-UTC
//!   conversion, corridor geometry, the recommendation engine
//!
//! Everything here is pure: no I/O, no store access. The store and pipeline
//! crates compose these types into the nightly forecasting flow.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod city;
pub mod days;
pub mod delay;
pub mod duration;
pub mod error;
pub mod geo;
pub mod ids;
pub mod recommend;
pub mod route;
pub mod timekeeping;

pub use city::{CityKey, CityRecord};
pub use days::DayOfWeek;
pub use delay::{EventRecord, EventsDay, HourlyPrecip, WeatherDay};
pub use error::{CoreError, Result};
pub use ids::{IdError, RouteId, UserId};
pub use recommend::{recommend, RecommendationInput};
pub use route::{
    DayForecast, Forecast, LatLng, Location, Profile, Recommendation, Route, Schedule, TravelMode,
    Waypoint,
};

/// A user may hold at most this many routes.
pub const MAX_ROUTES_PER_USER: u32 = 20;
