//! City keys and the city index record.
//!
//! A city key shards scraping and joins routes to city data. Routes carry
//! one; the city index counts how many routes reference each key so the
//! scrapers only visit cities that still have active routes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Normalised city identifier of the form `"<CC>#<UPPER_SNAKE_CITY>"`,
/// e.g. `"IE#DUBLIN"` or `"US#NEW_YORK"`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CityKey(String);

impl CityKey {
    /// Build a key from raw country code and city name.
    ///
    /// The country code is upper-cased; the city name is upper-cased with
    /// runs of non-alphanumeric characters collapsed to single underscores.
    #[must_use]
    pub fn build(country_code: &str, city: &str) -> Self {
        let cc = country_code.trim().to_uppercase();
        let mut name = String::with_capacity(city.len());
        let mut last_was_sep = true;
        for ch in city.trim().to_uppercase().chars() {
            if ch.is_alphanumeric() {
                name.push(ch);
                last_was_sep = false;
            } else if !last_was_sep {
                name.push('_');
                last_was_sep = true;
            }
        }
        while name.ends_with('_') {
            name.pop();
        }
        Self(format!("{cc}#{name}"))
    }

    /// The full key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CityKey {
    type Err = CoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split_once('#') {
            Some((cc, city)) if !cc.is_empty() && !city.is_empty() => Ok(Self(s.to_string())),
            _ => Err(CoreError::InvalidCityKey {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Debug for CityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CityKey({})", self.0)
    }
}

impl fmt::Display for CityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for CityKey {
    type Error = CoreError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CityKey> for String {
    fn from(key: CityKey) -> Self {
        key.0
    }
}

/// A city index entry: metadata plus the live route counter that drives
/// scraper selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityRecord {
    /// Display name of the city as first registered.
    pub city: String,

    /// ISO country code.
    pub country_code: String,

    /// Representative latitude (origin of the first registering route).
    pub city_lat: f64,

    /// Representative longitude.
    pub city_lng: f64,

    /// Number of routes currently referencing this city. Never negative.
    pub active_route_count: i64,

    /// When the first route registered this city.
    pub first_registered_at: DateTime<Utc>,

    /// Last time a route registered or refreshed this city.
    pub last_active_at: DateTime<Utc>,
}

impl CityRecord {
    /// Create a fresh record with a single active route.
    #[must_use]
    pub fn new(city: String, country_code: String, lat: f64, lng: f64, now: DateTime<Utc>) -> Self {
        Self {
            city,
            country_code,
            city_lat: lat,
            city_lng: lng,
            active_route_count: 1,
            first_registered_at: now,
            last_active_at: now,
        }
    }

    /// Whether the scrapers should still visit this city.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active_route_count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_normalises_case_and_spaces() {
        assert_eq!(CityKey::build("ie", "Dublin").as_str(), "IE#DUBLIN");
        assert_eq!(CityKey::build("us", "New York").as_str(), "US#NEW_YORK");
        assert_eq!(
            CityKey::build("BR", "São  Paulo").as_str(),
            "BR#SÃO_PAULO"
        );
    }

    #[test]
    fn build_trims_trailing_separators() {
        assert_eq!(CityKey::build("fr", " Paris! ").as_str(), "FR#PARIS");
    }

    #[test]
    fn parse_requires_both_halves() {
        assert!("IE#DUBLIN".parse::<CityKey>().is_ok());
        assert!("DUBLIN".parse::<CityKey>().is_err());
        assert!("#DUBLIN".parse::<CityKey>().is_err());
    }
}
