//! Request field validation.
//!
//! Every rule rejects with a specific 400 reason before anything reaches
//! the store.

use commutecast_core::duration::DurationField;
use commutecast_core::timekeeping::parse_hhmm;
use commutecast_core::{DayOfWeek, TravelMode, Waypoint};

use crate::error::ApiError;

/// Maximum route title length.
pub const MAX_TITLE_LEN: usize = 48;

/// Validate a route title.
pub fn validate_title(title: &str) -> Result<(), ApiError> {
    if title.trim().is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".into()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ApiError::BadRequest(format!(
            "title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(())
}

/// Validate a waypoint's coordinates and label.
pub fn validate_waypoint(waypoint: &Waypoint, field: &str) -> Result<(), ApiError> {
    let coords = waypoint.lat_lng();
    if !coords.latitude.is_finite() || !(-90.0..=90.0).contains(&coords.latitude) {
        return Err(ApiError::BadRequest(format!("{field}: invalid latitude")));
    }
    if !coords.longitude.is_finite() || !(-180.0..=180.0).contains(&coords.longitude) {
        return Err(ApiError::BadRequest(format!("{field}: invalid longitude")));
    }
    if waypoint.label.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{field}: label is required")));
    }
    Ok(())
}

/// Parse a travel mode name.
pub fn parse_travel_mode(value: &str) -> Result<TravelMode, ApiError> {
    match value {
        "DRIVE" => Ok(TravelMode::Drive),
        "TRANSIT" => Ok(TravelMode::Transit),
        "WALK" => Ok(TravelMode::Walk),
        "TWO_WHEELER" => Ok(TravelMode::TwoWheeler),
        "BICYCLE" => Ok(TravelMode::Bicycle),
        other => Err(ApiError::BadRequest(format!(
            "travelMode must be one of DRIVE, TRANSIT, WALK, TWO_WHEELER, BICYCLE (got {other:?})"
        ))),
    }
}

/// Parse and validate a days-of-week list. Duplicates collapse; an empty
/// list is permitted and simply yields no forecast.
pub fn parse_days(values: &[String]) -> Result<Vec<DayOfWeek>, ApiError> {
    let mut days: Vec<DayOfWeek> = Vec::with_capacity(values.len());
    for value in values {
        let day = value
            .parse::<DayOfWeek>()
            .map_err(|_| ApiError::BadRequest(format!("invalid day of week: {value:?}")))?;
        if !days.contains(&day) {
            days.push(day);
        }
    }
    Ok(days)
}

/// Validate an `"HH:MM"` arrival target.
pub fn validate_arrive_by(value: &str) -> Result<(), ApiError> {
    parse_hhmm(value)
        .map(|_| ())
        .map_err(|_| ApiError::BadRequest(format!("arriveBy must be HH:MM (got {value:?})")))
}

/// Validate an IANA-like timezone name, e.g. `Europe/Dublin`.
pub fn validate_timezone(value: &str) -> Result<(), ApiError> {
    let invalid = || ApiError::BadRequest(format!("timezone must be an IANA name (got {value:?})"));

    let mut segments = value.split('/');
    let area = segments.next().ok_or_else(invalid)?;
    if area.is_empty() || !area.chars().all(|c| c.is_ascii_alphabetic() || c == '_') {
        return Err(invalid());
    }
    let mut locations = 0;
    for segment in segments {
        if segment.is_empty()
            || !segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+'))
        {
            return Err(invalid());
        }
        locations += 1;
    }
    if locations == 0 {
        return Err(invalid());
    }
    Ok(())
}

/// Parse a duration field to whole minutes, rounding up.
pub fn parse_duration_mins(value: &DurationField, field: &str) -> Result<u32, ApiError> {
    value
        .to_minutes()
        .map_err(|_| ApiError::BadRequest(format!("{field} must be \"<n>s\" or integer seconds")))
}

/// Validate a country code: two ASCII letters.
pub fn validate_country_code(value: &str) -> Result<(), ApiError> {
    if value.len() == 2 && value.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "countryCode must be a two-letter ISO code (got {value:?})"
        )))
    }
}
