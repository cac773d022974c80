//! Route lifecycle handlers: create, update, delete.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use commutecast_core::duration::DurationField;
use commutecast_core::{CityKey, Route, RouteId, Schedule, Waypoint};
use commutecast_store::{CityMeta, Store, StoreError};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::fetch::{forecast_status, RouteView};
use crate::state::AppState;
use crate::validation;

/// Schedules live this long without an update before expiring.
pub const SCHEDULE_TTL_DAYS: i64 = 14;

/// TTL applied to a schedule when its route is deleted.
pub const DELETED_SCHEDULE_TTL_HOURS: i64 = 24;

// =============================================================================
// Create
// =============================================================================

/// Create request: route, schedule and city metadata in one payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRouteRequest {
    /// Display title.
    pub title: String,
    /// Origin waypoint.
    pub origin: Waypoint,
    /// Destination waypoint.
    pub destination: Waypoint,
    /// Optional via points.
    #[serde(default)]
    pub intermediates: Vec<Waypoint>,
    /// Travel mode name.
    pub travel_mode: String,
    /// Baseline duration, `"<n>s"` or integer seconds.
    pub static_duration: DurationField,
    /// Traffic-aware duration.
    #[serde(default)]
    pub traffic_duration: Option<DurationField>,
    /// Route length in meters.
    #[serde(default)]
    pub distance_meters: Option<u64>,
    /// Encoded polyline.
    #[serde(default)]
    pub geometry: Option<String>,
    /// City name for the city index.
    pub city: String,
    /// ISO country code.
    pub country_code: String,
    /// Local arrival target, `"HH:MM"`.
    pub arrive_by: String,
    /// IANA timezone.
    pub timezone: String,
    /// Days the commute recurs on.
    #[serde(default)]
    pub days_of_week: Vec<String>,
}

/// Create a route with its schedule, atomically with both counters.
pub async fn create_route(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateRouteRequest>,
) -> Result<(StatusCode, Json<RouteView>), ApiError> {
    validation::validate_title(&body.title)?;
    validation::validate_waypoint(&body.origin, "origin")?;
    validation::validate_waypoint(&body.destination, "destination")?;
    for (i, waypoint) in body.intermediates.iter().enumerate() {
        validation::validate_waypoint(waypoint, &format!("intermediates[{i}]"))?;
    }
    let travel_mode = validation::parse_travel_mode(&body.travel_mode)?;
    let static_duration = validation::parse_duration_mins(&body.static_duration, "staticDuration")?;
    let traffic_duration = body
        .traffic_duration
        .as_ref()
        .map(|d| validation::parse_duration_mins(d, "trafficDuration"))
        .transpose()?;
    let days_of_week = validation::parse_days(&body.days_of_week)?;
    validation::validate_arrive_by(&body.arrive_by)?;
    validation::validate_timezone(&body.timezone)?;
    validation::validate_country_code(&body.country_code)?;
    if body.city.trim().is_empty() {
        return Err(ApiError::BadRequest("city is required".into()));
    }

    let now = Utc::now();
    let route_id = RouteId::generate();
    let origin_coords = body.origin.lat_lng();

    let route = Route {
        route_id,
        title: body.title,
        origin: body.origin,
        destination: body.destination,
        intermediates: body.intermediates,
        travel_mode,
        static_duration,
        traffic_duration,
        distance_meters: body.distance_meters,
        city_key: CityKey::build(&body.country_code, &body.city),
        city_lat: origin_coords.latitude,
        city_lng: origin_coords.longitude,
        user_active: true,
        geometry: body.geometry,
        created_at: now,
        updated_at: now,
    };
    let schedule = Schedule {
        route_id,
        arrive_by: body.arrive_by,
        timezone: body.timezone,
        days_of_week,
        ttl: (now + Duration::days(SCHEDULE_TTL_DAYS)).timestamp(),
        active: true,
    };
    let city_meta = CityMeta {
        city: body.city,
        country_code: body.country_code.to_uppercase(),
        lat: origin_coords.latitude,
        lng: origin_coords.longitude,
    };

    state
        .store
        .create_route(&auth.user_id, &route, &schedule, &city_meta)?;

    tracing::info!(
        user_id = %auth.user_id,
        route_id = %route_id,
        city = %route.city_key,
        "route created"
    );

    let view = RouteView {
        forecast_status: forecast_status(Some(&schedule), None),
        route,
        schedule: Some(schedule),
        forecast: None,
    };
    Ok((StatusCode::CREATED, Json(view)))
}

// =============================================================================
// Update
// =============================================================================

/// Update request: the route id plus any subset of route and schedule
/// fields.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRouteRequest {
    /// The route to update.
    pub route_id: RouteId,

    // Route fields.
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New origin.
    #[serde(default)]
    pub origin: Option<Waypoint>,
    /// New destination.
    #[serde(default)]
    pub destination: Option<Waypoint>,
    /// New via points.
    #[serde(default)]
    pub intermediates: Option<Vec<Waypoint>>,
    /// New travel mode.
    #[serde(default)]
    pub travel_mode: Option<String>,
    /// New baseline duration.
    #[serde(default)]
    pub static_duration: Option<DurationField>,
    /// New traffic-aware duration.
    #[serde(default)]
    pub traffic_duration: Option<DurationField>,
    /// New route length.
    #[serde(default)]
    pub distance_meters: Option<u64>,
    /// New polyline.
    #[serde(default)]
    pub geometry: Option<String>,
    /// New display flag.
    #[serde(default)]
    pub user_active: Option<bool>,

    // Schedule fields.
    /// New arrival target.
    #[serde(default)]
    pub arrive_by: Option<String>,
    /// New timezone.
    #[serde(default)]
    pub timezone: Option<String>,
    /// New recurrence days.
    #[serde(default)]
    pub days_of_week: Option<Vec<String>>,
}

/// Update response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRouteResponse {
    /// The updated route.
    pub route_id: String,
    /// Names of the fields that were applied.
    pub updates: Vec<&'static str>,
}

/// Route fields whose change invalidates an existing forecast.
const FORECAST_AFFECTING: [&str; 6] = [
    "origin",
    "destination",
    "intermediates",
    "travelMode",
    "staticDuration",
    "trafficDuration",
];

/// Apply a partial update to a route and its schedule.
#[allow(clippy::too_many_lines)]
pub async fn update_route(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<UpdateRouteRequest>,
) -> Result<Json<UpdateRouteResponse>, ApiError> {
    let now = Utc::now();
    let route_id = body.route_id;

    let mut route = state
        .store
        .get_route(&auth.user_id, &route_id)?
        .ok_or_else(|| ApiError::NotFound(format!("route not found: {route_id}")))?;
    let mut schedule = state.store.get_schedule(&auth.user_id, &route_id)?;

    let mut updates: Vec<&'static str> = Vec::new();

    // Route fields.
    if let Some(title) = body.title {
        validation::validate_title(&title)?;
        route.title = title;
        updates.push("title");
    }
    if let Some(origin) = body.origin {
        validation::validate_waypoint(&origin, "origin")?;
        route.origin = origin;
        updates.push("origin");
    }
    if let Some(destination) = body.destination {
        validation::validate_waypoint(&destination, "destination")?;
        route.destination = destination;
        updates.push("destination");
    }
    if let Some(intermediates) = body.intermediates {
        for (i, waypoint) in intermediates.iter().enumerate() {
            validation::validate_waypoint(waypoint, &format!("intermediates[{i}]"))?;
        }
        route.intermediates = intermediates;
        updates.push("intermediates");
    }
    if let Some(travel_mode) = body.travel_mode.as_deref() {
        route.travel_mode = validation::parse_travel_mode(travel_mode)?;
        updates.push("travelMode");
    }
    if let Some(static_duration) = body.static_duration.as_ref() {
        route.static_duration = validation::parse_duration_mins(static_duration, "staticDuration")?;
        updates.push("staticDuration");
    }
    if let Some(traffic_duration) = body.traffic_duration.as_ref() {
        route.traffic_duration =
            Some(validation::parse_duration_mins(traffic_duration, "trafficDuration")?);
        updates.push("trafficDuration");
    }
    if let Some(distance_meters) = body.distance_meters {
        route.distance_meters = Some(distance_meters);
        updates.push("distanceMeters");
    }
    if let Some(geometry) = body.geometry {
        route.geometry = Some(geometry);
        updates.push("geometry");
    }
    if let Some(user_active) = body.user_active {
        route.user_active = user_active;
        updates.push("userActive");
    }
    let route_touched = !updates.is_empty();

    // Schedule fields.
    let mut schedule_touched = false;
    if body.arrive_by.is_some() || body.timezone.is_some() || body.days_of_week.is_some() {
        let Some(existing) = schedule.as_mut() else {
            return Err(ApiError::NotFound(format!(
                "schedule not found: {route_id}"
            )));
        };
        if let Some(arrive_by) = body.arrive_by {
            validation::validate_arrive_by(&arrive_by)?;
            existing.arrive_by = arrive_by;
            updates.push("arriveBy");
        }
        if let Some(timezone) = body.timezone {
            validation::validate_timezone(&timezone)?;
            existing.timezone = timezone;
            updates.push("timezone");
        }
        if let Some(days) = body.days_of_week.as_deref() {
            existing.days_of_week = validation::parse_days(days)?;
            updates.push("daysOfWeek");
        }
        existing.ttl = (now + Duration::days(SCHEDULE_TTL_DAYS)).timestamp();
        existing.active = true;
        schedule_touched = true;
    }

    if updates.is_empty() {
        return Err(ApiError::BadRequest("no updatable fields provided".into()));
    }

    route.updated_at = now;
    let schedule_arg = if schedule_touched {
        schedule.as_ref()
    } else {
        None
    };
    state
        .store
        .update_route_records(&auth.user_id, route_touched.then_some(&route), schedule_arg)?;

    // Forecast invalidation: any forecast-affecting route field, or any
    // schedule change at all.
    let invalidates =
        schedule_touched || updates.iter().any(|field| FORECAST_AFFECTING.contains(field));
    if invalidates {
        state.store.delete_forecast(&auth.user_id, &route_id)?;
        tracing::info!(user_id = %auth.user_id, %route_id, "stale forecast invalidated");
    }

    tracing::info!(
        user_id = %auth.user_id,
        %route_id,
        updates = ?updates,
        "route updated"
    );

    Ok(Json(UpdateRouteResponse {
        route_id: route_id.to_string(),
        updates,
    }))
}

// =============================================================================
// Delete
// =============================================================================

/// Delete request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRouteRequest {
    /// The route to delete.
    pub route_id: RouteId,
}

/// Delete a route, its schedule eligibility and its forecast.
pub async fn delete_route(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<DeleteRouteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let now = Utc::now();
    let route_id = body.route_id;

    let route = state
        .store
        .get_route(&auth.user_id, &route_id)?
        .ok_or_else(|| ApiError::NotFound(format!("route not found: {route_id}")))?;

    // Step 1: stop the next orchestrator run from picking the route up;
    // the record itself ages out.
    let deleted_ttl = (now + Duration::hours(DELETED_SCHEDULE_TTL_HOURS)).timestamp();
    match state
        .store
        .mark_schedule_inactive(&auth.user_id, &route_id, deleted_ttl)
    {
        Ok(()) | Err(StoreError::NotFound { .. }) => {}
        Err(e) => return Err(e.into()),
    }

    // Step 2: the transactional removal, compensating on counter drift.
    match state
        .store
        .delete_route(&auth.user_id, &route_id, &route.city_key)
    {
        Ok(()) => {}
        Err(StoreError::CityCounterDrift { city_key }) => {
            tracing::warn!(
                user_id = %auth.user_id,
                %route_id,
                city = %city_key,
                "city counter drift detected, compensating"
            );
            state
                .store
                .compensate_delete_route(&auth.user_id, &route_id)?;
        }
        Err(e) => return Err(e.into()),
    }

    // Step 3: best-effort forecast cleanup.
    if let Err(e) = state.store.delete_forecast(&auth.user_id, &route_id) {
        tracing::warn!(user_id = %auth.user_id, %route_id, error = %e, "forecast delete failed");
    }

    tracing::info!(user_id = %auth.user_id, %route_id, "route deleted");
    Ok(Json(serde_json::json!({ "routeId": route_id.to_string() })))
}
