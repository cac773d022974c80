//! The fetch endpoint: everything a user owns, in one response.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use commutecast_core::{Forecast, Profile, Route, Schedule, MAX_ROUTES_PER_USER};
use commutecast_store::Store;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// A route with its schedule and forecast inline, so the client renders
/// without re-fetching.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteView {
    /// The route record.
    #[serde(flatten)]
    pub route: Route,
    /// The schedule, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    /// The latest forecast, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast: Option<Forecast>,
    /// `active`, `pending` or `empty`.
    pub forecast_status: &'static str,
}

/// `active` iff a forecast exists; `pending` iff the schedule names at
/// least one day but no forecast has landed yet; `empty` otherwise.
#[must_use]
pub fn forecast_status(schedule: Option<&Schedule>, forecast: Option<&Forecast>) -> &'static str {
    if forecast.is_some() {
        "active"
    } else if schedule.is_some_and(|s| !s.days_of_week.is_empty()) {
        "pending"
    } else {
        "empty"
    }
}

/// Fetch response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResponse {
    /// The authenticated user.
    pub user_id: String,
    /// The profile, when the confirmation hook has created one.
    pub profile: Option<Profile>,
    /// Number of routes held.
    pub route_count: u32,
    /// Number of routes with a live schedule.
    pub active_route_count: usize,
    /// The route cap.
    pub max_routes: u32,
    /// All routes with schedules and forecasts inline.
    pub routes: Vec<RouteView>,
}

/// Fetch the user's profile and all routes.
pub async fn fetch_routes(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<FetchResponse>, ApiError> {
    let now = Utc::now();
    let profile = state.store.get_profile(&auth.user_id)?;
    let routes = state.store.list_routes(&auth.user_id)?;

    let mut views = Vec::with_capacity(routes.len());
    let mut active_route_count = 0usize;

    for route in routes {
        let schedule = state.store.get_schedule(&auth.user_id, &route.route_id)?;
        let forecast = state.store.get_forecast(&auth.user_id, &route.route_id)?;

        if schedule.as_ref().is_some_and(|s| s.is_live(now)) {
            active_route_count += 1;
        }
        views.push(RouteView {
            forecast_status: forecast_status(schedule.as_ref(), forecast.as_ref()),
            route,
            schedule,
            forecast,
        });
    }

    let route_count = profile
        .as_ref()
        .map_or_else(|| u32::try_from(views.len()).unwrap_or(u32::MAX), |p| p.route_count);

    Ok(Json(FetchResponse {
        user_id: auth.user_id.to_string(),
        profile,
        route_count,
        active_route_count,
        max_routes: MAX_ROUTES_PER_USER,
        routes: views,
    }))
}
