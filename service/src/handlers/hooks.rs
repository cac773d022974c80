//! Identity-provider hooks.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use commutecast_core::{Profile, UserId};
use commutecast_store::Store;

use crate::error::ApiError;
use crate::state::AppState;

/// Post-confirmation payload from the identity provider.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostConfirmationRequest {
    /// The confirmed user's id.
    #[serde(default)]
    pub user_id: Option<String>,
    /// The confirmed user's email.
    #[serde(default)]
    pub email: Option<String>,
}

/// Create the user profile after identity confirmation.
///
/// Duplicate hooks are logged and ignored; missing attributes fail the
/// request, which blocks confirmation upstream.
pub async fn post_confirmation(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PostConfirmationRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = body
        .user_id
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("userId is required".into()))?
        .parse::<UserId>()
        .map_err(|_| ApiError::BadRequest("userId must be a UUID".into()))?;
    let email = body
        .email
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("email is required".into()))?;

    let profile = Profile::new(user_id, email, Utc::now());
    let created = state.store.create_profile(&profile)?;
    if created {
        tracing::info!(%user_id, "profile created");
    } else {
        tracing::warn!(%user_id, "duplicate post-confirmation hook ignored");
    }

    Ok(Json(serde_json::json!({ "userId": user_id.to_string() })))
}
