//! Authentication extractor.
//!
//! The external identity provider terminates authentication in front of the
//! service and injects the verified subject into the request context as the
//! `x-verified-user-id` header. Handlers only ever see this extractor's
//! output and never a user-supplied identity.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use commutecast_core::UserId;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the identity-provider-verified user id.
pub const VERIFIED_USER_HEADER: &str = "x-verified-user-id";

/// An authenticated user extracted from the verified request context.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    /// The verified user ID.
    pub user_id: UserId,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        _state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let value = parts
                .headers
                .get(VERIFIED_USER_HEADER)
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            let user_id = value.parse::<UserId>().map_err(|_| ApiError::Unauthorized)?;
            Ok(AuthUser { user_id })
        })
    }
}
