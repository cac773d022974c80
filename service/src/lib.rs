//! Commutecast HTTP API service.
//!
//! This crate provides the route lifecycle API:
//!
//! - Route create/update/delete with transactional counter maintenance and
//!   forecast invalidation
//! - The fetch endpoint serving routes with schedules and forecasts inline
//! - The identity-provider post-confirmation hook creating user profiles
//!
//! # Authentication
//!
//! The identity provider sits in front of the service and injects the
//! verified user id into the request context; handlers never trust a
//! user-supplied identity.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Axum handlers all return Result; documenting each error repeats the enum.
#![allow(clippy::missing_errors_doc)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod validation;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
