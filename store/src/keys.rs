//! Key encoding for the column families.
//!
//! User-scoped records concatenate the two UUIDs, so a 16-byte user prefix
//! scan yields everything a user owns in one pass.

use chrono::NaiveDate;

use commutecast_core::{CityKey, RouteId, UserId};

/// Key for a user's PROFILE record.
#[must_use]
pub fn user_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Key for a user-scoped route record.
///
/// Format: `user_id (16 bytes) || route_id (16 bytes)`.
#[must_use]
pub fn user_route_key(user_id: &UserId, route_id: &RouteId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(route_id.as_bytes());
    key
}

/// Prefix for iterating all of a user's route-scoped records.
#[must_use]
pub fn user_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Split a 32-byte composite key back into its identifiers.
///
/// Returns `None` when the key is not 32 bytes.
#[must_use]
pub fn split_user_route_key(key: &[u8]) -> Option<(UserId, RouteId)> {
    if key.len() != 32 {
        return None;
    }
    let mut user = [0u8; 16];
    let mut route = [0u8; 16];
    user.copy_from_slice(&key[..16]);
    route.copy_from_slice(&key[16..]);
    Some((UserId::from_bytes(user), RouteId::from_bytes(route)))
}

/// Key for a city index record.
#[must_use]
pub fn city_key(key: &CityKey) -> Vec<u8> {
    key.as_str().as_bytes().to_vec()
}

/// Key for a day-partitioned delay record: `"<cityKey>#<YYYY-MM-DD>"`.
#[must_use]
pub fn city_day_key(key: &CityKey, date: NaiveDate) -> Vec<u8> {
    format!("{key}#{date}").into_bytes()
}
