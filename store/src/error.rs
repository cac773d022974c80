//! Error types for the storage layer.

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record required by the operation does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The entity kind.
        entity: &'static str,
        /// The identifier that was not found.
        id: String,
    },

    /// The user already holds the maximum number of routes.
    #[error("route cap reached for user {user_id}")]
    RouteCapReached {
        /// The user at the cap.
        user_id: String,
    },

    /// The city counter was already zero when a decrement was attempted.
    ///
    /// Signals counter drift; callers compensate rather than abort.
    #[error("active route counter already zero for {city_key}")]
    CityCounterDrift {
        /// The city whose counter drifted.
        city_key: String,
    },

    /// The coordination lock is held by a recent run.
    #[error("lock {name} held for {age_secs}s")]
    LockHeld {
        /// The lock parameter name.
        name: String,
        /// Age of the existing acquisition.
        age_secs: i64,
    },

    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(String),

    /// Record encoding or decoding failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}
