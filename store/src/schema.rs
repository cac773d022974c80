//! Column family layout.
//!
//! The route store is partitioned by user: the user-scoped families all key
//! on `user_id || route_id` (the PROFILE family on `user_id` alone). The
//! delay families key on `"<cityKey>#<YYYY-MM-DD>"`.

/// Column family names.
pub mod cf {
    /// Per-user profiles, keyed by `user_id`.
    pub const PROFILES: &str = "profiles";

    /// Route definitions, keyed by `user_id || route_id`.
    pub const ROUTES: &str = "routes";

    /// Schedules, keyed by `user_id || route_id`.
    pub const SCHEDULES: &str = "schedules";

    /// Nightly forecasts, keyed by `user_id || route_id`.
    pub const FORECASTS: &str = "forecasts";

    /// City index, keyed by city key string.
    pub const CITY_INDEX: &str = "city_index";

    /// Scraped weather day records, keyed by `cityKey#date`.
    pub const WEATHER_DAYS: &str = "weather_days";

    /// Scraped event day records, keyed by `cityKey#date`.
    pub const EVENT_DAYS: &str = "event_days";

    /// System coordination parameters (the orchestrator lock).
    pub const COORDINATION: &str = "coordination";

    /// The durable chunk queue, keyed by ULID for FIFO order.
    pub const QUEUE: &str = "queue";

    /// Dead-lettered chunk messages.
    pub const QUEUE_DLQ: &str = "queue_dlq";
}

/// All column families, for database open.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::PROFILES,
        cf::ROUTES,
        cf::SCHEDULES,
        cf::FORECASTS,
        cf::CITY_INDEX,
        cf::WEATHER_DAYS,
        cf::EVENT_DAYS,
        cf::COORDINATION,
        cf::QUEUE,
        cf::QUEUE_DLQ,
    ]
}
