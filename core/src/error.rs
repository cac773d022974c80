//! Error types for commutecast core logic.

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur in core forecasting logic.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A wall-clock time string did not match `HH:MM`.
    #[error("invalid time of day: {value}")]
    InvalidTimeOfDay {
        /// The rejected value.
        value: String,
    },

    /// A date string did not match `YYYY-MM-DD`.
    #[error("invalid date: {value}")]
    InvalidDate {
        /// The rejected value.
        value: String,
    },

    /// A duration value was not `"<n>s"` or integer seconds.
    #[error("invalid duration: {value}")]
    InvalidDuration {
        /// The rejected value.
        value: String,
    },

    /// A day-of-week name was not one of MON..SUN.
    #[error("invalid day of week: {value}")]
    InvalidDayOfWeek {
        /// The rejected value.
        value: String,
    },

    /// A city key string was not of the form `CC#CITY`.
    #[error("invalid city key: {value}")]
    InvalidCityKey {
        /// The rejected value.
        value: String,
    },
}
