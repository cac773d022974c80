//! Error type for pipeline tasks.

use commutecast_core::CoreError;
use commutecast_store::StoreError;

use crate::providers::events::EventError;
use crate::providers::weather::WeatherError;

/// Errors that abort a whole pipeline task.
///
/// Per-city and per-route failures are handled inside the tasks; only
/// infrastructure-level failures surface here, so a worker error means the
/// message should redrive through the queue.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Weather provider failure.
    #[error(transparent)]
    Weather(#[from] WeatherError),

    /// Event provider failure.
    #[error(transparent)]
    Events(#[from] EventError),

    /// Core logic failure (bad stored data reached the forecast math).
    #[error(transparent)]
    Core(#[from] CoreError),
}
