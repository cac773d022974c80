//! Nightly forecasting pipeline for commutecast.
//!
//! Three scheduled tasks plus the worker pool entry point:
//!
//! - **Weather scraper** (23:00 UTC): hourly precipitation per active city
//! - **Event scraper** (23:00 UTC): event catalogs per active city
//! - **Orchestrator** (00:00 UTC): shards active schedules into chunks and
//!   publishes them to the durable queue under the idempotency lock
//! - **Worker**: drains the queue, joins routes against the scraped city
//!   data and writes per-route forecasts
//!
//! The scrapers do no user-specific filtering; corridor, window and
//! day-of-week logic lives in the worker so scraper cost stays
//! O(active cities), not O(users).

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod providers;
pub mod scrapers;
pub mod worker;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use orchestrator::{run_orchestrator, OrchestratorSummary};
pub use scrapers::{run_event_scrape, run_weather_scrape, ScrapeSummary};
pub use worker::{process_chunk, run_worker, ChunkOutcome, WorkerSummary};
