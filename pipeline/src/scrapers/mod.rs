//! Nightly scrapers.
//!
//! Both scrapers share a shape: list active cities, fan out one provider
//! call per city under a concurrency cap, build day records for offsets
//! 1..=7, and batch-write them with an 8-day TTL. Per-city failures are
//! isolated; a bad provider night costs one city its data, not the run.

pub mod events;
pub mod weather;

pub use events::run_event_scrape;
pub use weather::run_weather_scrape;

/// Days ahead covered by each scrape: tomorrow through tomorrow + 6.
pub const SCRAPE_HORIZON_DAYS: u64 = 7;

/// Record TTL: one day past the last useful date.
pub const RECORD_TTL_DAYS: i64 = 8;

/// Concurrent provider calls at most; both providers rate-limit.
pub const MAX_CONCURRENT_CITIES: usize = 10;

/// Outcome of one scrape run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeSummary {
    /// Active cities considered.
    pub cities: usize,
    /// Cities whose provider call failed.
    pub cities_failed: usize,
    /// Day records written.
    pub records_written: usize,
    /// Records lost to write residue after retries.
    pub write_shortfall: usize,
}
