//! Commutecast pipeline binary.
//!
//! One subcommand per scheduled trigger:
//!
//! - `weather-scrape` (23:00 UTC)
//! - `event-scrape` (23:00 UTC)
//! - `orchestrate` (00:00 UTC)
//! - `work` (queue drain, one or more instances)

use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commutecast_pipeline::providers::events::EventClient;
use commutecast_pipeline::providers::weather::WeatherClient;
use commutecast_pipeline::{
    run_event_scrape, run_orchestrator, run_weather_scrape, run_worker, PipelineConfig,
};
use commutecast_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,commutecast=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let task = std::env::args().nth(1).unwrap_or_default();
    let config = PipelineConfig::from_env();

    tracing::info!(task = %task, data_dir = %config.data_dir, "starting pipeline task");
    let store = RocksStore::open(&config.data_dir)?;
    let now = Utc::now();

    match task.as_str() {
        "weather-scrape" => {
            let client = WeatherClient::new(&config.weather_base_url);
            let summary = run_weather_scrape(&store, &client, now).await?;
            tracing::info!(?summary, "weather scrape done");
        }
        "event-scrape" => {
            let client = EventClient::new(&config.events_base_url, config.secret_resolver());
            let summary = run_event_scrape(&store, &client, now).await?;
            tracing::info!(?summary, "event scrape done");
        }
        "orchestrate" => {
            let summary = run_orchestrator(&store, now).await?;
            tracing::info!(?summary, "orchestration done");
        }
        "work" => {
            let summary = run_worker(&store, config.max_receives).await?;
            tracing::info!(?summary, "worker drain done");
        }
        other => {
            eprintln!(
                "unknown task {other:?}; expected weather-scrape | event-scrape | orchestrate | work"
            );
            std::process::exit(2);
        }
    }

    Ok(())
}
