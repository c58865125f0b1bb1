use lume_matchmaker::clock::{Clock, SystemClock};
use lume_matchmaker::config::{LoggingSettings, Settings};
use lume_matchmaker::core::{DropScheduler, IngestionOrchestrator, MatchProcessor};
use lume_matchmaker::models::IngestOptions;
use lume_matchmaker::services::{ConfigCache, HttpCompatibilityClient, PostgresStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber; LOG_LEVEL and LOG_FORMAT win over the config file
fn init_logging(settings: &LoggingSettings) {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| settings.level.clone());
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| settings.format.clone());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if log_format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.init();
    }
}

struct Jobs {
    ingestion: IngestionOrchestrator,
    scheduler: DropScheduler,
    match_unmatched_users: bool,
    options: IngestOptions,
}

impl Jobs {
    /// One scheduler tick; failures are logged and retried on the next tick
    async fn tick(&self) {
        if self.match_unmatched_users {
            match self.ingestion.run_match_for_unmatched_users(self.options).await {
                Ok(Some(summary)) => info!(
                    "Unmatched users matched in set {}: {} pairs, {} failed",
                    summary.match_set_id, summary.total, summary.failed
                ),
                Ok(None) => {}
                Err(e) => error!("Unmatched-user matching failed: {}", e),
            }
        }

        if let Err(e) = self.scheduler.drop_one_match_per_user().await {
            error!("Drop pass failed: {}", e);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load()?;
    init_logging(&settings.logging);

    info!("Starting Lume matchmaker...");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store = Arc::new(PostgresStore::from_settings(&settings.database).await?);
    info!(
        "PostgreSQL store initialized (max: {} connections)",
        settings.database.max_connections.unwrap_or(10)
    );

    let configs = Arc::new(ConfigCache::new(
        store.clone(),
        Duration::from_secs(settings.ingestion.config_cache_ttl_secs),
    ));
    let scorer = Arc::new(HttpCompatibilityClient::from_settings(&settings.compatibility)?);
    info!(
        "Compatibility client initialized ({}, timeout {}s)",
        settings.compatibility.endpoint, settings.compatibility.timeout_secs
    );

    let processor = MatchProcessor::new(
        store.clone(),
        configs,
        store.clone(),
        store.clone(),
        scorer,
        clock.clone(),
    );

    let jobs = Jobs {
        ingestion: IngestionOrchestrator::new(
            store.clone(),
            store.clone(),
            store.clone(),
            processor,
            clock.clone(),
            &settings.ingestion,
        ),
        scheduler: DropScheduler::new(store.clone(), clock, settings.ingestion.page_size),
        match_unmatched_users: settings.scheduler.match_unmatched_users,
        options: IngestOptions {
            test_users: settings.scheduler.test_users,
        },
    };

    let interval = Duration::from_secs(settings.scheduler.drop_interval_secs.max(1));
    let mut ticker = tokio::time::interval(interval);
    info!("Running scheduled jobs every {:?}", interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => jobs.tick().await,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, stopping");
                break;
            }
        }
    }

    Ok(())
}
