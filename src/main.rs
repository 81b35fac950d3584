//! IP tracker server
//!
//! Serves the application behind the interception pipeline and runs anomaly
//! detection on a fixed interval.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use ip_tracker::anomaly::{self, AnomalyDetector};
use ip_tracker::blocklist::BlocklistGate;
use ip_tracker::config::Config;
use ip_tracker::db::{self, Database};
use ip_tracker::geo::{GeoLocationCache, GeoLookup, IpInfoClient};
use ip_tracker::logging;
use ip_tracker::web::{self, interceptor::Interceptor};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any other initialization)
    let _ = dotenvy::dotenv();

    let config = Config::load()?;
    logging::init(&config.logging.level);
    info!("Starting IP tracker...");

    let db = Database::new(&config.database).await?;
    db.run_migrations().await?;
    info!("Database initialized");

    let remote: Arc<dyn GeoLookup> = Arc::new(IpInfoClient::new(&config.geolocation)?);
    let geo = GeoLocationCache::from_config(db.clone(), remote, &config.geolocation);
    info!("Geolocation provider: {}", config.geolocation.base_url);

    // Request logs are written off the response path
    let (log_tx, _log_task) = db::start_write_buffer(Arc::new(db.clone()));

    let interceptor = Arc::new(Interceptor::new(
        BlocklistGate::new(db.clone()),
        geo,
        log_tx,
    ));

    if config.anomaly.enabled {
        let detector = Arc::new(AnomalyDetector::new(db.clone(), config.anomaly.clone()));
        anomaly::start_detection_schedule(
            detector,
            Duration::from_secs(config.anomaly.interval_secs),
        );
    } else {
        info!("In-process anomaly detection disabled; use `ip-tracker-admin detect`");
    }

    web::start_server(&config, interceptor).await
}
