//! Administrative commands: seed the blocklist, trigger detection, inspect results

use anyhow::Result;
use structopt::StructOpt;

use ip_tracker::admin;
use ip_tracker::anomaly::AnomalyDetector;
use ip_tracker::config::Config;
use ip_tracker::db::Database;
use ip_tracker::logging;

#[derive(Debug, StructOpt)]
#[structopt(name = "ip-tracker-admin", about = "IP tracker administration")]
enum Command {
    /// Add IP addresses to the blocklist
    Block {
        /// IP addresses to block (space separated)
        #[structopt(required = true)]
        ip_addresses: Vec<String>,
        /// Reason for blocking the IP address(es)
        #[structopt(long)]
        reason: Option<String>,
    },
    /// Run one anomaly detection pass over the trailing window (for cron)
    Detect,
    /// List flagged addresses, most recently detected first
    Suspicious {
        #[structopt(long, default_value = "50")]
        limit: i64,
    },
    /// List recent request logs, newest first
    Logs {
        #[structopt(long, default_value = "50")]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let command = Command::from_args();
    let config = Config::load()?;
    logging::init("warn");

    let db = Database::new(&config.database).await?;
    db.run_migrations().await?;

    match command {
        Command::Block {
            ip_addresses,
            reason,
        } => {
            let report = admin::block_addresses(&db, &ip_addresses, reason.as_deref()).await;
            println!("{}", report);
            if report.has_errors() {
                std::process::exit(1);
            }
        }
        Command::Detect => {
            let summary = AnomalyDetector::new(db, config.anomaly).run().await?;
            println!("{}", serde_json::to_string(&summary)?);
        }
        Command::Suspicious { limit } => {
            for entry in db.list_suspicious(limit).await? {
                println!(
                    "{}\t{}\t{}",
                    entry.ip_address,
                    entry.last_detected_at.to_rfc3339(),
                    entry.reason
                );
            }
        }
        Command::Logs { limit } => {
            for entry in db.recent_request_logs(limit).await? {
                let location = match (&entry.city, &entry.country) {
                    (Some(city), Some(country)) => format!("{}, {}", city, country),
                    _ => "Unknown".to_string(),
                };
                println!(
                    "{}\t{}\t{}\t{}",
                    entry.timestamp.to_rfc3339(),
                    entry.ip_address,
                    location,
                    entry.path
                );
            }
        }
    }

    Ok(())
}
