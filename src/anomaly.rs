//! Hourly anomaly detection over recent request logs
//!
//! A run looks at the trailing window ending at the run's start time and makes
//! two passes over it:
//!
//! 1. volume: addresses with more than `request_threshold` requests
//! 2. sensitive paths: addresses that requested any configured sensitive path
//!
//! Every hit is upserted into `suspicious_ips`. The volume pass runs first, so
//! when an address trips both in one run the sensitive-path reason is the one
//! that remains. Addresses are never unflagged.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::config::AnomalyConfig;
use crate::db::Database;

pub const SENSITIVE_ACCESS_REASON: &str = "Accessed sensitive path (/admin or /login)";

pub fn excessive_requests_reason(count: i64) -> String {
    format!("Excessive requests: {} requests in the last hour", count)
}

/// Number of addresses flagged by each pass of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DetectionSummary {
    pub excessive_requests_detected: usize,
    pub sensitive_access_detected: usize,
}

pub struct AnomalyDetector {
    db: Database,
    config: AnomalyConfig,
    // Runs in one process never overlap; separate processes still can.
    run_lock: Mutex<()>,
}

impl AnomalyDetector {
    pub fn new(db: Database, config: AnomalyConfig) -> Self {
        Self {
            db,
            config,
            run_lock: Mutex::new(()),
        }
    }

    /// Entry point for the periodic trigger
    pub async fn run(&self) -> Result<DetectionSummary> {
        self.run_at(Utc::now()).await
    }

    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<DetectionSummary> {
        let _guard = self.run_lock.lock().await;
        let since = now - Duration::seconds(self.config.window_secs);

        let excessive = self.detect_excessive_requests(since, now).await?;
        let sensitive = self.detect_sensitive_access(since, now).await?;

        let summary = DetectionSummary {
            excessive_requests_detected: excessive.len(),
            sensitive_access_detected: sensitive.len(),
        };
        info!(
            excessive = summary.excessive_requests_detected,
            sensitive = summary.sensitive_access_detected,
            "Anomaly detection finished"
        );
        Ok(summary)
    }

    async fn detect_excessive_requests(
        &self,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let counts = self
            .db
            .request_counts_between(since, now, self.config.request_threshold)
            .await?;

        let mut detected = Vec::with_capacity(counts.len());
        for (ip, count) in counts {
            let reason = excessive_requests_reason(count);
            self.db.upsert_suspicious(&ip, &reason, now).await?;
            debug!(ip = %ip, count = count, "Flagged for request volume");
            detected.push(ip);
        }
        Ok(detected)
    }

    async fn detect_sensitive_access(
        &self,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let ips = self
            .db
            .addresses_with_paths_between(since, now, &self.config.sensitive_paths)
            .await?;

        for ip in &ips {
            self.db
                .upsert_suspicious(ip, SENSITIVE_ACCESS_REASON, now)
                .await?;
            debug!(ip = %ip, "Flagged for sensitive path access");
        }
        Ok(ips)
    }
}

/// Run detection every `interval`, starting one interval from now
pub fn start_detection_schedule(detector: Arc<AnomalyDetector>, interval: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        info!("Anomaly detection scheduled every {}s", interval.as_secs());
        loop {
            ticker.tick().await;
            if let Err(e) = detector.run().await {
                error!("Anomaly detection run failed: {}", e);
            }
        }
    });
}
