// Shared test helpers: in-memory database, fake geolocation provider and log fixtures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ip_tracker::db::{Database, RequestLogEntry};
use ip_tracker::error::LookupError;
use ip_tracker::geo::{GeoLookup, Location};

#[allow(dead_code)]
pub async fn test_db() -> Database {
    Database::in_memory()
        .await
        .expect("Failed to create in-memory database")
}

#[allow(dead_code)]
pub fn sample_location() -> Location {
    Location {
        country: Some("US".to_string()),
        city: Some("Mountain View".to_string()),
        region: Some("California".to_string()),
        org: Some("AS15169 Google LLC".to_string()),
        postal: Some("94043".to_string()),
        timezone: Some("America/Los_Angeles".to_string()),
    }
}

/// Provider stand-in that counts calls and can be switched to failing or slow
pub struct FakeLookup {
    calls: AtomicUsize,
    failing: AtomicBool,
    delay: Option<Duration>,
}

#[allow(dead_code)]
impl FakeLookup {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            delay: None,
        })
    }

    pub fn failing() -> Arc<Self> {
        let fake = Self::new();
        fake.set_failing(true);
        fake
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            delay: Some(delay),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeoLookup for FakeLookup {
    async fn lookup(&self, _ip: &str) -> Result<Location, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(LookupError::Status(503));
        }
        Ok(sample_location())
    }
}

/// Insert `count` log rows for `ip` at `at`
#[allow(dead_code)]
pub async fn insert_logs(db: &Database, ip: &str, path: &str, count: usize, at: DateTime<Utc>) {
    let entries: Vec<RequestLogEntry> = (0..count)
        .map(|_| {
            let mut entry = RequestLogEntry::new(ip.to_string(), path.to_string());
            entry.timestamp = at;
            entry
        })
        .collect();
    db.batch_insert_request_logs(&entries)
        .await
        .expect("Failed to insert request logs");
}
