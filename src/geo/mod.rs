//! Geolocation lookups backed by a TTL cache in the database
//!
//! Every address is first looked up in `geo_cache`; only a miss (or an expired
//! row) reaches the remote provider. Successful answers are cached for the TTL,
//! failures are never cached so the next request retries the provider.

mod ipinfo;

pub use ipinfo::IpInfoClient;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::GeolocationConfig;
use crate::db::{Database, GeoCacheEntry};
use crate::error::{LookupError, PersistError};

/// Location fields reported by the provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub postal: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

impl From<GeoCacheEntry> for Location {
    fn from(entry: GeoCacheEntry) -> Self {
        Self {
            country: entry.country,
            city: entry.city,
            region: entry.region,
            org: entry.org,
            postal: entry.postal,
            timezone: entry.timezone,
        }
    }
}

/// Outcome of [`GeoLocationCache::resolve`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationResult {
    Found { location: Location, cached: bool },
    Failed { error: String },
}

impl LocationResult {
    pub fn location(&self) -> Option<&Location> {
        match self {
            LocationResult::Found { location, .. } => Some(location),
            LocationResult::Failed { .. } => None,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, LocationResult::Found { cached: true, .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LocationResult::Failed { .. })
    }
}

/// Remote geolocation provider, consulted only on a cache miss
#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup(&self, ip: &str) -> Result<Location, LookupError>;
}

pub struct GeoLocationCache {
    db: Database,
    remote: Arc<dyn GeoLookup>,
    ttl: Duration,
    timeout: std::time::Duration,
}

impl GeoLocationCache {
    pub fn new(db: Database, remote: Arc<dyn GeoLookup>) -> Self {
        Self {
            db,
            remote,
            ttl: Duration::hours(24),
            timeout: std::time::Duration::from_secs(5),
        }
    }

    pub fn from_config(db: Database, remote: Arc<dyn GeoLookup>, config: &GeolocationConfig) -> Self {
        Self::new(db, remote)
            .with_ttl(Duration::hours(config.cache_ttl_hours))
            .with_timeout(std::time::Duration::from_secs(config.timeout_secs))
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Upper bound on a single provider call, whatever the provider does itself
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn resolve(&self, ip: &str) -> LocationResult {
        self.resolve_at(ip, Utc::now()).await
    }

    /// Resolve `ip` as seen at `now`: cache rows with `expires_at <= now` are ignored
    pub async fn resolve_at(&self, ip: &str, now: DateTime<Utc>) -> LocationResult {
        match self.db.get_geo_cache(ip, now).await {
            Ok(Some(entry)) => {
                return LocationResult::Found {
                    location: entry.into(),
                    cached: true,
                }
            }
            Ok(None) => {}
            Err(e) => debug!(ip = %ip, "Geo cache read failed, treating as miss: {}", e),
        }

        let fetched = match tokio::time::timeout(self.timeout, self.remote.lookup(ip)).await {
            Ok(result) => result,
            Err(_) => Err(LookupError::Timeout),
        };

        match fetched {
            Ok(location) => {
                if let Err(e) = self.store(ip, &location, now).await {
                    debug!(ip = %ip, "{}", e);
                }
                LocationResult::Found {
                    location,
                    cached: false,
                }
            }
            Err(e) => {
                debug!(ip = %ip, "Geolocation lookup failed: {}", e);
                LocationResult::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn store(&self, ip: &str, location: &Location, now: DateTime<Utc>) -> Result<(), PersistError> {
        let entry = GeoCacheEntry {
            ip_address: ip.to_string(),
            country: location.country.clone(),
            city: location.city.clone(),
            region: location.region.clone(),
            org: location.org.clone(),
            postal: location.postal.clone(),
            timezone: location.timezone.clone(),
            created_at: now,
            expires_at: now + self.ttl,
        };
        self.db
            .upsert_geo_cache(&entry)
            .await
            .map_err(PersistError::Cache)
    }
}
