//! Database module

mod schema;
pub mod write_buffer;

pub use write_buffer::{start_write_buffer, LogSender};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, QueryBuilder, Sqlite, SqlitePool};

use crate::config::DatabaseConfig;

/// One handled request, written once after the downstream handler finished
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub id: Option<i64>,
    pub ip_address: String,
    pub timestamp: DateTime<Utc>,
    pub path: String,
    pub country: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
}

impl RequestLogEntry {
    pub fn new(ip_address: String, path: String) -> Self {
        Self {
            id: None,
            ip_address,
            timestamp: Utc::now(),
            path,
            country: None,
            city: None,
            region: None,
        }
    }

    pub fn with_geo(
        mut self,
        country: Option<String>,
        city: Option<String>,
        region: Option<String>,
    ) -> Self {
        self.country = country;
        self.city = city;
        self.region = region;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockedEntry {
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Cached provider answer, valid while `now < expires_at`
#[derive(Debug, Clone, Serialize)]
pub struct GeoCacheEntry {
    pub ip_address: String,
    pub country: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub org: Option<String>,
    pub postal: Option<String>,
    pub timezone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuspiciousEntry {
    pub ip_address: String,
    pub reason: String,
    pub first_detected_at: DateTime<Utc>,
    pub last_detected_at: DateTime<Utc>,
}

type GeoCacheRow = (
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    i64,
    i64,
);

type RequestLogRow = (
    i64,
    String,
    i64,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", config.url)).await?;
        Ok(Self { pool })
    }

    /// Private in-memory database with the schema applied.
    ///
    /// Pinned to a single connection that never expires, otherwise every new
    /// pool connection would see its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn run_migrations(&self) -> Result<()> {
        // Enable WAL mode for better concurrency
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await?;

        for statement in schema::MIGRATIONS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Close the pool; every later query fails
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // === Request logs ===

    pub async fn insert_request_log(&self, entry: &RequestLogEntry) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO request_logs (ip_address, timestamp, path, country, city, region)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.ip_address)
        .bind(entry.timestamp.timestamp_millis())
        .bind(&entry.path)
        .bind(&entry.country)
        .bind(&entry.city)
        .bind(&entry.region)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Insert a batch of log entries in one transaction
    pub async fn batch_insert_request_logs(&self, entries: &[RequestLogEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO request_logs (ip_address, timestamp, path, country, city, region)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&entry.ip_address)
            .bind(entry.timestamp.timestamp_millis())
            .bind(&entry.path)
            .bind(&entry.country)
            .bind(&entry.city)
            .bind(&entry.region)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Most recent log entries, newest first
    pub async fn recent_request_logs(&self, limit: i64) -> Result<Vec<RequestLogEntry>> {
        let rows: Vec<RequestLogRow> = sqlx::query_as(
            r#"
            SELECT id, ip_address, timestamp, path, country, city, region
            FROM request_logs
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, ip_address, ts, path, country, city, region)| RequestLogEntry {
                    id: Some(id),
                    ip_address,
                    timestamp: from_millis(ts),
                    path,
                    country,
                    city,
                    region,
                },
            )
            .collect())
    }

    pub async fn count_request_logs(&self, ip_address: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM request_logs WHERE ip_address = ?")
            .bind(ip_address)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// Per-address request counts in `[since, until]`, keeping only counts above `threshold`
    pub async fn request_counts_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        threshold: i64,
    ) -> Result<Vec<(String, i64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT ip_address, COUNT(*) as count
            FROM request_logs
            WHERE timestamp >= ? AND timestamp <= ?
            GROUP BY ip_address
            HAVING COUNT(*) > ?
            ORDER BY count DESC
            "#,
        )
        .bind(since.timestamp_millis())
        .bind(until.timestamp_millis())
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Distinct addresses that requested one of `paths` (exact match) in `[since, until]`
    pub async fn addresses_with_paths_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        paths: &[String],
    ) -> Result<Vec<String>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT DISTINCT ip_address FROM request_logs WHERE timestamp >= ",
        );
        query.push_bind(since.timestamp_millis());
        query.push(" AND timestamp <= ");
        query.push_bind(until.timestamp_millis());
        query.push(" AND path IN (");
        let mut separated = query.separated(", ");
        for path in paths {
            separated.push_bind(path);
        }
        separated.push_unseparated(") ORDER BY ip_address");

        let rows: Vec<(String,)> = query.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(ip,)| ip).collect())
    }

    // === Blocklist ===

    pub async fn is_blocked(&self, ip_address: &str) -> Result<bool> {
        let row: (i64,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM blocked_ips WHERE ip_address = ?)")
                .bind(ip_address)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0 != 0)
    }

    /// Create the entry unless the address is already present. Returns whether it was created.
    pub async fn block_if_absent(&self, ip_address: &str, reason: Option<&str>) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO blocked_ips (ip_address, created_at, reason) VALUES (?, ?, ?)",
        )
        .bind(ip_address)
        .bind(Utc::now().timestamp_millis())
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn list_blocked(&self) -> Result<Vec<BlockedEntry>> {
        let rows: Vec<(String, i64, Option<String>)> = sqlx::query_as(
            "SELECT ip_address, created_at, reason FROM blocked_ips ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(ip_address, created_at, reason)| BlockedEntry {
                ip_address,
                created_at: from_millis(created_at),
                reason,
            })
            .collect())
    }

    // === Geolocation cache ===

    /// Cached record for `ip_address`, only if it has not expired at `now`
    pub async fn get_geo_cache(
        &self,
        ip_address: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<GeoCacheEntry>> {
        let row: Option<GeoCacheRow> = sqlx::query_as(
            r#"
            SELECT ip_address, country, city, region, org, postal, timezone, created_at, expires_at
            FROM geo_cache
            WHERE ip_address = ? AND expires_at > ?
            "#,
        )
        .bind(ip_address)
        .bind(now.timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(ip_address, country, city, region, org, postal, timezone, created_at, expires_at)| {
                GeoCacheEntry {
                    ip_address,
                    country,
                    city,
                    region,
                    org,
                    postal,
                    timezone,
                    created_at: from_millis(created_at),
                    expires_at: from_millis(expires_at),
                }
            },
        ))
    }

    /// Insert or overwrite the cache row for the entry's address
    pub async fn upsert_geo_cache(&self, entry: &GeoCacheEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO geo_cache (ip_address, country, city, region, org, postal, timezone, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ip_address) DO UPDATE SET
                country = excluded.country,
                city = excluded.city,
                region = excluded.region,
                org = excluded.org,
                postal = excluded.postal,
                timezone = excluded.timezone,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(&entry.ip_address)
        .bind(&entry.country)
        .bind(&entry.city)
        .bind(&entry.region)
        .bind(&entry.org)
        .bind(&entry.postal)
        .bind(&entry.timezone)
        .bind(entry.created_at.timestamp_millis())
        .bind(entry.expires_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count_geo_cache(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM geo_cache")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    // === Suspicious addresses ===

    /// Create the record, or overwrite its reason and refresh `last_detected_at`
    pub async fn upsert_suspicious(
        &self,
        ip_address: &str,
        reason: &str,
        detected_at: DateTime<Utc>,
    ) -> Result<()> {
        let ts = detected_at.timestamp_millis();
        sqlx::query(
            r#"
            INSERT INTO suspicious_ips (ip_address, reason, first_detected_at, last_detected_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(ip_address) DO UPDATE SET
                reason = excluded.reason,
                last_detected_at = excluded.last_detected_at
            "#,
        )
        .bind(ip_address)
        .bind(reason)
        .bind(ts)
        .bind(ts)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_suspicious(&self, ip_address: &str) -> Result<Option<SuspiciousEntry>> {
        let row: Option<(String, String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT ip_address, reason, first_detected_at, last_detected_at
            FROM suspicious_ips
            WHERE ip_address = ?
            "#,
        )
        .bind(ip_address)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(ip_address, reason, first, last)| SuspiciousEntry {
            ip_address,
            reason,
            first_detected_at: from_millis(first),
            last_detected_at: from_millis(last),
        }))
    }

    /// Flagged addresses, most recently detected first
    pub async fn list_suspicious(&self, limit: i64) -> Result<Vec<SuspiciousEntry>> {
        let rows: Vec<(String, String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT ip_address, reason, first_detected_at, last_detected_at
            FROM suspicious_ips
            ORDER BY last_detected_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(ip_address, reason, first, last)| SuspiciousEntry {
                ip_address,
                reason,
                first_detected_at: from_millis(first),
                last_detected_at: from_millis(last),
            })
            .collect())
    }

    pub async fn count_suspicious(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM suspicious_ips")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}
