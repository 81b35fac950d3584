//! Database schema definitions

pub const CREATE_REQUEST_LOGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS request_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ip_address TEXT NOT NULL,
    timestamp BIGINT NOT NULL,     -- epoch millis
    path TEXT NOT NULL,
    country TEXT,
    city TEXT,
    region TEXT
)
"#;

pub const CREATE_BLOCKED_IPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS blocked_ips (
    ip_address TEXT PRIMARY KEY,
    created_at BIGINT NOT NULL,
    reason TEXT
)
"#;

pub const CREATE_GEO_CACHE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS geo_cache (
    ip_address TEXT PRIMARY KEY,
    country TEXT,
    city TEXT,
    region TEXT,
    org TEXT,
    postal TEXT,
    timezone TEXT,
    created_at BIGINT NOT NULL,
    expires_at BIGINT NOT NULL
)
"#;

pub const CREATE_SUSPICIOUS_IPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS suspicious_ips (
    ip_address TEXT PRIMARY KEY,
    reason TEXT NOT NULL,
    first_detected_at BIGINT NOT NULL,
    last_detected_at BIGINT NOT NULL
)
"#;

// Window scans filter on timestamp then group by ip
pub const CREATE_INDEX_LOGS_TS_IP: &str =
    "CREATE INDEX IF NOT EXISTS idx_logs_ts_ip ON request_logs(timestamp, ip_address)";

pub const CREATE_INDEX_LOGS_TS_PATH: &str =
    "CREATE INDEX IF NOT EXISTS idx_logs_ts_path ON request_logs(timestamp, path)";

pub const CREATE_INDEX_GEO_EXPIRES: &str =
    "CREATE INDEX IF NOT EXISTS idx_geo_cache_expires ON geo_cache(ip_address, expires_at)";

pub const MIGRATIONS: &[&str] = &[
    CREATE_REQUEST_LOGS_TABLE,
    CREATE_BLOCKED_IPS_TABLE,
    CREATE_GEO_CACHE_TABLE,
    CREATE_SUSPICIOUS_IPS_TABLE,
    CREATE_INDEX_LOGS_TS_IP,
    CREATE_INDEX_LOGS_TS_PATH,
    CREATE_INDEX_GEO_EXPIRES,
];
