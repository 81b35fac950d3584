// Anomaly detection: volume threshold, sensitive paths, window bounds and upserts.

mod helpers;

use chrono::{Duration, Utc};

use helpers::{insert_logs, test_db};
use ip_tracker::anomaly::{AnomalyDetector, DetectionSummary, SENSITIVE_ACCESS_REASON};
use ip_tracker::config::AnomalyConfig;

fn detector(db: &ip_tracker::db::Database) -> AnomalyDetector {
    AnomalyDetector::new(db.clone(), AnomalyConfig::default())
}

#[tokio::test]
async fn flags_address_above_volume_threshold() {
    let db = test_db().await;
    let now = Utc::now();
    insert_logs(&db, "198.51.100.1", "/", 101, now - Duration::minutes(10)).await;

    let summary = detector(&db).run_at(now).await.unwrap();
    assert_eq!(
        summary,
        DetectionSummary {
            excessive_requests_detected: 1,
            sensitive_access_detected: 0,
        }
    );

    let entry = db.get_suspicious("198.51.100.1").await.unwrap().expect("flagged");
    assert!(entry.reason.contains("101"), "{}", entry.reason);
    assert_eq!(
        entry.reason,
        "Excessive requests: 101 requests in the last hour"
    );
}

#[tokio::test]
async fn threshold_is_strict() {
    let db = test_db().await;
    let now = Utc::now();
    insert_logs(&db, "198.51.100.2", "/", 100, now - Duration::minutes(5)).await;

    let summary = detector(&db).run_at(now).await.unwrap();
    assert_eq!(summary.excessive_requests_detected, 0);
    assert!(db.get_suspicious("198.51.100.2").await.unwrap().is_none());
}

#[tokio::test]
async fn only_rows_inside_the_window_count() {
    let db = test_db().await;
    let now = Utc::now();
    // 60 inside the hour, 60 just outside it
    insert_logs(&db, "198.51.100.3", "/", 60, now - Duration::minutes(30)).await;
    insert_logs(&db, "198.51.100.3", "/", 60, now - Duration::minutes(61)).await;
    insert_logs(&db, "198.51.100.4", "/admin", 1, now - Duration::hours(2)).await;

    let summary = detector(&db).run_at(now).await.unwrap();
    assert_eq!(summary, DetectionSummary::default());
    assert_eq!(db.count_suspicious().await.unwrap(), 0);
}

#[tokio::test]
async fn window_bounds_are_inclusive() {
    let db = test_db().await;
    let now = Utc::now();
    let window_start = now - Duration::seconds(AnomalyConfig::default().window_secs);

    insert_logs(&db, "198.51.100.10", "/", 101, window_start).await;
    insert_logs(&db, "198.51.100.11", "/login", 1, window_start).await;
    insert_logs(&db, "198.51.100.12", "/admin", 1, now).await;
    // One millisecond before the window opens
    insert_logs(
        &db,
        "198.51.100.13",
        "/admin",
        1,
        window_start - Duration::milliseconds(1),
    )
    .await;

    let summary = detector(&db).run_at(now).await.unwrap();
    assert_eq!(
        summary,
        DetectionSummary {
            excessive_requests_detected: 1,
            sensitive_access_detected: 2,
        }
    );
    assert!(db.get_suspicious("198.51.100.10").await.unwrap().is_some());
    assert!(db.get_suspicious("198.51.100.11").await.unwrap().is_some());
    assert!(db.get_suspicious("198.51.100.12").await.unwrap().is_some());
    assert!(db.get_suspicious("198.51.100.13").await.unwrap().is_none());
}

#[tokio::test]
async fn single_sensitive_request_is_flagged() {
    let db = test_db().await;
    let now = Utc::now();
    insert_logs(&db, "203.0.113.1", "/admin", 1, now - Duration::minutes(1)).await;
    insert_logs(&db, "203.0.113.2", "/login/", 1, now - Duration::minutes(1)).await;
    // Near misses: not exact matches
    insert_logs(&db, "203.0.113.3", "/admin/users", 1, now - Duration::minutes(1)).await;
    insert_logs(&db, "203.0.113.4", "/Login", 1, now - Duration::minutes(1)).await;
    // Repeated access is still one address
    insert_logs(&db, "203.0.113.1", "/login", 3, now - Duration::minutes(2)).await;

    let summary = detector(&db).run_at(now).await.unwrap();
    assert_eq!(summary.sensitive_access_detected, 2);
    assert_eq!(summary.excessive_requests_detected, 0);

    for ip in ["203.0.113.1", "203.0.113.2"] {
        let entry = db.get_suspicious(ip).await.unwrap().expect("flagged");
        assert_eq!(entry.reason, SENSITIVE_ACCESS_REASON);
    }
    for ip in ["203.0.113.3", "203.0.113.4"] {
        assert!(db.get_suspicious(ip).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn rerun_refreshes_detection_time_without_duplicates() {
    let db = test_db().await;
    let detector = detector(&db);
    let now = Utc::now();
    insert_logs(&db, "203.0.113.9", "/admin/", 1, now - Duration::minutes(20)).await;

    detector.run_at(now).await.unwrap();
    let first = db.get_suspicious("203.0.113.9").await.unwrap().unwrap();

    let later = now + Duration::minutes(5);
    detector.run_at(later).await.unwrap();
    let second = db.get_suspicious("203.0.113.9").await.unwrap().unwrap();

    assert_eq!(db.count_suspicious().await.unwrap(), 1);
    assert_eq!(
        second.first_detected_at.timestamp_millis(),
        first.first_detected_at.timestamp_millis()
    );
    assert_eq!(second.last_detected_at.timestamp_millis(), later.timestamp_millis());
}

#[tokio::test]
async fn later_run_overwrites_reason() {
    let db = test_db().await;
    let detector = detector(&db);
    let now = Utc::now();

    insert_logs(&db, "192.0.2.8", "/", 150, now - Duration::minutes(10)).await;
    detector.run_at(now).await.unwrap();
    let entry = db.get_suspicious("192.0.2.8").await.unwrap().unwrap();
    assert_eq!(entry.reason, "Excessive requests: 150 requests in the last hour");

    insert_logs(&db, "192.0.2.8", "/", 10, now + Duration::minutes(1)).await;
    detector.run_at(now + Duration::minutes(2)).await.unwrap();
    let entry = db.get_suspicious("192.0.2.8").await.unwrap().unwrap();
    assert_eq!(entry.reason, "Excessive requests: 160 requests in the last hour");
}

#[tokio::test]
async fn sensitive_reason_wins_when_both_passes_hit() {
    let db = test_db().await;
    let now = Utc::now();
    insert_logs(&db, "192.0.2.77", "/", 120, now - Duration::minutes(10)).await;
    insert_logs(&db, "192.0.2.77", "/login", 1, now - Duration::minutes(9)).await;

    let summary = detector(&db).run_at(now).await.unwrap();
    assert_eq!(
        summary,
        DetectionSummary {
            excessive_requests_detected: 1,
            sensitive_access_detected: 1,
        }
    );
    assert_eq!(db.count_suspicious().await.unwrap(), 1);
    let entry = db.get_suspicious("192.0.2.77").await.unwrap().unwrap();
    assert_eq!(entry.reason, SENSITIVE_ACCESS_REASON);
}

#[tokio::test]
async fn custom_threshold_and_paths() {
    let db = test_db().await;
    let config = AnomalyConfig {
        request_threshold: 3,
        sensitive_paths: vec!["/wp-login.php".to_string()],
        ..AnomalyConfig::default()
    };
    let detector = AnomalyDetector::new(db.clone(), config);
    let now = Utc::now();
    insert_logs(&db, "192.0.2.90", "/", 4, now - Duration::minutes(1)).await;
    insert_logs(&db, "192.0.2.91", "/wp-login.php", 1, now - Duration::minutes(1)).await;
    insert_logs(&db, "192.0.2.92", "/admin", 1, now - Duration::minutes(1)).await;

    let summary = detector.run_at(now).await.unwrap();
    assert_eq!(summary.excessive_requests_detected, 1);
    assert_eq!(summary.sensitive_access_detected, 1);
    assert!(db.get_suspicious("192.0.2.92").await.unwrap().is_none());
}

#[tokio::test]
async fn summary_serializes_with_pass_names() {
    let summary = DetectionSummary {
        excessive_requests_detected: 2,
        sensitive_access_detected: 1,
    };
    assert_eq!(
        serde_json::to_value(summary).unwrap(),
        serde_json::json!({"excessive_requests_detected": 2, "sensitive_access_detected": 1})
    );
}
