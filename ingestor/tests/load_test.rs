use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use telemetry_ingestor::clock::{format_timestamp, SystemClock};
use telemetry_ingestor::db::ReadingStore;
use telemetry_ingestor::rest::{create_router, AppState};
use tower::ServiceExt;

const DEVICES: usize = 25;
const MESSAGES: usize = 500;

fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Every payload encodes its sequence number both in `metrics.seq` and in
/// its timestamp, so a row assembled from two different writes is detectable.
fn payload(seq: usize, temp_c: f64, humidity_pct: f64) -> Value {
    let timestamp = format_timestamp(base_time() + Duration::seconds(seq as i64));
    json!({
        "device_id": format!("load-test-dev-{:02}", seq % DEVICES),
        "timestamp": timestamp,
        "metrics": {
            "seq": seq,
            "temp_c": temp_c,
            "humidity_pct": humidity_pct
        }
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ingest_keeps_one_consistent_row_per_device() {
    let dir = tempfile::tempdir().unwrap();
    let store = ReadingStore::open(&dir.path().join("load.db")).await.unwrap();
    let app = create_router(AppState::new(store.clone(), Arc::new(SystemClock)));

    let payloads: Vec<Value> = {
        let mut rng = rand::thread_rng();
        (0..MESSAGES)
            .map(|seq| payload(seq, rng.gen_range(-20.0..=80.0), rng.gen_range(0.0..=100.0)))
            .collect()
    };

    let start = Instant::now();
    let handles: Vec<_> = payloads
        .into_iter()
        .map(|body| {
            let app = app.clone();
            tokio::spawn(async move {
                let request = Request::builder()
                    .method("POST")
                    .uri("/ingest")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap();
                app.oneshot(request).await.unwrap().status()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }
    println!(
        "{} concurrent ingests in {:.3}s",
        MESSAGES,
        start.elapsed().as_secs_f64()
    );

    let readings = store.fetch_all().await.unwrap();
    assert_eq!(readings.len(), DEVICES);

    for (i, reading) in readings.iter().enumerate() {
        assert_eq!(reading.device_id, format!("load-test-dev-{:02}", i));

        let seq = reading.metrics["seq"] as usize;
        assert_eq!(seq % DEVICES, i);
        assert_eq!(
            reading.timestamp,
            format_timestamp(base_time() + Duration::seconds(seq as i64))
        );
        assert_eq!(reading.metrics.len(), 3);
    }
}
