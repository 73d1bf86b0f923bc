use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref INGEST_REQUESTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "telemetry_ingest_requests_total",
        "Total ingest requests received"
    ))
    .unwrap();
    pub static ref INGEST_ACCEPTED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "telemetry_ingest_accepted_total",
        "Total ingest requests stored"
    ))
    .unwrap();
    pub static ref INGEST_REJECTED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "telemetry_ingest_rejected_total",
        "Total ingest requests rejected by validation"
    ))
    .unwrap();
    pub static ref STORE_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "telemetry_store_failures_total",
        "Total failed database operations"
    ))
    .unwrap();
    pub static ref STORE_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "telemetry_store_latency_seconds",
            "Time taken by a single database operation"
        )
        .buckets(vec![
            0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5
        ])
    )
    .unwrap();
    pub static ref DEVICES: Gauge = Gauge::with_opts(Opts::new(
        "telemetry_devices",
        "Number of devices with a stored reading"
    ))
    .unwrap();
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(INGEST_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(INGEST_ACCEPTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(INGEST_REJECTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORE_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORE_LATENCY_SECONDS.clone()))?;
    REGISTRY.register(Box::new(DEVICES.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_after_init() {
        // Other tests in this binary may have registered already.
        let _ = init_metrics();
        INGEST_REQUESTS_TOTAL.inc();
        let text = gather_metrics();
        assert!(text.contains("telemetry_ingest_requests_total"));
        assert!(text.contains("telemetry_devices"));
    }
}
