//! Prometheus metrics for the B2B message exchange
//!
//! Provides centralized metrics collection for monitoring:
//! - Malware scan turnaround and verdicts
//! - Event publication to Kafka
//! - Object storage operations
//! - Message-log housekeeping

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, TextEncoder, histogram_opts,
    opts, register_histogram, register_histogram_vec, register_int_counter,
    register_int_counter_vec,
};

// ============================================================================
// Malware Scan Metrics
// ============================================================================

/// Time between a partner upload and the arrival of its scan verdict
pub static MALWARE_SCAN_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(histogram_opts!(
        "mes_malware_scan_duration_seconds",
        "Time from partner upload to malware scan verdict",
        vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0]
    ))
    .expect("Failed to register MALWARE_SCAN_DURATION metric")
});

/// Scan verdicts received, by result
pub static MALWARE_SCAN_RESULTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "mes_malware_scan_result_total",
            "Malware scan verdicts received, by result"
        ),
        &["scan_result"]
    )
    .expect("Failed to register MALWARE_SCAN_RESULTS metric")
});

// ============================================================================
// Kafka Metrics
// ============================================================================

pub static KAFKA_PRODUCE_SUCCESS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "mes_kafka_produce_success_total",
        "Total number of successful Kafka produce operations"
    ))
    .expect("Failed to register KAFKA_PRODUCE_SUCCESS metric")
});

pub static KAFKA_PRODUCE_FAILURE: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "mes_kafka_produce_failure_total",
        "Total number of failed Kafka produce operations"
    ))
    .expect("Failed to register KAFKA_PRODUCE_FAILURE metric")
});

pub static KAFKA_PRODUCE_LATENCY: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "mes_kafka_produce_latency_seconds",
        "Kafka produce operation latency in seconds",
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register KAFKA_PRODUCE_LATENCY metric")
});

// ============================================================================
// Object Storage Metrics
// ============================================================================

/// Object storage call latency, by operation
pub static OBJECT_STORE_OPERATION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "mes_object_store_operation_duration_seconds",
        "Object storage operation latency in seconds",
        &["operation"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register OBJECT_STORE_OPERATION_DURATION metric")
});

/// Reads served from the fallback buckets
pub static OBJECT_STORE_FALLBACK_HITS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "mes_object_store_fallback_hits_total",
        "Reads that missed the primary buckets and were served by the fallback"
    ))
    .expect("Failed to register OBJECT_STORE_FALLBACK_HITS metric")
});

// ============================================================================
// Housekeeping Metrics
// ============================================================================

/// Purge batches that removed at least one expired message-log row
pub static HOUSEKEEPING_BATCHES_DELETED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "mes_housekeeping_batches_deleted_total",
        "Housekeeping batches that deleted expired message-log rows"
    ))
    .expect("Failed to register HOUSEKEEPING_BATCHES_DELETED metric")
});

/// Housekeeping runs that stopped because the batch cap was reached
pub static HOUSEKEEPING_BATCH_CAP_REACHED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "mes_housekeeping_batch_cap_reached_total",
        "Housekeeping runs that hit the maximum number of batches"
    ))
    .expect("Failed to register HOUSEKEEPING_BATCH_CAP_REACHED metric")
});

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_result_counter_is_exported() {
        MALWARE_SCAN_RESULTS
            .with_label_values(&["NO_THREATS_FOUND"])
            .inc();

        let text = gather_metrics().unwrap();
        assert!(text.contains("mes_malware_scan_result_total"));
        assert!(text.contains("scan_result=\"NO_THREATS_FOUND\""));
    }
}
