use std::sync::Mutex;

use exchange_config::MILLIS_PER_SECOND;
use exchange_metrics::{MALWARE_SCAN_DURATION, MALWARE_SCAN_RESULTS};

use crate::scan::ScanResult;

/// Records malware-scan turnaround per verdict.
pub trait ScanMetrics: Send + Sync {
    /// The duration is only recorded when the upload time is known; the
    /// per-result counter is always incremented.
    fn record_scan_result(&self, result: ScanResult, arrival_millis: i64, save_time_millis: Option<i64>);
}

/// Turnaround in milliseconds, clamped at zero for clock skew
pub fn scan_duration_millis(arrival_millis: i64, save_time_millis: Option<i64>) -> Option<i64> {
    save_time_millis.map(|saved| (arrival_millis - saved).max(0))
}

pub struct PrometheusScanMetrics;

impl ScanMetrics for PrometheusScanMetrics {
    fn record_scan_result(&self, result: ScanResult, arrival_millis: i64, save_time_millis: Option<i64>) {
        if let Some(millis) = scan_duration_millis(arrival_millis, save_time_millis) {
            MALWARE_SCAN_DURATION.observe(millis as f64 / MILLIS_PER_SECOND as f64);
        }
        MALWARE_SCAN_RESULTS
            .with_label_values(&[result.as_str()])
            .inc();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanMetricRecord {
    pub result: ScanResult,
    pub duration_millis: Option<i64>,
}

/// Keeps every record in memory
#[derive(Debug, Default)]
pub struct RecordingScanMetrics {
    records: Mutex<Vec<ScanMetricRecord>>,
}

impl RecordingScanMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ScanMetricRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ScanMetrics for RecordingScanMetrics {
    fn record_scan_result(&self, result: ScanResult, arrival_millis: i64, save_time_millis: Option<i64>) {
        if let Ok(mut records) = self.records.lock() {
            records.push(ScanMetricRecord {
                result,
                duration_millis: scan_duration_millis(arrival_millis, save_time_millis),
            });
        }
    }
}
