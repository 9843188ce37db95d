use log::info;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Global metrics instance
pub static METRICS: Lazy<Mutex<Metrics>> = Lazy::new(|| Mutex::new(Metrics::new()));

/// Ingestion and enrichment counters for the lifetime of the process.
#[derive(Debug, Default)]
pub struct Metrics {
    pub messages_received: u64,
    pub messages_ignored: u64,
    pub messages_rejected: u64,
    pub readings_stored: u64,
    pub store_failures: u64,
    pub reconnects: u64,
    pub enrichment_patched: u64,
    pub enrichment_skipped: u64,
    pub enrichment_failed: u64,
    pub start_time: Option<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn record_message(&mut self) {
        self.messages_received += 1;
    }

    pub fn record_ignored(&mut self) {
        self.messages_ignored += 1;
    }

    pub fn record_rejected(&mut self) {
        self.messages_rejected += 1;
    }

    pub fn record_stored(&mut self) {
        self.readings_stored += 1;
    }

    pub fn record_store_failure(&mut self) {
        self.store_failures += 1;
    }

    pub fn record_reconnect(&mut self) {
        self.reconnects += 1;
    }

    pub fn record_enrichment_patched(&mut self) {
        self.enrichment_patched += 1;
    }

    pub fn record_enrichment_skipped(&mut self) {
        self.enrichment_skipped += 1;
    }

    pub fn record_enrichment_failed(&mut self) {
        self.enrichment_failed += 1;
    }

    pub fn get_total_duration(&self) -> Duration {
        self.start_time
            .map(|start| start.elapsed())
            .unwrap_or_default()
    }

    pub fn log_summary(&self) {
        info!("========== Ingestion Metrics Summary ==========");
        info!("Uptime: {:.2?}", self.get_total_duration());
        info!(
            "Messages: {} received, {} ignored, {} rejected",
            self.messages_received, self.messages_ignored, self.messages_rejected
        );
        info!(
            "Readings stored: {} ({} store failures)",
            self.readings_stored, self.store_failures
        );
        info!("Broker reconnects: {}", self.reconnects);
        info!(
            "Enrichment ticks: {} patched, {} skipped, {} failed",
            self.enrichment_patched, self.enrichment_skipped, self.enrichment_failed
        );
        info!("===============================================");
    }
}
