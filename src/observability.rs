use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Provisioning counters for the lifetime of the process
#[derive(Debug, Default)]
pub struct ProvisioningMetrics {
    pub enqueued: AtomicU64,
    pub provisioned: AtomicU64,
    pub already_provisioned: AtomicU64,
    pub failed_attempts: AtomicU64,
    pub dead_lettered: AtomicU64,
}

impl ProvisioningMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_provisioned(&self) {
        self.provisioned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_already_provisioned(&self) {
        self.already_provisioned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_attempt(&self) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> ProvisioningStats {
        ProvisioningStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            provisioned: self.provisioned.load(Ordering::Relaxed),
            already_provisioned: self.already_provisioned.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            enqueued = stats.enqueued,
            provisioned = stats.provisioned,
            already_provisioned = stats.already_provisioned,
            failed_attempts = stats.failed_attempts,
            dead_lettered = stats.dead_lettered,
            "Provisioning metrics"
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisioningStats {
    pub enqueued: u64,
    pub provisioned: u64,
    pub already_provisioned: u64,
    pub failed_attempts: u64,
    pub dead_lettered: u64,
}

/// Global metrics instance
static PROVISIONING_METRICS: std::sync::LazyLock<ProvisioningMetrics> =
    std::sync::LazyLock::new(ProvisioningMetrics::new);

pub fn provisioning_metrics() -> &'static ProvisioningMetrics {
    &PROVISIONING_METRICS
}

/// Time an operation and log its duration when finished
pub struct OperationTimer {
    operation: &'static str,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        tracing::debug!(
            operation = self.operation,
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
    }
}
