//! Self-monitoring for the outbreak watch pipeline
//!
//! Counts what flows through the pipeline (payloads, rejected payloads,
//! ingested events, alerts, model cycles) and how long model fitting takes,
//! so an operator can tell a quiet stream from a broken one.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Point-in-time copy of the pipeline counters
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PipelineStats {
    pub payloads_received: u64,
    pub decode_failures: u64,
    pub events_ingested: u64,
    pub critical_alerts: u64,
    pub outbreak_alerts: u64,
    pub model_cycles: u64,
    pub model_cycles_skipped: u64,
    /// Mean wall-clock time of recent training runs
    pub avg_training_latency_ms: f64,
    /// Resident memory of this process, 0 if unavailable
    pub memory_usage_bytes: u64,
    pub uptime_secs: u64,
    pub timestamp: DateTime<Utc>,
}

/// Thread-safe counters shared by the ingestion loop and the model worker
#[derive(Debug)]
pub struct PipelineMonitor {
    started: Instant,
    payloads_received: AtomicU64,
    decode_failures: AtomicU64,
    events_ingested: AtomicU64,
    critical_alerts: AtomicU64,
    outbreak_alerts: AtomicU64,
    model_cycles: AtomicU64,
    model_cycles_skipped: AtomicU64,
    training_latencies: Mutex<VecDeque<Duration>>,
    max_latency_samples: usize,
}

impl Default for PipelineMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMonitor {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            payloads_received: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            events_ingested: AtomicU64::new(0),
            critical_alerts: AtomicU64::new(0),
            outbreak_alerts: AtomicU64::new(0),
            model_cycles: AtomicU64::new(0),
            model_cycles_skipped: AtomicU64::new(0),
            training_latencies: Mutex::new(VecDeque::new()),
            max_latency_samples: 50,
        }
    }

    pub fn record_payload(&self) {
        self.payloads_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event(&self) {
        self.events_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_critical_alert(&self) {
        self.critical_alerts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outbreak_alerts(&self, count: u64) {
        self.outbreak_alerts.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_model_cycle(&self) {
        self.model_cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// A model update fell due while the previous one was still running
    pub fn record_model_cycle_skipped(&self) {
        self.model_cycles_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_training_latency(&self, duration: Duration) {
        debug!("Recording training latency: {:?}", duration);

        let mut latencies = self
            .training_latencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        latencies.push_back(duration);
        while latencies.len() > self.max_latency_samples {
            latencies.pop_front();
        }
    }

    fn avg_training_latency_ms(&self) -> f64 {
        let latencies = self
            .training_latencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if latencies.is_empty() {
            return 0.0;
        }
        let total: f64 = latencies.iter().map(|d| d.as_secs_f64() * 1000.0).sum();
        total / latencies.len() as f64
    }

    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            payloads_received: self.payloads_received.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            events_ingested: self.events_ingested.load(Ordering::Relaxed),
            critical_alerts: self.critical_alerts.load(Ordering::Relaxed),
            outbreak_alerts: self.outbreak_alerts.load(Ordering::Relaxed),
            model_cycles: self.model_cycles.load(Ordering::Relaxed),
            model_cycles_skipped: self.model_cycles_skipped.load(Ordering::Relaxed),
            avg_training_latency_ms: self.avg_training_latency_ms(),
            memory_usage_bytes: resident_memory_bytes(),
            uptime_secs: self.started.elapsed().as_secs(),
            timestamp: Utc::now(),
        }
    }

    /// Log a one-line summary and warn about suspicious ratios
    pub fn log_summary(&self) -> PipelineStats {
        let stats = self.snapshot();

        info!(
            "Pipeline stats: payloads={}, rejected={}, events={}, critical_alerts={}, outbreak_alerts={}, model_cycles={} (skipped {}), training_latency={:.1}ms, memory={}MB",
            stats.payloads_received,
            stats.decode_failures,
            stats.events_ingested,
            stats.critical_alerts,
            stats.outbreak_alerts,
            stats.model_cycles,
            stats.model_cycles_skipped,
            stats.avg_training_latency_ms,
            stats.memory_usage_bytes / 1024 / 1024
        );

        if stats.payloads_received >= 10 && stats.decode_failures * 2 > stats.payloads_received {
            warn!(
                "More than half of all payloads were rejected ({} of {})",
                stats.decode_failures, stats.payloads_received
            );
        }
        if stats.model_cycles_skipped > 0 && stats.model_cycles_skipped >= stats.model_cycles {
            warn!(
                "Model updates are falling behind: {} skipped, {} completed",
                stats.model_cycles_skipped, stats.model_cycles
            );
        }

        stats
    }
}

/// Measures one training run; `finish` records the elapsed time
pub struct TrainingTimer {
    start_time: Instant,
    monitor: Arc<PipelineMonitor>,
}

impl TrainingTimer {
    pub fn start(monitor: Arc<PipelineMonitor>) -> Self {
        Self {
            start_time: Instant::now(),
            monitor,
        }
    }

    pub fn finish(self) -> Duration {
        let elapsed = self.start_time.elapsed();
        self.monitor.record_training_latency(elapsed);
        elapsed
    }
}

/// Current resident set size of this process
fn resident_memory_bytes() -> u64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = rss_kb {
                return kb * 1024;
            }
        }
    }

    // Peak rather than current usage, but better than nothing
    #[cfg(unix)]
    {
        // SAFETY: getrusage only writes into the zeroed struct we pass it
        unsafe {
            let mut usage: libc::rusage = std::mem::zeroed();
            if libc::getrusage(libc::RUSAGE_SELF, &mut usage) == 0 {
                #[cfg(target_os = "macos")]
                return usage.ru_maxrss as u64;

                #[cfg(not(target_os = "macos"))]
                return (usage.ru_maxrss as u64) * 1024;
            }
        }
    }

    0
}
