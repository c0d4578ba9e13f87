//! Windowed per-hospital aggregator
//!
//! This module provides the HospitalAggregator which keeps, for every reporting
//! hospital, the cases inside a trailing time window and the [`HospitalMetrics`]
//! derived from them. Windows are pruned on every ingest and the statistics are
//! maintained incrementally, so an ingest only pays for the cases it evicts.

use crate::aggregator::metrics::{HospitalMetrics, BASELINE_TEMPERATURE};
use crate::config::WindowConfig;
use crate::events::{Event, SymptomSet, Timestamp};
use chrono::{DateTime, Duration, Utc};
use log::debug;
use std::collections::{HashMap, VecDeque};

/// The parts of an event the window statistics need
#[derive(Debug, Clone)]
struct WindowedCase {
    timestamp: Timestamp,
    temperature: f64,
    severe: bool,
    symptoms: SymptomSet,
}

/// Cases inside one hospital's trailing window, ordered by timestamp,
/// with running totals kept in step with the contents
#[derive(Debug, Default)]
struct CaseWindow {
    cases: VecDeque<WindowedCase>,
    temperature_sum: f64,
    severe_count: usize,
    symptom_counts: HashMap<SymptomSet, usize>,
    newest: Option<Timestamp>,
}

impl CaseWindow {
    fn insert(&mut self, case: WindowedCase) {
        self.temperature_sum += case.temperature;
        if case.severe {
            self.severe_count += 1;
        }
        *self
            .symptom_counts
            .entry(case.symptoms.clone())
            .or_insert(0) += 1;
        self.newest = Some(match self.newest {
            Some(newest) if newest >= case.timestamp => newest,
            _ => case.timestamp,
        });

        let position = self
            .cases
            .partition_point(|existing| existing.timestamp <= case.timestamp);
        self.cases.insert(position, case);
    }

    /// Drop every case older than `cutoff`
    fn evict_before(&mut self, cutoff: Timestamp) -> usize {
        let mut evicted = 0;
        while let Some(front) = self.cases.front() {
            if front.timestamp >= cutoff {
                break;
            }
            if let Some(case) = self.cases.pop_front() {
                self.temperature_sum -= case.temperature;
                if case.severe {
                    self.severe_count -= 1;
                }
                if let Some(count) = self.symptom_counts.get_mut(&case.symptoms) {
                    *count -= 1;
                    if *count == 0 {
                        self.symptom_counts.remove(&case.symptoms);
                    }
                }
                evicted += 1;
            }
        }

        if self.cases.is_empty() {
            // Reset to avoid carrying floating point residue into the next window
            self.temperature_sum = 0.0;
        }
        evicted
    }

    fn len(&self) -> usize {
        self.cases.len()
    }

    fn summarize_into(&self, metrics: &mut HospitalMetrics, baseline_temperature: f64) {
        let count = self.cases.len();
        metrics.case_velocity = count;
        metrics.symptom_diversity = self.symptom_counts.len();

        if count == 0 {
            metrics.avg_temperature = baseline_temperature;
            return;
        }

        metrics.avg_temperature = self.temperature_sum / count as f64;
        metrics.severe_case_ratio = (self.severe_count as f64 / count as f64).clamp(0.0, 1.0);
    }
}

/// Window and metrics owned for one hospital
#[derive(Debug)]
struct HospitalState {
    window: CaseWindow,
    metrics: HospitalMetrics,
    last_cluster: Option<Timestamp>,
}

/// Per-hospital windowed aggregator
///
/// Owns all hospital metrics and windowed case history. Mutation only happens
/// through [`ingest`](Self::ingest) and [`expire`](Self::expire).
#[derive(Debug)]
pub struct HospitalAggregator {
    hospitals: HashMap<String, HospitalState>,
    /// Width of the trailing window
    window: Duration,
    /// Average temperature reported for an empty window
    baseline_temperature: f64,
    /// How long the outbreak flag survives without a new cluster case (None = forever)
    outbreak_flag_ttl: Option<Duration>,
}

impl HospitalAggregator {
    /// Create an aggregator with the given trailing window
    ///
    /// # Examples
    ///
    /// ```
    /// use outbreak_watch::aggregator::HospitalAggregator;
    /// use chrono::Duration;
    ///
    /// let aggregator = HospitalAggregator::new(Duration::seconds(60));
    /// assert_eq!(aggregator.hospital_count(), 0);
    /// ```
    pub fn new(window: Duration) -> Self {
        Self {
            hospitals: HashMap::new(),
            window,
            baseline_temperature: BASELINE_TEMPERATURE,
            outbreak_flag_ttl: None,
        }
    }

    /// Create an aggregator from the `[window]` configuration section
    pub fn from_config(config: &WindowConfig) -> Self {
        Self::new(whole_seconds(config.duration_secs))
            .with_baseline_temperature(config.baseline_temperature)
            .with_outbreak_flag_ttl(config.outbreak_flag_ttl_secs.map(whole_seconds))
    }

    pub fn with_baseline_temperature(mut self, baseline_temperature: f64) -> Self {
        self.baseline_temperature = baseline_temperature;
        self
    }

    pub fn with_outbreak_flag_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.outbreak_flag_ttl = ttl;
        self
    }

    /// Apply one case report and return the hospital's updated metrics
    ///
    /// The window is anchored at the newest timestamp seen for the hospital,
    /// which is the event's own timestamp for in-order streams. A late event
    /// is placed in timestamp order and evicted at once if it already falls
    /// outside the window.
    pub fn ingest(&mut self, event: &Event) -> &HospitalMetrics {
        let baseline = self.baseline_temperature;
        let state = self
            .hospitals
            .entry(event.hospital.clone())
            .or_insert_with(|| HospitalState {
                window: CaseWindow::default(),
                metrics: HospitalMetrics::new(baseline),
                last_cluster: None,
            });

        state.window.insert(WindowedCase {
            timestamp: event.timestamp,
            temperature: event.temperature,
            severe: event.severity.is_severe(),
            symptoms: event.symptoms.clone(),
        });

        let anchor = state.window.newest.unwrap_or(event.timestamp);
        let evicted = state.window.evict_before(window_start(anchor, self.window));
        if evicted > 0 {
            debug!(
                "Evicted {} cases from the window of {}",
                evicted, event.hospital
            );
        }

        if event.is_cluster {
            state.last_cluster = Some(match state.last_cluster {
                Some(last) if last >= event.timestamp => last,
                _ => event.timestamp,
            });
            state.metrics.had_recent_outbreak = true;
        } else {
            Self::decay_outbreak_flag(state, anchor, self.outbreak_flag_ttl);
        }

        state.window.summarize_into(&mut state.metrics, baseline);
        state.metrics.total_cases += 1;
        state.metrics.last_update_time = Some(event.timestamp);

        &state.metrics
    }

    /// Evict cases older than `now - window` from every hospital
    ///
    /// Recomputes window statistics but does not count as an update, so
    /// `total_cases` and `last_update_time` are left alone.
    pub fn expire(&mut self, now: Timestamp) {
        let cutoff = window_start(now, self.window);
        for (hospital, state) in self.hospitals.iter_mut() {
            let evicted = state.window.evict_before(cutoff);
            if evicted > 0 {
                debug!("Expired {} idle cases from the window of {}", evicted, hospital);
            }
            Self::decay_outbreak_flag(state, now, self.outbreak_flag_ttl);
            state
                .window
                .summarize_into(&mut state.metrics, self.baseline_temperature);
        }
    }

    fn decay_outbreak_flag(state: &mut HospitalState, now: Timestamp, ttl: Option<Duration>) {
        if let (Some(ttl), Some(last_cluster)) = (ttl, state.last_cluster) {
            let expired = last_cluster
                .checked_add_signed(ttl)
                .is_some_and(|expiry| now > expiry);
            if state.metrics.had_recent_outbreak && expired {
                debug!("Outbreak flag expired (last cluster case at {})", last_cluster);
                state.metrics.had_recent_outbreak = false;
            }
        }
    }

    /// Current metrics for a hospital, if it has reported
    pub fn metrics(&self, hospital: &str) -> Option<&HospitalMetrics> {
        self.hospitals.get(hospital).map(|state| &state.metrics)
    }

    /// Owned copy of every hospital's metrics, sorted by hospital name
    pub fn snapshot(&self) -> Vec<(String, HospitalMetrics)> {
        let mut snapshot: Vec<(String, HospitalMetrics)> = self
            .hospitals
            .iter()
            .map(|(hospital, state)| (hospital.clone(), state.metrics.clone()))
            .collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot
    }

    /// Number of cases currently inside a hospital's window
    pub fn windowed_len(&self, hospital: &str) -> usize {
        self.hospitals
            .get(hospital)
            .map(|state| state.window.len())
            .unwrap_or(0)
    }

    /// Newest case timestamp seen across all hospitals
    pub fn latest_timestamp(&self) -> Option<Timestamp> {
        self.hospitals
            .values()
            .filter_map(|state| state.window.newest)
            .max()
    }

    pub fn hospital_count(&self) -> usize {
        self.hospitals.len()
    }

    pub fn window_duration(&self) -> Duration {
        self.window
    }
}

/// Oldest timestamp still inside a window ending at `anchor`
///
/// Saturates at the earliest representable instant.
fn window_start(anchor: Timestamp, window: Duration) -> Timestamp {
    anchor
        .checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Saturating conversion of a configured number of seconds
fn whole_seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

impl Default for HospitalAggregator {
    fn default() -> Self {
        // Default: 60 second window
        Self::new(Duration::seconds(60))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::events::{Event, Severity, SymptomSet, Timestamp};
    use chrono::{DateTime, Duration};

    pub fn base_time() -> Timestamp {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    pub fn case_at(hospital: &str, offset_secs: i64, temperature: f64, severity: Severity) -> Event {
        Event {
            patient_id: format!("PATIENT_{}", offset_secs),
            hospital: hospital.to_string(),
            symptoms: SymptomSet::from_csv("fever,cough,fatigue"),
            severity,
            temperature,
            timestamp: base_time() + Duration::seconds(offset_secs),
            is_cluster: false,
        }
    }
}


// Property-based tests
#[cfg(test)]
mod property_tests {
    use super::test_support::case_at;
    use super::*;
    use crate::events::Severity;
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    /// A generated case: offset in seconds, temperature, severity and symptom choice
    #[derive(Debug, Clone)]
    struct GeneratedCase {
        offset: i64,
        temperature: f64,
        severity: Severity,
        symptoms: u8,
    }

    impl Arbitrary for GeneratedCase {
        fn arbitrary(g: &mut Gen) -> Self {
            let severities = [
                Severity::Mild,
                Severity::Moderate,
                Severity::Severe,
                Severity::Critical,
            ];
            GeneratedCase {
                // Offsets spread over several windows so eviction is exercised
                offset: (u16::arbitrary(g) % 400) as i64,
                temperature: 95.0 + (u8::arbitrary(g) % 100) as f64 / 10.0,
                severity: *g.choose(&severities).unwrap(),
                symptoms: u8::arbitrary(g) % 4,
            }
        }
    }

    fn to_event(case: &GeneratedCase) -> Event {
        let presentations = [
            "fever,cough,fatigue",
            "fever,shortness_of_breath,chest_pain",
            "cough,sore_throat,headache",
            "dry_cough,fever,loss_of_taste",
        ];
        let mut event = case_at("H", case.offset, case.temperature, case.severity);
        event.symptoms = SymptomSet::from_csv(presentations[case.symptoms as usize]);
        event
    }

    #[quickcheck]
    fn prop_metrics_stay_within_bounds(cases: Vec<GeneratedCase>) -> bool {
        let mut aggregator = HospitalAggregator::new(Duration::seconds(60));

        cases.iter().all(|case| {
            let metrics = aggregator.ingest(&to_event(case)).clone();
            let windowed = aggregator.windowed_len("H");

            (0.0..=1.0).contains(&metrics.severe_case_ratio)
                && metrics.case_velocity <= windowed
                && metrics.symptom_diversity <= windowed
                && metrics.symptom_diversity <= metrics.case_velocity
        })
    }

    // The incremental window must match a full recompute over every case seen so far
    #[quickcheck]
    fn prop_incremental_window_matches_full_recompute(cases: Vec<GeneratedCase>) -> bool {
        let window = Duration::seconds(60);
        let mut aggregator = HospitalAggregator::new(window);
        let mut history: Vec<Event> = Vec::new();

        cases.iter().all(|case| {
            let event = to_event(case);
            history.push(event.clone());
            let metrics = aggregator.ingest(&event).clone();

            let anchor = history.iter().map(|e| e.timestamp).max().unwrap();
            let windowed: Vec<&Event> = history
                .iter()
                .filter(|e| anchor - e.timestamp <= window)
                .collect();

            let count = windowed.len();
            let mean = windowed.iter().map(|e| e.temperature).sum::<f64>() / count as f64;
            let severe = windowed.iter().filter(|e| e.severity.is_severe()).count();
            let mut distinct: Vec<&SymptomSet> = windowed.iter().map(|e| &e.symptoms).collect();
            distinct.sort();
            distinct.dedup();

            metrics.case_velocity == count
                && metrics.symptom_diversity == distinct.len()
                && (metrics.avg_temperature - mean).abs() < 1e-6
                && (metrics.severe_case_ratio - severe as f64 / count as f64).abs() < 1e-9
                && metrics.total_cases == history.len() as u64
        })
    }
}
