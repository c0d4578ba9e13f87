//! Wall-clock cadences for the periodic activities
//!
//! Aggregation runs on every event and needs no schedule. Outbreak analysis
//! and model updates each fire on their own fixed interval, measured from
//! process start and then from their previous firing.

use crate::config::ScheduleConfig;
use std::time::{Duration, Instant};

/// A periodic activity driven by the ingestion loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// Report outbreak candidates from the current metrics
    OutbreakAnalysis,
    /// Collect training examples, train, and refresh predictions
    ModelUpdate,
}

#[derive(Debug, Clone, Copy)]
struct Cadence {
    activity: Activity,
    interval: Duration,
    last_fired: Instant,
}

impl Cadence {
    /// None when the interval reaches past the end of the clock
    fn deadline(&self) -> Option<Instant> {
        self.last_fired.checked_add(self.interval)
    }
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    cadences: Vec<Cadence>,
}

impl Scheduler {
    /// Start both cadences at `start`
    pub fn new(analysis_interval: Duration, model_update_interval: Duration, start: Instant) -> Self {
        Self {
            cadences: vec![
                Cadence {
                    activity: Activity::OutbreakAnalysis,
                    interval: analysis_interval,
                    last_fired: start,
                },
                Cadence {
                    activity: Activity::ModelUpdate,
                    interval: model_update_interval,
                    last_fired: start,
                },
            ],
        }
    }

    pub fn from_config(config: &ScheduleConfig, start: Instant) -> Self {
        Self::new(config.analysis_interval(), config.model_update_interval(), start)
    }

    /// Activities whose interval has elapsed, marked as fired at `now`
    ///
    /// An activity that missed several deadlines fires once, not once per
    /// missed deadline.
    pub fn due(&mut self, now: Instant) -> Vec<Activity> {
        let mut due = Vec::new();
        for cadence in &mut self.cadences {
            if cadence.deadline().is_some_and(|deadline| now >= deadline) {
                cadence.last_fired = now;
                due.push(cadence.activity);
            }
        }
        due
    }

    /// How long until the next activity falls due; zero if one already has
    pub fn time_until_next(&self, now: Instant) -> Duration {
        self.cadences
            .iter()
            .filter_map(Cadence::deadline)
            .map(|deadline| deadline.saturating_duration_since(now))
            .min()
            .unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(start: Instant) -> Scheduler {
        Scheduler::new(Duration::from_secs(8), Duration::from_secs(15), start)
    }

    #[test]
    fn test_nothing_due_at_start() {
        let start = Instant::now();
        let mut scheduler = scheduler(start);

        assert!(scheduler.due(start).is_empty());
        assert_eq!(scheduler.time_until_next(start), Duration::from_secs(8));
    }

    #[test]
    fn test_cadences_fire_independently() {
        let start = Instant::now();
        let mut scheduler = scheduler(start);

        assert_eq!(
            scheduler.due(start + Duration::from_secs(8)),
            vec![Activity::OutbreakAnalysis]
        );
        assert!(scheduler.due(start + Duration::from_secs(10)).is_empty());
        assert_eq!(
            scheduler.due(start + Duration::from_secs(15)),
            vec![Activity::ModelUpdate]
        );
        assert_eq!(
            scheduler.due(start + Duration::from_secs(16)),
            vec![Activity::OutbreakAnalysis]
        );
    }

    #[test]
    fn test_both_due_together() {
        let start = Instant::now();
        let mut scheduler = scheduler(start);

        let due = scheduler.due(start + Duration::from_secs(30));
        assert_eq!(due, vec![Activity::OutbreakAnalysis, Activity::ModelUpdate]);
    }

    #[test]
    fn test_missed_deadlines_fire_once() {
        let start = Instant::now();
        let mut scheduler = scheduler(start);

        let late = start + Duration::from_secs(100);
        assert_eq!(scheduler.due(late).len(), 2);
        assert!(scheduler.due(late).is_empty());
        assert_eq!(scheduler.time_until_next(late), Duration::from_secs(8));
    }

    #[test]
    fn test_time_until_next_is_zero_when_overdue() {
        let start = Instant::now();
        let scheduler = scheduler(start);

        assert_eq!(
            scheduler.time_until_next(start + Duration::from_secs(9)),
            Duration::ZERO
        );
        assert_eq!(
            scheduler.time_until_next(start + Duration::from_secs(5)),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_unreachable_interval_never_fires() {
        let start = Instant::now();
        let mut scheduler = Scheduler::new(Duration::MAX, Duration::from_secs(15), start);

        assert_eq!(scheduler.time_until_next(start), Duration::from_secs(15));
        assert_eq!(
            scheduler.due(start + Duration::from_secs(15)),
            vec![Activity::ModelUpdate]
        );

        let idle = Scheduler::new(Duration::MAX, Duration::MAX, start);
        assert_eq!(idle.time_until_next(start), Duration::MAX);
    }

    #[test]
    fn test_from_config() {
        let start = Instant::now();
        let scheduler = Scheduler::from_config(&ScheduleConfig::default(), start);
        assert_eq!(scheduler.time_until_next(start), Duration::from_secs(8));
    }
}
