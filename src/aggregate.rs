//! Data series plotted across several loaded traces.

use crate::stats::TraceStatistics;
use std::collections::BTreeMap;

/// Total distance per ISO week, keyed by the week each trace started in.
#[derive(Debug, Default, Clone)]
pub struct WeeklyDistance {
    weeks: BTreeMap<u8, f64>,
}

impl WeeklyDistance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the trace's distance in kilometres. Returns `false` when the trace
    /// has no start time and was left out.
    pub fn add_trace(&mut self, stats: &TraceStatistics<'_>) -> bool {
        let Some(start) = stats.trace().start_time() else {
            tracing::debug!(
                trace = %stats.trace().display_name(),
                "trace has no start time, leaving it out of weekly totals"
            );
            return false;
        };

        *self.weeks.entry(start.iso_week()).or_insert(0.0) += stats.distance_meters() / 1000.0;
        true
    }

    /// `("W<week>", km)` pairs in week order, skipping weeks without distance.
    pub fn bars(&self) -> Vec<(String, f64)> {
        self.weeks
            .iter()
            .filter(|&(_, &km)| km > 0.0)
            .map(|(week, &km)| (format!("W{week}"), km))
            .collect()
    }
}

/// Average speed of each trace in the order they were added.
#[derive(Debug, Default, Clone)]
pub struct AverageSpeedSeries {
    speeds: Vec<f64>,
}

impl AverageSpeedSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_trace(&mut self, stats: &TraceStatistics<'_>) {
        self.speeds.push(stats.average_speed());
    }

    /// `(index, m/s)` pairs.
    pub fn points(&self) -> Vec<(usize, f64)> {
        self.speeds.iter().copied().enumerate().collect()
    }

    pub fn len(&self) -> usize {
        self.speeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.speeds.is_empty()
    }
}
