//! Aggregate measurements over all points of a trace.
//!
//! Every measurement comes out of a single walk over tracks, segments and
//! points in document order. The walk runs the first time any measurement is
//! requested and its results are kept for the lifetime of the engine.

use crate::geo::{BoundingBox, great_circle_distance};
use crate::trace::{Point, Segment, Trace};
use crate::{GpxError, Result};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Summary {
    bounds: BoundingBox,
    distance: f64,
    duration: u64,
    max_speed: f64,
}

/// Lazily computed statistics over a borrowed [`Trace`].
///
/// Safe to share between threads; concurrent first requests still trigger
/// only one walk.
#[derive(Debug)]
pub struct TraceStatistics<'a> {
    trace: &'a Trace,
    origin: (f64, f64),
    summary: OnceLock<Summary>,
    walks: AtomicUsize,
}

impl<'a> TraceStatistics<'a> {
    /// Fails with [`GpxError::EmptyTrace`] when the trace has no track points.
    pub fn new(trace: &'a Trace) -> Result<Self> {
        let first = trace.points().next().ok_or(GpxError::EmptyTrace)?;

        Ok(Self {
            trace,
            origin: (first.lat, first.lon),
            summary: OnceLock::new(),
            walks: AtomicUsize::new(0),
        })
    }

    pub fn trace(&self) -> &'a Trace {
        self.trace
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.summary().bounds
    }

    /// Midpoint of the bounding box as `(lat, lon)`.
    pub fn centre(&self) -> (f64, f64) {
        self.summary().bounds.centre()
    }

    pub fn distance_meters(&self) -> f64 {
        self.summary().distance
    }

    /// Sum of the first-to-last elapsed time of every segment, in whole seconds.
    pub fn duration_seconds(&self) -> u64 {
        self.summary().duration
    }

    /// Meters per second over the whole trace; zero when no time elapsed.
    pub fn average_speed(&self) -> f64 {
        let summary = self.summary();
        if summary.duration == 0 {
            return 0.0;
        }
        summary.distance / summary.duration as f64
    }

    /// Fastest leg between consecutive points, in meters per second.
    pub fn maximum_speed(&self) -> f64 {
        self.summary().max_speed
    }

    fn summary(&self) -> &Summary {
        self.summary.get_or_init(|| self.walk_points())
    }

    fn walk_points(&self) -> Summary {
        self.walks.fetch_add(1, Ordering::Relaxed);

        let (lat, lon) = self.origin;
        let mut bounds = BoundingBox::from_point(lat, lon);
        let mut distance = 0.0;
        let mut duration = 0;
        let mut max_speed: f64 = 0.0;

        for track in self.trace.tracks() {
            for segment in &track.segments {
                let mut previous: Option<&Point> = None;

                for point in &segment.points {
                    bounds.extend(point.lat, point.lon);

                    if let Some(prev) = previous {
                        let leg = great_circle_distance(prev.lat, prev.lon, point.lat, point.lon);
                        if let Some(speed) = leg_speed(leg, prev, point) {
                            max_speed = max_speed.max(speed);
                        }
                        distance += leg;
                    }
                    previous = Some(point);
                }

                duration += segment_duration(segment);
            }
        }

        tracing::debug!(
            trace = %self.trace.display_name(),
            distance,
            duration,
            max_speed,
            "computed trace statistics"
        );

        Summary {
            bounds,
            distance,
            duration,
            max_speed,
        }
    }

    #[cfg(test)]
    fn walks(&self) -> usize {
        self.walks.load(Ordering::Relaxed)
    }
}

/// Speed over one leg, or `None` when either timestamp is missing or no time
/// elapsed between the points.
fn leg_speed(distance: f64, from: &Point, to: &Point) -> Option<f64> {
    let elapsed = (to.time? - from.time?).as_seconds_f64();
    (elapsed > 0.0).then(|| distance / elapsed)
}

/// Whole seconds between the first and last point of a segment. Zero when
/// either end has no timestamp or the clock ran backwards.
fn segment_duration(segment: &Segment) -> u64 {
    let (Some(first), Some(last)) = (segment.points.first(), segment.points.last()) else {
        return 0;
    };
    match (first.time, last.time) {
        (Some(start), Some(end)) => u64::try_from((end - start).whole_seconds()).unwrap_or(0),
        _ => 0,
    }
}
