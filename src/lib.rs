//! Parsing and statistics for GPX track logs.
//!
//! [`parse`] turns a GPX document into a [`Trace`]; [`TraceStatistics`] walks the
//! trace once and caches bounding box, distance, duration and speeds.

pub mod aggregate;
pub mod geo;
pub mod gpxxml;
pub mod stats;
pub mod trace;

pub use aggregate::{AverageSpeedSeries, WeeklyDistance};
pub use geo::{BoundingBox, great_circle_distance};
pub use gpxxml::{load_all, parse, parse_file};
pub use stats::TraceStatistics;
pub use trace::{Author, Copyright, Link, Metadata, Point, Segment, Trace, Track};

#[derive(Debug, thiserror::Error)]
pub enum GpxError {
    #[error("malformed GPX document: {0}")]
    MalformedDocument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("trace has no track points")]
    EmptyTrace,
}

pub type Result<T> = std::result::Result<T, GpxError>;
