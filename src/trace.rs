//! In-memory representation of a parsed GPX document.

use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// A single GPS fix, used for both track points and waypoints.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
    pub ele: Option<f64>,
    pub time: Option<OffsetDateTime>,
    pub name: Option<String>,
    pub description: Option<String>,
}

impl Point {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            ele: None,
            time: None,
            name: None,
            description: None,
        }
    }

    pub fn with_time(mut self, time: OffsetDateTime) -> Self {
        self.time = Some(time);
        self
    }

    /// Coordinates converted to radians, as `(lat, lon)`.
    pub fn radians(&self) -> (f64, f64) {
        (self.lat.to_radians(), self.lon.to_radians())
    }
}

/// Contiguous run of points in travel order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segment {
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    pub name: Option<String>,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Link {
    pub href: Option<String>,
    pub text: Option<String>,
    pub link_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Author {
    pub name: Option<String>,
    pub email: Option<String>,
    pub link: Option<Link>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Copyright {
    pub author: Option<String>,
    pub year: Option<String>,
    pub license: Option<String>,
}

/// Document level `<metadata>`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub name: Option<String>,
    pub description: Option<String>,
    pub time: Option<OffsetDateTime>,
    pub author: Option<Author>,
    pub copyright: Option<Copyright>,
    pub link: Option<Link>,
    pub keywords: Option<String>,
}

/// A loaded GPX file. Read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    path: PathBuf,
    metadata: Option<Metadata>,
    tracks: Vec<Track>,
    waypoints: Vec<Point>,
}

impl Trace {
    pub fn new(
        path: impl Into<PathBuf>,
        metadata: Option<Metadata>,
        tracks: Vec<Track>,
        waypoints: Vec<Point>,
    ) -> Self {
        Self {
            path: path.into(),
            metadata,
            tracks,
            waypoints,
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn waypoints(&self) -> &[Point] {
        &self.waypoints
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn file_path(&self) -> &Path {
        &self.path
    }

    /// Base name of the source file.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }

    pub fn full_path(&self) -> PathBuf {
        std::path::absolute(&self.path).unwrap_or_else(|_| self.path.clone())
    }

    /// Metadata name, falling back to the file name.
    pub fn display_name(&self) -> String {
        self.metadata
            .as_ref()
            .and_then(|m| m.name.clone())
            .unwrap_or_else(|| self.file_name())
    }

    /// All track points in document order.
    pub fn points(&self) -> impl Iterator<Item = &Point> {
        self.tracks
            .iter()
            .flat_map(|track| &track.segments)
            .flat_map(|segment| &segment.points)
    }

    pub fn point_count(&self) -> usize {
        self.tracks
            .iter()
            .flat_map(|track| &track.segments)
            .map(|segment| segment.points.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.points().next().is_none()
    }

    /// Time of the first point of the first segment of the first track.
    pub fn start_time(&self) -> Option<OffsetDateTime> {
        self.tracks
            .first()?
            .segments
            .first()?
            .points
            .first()?
            .time
    }

    /// Time of the last point of the last segment of the last track.
    pub fn end_time(&self) -> Option<OffsetDateTime> {
        self.tracks.last()?.segments.last()?.points.last()?.time
    }

    /// Coordinates in radians, grouped per track and per segment, for drawing.
    pub fn points_radians(&self) -> Vec<Vec<Vec<(f64, f64)>>> {
        self.tracks
            .iter()
            .map(|track| {
                track
                    .segments
                    .iter()
                    .map(|segment| segment.points.iter().map(Point::radians).collect())
                    .collect()
            })
            .collect()
    }
}
