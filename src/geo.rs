use std::f64::consts::PI;

/// Radius of the sphere used for surface distances, in meters.
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// Great circle distance in meters between two coordinates given in degrees.
///
/// Uses the spherical law of cosines. Rounding can push the cosine of the arc a
/// hair outside `[-1, 1]` for identical or antipodal points, where `acos` would
/// return NaN, so the value is clamped first.
pub fn great_circle_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();
    let lon1 = lon1.to_radians();
    let lon2 = lon2.to_radians();

    let a = lat1.sin() * lat2.sin() + lat1.cos() * lat2.cos() * (lon2 - lon1).cos();
    let arc = if a >= 1.0 {
        0.0
    } else if a <= -1.0 {
        PI
    } else {
        a.acos()
    };

    EARTH_RADIUS * arc
}

/// Latitude/longitude rectangle in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// A degenerate box covering a single coordinate.
    pub fn from_point(lat: f64, lon: f64) -> Self {
        Self {
            min_lat: lat,
            max_lat: lat,
            min_lon: lon,
            max_lon: lon,
        }
    }

    pub fn extend(&mut self, lat: f64, lon: f64) {
        self.min_lat = self.min_lat.min(lat);
        self.max_lat = self.max_lat.max(lat);
        self.min_lon = self.min_lon.min(lon);
        self.max_lon = self.max_lon.max(lon);
    }

    /// Midpoint of each axis as `(lat, lon)`.
    pub fn centre(&self) -> (f64, f64) {
        (
            (self.max_lat + self.min_lat) / 2.0,
            (self.max_lon + self.min_lon) / 2.0,
        )
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}
