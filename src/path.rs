//! Coordinate and candidate path value types.
//!
//! Paths are stored as decoded coordinate sequences. They are produced once by
//! the geometry engine and never mutated afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A (latitude, longitude) pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// True when both components are finite and inside the WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    pub fn midpoint(&self, other: &Coordinate) -> Coordinate {
        Coordinate::new((self.lat + other.lat) / 2.0, (self.lon + other.lon) / 2.0)
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((lat, lon): (f64, f64)) -> Self {
        Self::new(lat, lon)
    }
}

/// Identifier of a candidate path within one planning request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PathId(pub usize);

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "path_{}", self.0 + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathTooShort;

impl fmt::Display for PathTooShort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a path needs at least two coordinates")
    }
}

impl std::error::Error for PathTooShort {}

/// A synthetic polyline between a start and a target coordinate.
///
/// Always holds at least two points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Coordinate>", into = "Vec<Coordinate>")]
pub struct CandidatePath {
    points: Vec<Coordinate>,
}

impl CandidatePath {
    pub fn new(points: Vec<Coordinate>) -> Result<Self, PathTooShort> {
        if points.len() < 2 {
            return Err(PathTooShort);
        }
        Ok(Self { points })
    }

    /// Builds a path from points the caller guarantees to be at least two.
    pub(crate) fn from_vertices(points: Vec<Coordinate>) -> Self {
        debug_assert!(points.len() >= 2);
        Self { points }
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    pub fn start(&self) -> Coordinate {
        self.points[0]
    }

    pub fn end(&self) -> Coordinate {
        self.points[self.points.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false for a constructed path.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Midpoints of every consecutive vertex pair, in path order.
    pub fn segment_midpoints(&self) -> impl Iterator<Item = Coordinate> + '_ {
        self.points.windows(2).map(|pair| pair[0].midpoint(&pair[1]))
    }

    pub fn into_points(self) -> Vec<Coordinate> {
        self.points
    }
}

impl TryFrom<Vec<Coordinate>> for CandidatePath {
    type Error = PathTooShort;

    fn try_from(points: Vec<Coordinate>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<CandidatePath> for Vec<Coordinate> {
    fn from(path: CandidatePath) -> Self {
        path.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_single_point() {
        assert_eq!(CandidatePath::new(vec![Coordinate::new(1.0, 2.0)]), Err(PathTooShort));
        assert_eq!(CandidatePath::new(vec![]), Err(PathTooShort));
    }

    #[test]
    fn test_endpoints() {
        let path = CandidatePath::new(vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.5, 0.5),
            Coordinate::new(1.0, 2.0),
        ])
        .unwrap();
        assert_eq!(path.start(), Coordinate::new(0.0, 0.0));
        assert_eq!(path.end(), Coordinate::new(1.0, 2.0));
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn test_segment_midpoints() {
        let path = CandidatePath::new(vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 2.0),
            Coordinate::new(2.0, 2.0),
        ])
        .unwrap();
        let mids: Vec<_> = path.segment_midpoints().collect();
        assert_eq!(mids, vec![Coordinate::new(0.0, 1.0), Coordinate::new(1.0, 2.0)]);
    }

    #[test]
    fn test_coordinate_validity() {
        assert!(Coordinate::new(36.1, -115.1).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, f64::NAN).is_valid());
        assert!(!Coordinate::new(0.0, 180.5).is_valid());
    }

    #[test]
    fn test_path_id_display() {
        assert_eq!(PathId(0).to_string(), "path_1");
        assert_eq!(PathId(4).to_string(), "path_5");
    }

    #[test]
    fn test_deserialize_rejects_short_path() {
        let err = serde_json::from_str::<CandidatePath>(r#"[{"lat":1.0,"lon":2.0}]"#);
        assert!(err.is_err());
        let ok: CandidatePath =
            serde_json::from_str(r#"[{"lat":1.0,"lon":2.0},{"lat":3.0,"lon":4.0}]"#).unwrap();
        assert_eq!(ok.len(), 2);
    }
}
