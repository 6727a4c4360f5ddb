//! Fixed-point coordinates, bounding boxes and the simple geometries built
//! from entity versions.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius in metres.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A longitude/latitude pair in units of 1e-7 degrees.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Coordinate {
    pub lon: i32,
    pub lat: i32,
}

impl Coordinate {
    /// Fixed-point units per degree.
    pub const SCALE: f64 = 1e7;

    #[must_use]
    pub const fn new(lon: i32, lat: i32) -> Self {
        Self { lon, lat }
    }

    /// Convert from degrees, rejecting positions outside the valid range.
    #[must_use]
    pub fn from_degrees(lon: f64, lat: f64) -> Option<Self> {
        if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
            return None;
        }
        Some(Self {
            lon: (lon * Self::SCALE).round() as i32,
            lat: (lat * Self::SCALE).round() as i32,
        })
    }

    #[must_use]
    pub fn lon_degrees(self) -> f64 {
        f64::from(self.lon) / Self::SCALE
    }

    #[must_use]
    pub fn lat_degrees(self) -> f64 {
        f64::from(self.lat) / Self::SCALE
    }

    /// Great-circle distance in metres.
    #[must_use]
    pub fn distance_m(self, other: Self) -> f64 {
        let (lat1, lat2) = (self.lat_degrees().to_radians(), other.lat_degrees().to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon_degrees() - self.lon_degrees()).to_radians();
        let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * h.sqrt().asin()
    }
}

impl fmt::Debug for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.7}, {:.7})", self.lon_degrees(), self.lat_degrees())
    }
}

/// Inclusive axis-aligned box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Coordinate,
    pub max: Coordinate,
}

impl BoundingBox {
    pub const WORLD: BoundingBox = BoundingBox {
        min: Coordinate::new(-1_800_000_000, -900_000_000),
        max: Coordinate::new(1_800_000_000, 900_000_000),
    };

    /// `None` unless `min <= max` on both axes.
    #[must_use]
    pub fn new(min: Coordinate, max: Coordinate) -> Option<Self> {
        (min.lon <= max.lon && min.lat <= max.lat).then_some(Self { min, max })
    }

    #[must_use]
    pub const fn point(c: Coordinate) -> Self {
        Self { min: c, max: c }
    }

    #[must_use]
    pub fn from_degrees(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Option<Self> {
        Self::new(
            Coordinate::from_degrees(min_lon, min_lat)?,
            Coordinate::from_degrees(max_lon, max_lat)?,
        )
    }

    #[must_use]
    pub fn extended(self, c: Coordinate) -> Self {
        Self {
            min: Coordinate::new(self.min.lon.min(c.lon), self.min.lat.min(c.lat)),
            max: Coordinate::new(self.max.lon.max(c.lon), self.max.lat.max(c.lat)),
        }
    }

    #[must_use]
    pub fn union(self, other: Self) -> Self {
        self.extended(other.min).extended(other.max)
    }

    #[must_use]
    pub const fn contains(&self, c: Coordinate) -> bool {
        c.lon >= self.min.lon && c.lon <= self.max.lon && c.lat >= self.min.lat && c.lat <= self.max.lat
    }

    #[must_use]
    pub const fn intersects(&self, other: &Self) -> bool {
        self.min.lon <= other.max.lon
            && other.min.lon <= self.max.lon
            && self.min.lat <= other.max.lat
            && other.min.lat <= self.max.lat
    }

    /// Extent along each axis in fixed-point units.
    #[must_use]
    pub fn extent(&self) -> (u64, u64) {
        (
            (i64::from(self.max.lon) - i64::from(self.min.lon)) as u64,
            (i64::from(self.max.lat) - i64::from(self.min.lat)) as u64,
        )
    }
}

/// Coarse geometry classification used by filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
    Other,
}

impl GeometryKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Line => "line",
            Self::Polygon => "polygon",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Geometry construction failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("ring with {points} points is degenerate")]
    DegenerateRing { points: usize },

    #[error("ring is not closed")]
    UnclosedRing,

    #[error("line needs at least two points, got {points}")]
    DegenerateLine { points: usize },

    #[error("member {0} has no coordinates at the requested time")]
    MissingMember(crate::EntityRef),

    #[error("entity is deleted at the requested time")]
    Deleted,

    #[error("unsupported geometry: {0}")]
    Unsupported(&'static str),

    #[error("geometry source failed: {0}")]
    Source(String),
}

/// Geometry of one entity version.
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    Point(Coordinate),
    LineString(Vec<Coordinate>),
    Polygon {
        exterior: Vec<Coordinate>,
        holes: Vec<Vec<Coordinate>>,
    },
    Collection(Vec<Geometry>),
}

impl Geometry {
    pub fn line(points: Vec<Coordinate>) -> Result<Self, GeometryError> {
        if points.len() < 2 {
            return Err(GeometryError::DegenerateLine {
                points: points.len(),
            });
        }
        Ok(Self::LineString(points))
    }

    /// A polygon from a closed ring. Rings with fewer than four points or
    /// zero area are rejected.
    pub fn polygon(exterior: Vec<Coordinate>) -> Result<Self, GeometryError> {
        check_ring(&exterior)?;
        Ok(Self::Polygon {
            exterior,
            holes: Vec::new(),
        })
    }

    /// A closed way is a polygon, an open one a line.
    pub fn from_way_coordinates(points: Vec<Coordinate>) -> Result<Self, GeometryError> {
        if points.len() >= 4 && points.first() == points.last() {
            Self::polygon(points)
        } else {
            Self::line(points)
        }
    }

    #[must_use]
    pub fn kind(&self) -> GeometryKind {
        match self {
            Self::Point(_) => GeometryKind::Point,
            Self::LineString(_) => GeometryKind::Line,
            Self::Polygon { .. } => GeometryKind::Polygon,
            Self::Collection(_) => GeometryKind::Other,
        }
    }

    #[must_use]
    pub fn bounds(&self) -> Option<BoundingBox> {
        let fold = |points: &[Coordinate]| {
            points.iter().fold(None, |b: Option<BoundingBox>, c| {
                Some(b.map_or_else(|| BoundingBox::point(*c), |b| b.extended(*c)))
            })
        };
        match self {
            Self::Point(c) => Some(BoundingBox::point(*c)),
            Self::LineString(points) => fold(points),
            Self::Polygon { exterior, .. } => fold(exterior),
            Self::Collection(parts) => parts
                .iter()
                .filter_map(Self::bounds)
                .reduce(BoundingBox::union),
        }
    }

    /// Area in square metres on a local equirectangular projection.
    #[must_use]
    pub fn area_m2(&self) -> f64 {
        match self {
            Self::Point(_) | Self::LineString(_) => 0.0,
            Self::Polygon { exterior, holes } => {
                ring_area_m2(exterior) - holes.iter().map(|h| ring_area_m2(h)).sum::<f64>()
            }
            Self::Collection(parts) => parts.iter().map(Self::area_m2).sum(),
        }
    }

    /// Length in metres; the perimeter for polygons.
    #[must_use]
    pub fn length_m(&self) -> f64 {
        let path = |points: &[Coordinate]| -> f64 {
            points.windows(2).map(|w| w[0].distance_m(w[1])).sum()
        };
        match self {
            Self::Point(_) => 0.0,
            Self::LineString(points) => path(points),
            Self::Polygon { exterior, .. } => path(exterior),
            Self::Collection(parts) => parts.iter().map(Self::length_m).sum(),
        }
    }
}

fn check_ring(ring: &[Coordinate]) -> Result<(), GeometryError> {
    if ring.len() < 4 {
        return Err(GeometryError::DegenerateRing { points: ring.len() });
    }
    if ring.first() != ring.last() {
        return Err(GeometryError::UnclosedRing);
    }
    if ring_area_m2(ring) == 0.0 {
        return Err(GeometryError::DegenerateRing { points: ring.len() });
    }
    Ok(())
}

fn ring_area_m2(ring: &[Coordinate]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mean_lat = ring.iter().map(|c| c.lat_degrees()).sum::<f64>() / ring.len() as f64;
    let metres_per_degree = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
    let x_scale = metres_per_degree * mean_lat.to_radians().cos();
    let doubled: f64 = ring
        .windows(2)
        .map(|w| {
            let (x0, y0) = (w[0].lon_degrees() * x_scale, w[0].lat_degrees() * metres_per_degree);
            let (x1, y1) = (w[1].lon_degrees() * x_scale, w[1].lat_degrees() * metres_per_degree);
            x0 * y1 - x1 * y0
        })
        .sum();
    (doubled / 2.0).abs()
}
