//! Zoom-level quadrant grid over longitude/latitude.
//!
//! Zoom `z` splits the world into `2^z × 2^z` cells. An entity is assigned
//! to the deepest cell that still contains its whole bounding box, so a
//! cell that does not intersect an area of interest rules out every entity
//! assigned to it.

use std::fmt;

use geohist_entity::{BoundingBox, Coordinate};

use crate::{GridConfig, IndexError, IndexResult};

const LON_MIN: i64 = -1_800_000_000;
const LON_SPAN: u64 = 3_600_000_000;
const LAT_MIN: i64 = -900_000_000;
const LAT_SPAN: u64 = 1_800_000_000;

/// One grid cell.
///
/// Packs into a non-negative `i64` so it can be stored as an index value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellId {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl CellId {
    #[must_use]
    pub const fn as_raw(self) -> i64 {
        ((self.zoom as i64) << 56) | ((self.y as i64) << 28) | self.x as i64
    }

    /// `None` unless `raw` names a valid cell.
    #[must_use]
    pub fn from_raw(raw: i64) -> Option<Self> {
        if raw < 0 {
            return None;
        }
        let zoom = u8::try_from(raw >> 56).ok()?;
        let cell = Self {
            zoom,
            x: (raw & 0x0fff_ffff) as u32,
            y: ((raw >> 28) & 0x0fff_ffff) as u32,
        };
        (zoom <= XyGrid::MAX_ZOOM && cell.x < 1 << zoom && cell.y < 1 << zoom).then_some(cell)
    }

    /// The area this cell covers, edges inclusive.
    #[must_use]
    pub fn bounds(self) -> BoundingBox {
        let (min_lon, max_lon) = axis_bounds(self.x, LON_MIN, LON_SPAN, self.zoom);
        let (min_lat, max_lat) = axis_bounds(self.y, LAT_MIN, LAT_SPAN, self.zoom);
        BoundingBox {
            min: Coordinate::new(min_lon, min_lat),
            max: Coordinate::new(max_lon, max_lat),
        }
    }

    /// The cell one zoom level up, `None` at zoom 0.
    #[must_use]
    pub const fn parent(self) -> Option<Self> {
        if self.zoom == 0 {
            return None;
        }
        Some(Self {
            zoom: self.zoom - 1,
            x: self.x >> 1,
            y: self.y >> 1,
        })
    }
}

impl fmt::Debug for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The world grid, down to a configured maximum zoom.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct XyGrid {
    max_zoom: u8,
}

impl XyGrid {
    pub const MAX_ZOOM: u8 = 28;

    pub fn new(config: &GridConfig) -> IndexResult<Self> {
        if config.max_zoom > Self::MAX_ZOOM {
            return Err(IndexError::Config("grid max_zoom must be at most 28"));
        }
        Ok(Self {
            max_zoom: config.max_zoom,
        })
    }

    #[must_use]
    pub const fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    /// Cells per axis at `zoom`.
    #[must_use]
    pub const fn width(zoom: u8) -> u32 {
        1 << zoom
    }

    /// Cell containing `c` at `zoom` (clamped to `max_zoom`). Coordinates
    /// outside the world are clamped onto its edge.
    #[must_use]
    pub fn cell_at(&self, zoom: u8, c: Coordinate) -> CellId {
        let zoom = zoom.min(self.max_zoom);
        CellId {
            zoom,
            x: axis_index(c.lon, LON_MIN, LON_SPAN, zoom),
            y: axis_index(c.lat, LAT_MIN, LAT_SPAN, zoom),
        }
    }

    /// Deepest cell that contains the whole box.
    #[must_use]
    pub fn enclosing_cell(&self, bounds: &BoundingBox) -> CellId {
        let mut low = self.cell_at(self.max_zoom, bounds.min);
        let mut high = self.cell_at(self.max_zoom, bounds.max);
        while low != high {
            // Both reach 0/0/0 together, where they are equal.
            match (low.parent(), high.parent()) {
                (Some(l), Some(h)) => {
                    low = l;
                    high = h;
                }
                _ => break,
            }
        }
        low
    }

    /// Cells at `zoom` intersecting `bounds`, row by row.
    pub fn cells_covering(&self, zoom: u8, bounds: &BoundingBox) -> impl Iterator<Item = CellId> {
        self.rows_covering(zoom, bounds).flat_map(|(first, last)| {
            (first.x..=last.x).map(move |x| CellId { x, ..first })
        })
    }

    /// First and last cell of each row at `zoom` intersecting `bounds`.
    /// Within a row, raw ids of the cells in between are contiguous.
    pub fn rows_covering(&self, zoom: u8, bounds: &BoundingBox) -> impl Iterator<Item = (CellId, CellId)> {
        let low = self.cell_at(zoom, bounds.min);
        let high = self.cell_at(zoom, bounds.max);
        (low.y..=high.y).map(move |y| (CellId { y, ..low }, CellId { y, ..high }))
    }

    /// Number of rows [`rows_covering`](Self::rows_covering) yields.
    #[must_use]
    pub fn rows_covered(&self, zoom: u8, bounds: &BoundingBox) -> u32 {
        self.cell_at(zoom, bounds.max).y - self.cell_at(zoom, bounds.min).y + 1
    }
}

fn axis_index(value: i32, min: i64, span: u64, zoom: u8) -> u32 {
    let offset = (i64::from(value) - min).clamp(0, span as i64) as u64;
    let index = (offset << zoom) / span;
    index.min(u64::from(XyGrid::width(zoom)) - 1) as u32
}

/// Inclusive `(min, max)` of the values `axis_index` maps to `index`.
fn axis_bounds(index: u32, min: i64, span: u64, zoom: u8) -> (i32, i32) {
    let cells = 1u64 << zoom;
    let start = (u64::from(index) * span).div_ceil(cells);
    let end = if u64::from(index) + 1 >= cells {
        span
    } else {
        (u64::from(index + 1) * span).div_ceil(cells) - 1
    };
    ((min + start as i64) as i32, (min + end as i64) as i32)
}
