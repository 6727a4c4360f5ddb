//! Cell directory: which positions of a cell-ordered index belong to which
//! grid cell.
//!
//! Entities are numbered in ascending `(cell, id)` order and a paged index
//! maps each position back to its entity id. The directory keeps one run
//! per occupied cell, so an area lookup only touches the positions of
//! cells that intersect the area.

use std::ops::Range;

use geohist_entity::BoundingBox;
use serde::{Deserialize, Serialize};

use crate::{CellId, IndexError, IndexResult, XyGrid};

/// Consecutive positions filed under one cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRun {
    /// Raw [`CellId`].
    pub cell: i64,
    pub start: u64,
    pub len: u64,
}

impl CellRun {
    #[must_use]
    pub const fn positions(&self) -> Range<u64> {
        self.start..self.start + self.len
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellDirectory {
    runs: Vec<CellRun>,
}

impl CellDirectory {
    /// Directory for positions `0..n` whose cells are given in position
    /// order. Cells must not decrease.
    pub fn from_sorted(cells: impl IntoIterator<Item = CellId>) -> IndexResult<Self> {
        let mut runs: Vec<CellRun> = Vec::new();
        let mut position = 0u64;
        for cell in cells {
            let raw = cell.as_raw();
            match runs.last_mut() {
                Some(run) if run.cell == raw => run.len += 1,
                Some(run) if run.cell > raw => {
                    return Err(IndexError::Directory("cells must be in ascending order"));
                }
                _ => runs.push(CellRun {
                    cell: raw,
                    start: position,
                    len: 1,
                }),
            }
            position += 1;
        }
        Ok(Self { runs })
    }

    pub fn runs(&self) -> &[CellRun] {
        &self.runs
    }

    /// Total positions covered.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.runs.last().map_or(0, |run| run.start + run.len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Checks what deserialization cannot: valid cells, strictly ascending,
    /// non-empty runs that tile `0..len()`.
    pub fn validate(&self) -> IndexResult<()> {
        let mut next = 0u64;
        let mut previous: Option<i64> = None;
        for run in &self.runs {
            if CellId::from_raw(run.cell).is_none() {
                return Err(IndexError::Directory("run names an invalid cell"));
            }
            if previous.is_some_and(|p| p >= run.cell) {
                return Err(IndexError::Directory("cells must be in ascending order"));
            }
            if run.len == 0 || run.start != next {
                return Err(IndexError::Directory("runs must tile the positions"));
            }
            next = run
                .start
                .checked_add(run.len)
                .ok_or(IndexError::Directory("run overflows the position range"))?;
            previous = Some(run.cell);
        }
        Ok(())
    }

    /// Runs whose cell intersects `area`, in ascending cell order.
    ///
    /// Per zoom level either the covered rows are looked up one by one or
    /// the level's runs are scanned, whichever is fewer.
    #[must_use]
    pub fn runs_intersecting(&self, grid: &XyGrid, area: &BoundingBox) -> Vec<CellRun> {
        let mut found = Vec::new();
        for zoom in 0..=XyGrid::MAX_ZOOM {
            let level = self.range(zoom_start(zoom), zoom_start(zoom + 1));
            if level.is_empty() {
                continue;
            }
            if zoom > grid.max_zoom() || grid.rows_covered(zoom, area) as usize > level.len() {
                found.extend(level.iter().filter(|run| {
                    CellId::from_raw(run.cell).is_some_and(|cell| cell.bounds().intersects(area))
                }));
            } else {
                for (first, last) in grid.rows_covering(zoom, area) {
                    found.extend_from_slice(self.range(first.as_raw(), last.as_raw() + 1));
                }
            }
        }
        found
    }

    /// Runs with `start <= cell < end`.
    fn range(&self, start: i64, end: i64) -> &[CellRun] {
        let low = self.runs.partition_point(|run| run.cell < start);
        let high = self.runs.partition_point(|run| run.cell < end);
        &self.runs[low..high.max(low)]
    }
}

/// Smallest raw id at `zoom`.
const fn zoom_start(zoom: u8) -> i64 {
    (zoom as i64) << 56
}
