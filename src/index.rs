use std::collections::HashMap;
use std::fmt::Write as _;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::attr::{AttrValue, ValueKind};
use crate::cell::GridCell;
use crate::config::{Boundary, GridParams};
use crate::coord::{Coordinate, Direction};
use crate::error::{GridError, Result};
use crate::grid::Grid;

/// The n x m cell mesh over a boundary.
///
/// Cells live in a row-major `Grid` (row 0 = northern band, column 0 =
/// western band) and are addressed by flat index `row * m + col`. Adjacency
/// is index arithmetic, so the mesh has no stored back-references.
#[derive(Clone, Debug)]
pub struct GridIndex {
    name: String,
    start: Coordinate,
    boundary: Boundary,
    cell_size_m: f64,
    cells: Grid<GridCell>,
}

/// Row and column counts for a boundary and cell size:
/// `ceil(extent_m / cell) + 1` along each axis.
pub fn dimensions(boundary: &Boundary, cell_size_m: f64) -> (usize, usize) {
    let n = (((boundary.up + boundary.down) * 1000.0 / cell_size_m).ceil() as usize).saturating_add(1);
    let m = (((boundary.left + boundary.right) * 1000.0 / cell_size_m).ceil() as usize).saturating_add(1);
    (n, m)
}

impl GridIndex {
    pub fn new(params: &GridParams) -> Result<Self> {
        params.validate()?;
        let cell = params.cell_size_m;
        let (n, m) = dimensions(&params.boundary, cell);

        // One extra cell west so the first eastward step lands on column 0.
        let anchor = params
            .start
            .offset(params.boundary.up * 1000.0, Direction::North)
            .offset(params.boundary.left * 1000.0, Direction::West)
            .offset(cell, Direction::West);

        let centers: Vec<Coordinate> = (0..n)
            .into_par_iter()
            .flat_map_iter(|i| {
                let mut walker = anchor.offset(i as f64 * cell, Direction::South);
                (0..m).map(move |_| *walker.offset_in_place(cell, Direction::East))
            })
            .collect();

        let cells: Vec<GridCell> = centers
            .into_iter()
            .enumerate()
            .map(|(i, c)| GridCell::new(i, c, cell))
            .collect();

        info!(name = %params.name, n, m, cell_size_m = cell, "grid built");

        Ok(Self {
            name: params.name.clone(),
            start: params.start,
            boundary: params.boundary,
            cell_size_m: cell,
            cells: Grid::from_vec(cells, m, n),
        })
    }

    /// Row count (north-south bands).
    #[inline]
    pub fn n(&self) -> usize {
        self.cells.h
    }

    /// Column count (west-east bands).
    #[inline]
    pub fn m(&self) -> usize {
        self.cells.w
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> Coordinate {
        self.start
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    pub fn cell_size_m(&self) -> f64 {
        self.cell_size_m
    }

    /// Table label, e.g. `Gangnam_71by61grid_100size`.
    pub fn label(&self) -> String {
        format!(
            "{}_{}by{}grid_{}size",
            self.name,
            self.n(),
            self.m(),
            self.cell_size_m
        )
    }

    pub fn cell(&self, i: usize) -> Option<&GridCell> {
        self.cells.data.get(i)
    }

    pub fn cell_mut(&mut self, i: usize) -> Option<&mut GridCell> {
        self.cells.data.get_mut(i)
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.cells.data
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [GridCell] {
        &mut self.cells.data
    }

    pub(crate) fn check_index(&self, i: usize) -> Result<()> {
        if i < self.len() {
            Ok(())
        } else {
            Err(GridError::CellOutOfRange { index: i, len: self.len() })
        }
    }

    /// Neighbor of `i` along `dir`; `None` at the grid edge.
    pub fn neighbor(&self, i: usize, dir: Direction) -> Option<usize> {
        if i >= self.len() {
            return None;
        }
        self.cells.step(i, dir)
    }

    /// All existing neighbors of `i` (3 at corners, 5 on edges, 8 inside).
    /// Empty for an index past the end.
    pub fn neighbors(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        (i < self.len())
            .then(|| self.cells.neighbors8(i))
            .into_iter()
            .flatten()
    }

    /// Hop budget covering `meters`, rounded up to whole cells.
    pub fn steps_for_distance(&self, meters: f64) -> u32 {
        if !(meters.is_finite() && meters > 0.0) {
            return 0;
        }
        (meters / self.cell_size_m).ceil() as u32
    }

    /// Accumulate `values` under `attribute` and give every other cell the
    /// empty value of `kind`, so the attribute is defined grid-wide.
    ///
    /// Text values are appended with a leading space. The whole input is
    /// validated before any cell is touched.
    pub fn push_attributes(
        &mut self,
        values: &HashMap<usize, AttrValue>,
        attribute: &str,
        kind: ValueKind,
    ) -> Result<()> {
        for (&i, v) in values {
            self.check_index(i)?;
            if v.kind() != kind {
                return Err(GridError::KindMismatch {
                    attribute: attribute.to_string(),
                    cell: i,
                    expected: kind.label(),
                });
            }
        }
        if let Some(c) = self
            .cells()
            .iter()
            .find(|c| c.get(attribute).is_some_and(|v| v.kind() != kind))
        {
            return Err(GridError::KindMismatch {
                attribute: attribute.to_string(),
                cell: c.index,
                expected: kind.label(),
            });
        }

        for cell in self.cells_mut() {
            let value = match values.get(&cell.index) {
                Some(AttrValue::Text(s)) => AttrValue::Text(format!(" {s}")),
                Some(v) => v.clone(),
                None => kind.empty(),
            };
            if values.contains_key(&cell.index) {
                debug!(cell = cell.index, attribute, value = %value, "push");
            }
            cell.upsert(attribute, value);
        }
        Ok(())
    }

    /// Cell containing (lon, lat), found by binary search over row latitudes
    /// and the row's longitudes, then confirmed with `has` on the nearby
    /// cells. Same answer as `locate_scan` in O(log n + log m).
    pub fn locate(&self, lon: f64, lat: f64) -> Option<usize> {
        if !(lon.is_finite() && lat.is_finite()) || self.is_empty() {
            return None;
        }
        let r = self.row_at(lat);
        for row in r.saturating_sub(1)..=(r + 1).min(self.n() - 1) {
            let c = self.col_at(row, lon);
            for col in c.saturating_sub(1)..=(c + 1).min(self.m() - 1) {
                let i = self.cells.idx(col, row);
                if self.cells.data[i].has(lon, lat) {
                    return Some(i);
                }
            }
        }
        None
    }

    /// Brute-force containment scan in index order.
    pub fn locate_scan(&self, lon: f64, lat: f64) -> Option<usize> {
        self.cells().iter().position(|c| c.has(lon, lat))
    }

    /// Cells whose neighborhood may touch the lon/lat box, in index order.
    pub(crate) fn candidates_in_box(
        &self,
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    ) -> Vec<usize> {
        if self.is_empty() {
            return Vec::new();
        }
        let r0 = self.row_at(max_lat).saturating_sub(1);
        let r1 = (self.row_at(min_lat) + 1).min(self.n() - 1);
        let mut out = Vec::new();
        for row in r0..=r1 {
            let c0 = self.col_at(row, min_lon).saturating_sub(1);
            let c1 = (self.col_at(row, max_lon) + 1).min(self.m() - 1);
            out.extend((c0..=c1).map(|col| self.cells.idx(col, row)));
        }
        out
    }

    /// First row whose column-0 center is not north of `lat`, clamped.
    fn row_at(&self, lat: f64) -> usize {
        let (m, n) = (self.m(), self.n());
        let (mut lo, mut hi) = (0, n);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.cells.data[mid * m].center.lat > lat {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo.min(n - 1)
    }

    /// First column of `row` whose center is not west of `lon`, clamped.
    fn col_at(&self, row: usize, lon: f64) -> usize {
        let c = self.cells.row(row).partition_point(|cell| cell.center.lon < lon);
        c.min(self.m() - 1)
    }

    /// ASCII box of the 3x3 neighborhood of `i`, followed by its attributes.
    pub fn neighborhood(&self, i: usize) -> Option<String> {
        let cell = self.cell(i)?;
        let label = |d: Option<Direction>| -> String {
            match d {
                None => i.to_string(),
                Some(d) => self.neighbor(i, d).map(|j| j.to_string()).unwrap_or_default(),
            }
        };
        use Direction::*;
        let layout = [
            [Some(NorthWest), Some(North), Some(NorthEast)],
            [Some(West), None, Some(East)],
            [Some(SouthWest), Some(South), Some(SouthEast)],
        ];
        let labels: Vec<Vec<String>> = layout
            .iter()
            .map(|row| row.iter().map(|&d| label(d)).collect())
            .collect();
        let pad = labels.iter().flatten().map(String::len).max().unwrap_or(1);
        let rule = format!("+{}", format!("{}+", "-".repeat(pad + 2)).repeat(3));

        let mut out = String::new();
        let _ = writeln!(out, "{rule}");
        for row in &labels {
            for s in row {
                let _ = write!(out, "| {s:<pad$} ");
            }
            let _ = writeln!(out, "|");
            let _ = writeln!(out, "{rule}");
        }
        let _ = write!(out, "{:?}", cell.attributes());
        Some(out)
    }
}
