use std::collections::BTreeMap;

use geo_types::{Rect, coord};

use crate::attr::AttrValue;
use crate::coord::{Coordinate, Direction};

/// One rectangular grid cell.
///
/// Neighbors are not stored: the owning `GridIndex` derives them from the
/// row-major index.
#[derive(Clone, Debug, PartialEq)]
pub struct GridCell {
    pub index: usize,
    pub center: Coordinate,
    pub size_m: f64,
    attrs: BTreeMap<String, AttrValue>,
}

/// The four corners of a cell, each reached from the center by a half-cell
/// north/south leg followed by a half-cell east/west leg.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellBounds {
    pub top_left: Coordinate,
    pub top_right: Coordinate,
    pub bottom_left: Coordinate,
    pub bottom_right: Coordinate,
}

impl CellBounds {
    /// Half-open containment: the south and west edges belong to the cell,
    /// the north and east edges to the neighbors across them.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.bottom_right.lat <= lat
            && lat < self.top_left.lat
            && self.top_left.lon <= lon
            && lon < self.bottom_right.lon
    }

    /// Axis-aligned lon/lat polygon used for line intersection.
    pub fn rect(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.top_left.lon, y: self.top_left.lat },
            coord! { x: self.bottom_right.lon, y: self.bottom_right.lat },
        )
    }
}

impl GridCell {
    pub fn new(index: usize, center: Coordinate, size_m: f64) -> Self {
        Self {
            index,
            center,
            size_m,
            attrs: BTreeMap::new(),
        }
    }

    pub fn bounds(&self) -> CellBounds {
        let half = self.size_m / 2.0;
        let north = self.center.offset(half, Direction::North);
        let south = self.center.offset(half, Direction::South);
        CellBounds {
            top_left: north.offset(half, Direction::West),
            top_right: north.offset(half, Direction::East),
            bottom_left: south.offset(half, Direction::West),
            bottom_right: south.offset(half, Direction::East),
        }
    }

    pub fn has(&self, lon: f64, lat: f64) -> bool {
        self.bounds().contains(lon, lat)
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttrValue> {
        &self.attrs
    }

    /// Accumulate into `key`. On a kind mismatch nothing is written and
    /// false is returned.
    pub fn upsert(&mut self, key: &str, value: AttrValue) -> bool {
        match self.attrs.get_mut(key) {
            Some(existing) => existing.accumulate(&value),
            None => {
                self.attrs.insert(key.to_string(), value);
                true
            }
        }
    }

    /// Overwrite `key`.
    pub fn set(&mut self, key: &str, value: AttrValue) {
        self.attrs.insert(key.to_string(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<AttrValue> {
        self.attrs.remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell() -> GridCell {
        GridCell::new(0, Coordinate::new(127.0275, 37.4978), 100.0)
    }

    #[test]
    fn center_is_inside_and_far_points_are_not() {
        let c = cell();
        assert!(c.has(c.center.lon, c.center.lat));
        let away = c.center.offset(80.0, Direction::North);
        assert!(!c.has(away.lon, away.lat));
        let near = c.center.offset(40.0, Direction::East);
        assert!(c.has(near.lon, near.lat));
    }

    #[test]
    fn edges_are_half_open() {
        let c = cell();
        let b = c.bounds();
        assert!(c.has(b.top_left.lon, c.center.lat));
        assert!(!c.has(b.bottom_right.lon, c.center.lat));
        assert!(c.has(c.center.lon, b.bottom_right.lat));
        assert!(!c.has(c.center.lon, b.top_left.lat));
    }

    #[test]
    fn corners_are_ordered() {
        let b = cell().bounds();
        assert!(b.top_left.lat > b.bottom_left.lat);
        assert!(b.top_left.lon < b.top_right.lon);
        assert!(b.bottom_left.lon < b.bottom_right.lon);
        let r = b.rect();
        assert!(r.min().x < r.max().x && r.min().y < r.max().y);
    }

    #[test]
    fn upsert_accumulates_and_set_overwrites() {
        let mut c = cell();
        assert!(c.upsert("amount", AttrValue::Number(3.0)));
        assert!(c.upsert("amount", AttrValue::Number(4.0)));
        assert_eq!(c.get("amount"), Some(&AttrValue::Number(7.0)));
        assert!(!c.upsert("amount", AttrValue::from("x")));

        c.set("amount", AttrValue::Number(1.0));
        assert_eq!(c.get("amount"), Some(&AttrValue::Number(1.0)));
        assert_eq!(c.remove("amount"), Some(AttrValue::Number(1.0)));
        assert!(c.get("amount").is_none());
    }
}
