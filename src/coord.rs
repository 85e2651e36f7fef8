use std::fmt;
use std::str::FromStr;

use geo::{Destination, Geodesic};
use geo_types::Point;
use serde::{Deserialize, Serialize};

use crate::error::GridError;

/// WGS84 longitude/latitude pair in degrees.
///
/// Value semantics: `offset` returns a new point. `offset_in_place` exists for
/// the row walk during grid construction, where each step starts from the
/// previous result.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lon: f64,
    pub lat: f64,
}

impl Coordinate {
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Point `distance_m` meters away along `dir`, solved on the WGS84
    /// ellipsoid (Karney forward geodesic).
    pub fn offset(&self, distance_m: f64, dir: Direction) -> Coordinate {
        let p = Geodesic::destination(self.point(), dir.degrees(), distance_m);
        Coordinate::new(p.x(), p.y())
    }

    pub fn offset_in_place(&mut self, distance_m: f64, dir: Direction) -> &mut Self {
        *self = self.offset(distance_m, dir);
        self
    }

    #[inline]
    pub fn point(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }

    pub fn is_valid(&self) -> bool {
        self.lon.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lon)
            && (-90.0..=90.0).contains(&self.lat)
    }
}

/// The eight compass directions of the grid mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
        Direction::NorthEast,
        Direction::NorthWest,
        Direction::SouthEast,
        Direction::SouthWest,
    ];

    /// Compass bearing: 0 = north, 90 = east.
    pub fn degrees(self) -> f64 {
        match self {
            Direction::North => 0.0,
            Direction::NorthEast => 45.0,
            Direction::East => 90.0,
            Direction::SouthEast => 135.0,
            Direction::South => 180.0,
            Direction::SouthWest => 225.0,
            Direction::West => 270.0,
            Direction::NorthWest => 315.0,
        }
    }

    /// (row, column) step. Rows grow southward, columns eastward.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::North => (-1, 0),
            Direction::NorthEast => (-1, 1),
            Direction::East => (0, 1),
            Direction::SouthEast => (1, 1),
            Direction::South => (1, 0),
            Direction::SouthWest => (1, -1),
            Direction::West => (0, -1),
            Direction::NorthWest => (-1, -1),
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::NorthEast => Direction::SouthWest,
            Direction::East => Direction::West,
            Direction::SouthEast => Direction::NorthWest,
            Direction::South => Direction::North,
            Direction::SouthWest => Direction::NorthEast,
            Direction::West => Direction::East,
            Direction::NorthWest => Direction::SouthEast,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::NorthEast => "northeast",
            Direction::East => "east",
            Direction::SouthEast => "southeast",
            Direction::South => "south",
            Direction::SouthWest => "southwest",
            Direction::West => "west",
            Direction::NorthWest => "northwest",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Direction {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "north" | "n" => Ok(Direction::North),
            "northeast" | "ne" => Ok(Direction::NorthEast),
            "east" | "e" => Ok(Direction::East),
            "southeast" | "se" => Ok(Direction::SouthEast),
            "south" | "s" => Ok(Direction::South),
            "southwest" | "sw" => Ok(Direction::SouthWest),
            "west" | "w" => Ok(Direction::West),
            "northwest" | "nw" => Ok(Direction::NorthWest),
            _ => Err(GridError::InvalidBearing(s.to_string())),
        }
    }
}
