use serde::{Deserialize, Serialize};

use crate::attr::ValueKind;
use crate::coord::Coordinate;
use crate::diffusion::DecayRule;
use crate::error::{GridError, Result};
use crate::index::dimensions;
use crate::join::Row;

/// Largest grid `GridParams::validate` accepts, in cells. Covers Seoul at
/// 15 m cells.
pub const MAX_CELLS: usize = 8_000_000;

/// Seoul City Hall.
pub const SEOUL_CITY_HALL: Coordinate = Coordinate::new(126.97802575206804, 37.56568179655075);
/// Gangnam Station.
pub const GANGNAM_STATION: Coordinate = Coordinate::new(127.02748954296155, 37.49781140190337);

/// Extents in kilometers from the start coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Boundary {
    pub up: f64,
    pub down: f64,
    pub left: f64,
    pub right: f64,
}

impl Boundary {
    /// Whole of Seoul, measured from City Hall.
    pub const SEOUL: Boundary = Boundary { up: 13.0, down: 18.0, left: 20.0, right: 18.0 };
    /// Gangnam business district, measured from Gangnam Station.
    pub const GANGNAM: Boundary = Boundary { up: 4.0, down: 3.0, left: 2.0, right: 4.0 };

    pub const fn uniform(km: f64) -> Self {
        Self { up: km, down: km, left: km, right: km }
    }
}

/// Grid construction parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridParams {
    pub start: Coordinate,
    pub boundary: Boundary,
    pub cell_size_m: f64,
    /// Only used to label exported tables.
    pub name: String,
}

impl GridParams {
    pub fn seoul(cell_size_m: f64) -> Self {
        Self {
            start: SEOUL_CITY_HALL,
            boundary: Boundary::SEOUL,
            cell_size_m,
            name: "Seoul".into(),
        }
    }

    pub fn gangnam(cell_size_m: f64) -> Self {
        Self {
            start: GANGNAM_STATION,
            boundary: Boundary::GANGNAM,
            cell_size_m,
            name: "Gangnam".into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.start.is_valid() {
            return Err(GridError::Config(format!(
                "start ({}, {}) is not a valid lon/lat",
                self.start.lon, self.start.lat
            )));
        }
        if !(self.cell_size_m.is_finite() && self.cell_size_m > 0.0) {
            return Err(GridError::Config(format!(
                "cell size must be positive, got {}",
                self.cell_size_m
            )));
        }
        let b = &self.boundary;
        for (side, km) in [("up", b.up), ("down", b.down), ("left", b.left), ("right", b.right)] {
            if !(km.is_finite() && km >= 0.0) {
                return Err(GridError::Config(format!("boundary `{side}` must be >= 0, got {km}")));
            }
        }
        let (n, m) = dimensions(b, self.cell_size_m);
        match n.checked_mul(m) {
            Some(cells) if cells <= MAX_CELLS => Ok(()),
            _ => Err(GridError::Config(format!(
                "{n}x{m} grid exceeds the {MAX_CELLS} cell limit; use larger cells or a smaller boundary"
            ))),
        }
    }
}

impl Default for GridParams {
    fn default() -> Self {
        Self::gangnam(100.0)
    }
}

/// How a layer's rows locate themselves on the grid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeometrySpec {
    Point { lon_column: String, lat_column: String },
    Line { column: String },
}

/// One attribute materialized from external rows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub attribute: String,
    pub kind: ValueKind,
    pub value_column: String,
    pub geometry: GeometrySpec,
    #[serde(default)]
    pub rows: Vec<Row>,
}

/// Where a diffusion starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSpec {
    /// Every cell matched by the layer pushing this attribute.
    Layer(String),
    Cells(Vec<usize>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiffusionSpec {
    pub attribute: String,
    pub sources: SourceSpec,
    /// Hop budget. Takes precedence over `distance_m`.
    #[serde(default)]
    pub steps: Option<u32>,
    #[serde(default)]
    pub distance_m: Option<f64>,
    pub decay: DecayRule,
    #[serde(default)]
    pub initial_value: Option<f64>,
}

/// A full pipeline: build, join, push, diffuse, export.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub grid: GridParams,
    #[serde(default)]
    pub layers: Vec<LayerSpec>,
    #[serde(default)]
    pub diffusions: Vec<DiffusionSpec>,
    /// Attributes to export; empty means every layer attribute.
    #[serde(default)]
    pub export: Vec<String>,
}

impl Scenario {
    pub fn export_attributes(&self) -> Vec<String> {
        if !self.export.is_empty() {
            return self.export.clone();
        }
        let mut out: Vec<String> = Vec::new();
        for layer in &self.layers {
            if !out.contains(&layer.attribute) {
                out.push(layer.attribute.clone());
            }
        }
        out
    }
}
