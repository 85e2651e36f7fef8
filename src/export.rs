use serde::Serialize;

use crate::attr::AttrValue;
use crate::error::{GridError, Result};
use crate::grid::Grid;
use crate::index::GridIndex;

/// One attribute laid out as the grid: rows north to south, columns west to
/// east. Cells without the attribute are `None` (null in JSON).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DenseTable {
    pub name: String,
    pub attribute: String,
    pub rows: Vec<Vec<Option<AttrValue>>>,
}

impl DenseTable {
    pub fn get(&self, row: usize, col: usize) -> Option<&AttrValue> {
        self.rows.get(row)?.get(col)?.as_ref()
    }
}

/// Row-per-cell table for map visualization tools.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlatTable {
    pub name: String,
    /// `cell_index`, the requested attributes, `lon`, `lat`.
    pub columns: Vec<String>,
    pub rows: Vec<CellRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CellRecord {
    pub cell_index: usize,
    pub values: Vec<AttrValue>,
    pub lon: f64,
    pub lat: f64,
}

impl GridIndex {
    pub fn dense_table(&self, attribute: &str) -> DenseTable {
        let cells = self.attribute_grid(attribute);
        DenseTable {
            name: self.label(),
            attribute: attribute.to_string(),
            rows: cells.rows().map(<[_]>::to_vec).collect(),
        }
    }

    /// The attribute per cell as a row-major grid.
    pub fn attribute_grid(&self, attribute: &str) -> Grid<Option<AttrValue>> {
        Grid::from_vec(
            self.cells().iter().map(|c| c.get(attribute).cloned()).collect(),
            self.m(),
            self.n(),
        )
    }

    /// Numeric view for rendering: text and missing values become NaN.
    pub fn numeric_grid(&self, attribute: &str) -> Grid<f64> {
        Grid::from_vec(
            self.cells()
                .iter()
                .map(|c| c.get(attribute).and_then(AttrValue::as_number).unwrap_or(f64::NAN))
                .collect(),
            self.m(),
            self.n(),
        )
    }

    /// Every cell with the requested attributes and its center. Each
    /// attribute must be defined on every cell.
    pub fn flat_table(&self, attributes: &[String]) -> Result<FlatTable> {
        let rows = self
            .cells()
            .iter()
            .map(|c| {
                let values = attributes
                    .iter()
                    .map(|a| {
                        c.get(a).cloned().ok_or_else(|| GridError::MissingAttribute {
                            attribute: a.clone(),
                            cell: c.index,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(CellRecord {
                    cell_index: c.index,
                    values,
                    lon: c.center.lon,
                    lat: c.center.lat,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut columns = Vec::with_capacity(attributes.len() + 3);
        columns.push("cell_index".to_string());
        columns.extend(attributes.iter().cloned());
        columns.push("lon".to_string());
        columns.push("lat".to_string());

        Ok(FlatTable {
            name: self.label(),
            columns,
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::attr::ValueKind;
    use crate::config::{Boundary, GANGNAM_STATION, GridParams};

    fn grid() -> GridIndex {
        GridIndex::new(&GridParams {
            start: GANGNAM_STATION,
            boundary: Boundary::uniform(1.0),
            cell_size_m: 100.0,
            name: "export".into(),
        })
        .unwrap()
    }

    #[test]
    fn dense_round_trip_places_center_value() {
        let mut g = grid();
        g.push_attributes(
            &HashMap::from([(220, AttrValue::Number(500.0))]),
            "amount",
            ValueKind::Number,
        )
        .unwrap();
        let t = g.dense_table("amount");
        assert_eq!(t.name, "export_21by21grid_100size");
        assert_eq!(t.rows.len(), 21);
        assert!(t.rows.iter().all(|r| r.len() == 21));
        for (i, row) in t.rows.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                let want = if (i, j) == (10, 10) { 500.0 } else { 0.0 };
                assert_eq!(v, &Some(AttrValue::Number(want)));
            }
        }
        assert_eq!(t.get(10, 10), Some(&AttrValue::Number(500.0)));
    }

    #[test]
    fn unset_attribute_renders_null() {
        let g = grid();
        let t = g.dense_table("nothing");
        assert!(t.rows.iter().flatten().all(Option::is_none));
        let json = serde_json::to_value(&t).unwrap();
        assert!(json["rows"][0][0].is_null());
        assert!(g.numeric_grid("nothing").data.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn flat_table_lists_every_cell() {
        let mut g = grid();
        g.push_attributes(
            &HashMap::from([(7, AttrValue::Number(2.0))]),
            "amount",
            ValueKind::Number,
        )
        .unwrap();
        g.push_attributes(&HashMap::from([(7, AttrValue::from("cafe"))]), "biz", ValueKind::Text)
            .unwrap();

        let t = g.flat_table(&["amount".into(), "biz".into()]).unwrap();
        assert_eq!(t.columns, vec!["cell_index", "amount", "biz", "lon", "lat"]);
        assert_eq!(t.rows.len(), 441);
        let r = &t.rows[7];
        assert_eq!(r.cell_index, 7);
        assert_eq!(r.values, vec![AttrValue::Number(2.0), AttrValue::from(" cafe")]);
        assert_eq!((r.lon, r.lat), (g.cells()[7].center.lon, g.cells()[7].center.lat));

        assert!(matches!(
            g.flat_table(&["missing".into()]),
            Err(GridError::MissingAttribute { .. })
        ));
    }
}
