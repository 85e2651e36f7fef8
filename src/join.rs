//! Spatial join of external rows onto grid cells.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};

use geo::{BoundingRect, Intersects};
use geo_types::{Coord, LineString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::attr::{AttrValue, ValueKind};
use crate::error::{GridError, Result};
use crate::index::GridIndex;

/// One external row: column name -> value.
pub type Row = serde_json::Map<String, Value>;

/// A row paired with the cell it landed in.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Matched {
    pub cell: usize,
    pub row: Row,
}

/// Pair each row with the cell containing its (lon, lat).
///
/// Rows outside the grid or with null coordinates are dropped. A point
/// lands in at most one cell.
pub fn match_point(
    grid: &GridIndex,
    rows: &[Row],
    lon_column: &str,
    lat_column: &str,
) -> Result<Vec<Matched>> {
    let mut out = Vec::new();
    for (n, row) in rows.iter().enumerate() {
        let lon = number(row, lon_column)?;
        let lat = number(row, lat_column)?;
        let (Some(lon), Some(lat)) = (lon, lat) else {
            debug!(row = n, "null coordinate, dropped");
            continue;
        };
        match grid.locate(lon, lat) {
            Some(cell) => {
                debug!(row = n, cell, "matched point");
                out.push(Matched { cell, row: row.clone() });
            }
            None => debug!(row = n, lon, lat, "outside grid, dropped"),
        }
    }
    Ok(out)
}

/// Pair each row with every cell that any of its lines crosses or lies in.
///
/// `column` holds one line (`[[lon, lat], ...]`), several lines, or a GeoJSON
/// `LineString`/`MultiLineString`. Each (cell, row) pair is emitted once and
/// the geometry column is dropped from the emitted row.
pub fn match_line(grid: &GridIndex, rows: &[Row], column: &str) -> Result<Vec<Matched>> {
    let mut out = Vec::new();
    for (n, row) in rows.iter().enumerate() {
        let raw = row
            .get(column)
            .ok_or_else(|| GridError::MissingColumn(column.to_string()))?;
        let lines = parse_lines(raw)?;

        let mut hit = BTreeSet::new();
        for line in &lines {
            let Some(bbox) = line.bounding_rect() else {
                continue;
            };
            let (lo, hi) = (bbox.min(), bbox.max());
            for i in grid.candidates_in_box(lo.x, lo.y, hi.x, hi.y) {
                if !hit.contains(&i) && grid.cells()[i].bounds().rect().intersects(line) {
                    hit.insert(i);
                }
            }
        }
        debug!(row = n, lines = lines.len(), cells = hit.len(), "matched line");

        if hit.is_empty() {
            continue;
        }
        let mut stripped = row.clone();
        stripped.remove(column);
        out.extend(hit.into_iter().map(|cell| Matched { cell, row: stripped.clone() }));
    }
    Ok(out)
}

/// Build the cell -> value map for `GridIndex::push_attributes` from the
/// `column` of matched rows. Several rows in one cell accumulate (numbers
/// sum, text joins with a space); null values are skipped.
pub fn collect_values(
    matches: &[Matched],
    column: &str,
    kind: ValueKind,
) -> Result<HashMap<usize, AttrValue>> {
    let mut out: HashMap<usize, AttrValue> = HashMap::new();
    for m in matches {
        let value = match kind {
            ValueKind::Number => number(&m.row, column)?.map(AttrValue::Number),
            ValueKind::Text => text(&m.row, column)?.map(AttrValue::Text),
        };
        let Some(value) = value else {
            continue;
        };
        match out.entry(m.cell) {
            Entry::Vacant(e) => {
                e.insert(value);
            }
            Entry::Occupied(e) => match (e.into_mut(), &value) {
                (AttrValue::Text(acc), AttrValue::Text(s)) => {
                    acc.push(' ');
                    acc.push_str(s);
                }
                (acc, v) => {
                    acc.accumulate(v);
                }
            },
        }
    }
    Ok(out)
}

fn number(row: &Row, column: &str) -> Result<Option<f64>> {
    let invalid = |reason: String| GridError::InvalidValue {
        column: column.to_string(),
        reason,
    };
    match row.get(column) {
        None => Err(GridError::MissingColumn(column.to_string())),
        Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| invalid(format!("{n} is not representable as f64"))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| invalid(format!("`{s}` is not a number"))),
        Some(other) => Err(invalid(format!("expected a number, got {other}"))),
    }
}

fn text(row: &Row, column: &str) -> Result<Option<String>> {
    match row.get(column) {
        None => Err(GridError::MissingColumn(column.to_string())),
        Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Ok(Some(other.to_string())),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LineInput {
    Many(Vec<Vec<[f64; 2]>>),
    One(Vec<[f64; 2]>),
    GeoJson(GeoJsonLine),
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum GeoJsonLine {
    LineString { coordinates: Vec<[f64; 2]> },
    MultiLineString { coordinates: Vec<Vec<[f64; 2]>> },
}

fn parse_lines(raw: &Value) -> Result<Vec<LineString<f64>>> {
    if raw.is_null() {
        return Ok(Vec::new());
    }
    let parts = match LineInput::deserialize(raw) {
        Ok(LineInput::Many(v)) => v,
        Ok(LineInput::One(v)) => vec![v],
        Ok(LineInput::GeoJson(GeoJsonLine::LineString { coordinates })) => vec![coordinates],
        Ok(LineInput::GeoJson(GeoJsonLine::MultiLineString { coordinates })) => coordinates,
        Err(_) => return Err(GridError::InvalidGeometry(format!("unrecognized line value {raw}"))),
    };
    parts
        .into_iter()
        .map(|pts| {
            if pts.len() < 2 {
                return Err(GridError::InvalidGeometry(format!(
                    "a line needs at least 2 points, got {}",
                    pts.len()
                )));
            }
            Ok(LineString::new(
                pts.into_iter().map(|[x, y]| Coord { x, y }).collect(),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::{Boundary, GANGNAM_STATION, GridParams};
    use crate::coord::Direction;

    fn grid() -> GridIndex {
        GridIndex::new(&GridParams {
            start: GANGNAM_STATION,
            boundary: Boundary::uniform(1.0),
            cell_size_m: 100.0,
            name: "join".into(),
        })
        .unwrap()
    }

    fn row(v: Value) -> Row {
        match v {
            Value::Object(m) => m,
            _ => panic!("row must be an object"),
        }
    }

    #[test]
    fn point_lands_in_one_cell() {
        let g = grid();
        let p = GANGNAM_STATION.offset(130.0, Direction::East);
        let rows = vec![
            row(json!({ "name": "a", "x": GANGNAM_STATION.lon, "y": GANGNAM_STATION.lat })),
            row(json!({ "name": "b", "x": p.lon.to_string(), "y": p.lat })),
            row(json!({ "name": "far", "x": 128.5, "y": 37.0 })),
            row(json!({ "name": "null", "x": null, "y": 37.0 })),
        ];
        let out = match_point(&g, &rows, "x", "y").unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].cell, 220);
        assert_eq!(out[0].row, rows[0]);
        assert_eq!(out[1].cell, 221);
        assert_eq!(out[1].row["name"], json!("b"));
    }

    #[test]
    fn point_join_requires_columns() {
        let g = grid();
        let rows = vec![row(json!({ "lon": 127.0 }))];
        assert_eq!(
            match_point(&g, &rows, "lon", "lat").unwrap_err(),
            GridError::MissingColumn("lat".into())
        );
        let rows = vec![row(json!({ "lon": 127.0, "lat": "north" }))];
        assert!(matches!(
            match_point(&g, &rows, "lon", "lat"),
            Err(GridError::InvalidValue { .. })
        ));
    }

    #[test]
    fn line_spans_several_cells() {
        let g = grid();
        let a = GANGNAM_STATION;
        let b = GANGNAM_STATION.offset(230.0, Direction::East);
        let rows = vec![row(json!({
            "road": "teheran-ro",
            "geom": [[a.lon, a.lat], [b.lon, b.lat]],
        }))];
        let out = match_line(&g, &rows, "geom").unwrap();
        let cells: Vec<usize> = out.iter().map(|m| m.cell).collect();
        assert_eq!(cells, vec![220, 221, 222]);
        assert!(out.iter().all(|m| !m.row.contains_key("geom")));
        assert_eq!(out[0].row["road"], json!("teheran-ro"));
    }

    #[test]
    fn line_formats_and_dedup() {
        let g = grid();
        let a = GANGNAM_STATION;
        let b = GANGNAM_STATION.offset(20.0, Direction::North);
        let seg = json!([[a.lon, a.lat], [b.lon, b.lat]]);
        let rows = vec![
            row(json!({ "geom": [seg.clone(), seg.clone()] })),
            row(json!({ "geom": { "type": "LineString", "coordinates": seg } })),
            row(json!({ "geom": null })),
            row(json!({ "geom": [[[128.9, 36.0], [129.0, 36.1]]] })),
        ];
        let out = match_line(&g, &rows, "geom").unwrap();
        assert_eq!(out.iter().map(|m| m.cell).collect::<Vec<_>>(), vec![220, 220]);
    }

    #[test]
    fn line_rejects_bad_geometry() {
        let g = grid();
        let bad = vec![row(json!({ "geom": "LINESTRING(0 0, 1 1)" }))];
        assert!(matches!(match_line(&g, &bad, "geom"), Err(GridError::InvalidGeometry(_))));
        let short = vec![row(json!({ "geom": [[127.0, 37.5]] }))];
        assert!(matches!(match_line(&g, &short, "geom"), Err(GridError::InvalidGeometry(_))));
        let missing = vec![row(json!({ "other": 1 }))];
        assert_eq!(
            match_line(&g, &missing, "geom").unwrap_err(),
            GridError::MissingColumn("geom".into())
        );
    }

    #[test]
    fn collect_accumulates_per_cell() {
        let matches = vec![
            Matched { cell: 3, row: row(json!({ "amount": 2, "biz": "cafe" })) },
            Matched { cell: 3, row: row(json!({ "amount": 5.5, "biz": "bank" })) },
            Matched { cell: 4, row: row(json!({ "amount": null, "biz": 7 })) },
        ];
        let nums = collect_values(&matches, "amount", ValueKind::Number).unwrap();
        assert_eq!(nums.len(), 1);
        assert_eq!(nums[&3], AttrValue::Number(7.5));

        let names = collect_values(&matches, "biz", ValueKind::Text).unwrap();
        assert_eq!(names[&3], AttrValue::Text("cafe bank".into()));
        assert_eq!(names[&4], AttrValue::Text("7".into()));

        assert!(matches!(
            collect_values(&matches, "missing", ValueKind::Number),
            Err(GridError::MissingColumn(_))
        ));
    }
}
