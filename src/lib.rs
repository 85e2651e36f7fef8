pub mod attr;
pub mod cell;
pub mod config;
pub mod coord;
pub mod diffusion;
pub mod error;
pub mod export;
pub mod grid;
pub mod index;
pub mod join;
pub mod render;

use std::collections::HashMap;
use std::time::Instant;

use tracing::info;

use config::{GeometrySpec, Scenario, SourceSpec};
use error::{GridError, Result};
use index::GridIndex;

pub use attr::{AttrValue, ValueKind};
pub use coord::{Coordinate, Direction};
pub use diffusion::DecayRule;

pub struct Timing {
    pub name: String,
    pub ms: f64,
}

fn record(timings: &mut Vec<Timing>, name: String, t: Instant) {
    let ms = t.elapsed().as_secs_f64() * 1000.0;
    info!(stage = %name, ms, "stage done");
    timings.push(Timing { name, ms });
}

/// Build the grid, join and push every layer, then run the diffusions in
/// order.
pub fn run(scenario: &Scenario) -> Result<(GridIndex, Vec<Timing>)> {
    let mut timings = Vec::new();
    let total_start = Instant::now();

    // 1. Grid
    let t = Instant::now();
    let mut grid = GridIndex::new(&scenario.grid)?;
    record(&mut timings, "grid".into(), t);

    // 2. Layers: spatial join, per-cell aggregation, push
    let mut layer_cells: HashMap<&str, Vec<usize>> = HashMap::new();
    for layer in &scenario.layers {
        let t = Instant::now();
        let matches = match &layer.geometry {
            GeometrySpec::Point { lon_column, lat_column } => {
                join::match_point(&grid, &layer.rows, lon_column, lat_column)?
            }
            GeometrySpec::Line { column } => join::match_line(&grid, &layer.rows, column)?,
        };
        let values = join::collect_values(&matches, &layer.value_column, layer.kind)?;
        grid.push_attributes(&values, &layer.attribute, layer.kind)?;

        let cells = layer_cells.entry(layer.attribute.as_str()).or_default();
        cells.extend(matches.iter().map(|m| m.cell));
        cells.sort_unstable();
        cells.dedup();

        info!(
            attribute = %layer.attribute,
            rows = layer.rows.len(),
            matched = matches.len(),
            cells = values.len(),
            "layer pushed"
        );
        record(&mut timings, format!("layer:{}", layer.attribute), t);
    }

    // 3. Diffusions
    for d in &scenario.diffusions {
        let t = Instant::now();
        let sources = match &d.sources {
            SourceSpec::Layer(name) => layer_cells
                .get(name.as_str())
                .cloned()
                .ok_or_else(|| GridError::Config(format!("no layer pushes `{name}`")))?,
            SourceSpec::Cells(cells) => cells.clone(),
        };
        let steps = match (d.steps, d.distance_m) {
            (Some(s), _) => s,
            (None, Some(m)) => grid.steps_for_distance(m),
            (None, None) => {
                return Err(GridError::Config(format!(
                    "diffusion of `{}` needs `steps` or `distance_m`",
                    d.attribute
                )));
            }
        };
        grid.trickle_down(&sources, steps, &d.attribute, d.decay, d.initial_value)?;
        record(&mut timings, format!("diffusion:{}", d.attribute), t);
    }

    record(&mut timings, "TOTAL".into(), total_start);
    Ok((grid, timings))
}
