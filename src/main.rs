use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::info;

use gridspill::config::Scenario;
use gridspill::render;

/// Run a grid scenario and write its tables and heatmaps.
#[derive(Parser, Debug)]
#[command(name = "gridspill")]
struct Args {
    /// Scenario JSON file
    scenario: PathBuf,

    /// Output directory
    #[arg(long, default_value = "artifacts")]
    out_dir: PathBuf,

    /// Attributes to render as PNG heatmaps (default: every exported numeric attribute)
    #[arg(long)]
    render: Vec<String>,

    /// Pixels per cell in rendered heatmaps
    #[arg(long, default_value_t = 8)]
    scale: usize,
}

fn write_json(path: &Path, value: &impl Serialize) -> anyhow::Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "saved");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gridspill=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let text = std::fs::read_to_string(&args.scenario)
        .with_context(|| format!("reading {}", args.scenario.display()))?;
    let scenario: Scenario = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", args.scenario.display()))?;

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;

    let (grid, timings) = gridspill::run(&scenario)?;

    eprintln!("\nTimings:");
    for t in &timings {
        eprintln!("  {:24} {:8.1} ms", t.name, t.ms);
    }

    let label = grid.label();
    let exported = scenario.export_attributes();

    // 1. Flat row-per-cell table
    let flat = grid.flat_table(&exported)?;
    write_json(&args.out_dir.join(format!("{label}.json")), &flat)?;

    // 2. Dense table per attribute
    for attr in &exported {
        let table = grid.dense_table(attr);
        write_json(&args.out_dir.join(format!("{label}_{attr}.json")), &table)?;
    }

    // 3. Heatmaps
    let targets = if args.render.is_empty() { &exported } else { &args.render };
    for attr in targets {
        let values = grid.numeric_grid(attr);
        if values.data.iter().all(|v| v.is_nan()) {
            info!(attribute = %attr, "no numeric values, skipping heatmap");
            continue;
        }
        let scale = args.scale.max(1);
        let rgba = render::render_attribute(&values, scale);
        let path = args.out_dir.join(format!("{label}_{attr}.png"));
        image::save_buffer(
            &path,
            &rgba,
            (values.w * scale) as u32,
            (values.h * scale) as u32,
            image::ColorType::Rgba8,
        )
        .with_context(|| format!("saving {}", path.display()))?;
        info!(path = %path.display(), "saved");
    }

    eprintln!("\nDone.");
    Ok(())
}
