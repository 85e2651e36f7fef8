use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use clap::Parser;
use image::ImageEncoder;
use image::codecs::png::PngEncoder;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use gridspill::config::Scenario;
use gridspill::error::GridError;
use gridspill::export::DenseTable;
use gridspill::render;

/// HTTP front end for running grid scenarios.
#[derive(Parser, Debug)]
#[command(name = "gridspill-server")]
struct Args {
    /// Listen address
    #[arg(long, default_value = "127.0.0.1:3000", env = "GRIDSPILL_LISTEN")]
    listen: SocketAddr,

    /// Pixels per cell in returned heatmaps
    #[arg(long, default_value_t = 8)]
    scale: usize,
}

struct AppState {
    scale: usize,
}

#[derive(Serialize)]
struct RunResponse {
    name: String,
    rows: usize,
    cols: usize,
    layers: Vec<Layer>,
    timings: Vec<TimingEntry>,
}

#[derive(Serialize)]
struct Layer {
    name: String,
    /// PNG heatmap; absent for text attributes.
    data_url: Option<String>,
    table: DenseTable,
}

#[derive(Serialize)]
struct TimingEntry {
    name: String,
    ms: f64,
}

enum ApiError {
    Grid(GridError),
    Internal(String),
}

impl From<GridError> for ApiError {
    fn from(e: GridError) -> Self {
        ApiError::Grid(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Grid(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Internal(m) => {
                error!(error = %m, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

fn encode_png(rgba: &[u8], w: usize, h: usize) -> Result<String, ApiError> {
    let mut buf = Vec::new();
    let encoder = PngEncoder::new(&mut buf);
    encoder
        .write_image(rgba, w as u32, h as u32, image::ExtendedColorType::Rgba8)
        .map_err(|e| ApiError::Internal(format!("PNG encode failed: {e}")))?;
    let b64 = base64::engine::general_purpose::STANDARD.encode(&buf);
    Ok(format!("data:image/png;base64,{}", b64))
}

fn build_response(scenario: &Scenario, scale: usize) -> Result<RunResponse, ApiError> {
    let (grid, timings) = gridspill::run(scenario)?;

    let mut layers = Vec::new();
    for attr in scenario.export_attributes() {
        let values = grid.numeric_grid(&attr);
        let data_url = if values.data.iter().all(|v| v.is_nan()) {
            None
        } else {
            let rgba = render::render_attribute(&values, scale);
            Some(encode_png(&rgba, values.w * scale, values.h * scale)?)
        };
        layers.push(Layer {
            table: grid.dense_table(&attr),
            name: attr,
            data_url,
        });
    }

    Ok(RunResponse {
        name: grid.label(),
        rows: grid.n(),
        cols: grid.m(),
        layers,
        timings: timings
            .into_iter()
            .map(|t| TimingEntry { name: t.name, ms: t.ms })
            .collect(),
    })
}

async fn run_handler(
    State(state): State<Arc<AppState>>,
    Json(scenario): Json<Scenario>,
) -> Result<Json<RunResponse>, ApiError> {
    let scale = state.scale.max(1);
    let response = tokio::task::spawn_blocking(move || build_response(&scenario, scale))
        .await
        .map_err(|e| ApiError::Internal(format!("worker panicked: {e}")))??;
    Ok(Json(response))
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gridspill=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let state = Arc::new(AppState { scale: args.scale });

    let app = Router::new()
        .route("/api/run", post(run_handler))
        .route("/api/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    info!(address = %args.listen, "gridspill server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
