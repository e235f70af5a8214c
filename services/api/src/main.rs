//! API Service - Map data for the detentions viewer
//!
//! Endpoints:
//! - GET /health - Health check
//! - GET /nationalities - Distinct nationalities (selector values)
//! - GET /levels - Administrative levels with geometry
//! - GET /map - Choropleth FeatureCollection for a level / nationality / measure
//!
//! Every request re-runs the full load-and-aggregate pipeline.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use detenciones_parser::{
    aggregate, build_map, load_dataset, source::WORKBOOK_EXTENSIONS, to_feature_collection, AdminLevel,
    Dataset, ExportLayout, GeoJsonBoundaries, Measure, PipelineConfig, Settings, WorkbookSource,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// State
// ============================================================================

struct AppState {
    settings: Settings,
    config: PipelineConfig,
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

#[derive(Serialize)]
struct LevelResponse {
    id: &'static str,
    label: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Query params
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct MapQuery {
    level: Option<String>,
    nationality: Option<String>,
    measure: Option<String>,
}

/// Validated map request.
#[derive(Debug, PartialEq)]
struct MapRequest {
    level: AdminLevel,
    nationality: Option<String>,
    measure: Measure,
}

impl MapQuery {
    fn resolve(self) -> Result<MapRequest, String> {
        let level = self
            .level
            .as_deref()
            .ok_or_else(|| "missing 'level' parameter".to_string())?
            .parse::<AdminLevel>()?;
        let measure = match self.measure.as_deref() {
            Some(m) => m.parse::<Measure>()?,
            None => Measure::default(),
        };
        let nationality = self.nationality.filter(|n| !n.trim().is_empty());
        Ok(MapRequest {
            level,
            nationality,
            measure,
        })
    }
}

fn level_id(level: AdminLevel) -> &'static str {
    match level {
        AdminLevel::Region => "region",
        AdminLevel::Prefecture => "prefectura",
        AdminLevel::Comuna => "comuna",
    }
}

fn missing_geometry_message(level: AdminLevel) -> String {
    format!("No hay geometría disponible para el nivel {}", level.label())
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: error.into() })).into_response()
}

// ============================================================================
// Pipeline
// ============================================================================

async fn load(state: &Arc<AppState>) -> Result<Dataset, Response> {
    let state = Arc::clone(state);
    let joined = tokio::task::spawn_blocking(move || {
        load_dataset(&WorkbookSource, &state.settings.data_dir, WORKBOOK_EXTENSIONS, &state.config)
            .map_err(|e| e.to_string())
    })
    .await;

    match joined {
        Ok(Ok(dataset)) => Ok(dataset),
        Ok(Err(e)) => {
            error!(error = %e, "dataset load failed");
            Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e))
        }
        Err(e) => Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn levels_handler() -> Json<Vec<LevelResponse>> {
    Json(
        AdminLevel::ALL
            .iter()
            .map(|l| LevelResponse {
                id: level_id(*l),
                label: l.label(),
            })
            .collect(),
    )
}

async fn nationalities_handler(State(state): State<Arc<AppState>>) -> Response {
    match load(&state).await {
        Ok(dataset) => Json(serde_json::json!({ "nationalities": dataset.nationalities() })).into_response(),
        Err(resp) => resp,
    }
}

async fn map_handler(State(state): State<Arc<AppState>>, Query(params): Query<MapQuery>) -> Response {
    let request = match params.resolve() {
        Ok(r) => r,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    let dataset = match load(&state).await {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    let rows = aggregate(
        &dataset.records,
        request.nationality.as_deref(),
        request.level.group_key(),
    );

    let provider = GeoJsonBoundaries::new(&state.settings.shape_dir);
    match build_map(request.level, &rows, &provider, request.measure) {
        Ok(Some(joined)) => Json(to_feature_collection(&joined)).into_response(),
        Ok(None) => {
            warn!(
                level = request.level.label(),
                path = %provider.path_for(request.level).display(),
                "geometry file missing"
            );
            error_response(StatusCode::NOT_FOUND, missing_geometry_message(request.level))
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    let settings = Settings::from_env().context("Invalid environment settings")?;
    let config = settings.pipeline(ExportLayout::Full, true);
    let bind = settings.bind.clone();

    info!(
        data_dir = %settings.data_dir.display(),
        shape_dir = %settings.shape_dir.display(),
        "=== Detenciones API ==="
    );

    let state = Arc::new(AppState { settings, config });

    // CORS for the map frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/levels", get(levels_handler))
        .route("/nationalities", get(nationalities_handler))
        .route("/map", get(map_handler))
        .layer(cors)
        .with_state(state);

    info!("API listening on http://{}", bind);
    info!("GET /health | /levels | /nationalities | /map?level=&nationality=&measure=");

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    axum::serve(listener, app).await?;

    Ok(())
}
