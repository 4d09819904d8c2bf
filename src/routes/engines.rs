use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::engine::EngineDescriptor;
use crate::registry::breaker::HealthSnapshot;

#[derive(Serialize)]
pub struct EngineSummary {
    #[serde(flatten)]
    pub descriptor: EngineDescriptor,
    pub available: bool,
}

#[derive(Serialize)]
pub struct EngineDetail {
    #[serde(flatten)]
    pub descriptor: EngineDescriptor,
    pub available: bool,
    pub health: Option<HealthSnapshot>,
}

/// GET /api/v1/engines — every registered engine with its capabilities.
pub async fn list_engines(State(state): State<AppState>) -> Json<Vec<EngineSummary>> {
    let engines = state
        .registry
        .engine_names()
        .into_iter()
        .filter_map(|name| {
            let descriptor = state.registry.descriptor(&name)?.clone();
            let available = state.registry.is_available(&name);
            Some(EngineSummary {
                descriptor,
                available,
            })
        })
        .collect();
    Json(engines)
}

/// GET /api/v1/engines/{name} — one engine's capabilities and health.
pub async fn engine_detail(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<EngineDetail>, ApiError> {
    let descriptor = state.registry.descriptor(&name).cloned().ok_or_else(|| {
        ApiError::NotFound(format!(
            "unknown engine '{name}'; available engines: {}",
            state.registry.engine_names().join(", ")
        ))
    })?;

    Ok(Json(EngineDetail {
        available: state.registry.is_available(&name),
        health: state.registry.health(&name),
        descriptor,
    }))
}
