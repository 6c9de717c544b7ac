use axum::{extract::State, http::StatusCode, response::IntoResponse};
use time::OffsetDateTime;
use tracing::warn;

use super::dto::{BackendState, HealthResponse, ReadinessResponse};
use crate::common::deadline::with_deadline;
use crate::common::response::ApiSuccess;
use crate::state::AppState;

fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

pub fn liveness() -> HealthResponse {
    HealthResponse {
        ok: true,
        time: unix_now(),
    }
}

/// Liveness probe
/// Does not touch any backend.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Process is alive", body = HealthResponse)
    ),
    tag = "Health"
)]
pub async fn health() -> impl IntoResponse {
    ApiSuccess(liveness(), StatusCode::OK)
}

/// Readiness probe
/// Pings the metadata store and the object store.
#[utoipa::path(
    get,
    path = "/ready",
    responses(
        (status = 200, description = "Both backends reachable", body = ReadinessResponse),
        (status = 503, description = "A backend is unreachable", body = ReadinessResponse)
    ),
    tag = "Health"
)]
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let timeout = state.config.backend_timeout;
    let (database, storage) = tokio::join!(
        with_deadline(timeout, state.videos.ping()),
        with_deadline(timeout, state.storage.ping()),
    );

    let database = backend_state("database", database);
    let storage = backend_state("storage", storage);
    let ok = database == BackendState::Up && storage == BackendState::Up;
    let status = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    ApiSuccess(
        ReadinessResponse {
            ok,
            time: unix_now(),
            database,
            storage,
        },
        status,
    )
}

fn backend_state<E: std::fmt::Display>(name: &str, result: Result<(), E>) -> BackendState {
    match result {
        Ok(()) => BackendState::Up,
        Err(e) => {
            warn!(backend = name, error = %e, "Readiness check failed");
            BackendState::Down
        }
    }
}
