use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub ok: bool,
    /// Unix seconds.
    pub time: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadinessResponse {
    pub ok: bool,
    pub time: i64,
    pub database: BackendState,
    pub storage: BackendState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BackendState {
    Up,
    Down,
}
