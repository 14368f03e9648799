use axum::{extract::State, http::StatusCode, Json};
use deadpool_redis::redis::cmd;
use serde::Serialize;

use crate::api::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub vector_store: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<String>,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

pub async fn readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let vector_store = match state.vector_store.health_check().await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "vector store not ready");
            "disconnected"
        }
    };

    let redis = match &state.redis_pool {
        Some(pool) => Some(match pool.get().await {
            Ok(mut conn) => {
                let ping: Result<String, _> = cmd("PING").query_async(&mut *conn).await;
                if ping.is_ok() {
                    "connected"
                } else {
                    "disconnected"
                }
            }
            Err(_) => "disconnected",
        }),
        None => None,
    };

    let is_ready = vector_store == "connected" && redis.map_or(true, |r| r == "connected");

    let response = ReadinessResponse {
        status: if is_ready { "ready" } else { "not_ready" }.into(),
        vector_store: vector_store.into(),
        redis: redis.map(Into::into),
    };

    let code = if is_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(response))
}
