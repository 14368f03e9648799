use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::{error::ApiError, state::AppState};
use crate::domain::{AgentName, DomainError, IngestionStatus};

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub agent_name: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub status: &'static str,
    pub agent_name: AgentName,
    pub generation: u64,
}

pub async fn generate_embeddings(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<(StatusCode, Json<GenerateResponse>), ApiError> {
    let agent = AgentName::parse(&request.agent_name)?;
    let status = state.ingestion.trigger(&agent).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateResponse {
            status: "accepted",
            agent_name: status.agent_name,
            generation: status.generation,
        }),
    ))
}

pub async fn get_status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<IngestionStatus>, ApiError> {
    let agent = AgentName::parse(&name)?;

    state
        .ingestion
        .status(&agent)
        .await?
        .map(Json)
        .ok_or_else(|| DomainError::not_found(format!("no ingestion recorded for '{agent}'")).into())
}

pub async fn delete_collection(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    let agent = AgentName::parse(&name)?;
    state.ingestion.delete_collection(&agent).await?;
    Ok(StatusCode::NO_CONTENT)
}
