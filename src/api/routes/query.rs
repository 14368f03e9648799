use axum::{extract::State, Json};
use serde::Deserialize;

use crate::api::{error::ApiError, state::AppState};
use crate::application::QueryResult;
use crate::domain::{AgentName, DomainError};

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub agent_name: String,
    pub prompt: String,
    pub top_k: Option<usize>,
}

pub async fn query_documents(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResult>, ApiError> {
    let agent = AgentName::parse(&request.agent_name)?;
    if request.top_k == Some(0) {
        return Err(DomainError::validation("top_k must be positive").into());
    }

    let result = state
        .rag_service
        .query(&agent, &request.prompt, request.top_k)
        .await?;
    Ok(Json(result))
}
