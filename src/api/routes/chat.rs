use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::api::{error::ApiError, state::AppState};
use crate::application::ChatReply;
use crate::domain::{AgentName, Message};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub instructions: String,
    pub input: String,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Backend failures come back as `success: false` with a 200, so the chat
/// front end can render them in the conversation.
pub async fn chat_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReply>, ApiError> {
    let agent = AgentName::parse(&name)?;

    let reply = state
        .chat_service
        .reply(&agent, &request.instructions, &request.messages, &request.input)
        .await;
    Ok(Json(reply))
}
