use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

use crate::application::RagService;
use crate::domain::{ports::GenerationClient, AgentName, DomainError, Message, MessageRole};

/// Outcome of a chat turn as returned to the chat front end.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub success: bool,
    pub role: MessageRole,
    pub content: String,
}

impl ChatReply {
    pub fn failed(error: &DomainError) -> Self {
        Self {
            success: false,
            role: MessageRole::Assistant,
            content: error.to_string(),
        }
    }
}

impl From<Message> for ChatReply {
    fn from(message: Message) -> Self {
        Self {
            success: true,
            role: message.role,
            content: message.content,
        }
    }
}

pub struct ChatService {
    rag: Arc<RagService>,
    generation: Arc<dyn GenerationClient>,
}

impl ChatService {
    pub fn new(rag: Arc<RagService>, generation: Arc<dyn GenerationClient>) -> Self {
        Self { rag, generation }
    }

    /// Retrieves context, composes the conversation and asks the backend
    /// for the next assistant turn. Generation errors are returned, not
    /// swallowed.
    #[instrument(skip_all, fields(agent = %agent, history = history.len()))]
    pub async fn chat(
        &self,
        agent: &AgentName,
        instruction: &str,
        history: &[Message],
        input: &str,
    ) -> Result<Message, DomainError> {
        let messages = self
            .rag
            .compose(instruction, agent, history, input, None)
            .await?;

        self.generation.complete(&messages).await
    }

    /// Like [`ChatService::chat`] but folds any failure into the reply.
    pub async fn reply(
        &self,
        agent: &AgentName,
        instruction: &str,
        history: &[Message],
        input: &str,
    ) -> ChatReply {
        match self.chat(agent, instruction, history, input).await {
            Ok(message) => message.into(),
            Err(e) => {
                tracing::warn!(agent = %agent, error = %e, "chat turn failed");
                ChatReply::failed(&e)
            }
        }
    }
}
