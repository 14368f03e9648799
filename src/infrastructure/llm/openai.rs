use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::{message::Message as RigMessage, AssistantContent, CompletionModel as _};
use rig::providers::openai;
use std::time::Duration;

use crate::domain::{ports::GenerationClient, DomainError, Message, MessageRole};
use crate::infrastructure::config::GenerationConfig;

/// Chat Completions backend reached through rig's OpenAI provider. Any
/// server speaking that contract works (vLLM, Ollama, OpenAI itself).
pub struct OpenAiChatClient {
    client: openai::CompletionsClient,
    model: String,
    timeout: Duration,
}

impl OpenAiChatClient {
    pub fn new(config: &GenerationConfig) -> Result<Self, DomainError> {
        // self-hosted servers usually ignore the key but rig always sends one
        let api_key = config.api_key.as_deref().unwrap_or("EMPTY");
        let client = openai::CompletionsClient::builder()
            .api_key(api_key)
            .base_url(config.base_url.trim_end_matches('/'))
            .build()
            .map_err(|e| DomainError::configuration(e.to_string()))?;

        Ok(Self {
            client,
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn send(&self, messages: &[Message]) -> Result<Message, DomainError> {
        let (preamble, history, prompt) = split_conversation(messages)?;

        let mut request = self
            .client
            .completion_model(&self.model)
            .completion_request(prompt)
            .messages(history);
        if !preamble.is_empty() {
            request = request.preamble(preamble);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DomainError::generation_unavailable(e.to_string()))?;

        response
            .choice
            .iter()
            .find_map(|content| match content {
                AssistantContent::Text(text) => Some(Message::assistant(text.text.clone())),
                _ => None,
            })
            .ok_or_else(|| DomainError::generation_unavailable("reply had no text"))
    }
}

/// System turns become the preamble, the final user turn the prompt, and
/// everything between the chat history.
fn split_conversation(
    messages: &[Message],
) -> Result<(String, Vec<RigMessage>, RigMessage), DomainError> {
    let Some((last, earlier)) = messages.split_last() else {
        return Err(DomainError::validation("conversation is empty"));
    };
    if last.role != MessageRole::User {
        return Err(DomainError::validation(
            "conversation must end with a user message",
        ));
    }

    let mut system = Vec::new();
    let mut history = Vec::new();
    for message in earlier {
        match message.role {
            MessageRole::System => system.push(message.content.as_str()),
            MessageRole::User => history.push(RigMessage::user(message.content.clone())),
            MessageRole::Assistant => {
                history.push(RigMessage::assistant(message.content.clone()))
            }
        }
    }

    Ok((
        system.join("\n\n"),
        history,
        RigMessage::user(last.content.clone()),
    ))
}

#[async_trait]
impl GenerationClient for OpenAiChatClient {
    async fn complete(&self, messages: &[Message]) -> Result<Message, DomainError> {
        tokio::time::timeout(self.timeout, self.send(messages))
            .await
            .map_err(|_| DomainError::generation_unavailable("generation timed out"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> GenerationConfig {
        GenerationConfig {
            base_url,
            model: "test-model".to_string(),
            api_key: Some("secret".to_string()),
            timeout_seconds: 5,
        }
    }

    fn reply(content: &str) -> Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1,
            "model": "test-model",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        })
    }

    /// Message content arrives either as a string or as text parts.
    fn text_of(content: &Value) -> String {
        match content {
            Value::String(s) => s.clone(),
            Value::Array(parts) => parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join(""),
            _ => String::new(),
        }
    }

    #[tokio::test]
    async fn test_complete_sends_conversation_and_returns_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(json!({"model": "test-model"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("Hello!")))
            .mount(&server)
            .await;

        let client = OpenAiChatClient::new(&config(format!("{}/v1/", server.uri()))).unwrap();
        let answer = client
            .complete(&[
                Message::system("Be brief."),
                Message::system("Context: greetings."),
                Message::user("Hi"),
                Message::assistant("Hello, how can I help?"),
                Message::user("Say hi again"),
            ])
            .await
            .unwrap();

        assert_eq!(answer.role, MessageRole::Assistant);
        assert_eq!(answer.content, "Hello!");

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let sent: Vec<(String, String)> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| (m["role"].as_str().unwrap().to_string(), text_of(&m["content"])))
            .collect();

        assert_eq!(
            sent,
            vec![
                ("system".into(), "Be brief.\n\nContext: greetings.".into()),
                ("user".into(), "Hi".into()),
                ("assistant".into(), "Hello, how can I help?".into()),
                ("user".into(), "Say hi again".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_server_error_is_generation_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = OpenAiChatClient::new(&config(server.uri())).unwrap();
        let err = client.complete(&[Message::user("Hi")]).await.unwrap_err();
        assert!(matches!(err, DomainError::GenerationUnavailable(_)));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(reply("late"))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = OpenAiChatClient::new(&config(server.uri()))
            .unwrap()
            .with_timeout(Duration::from_millis(50));
        let err = client.complete(&[Message::user("Hi")]).await.unwrap_err();
        assert!(matches!(err, DomainError::GenerationUnavailable(_)));
    }

    #[test]
    fn test_conversation_must_end_with_user_turn() {
        let err = split_conversation(&[Message::user("Hi"), Message::assistant("Hello")])
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(split_conversation(&[]).is_err());
    }
}
