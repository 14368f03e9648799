use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::domain::{ports::RegistryNotifier, AgentName, DomainError, EmbeddingsStatus};
use crate::infrastructure::config::RegistryConfig;

#[derive(Debug, Serialize)]
struct StatusUpdate<'a> {
    agent_name: &'a str,
    embeddings_status: EmbeddingsStatus,
}

/// Posts status changes to the agent registry, retrying transient failures
/// with exponential backoff.
pub struct HttpRegistryNotifier {
    client: reqwest::Client,
    base_url: String,
    max_attempts: u32,
    backoff: Duration,
}

impl HttpRegistryNotifier {
    pub fn new(base_url: impl Into<String>, config: &RegistryConfig) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| DomainError::configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.backoff_millis),
        })
    }

    fn url(&self, agent: &AgentName) -> String {
        format!(
            "{}/api/agents/{}/update-embeddings-status",
            self.base_url, agent
        )
    }

    async fn send(&self, agent: &AgentName, status: EmbeddingsStatus) -> Result<(), DomainError> {
        let response = self
            .client
            .post(self.url(agent))
            .json(&StatusUpdate {
                agent_name: agent.as_str(),
                embeddings_status: status,
            })
            .send()
            .await
            .map_err(|e| DomainError::notification(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(DomainError::notification(format!(
                "registry responded {}",
                response.status()
            )))
        }
    }
}

#[async_trait]
impl RegistryNotifier for HttpRegistryNotifier {
    async fn notify(
        &self,
        agent: &AgentName,
        status: EmbeddingsStatus,
    ) -> Result<(), DomainError> {
        let mut delay = self.backoff;
        let mut attempt = 1;

        loop {
            match self.send(agent, status).await {
                Ok(()) => {
                    tracing::debug!(agent = %agent, status = status.as_str(), attempt, "registry notified");
                    return Ok(());
                }
                Err(e) if attempt < self.max_attempts => {
                    tracing::warn!(agent = %agent, attempt, error = %e, "registry notification failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(max_attempts: u32) -> RegistryConfig {
        RegistryConfig {
            base_url: None,
            timeout_seconds: 2,
            max_attempts,
            backoff_millis: 1,
        }
    }

    #[tokio::test]
    async fn test_posts_status_update() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/agents/docs-bot/update-embeddings-status"))
            .and(body_json(serde_json::json!({
                "agent_name": "docs-bot",
                "embeddings_status": "IDLE",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = HttpRegistryNotifier::new(server.uri(), &config(3)).unwrap();
        let agent = AgentName::parse("docs-bot").unwrap();
        notifier
            .notify(&agent, EmbeddingsStatus::Idle)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let notifier = HttpRegistryNotifier::new(server.uri(), &config(3)).unwrap();
        let agent = AgentName::parse("docs-bot").unwrap();
        let err = notifier
            .notify(&agent, EmbeddingsStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Notification(_)));
    }
}
