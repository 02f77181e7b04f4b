use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use thiserror::Error;
use tokio::time::Duration;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("webhook returned HTTP {0}")]
    Rejected(u16),
}

/// Destination for periodic status messages
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, text: &str) -> Result<(), NotifyError>;
}

/// Writes messages to the log only
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, text: &str) -> Result<(), NotifyError> {
        tracing::info!("📣 Status update:\n{}", text);
        Ok(())
    }
}

/// Posts messages as `{"text": ...}` to an incoming-webhook URL
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn publish(&self, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "text": text }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }

        tracing::debug!("Status update delivered to webhook");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_webhook_posts_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_body(Matcher::Json(json!({ "text": "hello #FX" })))
            .with_status(200)
            .create_async()
            .await;

        let notifier = WebhookNotifier::new(format!("{}/hook", server.url())).unwrap();
        notifier.publish("hello #FX").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_webhook_rejection() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/hook").with_status(403).create_async().await;

        let notifier = WebhookNotifier::new(format!("{}/hook", server.url())).unwrap();
        let result = notifier.publish("hello").await;

        assert!(matches!(result, Err(NotifyError::Rejected(403))));
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        assert!(LogNotifier.publish("anything").await.is_ok());
    }
}
