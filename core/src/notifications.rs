//! Alert sink with a Discord webhook backend

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{Error, Result, Tone};

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn tone(&self) -> Tone {
        match self {
            Severity::Info => Tone::Success,
            Severity::Warning => Tone::Warning,
            Severity::Critical => Tone::Error,
        }
    }
}

/// Notification message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMessage {
    /// Message title
    pub title: String,
    /// Message body
    pub body: String,
    #[serde(default = "default_severity")]
    pub severity: Severity,
}

fn default_severity() -> Severity {
    Severity::Warning
}

impl NotificationMessage {
    pub fn new(severity: Severity, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            severity,
        }
    }
}

/// Mask sensitive tokens/keys for safe logging
///
/// Masks all but the first and last 3 characters of tokens longer than 8 characters.
/// Tokens 8 characters or shorter are completely masked.
///
/// # Examples
///
/// ```
/// use guardctl_core::mask_token;
///
/// let token = "abc123def456ghi789";
/// assert_eq!(mask_token(token), "abc***789");
/// assert_eq!(mask_token("secret"), "***");
/// ```
pub fn mask_token(token: &str) -> String {
    if token.len() <= 8 || !token.is_ascii() {
        "***".to_string()
    } else {
        format!("{}***{}", &token[..3], &token[token.len() - 3..])
    }
}

/// Notification backend trait
#[async_trait]
pub trait NotificationBackend: Send + Sync {
    /// Send a notification
    async fn send(&self, message: &NotificationMessage) -> Result<()>;

    /// Backend name
    fn name(&self) -> &str;
}

// ============================================================================
// Discord webhook backend
// ============================================================================

/// Posts alerts to a Discord channel webhook
#[derive(Debug, Clone)]
pub struct DiscordWebhookBackend {
    client: Client,
    url: String,
    username: Option<String>,
}

impl DiscordWebhookBackend {
    /// Create a backend for an explicit webhook URL
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            username: None,
        }
    }

    /// Override the webhook's display name
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Request body for a message
    fn payload(&self, message: &NotificationMessage) -> serde_json::Value {
        let mut body = serde_json::json!({
            "embeds": [{
                "title": message.title,
                "description": crate::tail_chars(&message.body, 4096),
                "color": message.severity.tone().color(),
            }]
        });
        if let Some(username) = &self.username {
            body["username"] = serde_json::Value::String(username.clone());
        }
        body
    }
}

#[async_trait]
impl NotificationBackend for DiscordWebhookBackend {
    async fn send(&self, message: &NotificationMessage) -> Result<()> {
        // The last path segment of a webhook URL is its token
        let token = self.url.rsplit('/').next().unwrap_or_default();
        debug!(
            token = %mask_token(token),
            title_bytes = message.title.len(),
            body_bytes = message.body.len(),
            "Sending Discord webhook notification"
        );

        let response = self
            .client
            .post(&self.url)
            .json(&self.payload(message))
            .send()
            .await
            .map_err(|e| Error::NotificationError(format!("Webhook request failed: {}", e)))?;

        response
            .error_for_status()
            .map_err(|e| Error::NotificationError(format!("Webhook error: {}", e)))?;

        Ok(())
    }

    fn name(&self) -> &str {
        "discord-webhook"
    }
}

// ============================================================================
// Notification Manager
// ============================================================================

/// Fans a message out to every configured backend
#[derive(Clone, Default)]
pub struct NotificationManager {
    backends: Vec<Arc<dyn NotificationBackend>>,
}

impl NotificationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: Arc<dyn NotificationBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn add_backend(&mut self, backend: Arc<dyn NotificationBackend>) {
        self.backends.push(backend);
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    /// Send to all backends
    ///
    /// Every backend is attempted; the call fails only if none of them
    /// delivered.
    pub async fn send(&self, message: &NotificationMessage) -> Result<()> {
        if self.backends.is_empty() {
            debug!(title = %message.title, "No notification backends configured; skipping");
            return Ok(());
        }

        let mut failures = Vec::new();
        for backend in &self.backends {
            if let Err(e) = backend.send(message).await {
                warn!(backend = %backend.name(), error = %e, "Failed to send notification");
                failures.push(format!("{}: {}", backend.name(), e));
            }
        }

        if failures.len() < self.backends.len() {
            Ok(())
        } else {
            Err(Error::NotificationError(failures.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationBackend for Recording {
        async fn send(&self, message: &NotificationMessage) -> Result<()> {
            if self.fail {
                return Err(Error::NotificationError("down".into()));
            }
            self.sent.lock().unwrap().push(message.title.clone());
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[test]
    fn test_mask_token_long() {
        assert_eq!(mask_token("abc123def456ghi789"), "abc***789");
    }

    #[test]
    fn test_mask_token_short() {
        assert_eq!(mask_token("secret"), "***");
        assert_eq!(mask_token("12345678"), "***");
        assert_eq!(mask_token(""), "***");
    }

    #[test]
    fn test_mask_token_exactly_9() {
        assert_eq!(mask_token("123456789"), "123***789");
    }

    #[test]
    fn test_webhook_payload() {
        let backend = DiscordWebhookBackend::new(Client::new(), "https://discord.test/api/webhooks/1/tok")
            .with_username("guardctl");
        let msg = NotificationMessage::new(Severity::Critical, "Down", "traefik stopped");
        let payload = backend.payload(&msg);
        assert_eq!(payload["username"], "guardctl");
        assert_eq!(payload["embeds"][0]["title"], "Down");
        assert_eq!(payload["embeds"][0]["color"], Tone::Error.color());
    }

    #[tokio::test]
    async fn test_manager_without_backends_is_ok() {
        let manager = NotificationManager::new();
        let msg = NotificationMessage::new(Severity::Info, "t", "b");
        assert!(manager.send(&msg).await.is_ok());
    }

    #[tokio::test]
    async fn test_manager_tries_every_backend() {
        let failing = Arc::new(Recording {
            sent: Mutex::new(Vec::new()),
            fail: true,
        });
        let working = Arc::new(Recording {
            sent: Mutex::new(Vec::new()),
            fail: false,
        });
        let manager = NotificationManager::new()
            .with_backend(failing)
            .with_backend(working.clone());

        let msg = NotificationMessage::new(Severity::Warning, "Alert", "body");
        assert!(manager.send(&msg).await.is_ok());
        assert_eq!(working.sent.lock().unwrap().as_slice(), ["Alert".to_string()]);
    }

    #[tokio::test]
    async fn test_manager_fails_when_nothing_delivered() {
        let manager = NotificationManager::new()
            .with_backend(Arc::new(Recording {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }))
            .with_backend(Arc::new(Recording {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }));

        let msg = NotificationMessage::new(Severity::Critical, "Alert", "body");
        let err = manager.send(&msg).await.unwrap_err();
        assert!(matches!(err, Error::NotificationError(ref m) if m.matches("down").count() == 2));
    }
}
