//! Staff channel notifications
//!
//! Ban and unban results are posted to a designated staff channel through
//! a webhook. Senders are fire-and-forget: the orchestrator and scanner
//! queue a notice and move on, while a single async dispatcher task
//! drains the queue and performs the HTTP calls.

use crate::config::AlertConfig;
use reqwest::Client;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur during notice dispatch
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Notice channel closed")]
    ChannelClosed,
}

/// A human-readable moderation notice bound for the staff channel.
#[derive(Debug, Clone)]
pub struct Notice {
    /// Server key the notice concerns, shown as a prefix.
    pub server: String,
    pub text: String,
}

/// Cloneable fire-and-forget handle for queueing notices.
#[derive(Clone)]
pub struct NoticeSender {
    tx: mpsc::Sender<Notice>,
}

impl NoticeSender {
    /// Queue a notice without waiting. A full or closed queue drops the
    /// notice with a warning; moderation never blocks on the notifier.
    pub fn notify(&self, server: &str, text: &str) {
        let notice = Notice {
            server: server.to_string(),
            text: text.to_string(),
        };
        if let Err(e) = self.tx.try_send(notice) {
            log::warn!("dropping staff notice: {}", e);
        }
    }
}

/// Create the notice channel shared by producers and the dispatcher.
pub fn notice_channel() -> (NoticeSender, mpsc::Receiver<Notice>) {
    let (tx, rx) = mpsc::channel(100);
    (NoticeSender { tx }, rx)
}

/// Async webhook dispatcher
///
/// Spawn [`run`](Self::run) as a tokio task. Notices are posted to the
/// configured webhook one at a time; failures are logged and the notice
/// is dropped.
pub struct WebhookNotifier {
    config: AlertConfig,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(config: AlertConfig) -> Self {
        WebhookNotifier {
            config,
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Run the dispatch loop until every sender is dropped.
    pub async fn run(self, mut rx: mpsc::Receiver<Notice>) {
        log::info!("Staff notifier started");

        while let Some(notice) = rx.recv().await {
            if !self.config.enabled {
                continue;
            }
            let url = match self.config.webhook_url {
                Some(ref url) => url,
                None => {
                    log::debug!("no webhook configured, dropping notice for {}", notice.server);
                    continue;
                }
            };
            if let Err(e) = self.post(url, &notice).await {
                log::error!("Failed to post staff notice: {}", e);
            }
        }

        log::info!("Staff notifier stopped");
    }

    async fn post(&self, url: &str, notice: &Notice) -> Result<(), AlertError> {
        let response = self
            .client
            .post(url)
            .json(&notice_payload(&self.config, notice))
            .send()
            .await?;
        if !response.status().is_success() {
            log::warn!("webhook returned non-success status: {}", response.status());
        }
        Ok(())
    }
}

fn notice_payload(config: &AlertConfig, notice: &Notice) -> serde_json::Value {
    serde_json::json!({
        "username": config.username.as_deref().unwrap_or("Warden"),
        "content": format!("[{}] {}", notice.server, notice.text),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notify_is_fire_and_forget() {
        let (sender, mut rx) = notice_channel();
        sender.notify("tdm", "**adm** banned **player1**");

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.server, "tdm");
        assert!(notice.text.contains("player1"));
    }

    #[tokio::test]
    async fn test_notify_after_receiver_dropped_does_not_panic() {
        let (sender, rx) = notice_channel();
        drop(rx);
        sender.notify("tdm", "lost");
    }

    #[test]
    fn test_payload_prefixes_server() {
        let config = AlertConfig {
            enabled: true,
            webhook_url: Some("http://example.invalid/hook".to_string()),
            username: None,
        };
        let notice = Notice {
            server: "tdm".to_string(),
            text: "hello".to_string(),
        };
        let payload = notice_payload(&config, &notice);
        assert_eq!(payload["content"], "[tdm] hello");
        assert_eq!(payload["username"], "Warden");
    }
}
