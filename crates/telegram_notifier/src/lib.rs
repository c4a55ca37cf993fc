/// Alert@Postas: Telegram Notifier
///
/// Fire-and-forget sink for formatted chat messages. A failed send is logged
/// and reported as `false`; it is never retried and never turned into an error
/// for the caller.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod messages;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// True when the chat accepted the message.
    async fn send_message(&self, text: &str) -> bool;

    fn is_enabled(&self) -> bool {
        true
    }
}

// ── Telegram Bot API ─────────────────────────────────────────────────────────

pub struct TelegramSink {
    client:   reqwest::Client,
    token:    String,
    chat_id:  String,   // numeric id or "@channel"
    api_base: String,
}

impl TelegramSink {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            token:    token.into(),
            chat_id:  chat_id.into(),
            api_base: TELEGRAM_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn chat_id_value(&self) -> serde_json::Value {
        match self.chat_id.trim().parse::<i64>() {
            Ok(id) => serde_json::Value::from(id),
            Err(_) => serde_json::Value::from(self.chat_id.trim()),
        }
    }

    async fn try_send(&self, text: &str) -> Result<i64> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let body = serde_json::json!({
            "chat_id": self.chat_id_value(),
            "text": text,
            "parse_mode": "Markdown",
            "disable_web_page_preview": true,
        });
        let resp = self.client.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("HTTP {}: {}", status, body);
        }
        let resp_json: serde_json::Value = resp.json().await?;
        Ok(resp_json["result"]["message_id"].as_i64().unwrap_or(0))
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn send_message(&self, text: &str) -> bool {
        match self.try_send(text).await {
            Ok(message_id) => {
                info!("Telegram sent (message_id={})", message_id);
                true
            }
            Err(e) => {
                warn!("Telegram sendMessage failed: {:#}", e);
                false
            }
        }
    }
}

/// Used when no bot token / chat id is configured.
pub struct DisabledSink;

#[async_trait]
impl NotificationSink for DisabledSink {
    async fn send_message(&self, text: &str) -> bool {
        debug!("Telegram disabled, dropping {} chars", text.chars().count());
        false
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
