use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::shared::http_retry::{read_json, with_retry, ApiError, RetryPolicy};

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Канал уведомлений о ходе отчёта
#[async_trait]
pub trait ChatNotifier: Send + Sync {
    /// Отправить сообщение. Возвращает message_id, если сообщение доставлено
    async fn send(&self, chat_id: i64, text: &str) -> Result<Option<i64>>;

    async fn edit(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct BotResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Уведомления через Telegram Bot API (HTML-разметка)
pub struct TelegramNotifier {
    http: reqwest::Client,
    api_base: String,
    token: String,
    retry: RetryPolicy,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http,
            api_base: TELEGRAM_API.to_string(),
            token: token.into(),
            retry: RetryPolicy::telegram(),
        })
    }

    #[cfg(test)]
    fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.to_string();
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.token.trim().is_empty()
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, ApiError> {
        // токен в пути запроса: reqwest печатает URL в тексте ошибки
        let url = format!("{}/bot{}/{}", self.api_base, self.token, method);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::from(e).without_url())?;
        let parsed: BotResponse<T> = read_json(response).await.map_err(ApiError::without_url)?;
        match (parsed.ok, parsed.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(ApiError::Decode(
                parsed
                    .description
                    .unwrap_or_else(|| format!("{} returned ok=false", method)),
            )),
        }
    }
}

#[async_trait]
impl ChatNotifier for TelegramNotifier {
    async fn send(&self, chat_id: i64, text: &str) -> Result<Option<i64>> {
        if !self.is_enabled() {
            tracing::debug!("Telegram disabled, message to {} skipped: {}", chat_id, text);
            return Ok(None);
        }
        let body = json!({ "chat_id": chat_id, "text": text, "parse_mode": "HTML" });
        let sent: SentMessage = with_retry(&self.retry, "sendMessage", || {
            self.call("sendMessage", &body)
        })
        .await
        .context("Telegram sendMessage failed")?;
        Ok(Some(sent.message_id))
    }

    async fn edit(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "HTML"
        });
        with_retry(&self.retry, "editMessageText", || {
            self.call::<serde_json::Value>("editMessageText", &body)
        })
        .await
        .context("Telegram editMessageText failed")?;
        Ok(())
    }
}

/// Экранирование для parse_mode=HTML
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
