use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Ошибки HTTP-уровня внешних API (Ozon, Google, Telegram)
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Rate limit exceeded (HTTP 429): {0}")]
    RateLimited(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to parse response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Убрать URL из сетевой ошибки: в пути запроса может быть секрет
    pub fn without_url(self) -> Self {
        match self {
            ApiError::Transport(e) => ApiError::Transport(e.without_url()),
            other => other,
        }
    }

    /// Временный сбой: 429, 5xx или сеть
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::RateLimited(_) | ApiError::Transport(_) => true,
            ApiError::Status { status, .. } => *status >= 500,
            ApiError::Decode(_) => false,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::RateLimited(_) => Some(429),
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Как растёт пауза между попытками
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// base × номер попытки (15, 30, 45 …)
    Linear,
    /// base × 2^(попытка-1) (5, 10, 20 …)
    Exponential,
}

/// Политика повторов для запросов к внешним API
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Пауза после 429
    pub rate_limit_delay: Duration,
    /// Пауза после сетевой ошибки / 5xx
    pub error_delay: Duration,
    pub backoff: Backoff,
    /// Статусы, которые стоит повторить (кроме 429)
    pub retry_statuses: &'static [u16],
}

impl RetryPolicy {
    /// Ozon Seller API: 429 → 15 с × попытка, сетевые ошибки → 10 с × попытка
    pub fn ozon() -> Self {
        Self {
            max_attempts: 5,
            rate_limit_delay: Duration::from_secs(15),
            error_delay: Duration::from_secs(10),
            backoff: Backoff::Linear,
            retry_statuses: &[500, 502, 503, 504],
        }
    }

    /// Google Sheets: 5 попыток, 5 с с удвоением на 429 / 500 / 503
    pub fn sheets() -> Self {
        Self {
            max_attempts: 5,
            rate_limit_delay: Duration::from_secs(5),
            error_delay: Duration::from_secs(5),
            backoff: Backoff::Exponential,
            retry_statuses: &[500, 503],
        }
    }

    /// Telegram: уведомления не должны задерживать отчёт
    pub fn telegram() -> Self {
        Self {
            max_attempts: 2,
            rate_limit_delay: Duration::from_secs(3),
            error_delay: Duration::from_secs(1),
            backoff: Backoff::Linear,
            retry_statuses: &[502, 503],
        }
    }

    /// Без пауз, для тестов
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            rate_limit_delay: Duration::ZERO,
            error_delay: Duration::ZERO,
            backoff: Backoff::Linear,
            retry_statuses: &[500, 503],
        }
    }

    /// Пауза перед повтором после неудачной попытки `attempt` (с 1).
    /// None — ошибка не повторяется.
    pub fn delay_for(&self, attempt: u32, error: &ApiError) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let base = match error {
            ApiError::RateLimited(_) => self.rate_limit_delay,
            ApiError::Status { status, .. } if self.retry_statuses.contains(status) => {
                self.error_delay
            }
            ApiError::Transport(_) => self.error_delay,
            _ => return None,
        };
        let factor = match self.backoff {
            Backoff::Linear => attempt,
            Backoff::Exponential => 1u32 << (attempt - 1).min(16),
        };
        Some(base * factor)
    }
}

/// Выполнить операцию с повторами согласно политике
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => match policy.delay_for(attempt, &err) {
                Some(delay) => {
                    tracing::warn!(
                        "{}: attempt {}/{} failed ({}), retry in {} s",
                        label,
                        attempt,
                        policy.max_attempts,
                        err,
                        delay.as_secs()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(err),
            },
        }
    }
}

/// Проверить статус ответа и вернуть тело
pub async fn read_body(response: reqwest::Response) -> Result<String, ApiError> {
    let status = response.status();
    let body = response.text().await?;
    if status.as_u16() == 429 {
        return Err(ApiError::RateLimited(preview(&body)));
    }
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: preview(&body),
        });
    }
    Ok(body)
}

/// Проверить статус ответа и разобрать JSON
pub async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let body = read_body(response).await?;
    parse_json(&body)
}

pub fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str::<T>(body)
        .map_err(|e| ApiError::Decode(format!("{}. Body: {}", e, preview(body))))
}

/// Первые 500 символов тела для логов и ошибок
pub fn preview(body: &str) -> String {
    let preview: String = body.chars().take(500).collect();
    if preview.len() < body.len() {
        format!("{}...", preview)
    } else {
        preview
    }
}
