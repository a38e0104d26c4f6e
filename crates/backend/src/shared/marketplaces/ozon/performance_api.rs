use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use contracts::domain::a101_store::aggregate::StoreCredentials;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::shared::http_retry::{read_body, read_json, with_retry, ApiError, RetryPolicy};

pub const OZON_PERFORMANCE_API: &str = "https://api-performance.ozon.ru";

/// Токен Performance API живёт 30 минут, обновляем с запасом
pub const TOKEN_MAX_AGE: Duration = Duration::from_secs(1500);

/// Кампании в этих состояниях попадают в отчёт
pub const REPORTED_CAMPAIGN_STATES: [&str; 3] = [
    "CAMPAIGN_STATE_RUNNING",
    "CAMPAIGN_STATE_STOPPED",
    "CAMPAIGN_STATE_INACTIVE",
];

/// Состояние асинхронного отчёта статистики
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportState {
    Ready,
    Failed,
    /// NOT_STARTED, IN_PROGRESS и прочие промежуточные
    Pending(String),
}

impl ReportState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "OK" => Self::Ready,
            "FAILED" | "ERROR" => Self::Failed,
            other => Self::Pending(other.to_string()),
        }
    }
}

/// Скачанный файл отчёта
#[derive(Debug, Clone)]
pub struct ReportFile {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Операции Performance API, из которых строится рекламный отчёт
#[async_trait]
pub trait AdStatisticsApi: Send + Sync {
    /// Кампании для отчёта
    async fn reported_campaign_ids(&self) -> Result<Vec<String>>;

    /// Заказать статистику по кампаниям с группировкой по дням. Возвращает UUID отчёта
    async fn request_statistics(
        &self,
        campaign_ids: &[String],
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<String>;

    async fn statistics_state(&self, uuid: &str) -> Result<ReportState>;

    /// Скачать готовый отчёт. None, если сервер его не отдал
    async fn download_report(&self, uuid: &str) -> Result<Option<ReportFile>>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct CampaignListResponse {
    #[serde(default)]
    list: Vec<Campaign>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Campaign {
    pub id: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Deserialize)]
struct StatisticsSubmitResponse {
    #[serde(rename = "UUID")]
    uuid: String,
}

#[derive(Debug, Deserialize)]
struct StatisticsStateResponse {
    #[serde(default)]
    state: String,
}

/// Токен с ограниченным сроком жизни: перевыпускается при первом
/// обращении после `max_age`
pub struct TokenCache {
    max_age: Duration,
    slot: Mutex<Option<(String, Instant)>>,
}

impl TokenCache {
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            slot: Mutex::new(None),
        }
    }

    pub async fn get<F, Fut>(&self, issue: F) -> Result<String, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, ApiError>>,
    {
        let mut guard = self.slot.lock().await;
        match guard.as_ref() {
            Some((value, issued_at)) if issued_at.elapsed() < self.max_age => Ok(value.clone()),
            _ => {
                let value = issue().await?;
                *guard = Some((value.clone(), Instant::now()));
                Ok(value)
            }
        }
    }
}

/// HTTP-клиент Ozon Performance API (реклама).
///
/// Токен client_credentials перевыпускается перед любым запросом,
/// если ему больше [`TOKEN_MAX_AGE`]: ожидание одного отчёта может длиться часами.
/// Каждый запрос повторяется на 429 / 5xx / сетевых ошибках.
pub struct OzonPerformanceClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: TokenCache,
    retry: RetryPolicy,
}

impl OzonPerformanceClient {
    pub fn new(credentials: &StoreCredentials) -> Result<Self> {
        if !credentials.has_performance() {
            anyhow::bail!("Для рекламного отчёта нужны perf_client_id и perf_client_secret");
        }
        let trimmed = |v: &Option<String>| v.as_deref().unwrap_or_default().trim().to_string();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http,
            client_id: trimmed(&credentials.perf_client_id),
            client_secret: trimmed(&credentials.perf_client_secret),
            token: TokenCache::new(TOKEN_MAX_AGE),
            retry: RetryPolicy::ozon(),
        })
    }

    async fn issue_token(&self) -> Result<String, ApiError> {
        let body = serde_json::json!({
            "client_id": self.client_id,
            "client_secret": self.client_secret,
            "grant_type": "client_credentials"
        });
        let response = self
            .http
            .post(format!("{}/api/client/token", OZON_PERFORMANCE_API))
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;
        let token: TokenResponse = read_json(response).await?;
        tracing::info!("[ads] token refreshed");
        Ok(token.access_token)
    }

    async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, ApiError> {
        let token = self.token.get(|| self.issue_token()).await?;
        let response = self
            .http
            .get(format!("{}{}", OZON_PERFORMANCE_API, path))
            .bearer_auth(token)
            .send()
            .await?;
        read_json(response).await
    }

    async fn submit_statistics(&self, body: &serde_json::Value) -> Result<String, ApiError> {
        let token = self.token.get(|| self.issue_token()).await?;
        let response = self
            .http
            .post(format!("{}/api/client/statistics", OZON_PERFORMANCE_API))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        let submitted: StatisticsSubmitResponse = read_json(response).await?;
        Ok(submitted.uuid)
    }

    async fn fetch_report(&self, uuid: &str) -> Result<Option<ReportFile>, ApiError> {
        let token = self.token.get(|| self.issue_token()).await?;
        let response = self
            .http
            .get(format!("{}/api/client/statistics/report", OZON_PERFORMANCE_API))
            .query(&[("UUID", uuid)])
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            let error = match read_body(response).await {
                Err(e) => e,
                Ok(body) => ApiError::Status { status, body },
            };
            if error.is_transient() {
                return Err(error);
            }
            tracing::warn!("[ads] report {} not downloaded: {}", uuid, error);
            return Ok(None);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = response.bytes().await?.to_vec();
        Ok(Some(ReportFile {
            content_type,
            bytes,
        }))
    }
}

#[async_trait]
impl AdStatisticsApi for OzonPerformanceClient {
    /// GET /api/client/campaign
    async fn reported_campaign_ids(&self) -> Result<Vec<String>> {
        let campaigns: CampaignListResponse = with_retry(&self.retry, "ads campaigns", || {
            self.get_json("/api/client/campaign")
        })
        .await
        .context("Performance API: campaign list failed")?;
        Ok(campaigns
            .list
            .into_iter()
            .filter(|c| REPORTED_CAMPAIGN_STATES.contains(&c.state.as_str()))
            .map(|c| c.id)
            .collect())
    }

    async fn request_statistics(
        &self,
        campaign_ids: &[String],
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<String> {
        let body = serde_json::json!({
            "campaigns": campaign_ids,
            "dateFrom": date_from.format("%Y-%m-%d").to_string(),
            "dateTo": date_to.format("%Y-%m-%d").to_string(),
            "groupBy": "DATE"
        });
        with_retry(&self.retry, "ads statistics", || self.submit_statistics(&body))
            .await
            .context("Performance API: statistics request rejected")
    }

    /// GET /api/client/statistics/{uuid}
    async fn statistics_state(&self, uuid: &str) -> Result<ReportState> {
        let path = format!("/api/client/statistics/{}", uuid);
        let state: StatisticsStateResponse =
            with_retry(&self.retry, "ads statistics state", || self.get_json(&path))
                .await
                .context("Performance API: statistics state failed")?;
        Ok(ReportState::parse(&state.state))
    }

    async fn download_report(&self, uuid: &str) -> Result<Option<ReportFile>> {
        with_retry(&self.retry, "ads report download", || self.fetch_report(uuid))
            .await
            .context("Performance API: report download failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn issue_counted(cache: &TokenCache, issued: &AtomicU32) -> String {
        cache
            .get(|| async {
                let n = issued.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(format!("token-{}", n))
            })
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_reissued_after_max_age() {
        let cache = TokenCache::new(TOKEN_MAX_AGE);
        let issued = AtomicU32::new(0);

        assert_eq!(issue_counted(&cache, &issued).await, "token-1");
        tokio::time::advance(TOKEN_MAX_AGE - Duration::from_secs(1)).await;
        assert_eq!(issue_counted(&cache, &issued).await, "token-1");

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(issue_counted(&cache, &issued).await, "token-2");
        assert_eq!(issued.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_issue_keeps_cache_empty() {
        let cache = TokenCache::new(TOKEN_MAX_AGE);
        let err = cache
            .get(|| async { Err(ApiError::RateLimited("slow".into())) })
            .await
            .unwrap_err();
        assert!(err.is_transient());
        let issued = AtomicU32::new(0);
        assert_eq!(issue_counted(&cache, &issued).await, "token-1");
    }

    #[test]
    fn test_report_state() {
        assert_eq!(ReportState::parse("OK"), ReportState::Ready);
        assert_eq!(ReportState::parse("FAILED"), ReportState::Failed);
        assert_eq!(
            ReportState::parse("IN_PROGRESS"),
            ReportState::Pending("IN_PROGRESS".into())
        );
    }

    #[test]
    fn test_client_requires_performance_keys() {
        let creds = StoreCredentials {
            client_id: Some("1".into()),
            api_key: "k".into(),
            perf_client_id: Some("id".into()),
            perf_client_secret: None,
        };
        assert!(OzonPerformanceClient::new(&creds).is_err());
    }

    #[test]
    fn test_campaign_list_parsing() {
        let parsed: CampaignListResponse = serde_json::from_str(
            r#"{"list":[{"id":"1","state":"CAMPAIGN_STATE_RUNNING"},{"id":"2","state":"CAMPAIGN_STATE_ARCHIVED"}],"total":"2"}"#,
        )
        .unwrap();
        let kept: Vec<_> = parsed
            .list
            .iter()
            .filter(|c| REPORTED_CAMPAIGN_STATES.contains(&c.state.as_str()))
            .collect();
        assert_eq!(kept.len(), 1);
    }
}
