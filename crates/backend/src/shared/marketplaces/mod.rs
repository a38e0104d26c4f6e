pub mod ozon;
pub mod wildberries;

use async_trait::async_trait;
use contracts::domain::a101_store::aggregate::{Store, StoreCredentials};
use contracts::enums::marketplace_type::MarketplaceType;

/// Таймаут проверочного запроса
pub const PING_TIMEOUT_SECS: u64 = 10;

/// Результат проверки ключей маркетплейса
#[derive(Debug, Clone)]
pub struct TestConnectionResult {
    pub success: bool,
    pub message: String,
    pub details: Option<String>,
}

impl TestConnectionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            details: None,
        }
    }

    pub fn failed(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            details,
        }
    }
}

/// Проверка ключей магазина лёгким запросом к API маркетплейса
#[async_trait]
pub trait MarketplaceClient {
    async fn test_connection(credentials: &StoreCredentials) -> TestConnectionResult;
}

/// Проверить ключи магазина
pub async fn test_store_connection(store: &Store) -> TestConnectionResult {
    test_credentials(store.marketplace, &store.credentials).await
}

pub async fn test_credentials(
    marketplace: MarketplaceType,
    credentials: &StoreCredentials,
) -> TestConnectionResult {
    match marketplace {
        MarketplaceType::Ozon => ozon::OzonClient::test_connection(credentials).await,
        MarketplaceType::Wildberries => {
            wildberries::WildberriesClient::test_connection(credentials).await
        }
    }
}

/// HTTP-клиент для проверочных запросов
pub(crate) fn ping_http_client() -> Result<reqwest::Client, TestConnectionResult> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(PING_TIMEOUT_SECS))
        .build()
        .map_err(|e| {
            TestConnectionResult::failed("Ошибка создания HTTP клиента", Some(e.to_string()))
        })
}

/// Понятное сообщение об ошибке отправки запроса
pub(crate) fn describe_send_error(api: &str, host: &str, e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!(
            "Превышено время ожидания ответа от {} (>{} сек). Проверьте доступ к {}",
            api, PING_TIMEOUT_SECS, host
        )
    } else if e.is_connect() {
        format!("Не удалось установить соединение с {}. Ошибка: {}", api, e)
    } else {
        format!("Ошибка запроса к {}: {}", api, e)
    }
}

/// Разобрать ответ проверочного запроса
pub(crate) async fn ping_outcome(
    api: &str,
    response: reqwest::Response,
    success_message: &str,
) -> TestConnectionResult {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status.is_success() {
        TestConnectionResult::ok(success_message)
    } else if status.as_u16() == 401 || status.as_u16() == 403 {
        TestConnectionResult::failed(
            format!("{}: ключи не приняты (HTTP {})", api, status.as_u16()),
            Some(body),
        )
    } else {
        TestConnectionResult::failed(
            format!("{} вернул ошибку (HTTP {})", api, status.as_u16()),
            Some(body),
        )
    }
}
