pub mod performance_api;
pub mod seller_api;

use super::{describe_send_error, ping_http_client, ping_outcome, MarketplaceClient, TestConnectionResult};
use async_trait::async_trait;
use contracts::domain::a101_store::aggregate::StoreCredentials;

pub const OZON_SELLER_API: &str = "https://api-seller.ozon.ru";

/// Клиент для проверки ключей Ozon Seller API
pub struct OzonClient;

/// Client-Id и Api-Key из ключей магазина
pub fn seller_keys(credentials: &StoreCredentials) -> Result<(String, String), String> {
    let client_id = match credentials.client_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => return Err("Для Ozon требуется Client-Id".into()),
    };
    let api_key = credentials.api_key.trim();
    if api_key.is_empty() {
        return Err("API Key не может быть пустым".into());
    }
    Ok((client_id, api_key.to_string()))
}

#[async_trait]
impl MarketplaceClient for OzonClient {
    async fn test_connection(credentials: &StoreCredentials) -> TestConnectionResult {
        let (client_id, api_key) = match seller_keys(credentials) {
            Ok(keys) => keys,
            Err(message) => return TestConnectionResult::failed(message, None),
        };

        let client = match ping_http_client() {
            Ok(c) => c,
            Err(result) => return result,
        };

        // Самый дешёвый метод, доступный любому ключу с правом чтения отправлений
        let url = format!("{}/v1/posting/fbs/list", OZON_SELLER_API);
        let response = match client
            .post(&url)
            .header("Client-Id", &client_id)
            .header("Api-Key", &api_key)
            .json(&serde_json::json!({ "limit": 1 }))
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                return TestConnectionResult::failed(
                    describe_send_error("Ozon API", "api-seller.ozon.ru", &e),
                    Some(format!("URL: {}, Client-Id: {}, Ошибка: {:?}", url, client_id, e)),
                )
            }
        };

        ping_outcome("Ozon API", response, "Подключение к Ozon успешно установлено").await
    }
}
