use super::{describe_send_error, ping_http_client, ping_outcome, MarketplaceClient, TestConnectionResult};
use async_trait::async_trait;
use contracts::domain::a101_store::aggregate::StoreCredentials;

const WB_SUPPLIERS_API: &str = "https://suppliers-api.wildberries.ru";

/// Клиент Wildberries Supplier API (только проверка ключа)
pub struct WildberriesClient;

/// Ключ без переводов строк и табуляций, которые часто прилетают при копировании
pub fn clean_api_key(raw: &str) -> String {
    raw.trim().replace(['\n', '\r', '\t'], "")
}

#[async_trait]
impl MarketplaceClient for WildberriesClient {
    async fn test_connection(credentials: &StoreCredentials) -> TestConnectionResult {
        let api_key = clean_api_key(&credentials.api_key);
        if api_key.is_empty() {
            return TestConnectionResult::failed("API Key не может быть пустым", None);
        }
        if !api_key.is_ascii() {
            return TestConnectionResult::failed(
                "API ключ содержит недопустимые символы",
                Some("Ключ должен содержать только ASCII символы".into()),
            );
        }

        let client = match ping_http_client() {
            Ok(c) => c,
            Err(result) => return result,
        };

        let url = format!("{}/api/v3/orders", WB_SUPPLIERS_API);
        let response = match client
            .get(&url)
            .query(&[("limit", "1")])
            .header("Authorization", api_key.as_str())
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                return TestConnectionResult::failed(
                    describe_send_error("Wildberries API", "suppliers-api.wildberries.ru", &e),
                    Some(format!("URL: {}, Ошибка: {:?}", url, e)),
                )
            }
        };

        ping_outcome(
            "Wildberries API",
            response,
            "Подключение к Wildberries успешно установлено",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_api_key() {
        assert_eq!(clean_api_key("  abc\r\n"), "abc");
        assert_eq!(clean_api_key("a\tb"), "ab");
    }

    #[tokio::test]
    async fn test_empty_key_fails_without_request() {
        let result = WildberriesClient::test_connection(&StoreCredentials::default()).await;
        assert!(!result.success);
        assert_eq!(result.message, "API Key не может быть пустым");
    }
}
