use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use contracts::domain::a101_store::aggregate::StoreCredentials;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{seller_keys, OZON_SELLER_API};
use crate::shared::format::ozon_ts;
use crate::shared::http_retry::{parse_json, preview, read_body, with_retry, ApiError, RetryPolicy};

/// HTTP-клиент Ozon Seller API для одного магазина
pub struct OzonSellerClient {
    http: reqwest::Client,
    client_id: String,
    api_key: String,
    retry: RetryPolicy,
}

impl OzonSellerClient {
    pub fn new(credentials: &StoreCredentials) -> Result<Self> {
        let (client_id, api_key) = seller_keys(credentials).map_err(anyhow::Error::msg)?;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http,
            client_id,
            api_key,
            retry: RetryPolicy::ozon(),
        })
    }

    async fn send<B: Serialize>(&self, url: &str, body: &B) -> Result<String, ApiError> {
        let response = self
            .http
            .post(url)
            .header("Client-Id", &self.client_id)
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .await?;
        read_body(response).await
    }

    /// POST к Seller API с повторами на 429 / 5xx / сетевых ошибках
    async fn post<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R> {
        let url = format!("{}{}", OZON_SELLER_API, path);
        let text = with_retry(&self.retry, path, || self.send(&url, body))
            .await
            .map_err(|e| {
                tracing::error!("OZON API request {} failed: {}", path, e);
                e
            })
            .with_context(|| format!("OZON API request {} failed", path))?;
        tracing::debug!("OZON API {} response preview: {}", path, preview(&text));
        parse_json::<R>(&text).with_context(|| format!("OZON API {} returned unexpected JSON", path))
    }

    /// Продажи по SKU и дням: POST /v1/analytics/data
    pub async fn analytics_data(
        &self,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<Vec<AnalyticsRow>> {
        let request = AnalyticsDataRequest {
            date_from: date_from.format("%Y-%m-%d").to_string(),
            date_to: date_to.format("%Y-%m-%d").to_string(),
            metrics: vec!["ordered_units", "revenue"],
            dimension: vec!["sku", "day"],
            limit: 1000,
        };
        let response: AnalyticsDataResponse = self.post("/v1/analytics/data", &request).await?;
        Ok(response.result.data)
    }

    /// Финансовые операции: POST /v3/finance/transaction/list
    pub async fn finance_transactions(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<FinanceOperation>> {
        let request = FinanceTransactionRequest {
            filter: FinanceFilter {
                date: FinanceDateFilter {
                    from: ozon_ts(from),
                    to: ozon_ts(to),
                },
                transaction_type: "all",
            },
            page,
            page_size,
        };
        let response: FinanceTransactionResponse = self
            .post("/v3/finance/transaction/list", &request)
            .await?;
        Ok(response.result.operations)
    }

    /// Остатки по складам: POST /v2/analytics/stock_on_warehouses
    pub async fn stock_on_warehouses(&self) -> Result<Vec<StockRow>> {
        let request = serde_json::json!({ "limit": 1000, "offset": 0, "warehouse_type": "ALL" });
        let response: StockResponse = self
            .post("/v2/analytics/stock_on_warehouses", &request)
            .await?;
        Ok(response.result.rows)
    }

    /// Страница возвратов: POST /v1/returns/list (курсор last_id)
    pub async fn returns_page(&self, last_id: i64, limit: u32) -> Result<Vec<ReturnItem>> {
        let request = serde_json::json!({ "filter": {}, "limit": limit, "last_id": last_id });
        let response: ReturnsResponse = self.post("/v1/returns/list", &request).await?;
        Ok(response.returns)
    }

    /// Страница FBO-отправлений: POST /v2/posting/fbo/list
    pub async fn fbo_postings_page(
        &self,
        since: DateTime<Utc>,
        to: DateTime<Utc>,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<FboPosting>> {
        let request = serde_json::json!({
            "dir": "ASC",
            "filter": { "since": ozon_ts(since), "to": ozon_ts(to), "status": "" },
            "limit": limit,
            "offset": offset,
            "translit": true,
            "with": { "analytics_data": true, "financial_data": true }
        });
        let response: FboPostingResponse = self.post("/v2/posting/fbo/list", &request).await?;
        Ok(response.result)
    }

    /// ID завершённых заявок на поставку: POST /v2/supply-order/list
    pub async fn completed_supply_orders(&self) -> Result<Vec<i64>> {
        let request = serde_json::json!({
            "filter": { "states": ["ORDER_STATE_COMPLETED"] },
            "paging": { "from_supply_order_id": 0, "limit": 100 }
        });
        let response: SupplyOrderListResponse = self.post("/v2/supply-order/list", &request).await?;
        Ok(response.supply_order_id)
    }

    /// Заявки на поставку: POST /v2/supply-order/get
    pub async fn supply_orders(&self, order_ids: &[i64]) -> Result<Vec<SupplyOrder>> {
        let request = serde_json::json!({ "order_ids": order_ids });
        let response: SupplyOrderGetResponse = self.post("/v2/supply-order/get", &request).await?;
        Ok(response.orders)
    }

    /// Состав поставок: POST /v1/supply-order/bundle
    pub async fn supply_bundle_items(&self, bundle_ids: &[String]) -> Result<Vec<BundleItem>> {
        let request = serde_json::json!({
            "bundle_ids": bundle_ids,
            "is_asc": true,
            "limit": 100,
            "query": "",
            "sort_field": "UNSPECIFIED"
        });
        let response: BundleResponse = self.post("/v1/supply-order/bundle", &request).await?;
        Ok(response.items)
    }
}

// ============================================================================
// Request/Response structures
// ============================================================================

#[derive(Debug, Serialize)]
struct AnalyticsDataRequest {
    date_from: String,
    date_to: String,
    metrics: Vec<&'static str>,
    dimension: Vec<&'static str>,
    limit: u32,
}

#[derive(Debug, Deserialize)]
struct AnalyticsDataResponse {
    result: AnalyticsDataResult,
}

#[derive(Debug, Deserialize)]
struct AnalyticsDataResult {
    #[serde(default)]
    data: Vec<AnalyticsRow>,
}

/// Строка аналитики: dimensions = [sku, day], metrics = [ordered_units, revenue]
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsRow {
    pub dimensions: Vec<AnalyticsDimension>,
    #[serde(default)]
    pub metrics: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsDimension {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize)]
struct FinanceTransactionRequest {
    filter: FinanceFilter,
    page: u32,
    page_size: u32,
}

#[derive(Debug, Serialize)]
struct FinanceFilter {
    date: FinanceDateFilter,
    transaction_type: &'static str,
}

#[derive(Debug, Serialize)]
struct FinanceDateFilter {
    from: String,
    to: String,
}

#[derive(Debug, Deserialize)]
struct FinanceTransactionResponse {
    #[serde(default)]
    result: FinanceTransactionResult,
}

#[derive(Debug, Default, Deserialize)]
struct FinanceTransactionResult {
    #[serde(default)]
    operations: Vec<FinanceOperation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FinanceOperation {
    #[serde(default)]
    pub operation_type: String,
    #[serde(default)]
    pub operation_type_name: String,
    /// `2024-05-01 13:45:00`
    #[serde(default)]
    pub operation_date: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub accruals_for_sale: f64,
    #[serde(default)]
    pub sale_commission: f64,
    #[serde(default)]
    pub items: Vec<FinanceItem>,
    #[serde(default)]
    pub services: Vec<FinanceService>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FinanceItem {
    #[serde(default)]
    pub sku: i64,
    #[serde(default)]
    pub name: String,
    /// В ответе v3 обычно отсутствует, тогда считается 1
    #[serde(default)]
    pub quantity: Option<i64>,
}

impl FinanceItem {
    pub fn qty(&self) -> i64 {
        self.quantity.unwrap_or(1)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FinanceService {
    pub name: String,
    #[serde(default)]
    pub price: f64,
}

#[derive(Debug, Deserialize)]
struct StockResponse {
    result: StockResult,
}

#[derive(Debug, Deserialize)]
struct StockResult {
    #[serde(default)]
    rows: Vec<StockRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StockRow {
    pub sku: i64,
    #[serde(default)]
    pub free_to_sell_amount: i64,
}

#[derive(Debug, Deserialize)]
struct ReturnsResponse {
    #[serde(default)]
    returns: Vec<ReturnItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReturnItem {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub product: ReturnProduct,
    #[serde(default)]
    pub visual: ReturnVisual,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReturnProduct {
    #[serde(default)]
    pub sku: Option<i64>,
    #[serde(default)]
    pub quantity: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReturnVisual {
    #[serde(default)]
    pub status: ReturnStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReturnStatus {
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
struct FboPostingResponse {
    #[serde(default)]
    result: Vec<FboPosting>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FboPosting {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub products: Vec<FboProduct>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FboProduct {
    pub sku: i64,
    #[serde(default)]
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
struct SupplyOrderListResponse {
    #[serde(default)]
    supply_order_id: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct SupplyOrderGetResponse {
    #[serde(default)]
    orders: Vec<SupplyOrder>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SupplyOrder {
    #[serde(default)]
    pub supplies: Vec<Supply>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Supply {
    #[serde(default)]
    pub supply_state: String,
    #[serde(default)]
    pub bundle_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BundleResponse {
    #[serde(default)]
    items: Vec<BundleItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BundleItem {
    pub sku: i64,
    #[serde(default)]
    pub offer_id: String,
    #[serde(default)]
    pub quantity: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finance_operation_defaults() {
        let op: FinanceOperation = serde_json::from_str(
            r#"{
                "operation_type": "OperationAgentDeliveredToCustomer",
                "operation_type_name": "Доставка покупателю",
                "operation_date": "2024-05-07 10:00:00",
                "accruals_for_sale": 1000,
                "sale_commission": -150.5,
                "amount": 700,
                "items": [{"name": "Чехол", "sku": 111}],
                "services": [{"name": "MarketplaceServiceItemDirectFlowLogistic", "price": -63}]
            }"#,
        )
        .unwrap();
        assert_eq!(op.items[0].qty(), 1);
        assert_eq!(op.services[0].price, -63.0);
        assert_eq!(op.sale_commission, -150.5);
    }

    #[test]
    fn test_analytics_row() {
        let row: AnalyticsRow = serde_json::from_str(
            r#"{"dimensions":[{"id":"111","name":"Чехол"},{"id":"2024-05-07","name":""}],"metrics":[3,1500.5]}"#,
        )
        .unwrap();
        assert_eq!(row.dimensions[1].id, "2024-05-07");
        assert_eq!(row.metrics, vec![3.0, 1500.5]);
    }

    #[test]
    fn test_return_item_without_status() {
        let item: ReturnItem =
            serde_json::from_str(r#"{"id": 5, "product": {"sku": 7, "quantity": 2}}"#).unwrap();
        assert_eq!(item.visual.status.display_name, "");
        assert_eq!(item.product.sku, Some(7));
    }

    #[test]
    fn test_client_requires_keys() {
        assert!(OzonSellerClient::new(&StoreCredentials::default()).is_err());
    }
}
