use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

use super::a1::qualified;
use super::google_auth::ServiceAccountAuth;
use super::{CellRange, SheetStore, Worksheet};
use crate::shared::http_retry::{read_json, with_retry, ApiError, RetryPolicy};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// HTTP-клиент Google Sheets API v4 для одной таблицы
pub struct GoogleSheetsClient {
    http: reqwest::Client,
    auth: Arc<ServiceAccountAuth>,
    spreadsheet_id: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl GoogleSheetsClient {
    pub fn new(auth: Arc<ServiceAccountAuth>, spreadsheet_id: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http,
            auth,
            spreadsheet_id: spreadsheet_id.into(),
            retry: RetryPolicy::sheets(),
        })
    }

    /// Открыть таблицу от имени сервисного аккаунта из JSON-файла
    pub async fn open(sa_path: &Path, spreadsheet_id: &str) -> Result<Self> {
        let http = reqwest::Client::new();
        let auth = ServiceAccountAuth::for_path(sa_path, &http).await?;
        Self::new(auth, spreadsheet_id)
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    pub fn service_account_email(&self) -> &str {
        self.auth.email()
    }

    fn values_url(&self, range: &str, suffix: &str) -> String {
        format!(
            "{}/{}/values/{}{}",
            SHEETS_API,
            self.spreadsheet_id,
            urlencoding::encode(range),
            suffix
        )
    }

    async fn call(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        let token = self.auth.access_token().await?;
        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        read_json::<Value>(response).await
    }

    async fn send(&self, label: &str, method: Method, url: String, body: Option<Value>) -> Result<Value> {
        let value = with_retry(&self.retry, label, || {
            self.call(method.clone(), &url, body.as_ref())
        })
        .await
        .with_context(|| format!("Google Sheets {} failed", label))?;
        Ok(value)
    }

    async fn list_worksheets(&self) -> Result<Vec<Worksheet>> {
        let url = format!(
            "{}/{}?fields=sheets.properties(sheetId,title)",
            SHEETS_API, self.spreadsheet_id
        );
        let raw = self.send("metadata", Method::GET, url, None).await?;
        let meta: SpreadsheetMeta =
            serde_json::from_value(raw).context("Unexpected spreadsheet metadata")?;
        Ok(meta
            .sheets
            .into_iter()
            .map(|s| Worksheet {
                sheet_id: s.properties.sheet_id,
                title: s.properties.title,
            })
            .collect())
    }
}

#[async_trait]
impl SheetStore for GoogleSheetsClient {
    async fn find_worksheet(&self, title: &str) -> Result<Option<Worksheet>> {
        Ok(self
            .list_worksheets()
            .await?
            .into_iter()
            .find(|w| w.title == title))
    }

    async fn ensure_worksheet(&self, title: &str, rows: u32, cols: u32) -> Result<Worksheet> {
        if let Some(ws) = self.find_worksheet(title).await? {
            return Ok(ws);
        }

        tracing::info!("Creating worksheet '{}' in {}", title, self.spreadsheet_id);
        let url = format!("{}/{}:batchUpdate", SHEETS_API, self.spreadsheet_id);
        let body = json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": title,
                        "gridProperties": { "rowCount": rows, "columnCount": cols }
                    }
                }
            }]
        });
        let reply = self.send("addSheet", Method::POST, url, Some(body)).await?;
        let sheet_id = reply["replies"][0]["addSheet"]["properties"]["sheetId"]
            .as_i64()
            .ok_or_else(|| anyhow::anyhow!("addSheet reply without sheetId"))?;
        Ok(Worksheet {
            sheet_id,
            title: title.to_string(),
        })
    }

    async fn read_all(&self, title: &str) -> Result<Vec<Vec<String>>> {
        let url = self.values_url(&qualified(title, "A1:ZZ"), "");
        let raw = self.send("values.get", Method::GET, url, None).await?;
        let parsed: ValuesResponse =
            serde_json::from_value(raw).context("Unexpected values response")?;
        Ok(parsed
            .values
            .iter()
            .map(|row| row.iter().map(super::value_text).collect())
            .collect())
    }

    async fn update(&self, title: &str, start: &str, values: Vec<Vec<Value>>) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let range = qualified(title, start);
        let url = self.values_url(&range, "?valueInputOption=USER_ENTERED");
        let body = json!({ "range": range, "majorDimension": "ROWS", "values": values });
        self.send("values.update", Method::PUT, url, Some(body)).await?;
        Ok(())
    }

    async fn batch_update_values(&self, title: &str, data: Vec<CellRange>) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let url = format!("{}/{}/values:batchUpdate", SHEETS_API, self.spreadsheet_id);
        let data: Vec<Value> = data
            .into_iter()
            .map(|d| json!({ "range": qualified(title, &d.range), "values": d.values }))
            .collect();
        let body = json!({ "valueInputOption": "USER_ENTERED", "data": data });
        self.send("values.batchUpdate", Method::POST, url, Some(body))
            .await?;
        Ok(())
    }

    async fn append_rows(&self, title: &str, rows: Vec<Vec<Value>>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let url = self.values_url(
            &qualified(title, "A1"),
            ":append?valueInputOption=USER_ENTERED&insertDataOption=INSERT_ROWS",
        );
        let body = json!({ "majorDimension": "ROWS", "values": rows });
        self.send("values.append", Method::POST, url, Some(body)).await?;
        Ok(())
    }

    async fn clear(&self, title: &str) -> Result<()> {
        let url = self.values_url(&qualified(title, "A1:ZZ"), ":clear");
        self.send("values.clear", Method::POST, url, Some(json!({})))
            .await?;
        Ok(())
    }

    async fn batch_update(&self, requests: Vec<Value>) -> Result<()> {
        if requests.is_empty() {
            return Ok(());
        }
        let url = format!("{}/{}:batchUpdate", SHEETS_API, self.spreadsheet_id);
        self.send(
            "batchUpdate",
            Method::POST,
            url,
            Some(json!({ "requests": requests })),
        )
        .await?;
        Ok(())
    }
}
