use serde::{Deserialize, Serialize};

use crate::enums::MarketplaceType;

// ============================================================================
// ID Type
// ============================================================================

/// Идентификатор магазина: Client-Id для Ozon, произвольный UUID для WB
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreId(pub String);

impl StoreId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Сгенерировать идентификатор для магазина без Client-Id
    pub fn new_v4() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for StoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Ключи доступа к API маркетплейса. Хранятся JSON-строкой в колонке E листа Stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreCredentials {
    #[serde(default)]
    pub client_id: Option<String>,
    pub api_key: String,
    /// Performance API (реклама Ozon)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perf_client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perf_client_secret: Option<String>,
}

impl StoreCredentials {
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("Invalid credentials_json: {}", e))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Есть ли ключи Performance API
    pub fn has_performance(&self) -> bool {
        matches!(
            (&self.perf_client_id, &self.perf_client_secret),
            (Some(id), Some(secret)) if !id.trim().is_empty() && !secret.trim().is_empty()
        )
    }
}

// ============================================================================
// Aggregate Root
// ============================================================================

/// Магазин пользователя. Персистится строкой листа `Stores` тех-таблицы:
/// `store_id | owner_id | marketplace | name | credentials_json | sheet_id | sa_path`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    pub store_id: StoreId,
    /// tg_id владельца
    pub owner_id: i64,
    pub marketplace: MarketplaceType,
    pub name: String,
    pub credentials: StoreCredentials,
    /// ID Google-таблицы с отчётами магазина
    pub sheet_id: String,
    /// Путь к JSON сервисного аккаунта, которым пишем в таблицу
    pub sa_path: String,
}

/// Количество колонок строки магазина
pub const STORE_ROW_WIDTH: usize = 7;

impl Store {
    pub fn new_for_insert(
        store_id: StoreId,
        owner_id: i64,
        marketplace: MarketplaceType,
        credentials: StoreCredentials,
        sheet_id: String,
        sa_path: String,
    ) -> Self {
        let prefix: String = store_id.as_str().chars().take(6).collect();
        let name = format!("{}-{}", marketplace.code().to_uppercase(), prefix);
        Self {
            store_id,
            owner_id,
            marketplace,
            name,
            credentials,
            sheet_id,
            sa_path,
        }
    }

    /// Разобрать строку листа Stores
    pub fn from_row(row: &[String]) -> anyhow::Result<Self> {
        let cell = |i: usize| row.get(i).map(|s| s.trim().to_string()).unwrap_or_default();

        let store_id = cell(0);
        if store_id.is_empty() {
            anyhow::bail!("Store row without store_id");
        }
        let owner_id = cell(1)
            .parse::<i64>()
            .map_err(|e| anyhow::anyhow!("Store {}: bad owner_id: {}", store_id, e))?;
        let marketplace = MarketplaceType::from_code(&cell(2))
            .ok_or_else(|| anyhow::anyhow!("Store {}: unknown marketplace '{}'", store_id, cell(2)))?;
        let credentials = StoreCredentials::from_json(&cell(4))?;

        Ok(Self {
            store_id: StoreId(store_id),
            owner_id,
            marketplace,
            name: cell(3),
            credentials,
            sheet_id: cell(5),
            sa_path: cell(6),
        })
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.store_id.0.clone(),
            self.owner_id.to_string(),
            self.marketplace.code().to_string(),
            self.name.clone(),
            self.credentials.to_json(),
            self.sheet_id.clone(),
            self.sa_path.clone(),
        ]
    }

    pub fn summary(&self) -> StoreSummary {
        StoreSummary {
            store_id: self.store_id.clone(),
            marketplace: self.marketplace,
            name: self.name.clone(),
        }
    }
}

/// Краткая информация для меню магазинов
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSummary {
    pub store_id: StoreId,
    pub marketplace: MarketplaceType,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_store_row_roundtrip_keeps_layout() {
        let store = Store::new_for_insert(
            StoreId::new("2567268"),
            42,
            MarketplaceType::Ozon,
            StoreCredentials {
                client_id: Some("2567268".into()),
                api_key: "key".into(),
                ..Default::default()
            },
            "sheet".into(),
            "sa/one.json".into(),
        );
        assert_eq!(store.name, "OZON-256726");

        let cells = store.to_row();
        assert_eq!(cells.len(), STORE_ROW_WIDTH);
        assert_eq!(cells[2], "ozon");

        let parsed = Store::from_row(&cells).unwrap();
        assert_eq!(parsed.store_id, store.store_id);
        assert_eq!(parsed.credentials, store.credentials);
        assert_eq!(parsed.sa_path, "sa/one.json");
    }

    #[test]
    fn test_from_row_rejects_unknown_marketplace() {
        let cells = row(&["1", "2", "ym", "x", "{\"api_key\":\"k\"}", "s", "p"]);
        assert!(Store::from_row(&cells).is_err());
    }

    #[test]
    fn test_has_performance() {
        let mut creds = StoreCredentials {
            api_key: "k".into(),
            ..Default::default()
        };
        assert!(!creds.has_performance());
        creds.perf_client_id = Some("id".into());
        creds.perf_client_secret = Some(" ".into());
        assert!(!creds.has_performance());
        creds.perf_client_secret = Some("secret".into());
        assert!(creds.has_performance());
    }
}
