use serde::{Deserialize, Serialize};

/// Типы маркетплейсов, для которых строятся отчёты
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketplaceType {
    Ozon,
    #[serde(rename = "wb")]
    Wildberries,
}

impl MarketplaceType {
    /// Код маркетплейса в строке магазина (`ozon` / `wb`)
    pub fn code(&self) -> &'static str {
        match self {
            MarketplaceType::Ozon => "ozon",
            MarketplaceType::Wildberries => "wb",
        }
    }

    /// Получить человекочитаемое название
    pub fn display_name(&self) -> &'static str {
        match self {
            MarketplaceType::Ozon => "Ozon",
            MarketplaceType::Wildberries => "Wildberries",
        }
    }

    pub fn all() -> Vec<MarketplaceType> {
        vec![MarketplaceType::Ozon, MarketplaceType::Wildberries]
    }

    /// Парсинг из строки (регистр не важен)
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_lowercase().as_str() {
            "ozon" => Some(MarketplaceType::Ozon),
            "wb" | "wildberries" => Some(MarketplaceType::Wildberries),
            _ => None,
        }
    }
}

impl std::fmt::Display for MarketplaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code() {
        assert_eq!(MarketplaceType::from_code("ozon"), Some(MarketplaceType::Ozon));
        assert_eq!(MarketplaceType::from_code(" WB "), Some(MarketplaceType::Wildberries));
        assert_eq!(MarketplaceType::from_code("ym"), None);
    }

    #[test]
    fn test_serde_uses_row_codes() {
        let json = serde_json::to_string(&MarketplaceType::Wildberries).unwrap();
        assert_eq!(json, "\"wb\"");
    }
}
