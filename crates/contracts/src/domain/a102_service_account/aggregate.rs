use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceAccountStatus {
    Active,
    Disabled,
}

impl ServiceAccountStatus {
    /// Пустой статус считается активным: старые строки листа его не заполняли
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "" | "active" => Self::Active,
            _ => Self::Disabled,
        }
    }
}

/// Сервисный аккаунт Google из листа `service_acc`:
/// `path | - | used_count | email | status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceAccount {
    pub json_path: String,
    pub email: String,
    pub used_count: i64,
    pub status: ServiceAccountStatus,
}

impl ServiceAccount {
    pub fn from_row(row: &[String]) -> Option<Self> {
        let cell = |i: usize| row.get(i).map(|s| s.trim()).unwrap_or_default();
        let json_path = cell(0);
        if json_path.is_empty() {
            return None;
        }
        Some(Self {
            json_path: json_path.to_string(),
            email: cell(3).to_string(),
            used_count: cell(2).parse().unwrap_or(0),
            status: ServiceAccountStatus::parse(cell(4)),
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == ServiceAccountStatus::Active
    }
}

/// Выбранный аккаунт, который назначается магазину
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceAccountPick {
    pub path: String,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_row() {
        let row: Vec<String> = ["sa/a.json", "", "3", "a@x.iam", "disabled"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let sa = ServiceAccount::from_row(&row).unwrap();
        assert_eq!(sa.used_count, 3);
        assert_eq!(sa.email, "a@x.iam");
        assert!(!sa.is_active());

        let short: Vec<String> = vec!["sa/b.json".into()];
        let sa = ServiceAccount::from_row(&short).unwrap();
        assert_eq!(sa.used_count, 0);
        assert!(sa.is_active());
    }
}
