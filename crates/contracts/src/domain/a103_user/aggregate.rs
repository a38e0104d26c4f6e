use serde::{Deserialize, Serialize};

/// Пользователь бота, строка листа `Users`: `tg_id | username | full_name`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub tg_id: i64,
    pub username: Option<String>,
    pub full_name: Option<String>,
}

impl User {
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.tg_id.to_string(),
            self.username.clone().unwrap_or_default(),
            self.full_name.clone().unwrap_or_default(),
        ]
    }
}
