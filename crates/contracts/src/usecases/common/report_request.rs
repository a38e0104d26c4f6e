use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ReportKind;
use crate::domain::a101_store::aggregate::StoreId;

/// Кто поставил отчёт в очередь
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportTrigger {
    /// Кнопка «Обновить отчёт» / команда CLI
    #[default]
    Manual,
    /// Автоцикл магазина
    Schedule,
}

/// Запрос на построение отчёта
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    pub store_id: StoreId,
    pub kind: ReportKind,
    /// Чат, в котором показывается прогресс (None — без уведомлений)
    #[serde(default)]
    pub chat_id: Option<i64>,
    #[serde(default)]
    pub trigger: ReportTrigger,
    /// Позиция в цепочке, например "1/2"
    #[serde(default)]
    pub step: Option<String>,
    pub requested_at: DateTime<Utc>,
}

impl ReportRequest {
    pub fn new(store_id: StoreId, kind: ReportKind, chat_id: Option<i64>) -> Self {
        Self {
            store_id,
            kind,
            chat_id,
            trigger: ReportTrigger::Manual,
            step: None,
            requested_at: Utc::now(),
        }
    }

    pub fn scheduled(mut self, step: String) -> Self {
        self.trigger = ReportTrigger::Schedule;
        self.step = Some(step);
        self
    }
}
