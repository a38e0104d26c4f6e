use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::usecases::common::ReportKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Прогресс построения одного отчёта (для мониторинга в памяти)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportProgress {
    pub session_id: String,
    pub store_id: String,
    pub kind: ReportKind,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    /// Текущий этап ("Загрузка операций за 2024-05" и т.п.)
    pub current_step: Option<String>,
    pub rows_written: i32,
    pub cells_updated: i32,
    pub errors: Vec<ReportError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportError {
    pub message: String,
    pub details: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl ReportProgress {
    pub fn new(session_id: String, store_id: String, kind: ReportKind) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            store_id,
            kind,
            status: TaskStatus::Running,
            started_at: now,
            completed_at: None,
            updated_at: now,
            current_step: None,
            rows_written: 0,
            cells_updated: 0,
            errors: Vec::new(),
        }
    }

    pub fn add_error(&mut self, message: String, details: Option<String>) {
        self.errors.push(ReportError {
            message,
            details,
            occurred_at: Utc::now(),
        });
    }
}

/// Итог выполнения отчёта, который возвращает executor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportOutcome {
    /// Сколько строк записано (перезапись / дозапись)
    pub rows_written: usize,
    /// Сколько ячеек или диапазонов обновлено точечно
    pub cells_updated: usize,
    /// Короткое пояснение для чата, если данных не было
    pub note: Option<String>,
}

impl ReportOutcome {
    pub fn empty(note: impl Into<String>) -> Self {
        Self {
            note: Some(note.into()),
            ..Default::default()
        }
    }
}
