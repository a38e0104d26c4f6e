use contracts::system::tasks::progress::{ReportOutcome, ReportProgress, TaskStatus};
use contracts::usecases::common::ReportKind;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Трекер прогресса отчётов (in-memory, для мониторинга)
#[derive(Clone, Default)]
pub struct ProgressTracker {
    sessions: Arc<RwLock<HashMap<String, ReportProgress>>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Создать новую сессию отчёта
    pub fn create_session(&self, session_id: &str, store_id: &str, kind: ReportKind) {
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.insert(
                session_id.to_string(),
                ReportProgress::new(session_id.to_string(), store_id.to_string(), kind),
            );
        }
    }

    pub fn get_progress(&self, session_id: &str) -> Option<ReportProgress> {
        self.sessions
            .read()
            .ok()
            .and_then(|sessions| sessions.get(session_id).cloned())
    }

    /// Сессии магазина, последние сверху
    pub fn list_for_store(&self, store_id: &str) -> Vec<ReportProgress> {
        let mut list: Vec<ReportProgress> = self
            .sessions
            .read()
            .map(|sessions| {
                sessions
                    .values()
                    .filter(|p| p.store_id == store_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        list.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        list
    }

    fn update(&self, session_id: &str, f: impl FnOnce(&mut ReportProgress)) {
        if let Ok(mut sessions) = self.sessions.write() {
            if let Some(progress) = sessions.get_mut(session_id) {
                f(progress);
                progress.updated_at = chrono::Utc::now();
            }
        }
    }

    /// Установить текущий этап
    pub fn set_step(&self, session_id: &str, step: impl Into<String>) {
        let step = step.into();
        self.update(session_id, |p| p.current_step = Some(step));
    }

    pub fn add_error(&self, session_id: &str, message: String, details: Option<String>) {
        self.update(session_id, |p| p.add_error(message, details));
    }

    /// Завершить сессию с итогом
    pub fn complete_session(&self, session_id: &str, outcome: &ReportOutcome) {
        self.finish(session_id, TaskStatus::Completed, Some(outcome));
    }

    pub fn fail_session(&self, session_id: &str, error: String) {
        self.update(session_id, |p| p.add_error(error, None));
        self.finish(session_id, TaskStatus::Failed, None);
    }

    pub fn cancel_session(&self, session_id: &str) {
        self.finish(session_id, TaskStatus::Cancelled, None);
    }

    fn finish(&self, session_id: &str, status: TaskStatus, outcome: Option<&ReportOutcome>) {
        self.update(session_id, |p| {
            p.status = status;
            p.completed_at = Some(chrono::Utc::now());
            p.current_step = None;
            if let Some(outcome) = outcome {
                p.rows_written = outcome.rows_written as i32;
                p.cells_updated = outcome.cells_updated as i32;
            }
        });
    }

    /// Удалить завершённые сессии, оставив не больше `keep` последних
    pub fn prune_finished(&self, keep: usize) {
        if let Ok(mut sessions) = self.sessions.write() {
            let mut finished: Vec<(chrono::DateTime<chrono::Utc>, String)> = sessions
                .values()
                .filter(|p| p.completed_at.is_some())
                .map(|p| (p.started_at, p.session_id.clone()))
                .collect();
            if finished.len() <= keep {
                return;
            }
            finished.sort();
            let excess = finished.len() - keep;
            for (_, id) in finished.into_iter().take(excess) {
                sessions.remove(&id);
            }
        }
    }
}
