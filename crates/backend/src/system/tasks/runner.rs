use anyhow::Result;
use contracts::domain::a101_store::aggregate::Store;
use contracts::system::tasks::progress::ReportOutcome;
use contracts::usecases::common::{ReportKind, ReportRequest};
use std::sync::Arc;

use super::logger::TaskLogger;
use super::progress_tracker::ProgressTracker;
use crate::shared::config::ReportsConfig;
use crate::shared::sheets::SheetOpener;
use crate::shared::telegram::{escape_html, ChatNotifier};
use crate::usecases::common::pipeline::{is_cancellation, CANCELLED_MESSAGE};
use crate::usecases::common::{CancelFlag, ReportContext, ReportRegistry};

pub const MSG_STARTED: &str = "⏳ Строю отчёт…";
/// Сколько завершённых сессий держать в трекере
const KEEP_FINISHED: usize = 200;

/// Задание для пула: отчёт конкретного магазина
#[derive(Clone)]
pub struct ReportJob {
    pub store: Store,
    pub request: ReportRequest,
    pub cancel: CancelFlag,
}

pub fn success_text(kind: ReportKind, outcome: &ReportOutcome) -> String {
    match &outcome.note {
        Some(note) => format!("✅ Отчёт {} обновлён. {}", kind.display_name(), escape_html(note)),
        None => format!("✅ Отчёт {} обновлён.", kind.display_name()),
    }
}

/// `❌ <отчёт> ERROR:` и последняя строка ошибки
pub fn failure_text(kind: ReportKind, error: &anyhow::Error) -> String {
    let full = format!("{:#}", error);
    let last = full.lines().last().unwrap_or_default();
    format!(
        "❌ {} ERROR:\n<code>{}</code>",
        kind.display_name(),
        escape_html(last)
    )
}

pub fn cancelled_text(kind: ReportKind) -> String {
    format!("⏹ {}: остановлено.", kind.display_name())
}

/// Выполняет один отчёт: сессия прогресса, сообщение в чате, журнал
pub struct ReportRunner {
    registry: ReportRegistry,
    opener: Arc<dyn SheetOpener>,
    notifier: Arc<dyn ChatNotifier>,
    progress: Arc<ProgressTracker>,
    logger: Arc<TaskLogger>,
    settings: ReportsConfig,
}

impl ReportRunner {
    pub fn new(
        registry: ReportRegistry,
        opener: Arc<dyn SheetOpener>,
        notifier: Arc<dyn ChatNotifier>,
        progress: Arc<ProgressTracker>,
        logger: Arc<TaskLogger>,
        settings: ReportsConfig,
    ) -> Self {
        Self {
            registry,
            opener,
            notifier,
            progress,
            logger,
            settings,
        }
    }

    pub fn progress(&self) -> &Arc<ProgressTracker> {
        &self.progress
    }

    pub fn notifier(&self) -> &Arc<dyn ChatNotifier> {
        &self.notifier
    }

    async fn notify_start(&self, chat_id: Option<i64>) -> Option<(i64, i64)> {
        let chat_id = chat_id?;
        match self.notifier.send(chat_id, MSG_STARTED).await {
            Ok(Some(message_id)) => Some((chat_id, message_id)),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Progress message not sent to {}: {:#}", chat_id, e);
                None
            }
        }
    }

    async fn notify_finish(&self, message: Option<(i64, i64)>, text: &str) {
        if let Some((chat_id, message_id)) = message {
            if let Err(e) = self.notifier.edit(chat_id, message_id, text).await {
                tracing::warn!("Progress message not edited in {}: {:#}", chat_id, e);
            }
        }
    }

    async fn execute(&self, job: &ReportJob, session_id: &str) -> Result<ReportOutcome> {
        let kind = job.request.kind;
        let executor = self
            .registry
            .get(kind)
            .ok_or_else(|| anyhow::anyhow!("Report {} is not registered", kind))?;
        if job.cancel.is_cancelled() {
            anyhow::bail!(CANCELLED_MESSAGE);
        }

        let sheets = self
            .opener
            .open(&job.store.sa_path, &job.store.sheet_id)
            .await?;
        let ctx = ReportContext {
            store: job.store.clone(),
            sheets,
            settings: self.settings.clone(),
            cancel: job.cancel.clone(),
            session_id: session_id.to_string(),
            progress: self.progress.clone(),
        };
        executor.execute(&ctx).await
    }

    /// Построить отчёт. Ошибка уже записана в трекер, журнал и чат
    pub async fn run(&self, job: ReportJob) -> Result<ReportOutcome> {
        let kind = job.request.kind;
        let store_id = job.store.store_id.to_string();
        let session_id = uuid::Uuid::new_v4().to_string();

        self.progress.create_session(&session_id, &store_id, kind);
        let step = job.request.step.as_deref().unwrap_or("-");
        self.logger.append(
            &session_id,
            &format!("{} for store {} started (step {})", kind, store_id, step),
        );
        tracing::info!("[{}] {} started, session {}", store_id, kind, session_id);
        let message = self.notify_start(job.request.chat_id).await;

        let result = self.execute(&job, &session_id).await;

        match &result {
            Ok(outcome) => {
                self.progress.complete_session(&session_id, outcome);
                self.logger.append(
                    &session_id,
                    &format!(
                        "completed: {} rows, {} cells",
                        outcome.rows_written, outcome.cells_updated
                    ),
                );
                tracing::info!("[{}] {} OK", store_id, kind);
                self.notify_finish(message, &success_text(kind, outcome)).await;
            }
            Err(e) if is_cancellation(e) => {
                self.progress.cancel_session(&session_id);
                self.logger.append(&session_id, "cancelled");
                tracing::info!("[{}] {} cancelled", store_id, kind);
                self.notify_finish(message, &cancelled_text(kind)).await;
            }
            Err(e) => {
                self.progress.fail_session(&session_id, format!("{:#}", e));
                self.logger.append(&session_id, &format!("failed: {:?}", e));
                tracing::error!("[{}] {} FAIL: {:?}", store_id, kind, e);
                self.notify_finish(message, &failure_text(kind, e)).await;
            }
        }
        self.progress.prune_finished(KEEP_FINISHED);
        result
    }
}
