use anyhow::Result;
use async_trait::async_trait;
use contracts::domain::a101_store::aggregate::Store;
use contracts::system::tasks::progress::ReportOutcome;
use contracts::usecases::common::ReportKind;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::shared::config::ReportsConfig;
use crate::shared::sheets::SheetStore;
use crate::system::tasks::progress_tracker::ProgressTracker;

/// Сообщение об отмене, по нему раннер отличает отмену от ошибки
pub const CANCELLED_MESSAGE: &str = "Отменено пользователем";

/// Флаг отмены, общий для очереди магазина и выполняемого шага
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Всё, что нужно отчёту для одного запуска
pub struct ReportContext {
    pub store: Store,
    pub sheets: Arc<dyn SheetStore>,
    pub settings: ReportsConfig,
    pub cancel: CancelFlag,
    pub session_id: String,
    pub progress: Arc<ProgressTracker>,
}

impl ReportContext {
    /// Отметить этап в трекере и в логе
    pub fn step(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("[{}] {}", self.store.name, message);
        self.progress.set_step(&self.session_id, message);
    }

    /// Прервать шаг, если пользователь нажал «стоп»
    pub fn ensure_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            anyhow::bail!(CANCELLED_MESSAGE);
        }
        Ok(())
    }
}

pub fn is_cancellation(error: &anyhow::Error) -> bool {
    error.chain().any(|e| e.to_string() == CANCELLED_MESSAGE)
}

/// Общий контракт конвейеров отчётов:
/// загрузка из API → агрегация → сверка с листом → запись изменений
#[async_trait]
pub trait ReportExecutor: Send + Sync {
    fn kind(&self) -> ReportKind;

    async fn execute(&self, ctx: &ReportContext) -> Result<ReportOutcome>;
}

/// Реестр исполнителей отчётов по виду
#[derive(Clone, Default)]
pub struct ReportRegistry {
    executors: HashMap<ReportKind, Arc<dyn ReportExecutor>>,
}

impl ReportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Все отчёты, которые умеет строить сервис
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(crate::usecases::u601_unit_day_report::UnitDayExecutor);
        registry.register(crate::usecases::u602_ad_spend_report::AdSpendExecutor);
        registry.register(crate::usecases::u603_balance_report::BalanceExecutor);
        registry.register(crate::usecases::u604_fin_week_report::FinWeekExecutor);
        registry
    }

    pub fn register<T: ReportExecutor + 'static>(&mut self, executor: T) {
        self.executors.insert(executor.kind(), Arc::new(executor));
    }

    pub fn get(&self, kind: ReportKind) -> Option<Arc<dyn ReportExecutor>> {
        self.executors.get(&kind).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        other.cancel();
        assert!(flag.is_cancelled());
        flag.reset();
        assert!(!other.is_cancelled());
    }

    #[test]
    fn test_is_cancellation() {
        let err = anyhow::anyhow!(CANCELLED_MESSAGE).context("ads");
        assert!(is_cancellation(&err));
        assert!(!is_cancellation(&anyhow::anyhow!("HTTP 500")));
    }

    #[test]
    fn test_default_registry_covers_all_kinds() {
        let registry = ReportRegistry::with_defaults();
        for kind in ReportKind::all() {
            assert_eq!(registry.get(kind).map(|e| e.kind()), Some(kind));
        }
    }
}
