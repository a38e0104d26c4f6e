//! Очередь магазина: автоцикл `unit-day → ads` и ручные запросы

use anyhow::Result;
use contracts::domain::a101_store::aggregate::Store;
use contracts::enums::MarketplaceType;
use contracts::usecases::common::{ReportKind, ReportRequest, ReportTrigger};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::queue::ReportQueue;
use super::runner::ReportJob;
use crate::shared::telegram::ChatNotifier;
use crate::usecases::common::CancelFlag;

pub const MSG_QUEUED: &str = "ℹ️ Отчёт добавлен в очередь.";

/// Подтверждение ручного запроса с ориентировочной длительностью
pub fn queued_text(kind: ReportKind) -> String {
    format!("{}\n{} {}", MSG_QUEUED, kind.display_name(), kind.estimate())
}

/// Отчёты автоцикла, которые магазин может построить: оба строятся по
/// Ozon Seller API, реклама требует ещё ключей Performance API
pub fn auto_chain_for(store: &Store) -> Vec<ReportKind> {
    if store.marketplace != MarketplaceType::Ozon {
        return Vec::new();
    }
    ReportKind::auto_chain()
        .into_iter()
        .filter(|kind| *kind != ReportKind::AdSpend || store.credentials.has_performance())
        .collect()
}

enum StoreCommand {
    Run(ReportRequest),
    /// Метка после отмены: всё, что стояло до неё, пропускается
    ResetCancel,
}

pub struct StoreWorker {
    store: Store,
    sender: mpsc::UnboundedSender<StoreCommand>,
    cancel: CancelFlag,
    /// Запланированные автоциклом и ещё не взятые в работу
    scheduled_pending: Arc<AtomicUsize>,
    notifier: Arc<dyn ChatNotifier>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl StoreWorker {
    /// Запустить исполнителя магазина. `autoloop = None` отключает автоцикл
    pub fn start(
        store: Store,
        queue: Arc<ReportQueue>,
        notifier: Arc<dyn ChatNotifier>,
        autoloop: Option<Duration>,
    ) -> Arc<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel = CancelFlag::new();
        let scheduled_pending = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![tokio::spawn(Self::work(
            store.clone(),
            receiver,
            queue,
            cancel.clone(),
            scheduled_pending.clone(),
        ))];
        if let Some(period) = autoloop {
            handles.push(tokio::spawn(Self::autoloop(
                store.clone(),
                sender.clone(),
                scheduled_pending.clone(),
                period,
            )));
        }

        Arc::new(Self {
            store,
            sender,
            cancel,
            scheduled_pending,
            notifier,
            handles: Mutex::new(handles),
        })
    }

    async fn work(
        store: Store,
        mut receiver: mpsc::UnboundedReceiver<StoreCommand>,
        queue: Arc<ReportQueue>,
        cancel: CancelFlag,
        scheduled_pending: Arc<AtomicUsize>,
    ) {
        let store_id = store.store_id.to_string();
        while let Some(command) = receiver.recv().await {
            let request = match command {
                StoreCommand::ResetCancel => {
                    cancel.reset();
                    tracing::info!("[{}] queue drained, cancel flag reset", store_id);
                    continue;
                }
                StoreCommand::Run(request) => request,
            };
            if request.trigger == ReportTrigger::Schedule {
                scheduled_pending.fetch_sub(1, Ordering::SeqCst);
            }
            if cancel.is_cancelled() {
                tracing::info!("[{}] {} skipped after cancel", store_id, request.kind);
                continue;
            }
            let job = ReportJob {
                store: store.clone(),
                request,
                cancel: cancel.clone(),
            };
            // итог уже записан раннером
            if let Err(e) = queue.run(job).await {
                tracing::debug!("[{}] job finished with error: {:#}", store_id, e);
            }
        }
    }

    async fn autoloop(
        store: Store,
        sender: mpsc::UnboundedSender<StoreCommand>,
        scheduled_pending: Arc<AtomicUsize>,
        period: Duration,
    ) {
        let chain = auto_chain_for(&store);
        if chain.is_empty() {
            tracing::info!(
                "[{}] no automatic reports for {}",
                store.store_id,
                store.marketplace.code()
            );
            return;
        }
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if scheduled_pending.load(Ordering::SeqCst) > 0 {
                tracing::info!(
                    "[{}] previous auto chain still queued, tick skipped",
                    store.store_id
                );
                continue;
            }
            for (i, kind) in chain.iter().enumerate() {
                let request =
                    ReportRequest::new(store.store_id.clone(), *kind, Some(store.owner_id))
                        .scheduled(format!("{}/{}", i + 1, chain.len()));
                scheduled_pending.fetch_add(1, Ordering::SeqCst);
                if sender.send(StoreCommand::Run(request)).is_err() {
                    return;
                }
            }
            tracing::debug!("[{}] auto chain queued", store.store_id);
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Поставить запрос в очередь магазина без уведомления
    pub fn push(&self, request: ReportRequest) -> Result<()> {
        self.sender
            .send(StoreCommand::Run(request))
            .map_err(|_| anyhow::anyhow!("Store worker {} is stopped", self.store.store_id))
    }

    /// Ручной запрос: в очередь и подтверждение в чат
    pub async fn enqueue(&self, kind: ReportKind, chat_id: Option<i64>) -> Result<()> {
        self.push(ReportRequest::new(self.store.store_id.clone(), kind, chat_id))?;
        if let Some(chat_id) = chat_id {
            if let Err(e) = self.notifier.send(chat_id, &queued_text(kind)).await {
                tracing::warn!("Queue ack not sent to {}: {:#}", chat_id, e);
            }
        }
        Ok(())
    }

    /// Остановить текущий шаг и выбросить всё, что стоит в очереди
    pub fn cancel(&self) -> Result<()> {
        self.cancel.cancel();
        self.sender
            .send(StoreCommand::ResetCancel)
            .map_err(|_| anyhow::anyhow!("Store worker {} is stopped", self.store.store_id))
    }

    pub fn is_cancelling(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn scheduled_pending(&self) -> usize {
        self.scheduled_pending.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        if let Ok(mut handles) = self.handles.lock() {
            for handle in handles.drain(..) {
                handle.abort();
            }
        }
    }
}

impl Drop for StoreWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Исполнители всех магазинов процесса
pub struct StoreWorkers {
    queue: Arc<ReportQueue>,
    notifier: Arc<dyn ChatNotifier>,
    autoloop: Option<Duration>,
    workers: Mutex<HashMap<String, Arc<StoreWorker>>>,
}

impl StoreWorkers {
    pub fn new(
        queue: Arc<ReportQueue>,
        notifier: Arc<dyn ChatNotifier>,
        autoloop: Option<Duration>,
    ) -> Self {
        Self {
            queue,
            notifier,
            autoloop,
            workers: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_start(&self, store: &Store) -> Result<Arc<StoreWorker>> {
        let mut workers = self
            .workers
            .lock()
            .map_err(|_| anyhow::anyhow!("Store workers lock poisoned"))?;
        let worker = workers
            .entry(store.store_id.to_string())
            .or_insert_with(|| {
                tracing::info!("[{}] store worker started", store.store_id);
                StoreWorker::start(
                    store.clone(),
                    self.queue.clone(),
                    self.notifier.clone(),
                    self.autoloop,
                )
            });
        Ok(worker.clone())
    }

    pub fn get(&self, store_id: &str) -> Option<Arc<StoreWorker>> {
        self.workers.lock().ok()?.get(store_id).cloned()
    }

    /// Остановить исполнителя удалённого магазина
    pub fn remove(&self, store_id: &str) -> bool {
        let removed = self
            .workers
            .lock()
            .ok()
            .and_then(|mut workers| workers.remove(store_id));
        match removed {
            Some(worker) => {
                worker.stop();
                true
            }
            None => false,
        }
    }

    pub fn store_ids(&self) -> Vec<String> {
        self.workers
            .lock()
            .map(|w| w.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.workers.lock().map(|w| w.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::sheets::memory::MemorySheets;
    use crate::system::tasks::runner::tests::{runner, store, RecordingChat, StubExecutor};

    fn stubs() -> Vec<StubExecutor> {
        ReportKind::all()
            .into_iter()
            .map(|kind| StubExecutor {
                kind,
                fail_with: None,
            })
            .collect()
    }

    fn setup() -> (Arc<MemorySheets>, Arc<RecordingChat>, Arc<ReportQueue>) {
        let sheets = Arc::new(MemorySheets::new());
        let chat = Arc::new(RecordingChat::default());
        let queue = ReportQueue::start(Arc::new(runner(stubs(), sheets.clone(), chat.clone())), 2);
        (sheets, chat, queue)
    }

    async fn wait_rows(sheets: &MemorySheets, n: usize) -> Vec<Vec<String>> {
        for _ in 0..200 {
            let rows = sheets.rows("log");
            if rows.len() >= n {
                return rows;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        sheets.rows("log")
    }

    fn store_with_ads() -> Store {
        let mut s = store();
        s.credentials.perf_client_id = Some("perf-id".into());
        s.credentials.perf_client_secret = Some("perf-secret".into());
        s
    }

    #[test]
    fn test_auto_chain_depends_on_store_keys() {
        assert_eq!(
            auto_chain_for(&store_with_ads()),
            vec![ReportKind::UnitDay, ReportKind::AdSpend]
        );
        assert_eq!(auto_chain_for(&store()), vec![ReportKind::UnitDay]);

        let mut wb = store_with_ads();
        wb.marketplace = MarketplaceType::Wildberries;
        assert!(auto_chain_for(&wb).is_empty());
    }

    #[tokio::test]
    async fn test_autoloop_skips_stores_without_reports() {
        let (sheets, _chat, queue) = setup();
        let mut wb = store();
        wb.marketplace = MarketplaceType::Wildberries;
        let worker = StoreWorker::start(
            wb,
            queue,
            Arc::new(RecordingChat::default()),
            Some(Duration::from_secs(3600)),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!sheets.has_sheet("log"));
        assert_eq!(worker.scheduled_pending(), 0);
    }

    #[tokio::test]
    async fn test_autoloop_queues_chain_in_order() {
        let (sheets, _chat, queue) = setup();
        let worker = StoreWorker::start(
            store_with_ads(),
            queue,
            Arc::new(RecordingChat::default()),
            Some(Duration::from_secs(3600)),
        );
        let rows = wait_rows(&sheets, 2).await;
        assert_eq!(
            rows,
            vec![vec!["unit_day".to_string()], vec!["ad_spend".to_string()]]
        );
        assert_eq!(worker.scheduled_pending(), 0);
        worker.stop();
    }

    #[tokio::test]
    async fn test_manual_enqueue_acknowledged() {
        let (sheets, _chat, queue) = setup();
        let ack_chat = Arc::new(RecordingChat::default());
        let worker = StoreWorker::start(store(), queue, ack_chat.clone(), None);
        worker.enqueue(ReportKind::Balance, Some(9)).await.unwrap();
        assert_eq!(wait_rows(&sheets, 1).await, vec![vec!["balance".to_string()]]);
        assert_eq!(
            ack_chat.sent.lock().unwrap().as_slice(),
            &[(9, "ℹ️ Отчёт добавлен в очередь.\nbalans ≈3 мин".to_string())]
        );
    }

    #[tokio::test]
    async fn test_cancel_drops_jobs_queued_before_it() {
        let (sheets, _chat, queue) = setup();
        let worker = StoreWorker::start(store(), queue, Arc::new(RecordingChat::default()), None);
        let id = worker.store().store_id.clone();

        worker.push(ReportRequest::new(id.clone(), ReportKind::UnitDay, None)).unwrap();
        worker.push(ReportRequest::new(id.clone(), ReportKind::AdSpend, None)).unwrap();
        worker.cancel().unwrap();
        worker.push(ReportRequest::new(id, ReportKind::FinWeek, None)).unwrap();

        let rows = wait_rows(&sheets, 1).await;
        assert_eq!(rows, vec![vec!["fin_week".to_string()]]);
        assert!(!worker.is_cancelling());
    }

    #[tokio::test]
    async fn test_workers_registry() {
        let (_sheets, chat, queue) = setup();
        let workers = StoreWorkers::new(queue, chat, None);
        let s = store();
        let a = workers.get_or_start(&s).unwrap();
        let b = workers.get_or_start(&s).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(workers.store_ids(), vec!["111".to_string()]);
        assert!(workers.remove("111"));
        assert!(workers.get("111").is_none());
        assert!(!workers.remove("111"));
    }
}
