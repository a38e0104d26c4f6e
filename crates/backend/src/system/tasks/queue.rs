use anyhow::Result;
use contracts::system::tasks::progress::ReportOutcome;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};

use super::runner::{ReportJob, ReportRunner};

type Reply = oneshot::Sender<Result<ReportOutcome>>;

struct QueuedJob {
    job: ReportJob,
    reply: Option<Reply>,
}

/// Общая очередь отчётов: `workers` исполнителей разбирают один канал,
/// поэтому одновременно строится не больше `workers` отчётов по всем магазинам
pub struct ReportQueue {
    sender: mpsc::UnboundedSender<QueuedJob>,
    workers: usize,
}

impl ReportQueue {
    /// Запустить пул. Исполнители живут, пока жив хотя бы один отправитель
    pub fn start(runner: Arc<ReportRunner>, workers: usize) -> Arc<Self> {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::unbounded_channel::<QueuedJob>();
        let receiver = Arc::new(Mutex::new(receiver));

        for worker_id in 0..workers {
            let receiver = receiver.clone();
            let runner = runner.clone();
            tokio::spawn(async move {
                tracing::debug!("Report worker {} started", worker_id);
                loop {
                    let next = receiver.lock().await.recv().await;
                    let Some(queued) = next else {
                        break;
                    };
                    let result = runner.run(queued.job).await;
                    if let Some(reply) = queued.reply {
                        let _ = reply.send(result);
                    }
                }
                tracing::debug!("Report worker {} stopped", worker_id);
            });
        }
        tracing::info!("Report queue started with {} workers", workers);

        Arc::new(Self { sender, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Поставить отчёт в очередь без ожидания результата
    pub fn enqueue(&self, job: ReportJob) -> Result<()> {
        self.sender
            .send(QueuedJob { job, reply: None })
            .map_err(|_| anyhow::anyhow!("Report queue is closed"))
    }

    /// Поставить отчёт в очередь и дождаться результата
    pub async fn run(&self, job: ReportJob) -> Result<ReportOutcome> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(QueuedJob {
                job,
                reply: Some(tx),
            })
            .map_err(|_| anyhow::anyhow!("Report queue is closed"))?;
        rx.await
            .map_err(|_| anyhow::anyhow!("Report worker dropped the job"))?
    }
}
