use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Duration;
use contracts::system::tasks::progress::ReportOutcome;
use contracts::usecases::common::ReportKind;
use tokio::time::Instant;

use super::spend_column::plan_updates;
use super::statistics::{aggregate, parse_statistics_csv, report_texts, SpendByDaySku};
use crate::shared::format::msk_now;
use crate::shared::http_retry::ApiError;
use crate::shared::marketplaces::ozon::performance_api::{
    AdStatisticsApi, OzonPerformanceClient, ReportState,
};
use crate::shared::sheets::SheetStore;
use crate::usecases::common::{ReportContext, ReportExecutor};

/// Сколько кампаний в одном запросе статистики
const CAMPAIGN_CHUNK: usize = 10;

/// u602: расходы на рекламу в колонку листа `unit-day`
pub struct AdSpendExecutor;

#[async_trait]
impl ReportExecutor for AdSpendExecutor {
    fn kind(&self) -> ReportKind {
        ReportKind::AdSpend
    }

    async fn execute(&self, ctx: &ReportContext) -> Result<ReportOutcome> {
        let client = OzonPerformanceClient::new(&ctx.store.credentials)?;
        self.run(&client, ctx).await
    }
}

impl AdSpendExecutor {
    /// Кампании → UUID-отчёты пакетами → разбор → запись в лист
    pub async fn run(&self, api: &dyn AdStatisticsApi, ctx: &ReportContext) -> Result<ReportOutcome> {
        ctx.step("Список рекламных кампаний");
        let campaigns = api.reported_campaign_ids().await?;
        if campaigns.is_empty() {
            return Ok(ReportOutcome::empty("Нет рекламных кампаний"));
        }

        let date_to = msk_now().date_naive();
        let date_from = date_to - Duration::days(ctx.settings.ad_spend_days);

        let mut uuids = Vec::new();
        let chunks = campaigns.chunks(CAMPAIGN_CHUNK).count();
        for (n, chunk) in campaigns.chunks(CAMPAIGN_CHUNK).enumerate() {
            ctx.ensure_active()?;
            ctx.step(format!("Статистика кампаний: пакет {}/{}", n + 1, chunks));
            let uuid = api.request_statistics(chunk, date_from, date_to).await?;
            wait_ready(api, &uuid, ctx).await?;
            uuids.push(uuid);
        }

        ctx.step("Скачивание отчётов");
        let mut rows = Vec::new();
        for uuid in &uuids {
            ctx.ensure_active()?;
            let Some(file) = api.download_report(uuid).await? else {
                continue;
            };
            for text in report_texts(&file)? {
                rows.extend(
                    parse_statistics_csv(&text)
                        .with_context(|| format!("Отчёт {} не разобран", uuid))?,
                );
            }
        }
        let spend = aggregate(rows);
        if spend.is_empty() {
            return Ok(ReportOutcome::empty("Нет данных по рекламе"));
        }

        ctx.step("Запись расходов в unit-day");
        let worksheet = self.kind().default_worksheet();
        let written = write_spend(ctx.sheets.as_ref(), worksheet, &spend).await?;
        Ok(ReportOutcome {
            rows_written: 0,
            cells_updated: written,
            note: None,
        })
    }
}

/// Сбой опроса, после которого стоит спросить ещё раз
fn is_transient(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|e| e.downcast_ref::<ApiError>().is_some_and(ApiError::is_transient))
}

/// Ждать готовности отчёта UUID, проверяя отмену перед каждым опросом,
/// до истечения `ad_poll_timeout_secs`. Временные сбои API опрос не прерывают
async fn wait_ready(api: &dyn AdStatisticsApi, uuid: &str, ctx: &ReportContext) -> Result<()> {
    let interval = std::time::Duration::from_secs(ctx.settings.ad_poll_interval_secs);
    let timeout = std::time::Duration::from_secs(ctx.settings.ad_poll_timeout_secs);
    let started = Instant::now();
    loop {
        ctx.ensure_active()?;
        match api.statistics_state(uuid).await {
            Ok(ReportState::Ready) => return Ok(()),
            Ok(ReportState::Failed) => anyhow::bail!("Report {} failed", uuid),
            Ok(ReportState::Pending(state)) => {
                tracing::debug!("[ads] {} state {}", uuid, state);
            }
            Err(e) if is_transient(&e) => {
                tracing::warn!("[ads] {} state unavailable, polling again: {:#}", uuid, e);
            }
            Err(e) => return Err(e),
        }
        if started.elapsed() >= timeout {
            anyhow::bail!("Report {} not ready after {} s", uuid, timeout.as_secs());
        }
        tokio::time::sleep(interval).await;
    }
}

/// Записать изменившиеся расходы. Возвращает число обновлённых ячеек
pub async fn write_spend(
    sheets: &dyn SheetStore,
    worksheet: &str,
    spend: &SpendByDaySku,
) -> Result<usize> {
    if sheets.find_worksheet(worksheet).await?.is_none() {
        anyhow::bail!("Лист {} не найден: сначала постройте unit-day", worksheet);
    }
    let rows = sheets.read_all(worksheet).await?;
    let updates = plan_updates(&rows, spend)?;
    let count = updates.len();
    if count > 0 {
        sheets.batch_update_values(worksheet, updates).await?;
    }
    tracing::info!("[ads] {} cells updated in {}", count, worksheet);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::config::ReportsConfig;
    use crate::shared::marketplaces::ozon::performance_api::ReportFile;
    use crate::shared::sheets::memory::MemorySheets;
    use crate::system::tasks::progress_tracker::ProgressTracker;
    use crate::system::tasks::runner::tests::store;
    use crate::usecases::common::pipeline::is_cancellation;
    use crate::usecases::common::CancelFlag;
    use chrono::NaiveDate;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    const CSV: &str = "Кампания №123, период 01.05.2024-07.05.2024\n\
День;sku;Название товара;Расход, ₽, с НДС\n\
06.05.2024;111;Чехол;10,50\n\
06.05.2024;111;Чехол;2,25\n\
Всего;;;12,75\n";

    /// Performance API с заранее заданными ответами на опрос статуса
    struct FakeAds {
        states: Mutex<VecDeque<Result<ReportState, ApiError>>>,
        polls: AtomicUsize,
        /// Нажать «стоп» после указанного опроса
        cancel_after: Option<(usize, CancelFlag)>,
    }

    impl FakeAds {
        fn new(states: Vec<Result<ReportState, ApiError>>) -> Self {
            Self {
                states: Mutex::new(states.into()),
                polls: AtomicUsize::new(0),
                cancel_after: None,
            }
        }

        fn polls(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AdStatisticsApi for FakeAds {
        async fn reported_campaign_ids(&self) -> Result<Vec<String>> {
            Ok(vec!["123".into()])
        }

        async fn request_statistics(
            &self,
            _campaigns: &[String],
            _date_from: NaiveDate,
            _date_to: NaiveDate,
        ) -> Result<String> {
            Ok("uuid-1".into())
        }

        async fn statistics_state(&self, _uuid: &str) -> Result<ReportState> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((after, cancel)) = &self.cancel_after {
                if n == *after {
                    cancel.cancel();
                }
            }
            let next = self.states.lock().unwrap().pop_front();
            match next {
                Some(Ok(state)) => Ok(state),
                Some(Err(e)) => Err(anyhow::Error::new(e).context("Performance API: statistics state")),
                None => Ok(ReportState::Pending("IN_PROGRESS".into())),
            }
        }

        async fn download_report(&self, _uuid: &str) -> Result<Option<ReportFile>> {
            Ok(Some(ReportFile {
                content_type: "text/csv; charset=utf-8".into(),
                bytes: CSV.as_bytes().to_vec(),
            }))
        }
    }

    fn context(sheets: Arc<MemorySheets>, cancel: CancelFlag) -> ReportContext {
        ReportContext {
            store: store(),
            sheets,
            settings: ReportsConfig {
                ad_poll_interval_secs: 120,
                ad_poll_timeout_secs: 300,
                ..ReportsConfig::default()
            },
            cancel,
            session_id: "s1".into(),
            progress: Arc::new(ProgressTracker::new()),
        }
    }

    fn pending() -> Result<ReportState, ApiError> {
        Ok(ReportState::Pending("NOT_STARTED".into()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_ready_survives_transient_error() {
        let api = FakeAds::new(vec![
            pending(),
            Err(ApiError::Status {
                status: 502,
                body: "Bad Gateway".into(),
            }),
            Ok(ReportState::Ready),
        ]);
        let ctx = context(Arc::new(MemorySheets::new()), CancelFlag::new());
        wait_ready(&api, "uuid-1", &ctx).await.unwrap();
        assert_eq!(api.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_ready_failed_report() {
        let api = FakeAds::new(vec![pending(), Ok(ReportState::Failed)]);
        let ctx = context(Arc::new(MemorySheets::new()), CancelFlag::new());
        let err = wait_ready(&api, "uuid-1", &ctx).await.unwrap_err();
        assert!(err.to_string().contains("failed"));
        assert_eq!(api.polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_ready_times_out() {
        let api = FakeAds::new(Vec::new());
        let ctx = context(Arc::new(MemorySheets::new()), CancelFlag::new());
        let err = wait_ready(&api, "uuid-1", &ctx).await.unwrap_err();
        assert!(err.to_string().contains("not ready after 300 s"));
        // опросы на 0, 120, 240 и 360 с
        assert_eq!(api.polls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_ready_stops_on_cancel_between_polls() {
        let cancel = CancelFlag::new();
        let mut api = FakeAds::new(Vec::new());
        api.cancel_after = Some((2, cancel.clone()));
        let ctx = context(Arc::new(MemorySheets::new()), cancel);
        let err = wait_ready(&api, "uuid-1", &ctx).await.unwrap_err();
        assert!(is_cancellation(&err));
        assert_eq!(api.polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_ready_propagates_decode_error() {
        let api = FakeAds::new(vec![Err(ApiError::Decode("bad json".into()))]);
        let ctx = context(Arc::new(MemorySheets::new()), CancelFlag::new());
        let err = wait_ready(&api, "uuid-1", &ctx).await.unwrap_err();
        assert!(format!("{:#}", err).contains("bad json"));
        assert_eq!(api.polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_writes_spend_after_polling() {
        let sheets = Arc::new(MemorySheets::new().with_sheet(
            "unit-day",
            &[
                &["Дата обновления", "SKU", "Название", "Кол-во", "Сумма", "Расходы на рекламу"],
                &["06.05.2024 (09:00 МСК)", "111", "Чехол", "2", "900", "0"],
                &["07.05.2024 (09:00 МСК)", "111", "Чехол", "1", "500", "0"],
            ],
        ));
        let api = FakeAds::new(vec![pending(), Ok(ReportState::Ready)]);
        let ctx = context(sheets.clone(), CancelFlag::new());

        let outcome = AdSpendExecutor.run(&api, &ctx).await.unwrap();
        assert_eq!(outcome.cells_updated, 1);
        assert_eq!(sheets.rows("unit-day")[1][5], "12.75");
        assert_eq!(sheets.rows("unit-day")[2][5], "0");
    }

    #[tokio::test]
    async fn test_write_spend_updates_column_in_place() {
        let sheets = MemorySheets::new().with_sheet(
            "unit-day",
            &[
                &["Дата обновления", "SKU", "Название", "Кол-во", "Сумма", "Расходы на рекламу"],
                &["07.05.2024 (09:00 МСК)", "111", "Чехол", "1", "500", "0"],
                &["Итого", "", "", "", "", "0"],
            ],
        );
        let mut spend = SpendByDaySku::new();
        spend.insert(("07.05.2024".into(), 111), 15.5);

        assert_eq!(write_spend(&sheets, "unit-day", &spend).await.unwrap(), 1);
        assert_eq!(sheets.rows("unit-day")[1][5], "15.5");
        assert_eq!(write_spend(&sheets, "unit-day", &spend).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_write_spend_requires_sheet() {
        let sheets = MemorySheets::new();
        assert!(write_spend(&sheets, "unit-day", &SpendByDaySku::new()).await.is_err());
    }
}
