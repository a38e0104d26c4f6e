use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, Duration, Months, NaiveDate, Utc};
use contracts::system::tasks::progress::ReportOutcome;
use contracts::usecases::common::ReportKind;
use serde_json::Value;

use super::builder::build_weekly_report;
use super::merge::{merge_with_existing, style_requests};
use crate::shared::format::{format_number, start_of_day};
use crate::shared::marketplaces::ozon::seller_api::{FinanceOperation, OzonSellerClient};
use crate::shared::sheets::SheetStore;
use crate::usecases::common::input_sheet::{parse_cost_lookup, read_input_sheet};
use crate::usecases::common::{ReportContext, ReportExecutor};

const PAGE_SIZE: u32 = 1000;

/// u604: недельный финансовый отчёт в листе `week_fin`
pub struct FinWeekExecutor;

#[async_trait]
impl ReportExecutor for FinWeekExecutor {
    fn kind(&self) -> ReportKind {
        ReportKind::FinWeek
    }

    async fn execute(&self, ctx: &ReportContext) -> Result<ReportOutcome> {
        let client = OzonSellerClient::new(&ctx.store.credentials)?;
        let bottom = NaiveDate::parse_from_str(&ctx.settings.fin_week_start, "%Y-%m-%d")
            .with_context(|| format!("Bad fin_week_start: {}", ctx.settings.fin_week_start))?;

        ctx.step("Чтение справочника input");
        let lookup = parse_cost_lookup(&read_input_sheet(ctx.sheets.as_ref()).await?);
        tracing::info!("[fin_week] {} SKU in input", lookup.len());

        let ops = fetch_operations(&client, ctx, bottom).await?;
        if ops.is_empty() {
            return Ok(ReportOutcome::empty("Операции не найдены"));
        }

        ctx.step(format!("Построение отчёта по {} операциям", format_number(ops.len())));
        let rows = build_weekly_report(&ops, &lookup);

        ctx.step("Запись week_fin");
        let worksheet = self.kind().default_worksheet();
        let written = write_report(ctx.sheets.as_ref(), worksheet, rows).await?;
        Ok(ReportOutcome {
            rows_written: written,
            cells_updated: 0,
            note: None,
        })
    }
}

/// Первые числа месяцев от текущего назад, не раньше `bottom`
pub fn month_starts(today: NaiveDate, bottom: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut month = today.with_day(1);
    while let Some(start) = month.filter(|m| *m >= bottom) {
        out.push(start);
        month = start.checked_sub_months(Months::new(1));
    }
    out
}

/// Операции помесячно, страницами до короткой
async fn fetch_operations(
    client: &OzonSellerClient,
    ctx: &ReportContext,
    bottom: NaiveDate,
) -> Result<Vec<FinanceOperation>> {
    let mut ops = Vec::new();
    for month in month_starts(Utc::now().date_naive(), bottom) {
        ctx.step(format!("Операции за {}", month.format("%Y-%m")));
        let from = start_of_day(month);
        let next = month
            .checked_add_months(Months::new(1))
            .map(start_of_day)
            .unwrap_or_else(Utc::now);
        let to = next - Duration::seconds(1);

        let mut page = 1;
        loop {
            ctx.ensure_active()?;
            let chunk = client.finance_transactions(from, to, page, PAGE_SIZE).await?;
            let len = chunk.len() as u32;
            ops.extend(chunk);
            if len < PAGE_SIZE {
                break;
            }
            page += 1;
        }
    }
    tracing::info!("[fin_week] {} operations loaded", ops.len());
    Ok(ops)
}

/// Слить с листом и переписать его. Возвращает число записанных строк
pub async fn write_report(
    sheets: &dyn SheetStore,
    worksheet: &str,
    rows: Vec<Vec<Value>>,
) -> Result<usize> {
    let ws = sheets.ensure_worksheet(worksheet, 1000, 40).await?;
    let old = sheets.read_all(worksheet).await?;
    let merged = merge_with_existing(rows, &old);
    if old.len() > 1 {
        sheets.clear(worksheet).await?;
    }
    let styles = style_requests(ws.sheet_id, &merged);
    let count = merged.len();
    sheets.update(worksheet, "A1", merged).await?;
    sheets.batch_update(styles).await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::sheets::memory::MemorySheets;
    use serde_json::json;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_month_starts() {
        let months = month_starts(d(2024, 2, 15), d(2023, 12, 1));
        assert_eq!(months, vec![d(2024, 2, 1), d(2024, 1, 1), d(2023, 12, 1)]);
        assert!(month_starts(d(2024, 2, 15), d(2024, 2, 2)).is_empty());
    }

    #[tokio::test]
    async fn test_write_report_into_empty_sheet() {
        let sheets = MemorySheets::new();
        let rows = vec![
            vec![json!("Период"), json!("SKU")],
            vec![json!("07.05.2024 – 13.05.2024"), json!(1)],
            vec![json!("Итого"), json!("")],
        ];
        assert_eq!(write_report(&sheets, "week_fin", rows).await.unwrap(), 3);
        let stored = sheets.read_all("week_fin").await.unwrap();
        assert_eq!(stored[1], vec!["07.05.2024 – 13.05.2024", "1"]);
        let reqs = sheets.requests();
        assert!(reqs.iter().any(|r| r.get("updateSheetProperties").is_some()));
    }
}
