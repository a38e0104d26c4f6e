use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use contracts::system::tasks::progress::ReportOutcome;
use contracts::usecases::common::ReportKind;

use super::builder::{
    aggregate_sales, build_table, existing_ad_spend, format_requests, service_averages,
    UnitDayInputs, UnitDayTable,
};
use crate::shared::format::msk_now;
use crate::shared::marketplaces::ozon::seller_api::OzonSellerClient;
use crate::shared::sheets::SheetStore;
use crate::usecases::common::input_sheet::{parse_unit_inputs, read_input_sheet};
use crate::usecases::common::{ReportContext, ReportExecutor};

/// Окно продаж, дней
const SALES_DAYS: i64 = 7;
/// Окно финансовых операций для средних по услугам, дней
const FINANCE_DAYS: i64 = 30;

/// u601: юнит-экономика по дням в листе `unit-day`
pub struct UnitDayExecutor;

#[async_trait]
impl ReportExecutor for UnitDayExecutor {
    fn kind(&self) -> ReportKind {
        ReportKind::UnitDay
    }

    async fn execute(&self, ctx: &ReportContext) -> Result<ReportOutcome> {
        let client = OzonSellerClient::new(&ctx.store.credentials)?;
        let worksheet = self.kind().default_worksheet();
        let now_msk = msk_now();
        let today = now_msk.date_naive();

        ctx.step("Загрузка продаж за 7 дней");
        let analytics = client
            .analytics_data(today - Duration::days(SALES_DAYS), today)
            .await
            .context("Не удалось получить продажи")?;
        let sales = aggregate_sales(&analytics);
        ctx.ensure_active()?;

        ctx.step("Загрузка финансовых операций за 30 дней");
        let now = Utc::now();
        let ops = client
            .finance_transactions(now - Duration::days(FINANCE_DAYS), now, 1, 1000)
            .await
            .context("Не удалось получить финансовые операции")?;
        let services = service_averages(&ops);
        ctx.ensure_active()?;

        ctx.step("Чтение листов input и unit-day");
        let ws = ctx.sheets.ensure_worksheet(worksheet, 1000, 30).await?;
        let inputs = parse_unit_inputs(
            &read_input_sheet(ctx.sheets.as_ref()).await?,
            ctx.settings.default_tax,
        );
        let ad_spend = existing_ad_spend(&ctx.sheets.read_all(worksheet).await?);

        let table = build_table(&UnitDayInputs {
            sales: &sales,
            services: &services,
            inputs: &inputs,
            ad_spend: &ad_spend,
            default_tax: ctx.settings.default_tax,
            now_msk,
        });

        ctx.step(format!("Запись {} строк", table.data_rows));
        write_table(ctx.sheets.as_ref(), ws.sheet_id, worksheet, &table).await?;

        if table.data_rows == 0 {
            return Ok(ReportOutcome::empty("Продаж за 7 дней нет"));
        }
        Ok(ReportOutcome {
            rows_written: table.data_rows,
            cells_updated: 0,
            note: None,
        })
    }
}

/// Полная перезапись листа с оформлением
pub async fn write_table(
    sheets: &dyn SheetStore,
    sheet_id: i64,
    worksheet: &str,
    table: &UnitDayTable,
) -> Result<()> {
    sheets.clear(worksheet).await?;
    sheets.update(worksheet, "A1", table.rows.clone()).await?;
    sheets
        .batch_update(format_requests(sheet_id, &table.total_rows))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::sheets::memory::MemorySheets;
    use crate::usecases::u601_unit_day_report::builder::DaySales;
    use chrono::{FixedOffset, NaiveDate, TimeZone};
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_rewrite_keeps_ad_spend_from_previous_snapshot() {
        let sheets = MemorySheets::new().with_sheet(
            "unit-day",
            &[
                &["Дата обновления", "SKU", "Название товара", "Количество продаж", "Сумма продаж", "Расходы на рекламу"],
                &["06.05.2024", "111", "Чехол", "1", "500", "42,5"],
                &["Итого", "", "", "", "", "42,5"],
                &["старый", "хвост"],
            ],
        );
        let ws = sheets.find_worksheet("unit-day").await.unwrap().unwrap();
        let ad = existing_ad_spend(&sheets.read_all("unit-day").await.unwrap());

        let sales = vec![DaySales {
            day: NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
            sku: "111".into(),
            name: "Чехол".into(),
            units: 1.0,
            revenue: 500.0,
        }];
        let table = build_table(&UnitDayInputs {
            sales: &sales,
            services: &HashMap::new(),
            inputs: &HashMap::new(),
            ad_spend: &ad,
            default_tax: 7.0,
            now_msk: FixedOffset::east_opt(3 * 3600)
                .unwrap()
                .with_ymd_and_hms(2024, 5, 7, 9, 0, 0)
                .unwrap(),
        });
        write_table(&sheets, ws.sheet_id, "unit-day", &table).await.unwrap();

        let rows = sheets.read_all("unit-day").await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1][0], "06.05.2024");
        assert_eq!(rows[1][5], "42.5");
        assert_eq!(rows[2][0], "Итого");
        assert!(!rows.iter().any(|r| r.first().map(|c| c == "старый").unwrap_or(false)));
        assert_eq!(sheets.requests().len(), 3);
    }
}
