use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use contracts::system::tasks::progress::ReportOutcome;
use contracts::usecases::common::ReportKind;
use std::collections::HashMap;

use super::builder::{
    accumulate_returns, completed_bundle_ids, free_stock, pivot_statuses, plan_balance,
    supply_lookup, BalancePlan, BalanceSources, ReturnTotals,
};
use crate::shared::format::msk_now;
use crate::shared::marketplaces::ozon::seller_api::{FboPosting, OzonSellerClient};
use crate::shared::sheets::SheetStore;
use crate::usecases::common::{ReportContext, ReportExecutor};

const RETURNS_PAGE: u32 = 500;
const FBO_PAGE: u32 = 1000;
/// Глубина выборки FBO-отправлений
const FBO_DAYS: i64 = 365;

/// u603: остатки, возвраты и статусы FBO в листе `balans_1`
pub struct BalanceExecutor;

#[async_trait]
impl ReportExecutor for BalanceExecutor {
    fn kind(&self) -> ReportKind {
        ReportKind::Balance
    }

    async fn execute(&self, ctx: &ReportContext) -> Result<ReportOutcome> {
        let client = OzonSellerClient::new(&ctx.store.credentials)?;

        ctx.step("Свободный остаток");
        let free = free_stock(&client.stock_on_warehouses().await?);

        ctx.step("Возвраты");
        let returns = fetch_returns(&client, ctx).await?;

        ctx.step("Поставки");
        let supply = fetch_supply(&client).await?;

        ctx.step("FBO-отправления за год");
        let postings = fetch_fbo(&client, ctx).await?;
        let pivot = pivot_statuses(&postings);
        if pivot.rows.is_empty() {
            return Ok(ReportOutcome::empty("Нет FBO-отправлений"));
        }

        ctx.step("Запись balans_1");
        let worksheet = self.kind().default_worksheet();
        ctx.sheets.ensure_worksheet(worksheet, 1000, 30).await?;
        let existing = ctx.sheets.read_all(worksheet).await?;
        let plan = plan_balance(
            &existing,
            &BalanceSources {
                pivot: &pivot,
                free: &free,
                returns: &returns,
                supply: &supply,
                date_display: msk_now().format("%d.%m.%Y (%H:%M)").to_string(),
            },
        );
        let rows_written = write_plan(ctx.sheets.as_ref(), worksheet, plan).await?;
        Ok(ReportOutcome {
            rows_written,
            cells_updated: 0,
            note: None,
        })
    }
}

async fn fetch_returns(client: &OzonSellerClient, ctx: &ReportContext) -> Result<ReturnTotals> {
    let mut totals = ReturnTotals::new();
    let mut last_id = 0;
    loop {
        ctx.ensure_active()?;
        let page = client.returns_page(last_id, RETURNS_PAGE).await?;
        accumulate_returns(&mut totals, &page);
        match page.last() {
            Some(last) if page.len() as u32 >= RETURNS_PAGE => last_id = last.id,
            _ => break,
        }
    }
    Ok(totals)
}

async fn fetch_supply(client: &OzonSellerClient) -> Result<HashMap<i64, (String, i64)>> {
    let order_ids = client.completed_supply_orders().await?;
    if order_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let bundles = completed_bundle_ids(&client.supply_orders(&order_ids).await?);
    if bundles.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(supply_lookup(&client.supply_bundle_items(&bundles).await?))
}

async fn fetch_fbo(client: &OzonSellerClient, ctx: &ReportContext) -> Result<Vec<FboPosting>> {
    let to = Utc::now();
    let since = to - Duration::days(FBO_DAYS);
    let mut all = Vec::new();
    let mut offset = 0;
    loop {
        ctx.ensure_active()?;
        let page = client.fbo_postings_page(since, to, offset, FBO_PAGE).await?;
        let len = page.len() as u32;
        all.extend(page);
        if len < FBO_PAGE {
            break;
        }
        offset += FBO_PAGE;
    }
    tracing::info!("[balans] {} FBO postings loaded", all.len());
    Ok(all)
}

/// Шапка (если изменилась), обновления на месте, затем новые строки
pub async fn write_plan(
    sheets: &dyn SheetStore,
    worksheet: &str,
    plan: BalancePlan,
) -> Result<usize> {
    if plan.header_changed {
        let header = plan.header.iter().map(|h| serde_json::json!(h)).collect();
        sheets.update(worksheet, "A1", vec![header]).await?;
    }
    let written = plan.updates.len() + plan.appends.len();
    if !plan.updates.is_empty() {
        sheets.batch_update_values(worksheet, plan.updates).await?;
    }
    if !plan.appends.is_empty() {
        sheets.append_rows(worksheet, plan.appends).await?;
    }
    Ok(written)
}
