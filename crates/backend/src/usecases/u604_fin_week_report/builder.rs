//! Недельный финансовый отчёт: операции Ozon → строки по неделям и SKU

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

use crate::shared::marketplaces::ozon::seller_api::FinanceOperation;
use crate::usecases::common::input_sheet::CostTax;

pub const COL_PERIOD: &str = "Период";
pub const COL_SKU: &str = "SKU";
pub const COL_MISC_NAME: &str = "Доп. расходы";
pub const COL_MISC_AMOUNT: &str = "Сумма доп. расходов";
pub const COL_COST: &str = "Себестоимость партии";
pub const COL_TAX: &str = "Налоговые расходы";
pub const TOTAL_LABEL: &str = "Итого";

const COL_ORDERS: &str = "Кол-во заказов";
const COL_ORDERS_SUM: &str = "Сумма заказов";
const COL_COMMISSION: &str = "% Озон";
const COL_LOGISTICS: &str = "Логистика";
const COL_REVERSE: &str = "Обратная логистика";
const COL_RETURNS: &str = "Кол-во обратных";
const COL_LAST_MILE: &str = "Последняя миля";
const COL_ACQUIRING: &str = "Эквайринг";

pub const BASE_COLS: [&str; 10] = [
    COL_ORDERS,
    COL_ORDERS_SUM,
    COL_COMMISSION,
    COL_LOGISTICS,
    COL_REVERSE,
    COL_RETURNS,
    COL_LAST_MILE,
    COL_ACQUIRING,
    COL_COST,
    COL_TAX,
];

const OP_DELIVERED: &str = "OperationAgentDeliveredToCustomer";
const OP_RETURN: &str = "OperationItemReturn";
const OP_ACQUIRING: &str = "MarketplaceRedistributionOfAcquiringOperation";
const SVC_LOGISTICS: &str = "MarketplaceServiceItemDirectFlowLogistic";
const SVC_LAST_MILE: &str = "MarketplaceServiceItemDelivToCustomer";

/// Начало отчётной недели: ближайший вторник не позже даты
pub fn week_start_tue(date: NaiveDate) -> NaiveDate {
    let back = (date.weekday().num_days_from_monday() + 6) % 7;
    date - Duration::days(back as i64)
}

/// `dd.mm.yyyy – dd.mm.yyyy`
pub fn period_text(start: NaiveDate) -> String {
    format!(
        "{} – {}",
        start.format("%d.%m.%Y"),
        (start + Duration::days(6)).format("%d.%m.%Y")
    )
}

fn operation_period(op: &FinanceOperation) -> Option<NaiveDate> {
    NaiveDateTime::parse_from_str(op.operation_date.trim(), "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| week_start_tue(dt.date()))
}

type Metrics = HashMap<String, f64>;

#[derive(Default)]
struct Accumulator {
    by_sku: BTreeMap<NaiveDate, BTreeMap<i64, Metrics>>,
    /// Операции без товаров: название → сумма, в порядке появления
    misc: BTreeMap<NaiveDate, Vec<(String, f64)>>,
    extra_cols: Vec<String>,
}

impl Accumulator {
    fn add_misc(&mut self, period: NaiveDate, name: &str, amount: f64) {
        let list = self.misc.entry(period).or_default();
        match list.iter_mut().find(|(n, _)| n == name) {
            Some((_, sum)) => *sum += amount,
            None => list.push((name.to_string(), amount)),
        }
    }

    fn add_operation(
        &mut self,
        period: NaiveDate,
        op: &FinanceOperation,
        lookup: &HashMap<i64, CostTax>,
    ) {
        let total_qty = match op.items.iter().map(|i| i.qty()).sum::<i64>() {
            0 => 1,
            n => n,
        };
        for item in &op.items {
            let qty = item.qty();
            let ratio = qty as f64 / total_qty as f64;
            let row = self
                .by_sku
                .entry(period)
                .or_default()
                .entry(item.sku)
                .or_default();
            let mut add = |col: &str, v: f64| *row.entry(col.to_string()).or_insert(0.0) += v;

            match op.operation_type.as_str() {
                OP_DELIVERED if op.accruals_for_sale > 0.0 => {
                    add(COL_ORDERS, qty as f64);
                    add(COL_ORDERS_SUM, op.accruals_for_sale * ratio);
                    add(COL_COMMISSION, op.sale_commission * ratio);
                    for svc in &op.services {
                        match svc.name.as_str() {
                            SVC_LOGISTICS => add(COL_LOGISTICS, svc.price * ratio),
                            SVC_LAST_MILE => add(COL_LAST_MILE, svc.price * ratio),
                            _ => {}
                        }
                    }
                    let ct = lookup.get(&item.sku).copied().unwrap_or_default();
                    add(COL_COST, -ct.cost * qty as f64);
                    add(COL_TAX, -op.accruals_for_sale * ct.tax_rate * ratio);
                }
                OP_RETURN => {
                    add(COL_RETURNS, qty as f64);
                    for svc in &op.services {
                        add(COL_REVERSE, svc.price * ratio);
                    }
                }
                OP_ACQUIRING => add(COL_ACQUIRING, op.amount * ratio),
                _ => {
                    let name = op.operation_type_name.as_str();
                    add(name, op.amount * ratio);
                    if !BASE_COLS.contains(&name) && !self.extra_cols.iter().any(|c| c == name) {
                        self.extra_cols.push(name.to_string());
                    }
                }
            }
        }
    }
}

fn rounded(v: f64) -> Value {
    json!(v.round() as i64)
}

/// Все колонки отчёта: базовые, затем дополнительные (по алфавиту), затем прочие расходы
pub fn report_columns(extra_cols: &[String]) -> Vec<String> {
    let mut extras = extra_cols.to_vec();
    extras.sort();
    [COL_PERIOD, COL_SKU]
        .into_iter()
        .chain(BASE_COLS)
        .map(String::from)
        .chain(extras)
        .chain([COL_MISC_NAME.to_string(), COL_MISC_AMOUNT.to_string()])
        .collect()
}

/// Построить отчёт: шапка, затем блоки недель от новых к старым.
/// Блок = строки SKU + строка «Итого»; между блоками две пустые строки.
pub fn build_weekly_report(
    ops: &[FinanceOperation],
    lookup: &HashMap<i64, CostTax>,
) -> Vec<Vec<Value>> {
    let mut acc = Accumulator::default();
    for op in ops {
        let Some(period) = operation_period(op) else {
            tracing::warn!("[fin_week] bad operation_date: {}", op.operation_date);
            continue;
        };
        if op.items.is_empty() {
            acc.add_misc(period, &op.operation_type_name, op.amount);
        } else {
            acc.add_operation(period, op, lookup);
        }
    }

    let columns = report_columns(&acc.extra_cols);
    let width = columns.len();
    let misc_name_idx = width - 2;
    let metric_cols: Vec<(usize, &String)> = columns
        .iter()
        .enumerate()
        .skip(2)
        .take(width - 4)
        .collect();

    let mut periods: Vec<NaiveDate> = acc
        .by_sku
        .keys()
        .chain(acc.misc.keys())
        .copied()
        .collect();
    periods.sort();
    periods.dedup();

    let mut rows: Vec<Vec<Value>> = vec![columns.iter().map(|c| json!(c)).collect()];
    let empty = BTreeMap::new();
    for (n, period) in periods.iter().rev().enumerate() {
        let ptxt = period_text(*period);
        let skus = acc.by_sku.get(period).unwrap_or(&empty);
        let misc = acc.misc.get(period).map(Vec::as_slice).unwrap_or_default();

        let mut block: Vec<Vec<Value>> = skus
            .iter()
            .map(|(sku, metrics)| {
                let mut row = vec![json!(""); width];
                row[0] = json!(ptxt);
                row[1] = json!(sku);
                for &(i, col) in &metric_cols {
                    row[i] = rounded(metrics.get(col.as_str()).copied().unwrap_or(0.0));
                }
                row
            })
            .collect();
        for (i, (name, amount)) in misc.iter().enumerate() {
            if i >= block.len() {
                block.push(vec![json!(""); width]);
            }
            block[i][misc_name_idx] = json!(name);
            block[i][misc_name_idx + 1] = rounded(*amount);
        }
        if block.is_empty() {
            continue;
        }

        let mut total = vec![json!(""); width];
        total[0] = json!(TOTAL_LABEL);
        for i in (2..width).filter(|&i| i != misc_name_idx) {
            let sum: f64 = block.iter().filter_map(|r| r[i].as_f64()).sum();
            total[i] = rounded(sum);
        }
        block.push(total);

        if n > 0 {
            rows.push(Vec::new());
            rows.push(Vec::new());
        }
        rows.extend(block);
    }
    rows
}
