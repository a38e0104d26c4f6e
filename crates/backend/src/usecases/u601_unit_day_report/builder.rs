use chrono::{DateTime, FixedOffset, NaiveDate};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

use crate::shared::format::{parse_num, parse_sku, round2, ru_date};
use crate::shared::marketplaces::ozon::seller_api::{AnalyticsRow, FinanceOperation};
use crate::shared::sheets::a1::col_letter;
use crate::shared::sheets::cell_at;
use crate::shared::sheets::styles::{paint, Rgb, RowSpan, WHITE};
use crate::usecases::common::input_sheet::UnitInput;

pub const HEADER: [&str; 15] = [
    "Дата обновления",
    "SKU",
    "Название товара",
    "Количество продаж",
    "Сумма продаж",
    "Расходы на рекламу",
    "Логистика",
    "Комиссия Озон",
    "Эквайринг",
    "Последняя миля",
    "Налог (руб)",
    "Себес. Продаж",
    "Себес. Юнит",
    "Прибыль",
    "Маржа %",
];

pub const TOTAL_LABEL: &str = "Итого";

const IDX_AD: usize = 5;
const IDX_COST_SALES: usize = 11;
const IDX_PROFIT: usize = 13;
const IDX_MARGIN: usize = 14;
/// Колонки, по которым считаются суммы в строке «Итого» (D..L и N)
const SUM_COLUMNS: [usize; 10] = [3, 4, 5, 6, 7, 8, 9, 10, 11, 13];

const LOGISTICS_SERVICE: &str = "MarketplaceServiceItemDirectFlowLogistic";
const ACQUIRING_SERVICE: &str = "MarketplaceRedistributionOfAcquiringOperation";
const LAST_MILE_SERVICE: &str = "MarketplaceServiceItemDelivToCustomer";

const HEADER_COLOR: Rgb = Rgb(1.0, 1.0, 0.6);
const TOTAL_COLOR: Rgb = Rgb(0.93, 0.93, 0.93);

/// Продажи одного SKU за день
#[derive(Debug, Clone, PartialEq)]
pub struct DaySales {
    pub day: NaiveDate,
    pub sku: String,
    pub name: String,
    pub units: f64,
    pub revenue: f64,
}

/// Суммировать строки аналитики по (день, SKU), сохраняя порядок ответа
pub fn aggregate_sales(rows: &[AnalyticsRow]) -> Vec<DaySales> {
    let mut index: HashMap<(NaiveDate, String), usize> = HashMap::new();
    let mut out: Vec<DaySales> = Vec::new();

    for row in rows {
        let (Some(sku_dim), Some(day_dim)) = (row.dimensions.first(), row.dimensions.get(1)) else {
            continue;
        };
        let Ok(day) = NaiveDate::parse_from_str(&day_dim.id, "%Y-%m-%d") else {
            tracing::warn!("Skipping analytics row with bad day '{}'", day_dim.id);
            continue;
        };
        let units = row.metrics.first().copied().unwrap_or(0.0);
        let revenue = row.metrics.get(1).copied().unwrap_or(0.0);

        let key = (day, sku_dim.id.clone());
        match index.get(&key) {
            Some(&i) => {
                let entry = &mut out[i];
                entry.units += units;
                entry.revenue += revenue;
                entry.name = sku_dim.name.clone();
            }
            None => {
                index.insert(key, out.len());
                out.push(DaySales {
                    day,
                    sku: sku_dim.id.clone(),
                    name: sku_dim.name.clone(),
                    units,
                    revenue,
                });
            }
        }
    }
    out
}

/// Средние расходы на единицу по SKU за окно финансовых операций
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ServiceAverages {
    pub logistics: f64,
    pub acquiring: f64,
    pub last_mile: f64,
    /// Комиссия в % от начислений
    pub commission_pct: f64,
}

#[derive(Default)]
struct ServiceSamples {
    logistics: Vec<f64>,
    acquiring: Vec<f64>,
    last_mile: Vec<f64>,
    accruals: f64,
    commission: f64,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        round2(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub fn service_averages(ops: &[FinanceOperation]) -> HashMap<i64, ServiceAverages> {
    let mut samples: HashMap<i64, ServiceSamples> = HashMap::new();

    for op in ops {
        let commission = op.sale_commission.abs();
        for item in &op.items {
            let entry = samples.entry(item.sku).or_default();
            for service in &op.services {
                let price = service.price.abs();
                match service.name.as_str() {
                    LOGISTICS_SERVICE => entry.logistics.push(price),
                    ACQUIRING_SERVICE => entry.acquiring.push(price),
                    LAST_MILE_SERVICE => entry.last_mile.push(price),
                    _ => {}
                }
            }
            entry.accruals += op.accruals_for_sale;
            entry.commission += commission;
        }
    }

    samples
        .into_iter()
        .map(|(sku, s)| {
            let commission_pct = if s.accruals != 0.0 {
                round2(s.commission / s.accruals * 100.0)
            } else {
                0.0
            };
            (
                sku,
                ServiceAverages {
                    logistics: mean(&s.logistics),
                    acquiring: mean(&s.acquiring),
                    last_mile: mean(&s.last_mile),
                    commission_pct,
                },
            )
        })
        .collect()
}

/// Расходы на рекламу из текущего листа: (дата dd.mm.yyyy, SKU) → сумма
pub fn existing_ad_spend(rows: &[Vec<String>]) -> HashMap<(String, String), f64> {
    rows.iter()
        .skip(1)
        .filter(|r| {
            let first = cell_at(r, 0);
            !first.is_empty() && first != TOTAL_LABEL
        })
        .map(|r| {
            let date: String = cell_at(r, 0).chars().take(10).collect();
            let sku = cell_at(r, 1).trim().to_string();
            ((date, sku), parse_num(cell_at(r, IDX_AD)))
        })
        .collect()
}

/// Готовая таблица листа `unit-day`
#[derive(Debug, Clone)]
pub struct UnitDayTable {
    pub rows: Vec<Vec<Value>>,
    /// Номера строк «Итого» (1-based)
    pub total_rows: Vec<usize>,
    pub data_rows: usize,
}

pub struct UnitDayInputs<'a> {
    pub sales: &'a [DaySales],
    pub services: &'a HashMap<i64, ServiceAverages>,
    pub inputs: &'a HashMap<String, UnitInput>,
    pub ad_spend: &'a HashMap<(String, String), f64>,
    pub default_tax: f64,
    pub now_msk: DateTime<FixedOffset>,
}

fn sku_value(sku: &str) -> Value {
    match parse_sku(sku) {
        Some(n) => json!(n),
        None => json!(sku),
    }
}

fn data_row(sale: &DaySales, src: &UnitDayInputs<'_>, date_cell: String) -> Vec<Value> {
    let units = sale.units.trunc();
    let revenue = round2(sale.revenue);
    let svc = parse_sku(&sale.sku)
        .and_then(|sku| src.services.get(&sku))
        .copied()
        .unwrap_or_default();
    let input = src.inputs.get(&sale.sku);

    let logistics = round2(svc.logistics.abs() * units);
    let acquiring = round2(svc.acquiring.abs() * units);
    let last_mile = round2(svc.last_mile.abs() * units);
    let commission = round2(revenue * svc.commission_pct / 100.0);
    let tax_pct = input.map(|i| i.tax_pct).unwrap_or(src.default_tax);
    let tax = round2(revenue * tax_pct / 100.0);

    let day_key = ru_date(sale.day);
    let ad = src
        .ad_spend
        .get(&(day_key, sale.sku.clone()))
        .copied()
        .unwrap_or(0.0);
    let unit_cost = input.map(|i| i.unit_cost).unwrap_or(0.0);
    let name = input
        .map(|i| i.name.clone())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| sale.name.clone());

    vec![
        json!(date_cell),
        sku_value(&sale.sku),
        json!(name),
        json!(units as i64),
        json!(revenue),
        json!(ad),
        json!(logistics),
        json!(commission),
        json!(acquiring),
        json!(last_mile),
        json!(tax),
        json!(""),
        json!(unit_cost),
        json!(""),
        json!(""),
    ]
}

fn set_row_formulas(row: &mut [Value], i: usize) {
    let unit = col_letter(IDX_COST_SALES + 2);
    row[IDX_COST_SALES] = json!(format!(
        "=IF({unit}{i}=\"\";\"\";ROUND({unit}{i}*D{i};2))"
    ));
    row[IDX_PROFIT] = json!(format!("=ROUND(E{i}-F{i}-G{i}-H{i}-I{i}-J{i}-K{i}-L{i};2)"));
    row[IDX_MARGIN] = json!(format!("=IF(E{i}=0;\"\";ROUND(N{i}/E{i}*100;2))"));
}

/// Построить таблицу: дни по убыванию, после каждого дня «Итого» и пустая строка
pub fn build_table(src: &UnitDayInputs<'_>) -> UnitDayTable {
    let today = src.now_msk.date_naive();
    let today_display = src.now_msk.format("%d.%m.%Y (%H:%M МСК)").to_string();

    let mut by_day: BTreeMap<NaiveDate, Vec<&DaySales>> = BTreeMap::new();
    for sale in src.sales {
        by_day.entry(sale.day).or_default().push(sale);
    }

    let width = HEADER.len();
    let mut rows: Vec<Vec<Value>> = vec![HEADER.iter().map(|h| json!(h)).collect()];
    let mut total_rows = Vec::new();
    let mut data_rows = 0;

    for (day, sales) in by_day.iter().rev() {
        let start = rows.len() + 1;
        let date_cell = if *day == today {
            today_display.clone()
        } else {
            ru_date(*day)
        };
        for sale in sales {
            let mut row = data_row(sale, src, date_cell.clone());
            set_row_formulas(&mut row, rows.len() + 1);
            rows.push(row);
            data_rows += 1;
        }
        let end = rows.len();

        let mut total = vec![json!(""); width];
        total[0] = json!(TOTAL_LABEL);
        for ci in SUM_COLUMNS {
            let letter = col_letter(ci + 1);
            total[ci] = json!(format!("=SUM({letter}{start}:{letter}{end})"));
        }
        rows.push(total);
        total_rows.push(rows.len());
        rows.push(vec![json!(""); width]);
    }

    UnitDayTable {
        rows,
        total_rows,
        data_rows,
    }
}

/// Сброс оформления, жёлтая шапка, серые «Итого»
pub fn format_requests(sheet_id: i64, total_rows: &[usize]) -> Vec<Value> {
    let mut requests = vec![
        paint(sheet_id, None, WHITE, false),
        paint(sheet_id, Some(RowSpan::rows(1, 1, None)), HEADER_COLOR, true),
    ];
    for &row in total_rows {
        requests.push(paint(sheet_id, Some(RowSpan::rows(row, row, None)), TOTAL_COLOR, true));
    }
    requests
}
