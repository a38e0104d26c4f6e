//! Сводка остатков, возвратов и статусов FBO для листа `balans_1`

use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::shared::format::parse_sku;
use crate::shared::marketplaces::ozon::seller_api::{
    BundleItem, FboPosting, ReturnItem, StockRow, SupplyOrder,
};
use crate::shared::sheets::a1::row_range;
use crate::shared::sheets::{cell_at, CellRange};

pub const COL_DATE: &str = "Дата обновления";
pub const COL_SKU: &str = "SKU";
pub const COL_NAME: &str = "Наименование";
pub const COL_SUPPLY: &str = "Поставка";
pub const COL_FREE: &str = "Свободный остаток";
pub const RETURNS_UTIL: &str = "Утиль/Возврат";
pub const RETURNS_TO_OZON: &str = "Едет на склад Ozon";

pub const BASE_HEADER: [&str; 7] = [
    COL_DATE,
    COL_SKU,
    COL_NAME,
    COL_SUPPLY,
    COL_FREE,
    RETURNS_UTIL,
    RETURNS_TO_OZON,
];

const IN_TRANSIT: &str = "В пути";
const CANCELLED: &str = "cancelled";
const SUPPLY_COMPLETED: &str = "SUPPLY_STATE_COMPLETED";

/// Группа возврата по его отображаемому статусу
pub fn returns_group(display_name: &str) -> Option<&'static str> {
    match display_name {
        "Утилизирован" | "Уже у вас" | "Едет к вам" => Some(RETURNS_UTIL),
        "Едет на склад Ozon" | "Ожидает отправки" => Some(RETURNS_TO_OZON),
        _ => None,
    }
}

/// SKU → группа возврата → штук
pub type ReturnTotals = HashMap<i64, HashMap<&'static str, i64>>;

pub fn accumulate_returns(totals: &mut ReturnTotals, page: &[ReturnItem]) {
    for item in page {
        let Some(sku) = item.product.sku else {
            continue;
        };
        if let Some(group) = returns_group(&item.visual.status.display_name) {
            *totals.entry(sku).or_default().entry(group).or_insert(0) += item.product.quantity;
        }
    }
}

/// Свободный остаток по SKU (сумма по складам)
pub fn free_stock(rows: &[StockRow]) -> HashMap<i64, i64> {
    let mut out = HashMap::new();
    for row in rows {
        *out.entry(row.sku).or_insert(0) += row.free_to_sell_amount;
    }
    out
}

/// Статусы ожидания и доставки сводятся в «В пути»
pub fn status_alias(raw: &str) -> &str {
    match raw {
        "awaiting_deliver" | "awaiting_packaging" | "delivering" => IN_TRANSIT,
        other => other,
    }
}

/// Количество SKU × статус по FBO-отправлениям
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StatusPivot {
    pub rows: BTreeMap<i64, BTreeMap<String, i64>>,
    pub statuses: BTreeSet<String>,
}

pub fn pivot_statuses(postings: &[FboPosting]) -> StatusPivot {
    let mut pivot = StatusPivot::default();
    for posting in postings {
        if posting.status == CANCELLED {
            continue;
        }
        let status = status_alias(&posting.status).to_string();
        for product in &posting.products {
            *pivot
                .rows
                .entry(product.sku)
                .or_default()
                .entry(status.clone())
                .or_insert(0) += product.quantity;
        }
        if !posting.products.is_empty() {
            pivot.statuses.insert(status);
        }
    }
    pivot
}

/// bundle_id завершённых поставок
pub fn completed_bundle_ids(orders: &[SupplyOrder]) -> Vec<String> {
    orders
        .iter()
        .flat_map(|o| o.supplies.iter())
        .filter(|s| s.supply_state == SUPPLY_COMPLETED)
        .filter_map(|s| s.bundle_id.clone().filter(|id| !id.is_empty()))
        .collect()
}

/// SKU → (offer_id, количество в поставке)
pub fn supply_lookup(items: &[BundleItem]) -> HashMap<i64, (String, i64)> {
    items
        .iter()
        .map(|it| (it.sku, (it.offer_id.clone(), it.quantity)))
        .collect()
}

/// Текущая шапка, дополненная недостающими базовыми колонками и статусами
pub fn extend_header(existing: &[String], statuses: &BTreeSet<String>) -> Vec<String> {
    let mut header: Vec<String> = existing.to_vec();
    let missing: Vec<String> = BASE_HEADER
        .iter()
        .map(|c| c.to_string())
        .chain(statuses.iter().cloned())
        .collect();
    for col in missing {
        if !header.contains(&col) {
            header.push(col);
        }
    }
    header
}

/// Данные для построения строк
pub struct BalanceSources<'a> {
    pub pivot: &'a StatusPivot,
    pub free: &'a HashMap<i64, i64>,
    pub returns: &'a ReturnTotals,
    pub supply: &'a HashMap<i64, (String, i64)>,
    /// `dd.mm.yyyy (HH:MM)` по Москве
    pub date_display: String,
}

/// Что записать в лист
#[derive(Debug, Clone, PartialEq)]
pub struct BalancePlan {
    pub header: Vec<String>,
    pub header_changed: bool,
    pub updates: Vec<CellRange>,
    pub appends: Vec<Vec<Value>>,
}

fn optional(value: Option<i64>) -> Value {
    value.map(|v| json!(v)).unwrap_or_else(|| json!(""))
}

/// Сопоставить строки по SKU (колонка B): найденные обновляются целиком,
/// новые дописываются в конец
pub fn plan_balance(existing: &[Vec<String>], src: &BalanceSources<'_>) -> BalancePlan {
    let old_header = existing.first().cloned().unwrap_or_default();
    let header = extend_header(&old_header, &src.pivot.statuses);
    let header_changed = header != old_header;
    let position = |name: &str| header.iter().position(|h| h == name);

    let mut index: HashMap<i64, usize> = HashMap::new();
    for (i, row) in existing.iter().enumerate().skip(1) {
        if let Some(sku) = parse_sku(cell_at(row, 1)) {
            index.insert(sku, i + 1);
        }
    }

    let width = header.len();
    let mut updates = Vec::new();
    let mut appends = Vec::new();

    for (sku, by_status) in &src.pivot.rows {
        let (name, supply_qty) = match src.supply.get(sku) {
            Some((offer, qty)) => (json!(offer), json!(qty)),
            None => (json!(""), json!("")),
        };
        let returns = src.returns.get(sku);
        let base = [
            (COL_DATE, json!(src.date_display)),
            (COL_SKU, json!(sku)),
            (COL_NAME, name),
            (COL_SUPPLY, supply_qty),
            (COL_FREE, optional(src.free.get(sku).copied())),
            (RETURNS_UTIL, optional(returns.and_then(|r| r.get(RETURNS_UTIL).copied()))),
            (RETURNS_TO_OZON, optional(returns.and_then(|r| r.get(RETURNS_TO_OZON).copied()))),
        ];

        let mut row = vec![json!(""); width];
        for (col, value) in base {
            if let Some(i) = position(col) {
                row[i] = value;
            }
        }
        for (status, qty) in by_status {
            if let Some(i) = position(status) {
                row[i] = json!(qty);
            }
        }

        match index.get(sku) {
            Some(&r) => updates.push(CellRange::row(row_range(r, width), row)),
            None => appends.push(row),
        }
    }

    BalancePlan {
        header,
        header_changed,
        updates,
        appends,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::marketplaces::ozon::seller_api::{FboProduct, Supply};

    fn posting(status: &str, items: &[(i64, i64)]) -> FboPosting {
        FboPosting {
            status: status.into(),
            products: items
                .iter()
                .map(|&(sku, quantity)| FboProduct { sku, quantity })
                .collect(),
        }
    }

    #[test]
    fn test_returns_groups() {
        assert_eq!(returns_group("Уже у вас"), Some(RETURNS_UTIL));
        assert_eq!(returns_group("Ожидает отправки"), Some(RETURNS_TO_OZON));
        assert_eq!(returns_group("Отменён"), None);
    }

    #[test]
    fn test_accumulate_returns_across_pages() {
        let item = |sku: Option<i64>, qty: i64, status: &str| {
            let mut it = ReturnItem::default();
            it.product.sku = sku;
            it.product.quantity = qty;
            it.visual.status.display_name = status.into();
            it
        };
        let mut totals = ReturnTotals::new();
        accumulate_returns(&mut totals, &[item(Some(1), 2, "Утилизирован"), item(None, 5, "Уже у вас")]);
        accumulate_returns(&mut totals, &[item(Some(1), 1, "Едет к вам"), item(Some(1), 4, "Отменён")]);
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[&1][RETURNS_UTIL], 3);
        assert!(!totals[&1].contains_key(RETURNS_TO_OZON));
    }

    #[test]
    fn test_pivot_aliases_and_skips_cancelled() {
        let pivot = pivot_statuses(&[
            posting("awaiting_packaging", &[(1, 2)]),
            posting("delivering", &[(1, 1), (2, 5)]),
            posting("delivered", &[(1, 4)]),
            posting("cancelled", &[(1, 100)]),
        ]);
        assert_eq!(pivot.rows[&1][IN_TRANSIT], 3);
        assert_eq!(pivot.rows[&1]["delivered"], 4);
        assert_eq!(pivot.rows[&2][IN_TRANSIT], 5);
        assert!(!pivot.statuses.contains("cancelled"));
        assert_eq!(pivot.statuses.len(), 2);
    }

    #[test]
    fn test_completed_bundle_ids() {
        let orders = vec![SupplyOrder {
            supplies: vec![
                Supply {
                    supply_state: SUPPLY_COMPLETED.into(),
                    bundle_id: Some("b1".into()),
                },
                Supply {
                    supply_state: "SUPPLY_STATE_IN_TRANSIT".into(),
                    bundle_id: Some("b2".into()),
                },
                Supply {
                    supply_state: SUPPLY_COMPLETED.into(),
                    bundle_id: None,
                },
            ],
        }];
        assert_eq!(completed_bundle_ids(&orders), vec!["b1".to_string()]);
    }

    #[test]
    fn test_extend_header_keeps_user_columns() {
        let existing = vec!["SKU".to_string(), "Комментарий".to_string()];
        let statuses: BTreeSet<String> = ["delivered".to_string(), IN_TRANSIT.to_string()].into();
        let header = extend_header(&existing, &statuses);
        assert_eq!(header[0], "SKU");
        assert_eq!(header[1], "Комментарий");
        assert_eq!(header[2], COL_DATE);
        assert_eq!(header.len(), 2 + 6 + 2);
        assert_eq!(header[8], "delivered");
        assert_eq!(header[9], IN_TRANSIT);
    }

    #[test]
    fn test_plan_updates_matched_and_appends_new() {
        let existing: Vec<Vec<String>> = vec![
            BASE_HEADER.iter().map(|s| s.to_string()).chain([IN_TRANSIT.to_string()]).collect(),
            vec!["01.05.2024 (10:00)".into(), "2".into()],
        ];
        let pivot = pivot_statuses(&[posting("delivering", &[(1, 1), (2, 5)])]);
        let free = HashMap::from([(2, 7)]);
        let mut returns = ReturnTotals::new();
        returns.entry(2).or_default().insert(RETURNS_UTIL, 1);
        let supply = HashMap::from([(1, ("OFFER-1".to_string(), 30))]);

        let plan = plan_balance(
            &existing,
            &BalanceSources {
                pivot: &pivot,
                free: &free,
                returns: &returns,
                supply: &supply,
                date_display: "07.05.2024 (09:00)".into(),
            },
        );
        assert!(!plan.header_changed);
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].range, "A2:H2");
        let row = &plan.updates[0].values[0];
        assert_eq!(row[4], json!(7));
        assert_eq!(row[5], json!(1));
        assert_eq!(row[6], json!(""));
        assert_eq!(row[7], json!(5));

        assert_eq!(plan.appends.len(), 1);
        assert_eq!(plan.appends[0][1], json!(1));
        assert_eq!(plan.appends[0][2], json!("OFFER-1"));
        assert_eq!(plan.appends[0][3], json!(30));
    }

    #[test]
    fn test_empty_sheet_gets_full_header() {
        let pivot = pivot_statuses(&[posting("delivered", &[(9, 1)])]);
        let plan = plan_balance(
            &[],
            &BalanceSources {
                pivot: &pivot,
                free: &HashMap::new(),
                returns: &ReturnTotals::new(),
                supply: &HashMap::new(),
                date_display: String::new(),
            },
        );
        assert!(plan.header_changed);
        assert_eq!(plan.header.len(), 8);
        assert_eq!(plan.appends.len(), 1);
    }
}
