//! Сверка колонки «Расходы на рекламу» листа `unit-day` с новой статистикой

use anyhow::Result;
use serde_json::json;
use std::collections::HashMap;

use super::statistics::SpendByDaySku;
use crate::shared::format::{date_key, parse_num, parse_sku, round2};
use crate::shared::sheets::a1::cell;
use crate::shared::sheets::{cell_at, CellRange};

pub const SPEND_HEADER: &str = "Расходы на рекламу";
const TOTAL_LABEL: &str = "Итого";

/// (дата, SKU) → номер строки листа (1-based).
/// Пустые строки и «Итого» пропускаются, при повторе ключа берётся последняя строка.
pub fn row_index(rows: &[Vec<String>]) -> HashMap<(String, i64), usize> {
    let mut index = HashMap::new();
    for (i, row) in rows.iter().enumerate().skip(1) {
        let first = cell_at(row, 0).trim();
        if first.is_empty() || first == TOTAL_LABEL {
            continue;
        }
        if let Some(sku) = parse_sku(cell_at(row, 1)) {
            index.insert((date_key(first).to_string(), sku), i + 1);
        }
    }
    index
}

/// Ячейки, которые надо переписать: только изменившиеся значения.
/// Ключи без строки в листе игнорируются.
pub fn plan_updates(rows: &[Vec<String>], spend: &SpendByDaySku) -> Result<Vec<CellRange>> {
    let header = rows
        .first()
        .ok_or_else(|| anyhow::anyhow!("Лист пуст: нет заголовка"))?;
    let col = header
        .iter()
        .position(|h| h.trim() == SPEND_HEADER)
        .ok_or_else(|| anyhow::anyhow!("Нет колонки «{}»", SPEND_HEADER))?;

    let index = row_index(rows);
    let mut updates = Vec::new();
    for (key, rub) in spend {
        let Some(&row) = index.get(key) else {
            continue;
        };
        let new_value = round2(*rub);
        let current = rows.get(row - 1).map(|r| cell_at(r, col)).unwrap_or_default();
        if !current.trim().is_empty() && parse_num(current) == new_value {
            continue;
        }
        updates.push(CellRange::single(cell(col + 1, row), json!(new_value)));
    }
    Ok(updates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet() -> Vec<Vec<String>> {
        [
            vec!["Дата обновления", "SKU", "Название", "Кол-во", "Сумма", "Расходы на рекламу"],
            vec!["07.05.2024 (09:00 МСК)", "111", "Чехол", "1", "500", "0"],
            vec!["07.05.2024 (09:00 МСК)", "222", "Плёнка", "1", "100", "3"],
            vec!["Итого", "", "", "", "", "3"],
            vec![],
            vec!["06.05.2024", "111", "Чехол", "2", "900", "12,75"],
        ]
        .into_iter()
        .map(|r| r.into_iter().map(String::from).collect())
        .collect()
    }

    #[test]
    fn test_row_index_uses_sheet_row_numbers() {
        let index = row_index(&sheet());
        assert_eq!(index[&("07.05.2024".to_string(), 111)], 2);
        assert_eq!(index[&("07.05.2024".to_string(), 222)], 3);
        assert_eq!(index[&("06.05.2024".to_string(), 111)], 6);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_duplicate_key_maps_to_last_row() {
        let mut rows = sheet();
        rows.push(
            ["07.05.2024 (12:00 МСК)", "111", "Чехол", "1", "500", ""]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        let index = row_index(&rows);
        assert_eq!(index[&("07.05.2024".to_string(), 111)], 7);

        let mut spend = SpendByDaySku::new();
        spend.insert(("07.05.2024".into(), 111), 5.0);
        let updates = plan_updates(&rows, &spend).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].range, "F7");
    }

    #[test]
    fn test_only_changed_cells_are_written() {
        let mut spend = SpendByDaySku::new();
        spend.insert(("07.05.2024".into(), 111), 42.004);
        spend.insert(("07.05.2024".into(), 222), 3.0);
        spend.insert(("06.05.2024".into(), 111), 12.75);
        spend.insert(("01.01.2020".into(), 999), 1.0);

        let updates = plan_updates(&sheet(), &spend).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].range, "F2");
        assert_eq!(updates[0].values, vec![vec![json!(42.0)]]);
    }

    #[test]
    fn test_missing_header_column() {
        let rows = vec![vec!["Дата".to_string(), "SKU".to_string()]];
        assert!(plan_updates(&rows, &SpendByDaySku::new()).is_err());
        assert!(plan_updates(&[], &SpendByDaySku::new()).is_err());
    }
}
