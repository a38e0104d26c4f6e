//! Лист `input`: справочник SKU, который заполняет продавец

use anyhow::Result;
use std::collections::HashMap;

use crate::shared::format::{parse_num_opt, parse_sku, round2};
use crate::shared::sheets::{cell_at, SheetStore};

pub const INPUT_SHEET: &str = "input";

/// Строка справочника для юнит-экономики
#[derive(Debug, Clone, PartialEq)]
pub struct UnitInput {
    pub name: String,
    /// Себестоимость единицы
    pub unit_cost: f64,
    /// Налог, %
    pub tax_pct: f64,
}

/// Себестоимость и налог для недельного отчёта
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CostTax {
    pub cost: f64,
    /// Доля (0.07 для 7 %)
    pub tax_rate: f64,
}

/// Прочитать лист `input`, создав его при отсутствии
pub async fn read_input_sheet(sheets: &dyn SheetStore) -> Result<Vec<Vec<String>>> {
    sheets.ensure_worksheet(INPUT_SHEET, 100, 4).await?;
    sheets.read_all(INPUT_SHEET).await
}

/// Позиционный разбор: SKU | Название | Себестоимость | Налог %.
/// Пустой или нечисловой налог заменяется `default_tax`.
pub fn parse_unit_inputs(rows: &[Vec<String>], default_tax: f64) -> HashMap<String, UnitInput> {
    rows.iter()
        .skip(1)
        .filter(|r| !cell_at(r, 0).trim().is_empty())
        .map(|r| {
            let sku = cell_at(r, 0).trim().to_string();
            let input = UnitInput {
                name: cell_at(r, 1).trim().to_string(),
                unit_cost: parse_num_opt(cell_at(r, 2)).map(round2).unwrap_or(0.0),
                tax_pct: parse_num_opt(cell_at(r, 3))
                    .map(round2)
                    .unwrap_or(default_tax),
            };
            (sku, input)
        })
        .collect()
}

/// Разбор по заголовку: `SKU`, `Себестоимость` (иначе 3-я колонка),
/// `% Налога` (иначе 4-я колонка, в процентах)
pub fn parse_cost_lookup(rows: &[Vec<String>]) -> HashMap<i64, CostTax> {
    let Some(header) = rows.first() else {
        return HashMap::new();
    };
    let find = |name: &str| header.iter().position(|h| h.trim() == name);
    let sku_col = find("SKU").unwrap_or(0);
    let cost_col = find("Себестоимость").unwrap_or(2);
    let tax_col = find("% Налога").unwrap_or(3);

    rows.iter()
        .skip(1)
        .filter_map(|r| {
            let sku = parse_sku(cell_at(r, sku_col))?;
            let cost = parse_num_opt(cell_at(r, cost_col)).unwrap_or(0.0);
            let tax = parse_num_opt(cell_at(r, tax_col)).unwrap_or(0.0) / 100.0;
            Some((sku, CostTax { cost, tax_rate: tax }))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_unit_inputs_default_tax() {
        let data = rows(&[
            &["SKU", "Название", "Себес", "Налог"],
            &["111", " Чехол ", "120,5", "6%"],
            &["222", "Плёнка", "", ""],
            &["", "пусто"],
        ]);
        let map = parse_unit_inputs(&data, 7.0);
        assert_eq!(map.len(), 2);
        assert_eq!(
            map["111"],
            UnitInput {
                name: "Чехол".into(),
                unit_cost: 120.5,
                tax_pct: 6.0
            }
        );
        assert_eq!(map["222"].tax_pct, 7.0);
        assert_eq!(map["222"].unit_cost, 0.0);
    }

    #[test]
    fn test_cost_lookup_by_header() {
        let data = rows(&[
            &["Название", "SKU", "% Налога", "Себестоимость"],
            &["Чехол", "111", "6", "100"],
            &["Итого", "x", "", ""],
        ]);
        let map = parse_cost_lookup(&data);
        assert_eq!(map.len(), 1);
        let v = map[&111];
        assert_eq!(v.cost, 100.0);
        assert!((v.tax_rate - 0.06).abs() < 1e-9);
    }

    #[test]
    fn test_cost_lookup_positional_fallback() {
        let data = rows(&[&["SKU", "Имя", "Себ", "Нал"], &["5", "x", "10,5", "7"]]);
        let map = parse_cost_lookup(&data);
        assert_eq!(map[&5].cost, 10.5);
        assert!((map[&5].tax_rate - 0.07).abs() < 1e-9);
        assert!(parse_cost_lookup(&[]).is_empty());
    }
}
