//! Слияние нового отчёта с листом и оформление

use serde_json::Value;

use super::builder::TOTAL_LABEL;
use crate::shared::sheets::styles::{
    clear_formatting, freeze_rows, paint, row_runs, Rgb, RowSpan, WHITE,
};
use crate::shared::sheets::{text_rows, value_text};

const HEAD_COLOR: Rgb = Rgb(1.0, 0.96, 0.62);
const TOTAL_COLOR: Rgb = Rgb(0.88, 0.88, 0.88);

type Row = Vec<Value>;

pub fn is_blank(row: &Row) -> bool {
    row.iter().all(|v| value_text(v).trim().is_empty())
}

pub fn is_total(row: &Row) -> bool {
    row.first().map(value_text).as_deref() == Some(TOTAL_LABEL)
}

/// Блоки периодов без шапки. Граница блока – две и более пустые строки подряд;
/// одиночная пустая строка остаётся внутри блока.
pub fn period_blocks(rows: &[Row]) -> Vec<Vec<Row>> {
    let mut blocks: Vec<Vec<Row>> = Vec::new();
    let mut current: Vec<Row> = Vec::new();
    let mut blanks: Vec<Row> = Vec::new();
    for row in rows.iter().skip(1) {
        if is_blank(row) {
            blanks.push(row.clone());
            continue;
        }
        if blanks.len() >= 2 && !current.is_empty() {
            blocks.push(std::mem::take(&mut current));
        } else if !current.is_empty() {
            current.append(&mut blanks);
        }
        blanks.clear();
        current.push(row.clone());
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

/// Подпись периода блока: первая непустая ячейка A, кроме «Итого»
fn block_period(block: &[Row]) -> Option<String> {
    block
        .iter()
        .filter_map(|r| r.first().map(value_text))
        .find(|t| !t.is_empty() && t != TOTAL_LABEL)
}

/// Собрать лист: шапка и свежие периоды из нового отчёта,
/// затем старые периоды листа.
///
/// Из нового отчёта берутся блоки вплоть до периода, который был верхним
/// на листе (он пересчитывается), остальное остаётся как было на листе.
/// Пустой лист получает отчёт целиком.
pub fn merge_with_existing(new_rows: Vec<Row>, old: &[Vec<String>]) -> Vec<Row> {
    let old_rows = text_rows(old);
    let old_blocks = period_blocks(&old_rows);
    if old.len() <= 1 || old_blocks.is_empty() {
        return new_rows;
    }
    let Some(header) = new_rows.first().cloned() else {
        return new_rows;
    };

    let new_blocks = period_blocks(&new_rows);
    let anchor = block_period(&old_blocks[0]);
    let fresh = anchor
        .and_then(|a| {
            new_blocks
                .iter()
                .position(|b| block_period(b).as_deref() == Some(a.as_str()))
        })
        .map(|i| i + 1)
        .unwrap_or(1)
        .min(new_blocks.len());

    let mut merged = vec![header];
    let blocks = new_blocks
        .into_iter()
        .take(fresh)
        .chain(old_blocks.into_iter().skip(1));
    for (i, block) in blocks.enumerate() {
        if i > 0 {
            merged.push(Vec::new());
            merged.push(Vec::new());
        }
        merged.extend(block);
    }
    merged
}

/// Сброс формата, шапка, «Итого», пустые строки, закреплённая первая строка
pub fn style_requests(sheet_id: i64, rows: &[Row]) -> Vec<Value> {
    let width = rows.first().map(Vec::len).filter(|w| *w > 0);
    let mut requests = vec![
        clear_formatting(sheet_id),
        paint(sheet_id, Some(RowSpan::rows(1, 1, width)), HEAD_COLOR, true),
    ];
    let span = |start, end| Some(RowSpan::rows(start, end, width));
    for (start, end) in row_runs(rows, is_total) {
        requests.push(paint(sheet_id, span(start, end), TOTAL_COLOR, true));
    }
    for (start, end) in row_runs(rows, is_blank) {
        requests.push(paint(sheet_id, span(start, end), WHITE, false));
    }
    requests.push(freeze_rows(sheet_id, 1));
    requests
}
