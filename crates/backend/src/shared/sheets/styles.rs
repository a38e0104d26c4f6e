//! Запросы spreadsheets:batchUpdate для оформления листов

use serde_json::{json, Value};

/// Цвет фона в долях единицы, как его принимает Sheets API
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb(pub f64, pub f64, pub f64);

pub const WHITE: Rgb = Rgb(1.0, 1.0, 1.0);

/// Диапазон строк [start, end) в 0-based индексах; None — весь лист
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowSpan {
    pub start: usize,
    pub end: usize,
    /// Ограничение по колонкам [0, cols)
    pub cols: Option<usize>,
}

impl RowSpan {
    /// Строки листа `first..=last` в 1-based нумерации
    pub fn rows(first: usize, last: usize, cols: Option<usize>) -> Self {
        Self {
            start: first.saturating_sub(1),
            end: last,
            cols,
        }
    }
}

fn grid_range(sheet_id: i64, span: Option<RowSpan>) -> Value {
    let mut range = json!({ "sheetId": sheet_id });
    if let Some(span) = span {
        range["startRowIndex"] = json!(span.start);
        range["endRowIndex"] = json!(span.end);
        if let Some(cols) = span.cols {
            range["startColumnIndex"] = json!(0);
            range["endColumnIndex"] = json!(cols);
        }
    }
    range
}

/// Фон + жирность для диапазона
pub fn paint(sheet_id: i64, span: Option<RowSpan>, color: Rgb, bold: bool) -> Value {
    json!({
        "repeatCell": {
            "range": grid_range(sheet_id, span),
            "cell": {
                "userEnteredFormat": {
                    "backgroundColor": { "red": color.0, "green": color.1, "blue": color.2 },
                    "textFormat": { "bold": bold }
                }
            },
            "fields": "userEnteredFormat(backgroundColor,textFormat.bold)"
        }
    })
}

/// Сбросить всё пользовательское форматирование листа
pub fn clear_formatting(sheet_id: i64) -> Value {
    json!({
        "updateCells": {
            "range": { "sheetId": sheet_id },
            "fields": "userEnteredFormat"
        }
    })
}

pub fn freeze_rows(sheet_id: i64, rows: usize) -> Value {
    json!({
        "updateSheetProperties": {
            "properties": {
                "sheetId": sheet_id,
                "gridProperties": { "frozenRowCount": rows }
            },
            "fields": "gridProperties.frozenRowCount"
        }
    })
}

/// Удалить строку листа (1-based номер)
pub fn delete_row(sheet_id: i64, row: usize) -> Value {
    json!({
        "deleteDimension": {
            "range": {
                "sheetId": sheet_id,
                "dimension": "ROWS",
                "startIndex": row.saturating_sub(1),
                "endIndex": row
            }
        }
    })
}

/// Непрерывные группы строк (1-based, включительно), удовлетворяющие условию.
/// Строка заголовка (первая) не рассматривается.
pub fn row_runs<T>(rows: &[T], pred: impl Fn(&T) -> bool) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut current: Option<usize> = None;
    for (i, row) in rows.iter().enumerate().skip(1) {
        let n = i + 1;
        match (pred(row), current) {
            (true, None) => current = Some(n),
            (false, Some(start)) => {
                runs.push((start, n - 1));
                current = None;
            }
            _ => {}
        }
    }
    if let Some(start) = current {
        runs.push((start, rows.len()));
    }
    runs
}
