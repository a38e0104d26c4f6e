pub mod a1;
pub mod client;
pub mod google_auth;
#[cfg(test)]
pub mod memory;
pub mod styles;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::shared::config::resolve_path;

pub use client::GoogleSheetsClient;

/// Лист внутри таблицы
#[derive(Debug, Clone, PartialEq)]
pub struct Worksheet {
    pub sheet_id: i64,
    pub title: String,
}

/// Диапазон для пакетной записи значений. `range` без имени листа (`F12`, `A2:O2`)
#[derive(Debug, Clone, PartialEq)]
pub struct CellRange {
    pub range: String,
    pub values: Vec<Vec<Value>>,
}

impl CellRange {
    pub fn single(range: impl Into<String>, value: Value) -> Self {
        Self {
            range: range.into(),
            values: vec![vec![value]],
        }
    }

    pub fn row(range: impl Into<String>, row: Vec<Value>) -> Self {
        Self {
            range: range.into(),
            values: vec![row],
        }
    }
}

/// Доступ к одной Google-таблице.
///
/// Все значения пишутся в режиме USER_ENTERED (формулы вычисляются),
/// читаются как отформатированный текст.
#[async_trait]
pub trait SheetStore: Send + Sync {
    async fn find_worksheet(&self, title: &str) -> Result<Option<Worksheet>>;

    /// Найти лист или создать его заданного размера
    async fn ensure_worksheet(&self, title: &str, rows: u32, cols: u32) -> Result<Worksheet>;

    /// Все значения листа (строки без хвостовых пустых ячеек)
    async fn read_all(&self, title: &str) -> Result<Vec<Vec<String>>>;

    /// Записать прямоугольник значений начиная с `start` (`A1`)
    async fn update(&self, title: &str, start: &str, values: Vec<Vec<Value>>) -> Result<()>;

    async fn batch_update_values(&self, title: &str, data: Vec<CellRange>) -> Result<()>;

    /// Дописать строки после последней заполненной
    async fn append_rows(&self, title: &str, rows: Vec<Vec<Value>>) -> Result<()>;

    async fn clear(&self, title: &str) -> Result<()>;

    /// Структурные запросы spreadsheets:batchUpdate (формат, заморозка, удаление строк)
    async fn batch_update(&self, requests: Vec<Value>) -> Result<()>;
}

/// Открывает таблицу магазина его сервисным аккаунтом
#[async_trait]
pub trait SheetOpener: Send + Sync {
    async fn open(&self, sa_path: &str, spreadsheet_id: &str) -> Result<Arc<dyn SheetStore>>;
}

/// Google Sheets API; путь к ключу относительно каталога программы
pub struct GoogleSheetOpener;

#[async_trait]
impl SheetOpener for GoogleSheetOpener {
    async fn open(&self, sa_path: &str, spreadsheet_id: &str) -> Result<Arc<dyn SheetStore>> {
        let client = GoogleSheetsClient::open(&resolve_path(sa_path), spreadsheet_id).await?;
        Ok(Arc::new(client))
    }
}

/// Найти или создать лист; в пустой лист записать шапку. Возвращает все строки
pub async fn ensure_with_header(
    sheets: &dyn SheetStore,
    title: &str,
    header: &[&str],
) -> Result<Vec<Vec<String>>> {
    sheets
        .ensure_worksheet(title, 1000, header.len().max(1) as u32)
        .await?;
    let rows = sheets.read_all(title).await?;
    if !rows.is_empty() {
        return Ok(rows);
    }
    let header_row: Vec<Value> = header.iter().map(|h| Value::String(h.to_string())).collect();
    sheets.update(title, "A1", vec![header_row]).await?;
    Ok(vec![header.iter().map(|h| h.to_string()).collect()])
}

/// Текст ячейки так, как его покажет таблица для простых значений
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            Some(f) => format!("{}", f),
            None => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Строки таблицы → значения для записи
pub fn text_rows(rows: &[Vec<String>]) -> Vec<Vec<Value>> {
    rows.iter()
        .map(|r| r.iter().map(|c| Value::String(c.clone())).collect())
        .collect()
}

/// Ячейка строки или пустая строка
pub fn cell_at(row: &[String], index: usize) -> &str {
    row.get(index).map(|s| s.as_str()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_text() {
        assert_eq!(value_text(&json!(3.0)), "3");
        assert_eq!(value_text(&json!(12.5)), "12.5");
        assert_eq!(value_text(&json!(-7)), "-7");
        assert_eq!(value_text(&json!("=SUM(D2:D3)")), "=SUM(D2:D3)");
        assert_eq!(value_text(&Value::Null), "");
    }

    #[test]
    fn test_cell_at_out_of_range() {
        let row = vec!["a".to_string()];
        assert_eq!(cell_at(&row, 0), "a");
        assert_eq!(cell_at(&row, 5), "");
    }
}
