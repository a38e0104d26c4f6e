//! Таблица в памяти для тестов конвейеров отчётов

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use super::a1::range_start;
use super::{value_text, CellRange, SheetStore, Worksheet};

#[derive(Default)]
struct State {
    sheets: HashMap<String, (i64, Vec<Vec<String>>)>,
    next_id: i64,
    requests: Vec<Value>,
}

#[derive(Default)]
pub struct MemorySheets {
    state: Mutex<State>,
}

impl MemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Создать лист с содержимым
    pub fn with_sheet(self, title: &str, rows: &[&[&str]]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let id = state.next_id;
            let rows = rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect();
            state.sheets.insert(title.to_string(), (id, rows));
        }
        self
    }

    pub fn rows(&self, title: &str) -> Vec<Vec<String>> {
        let state = self.state.lock().unwrap();
        state
            .sheets
            .get(title)
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default()
    }

    pub fn has_sheet(&self, title: &str) -> bool {
        self.state.lock().unwrap().sheets.contains_key(title)
    }

    /// Все структурные запросы batchUpdate в порядке поступления
    pub fn requests(&self) -> Vec<Value> {
        self.state.lock().unwrap().requests.clone()
    }

    fn write(rows: &mut Vec<Vec<String>>, start: (usize, usize), values: &[Vec<Value>]) {
        let (col, row) = start;
        for (ri, line) in values.iter().enumerate() {
            let r = row - 1 + ri;
            while rows.len() <= r {
                rows.push(Vec::new());
            }
            for (ci, value) in line.iter().enumerate() {
                let c = col - 1 + ci;
                let target = &mut rows[r];
                while target.len() <= c {
                    target.push(String::new());
                }
                target[c] = value_text(value);
            }
        }
    }

    fn trimmed(rows: &[Vec<String>]) -> Vec<Vec<String>> {
        let mut out: Vec<Vec<String>> = rows
            .iter()
            .map(|r| {
                let mut r = r.clone();
                while r.last().map(|c| c.is_empty()).unwrap_or(false) {
                    r.pop();
                }
                r
            })
            .collect();
        while out.last().map(|r| r.is_empty()).unwrap_or(false) {
            out.pop();
        }
        out
    }
}

#[async_trait]
impl SheetStore for MemorySheets {
    async fn find_worksheet(&self, title: &str) -> Result<Option<Worksheet>> {
        let state = self.state.lock().unwrap();
        Ok(state.sheets.get(title).map(|(id, _)| Worksheet {
            sheet_id: *id,
            title: title.to_string(),
        }))
    }

    async fn ensure_worksheet(&self, title: &str, _rows: u32, _cols: u32) -> Result<Worksheet> {
        let mut state = self.state.lock().unwrap();
        if let Some((id, _)) = state.sheets.get(title) {
            return Ok(Worksheet {
                sheet_id: *id,
                title: title.to_string(),
            });
        }
        state.next_id += 1;
        let id = state.next_id;
        state.sheets.insert(title.to_string(), (id, Vec::new()));
        Ok(Worksheet {
            sheet_id: id,
            title: title.to_string(),
        })
    }

    async fn read_all(&self, title: &str) -> Result<Vec<Vec<String>>> {
        let state = self.state.lock().unwrap();
        match state.sheets.get(title) {
            Some((_, rows)) => Ok(Self::trimmed(rows)),
            None => anyhow::bail!("Worksheet '{}' not found", title),
        }
    }

    async fn update(&self, title: &str, start: &str, values: Vec<Vec<Value>>) -> Result<()> {
        let start = range_start(start).ok_or_else(|| anyhow::anyhow!("Bad range {}", start))?;
        let mut state = self.state.lock().unwrap();
        let (_, rows) = state
            .sheets
            .get_mut(title)
            .ok_or_else(|| anyhow::anyhow!("Worksheet '{}' not found", title))?;
        Self::write(rows, start, &values);
        Ok(())
    }

    async fn batch_update_values(&self, title: &str, data: Vec<CellRange>) -> Result<()> {
        for d in data {
            self.update(title, &d.range, d.values).await?;
        }
        Ok(())
    }

    async fn append_rows(&self, title: &str, new_rows: Vec<Vec<Value>>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let (_, rows) = state
            .sheets
            .get_mut(title)
            .ok_or_else(|| anyhow::anyhow!("Worksheet '{}' not found", title))?;
        let next = Self::trimmed(rows).len() + 1;
        Self::write(rows, (1, next), &new_rows);
        Ok(())
    }

    async fn clear(&self, title: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some((_, rows)) = state.sheets.get_mut(title) {
            rows.clear();
        }
        Ok(())
    }

    async fn batch_update(&self, requests: Vec<Value>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for req in &requests {
            if let Some(range) = req.get("deleteDimension").map(|d| &d["range"]) {
                let sheet_id = range["sheetId"].as_i64().unwrap_or_default();
                let start = range["startIndex"].as_u64().unwrap_or_default() as usize;
                let end = range["endIndex"].as_u64().unwrap_or_default() as usize;
                if let Some((_, rows)) = state.sheets.values_mut().find(|(id, _)| *id == sheet_id) {
                    let end = end.min(rows.len());
                    if start < end {
                        rows.drain(start..end);
                    }
                }
            }
        }
        state.requests.extend(requests);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_update_and_append() {
        let sheets = MemorySheets::new().with_sheet("s", &[&["h1", "h2"]]);
        sheets
            .update("s", "B3", vec![vec![json!(1.5), json!("x")]])
            .await
            .unwrap();
        sheets.append_rows("s", vec![vec![json!("tail")]]).await.unwrap();
        let rows = sheets.read_all("s").await.unwrap();
        assert_eq!(rows[2], vec!["", "1.5", "x"]);
        assert_eq!(rows[3], vec!["tail"]);
        assert_eq!(rows[1], Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_delete_dimension_removes_row() {
        let sheets = MemorySheets::new().with_sheet("s", &[&["a"], &["b"], &["c"]]);
        let ws = sheets.find_worksheet("s").await.unwrap().unwrap();
        sheets
            .batch_update(vec![super::super::styles::delete_row(ws.sheet_id, 2)])
            .await
            .unwrap();
        assert_eq!(sheets.rows("s"), vec![vec!["a"], vec!["c"]]);
    }
}
