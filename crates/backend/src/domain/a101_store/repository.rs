use anyhow::Result;
use contracts::domain::a101_store::aggregate::{Store, StoreId};
use serde_json::{json, Value};

use crate::shared::sheets::styles::delete_row;
use crate::shared::sheets::{cell_at, ensure_with_header, SheetStore};

pub const STORES_SHEET: &str = "Stores";
const HEADER: [&str; 7] = [
    "store_id",
    "owner_id",
    "marketplace",
    "name",
    "credentials_json",
    "sheet_id",
    "sa_path",
];
/// Колонка имени магазина
const NAME_COLUMN: &str = "D";

async fn load_rows(sheets: &dyn SheetStore) -> Result<Vec<Vec<String>>> {
    ensure_with_header(sheets, STORES_SHEET, &HEADER).await
}

/// Номер строки магазина (1-based)
fn find_row(rows: &[Vec<String>], store_id: &StoreId) -> Option<usize> {
    rows.iter()
        .enumerate()
        .skip(1)
        .find(|(_, r)| cell_at(r, 0).trim() == store_id.as_str())
        .map(|(i, _)| i + 1)
}

/// Все магазины. Битые строки пропускаются с предупреждением
pub async fn list_all(sheets: &dyn SheetStore) -> Result<Vec<Store>> {
    let rows = load_rows(sheets).await?;
    Ok(rows
        .iter()
        .skip(1)
        .filter(|r| !cell_at(r, 0).trim().is_empty())
        .filter_map(|r| match Store::from_row(r) {
            Ok(store) => Some(store),
            Err(e) => {
                tracing::warn!("Skipping store row: {}", e);
                None
            }
        })
        .collect())
}

pub async fn get(sheets: &dyn SheetStore, store_id: &StoreId) -> Result<Option<Store>> {
    let rows = load_rows(sheets).await?;
    match find_row(&rows, store_id) {
        Some(row) => Ok(Some(Store::from_row(&rows[row - 1])?)),
        None => Ok(None),
    }
}

pub async fn insert(sheets: &dyn SheetStore, store: &Store) -> Result<()> {
    let rows = load_rows(sheets).await?;
    if find_row(&rows, &store.store_id).is_some() {
        anyhow::bail!("Магазин {} уже зарегистрирован", store.store_id);
    }
    let row: Vec<Value> = store.to_row().into_iter().map(Value::String).collect();
    sheets.append_rows(STORES_SHEET, vec![row]).await
}

/// Переименовать. false — магазин не найден
pub async fn rename(sheets: &dyn SheetStore, store_id: &StoreId, name: &str) -> Result<bool> {
    let rows = load_rows(sheets).await?;
    let Some(row) = find_row(&rows, store_id) else {
        return Ok(false);
    };
    let cell = format!("{}{}", NAME_COLUMN, row);
    sheets
        .update(STORES_SHEET, &cell, vec![vec![json!(name)]])
        .await?;
    Ok(true)
}

/// Удалить строку магазина. false — магазин не найден
pub async fn delete(sheets: &dyn SheetStore, store_id: &StoreId) -> Result<bool> {
    let rows = load_rows(sheets).await?;
    let Some(row) = find_row(&rows, store_id) else {
        return Ok(false);
    };
    let ws = sheets
        .find_worksheet(STORES_SHEET)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Worksheet {} not found", STORES_SHEET))?;
    sheets.batch_update(vec![delete_row(ws.sheet_id, row)]).await?;
    Ok(true)
}
