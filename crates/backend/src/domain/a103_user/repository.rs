use anyhow::Result;
use contracts::domain::a103_user::aggregate::User;
use serde_json::Value;

use crate::shared::sheets::{cell_at, ensure_with_header, SheetStore};

pub const USERS_SHEET: &str = "Users";
const HEADER: [&str; 3] = ["tg_id", "username", "full_name"];

/// Добавить пользователя, если его ещё нет. true — строка добавлена
pub async fn ensure_user(sheets: &dyn SheetStore, user: &User) -> Result<bool> {
    let rows = ensure_with_header(sheets, USERS_SHEET, &HEADER).await?;
    let tg_id = user.tg_id.to_string();
    if rows.iter().skip(1).any(|r| cell_at(r, 0).trim() == tg_id) {
        return Ok(false);
    }
    let row = user.to_row().into_iter().map(Value::String).collect();
    sheets.append_rows(USERS_SHEET, vec![row]).await?;
    tracing::info!("User {} registered", tg_id);
    Ok(true)
}
