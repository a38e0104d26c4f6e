//! Выбор наименее загруженного сервисного аккаунта с кэшем листа `service_acc`

use anyhow::Result;
use contracts::domain::a102_service_account::aggregate::{ServiceAccount, ServiceAccountPick};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::shared::sheets::SheetStore;

pub const SA_SHEET: &str = "service_acc";
pub const CACHE_TTL: Duration = Duration::from_secs(300);

/// Аккаунт и номер его строки в листе (1-based)
#[derive(Debug, Clone)]
struct CachedAccount {
    row: usize,
    account: ServiceAccount,
}

#[derive(Default)]
struct CacheState {
    accounts: Vec<CachedAccount>,
    loaded_at: Option<Instant>,
}

/// Кэш листа `service_acc`. Счётчик использования увеличивается локально,
/// в таблицу уходит фоновой записью.
pub struct ServiceAccountCache {
    sheets: Arc<dyn SheetStore>,
    state: Mutex<CacheState>,
    ttl: Duration,
}

impl ServiceAccountCache {
    pub fn new(sheets: Arc<dyn SheetStore>) -> Self {
        Self {
            sheets,
            state: Mutex::new(CacheState::default()),
            ttl: CACHE_TTL,
        }
    }

    async fn refresh(&self, state: &mut CacheState) -> Result<()> {
        let rows = self.sheets.read_all(SA_SHEET).await?;
        state.accounts = rows
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(i, row)| {
                ServiceAccount::from_row(row).map(|account| CachedAccount { row: i + 1, account })
            })
            .collect();
        state.loaded_at = Some(Instant::now());
        tracing::debug!("service_acc cache refreshed: {} rows", state.accounts.len());
        Ok(())
    }

    /// Выбрать активный аккаунт с минимальным used_count и занять его
    pub async fn pick(&self) -> Result<ServiceAccountPick> {
        let mut state = self.state.lock().await;
        let stale = state
            .loaded_at
            .map(|t| t.elapsed() > self.ttl)
            .unwrap_or(true);
        if stale || state.accounts.is_empty() {
            self.refresh(&mut state).await?;
        }

        let idx = least_used(&state.accounts)
            .ok_or_else(|| anyhow::anyhow!("В service_acc нет доступных аккаунтов"))?;
        let cached = &mut state.accounts[idx];
        cached.account.used_count += 1;

        let pick = ServiceAccountPick {
            path: cached.account.json_path.clone(),
            email: cached.account.email.clone(),
        };
        self.push_count(cached.row, cached.account.used_count);
        Ok(pick)
    }

    fn push_count(&self, row: usize, count: i64) {
        let sheets = self.sheets.clone();
        tokio::spawn(async move {
            let cell = format!("C{}", row);
            if let Err(e) = sheets.update(SA_SHEET, &cell, vec![vec![json!(count)]]).await {
                tracing::warn!("SA push failed for {}: {}", cell, e);
            }
        });
    }
}

fn least_used(accounts: &[CachedAccount]) -> Option<usize> {
    accounts
        .iter()
        .enumerate()
        .filter(|(_, c)| c.account.is_active())
        .min_by_key(|(_, c)| c.account.used_count)
        .map(|(i, _)| i)
}
