use anyhow::Result;
use contracts::domain::a101_store::aggregate::{Store, StoreCredentials, StoreId, StoreSummary};
use contracts::domain::a103_user::aggregate::User;
use contracts::enums::MarketplaceType;
use std::sync::Arc;

use super::repository;
use crate::domain::a102_service_account::ServiceAccountCache;
use crate::domain::a103_user::repository as users;
use crate::shared::sheets::SheetStore;

/// Реестр пользователей и магазинов в тех-таблице
pub struct StoreRegistry {
    sheets: Arc<dyn SheetStore>,
    accounts: ServiceAccountCache,
}

impl StoreRegistry {
    pub fn new(sheets: Arc<dyn SheetStore>) -> Self {
        let accounts = ServiceAccountCache::new(sheets.clone());
        Self { sheets, accounts }
    }

    pub async fn ensure_user(&self, user: &User) -> Result<bool> {
        users::ensure_user(self.sheets.as_ref(), user).await
    }

    pub async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<StoreSummary>> {
        Ok(repository::list_all(self.sheets.as_ref())
            .await?
            .iter()
            .filter(|s| s.owner_id == owner_id)
            .map(Store::summary)
            .collect())
    }

    pub async fn list_all(&self) -> Result<Vec<Store>> {
        repository::list_all(self.sheets.as_ref()).await
    }

    pub async fn get(&self, store_id: &StoreId) -> Result<Option<Store>> {
        repository::get(self.sheets.as_ref(), store_id).await
    }

    /// Зарегистрировать магазин и закрепить за ним сервисный аккаунт.
    /// Для Ozon идентификатор магазина – Client-Id.
    pub async fn add_store(
        &self,
        owner_id: i64,
        marketplace: MarketplaceType,
        credentials: StoreCredentials,
        sheet_id: String,
    ) -> Result<Store> {
        if credentials.api_key.trim().is_empty() {
            anyhow::bail!("Не указан api_key");
        }
        if sheet_id.trim().is_empty() {
            anyhow::bail!("Не указан ID таблицы");
        }
        let store_id = match (marketplace, credentials.client_id.as_deref().map(str::trim)) {
            (MarketplaceType::Ozon, Some(id)) if !id.is_empty() => StoreId::new(id),
            (MarketplaceType::Ozon, _) => anyhow::bail!("Для Ozon нужен Client-Id"),
            _ => StoreId::new_v4(),
        };

        let sa = self.accounts.pick().await?;
        let store = Store::new_for_insert(
            store_id,
            owner_id,
            marketplace,
            credentials,
            sheet_id.trim().to_string(),
            sa.path,
        );
        repository::insert(self.sheets.as_ref(), &store).await?;
        tracing::info!(
            "Store {} added for {} (service account {})",
            store.store_id,
            owner_id,
            sa.email
        );
        Ok(store)
    }

    pub async fn rename_store(&self, store_id: &StoreId, name: &str) -> Result<bool> {
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("Пустое название магазина");
        }
        repository::rename(self.sheets.as_ref(), store_id, name).await
    }

    pub async fn delete_store(&self, store_id: &StoreId) -> Result<bool> {
        repository::delete(self.sheets.as_ref(), store_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::a102_service_account::cache::SA_SHEET;
    use crate::shared::sheets::memory::MemorySheets;

    fn registry() -> (Arc<MemorySheets>, StoreRegistry) {
        let mem = Arc::new(MemorySheets::new().with_sheet(
            SA_SHEET,
            &[
                &["path", "", "used_count", "email", "status"],
                &["sa/a.json", "", "0", "a@iam", "active"],
            ],
        ));
        let registry = StoreRegistry::new(mem.clone());
        (mem, registry)
    }

    fn ozon_creds(client_id: &str) -> StoreCredentials {
        StoreCredentials {
            client_id: Some(client_id.into()),
            api_key: "key".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_add_list_rename_delete() {
        let (_mem, registry) = registry();
        let store = registry
            .add_store(7, MarketplaceType::Ozon, ozon_creds("111"), " sheet-1 ".into())
            .await
            .unwrap();
        assert_eq!(store.store_id.as_str(), "111");
        assert_eq!(store.sa_path, "sa/a.json");
        assert_eq!(store.sheet_id, "sheet-1");

        registry
            .add_store(8, MarketplaceType::Ozon, ozon_creds("222"), "sheet-2".into())
            .await
            .unwrap();
        assert_eq!(registry.list_by_owner(7).await.unwrap().len(), 1);
        assert_eq!(registry.list_all().await.unwrap().len(), 2);

        let id = StoreId::new("111");
        assert!(registry.rename_store(&id, "Мой магазин").await.unwrap());
        assert_eq!(registry.get(&id).await.unwrap().unwrap().name, "Мой магазин");

        assert!(registry.delete_store(&id).await.unwrap());
        assert!(registry.get(&id).await.unwrap().is_none());
        assert!(!registry.delete_store(&id).await.unwrap());
        assert_eq!(registry.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_store_rejected() {
        let (_mem, registry) = registry();
        registry
            .add_store(7, MarketplaceType::Ozon, ozon_creds("111"), "s".into())
            .await
            .unwrap();
        assert!(registry
            .add_store(7, MarketplaceType::Ozon, ozon_creds("111"), "s".into())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_wildberries_gets_generated_id() {
        let (_mem, registry) = registry();
        let creds = StoreCredentials {
            api_key: "wb-key".into(),
            ..Default::default()
        };
        let store = registry
            .add_store(7, MarketplaceType::Wildberries, creds, "s".into())
            .await
            .unwrap();
        assert_eq!(store.store_id.as_str().len(), 36);
        assert!(store.name.starts_with("WB-"));
    }
}
