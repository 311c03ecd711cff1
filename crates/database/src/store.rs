use crate::error::DbError;
use async_trait::async_trait;
use core_types::{ExchangeConfig, Strategy, StrategyId, TraderId, TraderRecord, User, UserId};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// The storage service consumed by the lifecycle controller.
///
/// Every getter fails with `DbError::NotFound` when the record does not
/// exist; any other error is a storage failure.
#[async_trait]
pub trait TraderStore: Send + Sync {
    async fn get_trader(&self, id: TraderId) -> Result<TraderRecord, DbError>;

    async fn get_user(&self, id: UserId) -> Result<User, DbError>;

    async fn get_strategy(&self, id: StrategyId) -> Result<Strategy, DbError>;

    /// The exchange accounts attached to a trader, restricted to accounts the
    /// user owns, in attachment order.
    async fn get_exchange_configs(
        &self,
        user: &User,
        trader_id: TraderId,
    ) -> Result<Vec<ExchangeConfig>, DbError>;
}

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    strategies: HashMap<StrategyId, Strategy>,
    traders: HashMap<TraderId, TraderRecord>,
    exchanges: HashMap<i64, ExchangeConfig>,
    /// trader id -> attached exchange ids, in attachment order
    attachments: HashMap<TraderId, Vec<i64>>,
}

/// An in-memory `TraderStore`, for dry runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        self.tables.write().await.users.insert(user.id, user);
    }

    pub async fn insert_strategy(&self, strategy: Strategy) {
        self.tables.write().await.strategies.insert(strategy.id, strategy);
    }

    pub async fn insert_trader(&self, trader: TraderRecord) {
        self.tables.write().await.traders.insert(trader.id, trader);
    }

    pub async fn insert_exchange(&self, exchange: ExchangeConfig) {
        self.tables.write().await.exchanges.insert(exchange.id, exchange);
    }

    /// Attaches a stored exchange account to a trader.
    pub async fn attach_exchange(&self, trader_id: TraderId, exchange_id: i64) {
        self.tables
            .write()
            .await
            .attachments
            .entry(trader_id)
            .or_default()
            .push(exchange_id);
    }

    /// Replaces the script of a stored strategy.
    pub async fn update_script(&self, id: StrategyId, script: impl Into<String>) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        let strategy = tables
            .strategies
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("Strategy {}", id)))?;
        strategy.script = script.into();
        Ok(())
    }
}

#[async_trait]
impl TraderStore for MemoryStore {
    async fn get_trader(&self, id: TraderId) -> Result<TraderRecord, DbError> {
        self.tables
            .read()
            .await
            .traders
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("Trader {}", id)))
    }

    async fn get_user(&self, id: UserId) -> Result<User, DbError> {
        self.tables
            .read()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("User {}", id)))
    }

    async fn get_strategy(&self, id: StrategyId) -> Result<Strategy, DbError> {
        self.tables
            .read()
            .await
            .strategies
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("Strategy {}", id)))
    }

    async fn get_exchange_configs(
        &self,
        user: &User,
        trader_id: TraderId,
    ) -> Result<Vec<ExchangeConfig>, DbError> {
        let tables = self.tables.read().await;
        let attached = tables
            .attachments
            .get(&trader_id)
            .map(Vec::as_slice)
            .unwrap_or_default();

        Ok(attached
            .iter()
            .filter_map(|id| tables.exchanges.get(id))
            .filter(|e| e.user_id == user.id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{Credentials, TraderStatus};

    fn exchange(id: i64, user_id: UserId, kind: &str) -> ExchangeConfig {
        ExchangeConfig {
            id,
            user_id,
            name: format!("account-{}", id),
            kind: kind.to_string(),
            credentials: Credentials {
                access_key: "ak".to_string(),
                secret_key: "sk".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let store = MemoryStore::new();
        assert!(store.get_trader(1).await.unwrap_err().is_not_found());
        assert!(store.get_user(1).await.unwrap_err().is_not_found());
        assert!(store.get_strategy(1).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn exchange_configs_keep_attachment_order_and_owner() {
        let store = MemoryStore::new();
        let owner = User { id: 1, username: "alice".to_string() };
        store.insert_user(owner.clone()).await;
        store
            .insert_trader(TraderRecord {
                id: 10,
                user_id: 1,
                name: "t".to_string(),
                strategy_id: 0,
                status: TraderStatus::Idle,
                last_run_at: None,
            })
            .await;
        store.insert_exchange(exchange(3, 1, "paper")).await;
        store.insert_exchange(exchange(1, 1, "binance")).await;
        store.insert_exchange(exchange(2, 2, "paper")).await;
        for id in [3, 2, 1] {
            store.attach_exchange(10, id).await;
        }

        let configs = store.get_exchange_configs(&owner, 10).await.unwrap();
        let ids: Vec<i64> = configs.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 1]);
        assert!(store.get_exchange_configs(&owner, 11).await.unwrap().is_empty());
    }
}
