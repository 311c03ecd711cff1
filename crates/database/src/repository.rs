use crate::error::DbError;
use crate::store::TraderStore;
use async_trait::async_trait;
use core_types::{ExchangeConfig, Strategy, StrategyId, TraderId, TraderRecord, User, UserId};
use events::TraderEvent;
use sqlx::postgres::PgPool;

/// The `DbRepository` provides a high-level, application-specific interface
/// to the database. It encapsulates all SQL queries and data access logic.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: PgPool,
}

impl DbRepository {
    /// Creates a new `DbRepository` with a shared database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends one trader event to the `trader_logs` table.
    pub async fn save_log(&self, event: &TraderEvent) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO trader_logs (trader_id, exchange_type, level, price, amount, message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.trader_id)
        .bind(&event.exchange_type)
        .bind(event.level.as_str())
        .bind(event.price)
        .bind(event.amount)
        .bind(&event.message)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn not_found(what: String) -> impl FnOnce(sqlx::Error) -> DbError {
    move |e| match e {
        sqlx::Error::RowNotFound => DbError::NotFound(what),
        other => DbError::from(other),
    }
}

#[async_trait]
impl TraderStore for DbRepository {
    async fn get_trader(&self, id: TraderId) -> Result<TraderRecord, DbError> {
        sqlx::query_as::<_, TraderRecord>(
            "SELECT id, user_id, name, strategy_id, status, last_run_at FROM traders WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found(format!("Trader {}", id)))
    }

    async fn get_user(&self, id: UserId) -> Result<User, DbError> {
        sqlx::query_as::<_, User>("SELECT id, username FROM users WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found(format!("User {}", id)))
    }

    async fn get_strategy(&self, id: StrategyId) -> Result<Strategy, DbError> {
        sqlx::query_as::<_, Strategy>(
            "SELECT id, user_id, name, script FROM strategies WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found(format!("Strategy {}", id)))
    }

    async fn get_exchange_configs(
        &self,
        user: &User,
        trader_id: TraderId,
    ) -> Result<Vec<ExchangeConfig>, DbError> {
        let configs = sqlx::query_as::<_, ExchangeConfig>(
            r#"
            SELECT e.id, e.user_id, e.name, e.kind, e.access_key, e.secret_key
            FROM trader_exchanges AS te
            JOIN exchanges AS e ON e.id = te.exchange_id
            WHERE te.trader_id = $1 AND e.user_id = $2
            ORDER BY te.id
            "#,
        )
        .bind(trader_id)
        .bind(user.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(configs)
    }
}
