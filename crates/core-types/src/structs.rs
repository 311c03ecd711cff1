use crate::enums::TraderStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

pub type TraderId = i64;
pub type UserId = i64;
pub type StrategyId = i64;

/// A registered account owner. Traders, strategies and exchange accounts all
/// belong to exactly one user.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

/// A user-authored strategy script.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Strategy {
    pub id: StrategyId,
    pub user_id: UserId,
    pub name: String,
    pub script: String,
}

/// The persisted configuration of a trader.
///
/// `strategy_id <= 0` means no strategy has been selected yet.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct TraderRecord {
    pub id: TraderId,
    pub user_id: UserId,
    pub name: String,
    pub strategy_id: StrategyId,
    #[sqlx(try_from = "i16")]
    pub status: TraderStatus,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl TraderRecord {
    pub fn has_strategy(&self) -> bool {
        self.strategy_id > 0
    }
}

/// API credentials for one exchange account. The secret never shows up in
/// `Debug` output.
#[derive(Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// One stored exchange account attached to a trader. `kind` is the account
/// type tag (e.g. `"binance"`) used to pick the client implementation.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub id: i64,
    pub user_id: UserId,
    pub name: String,
    pub kind: String,
    #[sqlx(flatten)]
    pub credentials: Credentials,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_hides_secret() {
        let creds = Credentials {
            access_key: "ak".to_string(),
            secret_key: "very-secret".to_string(),
        };
        let printed = format!("{:?}", creds);
        assert!(printed.contains("ak"));
        assert!(!printed.contains("very-secret"));
    }

    #[test]
    fn trader_without_strategy_is_detected() {
        let trader = TraderRecord {
            id: 1,
            user_id: 1,
            name: "t".to_string(),
            strategy_id: 0,
            status: TraderStatus::Idle,
            last_run_at: None,
        };
        assert!(!trader.has_strategy());
    }
}
