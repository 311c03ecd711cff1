use crate::error::EventsError;
use chrono::{DateTime, Utc};
use core_types::TraderId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange type used by the trader-level logger, as opposed to the per-exchange loggers.
pub const GLOBAL_EXCHANGE_TYPE: &str = "global";

/// Enum representing the kind of a trader event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Error,
    Profit,
    Buy,
    Sell,
    Cancel,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Error => "ERROR",
            LogLevel::Profit => "PROFIT",
            LogLevel::Buy => "BUY",
            LogLevel::Sell => "SELL",
            LogLevel::Cancel => "CANCEL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry in a trader's event log.
///
/// `price` and `amount` are only meaningful for exchange actions and profit
/// reports; lifecycle events carry zero for both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraderEvent {
    pub timestamp: DateTime<Utc>,
    pub trader_id: TraderId,
    pub exchange_type: String,
    pub level: LogLevel,
    pub price: Decimal,
    pub amount: Decimal,
    pub message: String,
}

impl TraderEvent {
    pub fn to_json(&self) -> Result<String, EventsError> {
        Ok(serde_json::to_string(self)?)
    }
}
